//! Builder for synthesized classes

use super::{Attribute, ClassFile, ClassFormatError, Code, ConstantPool, FieldInfo, MethodInfo};

/// Assembles a new class file member by member
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Start a class with the given version, access flags, name and superclass
    pub fn new(
        major_version: u16,
        access_flags: u16,
        name: &str,
        super_name: &str,
    ) -> Result<Self, ClassFormatError> {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(name)?;
        let super_class = pool.intern_class(super_name)?;
        Ok(ClassBuilder {
            class: ClassFile {
                minor_version: 0,
                major_version,
                pool,
                access_flags,
                this_class,
                super_class,
                interfaces: vec![],
                fields: vec![],
                methods: vec![],
                attributes: vec![],
            },
        })
    }

    /// Constant pool, for emitting code that references it
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.class.pool
    }

    pub fn field(&mut self, access_flags: u16, name: &str, descriptor: &str) -> Result<&mut Self, ClassFormatError> {
        let name_index = self.class.pool.intern_utf8(name)?;
        let descriptor_index = self.class.pool.intern_utf8(descriptor)?;
        self.class.fields.push(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        Ok(self)
    }

    /// Add a method; `code` is `None` for abstract and native methods
    pub fn method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<Code>,
    ) -> Result<&mut Self, ClassFormatError> {
        let name_index = self.class.pool.intern_utf8(name)?;
        let descriptor_index = self.class.pool.intern_utf8(descriptor)?;
        self.class.methods.push(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: code.map(Attribute::Code).into_iter().collect(),
        });
        Ok(self)
    }

    pub fn build(self) -> ClassFile {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{access, CodeAssembler, Opcode};

    #[test]
    fn test_built_class_round_trips() {
        let mut builder = ClassBuilder::new(49, access::PUBLIC | access::SUPER, "a/Gen", "java/lang/Object").unwrap();
        builder.field(access::PRIVATE | access::STATIC, "flag", "Z").unwrap();
        let code_name = builder.pool().intern_utf8("Code").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Return);
        let code = asm.finish(code_name, 0, 0).unwrap();
        builder.method(access::PUBLIC | access::STATIC, "run", "()V", Some(code)).unwrap();
        let class = builder.build();

        let bytes = class.to_bytes();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed, class);
        assert_eq!(parsed.name().unwrap(), "a/Gen");
        assert_eq!(parsed.super_name().unwrap().as_deref(), Some("java/lang/Object"));
        assert_eq!(parsed.find_method("run", "()V"), Some(0));
        assert_eq!(parsed.methods[0].code().unwrap().code, vec![Opcode::Return as u8]);
    }
}
