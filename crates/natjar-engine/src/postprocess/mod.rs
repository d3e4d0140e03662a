//! Patch-back synthesis
//!
//! After translation each compiled method is rewired to its native code:
//! the owning class gains a `private native synthetic` stub with the same
//! descriptor, the original body becomes a trampoline into that stub, and the
//! native function is renamed to the stub's JNI symbol and exported.
//!
//! When at least one stub exists the loader class is generated and every
//! class that gained a stub calls `ensureLoaded()` from its static
//! initializer, so the library is loaded before any stub can run.

pub mod loader;
pub mod mangle;
pub mod naming;
pub mod trampoline;

use crate::classfile::{
    access, shift, AssembleError, Attribute, ClassFormatError, CodeAssembler, MethodDescriptor, MethodInfo, Opcode,
};
use crate::compiler::CompiledRegistry;
use crate::index::{ClassId, IndexError, MethodId, ProgramIndex};
use crate::ir::NativeModule;

pub use loader::{generate_loader, ENSURE_LOADED};
pub use mangle::{jni_symbol, mangle};
pub use naming::NameGenerator;
pub use trampoline::{trampoline_code, StubTarget};

const CLINIT: &str = "<clinit>";

/// Errors while rewriting the program
#[derive(Debug, thiserror::Error)]
pub enum PostprocessError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    ClassFormat(#[from] ClassFormatError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("Static initializer of {0} has no code")]
    InitializerWithoutCode(String),
    #[error("Cannot add a native stub for {class}.{method}: interfaces cannot declare native methods")]
    InterfaceMember { class: String, method: String },
}

/// What patch-back changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// Native stubs added, one per compiled method
    pub stubs: usize,
    /// The generated loader class, if any stub was added
    pub loader: Option<ClassId>,
    /// Classes whose static initializer now loads the library
    pub hooked_classes: Vec<ClassId>,
}

/// Rewrites compiled methods into trampolines over native stubs
#[derive(Debug)]
pub struct Postprocessor {
    loader_class: String,
    natives_prefix: String,
    names: NameGenerator,
}

impl Postprocessor {
    pub fn new(loader_class: impl Into<String>, natives_prefix: impl Into<String>) -> Self {
        Postprocessor {
            loader_class: loader_class.into(),
            natives_prefix: natives_prefix.into(),
            names: NameGenerator::new(),
        }
    }

    /// Patch every registry entry that has not been named yet, in registry
    /// order
    pub fn postprocess(
        &mut self,
        index: &mut ProgramIndex,
        registry: &mut CompiledRegistry,
        module: &mut NativeModule,
    ) -> Result<PatchReport, PostprocessError> {
        let _span = tracing::info_span!("postprocess").entered();
        let pending: Vec<_> = registry
            .iter()
            .filter(|entry| entry.stub_name.is_none())
            .map(|entry| (entry.method, entry.function))
            .collect();

        let mut report = PatchReport::default();
        for (method, function) in pending {
            let (stub_name, symbol) = self.patch_method(index, method)?;
            module.rename(function, symbol.as_str());
            module.export(function);
            registry.set_names(method, stub_name, symbol);

            report.stubs += 1;
            if !report.hooked_classes.contains(&method.class) {
                report.hooked_classes.push(method.class);
            }
        }

        if report.stubs > 0 {
            let loader = generate_loader(&self.loader_class, &self.natives_prefix)?;
            report.loader = Some(index.add_class(loader)?);
            for &class in &report.hooked_classes {
                self.hook_initializer(index, class)?;
            }
        }

        tracing::info!(
            stubs = report.stubs,
            hooked = report.hooked_classes.len(),
            "patch-back finished"
        );
        Ok(report)
    }

    /// Add the stub, swap in the trampoline; returns (stub name, symbol)
    fn patch_method(&mut self, index: &mut ProgramIndex, method: MethodId) -> Result<(String, String), PostprocessError> {
        let class = method.class;
        let entry = index.class(class);
        let owner = entry.name.clone();
        let m = index.method(method);
        let (name, descriptor, is_static) = (m.name.clone(), m.descriptor.clone(), m.is_static());
        if entry.is_interface() {
            return Err(PostprocessError::InterfaceMember { class: owner, method: name });
        }

        let stub_name = self
            .names
            .fresh(&owner, &name, &descriptor, |candidate| entry.has_method(candidate, &descriptor));

        let mut flags = access::PRIVATE | access::NATIVE | access::SYNTHETIC;
        if is_static {
            flags |= access::STATIC;
        }

        let file = index.file_mut(class)?;
        let stub = MethodInfo {
            access_flags: flags,
            name_index: file.pool.intern_utf8(&stub_name)?,
            descriptor_index: file.pool.intern_utf8(&descriptor)?,
            attributes: vec![],
        };
        let code = trampoline_code(
            &mut file.pool,
            &StubTarget {
                owner: &owner,
                name: &stub_name,
                descriptor: &descriptor,
                is_static,
            },
        )?;
        index.add_method(class, stub)?;
        index.replace_code(method, code)?;

        let symbol = jni_symbol(&owner, &stub_name, &MethodDescriptor::parse(&descriptor)?);
        tracing::debug!(
            class = %owner,
            method = %name,
            descriptor = %descriptor,
            stub = %stub_name,
            symbol = %symbol,
            "method patched"
        );
        Ok((stub_name, symbol))
    }

    /// Call `ensureLoaded()` first thing in the static initializer
    fn hook_initializer(&self, index: &mut ProgramIndex, class: ClassId) -> Result<(), PostprocessError> {
        let existing = index.class(class).find_method(CLINIT, "()V");
        let class_name = index.class(class).name.clone();
        let file = index.file_mut(class)?;
        let ensure = file
            .pool
            .intern_method_ref(&self.loader_class, ENSURE_LOADED, "()V", false)?;

        match existing {
            Some(i) => {
                let mut code = file.methods[i as usize]
                    .code()
                    .cloned()
                    .ok_or(PostprocessError::InitializerWithoutCode(class_name))?;
                let [hi, lo] = ensure.to_be_bytes();
                let prefix = [Opcode::Invokestatic as u8, hi, lo, Opcode::Nop as u8];
                shift::prepend_code(&mut code, &file.pool, &prefix)?;
                index.replace_code(MethodId { class, index: i }, code)?;
            }
            None => {
                let code_name = file.pool.intern_utf8("Code")?;
                let mut asm = CodeAssembler::new();
                asm.op_u16(Opcode::Invokestatic, ensure).op(Opcode::Return);
                let code = asm.finish(code_name, 0, 0)?;
                let info = MethodInfo {
                    access_flags: access::STATIC,
                    name_index: file.pool.intern_utf8(CLINIT)?,
                    descriptor_index: file.pool.intern_utf8("()V")?,
                    attributes: vec![Attribute::Code(code)],
                };
                index.add_method(class, info)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{decode_code, ClassBuilder, ClassFile};
    use crate::compiler::Compiler;
    use crate::index::ClassSource;
    use crate::ir::{emit_textual_ir, Linkage};

    /// `Calc` with static `add(II)I`, instance `twice(I)I` and, optionally,
    /// a static initializer that stores nothing
    fn calc(with_clinit: bool) -> Vec<u8> {
        let mut class = ClassBuilder::new(52, access::PUBLIC | access::SUPER, "Calc", "java/lang/Object").unwrap();
        let code_name = class.pool().intern_utf8("Code").unwrap();

        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Iload0).op(Opcode::Iload1).op(Opcode::Iadd).op(Opcode::Ireturn);
        let add = asm.finish(code_name, 2, 2).unwrap();
        class
            .method(access::PUBLIC | access::STATIC, "add", "(II)I", Some(add))
            .unwrap();

        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Iload1).op(Opcode::Iconst2).op(Opcode::Imul).op(Opcode::Ireturn);
        let twice = asm.finish(code_name, 2, 2).unwrap();
        class.method(access::PUBLIC, "twice", "(I)I", Some(twice)).unwrap();

        if with_clinit {
            let mut asm = CodeAssembler::new();
            asm.op(Opcode::Return);
            let clinit = asm.finish(code_name, 0, 0).unwrap();
            class.method(access::STATIC, CLINIT, "()V", Some(clinit)).unwrap();
        }
        class.build().to_bytes()
    }

    fn run(with_clinit: bool) -> (ProgramIndex, NativeModule, CompiledRegistry, PatchReport) {
        let (mut index, _) = ProgramIndex::build(&[ClassSource::program("Calc.class", calc(with_clinit))], 1).unwrap();
        for (name, descriptor) in [("add", "(II)I"), ("twice", "(I)I")] {
            let id = index.lookup_method("Calc", name, descriptor).unwrap();
            index.set_marked(id, true);
        }
        let mut compiler = Compiler::new("test");
        compiler.compile_marked(&mut index).unwrap();

        let (mut module, mut registry) = compiler.into_parts();
        let report = Postprocessor::new("natjar/NativeLoader", "META-INF/natives/")
            .postprocess(&mut index, &mut registry, &mut module)
            .unwrap();
        (index, module, registry, report)
    }

    #[test]
    fn test_stubs_and_trampolines() {
        let (index, module, registry, report) = run(false);
        assert_eq!(report.stubs, 2);
        let calc = index.lookup_class("Calc").unwrap();
        assert_eq!(report.hooked_classes, vec![calc]);

        let add = index.lookup_method("Calc", "add", "(II)I").unwrap();
        let entry = registry.get(add).unwrap();
        let stub_name = entry.stub_name.clone().unwrap();
        let stub = index.lookup_method("Calc", &stub_name, "(II)I").unwrap();
        let flags = index.method(stub).access_flags;
        assert_eq!(
            flags,
            access::PRIVATE | access::NATIVE | access::SYNTHETIC | access::STATIC
        );
        assert_eq!(entry.symbol.as_deref(), Some(format!("Java_Calc_{}__II", mangle(&stub_name)).as_str()));

        // The original keeps its flags and forwards to the stub
        let original = index.method(add);
        assert_eq!(original.access_flags, access::PUBLIC | access::STATIC);
        let ops: Vec<Opcode> = original.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![Opcode::Iload0, Opcode::Iload1, Opcode::Invokestatic, Opcode::Ireturn]);

        let twice = index.lookup_method("Calc", "twice", "(I)I").unwrap();
        let ops: Vec<Opcode> = index.method(twice).instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![Opcode::Aload0, Opcode::Iload1, Opcode::Invokespecial, Opcode::Ireturn]);

        let function = module.function(entry.function);
        assert_eq!(function.linkage, Linkage::External);
        let text = String::from_utf8(emit_textual_ir(&module, 0).unwrap()).unwrap();
        assert!(text.contains(entry.symbol.as_deref().unwrap()));
    }

    #[test]
    fn test_loader_and_new_initializer() {
        let (index, _, _, report) = run(false);
        let loader = report.loader.unwrap();
        assert_eq!(index.class(loader).name, "natjar/NativeLoader");
        assert!(index.class(loader).is_modified());

        let clinit = index.lookup_method("Calc", CLINIT, "()V").unwrap();
        let ops: Vec<Opcode> = index.method(clinit).instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![Opcode::Invokestatic, Opcode::Return]);
    }

    #[test]
    fn test_existing_initializer_prefixed() {
        let (index, _, _, _) = run(true);
        let calc = index.lookup_class("Calc").unwrap();
        let file = index.class(calc).file();
        let reparsed = ClassFile::parse(&file.to_bytes()).unwrap();
        let i = reparsed.find_method(CLINIT, "()V").unwrap();
        let code = reparsed.methods[i].code().unwrap();
        let instrs = decode_code(&code.code).unwrap();
        let ops: Vec<Opcode> = instrs.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![Opcode::Invokestatic, Opcode::Nop, Opcode::Return]);

        let target = file.pool.member_ref(u16::from_be_bytes([code.code[1], code.code[2]])).unwrap();
        assert_eq!(target.owner, "natjar/NativeLoader");
        assert_eq!(target.name, ENSURE_LOADED);
    }

    #[test]
    fn test_interface_method_is_refused() {
        let flags = access::PUBLIC | access::INTERFACE | access::ABSTRACT;
        let mut class = ClassBuilder::new(52, flags, "Shape", "java/lang/Object").unwrap();
        let code_name = class.pool().intern_utf8("Code").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Iload0).op(Opcode::Iconst2).op(Opcode::Imul).op(Opcode::Ireturn);
        let twice = asm.finish(code_name, 2, 1).unwrap();
        class.method(access::PUBLIC | access::STATIC, "twice", "(I)I", Some(twice)).unwrap();
        let bytes = class.build().to_bytes();

        let (mut index, _) = ProgramIndex::build(&[ClassSource::program("Shape.class", bytes)], 1).unwrap();
        let id = index.lookup_method("Shape", "twice", "(I)I").unwrap();
        index.set_marked(id, true);
        let mut compiler = Compiler::new("test");
        compiler.compile_marked(&mut index).unwrap();
        let (mut module, mut registry) = compiler.into_parts();

        let err = Postprocessor::new("natjar/NativeLoader", "META-INF/natives/")
            .postprocess(&mut index, &mut registry, &mut module)
            .unwrap_err();
        assert!(matches!(err, PostprocessError::InterfaceMember { .. }));
        assert_eq!(index.class(id.class).methods().len(), 1);
        assert!(!index.class(id.class).is_modified());
    }

    #[test]
    fn test_nothing_compiled_changes_nothing() {
        let (mut index, _) = ProgramIndex::build(&[ClassSource::program("Calc.class", calc(false))], 1).unwrap();
        let mut registry = CompiledRegistry::new();
        let mut module = NativeModule::new("empty");
        let report = Postprocessor::new("natjar/NativeLoader", "META-INF/natives/")
            .postprocess(&mut index, &mut registry, &mut module)
            .unwrap();
        assert_eq!(report, PatchReport::default());
        assert_eq!(index.modified_classes().count(), 0);
    }
}
