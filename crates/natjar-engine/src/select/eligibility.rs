//! The standard selection policies

use super::pattern::{is_excluded, ExclusionPattern};
use super::{SelectionPolicy, SkipReason, Verdict};
use crate::classfile::{ConstantPool, Instruction, Loadable, Opcode, Operand};
use crate::config::{ConfigError, MethodPattern};
use crate::index::{MethodId, ProgramIndex};

/// Skips native and abstract methods, initializers, and every method of an
/// interface. Interfaces cannot declare native methods, so there is nowhere
/// to put a stub.
pub struct StructuralPolicy;

impl SelectionPolicy for StructuralPolicy {
    fn name(&self) -> &str {
        "structural"
    }

    fn preprocess(&self, index: &ProgramIndex, method: MethodId) -> Verdict {
        use crate::classfile::access;

        let m = index.method(method);
        if index.class(method.class).is_interface()
            || m.access_flags & (access::NATIVE | access::ABSTRACT) != 0
            || m.name.starts_with('<')
        {
            Verdict::Decline
        } else {
            Verdict::Accept
        }
    }
}

/// Skips methods whose body cannot be lowered
pub struct UnsupportedInstructionPolicy;

impl SelectionPolicy for UnsupportedInstructionPolicy {
    fn name(&self) -> &str {
        "unsupported-instructions"
    }

    fn preprocess(&self, index: &ProgramIndex, method: MethodId) -> Verdict {
        let pool = &index.class(method.class).file().pool;
        index
            .method(method)
            .instructions
            .iter()
            .find_map(|insn| unsupported(pool, insn))
            .map(|what| Verdict::Reject(SkipReason::Unsupported(what.to_string())))
            .unwrap_or(Verdict::Accept)
    }
}

/// What makes `insn` untranslatable, if anything
fn unsupported(pool: &ConstantPool, insn: &Instruction) -> Option<&'static str> {
    match insn.opcode {
        Opcode::Dup2X1
        | Opcode::Dup2X2
        | Opcode::Jsr
        | Opcode::JsrW
        | Opcode::Ret
        | Opcode::Invokedynamic
        | Opcode::Multianewarray => Some("opcode"),
        Opcode::Ldc | Opcode::LdcW | Opcode::Ldc2W => match insn.operand {
            Operand::Constant(index) => match pool.loadable(index) {
                Ok(Loadable::MethodType | Loadable::MethodHandle | Loadable::Dynamic) | Err(_) => Some("constant"),
                Ok(_) => None,
            },
            _ => Some("constant"),
        },
        Opcode::Invokevirtual => match insn.operand {
            Operand::Constant(index) => match pool.member_ref(index) {
                Ok(member) if is_signature_polymorphic(&member.owner, &member.name) => Some("call"),
                Ok(_) => None,
                Err(_) => Some("call"),
            },
            _ => Some("call"),
        },
        _ => None,
    }
}

/// Calls whose descriptor is chosen at each call site
fn is_signature_polymorphic(owner: &str, name: &str) -> bool {
    match owner {
        "java/lang/invoke/MethodHandle" => matches!(name, "invoke" | "invokeExact"),
        "java/lang/invoke/VarHandle" => !matches!(
            name,
            "varType"
                | "coordinateTypes"
                | "accessModeType"
                | "isAccessModeSupported"
                | "toMethodHandle"
                | "describeConstable"
                | "hasInvokeExactBehavior"
                | "withInvokeExactBehavior"
                | "withInvokeBehavior"
        ),
        _ => false,
    }
}

/// Skips methods matching any configured exclusion pattern
pub struct ExclusionPolicy {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionPolicy {
    pub fn new(patterns: &[MethodPattern]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(ExclusionPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExclusionPolicy { patterns })
    }
}

impl SelectionPolicy for ExclusionPolicy {
    fn name(&self) -> &str {
        "exclusions"
    }

    fn init(&mut self, _index: &ProgramIndex) {
        tracing::debug!(patterns = self.patterns.len(), "exclusion patterns active");
    }

    fn preprocess(&self, index: &ProgramIndex, method: MethodId) -> Verdict {
        let owner = &index.class(method.class).name;
        let m = index.method(method);
        if is_excluded(&self.patterns, owner, &m.name, &m.descriptor) {
            Verdict::Reject(SkipReason::ExcludedByConfig)
        } else {
            Verdict::Accept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{access, ClassBuilder, CodeAssembler};
    use crate::index::{ClassEntry, Provenance};

    fn index_with(body: impl FnOnce(&mut ClassBuilder, &mut CodeAssembler)) -> (ProgramIndex, MethodId) {
        let mut builder = ClassBuilder::new(52, access::PUBLIC, "t/T", "java/lang/Object").unwrap();
        let code_name = builder.pool().intern_utf8("Code").unwrap();
        let mut asm = CodeAssembler::new();
        body(&mut builder, &mut asm);
        let code = asm.finish(code_name, 8, 8).unwrap();
        builder.method(access::STATIC, "m", "()V", Some(code)).unwrap();

        let mut index = ProgramIndex::new();
        let class = index
            .insert(ClassEntry::new(builder.build(), "t/T.class".into(), Provenance::Program).unwrap())
            .unwrap();
        (index, MethodId { class, index: 0 })
    }

    #[test]
    fn test_plain_body_is_accepted() {
        let (index, id) = index_with(|_, asm| {
            asm.op(Opcode::Return);
        });
        assert_eq!(UnsupportedInstructionPolicy.preprocess(&index, id), Verdict::Accept);
        assert_eq!(StructuralPolicy.preprocess(&index, id), Verdict::Accept);
    }

    #[test]
    fn test_interface_methods_are_declined() {
        // interface Shape { static int twice(int x) { return x * 2; } default int area() { return 7; } }
        let flags = access::PUBLIC | access::INTERFACE | access::ABSTRACT;
        let mut builder = ClassBuilder::new(52, flags, "t/Shape", "java/lang/Object").unwrap();
        let code_name = builder.pool().intern_utf8("Code").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Iload0).op(Opcode::Iconst2).op(Opcode::Imul).op(Opcode::Ireturn);
        let twice = asm.finish(code_name, 2, 1).unwrap();
        builder.method(access::PUBLIC | access::STATIC, "twice", "(I)I", Some(twice)).unwrap();
        let mut asm = CodeAssembler::new();
        asm.iconst(7).op(Opcode::Ireturn);
        let area = asm.finish(code_name, 1, 1).unwrap();
        builder.method(access::PUBLIC, "area", "()I", Some(area)).unwrap();

        let mut index = ProgramIndex::new();
        let class = index
            .insert(ClassEntry::new(builder.build(), "t/Shape.class".into(), Provenance::Program).unwrap())
            .unwrap();
        for id in index.method_ids(class) {
            assert_eq!(StructuralPolicy.preprocess(&index, id), Verdict::Decline);
        }

        let notices = crate::select::select_for_compilation(&mut index, &[]).unwrap();
        assert!(notices.is_empty());
        assert!(index.class(class).methods().iter().all(|m| !m.marked));
    }

    #[test]
    fn test_dup2_x2_is_rejected() {
        let (index, id) = index_with(|_, asm| {
            asm.op(Opcode::Dup2X2).op(Opcode::Return);
        });
        assert_eq!(
            UnsupportedInstructionPolicy.preprocess(&index, id),
            Verdict::Reject(SkipReason::Unsupported("opcode".into()))
        );
    }

    #[test]
    fn test_method_handle_invoke_is_rejected() {
        let (index, id) = index_with(|builder, asm| {
            let mref = builder
                .pool()
                .intern_method_ref("java/lang/invoke/MethodHandle", "invokeExact", "()V", false)
                .unwrap();
            asm.op(Opcode::AconstNull).op_u16(Opcode::Invokevirtual, mref).op(Opcode::Return);
        });
        assert_eq!(
            UnsupportedInstructionPolicy.preprocess(&index, id),
            Verdict::Reject(SkipReason::Unsupported("call".into()))
        );
    }

    #[test]
    fn test_string_constant_is_accepted() {
        let (index, id) = index_with(|builder, asm| {
            let s = builder.pool().intern_string("hello").unwrap();
            asm.ldc(s).op(Opcode::Pop).op(Opcode::Return);
        });
        assert_eq!(UnsupportedInstructionPolicy.preprocess(&index, id), Verdict::Accept);
    }

    #[test]
    fn test_signature_polymorphic_names() {
        assert!(is_signature_polymorphic("java/lang/invoke/MethodHandle", "invoke"));
        assert!(!is_signature_polymorphic("java/lang/invoke/MethodHandle", "bindTo"));
        assert!(is_signature_polymorphic("java/lang/invoke/VarHandle", "compareAndSet"));
        assert!(!is_signature_polymorphic("java/lang/invoke/VarHandle", "varType"));
        assert!(!is_signature_polymorphic("a/B", "invoke"));
    }
}
