//! Annotation-driven selection
//!
//! `@natjar.annotations.Compile` forces translation and `@natjar.annotations.Skip`
//! forbids it. A method's own annotation wins over its class's.

use super::{SelectionPolicy, SkipReason, Verdict};
use crate::index::{MethodId, ProgramIndex};

pub const COMPILE_ANNOTATION: &str = "Lnatjar/annotations/Compile;";
pub const SKIP_ANNOTATION: &str = "Lnatjar/annotations/Skip;";

/// Forces or forbids translation from `@Compile` / `@Skip`
pub struct AnnotationPolicy;

impl AnnotationPolicy {
    fn verdict(annotations: &[String]) -> Option<Verdict> {
        // Skip beats Compile on the same element
        if annotations.iter().any(|a| a == SKIP_ANNOTATION) {
            Some(Verdict::Reject(SkipReason::ExcludedByAnnotation))
        } else if annotations.iter().any(|a| a == COMPILE_ANNOTATION) {
            Some(Verdict::Force)
        } else {
            None
        }
    }
}

impl SelectionPolicy for AnnotationPolicy {
    fn name(&self) -> &str {
        "annotations"
    }

    fn preprocess(&self, index: &ProgramIndex, method: MethodId) -> Verdict {
        AnnotationPolicy::verdict(&index.method(method).annotations)
            .or_else(|| AnnotationPolicy::verdict(index.class(method.class).annotations()))
            .unwrap_or(Verdict::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{access, Attribute, ClassBuilder, ClassFile, CodeAssembler, Opcode};
    use crate::config::MethodPattern;
    use crate::index::{ClassEntry, Provenance};
    use crate::select::select_for_compilation;

    fn annotate(file: &mut ClassFile, method: Option<usize>, annotation: &str) {
        let name_index = file.pool.intern_utf8("RuntimeInvisibleAnnotations").unwrap();
        let [t1, t0] = file.pool.intern_utf8(annotation).unwrap().to_be_bytes();
        let attr = Attribute::Raw {
            name_index,
            data: vec![0, 1, t1, t0, 0, 0],
        };
        match method {
            Some(i) => file.methods[i].attributes.push(attr),
            None => file.attributes.push(attr),
        }
    }

    /// `app/Shop` with static `price()I` and `tax()I`, both returning 7
    fn shop(annotations: &[(Option<usize>, &str)]) -> ProgramIndex {
        let mut builder = ClassBuilder::new(52, access::PUBLIC, "app/Shop", "java/lang/Object").unwrap();
        let code_name = builder.pool().intern_utf8("Code").unwrap();
        for name in ["price", "tax"] {
            let mut asm = CodeAssembler::new();
            asm.iconst(7).op(Opcode::Ireturn);
            let code = asm.finish(code_name, 1, 0).unwrap();
            builder.method(access::PUBLIC | access::STATIC, name, "()I", Some(code)).unwrap();
        }
        let mut file = builder.build();
        for (method, annotation) in annotations {
            annotate(&mut file, *method, annotation);
        }

        let mut index = ProgramIndex::new();
        index
            .insert(ClassEntry::new(file, "app/Shop.class".into(), Provenance::Program).unwrap())
            .unwrap();
        index
    }

    fn marked(index: &ProgramIndex) -> Vec<String> {
        let class = index.lookup_class("app/Shop").unwrap();
        index
            .class(class)
            .methods()
            .iter()
            .filter(|m| m.marked)
            .map(|m| m.name.clone())
            .collect()
    }

    #[test]
    fn test_skip_on_method_rejects_it() {
        let mut index = shop(&[(Some(0), SKIP_ANNOTATION)]);
        let notices = select_for_compilation(&mut index, &[]).unwrap();
        assert_eq!(marked(&index), vec!["tax"]);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reason, SkipReason::ExcludedByAnnotation);
        assert_eq!(
            notices[0].to_string(),
            "Method \"price\" (Parent: \"app/Shop\", desc: \"()I\") will be ignored by annotation."
        );
    }

    #[test]
    fn test_method_annotation_overrides_class() {
        let mut index = shop(&[(None, SKIP_ANNOTATION), (Some(1), COMPILE_ANNOTATION)]);
        select_for_compilation(&mut index, &[]).unwrap();
        assert_eq!(marked(&index), vec!["tax"]);
    }

    #[test]
    fn test_compile_beats_exclusion_pattern() {
        let mut index = shop(&[(Some(0), COMPILE_ANNOTATION)]);
        let patterns = vec![MethodPattern::new("app.*", "**", "**")];
        let notices = select_for_compilation(&mut index, &patterns).unwrap();
        assert_eq!(marked(&index), vec!["price"]);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reason, SkipReason::ExcludedByConfig);
        assert_eq!(notices[0].name, "tax");
    }

    #[test]
    fn test_compile_cannot_force_unsupported_body() {
        let mut builder = ClassBuilder::new(52, access::PUBLIC, "app/Shop", "java/lang/Object").unwrap();
        let code_name = builder.pool().intern_utf8("Code").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Dup2X2).op(Opcode::Return);
        let code = asm.finish(code_name, 4, 0).unwrap();
        builder.method(access::PUBLIC | access::STATIC, "odd", "()V", Some(code)).unwrap();
        let mut file = builder.build();
        annotate(&mut file, None, COMPILE_ANNOTATION);

        let mut index = ProgramIndex::new();
        index
            .insert(ClassEntry::new(file, "app/Shop.class".into(), Provenance::Program).unwrap())
            .unwrap();
        let notices = select_for_compilation(&mut index, &[]).unwrap();
        assert!(marked(&index).is_empty());
        assert_eq!(notices[0].reason, SkipReason::Unsupported("opcode".into()));
    }
}
