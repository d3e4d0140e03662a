//! JNI symbol mangling
//!
//! The JVM binds a `native` method to the exported symbol
//! `Java_<class>_<method>__<argument descriptors>` (the long form, which
//! stays unique across overloads). Each component is escaped: `/` becomes
//! `_`, while `_`, `;` and `[` become `_1`, `_2` and `_3`. Any other character
//! outside `[A-Za-z0-9]` is written as `_0` followed by its UTF-16 code units
//! in four lowercase hex digits.

use std::fmt::Write;

use crate::classfile::MethodDescriptor;

/// Escape one component of a JNI symbol
pub fn mangle(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '/' => out.push('_'),
            '_' => out.push_str("_1"),
            ';' => out.push_str("_2"),
            '[' => out.push_str("_3"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "_0{:04x}", unit);
                }
            }
        }
    }
    out
}

/// Long-form symbol for `class.name` with the given descriptor
pub fn jni_symbol(class: &str, name: &str, descriptor: &MethodDescriptor) -> String {
    let params: String = descriptor.params.iter().map(|p| p.to_string()).collect();
    format!("Java_{}_{}__{}", mangle(class), mangle(name), mangle(&params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes() {
        assert_eq!(mangle("a/b/C"), "a_b_C");
        assert_eq!(mangle("my_name"), "my_1name");
        assert_eq!(mangle("[Ljava/lang/String;"), "_3Ljava_lang_String_2");
        assert_eq!(mangle("\u{0131}"), "_00131");
        assert_eq!(mangle("\u{1F600}"), "_0d83d_0de00");
    }

    #[test]
    fn test_long_form_symbol() {
        let add = MethodDescriptor::parse("(II)I").unwrap();
        assert_eq!(jni_symbol("Calc", "add", &add), "Java_Calc_add__II");

        let none = MethodDescriptor::parse("()V").unwrap();
        assert_eq!(jni_symbol("a/B", "run", &none), "Java_a_B_run__");

        let strings = MethodDescriptor::parse("(Ljava/lang/String;[I)V").unwrap();
        assert_eq!(
            jni_symbol("p/Q", "f", &strings),
            "Java_p_Q_f__Ljava_lang_String_2_3I"
        );
    }
}
