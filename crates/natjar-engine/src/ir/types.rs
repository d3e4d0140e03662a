//! Native IR type system
//!
//! Mirrors the first-class LLVM types the translator needs. JVM `int` values
//! are `I32` throughout; the narrower integer types only appear at the JNI
//! boundary (`jboolean`, `jbyte`, `jchar`, `jshort`) and as comparison results.

/// Native IR type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    /// Comparison result
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Opaque pointer (JNI references, method/field ids, the environment)
    Ptr,
}

impl std::fmt::Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "float"),
            IrType::F64 => write!(f, "double"),
            IrType::Ptr => write!(f, "ptr"),
        }
    }
}
