//! JVM class-file codec
//!
//! Just enough of the class-file format to read a program, decode method
//! bodies, synthesize new members and classes, and write the result back:
//! - `reader` / `writer`: parse and exact re-serialization
//! - `annotations`: annotation types on classes and methods
//! - `constants`: the constant pool with interning
//! - `opcode` / `insn`: the instruction set and decoder
//! - `descriptor`: field and method descriptors
//! - `assembler` / `builder`: emitting new code and classes
//! - `shift`: inserting a prefix in front of existing code

pub mod annotations;
pub mod assembler;
pub mod builder;
pub mod constants;
pub mod descriptor;
pub mod insn;
pub mod opcode;
pub mod reader;
pub mod shift;
pub mod writer;

pub use annotations::annotation_types;
pub use assembler::{AssembleError, CodeAssembler, Label};
pub use builder::ClassBuilder;
pub use constants::{Constant, ConstantPool, Loadable, MemberKind, MemberRef};
pub use descriptor::{FieldType, MethodDescriptor};
pub use insn::{decode_code, DecodeError, Instruction, Operand};
pub use opcode::Opcode;

/// Access flags
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const SUPER: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const BRIDGE: u16 = 0x0040;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
}

/// Errors raised while reading or manipulating class files
#[derive(Debug, thiserror::Error)]
pub enum ClassFormatError {
    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("Unexpected end of class file at offset {0}")]
    UnexpectedEnd(usize),
    #[error("Unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: u16 },
    #[error("Invalid constant pool index {0}")]
    BadConstantIndex(u16),
    #[error("Constant pool entry {index} is not a {expected}")]
    WrongConstantKind { index: u16, expected: &'static str },
    #[error("Malformed modified UTF-8 in constant {0}")]
    BadUtf8(u16),
    #[error("Constant pool overflow")]
    PoolOverflow,
    #[error("Invalid descriptor: {0}")]
    BadDescriptor(String),
    #[error("Invalid code")]
    Decode(#[from] DecodeError),
    #[error("Malformed class file: {0}")]
    Malformed(String),
}

/// A parsed class file
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Internal name of this class
    pub fn name(&self) -> Result<String, ClassFormatError> {
        self.pool.class_name(self.this_class)
    }

    /// Internal name of the superclass (`None` for `java/lang/Object`)
    pub fn super_name(&self) -> Result<Option<String>, ClassFormatError> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            self.pool.class_name(self.super_class).map(Some)
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::INTERFACE != 0
    }

    pub fn method_name(&self, method: &MethodInfo) -> Result<String, ClassFormatError> {
        self.pool.utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &MethodInfo) -> Result<String, ClassFormatError> {
        self.pool.utf8(method.descriptor_index)
    }

    /// Position of the method with the given name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            self.pool.utf8(m.name_index).map_or(false, |n| n == name)
                && self.pool.utf8(m.descriptor_index).map_or(false, |d| d == descriptor)
        })
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

/// A method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.attributes.iter_mut().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & access::STATIC != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & access::NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ABSTRACT != 0
    }
}

/// An attribute. Only method `Code` attributes are parsed; everything else is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Code(Code),
    Raw { name_index: u16, data: Vec<u8> },
}

/// The `Code` attribute of a method
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub name_index: u16,
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<Attribute>,
}

/// One row of a method's exception table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// 0 for catch-all (`finally`)
    pub catch_type: u16,
}
