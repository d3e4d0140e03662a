//! Constant pool
//!
//! Entries are kept exactly as parsed (UTF-8 entries as raw modified-UTF-8
//! bytes, floats as bit patterns) so an untouched pool re-serializes byte for
//! byte. New entries are only ever appended.

use super::ClassFormatError;

// Constant pool tags
pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// A constant pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Index 0 and the slot following a long/double
    Unusable,
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE bits
    Float(u32),
    Long(i64),
    /// IEEE bits
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// Whether this entry occupies two pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Kind of a resolved member reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub kind: MemberKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// A constant usable by `ldc`, `ldc_w` and `ldc2_w`
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
    MethodType,
    MethodHandle,
    Dynamic,
}

/// The constant pool of one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
        }
    }

    /// Build from parsed entries (entry 0 must be `Unusable`)
    pub(crate) fn from_entries(entries: Vec<Constant>) -> Self {
        ConstantPool { entries }
    }

    /// Value of `constant_pool_count`
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    pub fn get(&self, index: u16) -> Result<&Constant, ClassFormatError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFormatError::BadConstantIndex(index)),
            Some(c) => Ok(c),
        }
    }

    pub fn utf8_bytes(&self, index: u16) -> Result<&[u8], ClassFormatError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(wrong_kind(index, "Utf8")),
        }
    }

    /// Decode a UTF-8 entry
    pub fn utf8(&self, index: u16) -> Result<String, ClassFormatError> {
        decode_modified_utf8(self.utf8_bytes(index)?)
            .ok_or(ClassFormatError::BadUtf8(index))
    }

    /// Internal name of a `Class` entry
    pub fn class_name(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(wrong_kind(index, "Class")),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String), ClassFormatError> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(wrong_kind(index, "NameAndType")),
        }
    }

    /// Resolve a `Fieldref`, `Methodref` or `InterfaceMethodref`
    pub fn member_ref(&self, index: u16) -> Result<MemberRef, ClassFormatError> {
        let (kind, class, nat) = match self.get(index)? {
            Constant::Fieldref { class, name_and_type } => (MemberKind::Field, *class, *name_and_type),
            Constant::Methodref { class, name_and_type } => (MemberKind::Method, *class, *name_and_type),
            Constant::InterfaceMethodref { class, name_and_type } => {
                (MemberKind::InterfaceMethod, *class, *name_and_type)
            }
            _ => return Err(wrong_kind(index, "member reference")),
        };
        let owner = self.class_name(class)?;
        let (name, descriptor) = self.name_and_type(nat)?;
        Ok(MemberRef {
            kind,
            owner,
            name,
            descriptor,
        })
    }

    /// Resolve an `ldc` operand
    pub fn loadable(&self, index: u16) -> Result<Loadable, ClassFormatError> {
        Ok(match self.get(index)? {
            Constant::Integer(v) => Loadable::Int(*v),
            Constant::Float(bits) => Loadable::Float(f32::from_bits(*bits)),
            Constant::Long(v) => Loadable::Long(*v),
            Constant::Double(bits) => Loadable::Double(f64::from_bits(*bits)),
            Constant::String(utf8) => Loadable::String(self.utf8(*utf8)?),
            Constant::Class(name) => Loadable::Class(self.utf8(*name)?),
            Constant::MethodType(_) => Loadable::MethodType,
            Constant::MethodHandle { .. } => Loadable::MethodHandle,
            Constant::Dynamic { .. } => Loadable::Dynamic,
            _ => return Err(wrong_kind(index, "loadable constant")),
        })
    }

    // ===== Interning =====

    fn find(&self, constant: &Constant) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| c == constant)
            .map(|i| i as u16)
    }

    /// Append a constant, or return the index of an equal existing one
    pub fn intern(&mut self, constant: Constant) -> Result<u16, ClassFormatError> {
        if let Some(index) = self.find(&constant) {
            return Ok(index);
        }
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > u16::MAX as usize {
            return Err(ClassFormatError::PoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16, ClassFormatError> {
        self.intern(Constant::Utf8(encode_modified_utf8(value)))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16, ClassFormatError> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_string(&mut self, value: &str) -> Result<u16, ClassFormatError> {
        let utf8 = self.intern_utf8(value)?;
        self.intern(Constant::String(utf8))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassFormatError> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn intern_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16, ClassFormatError> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::Fieldref { class, name_and_type })
    }

    /// `Methodref`, or `InterfaceMethodref` when `interface` is set
    pub fn intern_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16, ClassFormatError> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        if interface {
            self.intern(Constant::InterfaceMethodref { class, name_and_type })
        } else {
            self.intern(Constant::Methodref { class, name_and_type })
        }
    }
}

fn wrong_kind(index: u16, expected: &'static str) -> ClassFormatError {
    ClassFormatError::WrongConstantKind { index, expected }
}

/// Encode a string in the JVM's modified UTF-8 (NUL as `C0 80`,
/// supplementary characters as surrogate pairs).
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

/// Decode modified UTF-8; `None` on malformed input
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.is_ascii() && !bytes.contains(&0) {
        return String::from_utf8(bytes.to_vec()).ok();
    }
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)?;
            units.push((((b & 0x1f) as u16) << 6) | (b2 & 0x3f) as u16);
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            units.push((((b & 0x0f) as u16) << 12) | (((b2 & 0x3f) as u16) << 6) | (b3 & 0x3f) as u16);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}
