//! Field and method descriptors

use std::fmt;

use super::ClassFormatError;

/// A field type as written in a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Internal class name
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse exactly one field descriptor
    pub fn parse(descriptor: &str) -> Result<FieldType, ClassFormatError> {
        let (ty, rest) = parse_field(descriptor)
            .ok_or_else(|| ClassFormatError::BadDescriptor(descriptor.to_string()))?;
        if !rest.is_empty() {
            return Err(ClassFormatError::BadDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Occupies two local slots / stack words
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn slot_size(&self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Descriptor text
    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// Name usable with `FindClass` (internal name for objects, descriptor for arrays)
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Short => f.write_str("S"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Float => f.write_str("F"),
            FieldType::Double => f.write_str("D"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `void`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, ClassFormatError> {
        let bad = || ClassFormatError::BadDescriptor(descriptor.to_string());

        let mut rest = descriptor.strip_prefix('(').ok_or_else(bad)?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = parse_field(rest).ok_or_else(bad)?;
            params.push(ty);
            rest = tail;
        }
        rest = &rest[1..];

        let ret = if rest == "V" {
            None
        } else {
            Some(FieldType::parse(rest).map_err(|_| bad())?)
        };

        Ok(MethodDescriptor { params, ret })
    }

    /// Local slots taken by the parameters (excluding any receiver)
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_size).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ty) => write!(f, "{}", ty),
            None => f.write_str("V"),
        }
    }
}

fn parse_field(s: &str) -> Option<(FieldType, &str)> {
    let first = *s.as_bytes().first()?;
    let rest = &s[1..];
    let ty = match first {
        b'Z' => FieldType::Boolean,
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'S' => FieldType::Short,
        b'I' => FieldType::Int,
        b'J' => FieldType::Long,
        b'F' => FieldType::Float,
        b'D' => FieldType::Double,
        b'L' => {
            let end = rest.find(';')?;
            if end == 0 {
                return None;
            }
            return Some((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
        }
        b'[' => {
            let (elem, tail) = parse_field(rest)?;
            return Some((FieldType::Array(Box::new(elem)), tail));
        }
        _ => return None,
    };
    Some((ty, rest))
}
