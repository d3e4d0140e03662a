//! Class-file parsing

use super::constants::*;
use super::{Attribute, ClassFile, ClassFormatError, Code, ExceptionEntry, FieldInfo, MethodInfo};

const MAGIC: u32 = 0xCAFE_BABE;

/// Big-endian cursor over class-file bytes
pub struct ClassReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    pub fn read_u8(&mut self) -> Result<u8, ClassFormatError> {
        let value = *self
            .buffer
            .get(self.position)
            .ok_or(ClassFormatError::UnexpectedEnd(self.position))?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, ClassFormatError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ClassFormatError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, ClassFormatError> {
        let hi = self.read_u32()? as u64;
        let lo = self.read_u32()? as u64;
        Ok((hi << 32) | lo)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        if self.position + len > self.buffer.len() {
            return Err(ClassFormatError::UnexpectedEnd(self.position));
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }
}

impl ClassFile {
    /// Parse a class file
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
        let mut reader = ClassReader::new(bytes);

        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        let pool = read_constant_pool(&mut reader)?;

        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;

        let interface_count = reader.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(reader.read_u16()?);
        }

        let field_count = reader.read_u16()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(FieldInfo {
                access_flags: reader.read_u16()?,
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
                attributes: read_attributes(&mut reader, &pool, false)?,
            });
        }

        let method_count = reader.read_u16()? as usize;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(MethodInfo {
                access_flags: reader.read_u16()?,
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
                attributes: read_attributes(&mut reader, &pool, true)?,
            });
        }

        let attributes = read_attributes(&mut reader, &pool, false)?;

        if reader.remaining() != 0 {
            return Err(ClassFormatError::Malformed(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

fn read_constant_pool(reader: &mut ClassReader<'_>) -> Result<ConstantPool, ClassFormatError> {
    let count = reader.read_u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(Constant::Unusable);

    let mut index = 1u16;
    while index < count {
        let tag = reader.read_u8()?;
        let constant = match tag {
            TAG_UTF8 => {
                let len = reader.read_u16()? as usize;
                Constant::Utf8(reader.read_bytes(len)?.to_vec())
            }
            TAG_INTEGER => Constant::Integer(reader.read_u32()? as i32),
            TAG_FLOAT => Constant::Float(reader.read_u32()?),
            TAG_LONG => Constant::Long(reader.read_u64()? as i64),
            TAG_DOUBLE => Constant::Double(reader.read_u64()?),
            TAG_CLASS => Constant::Class(reader.read_u16()?),
            TAG_STRING => Constant::String(reader.read_u16()?),
            TAG_FIELDREF => Constant::Fieldref {
                class: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            TAG_METHODREF => Constant::Methodref {
                class: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            TAG_INTERFACE_METHODREF => Constant::InterfaceMethodref {
                class: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            TAG_NAME_AND_TYPE => Constant::NameAndType {
                name: reader.read_u16()?,
                descriptor: reader.read_u16()?,
            },
            TAG_METHOD_HANDLE => Constant::MethodHandle {
                kind: reader.read_u8()?,
                reference: reader.read_u16()?,
            },
            TAG_METHOD_TYPE => Constant::MethodType(reader.read_u16()?),
            TAG_DYNAMIC => Constant::Dynamic {
                bootstrap: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            TAG_MODULE => Constant::Module(reader.read_u16()?),
            TAG_PACKAGE => Constant::Package(reader.read_u16()?),
            _ => return Err(ClassFormatError::BadConstantTag { tag, index }),
        };

        let wide = constant.is_wide();
        entries.push(constant);
        index += 1;
        if wide {
            entries.push(Constant::Unusable);
            index += 1;
        }
    }

    if entries.len() != count as usize {
        return Err(ClassFormatError::Malformed(
            "wide constant overruns the constant pool".to_string(),
        ));
    }

    Ok(ConstantPool::from_entries(entries))
}

fn read_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    in_method: bool,
) -> Result<Vec<Attribute>, ClassFormatError> {
    let count = reader.read_u16()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let data = reader.read_bytes(len)?;

        let is_code = in_method && pool.utf8_bytes(name_index).map_or(false, |n| n == b"Code");
        if is_code {
            attributes.push(Attribute::Code(read_code(name_index, data, pool)?));
        } else {
            attributes.push(Attribute::Raw {
                name_index,
                data: data.to_vec(),
            });
        }
    }
    Ok(attributes)
}

fn read_code(name_index: u16, data: &[u8], pool: &ConstantPool) -> Result<Code, ClassFormatError> {
    let mut reader = ClassReader::new(data);
    let max_stack = reader.read_u16()?;
    let max_locals = reader.read_u16()?;
    let code_len = reader.read_u32()? as usize;
    let code = reader.read_bytes(code_len)?.to_vec();

    let table_len = reader.read_u16()? as usize;
    let mut exception_table = Vec::with_capacity(table_len);
    for _ in 0..table_len {
        exception_table.push(ExceptionEntry {
            start_pc: reader.read_u16()?,
            end_pc: reader.read_u16()?,
            handler_pc: reader.read_u16()?,
            catch_type: reader.read_u16()?,
        });
    }

    let attributes = read_attributes(&mut reader, pool, false)?;
    if reader.remaining() != 0 {
        return Err(ClassFormatError::Malformed(
            "Code attribute length mismatch".to_string(),
        ));
    }

    Ok(Code {
        name_index,
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_magic() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52];
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFormatError::BadMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0];
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFormatError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_reader_big_endian() {
        let mut reader = ClassReader::new(&[0x12, 0x34, 0x00, 0x00, 0x00, 0x2a]);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.remaining(), 0);
    }
}
