//! Prefix insertion for existing method bodies
//!
//! Inserting `n` bytes at offset 0 leaves every relative branch intact but
//! moves every absolute offset recorded next to the code. `n` must be a
//! multiple of 4 so `tableswitch`/`lookupswitch` padding is unchanged.

use super::reader::ClassReader;
use super::writer::ClassWriter;
use super::{Attribute, ClassFormatError, Code, ConstantPool};

const MAX_CODE_LEN: usize = 65535;

/// Insert `prefix` in front of `code`, shifting exception ranges, line and
/// local-variable tables and stack-map frames. Type-annotation attributes,
/// whose offsets are not rewritten, are dropped.
pub fn prepend_code(code: &mut Code, pool: &ConstantPool, prefix: &[u8]) -> Result<(), ClassFormatError> {
    if prefix.len() % 4 != 0 {
        return Err(ClassFormatError::Malformed(format!(
            "code prefix of {} bytes would break switch alignment",
            prefix.len()
        )));
    }
    if code.code.len() + prefix.len() > MAX_CODE_LEN {
        return Err(ClassFormatError::Malformed("code too large after prefix insertion".into()));
    }
    let delta = prefix.len() as u16;

    let mut bytes = Vec::with_capacity(prefix.len() + code.code.len());
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(&code.code);
    code.code = bytes;

    for entry in &mut code.exception_table {
        entry.start_pc += delta;
        entry.end_pc += delta;
        entry.handler_pc += delta;
    }

    let mut kept = Vec::with_capacity(code.attributes.len());
    for attribute in code.attributes.drain(..) {
        let (name_index, data) = match attribute {
            Attribute::Raw { name_index, data } => (name_index, data),
            other => {
                kept.push(other);
                continue;
            }
        };
        let name = pool.utf8(name_index)?;
        let data = match name.as_str() {
            "LineNumberTable" => shift_line_numbers(&data, delta)?,
            "LocalVariableTable" | "LocalVariableTypeTable" => shift_local_variables(&data, delta)?,
            "StackMapTable" => shift_stack_map(&data, delta)?,
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => continue,
            _ => data,
        };
        kept.push(Attribute::Raw { name_index, data });
    }
    code.attributes = kept;
    Ok(())
}

fn shift_line_numbers(data: &[u8], delta: u16) -> Result<Vec<u8>, ClassFormatError> {
    let mut r = ClassReader::new(data);
    let mut w = ClassWriter::new();
    let count = r.read_u16()?;
    w.emit_u16(count);
    for _ in 0..count {
        w.emit_u16(r.read_u16()? + delta);
        w.emit_u16(r.read_u16()?);
    }
    Ok(w.into_bytes())
}

fn shift_local_variables(data: &[u8], delta: u16) -> Result<Vec<u8>, ClassFormatError> {
    let mut r = ClassReader::new(data);
    let mut w = ClassWriter::new();
    let count = r.read_u16()?;
    w.emit_u16(count);
    for _ in 0..count {
        w.emit_u16(r.read_u16()? + delta);
        for _ in 0..4 {
            w.emit_u16(r.read_u16()?);
        }
    }
    Ok(w.into_bytes())
}

// ===== StackMapTable =====

const ITEM_OBJECT: u8 = 7;
const ITEM_UNINITIALIZED: u8 = 8;

#[derive(Debug, Clone, Copy)]
struct VType {
    tag: u8,
    data: u16,
}

enum FrameKind {
    Same,
    SameLocals1(VType),
    Chop(u8),
    Append(Vec<VType>),
    Full { locals: Vec<VType>, stack: Vec<VType> },
}

fn read_vtype(r: &mut ClassReader<'_>, delta: u16) -> Result<VType, ClassFormatError> {
    let tag = r.read_u8()?;
    let data = match tag {
        ITEM_OBJECT => r.read_u16()?,
        ITEM_UNINITIALIZED => r.read_u16()? + delta,
        0..=6 => 0,
        _ => return Err(ClassFormatError::Malformed(format!("bad verification type {}", tag))),
    };
    Ok(VType { tag, data })
}

fn write_vtype(w: &mut ClassWriter, v: VType) {
    w.emit_u8(v.tag);
    if v.tag == ITEM_OBJECT || v.tag == ITEM_UNINITIALIZED {
        w.emit_u16(v.data);
    }
}

fn read_vtypes(r: &mut ClassReader<'_>, n: usize, delta: u16) -> Result<Vec<VType>, ClassFormatError> {
    (0..n).map(|_| read_vtype(r, delta)).collect()
}

fn shift_stack_map(data: &[u8], delta: u16) -> Result<Vec<u8>, ClassFormatError> {
    let mut r = ClassReader::new(data);
    let count = r.read_u16()?;
    let mut w = ClassWriter::new();
    w.emit_u16(count);

    for i in 0..count {
        let frame_type = r.read_u8()?;
        let (mut offset_delta, kind) = match frame_type {
            0..=63 => (frame_type as u16, FrameKind::Same),
            64..=127 => ((frame_type - 64) as u16, FrameKind::SameLocals1(read_vtype(&mut r, delta)?)),
            247 => {
                let d = r.read_u16()?;
                (d, FrameKind::SameLocals1(read_vtype(&mut r, delta)?))
            }
            248..=250 => (r.read_u16()?, FrameKind::Chop(251 - frame_type)),
            251 => (r.read_u16()?, FrameKind::Same),
            252..=254 => {
                let d = r.read_u16()?;
                let k = (frame_type - 251) as usize;
                (d, FrameKind::Append(read_vtypes(&mut r, k, delta)?))
            }
            255 => {
                let d = r.read_u16()?;
                let nlocals = r.read_u16()? as usize;
                let locals = read_vtypes(&mut r, nlocals, delta)?;
                let nstack = r.read_u16()? as usize;
                let stack = read_vtypes(&mut r, nstack, delta)?;
                (d, FrameKind::Full { locals, stack })
            }
            _ => {
                return Err(ClassFormatError::Malformed(format!(
                    "reserved stack map frame type {}",
                    frame_type
                )))
            }
        };

        // Later frames are relative to the previous one
        if i == 0 {
            offset_delta += delta;
        }

        match kind {
            FrameKind::Same if offset_delta <= 63 => w.emit_u8(offset_delta as u8),
            FrameKind::Same => {
                w.emit_u8(251);
                w.emit_u16(offset_delta);
            }
            FrameKind::SameLocals1(v) if offset_delta <= 63 => {
                w.emit_u8(64 + offset_delta as u8);
                write_vtype(&mut w, v);
            }
            FrameKind::SameLocals1(v) => {
                w.emit_u8(247);
                w.emit_u16(offset_delta);
                write_vtype(&mut w, v);
            }
            FrameKind::Chop(k) => {
                w.emit_u8(251 - k);
                w.emit_u16(offset_delta);
            }
            FrameKind::Append(locals) => {
                w.emit_u8(251 + locals.len() as u8);
                w.emit_u16(offset_delta);
                for v in locals {
                    write_vtype(&mut w, v);
                }
            }
            FrameKind::Full { locals, stack } => {
                w.emit_u8(255);
                w.emit_u16(offset_delta);
                w.emit_u16(locals.len() as u16);
                for v in locals {
                    write_vtype(&mut w, v);
                }
                w.emit_u16(stack.len() as u16);
                for v in stack {
                    write_vtype(&mut w, v);
                }
            }
        }
    }

    if r.remaining() != 0 {
        return Err(ClassFormatError::Malformed("StackMapTable length mismatch".into()));
    }
    Ok(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ExceptionEntry;

    fn code_with(pool: &mut ConstantPool, attrs: Vec<(&str, Vec<u8>)>) -> Code {
        let attributes = attrs
            .into_iter()
            .map(|(name, data)| Attribute::Raw {
                name_index: pool.intern_utf8(name).unwrap(),
                data,
            })
            .collect();
        Code {
            name_index: pool.intern_utf8("Code").unwrap(),
            max_stack: 1,
            max_locals: 1,
            code: vec![0xb1],
            exception_table: vec![ExceptionEntry {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 1,
                catch_type: 0,
            }],
            attributes,
        }
    }

    fn raw<'a>(code: &'a Code, pool: &ConstantPool, name: &str) -> Option<&'a [u8]> {
        code.attributes.iter().find_map(|a| match a {
            Attribute::Raw { name_index, data } if pool.utf8(*name_index).unwrap() == name => Some(data.as_slice()),
            _ => None,
        })
    }

    #[test]
    fn test_shift_tables() {
        let mut pool = ConstantPool::new();
        let mut code = code_with(
            &mut pool,
            vec![
                ("LineNumberTable", vec![0, 1, 0, 0, 0, 7]),
                ("LocalVariableTable", vec![0, 1, 0, 0, 0, 1, 0, 9, 0, 9, 0, 0]),
                ("RuntimeVisibleTypeAnnotations", vec![0, 0]),
            ],
        );
        prepend_code(&mut code, &pool, &[0xb8, 0x00, 0x05, 0x00]).unwrap();

        assert_eq!(code.code, vec![0xb8, 0x00, 0x05, 0x00, 0xb1]);
        assert_eq!(code.exception_table[0].start_pc, 4);
        assert_eq!(code.exception_table[0].end_pc, 5);
        assert_eq!(code.exception_table[0].handler_pc, 5);
        assert_eq!(raw(&code, &pool, "LineNumberTable").unwrap(), &[0, 1, 0, 4, 0, 7]);
        assert_eq!(
            raw(&code, &pool, "LocalVariableTable").unwrap(),
            &[0, 1, 0, 4, 0, 1, 0, 9, 0, 9, 0, 0]
        );
        assert!(raw(&code, &pool, "RuntimeVisibleTypeAnnotations").is_none());
    }

    #[test]
    fn test_shift_stack_map_widens_compact_frames() {
        let mut pool = ConstantPool::new();
        // same_frame at 62, then same_locals_1_stack_item (+3) carrying Uninitialized(10)
        let mut code = code_with(
            &mut pool,
            vec![("StackMapTable", vec![0, 2, 62, 64 + 3, ITEM_UNINITIALIZED, 0, 10])],
        );
        prepend_code(&mut code, &pool, &[0, 0, 0, 0]).unwrap();
        assert_eq!(
            raw(&code, &pool, "StackMapTable").unwrap(),
            &[0, 2, 251, 0, 66, 64 + 3, ITEM_UNINITIALIZED, 0, 14]
        );
    }

    #[test]
    fn test_misaligned_prefix_rejected() {
        let mut pool = ConstantPool::new();
        let mut code = code_with(&mut pool, vec![]);
        assert!(prepend_code(&mut code, &pool, &[0, 0, 0]).is_err());
    }
}
