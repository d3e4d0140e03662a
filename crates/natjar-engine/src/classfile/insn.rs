//! Method body decoder
//!
//! Decodes a `Code` array into instructions with typed operands. Branch
//! operands are resolved to absolute offsets; `wide` prefixes are folded into
//! the instruction they modify.

use super::opcode::Opcode;

/// Error during code decoding
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid opcode byte {byte:#x} at offset {offset}")]
    InvalidOpcode { byte: u8, offset: usize },
    #[error("Unexpected end of code at offset {0}")]
    UnexpectedEnd(usize),
    #[error("Opcode {opcode} cannot follow wide at offset {offset}")]
    InvalidWide { opcode: Opcode, offset: usize },
    #[error("Branch at offset {offset} leaves the method")]
    BranchOutOfRange { offset: usize },
    #[error("Malformed switch at offset {offset}")]
    BadSwitch { offset: usize },
}

/// A decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset in the code array
    pub offset: u32,
    pub opcode: Opcode,
    pub operand: Operand,
    /// Total encoded size, including any `wide` prefix
    pub size: u32,
}

/// Typed operands for each instruction format
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    /// `bipush`, `sipush`
    Int(i32),
    /// Explicit local slot (`iload n`, `astore n`, `ret n`, wide forms)
    Local(u16),
    /// Constant pool index (`ldc*`, field/method refs, `new`, `checkcast`, ...)
    Constant(u16),
    /// `invokeinterface` index and argument slot count
    Interface { index: u16, count: u8 },
    /// Absolute branch target
    Branch(u32),
    Iinc { local: u16, delta: i16 },
    /// `newarray` element type code
    ArrayType(u8),
    MultiArray { index: u16, dimensions: u8 },
    TableSwitch {
        default: u32,
        low: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
}

impl Instruction {
    /// Local slot accessed by a load/store, including the implicit `_n` forms
    pub fn local(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(slot) => Some(slot),
            Operand::Iinc { local, .. } => Some(local),
            _ => {
                let op = self.opcode as u8;
                match op {
                    0x1a..=0x2d => Some(((op - 0x1a) % 4) as u16),
                    0x3b..=0x4e => Some(((op - 0x3b) % 4) as u16),
                    _ => None,
                }
            }
        }
    }

    /// Offset of the next instruction
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Every explicit branch target of this instruction
    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::TableSwitch { default, targets, .. } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Operand::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, t)| *t));
                all
            }
            _ => vec![],
        }
    }
}

/// Decode a complete code array
pub fn decode_code(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut instrs = Vec::new();
    let mut pos = 0;

    while pos < code.len() {
        let offset = pos;
        let byte = code[pos];
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode { byte, offset })?;
        pos += 1;

        let (opcode, operand) = if opcode == Opcode::Wide {
            decode_wide(code, &mut pos, offset)?
        } else {
            (opcode, decode_operand(opcode, code, &mut pos, offset)?)
        };

        instrs.push(Instruction {
            offset: offset as u32,
            opcode,
            operand,
            size: (pos - offset) as u32,
        });
    }

    Ok(instrs)
}

fn decode_operand(
    opcode: Opcode,
    code: &[u8],
    pos: &mut usize,
    offset: usize,
) -> Result<Operand, DecodeError> {
    use Opcode::*;

    match opcode {
        Bipush => Ok(Operand::Int(read_u8(code, pos, offset)? as i8 as i32)),
        Sipush => Ok(Operand::Int(read_u16(code, pos, offset)? as i16 as i32)),

        Ldc => Ok(Operand::Constant(read_u8(code, pos, offset)? as u16)),
        LdcW | Ldc2W | Getstatic | Putstatic | Getfield | Putfield | Invokevirtual
        | Invokespecial | Invokestatic | New | Anewarray | Checkcast | Instanceof => {
            Ok(Operand::Constant(read_u16(code, pos, offset)?))
        }

        Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore | Dstore | Astore
        | Ret => Ok(Operand::Local(read_u8(code, pos, offset)? as u16)),

        Iinc => {
            let local = read_u8(code, pos, offset)? as u16;
            let delta = read_u8(code, pos, offset)? as i8 as i16;
            Ok(Operand::Iinc { local, delta })
        }

        Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge
        | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne | Goto | Jsr | Ifnull | Ifnonnull => {
            let rel = read_u16(code, pos, offset)? as i16 as i64;
            Ok(Operand::Branch(resolve(offset, rel, code.len())?))
        }
        GotoW | JsrW => {
            let rel = read_u32(code, pos, offset)? as i32 as i64;
            Ok(Operand::Branch(resolve(offset, rel, code.len())?))
        }

        Invokeinterface => {
            let index = read_u16(code, pos, offset)?;
            let count = read_u8(code, pos, offset)?;
            read_u8(code, pos, offset)?;
            Ok(Operand::Interface { index, count })
        }
        Invokedynamic => {
            let index = read_u16(code, pos, offset)?;
            read_u16(code, pos, offset)?;
            Ok(Operand::Constant(index))
        }

        Newarray => Ok(Operand::ArrayType(read_u8(code, pos, offset)?)),
        Multianewarray => {
            let index = read_u16(code, pos, offset)?;
            let dimensions = read_u8(code, pos, offset)?;
            Ok(Operand::MultiArray { index, dimensions })
        }

        Tableswitch => {
            skip_padding(code, pos, offset)?;
            let default = read_u32(code, pos, offset)? as i32 as i64;
            let low = read_u32(code, pos, offset)? as i32;
            let high = read_u32(code, pos, offset)? as i32;
            if high < low {
                return Err(DecodeError::BadSwitch { offset });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            if count > code.len() {
                return Err(DecodeError::BadSwitch { offset });
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                let rel = read_u32(code, pos, offset)? as i32 as i64;
                targets.push(resolve(offset, rel, code.len())?);
            }
            Ok(Operand::TableSwitch {
                default: resolve(offset, default, code.len())?,
                low,
                targets,
            })
        }
        Lookupswitch => {
            skip_padding(code, pos, offset)?;
            let default = read_u32(code, pos, offset)? as i32 as i64;
            let npairs = read_u32(code, pos, offset)? as i32;
            if npairs < 0 || npairs as usize > code.len() {
                return Err(DecodeError::BadSwitch { offset });
            }
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let key = read_u32(code, pos, offset)? as i32;
                let rel = read_u32(code, pos, offset)? as i32 as i64;
                pairs.push((key, resolve(offset, rel, code.len())?));
            }
            Ok(Operand::LookupSwitch {
                default: resolve(offset, default, code.len())?,
                pairs,
            })
        }

        _ => Ok(Operand::None),
    }
}

fn decode_wide(code: &[u8], pos: &mut usize, offset: usize) -> Result<(Opcode, Operand), DecodeError> {
    use Opcode::*;

    let byte = read_u8(code, pos, offset)?;
    let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode { byte, offset: offset + 1 })?;
    match opcode {
        Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore | Dstore | Astore
        | Ret => Ok((opcode, Operand::Local(read_u16(code, pos, offset)?))),
        Iinc => {
            let local = read_u16(code, pos, offset)?;
            let delta = read_u16(code, pos, offset)? as i16;
            Ok((opcode, Operand::Iinc { local, delta }))
        }
        _ => Err(DecodeError::InvalidWide { opcode, offset }),
    }
}

fn skip_padding(code: &[u8], pos: &mut usize, offset: usize) -> Result<(), DecodeError> {
    while *pos % 4 != 0 {
        read_u8(code, pos, offset)?;
    }
    Ok(())
}

fn resolve(offset: usize, relative: i64, len: usize) -> Result<u32, DecodeError> {
    let target = offset as i64 + relative;
    if target < 0 || target as usize >= len {
        return Err(DecodeError::BranchOutOfRange { offset });
    }
    Ok(target as u32)
}

fn read_u8(code: &[u8], pos: &mut usize, offset: usize) -> Result<u8, DecodeError> {
    if *pos >= code.len() {
        return Err(DecodeError::UnexpectedEnd(offset));
    }
    let v = code[*pos];
    *pos += 1;
    Ok(v)
}

fn read_u16(code: &[u8], pos: &mut usize, offset: usize) -> Result<u16, DecodeError> {
    if *pos + 2 > code.len() {
        return Err(DecodeError::UnexpectedEnd(offset));
    }
    let v = u16::from_be_bytes([code[*pos], code[*pos + 1]]);
    *pos += 2;
    Ok(v)
}

fn read_u32(code: &[u8], pos: &mut usize, offset: usize) -> Result<u32, DecodeError> {
    if *pos + 4 > code.len() {
        return Err(DecodeError::UnexpectedEnd(offset));
    }
    let v = u32::from_be_bytes([code[*pos], code[*pos + 1], code[*pos + 2], code[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty() {
        assert!(decode_code(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_add() {
        // iload_0 iload_1 iadd ireturn
        let instrs = decode_code(&[0x1a, 0x1b, 0x60, 0xac]).unwrap();
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[0].opcode, Opcode::Iload0);
        assert_eq!(instrs[0].local(), Some(0));
        assert_eq!(instrs[1].local(), Some(1));
        assert_eq!(instrs[2].opcode, Opcode::Iadd);
        assert_eq!(instrs[3].offset, 3);
    }

    #[test]
    fn test_implicit_store_slots() {
        // astore_3 dstore_2
        let instrs = decode_code(&[0x4e, 0x49]).unwrap();
        assert_eq!(instrs[0].local(), Some(3));
        assert_eq!(instrs[1].local(), Some(2));
    }

    #[test]
    fn test_decode_branch_is_absolute() {
        // 0: iconst_0  1: ifeq +4 -> 5  4: nop  5: return
        let instrs = decode_code(&[0x03, 0x99, 0x00, 0x04, 0x00, 0xb1]).unwrap();
        assert_eq!(instrs[1].operand, Operand::Branch(5));
        assert_eq!(instrs[1].size, 3);
    }

    #[test]
    fn test_decode_backward_branch() {
        // 0: nop  1: goto -1 -> 0
        let instrs = decode_code(&[0x00, 0xa7, 0xff, 0xff]).unwrap();
        assert_eq!(instrs[1].operand, Operand::Branch(0));
    }

    #[test]
    fn test_branch_out_of_range() {
        let result = decode_code(&[0xa7, 0x00, 0x10]);
        assert!(matches!(result, Err(DecodeError::BranchOutOfRange { offset: 0 })));
    }

    #[test]
    fn test_decode_wide_iinc() {
        // wide iinc 300 -2 ; return
        let instrs = decode_code(&[0xc4, 0x84, 0x01, 0x2c, 0xff, 0xfe, 0xb1]).unwrap();
        assert_eq!(instrs[0].opcode, Opcode::Iinc);
        assert_eq!(instrs[0].operand, Operand::Iinc { local: 300, delta: -2 });
        assert_eq!(instrs[0].size, 6);
        assert_eq!(instrs[1].offset, 6);
    }

    #[test]
    fn test_decode_tableswitch_padding() {
        // 0: iconst_0  1: tableswitch (pad to 4) default=+19 low=0 high=0 [ +19 ]  20: return
        let mut code = vec![0x03, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&19i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&19i32.to_be_bytes());
        code.push(0xb1);
        let instrs = decode_code(&code).unwrap();
        assert_eq!(instrs.len(), 3);
        match &instrs[1].operand {
            Operand::TableSwitch { default, low, targets } => {
                assert_eq!(*default, 20);
                assert_eq!(*low, 0);
                assert_eq!(targets, &vec![20]);
            }
            other => panic!("expected tableswitch, got {:?}", other),
        }
        assert_eq!(instrs[2].offset, 20);
    }

    #[test]
    fn test_invalid_opcode() {
        assert!(matches!(
            decode_code(&[0xfe]),
            Err(DecodeError::InvalidOpcode { byte: 0xfe, offset: 0 })
        ));
    }

    #[test]
    fn test_truncated_operand() {
        assert!(matches!(decode_code(&[0x11, 0x00]), Err(DecodeError::UnexpectedEnd(0))));
    }
}
