//! Control-flow graph construction from decoded bytecode
//!
//! Splits a method's instructions into basic blocks. Block boundaries are
//! branch targets, instructions following a branch, switch or terminator, and
//! every offset named by the exception table, so each block lies entirely
//! inside or outside any protected range.

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::classfile::{ExceptionEntry, Instruction};

/// Error while building the graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CfgError {
    #[error("Method has no instructions")]
    Empty,
    #[error("Offset {0} is not an instruction boundary")]
    BadTarget(u32),
    #[error("Control falls off the end of the method")]
    FallsOffEnd,
}

/// A basic block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgBlock {
    /// Byte offset of the first instruction
    pub start_offset: u32,
    /// Indices into the decoded instruction array
    pub instrs: Range<usize>,
    /// Falls through to the following block
    pub falls_through: bool,
}

/// A control-flow graph over decoded bytecode
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub blocks: Vec<CfgBlock>,
    offset_to_block: FxHashMap<u32, usize>,
}

impl ControlFlowGraph {
    /// Block starting at `offset`
    pub fn block_at(&self, offset: u32) -> Result<usize, CfgError> {
        self.offset_to_block
            .get(&offset)
            .copied()
            .ok_or(CfgError::BadTarget(offset))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Build a control-flow graph from decoded instructions
pub fn build_cfg(instrs: &[Instruction], handlers: &[ExceptionEntry]) -> Result<ControlFlowGraph, CfgError> {
    if instrs.is_empty() {
        return Err(CfgError::Empty);
    }
    let code_end = instrs[instrs.len() - 1].next_offset();

    let mut offset_to_instr: FxHashMap<u32, usize> = FxHashMap::default();
    for (i, instr) in instrs.iter().enumerate() {
        offset_to_instr.insert(instr.offset, i);
    }

    // Step 1: Collect block start offsets
    let mut starts = vec![instrs[0].offset];
    for instr in instrs {
        starts.extend(instr.branch_targets());
        let op = instr.opcode;
        if (op.is_terminator() || op.is_conditional_branch()) && instr.next_offset() < code_end {
            starts.push(instr.next_offset());
        }
    }
    for entry in handlers {
        starts.push(entry.start_pc as u32);
        starts.push(entry.handler_pc as u32);
        if (entry.end_pc as u32) < code_end {
            starts.push(entry.end_pc as u32);
        }
    }
    starts.sort_unstable();
    starts.dedup();

    // Step 2: Every start must be an instruction boundary
    let mut start_indices = Vec::with_capacity(starts.len());
    for &offset in &starts {
        let index = offset_to_instr.get(&offset).copied().ok_or(CfgError::BadTarget(offset))?;
        start_indices.push(index);
    }

    // Step 3: Create blocks over consecutive instruction ranges
    let mut blocks = Vec::with_capacity(starts.len());
    let mut offset_to_block = FxHashMap::default();
    for (idx, &first) in start_indices.iter().enumerate() {
        let end = start_indices.get(idx + 1).copied().unwrap_or(instrs.len());
        let last = &instrs[end - 1];
        let falls_through = !last.opcode.is_terminator();
        if falls_through && end == instrs.len() {
            return Err(CfgError::FallsOffEnd);
        }
        offset_to_block.insert(starts[idx], idx);
        blocks.push(CfgBlock {
            start_offset: starts[idx],
            instrs: first..end,
            falls_through,
        });
    }

    Ok(ControlFlowGraph { blocks, offset_to_block })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{decode_code, Opcode};

    fn decode(code: &[u8]) -> Vec<Instruction> {
        decode_code(code).unwrap()
    }

    #[test]
    fn test_straight_line() {
        // iload_0; iload_1; iadd; ireturn
        let instrs = decode(&[0x1a, 0x1b, 0x60, 0xac]);
        let cfg = build_cfg(&instrs, &[]).unwrap();
        assert_eq!(cfg.len(), 1);
        assert_eq!(cfg.blocks[0].instrs, 0..4);
        assert!(!cfg.blocks[0].falls_through);
    }

    #[test]
    fn test_conditional_branch() {
        // 0: iload_0; 1: ifeq +5 (6); 4: iconst_1; 5: ireturn; 6: iconst_0; 7: ireturn
        let instrs = decode(&[0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]);
        let cfg = build_cfg(&instrs, &[]).unwrap();
        let starts: Vec<u32> = cfg.blocks.iter().map(|b| b.start_offset).collect();
        assert_eq!(starts, vec![0, 4, 6]);
        assert!(cfg.blocks[0].falls_through);
        assert_eq!(cfg.block_at(6), Ok(2));
        assert_eq!(cfg.block_at(5), Err(CfgError::BadTarget(5)));
        assert_eq!(instrs[cfg.blocks[0].instrs.end - 1].opcode, Opcode::Ifeq);
    }

    #[test]
    fn test_exception_table_splits_blocks() {
        // 0: aload_0; 1: athrow; 2: astore_1; 3: return
        let instrs = decode(&[0x2a, 0xbf, 0x4c, 0xb1]);
        let handlers = [ExceptionEntry {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 2,
            catch_type: 0,
        }];
        let cfg = build_cfg(&instrs, &handlers).unwrap();
        let starts: Vec<u32> = cfg.blocks.iter().map(|b| b.start_offset).collect();
        assert_eq!(starts, vec![0, 2]);
    }

    #[test]
    fn test_falls_off_end() {
        // iconst_0; pop
        let instrs = decode(&[0x03, 0x57]);
        assert_eq!(build_cfg(&instrs, &[]).unwrap_err(), CfgError::FallsOffEnd);
        assert_eq!(build_cfg(&[], &[]).unwrap_err(), CfgError::Empty);
    }
}
