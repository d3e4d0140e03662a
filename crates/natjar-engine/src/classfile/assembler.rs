//! Bytecode assembler for synthesized method bodies
//!
//! Branches are emitted against labels and patched once every label is bound.

use super::opcode::Opcode;
use super::{Code, ExceptionEntry};

/// A position in the code array, bound later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Errors while assembling
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("Label {0} was never bound")]
    UnboundLabel(usize),
    #[error("Branch from {from} to {to} does not fit in 16 bits")]
    BranchTooFar { from: usize, to: usize },
}

struct Fixup {
    /// Offset of the branch opcode
    instr: usize,
    /// Offset of the 16-bit operand
    at: usize,
    label: Label,
}

struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
}

/// Emits bytecode with forward and backward label references
#[derive(Default)]
pub struct CodeAssembler {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    handlers: Vec<PendingHandler>,
}

impl CodeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current code offset
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current offset
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode as u8);
        self
    }

    pub fn op_u8(&mut self, opcode: Opcode, operand: u8) -> &mut Self {
        self.code.push(opcode as u8);
        self.code.push(operand);
        self
    }

    pub fn op_u16(&mut self, opcode: Opcode, operand: u16) -> &mut Self {
        self.code.push(opcode as u8);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    /// Load a constant pool entry, choosing `ldc` or `ldc_w`
    pub fn ldc(&mut self, index: u16) -> &mut Self {
        if index <= u8::MAX as u16 {
            self.op_u8(Opcode::Ldc, index as u8)
        } else {
            self.op_u16(Opcode::LdcW, index)
        }
    }

    /// Push a small int constant with the shortest encoding
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.op(Opcode::from_u8((Opcode::Iconst0 as i32 + value) as u8).unwrap_or(Opcode::Iconst0)),
            -128..=127 => self.op_u8(Opcode::Bipush, value as i8 as u8),
            _ => self.op_u16(Opcode::Sipush, value as i16 as u16),
        }
    }

    /// Emit a typed local load/store, using the `_n` forms when possible.
    /// `base` is the explicit form (e.g. `Iload`), `short_base` the `_0` form.
    pub fn local(&mut self, base: Opcode, short_base: Opcode, slot: u16) -> &mut Self {
        if slot < 4 {
            let op = Opcode::from_u8(short_base as u8 + slot as u8).unwrap_or(base);
            self.op(op)
        } else if slot <= u8::MAX as u16 {
            self.op_u8(base, slot as u8)
        } else {
            self.code.push(Opcode::Wide as u8);
            self.op_u16(base, slot)
        }
    }

    pub fn invokeinterface(&mut self, index: u16, arg_slots: u8) -> &mut Self {
        self.op_u16(Opcode::Invokeinterface, index);
        self.code.push(arg_slots);
        self.code.push(0);
        self
    }

    /// Emit a 16-bit branch to `label`
    pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        let instr = self.code.len();
        self.code.push(opcode as u8);
        self.fixups.push(Fixup {
            instr,
            at: self.code.len(),
            label,
        });
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// Register an exception table row
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: u16) {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    fn resolve(&self, label: Label) -> Result<usize, AssembleError> {
        self.labels[label.0].ok_or(AssembleError::UnboundLabel(label.0))
    }

    /// Patch branches and produce a `Code` attribute
    pub fn finish(
        mut self,
        name_index: u16,
        max_stack: u16,
        max_locals: u16,
    ) -> Result<Code, AssembleError> {
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0].ok_or(AssembleError::UnboundLabel(fixup.label.0))?;
            let rel = target as i64 - fixup.instr as i64;
            if rel < i16::MIN as i64 || rel > i16::MAX as i64 {
                return Err(AssembleError::BranchTooFar {
                    from: fixup.instr,
                    to: target,
                });
            }
            let bytes = (rel as i16).to_be_bytes();
            self.code[fixup.at] = bytes[0];
            self.code[fixup.at + 1] = bytes[1];
        }

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for h in &self.handlers {
            exception_table.push(ExceptionEntry {
                start_pc: self.resolve(h.start)? as u16,
                end_pc: self.resolve(h.end)? as u16,
                handler_pc: self.resolve(h.handler)? as u16,
                catch_type: h.catch_type,
            });
        }

        Ok(Code {
            name_index,
            max_stack,
            max_locals,
            code: self.code,
            exception_table,
            attributes: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::insn::{decode_code, Operand};

    #[test]
    fn test_forward_and_backward_branches() {
        let mut asm = CodeAssembler::new();
        let top = asm.new_label();
        let out = asm.new_label();
        asm.bind(top);
        asm.op(Opcode::Iload0);
        asm.branch(Opcode::Ifeq, out);
        asm.branch(Opcode::Goto, top);
        asm.bind(out);
        asm.op(Opcode::Return);

        let code = asm.finish(1, 1, 1).unwrap();
        let instrs = decode_code(&code.code).unwrap();
        assert_eq!(instrs[1].operand, Operand::Branch(7));
        assert_eq!(instrs[2].operand, Operand::Branch(0));
    }

    #[test]
    fn test_unbound_label() {
        let mut asm = CodeAssembler::new();
        let nowhere = asm.new_label();
        asm.branch(Opcode::Goto, nowhere);
        assert!(matches!(asm.finish(1, 0, 0), Err(AssembleError::UnboundLabel(0))));
    }

    #[test]
    fn test_short_forms() {
        let mut asm = CodeAssembler::new();
        asm.iconst(-1).iconst(5).iconst(100).iconst(1000);
        asm.local(Opcode::Lload, Opcode::Lload0, 2);
        asm.local(Opcode::Aload, Opcode::Aload0, 9);
        asm.local(Opcode::Istore, Opcode::Istore0, 300);
        let code = asm.finish(1, 4, 400).unwrap();
        let instrs = decode_code(&code.code).unwrap();
        let ops: Vec<Opcode> = instrs.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::IconstM1,
                Opcode::Iconst5,
                Opcode::Bipush,
                Opcode::Sipush,
                Opcode::Lload2,
                Opcode::Aload,
                Opcode::Istore
            ]
        );
        assert_eq!(instrs[6].operand, Operand::Local(300));
    }
}
