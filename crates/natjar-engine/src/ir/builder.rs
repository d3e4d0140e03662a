//! Instruction builder
//!
//! Utilities for constructing native IR while lifting bytecode.

use super::instr::{BinOp, BlockId, Callee, CastOp, FloatPredicate, Function, Instr, IntPredicate, Reg, Terminator, Value};
use super::types::IrType;

/// Builder that simplifies IR construction
pub struct FunctionBuilder<'a> {
    func: &'a mut Function,
    current_block: BlockId,
}

impl<'a> FunctionBuilder<'a> {
    /// Create a builder targeting an existing function; an entry block is
    /// created when the function has none
    pub fn new(func: &'a mut Function) -> Self {
        let entry = match func.entry() {
            Some(entry) => entry,
            None => func.add_block(),
        };
        FunctionBuilder {
            func,
            current_block: entry,
        }
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    /// Switch to emitting into a different block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn alloc_reg(&mut self, ty: IrType) -> Reg {
        self.func.alloc_reg(ty)
    }

    pub fn create_block(&mut self) -> BlockId {
        self.func.add_block()
    }

    pub fn param(&self, index: usize) -> Value {
        Value::Reg(self.func.param(index))
    }

    /// Emit an instruction into the current block
    pub fn emit(&mut self, instr: Instr) {
        self.func.block_mut(self.current_block).instrs.push(instr);
    }

    /// Set the terminator for the current block
    pub fn terminate(&mut self, term: Terminator) {
        self.func.block_mut(self.current_block).terminator = term;
    }

    /// Whether the current block already has a terminator
    pub fn is_terminated(&mut self) -> bool {
        self.func.block_mut(self.current_block).terminator != Terminator::None
    }

    /// Allocate a stack slot at the top of the entry block
    pub fn entry_alloca(&mut self, ty: IrType, count: u32) -> Value {
        let dest = self.alloc_reg(IrType::Ptr);
        let entry = self.func.entry().unwrap_or(self.current_block);
        self.func
            .block_mut(entry)
            .instrs
            .insert(0, Instr::Alloca { dest, ty, count });
        Value::Reg(dest)
    }

    pub fn load(&mut self, ty: IrType, ptr: Value) -> Value {
        let dest = self.alloc_reg(ty);
        self.emit(Instr::Load { dest, ty, ptr });
        Value::Reg(dest)
    }

    pub fn store(&mut self, ty: IrType, value: Value, ptr: Value) {
        self.emit(Instr::Store { ty, value, ptr });
    }

    pub fn gep(&mut self, elem: IrType, base: Value, index: i64) -> Value {
        let dest = self.alloc_reg(IrType::Ptr);
        self.emit(Instr::Gep {
            dest,
            elem,
            base,
            index: Value::Int(index),
        });
        Value::Reg(dest)
    }

    pub fn bin(&mut self, op: BinOp, ty: IrType, lhs: Value, rhs: Value) -> Value {
        let dest = self.alloc_reg(ty);
        self.emit(Instr::Bin { dest, op, ty, lhs, rhs });
        Value::Reg(dest)
    }

    pub fn fneg(&mut self, ty: IrType, operand: Value) -> Value {
        let dest = self.alloc_reg(ty);
        self.emit(Instr::FNeg { dest, ty, operand });
        Value::Reg(dest)
    }

    pub fn icmp(&mut self, pred: IntPredicate, ty: IrType, lhs: Value, rhs: Value) -> Value {
        let dest = self.alloc_reg(IrType::I1);
        self.emit(Instr::ICmp { dest, pred, ty, lhs, rhs });
        Value::Reg(dest)
    }

    pub fn fcmp(&mut self, pred: FloatPredicate, ty: IrType, lhs: Value, rhs: Value) -> Value {
        let dest = self.alloc_reg(IrType::I1);
        self.emit(Instr::FCmp { dest, pred, ty, lhs, rhs });
        Value::Reg(dest)
    }

    pub fn select(&mut self, ty: IrType, cond: Value, then_value: Value, else_value: Value) -> Value {
        let dest = self.alloc_reg(ty);
        self.emit(Instr::Select {
            dest,
            ty,
            cond,
            then_value,
            else_value,
        });
        Value::Reg(dest)
    }

    pub fn cast(&mut self, op: CastOp, from: IrType, value: Value, to: IrType) -> Value {
        let dest = self.alloc_reg(to);
        self.emit(Instr::Cast { dest, op, from, value, to });
        Value::Reg(dest)
    }

    /// Emit a call; returns the result unless `ret` is `Void`
    pub fn call(&mut self, ret: IrType, callee: Callee, args: Vec<(IrType, Value)>) -> Option<Value> {
        let dest = if ret == IrType::Void {
            None
        } else {
            Some(self.alloc_reg(ret))
        };
        self.emit(Instr::Call { dest, ret, callee, args });
        dest.map(Value::Reg)
    }

    pub fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump(target));
    }

    pub fn branch(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Return(value));
    }
}
