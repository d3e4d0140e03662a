//! Native IR instructions, blocks, and functions
//!
//! Registers are SSA values local to one function. Mutable state (JVM locals
//! and operand-stack spill slots) lives in `Alloca` slots accessed with
//! `Load`/`Store`; the LLVM pass pipeline promotes them to registers.

use rustc_hash::FxHashMap;

use super::types::IrType;

/// Virtual register (SSA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%r{}", self.0)
    }
}

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Function handle within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

/// Global variable handle within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

/// An instruction operand. Immediates take their type from the instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Reg(Reg),
    Int(i64),
    /// IEEE bits
    F32(u32),
    /// IEEE bits
    F64(u64),
    Null,
    /// Address of a module global
    Global(GlobalId),
    Undef,
}

impl Value {
    pub fn f32(value: f32) -> Value {
        Value::F32(value.to_bits())
    }

    pub fn f64(value: f64) -> Value {
        Value::F64(value.to_bits())
    }
}

impl From<Reg> for Value {
    fn from(reg: Reg) -> Self {
        Value::Reg(reg)
    }
}

/// Integer and floating-point binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    Shl,
    AShr,
    LShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

/// Integer comparison predicates (signed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// Ordered floating-point comparison predicates (false on NaN)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    Oeq,
    Olt,
    Ogt,
}

/// Conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    SIToFP,
    FPExt,
    FPTrunc,
}

/// Call target
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A function defined in this module
    Function(FunctionId),
    /// A declared external or intrinsic function, by symbol
    Declared(String),
    /// A function pointer (JNI function table entries)
    Indirect(Value),
}

/// A native IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    // ===== Memory =====
    /// Stack slot of `count` elements of `ty`
    Alloca { dest: Reg, ty: IrType, count: u32 },
    Load { dest: Reg, ty: IrType, ptr: Value },
    Store { ty: IrType, value: Value, ptr: Value },
    /// Address of element `index` of an array of `elem` at `base`
    Gep { dest: Reg, elem: IrType, base: Value, index: Value },

    // ===== Arithmetic =====
    Bin { dest: Reg, op: BinOp, ty: IrType, lhs: Value, rhs: Value },
    FNeg { dest: Reg, ty: IrType, operand: Value },

    // ===== Comparison =====
    ICmp { dest: Reg, pred: IntPredicate, ty: IrType, lhs: Value, rhs: Value },
    FCmp { dest: Reg, pred: FloatPredicate, ty: IrType, lhs: Value, rhs: Value },
    Select { dest: Reg, ty: IrType, cond: Value, then_value: Value, else_value: Value },

    // ===== Conversion =====
    Cast { dest: Reg, op: CastOp, from: IrType, value: Value, to: IrType },

    // ===== Calls =====
    Call { dest: Option<Reg>, ret: IrType, callee: Callee, args: Vec<(IrType, Value)> },
}

/// How a basic block ends
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    /// Conditional branch on an `i1`
    Branch {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        ty: IrType,
        value: Value,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    /// Return; the value type is the function's return type
    Return(Option<Value>),
    Unreachable,
    /// Placeholder terminator (not yet assigned)
    None,
}

impl Terminator {
    /// Successor blocks, in order, possibly with repeats
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_block, else_block, ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { default, cases, .. } => {
                let mut all = vec![*default];
                all.extend(cases.iter().map(|(_, b)| *b));
                all
            }
            Terminator::Return(_) | Terminator::Unreachable | Terminator::None => vec![],
        }
    }
}

/// A basic block
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Block {
            id,
            instrs: vec![],
            terminator: Terminator::None,
        }
    }
}

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Module-private helper
    Internal,
    /// Exported entry point
    External,
}

/// A native function
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    /// Symbol name
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
    pub linkage: Linkage,
    /// Basic blocks; the first one is the entry
    pub blocks: Vec<Block>,
    /// Next available register number
    pub next_reg: u32,
    /// Next available block number
    pub next_block: u32,
    /// Type of every register
    pub reg_types: FxHashMap<Reg, IrType>,
}

impl Function {
    /// Create a function without a body. Parameters are registers `0..n`.
    pub fn new(id: FunctionId, name: impl Into<String>, params: Vec<IrType>, ret: IrType) -> Self {
        let mut func = Function {
            id,
            name: name.into(),
            params: vec![],
            ret,
            linkage: Linkage::Internal,
            blocks: vec![],
            next_reg: 0,
            next_block: 0,
            reg_types: FxHashMap::default(),
        };
        for ty in &params {
            func.alloc_reg(*ty);
        }
        func.params = params;
        func
    }

    /// Register holding parameter `index`
    pub fn param(&self, index: usize) -> Reg {
        Reg(index as u32)
    }

    /// Allocate a fresh virtual register with a given type
    pub fn alloc_reg(&mut self, ty: IrType) -> Reg {
        let reg = Reg(self.next_reg);
        self.next_reg += 1;
        self.reg_types.insert(reg, ty);
        reg
    }

    pub fn reg_type(&self, reg: Reg) -> Option<IrType> {
        self.reg_types.get(&reg).copied()
    }

    /// Add an empty block and return its id
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(Block::new(id));
        id
    }

    fn position(&self, id: BlockId) -> Option<usize> {
        match self.blocks.get(id.0 as usize) {
            Some(b) if b.id == id => Some(id.0 as usize),
            _ => self.blocks.iter().position(|b| b.id == id),
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.position(id).map(|i| &self.blocks[i])
    }

    /// Panics on an unknown id: ids only come from `add_block`
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        let i = self
            .position(id)
            .unwrap_or_else(|| panic!("block {} is not part of function {}", id, self.name));
        &mut self.blocks[i]
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    pub fn instr_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instrs.len()).sum()
    }
}
