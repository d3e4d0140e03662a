//! LLVM backend
//!
//! The native module is rebuilt as an inkwell module, checked by the LLVM
//! verifier, run through the pass pipeline for the requested level and printed
//! as textual IR for the external toolchain. Blocks are lowered in reverse
//! postorder from the entry, so every register is defined before the blocks
//! it dominates read it; blocks the entry cannot reach are dropped.

use inkwell::basic_block::BasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::module::{Linkage as LlvmLinkage, Module};
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetTriple};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, IntType, PointerType};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FloatValue, FunctionValue, GlobalValue, InstructionOpcode, IntValue,
    PointerValue,
};
use inkwell::{AddressSpace, OptimizationLevel};
use rustc_hash::{FxHashMap, FxHashSet};

use super::instr::{
    BinOp, BlockId, Callee, CastOp, FloatPredicate, Function, Instr, IntPredicate, Linkage, Reg, Terminator, Value,
};
use super::types::IrType;
use super::{GlobalInit, NativeModule};

/// Triple the pass pipeline is tuned for; every supported target is x86-64
const PIPELINE_TRIPLE: &str = "x86_64-pc-linux-gnu";

/// Failure to lower, verify or optimize the native module
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("LLVM builder error")]
    Build(#[from] BuilderError),
    #[error("Function {function} has no body")]
    MissingBody { function: String },
    #[error("Block {block} of {function} has no terminator")]
    UnterminatedBlock { function: String, block: BlockId },
    #[error("Function {function} branches to unknown block {block}")]
    UnknownBlock { function: String, block: BlockId },
    #[error("Function {function} reads register {reg} before defining it")]
    UndefinedRegister { function: String, reg: Reg },
    #[error("Function {function} uses an operand that is not a {expected} value")]
    OperandType { function: String, expected: IrType },
    #[error("Function {0} has a void parameter or operand")]
    VoidValue(String),
    #[error("Call in {function} to {callee} returns no value")]
    VoidResult { function: String, callee: String },
    #[error("Function {0} is not declared")]
    Undeclared(String),
    #[error("Symbol {0} is defined twice")]
    DuplicateSymbol(String),
    #[error("LLVM verification failed: {0}")]
    Verify(String),
    #[error("Pass pipeline failed: {0}")]
    Passes(String),
    #[error("No target machine for {0}")]
    Target(String),
}

/// Lower, verify and optimize `source` at `level` (0-3), then print it
pub fn emit_textual_ir(source: &NativeModule, level: u8) -> Result<Vec<u8>, BackendError> {
    let _span = tracing::info_span!("llvm", level).entered();
    let context = Context::create();
    let module = Lowering::new(&context, source)?.finish(source)?;
    module.verify().map_err(|e| BackendError::Verify(e.to_string()))?;
    run_pipeline(&module, level)?;

    let text = module.print_to_string().to_string();
    tracing::debug!(
        functions = source.functions().len(),
        instructions = source.functions().iter().map(|f| f.instr_count()).sum::<usize>(),
        bytes = text.len(),
        "module lowered"
    );
    Ok(text.into_bytes())
}

fn run_pipeline(module: &Module<'_>, level: u8) -> Result<(), BackendError> {
    Target::initialize_x86(&InitializationConfig::default());
    let triple = TargetTriple::create(PIPELINE_TRIPLE);
    let target = Target::from_triple(&triple).map_err(|e| BackendError::Target(e.to_string()))?;
    let opt = match level {
        0 => OptimizationLevel::None,
        1 => OptimizationLevel::Less,
        2 => OptimizationLevel::Default,
        _ => OptimizationLevel::Aggressive,
    };
    let machine = target
        .create_target_machine(&triple, "x86-64", "", opt, RelocMode::PIC, CodeModel::Default)
        .ok_or_else(|| BackendError::Target(PIPELINE_TRIPLE.to_string()))?;
    let passes = format!("default<O{}>", level.min(3));
    module
        .run_passes(&passes, &machine, PassBuilderOptions::create())
        .map_err(|e| BackendError::Passes(e.to_string()))
}

/// Module-wide lowering state
struct Lowering<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    functions: Vec<FunctionValue<'ctx>>,
    globals: Vec<GlobalValue<'ctx>>,
}

impl<'ctx> Lowering<'ctx> {
    /// Create every global, declaration and function signature
    fn new(context: &'ctx Context, source: &NativeModule) -> Result<Self, BackendError> {
        let mut lowering = Lowering {
            context,
            module: context.create_module(source.name()),
            builder: context.create_builder(),
            functions: Vec::with_capacity(source.functions().len()),
            globals: Vec::with_capacity(source.globals().len()),
        };

        for global in source.globals() {
            let value = match &global.init {
                GlobalInit::NullPtr => {
                    let ptr = lowering.ptr_type();
                    let g = lowering.module.add_global(ptr, None, &global.name);
                    g.set_initializer(&ptr.const_null());
                    g.set_linkage(LlvmLinkage::Internal);
                    g
                }
                GlobalInit::CString(bytes) => {
                    let init = context.const_string(bytes, true);
                    let g = lowering.module.add_global(init.get_type(), None, &global.name);
                    g.set_initializer(&init);
                    g.set_linkage(LlvmLinkage::Private);
                    g.set_constant(true);
                    g.set_unnamed_addr(true);
                    g
                }
            };
            lowering.globals.push(value);
        }

        for func in source.functions() {
            if lowering.module.get_function(&func.name).is_some() {
                return Err(BackendError::DuplicateSymbol(func.name.clone()));
            }
            let ty = lowering.fn_type(&func.name, func.ret, &func.params)?;
            let linkage = match func.linkage {
                Linkage::Internal => Some(LlvmLinkage::Internal),
                Linkage::External => None,
            };
            let value = lowering.module.add_function(&func.name, ty, linkage);
            lowering.functions.push(value);
        }

        for decl in source.declarations() {
            if lowering.module.get_function(&decl.name).is_none() {
                let ty = lowering.fn_type(&decl.name, decl.ret, &decl.params)?;
                lowering.module.add_function(&decl.name, ty, Some(LlvmLinkage::External));
            }
        }
        Ok(lowering)
    }

    /// Lower every function body
    fn finish(self, source: &NativeModule) -> Result<Module<'ctx>, BackendError> {
        for (func, value) in source.functions().iter().zip(&self.functions) {
            Body::new(&self, func, *value)?.lower()?;
        }
        Ok(self.module)
    }

    fn ptr_type(&self) -> PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    fn int_type(&self, ty: IrType) -> Option<IntType<'ctx>> {
        Some(match ty {
            IrType::I1 => self.context.bool_type(),
            IrType::I8 => self.context.i8_type(),
            IrType::I16 => self.context.i16_type(),
            IrType::I32 => self.context.i32_type(),
            IrType::I64 => self.context.i64_type(),
            _ => return None,
        })
    }

    fn basic_type(&self, ty: IrType) -> Option<BasicTypeEnum<'ctx>> {
        Some(match ty {
            IrType::Void => return None,
            IrType::F32 => self.context.f32_type().into(),
            IrType::F64 => self.context.f64_type().into(),
            IrType::Ptr => self.ptr_type().into(),
            int => self.int_type(int)?.into(),
        })
    }

    fn fn_type(&self, owner: &str, ret: IrType, params: &[IrType]) -> Result<FunctionType<'ctx>, BackendError> {
        let params = params
            .iter()
            .map(|p| {
                self.basic_type(*p)
                    .map(BasicMetadataTypeEnum::from)
                    .ok_or_else(|| BackendError::VoidValue(owner.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match self.basic_type(ret) {
            Some(ty) => ty.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        })
    }

    fn undef(&self, ty: IrType) -> Option<BasicValueEnum<'ctx>> {
        Some(match ty {
            IrType::Void => return None,
            IrType::F32 => self.context.f32_type().get_undef().into(),
            IrType::F64 => self.context.f64_type().get_undef().into(),
            IrType::Ptr => self.ptr_type().get_undef().into(),
            int => self.int_type(int)?.get_undef().into(),
        })
    }
}

/// Lowering state for one function
struct Body<'l, 'ctx> {
    cx: &'l Lowering<'ctx>,
    func: &'l Function,
    regs: FxHashMap<Reg, BasicValueEnum<'ctx>>,
    blocks: FxHashMap<BlockId, BasicBlock<'ctx>>,
    order: Vec<BlockId>,
}

impl<'l, 'ctx> Body<'l, 'ctx> {
    fn new(cx: &'l Lowering<'ctx>, func: &'l Function, value: FunctionValue<'ctx>) -> Result<Self, BackendError> {
        let order = reverse_postorder(func)?;
        let blocks = order
            .iter()
            .map(|id| (*id, cx.context.append_basic_block(value, &id.to_string())))
            .collect();
        let regs = value
            .get_param_iter()
            .enumerate()
            .map(|(i, param)| (func.param(i), param))
            .collect();
        Ok(Body {
            cx,
            func,
            regs,
            blocks,
            order,
        })
    }

    fn lower(mut self) -> Result<(), BackendError> {
        let func = self.func;
        for id in std::mem::take(&mut self.order) {
            let block = func.block(id).ok_or_else(|| self.unknown_block(id))?;
            self.cx.builder.position_at_end(self.block(id)?);
            for instr in &block.instrs {
                self.instr(instr)?;
            }
            self.terminator(id, &block.terminator)?;
        }
        Ok(())
    }

    fn instr(&mut self, instr: &Instr) -> Result<(), BackendError> {
        let b = &self.cx.builder;
        let result: Option<(Reg, BasicValueEnum<'ctx>)> = match instr {
            Instr::Alloca { dest, ty, count } => {
                let ty = self.basic(*ty)?;
                let slot = if *count <= 1 {
                    b.build_alloca(ty, "")?
                } else {
                    let count = self.cx.context.i32_type().const_int(u64::from(*count), false);
                    b.build_array_alloca(ty, count, "")?
                };
                Some((*dest, slot.into()))
            }
            Instr::Load { dest, ty, ptr } => {
                let ptr = self.pointer(ptr)?;
                Some((*dest, b.build_load(self.basic(*ty)?, ptr, "")?))
            }
            Instr::Store { ty, value, ptr } => {
                let value = self.value(*ty, value)?;
                b.build_store(self.pointer(ptr)?, value)?;
                None
            }
            Instr::Gep { dest, elem, base, index } => {
                let base = self.pointer(base)?;
                let index = self.int(IrType::I64, index)?;
                // In bounds of the JNI function table or a local slot array
                let addr = unsafe { b.build_gep(self.basic(*elem)?, base, &[index], "")? };
                Some((*dest, addr.into()))
            }
            Instr::Bin { dest, op, ty, lhs, rhs } => {
                let (lhs, rhs) = (self.value(*ty, lhs)?, self.value(*ty, rhs)?);
                Some((*dest, b.build_binop(bin_opcode(*op), lhs, rhs, "")?))
            }
            Instr::FNeg { dest, ty, operand } => {
                let operand = self.float(*ty, operand)?;
                Some((*dest, b.build_float_neg(operand, "")?.into()))
            }
            Instr::ICmp { dest, pred, ty, lhs, rhs } => {
                let (lhs, rhs) = if *ty == IrType::Ptr {
                    let i64_type = self.cx.context.i64_type();
                    (
                        b.build_ptr_to_int(self.pointer(lhs)?, i64_type, "")?,
                        b.build_ptr_to_int(self.pointer(rhs)?, i64_type, "")?,
                    )
                } else {
                    (self.int(*ty, lhs)?, self.int(*ty, rhs)?)
                };
                Some((*dest, b.build_int_compare(int_predicate(*pred), lhs, rhs, "")?.into()))
            }
            Instr::FCmp { dest, pred, ty, lhs, rhs } => {
                let (lhs, rhs) = (self.float(*ty, lhs)?, self.float(*ty, rhs)?);
                Some((*dest, b.build_float_compare(float_predicate(*pred), lhs, rhs, "")?.into()))
            }
            Instr::Select {
                dest,
                ty,
                cond,
                then_value,
                else_value,
            } => {
                let cond = self.int(IrType::I1, cond)?;
                let (then_value, else_value) = (self.value(*ty, then_value)?, self.value(*ty, else_value)?);
                Some((*dest, b.build_select(cond, then_value, else_value, "")?))
            }
            Instr::Cast { dest, op, from, value, to } => {
                let value = self.value(*from, value)?;
                Some((*dest, b.build_cast(cast_opcode(*op), value, self.basic(*to)?, "")?))
            }
            Instr::Call { dest, ret, callee, args } => {
                let values = args
                    .iter()
                    .map(|(ty, v)| self.value(*ty, v).map(BasicMetadataValueEnum::from))
                    .collect::<Result<Vec<_>, _>>()?;
                let site = match callee {
                    Callee::Function(id) => b.build_call(self.cx.functions[id.0 as usize], &values, "")?,
                    Callee::Declared(name) => {
                        let target = self
                            .cx
                            .module
                            .get_function(name)
                            .ok_or_else(|| BackendError::Undeclared(name.clone()))?;
                        b.build_call(target, &values, "")?
                    }
                    Callee::Indirect(target) => {
                        let params: Vec<IrType> = args.iter().map(|(ty, _)| *ty).collect();
                        let ty = self.cx.fn_type(&self.func.name, *ret, &params)?;
                        b.build_indirect_call(ty, self.pointer(target)?, &values, "")?
                    }
                };
                match dest {
                    Some(dest) => {
                        let value = site.try_as_basic_value().left().ok_or_else(|| BackendError::VoidResult {
                            function: self.func.name.clone(),
                            callee: callee_name(self.cx, callee),
                        })?;
                        Some((*dest, value))
                    }
                    None => None,
                }
            }
        };
        if let Some((reg, value)) = result {
            self.regs.insert(reg, value);
        }
        Ok(())
    }

    fn terminator(&self, id: BlockId, term: &Terminator) -> Result<(), BackendError> {
        let b = &self.cx.builder;
        match term {
            Terminator::Jump(target) => {
                b.build_unconditional_branch(self.block(*target)?)?;
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.int(IrType::I1, cond)?;
                b.build_conditional_branch(cond, self.block(*then_block)?, self.block(*else_block)?)?;
            }
            Terminator::Switch {
                ty,
                value,
                default,
                cases,
            } => {
                let key_type = self.cx.int_type(*ty).ok_or_else(|| self.operand_type(*ty))?;
                let cases = cases
                    .iter()
                    .map(|(key, target)| Ok((key_type.const_int(*key as u64, true), self.block(*target)?)))
                    .collect::<Result<Vec<_>, BackendError>>()?;
                b.build_switch(self.int(*ty, value)?, self.block(*default)?, &cases)?;
            }
            Terminator::Return(None) => {
                b.build_return(None)?;
            }
            Terminator::Return(Some(value)) => {
                let value = self.value(self.func.ret, value)?;
                b.build_return(Some(&value))?;
            }
            Terminator::Unreachable => {
                b.build_unreachable()?;
            }
            Terminator::None => {
                return Err(BackendError::UnterminatedBlock {
                    function: self.func.name.clone(),
                    block: id,
                })
            }
        }
        Ok(())
    }

    fn value(&self, ty: IrType, value: &Value) -> Result<BasicValueEnum<'ctx>, BackendError> {
        let context = self.cx.context;
        Ok(match *value {
            Value::Reg(reg) => {
                return self.regs.get(&reg).copied().ok_or_else(|| BackendError::UndefinedRegister {
                    function: self.func.name.clone(),
                    reg,
                })
            }
            Value::Int(v) => self
                .cx
                .int_type(ty)
                .ok_or_else(|| self.operand_type(ty))?
                .const_int(v as u64, true)
                .into(),
            Value::F32(bits) => context.f32_type().const_float(f64::from(f32::from_bits(bits))).into(),
            Value::F64(bits) => context.f64_type().const_float(f64::from_bits(bits)).into(),
            Value::Null => self.cx.ptr_type().const_null().into(),
            Value::Global(id) => self.cx.globals[id.0 as usize].as_pointer_value().into(),
            Value::Undef => self
                .cx
                .undef(ty)
                .ok_or_else(|| BackendError::VoidValue(self.func.name.clone()))?,
        })
    }

    fn int(&self, ty: IrType, value: &Value) -> Result<IntValue<'ctx>, BackendError> {
        match self.value(ty, value)? {
            BasicValueEnum::IntValue(v) => Ok(v),
            _ => Err(self.operand_type(ty)),
        }
    }

    fn float(&self, ty: IrType, value: &Value) -> Result<FloatValue<'ctx>, BackendError> {
        match self.value(ty, value)? {
            BasicValueEnum::FloatValue(v) => Ok(v),
            _ => Err(self.operand_type(ty)),
        }
    }

    fn pointer(&self, value: &Value) -> Result<PointerValue<'ctx>, BackendError> {
        match self.value(IrType::Ptr, value)? {
            BasicValueEnum::PointerValue(v) => Ok(v),
            _ => Err(self.operand_type(IrType::Ptr)),
        }
    }

    fn basic(&self, ty: IrType) -> Result<BasicTypeEnum<'ctx>, BackendError> {
        self.cx
            .basic_type(ty)
            .ok_or_else(|| BackendError::VoidValue(self.func.name.clone()))
    }

    fn block(&self, id: BlockId) -> Result<BasicBlock<'ctx>, BackendError> {
        self.blocks.get(&id).copied().ok_or_else(|| self.unknown_block(id))
    }

    fn unknown_block(&self, block: BlockId) -> BackendError {
        BackendError::UnknownBlock {
            function: self.func.name.clone(),
            block,
        }
    }

    fn operand_type(&self, expected: IrType) -> BackendError {
        BackendError::OperandType {
            function: self.func.name.clone(),
            expected,
        }
    }
}

/// Blocks reachable from the entry, each after all of its dominators
fn reverse_postorder(func: &Function) -> Result<Vec<BlockId>, BackendError> {
    let entry = func.entry().ok_or_else(|| BackendError::MissingBody {
        function: func.name.clone(),
    })?;
    let successors = |id: BlockId| -> Result<Vec<BlockId>, BackendError> {
        let block = func.block(id).ok_or_else(|| BackendError::UnknownBlock {
            function: func.name.clone(),
            block: id,
        })?;
        let mut next = block.terminator.successors();
        next.reverse();
        Ok(next)
    };

    let mut visited = FxHashSet::default();
    visited.insert(entry);
    let mut stack = vec![(entry, successors(entry)?)];
    let mut postorder = Vec::with_capacity(func.blocks.len());
    while let Some((id, pending)) = stack.last_mut() {
        match pending.pop() {
            Some(next) => {
                if visited.insert(next) {
                    let after = successors(next)?;
                    stack.push((next, after));
                }
            }
            None => {
                postorder.push(*id);
                stack.pop();
            }
        }
    }
    postorder.reverse();
    Ok(postorder)
}

fn callee_name(cx: &Lowering<'_>, callee: &Callee) -> String {
    match callee {
        Callee::Function(id) => cx.functions[id.0 as usize].get_name().to_string_lossy().into_owned(),
        Callee::Declared(name) => name.clone(),
        Callee::Indirect(_) => "an indirect target".to_string(),
    }
}

fn bin_opcode(op: BinOp) -> InstructionOpcode {
    match op {
        BinOp::Add => InstructionOpcode::Add,
        BinOp::Sub => InstructionOpcode::Sub,
        BinOp::Mul => InstructionOpcode::Mul,
        BinOp::SDiv => InstructionOpcode::SDiv,
        BinOp::SRem => InstructionOpcode::SRem,
        BinOp::Shl => InstructionOpcode::Shl,
        BinOp::AShr => InstructionOpcode::AShr,
        BinOp::LShr => InstructionOpcode::LShr,
        BinOp::And => InstructionOpcode::And,
        BinOp::Or => InstructionOpcode::Or,
        BinOp::Xor => InstructionOpcode::Xor,
        BinOp::FAdd => InstructionOpcode::FAdd,
        BinOp::FSub => InstructionOpcode::FSub,
        BinOp::FMul => InstructionOpcode::FMul,
        BinOp::FDiv => InstructionOpcode::FDiv,
        BinOp::FRem => InstructionOpcode::FRem,
    }
}

fn cast_opcode(op: CastOp) -> InstructionOpcode {
    match op {
        CastOp::Trunc => InstructionOpcode::Trunc,
        CastOp::ZExt => InstructionOpcode::ZExt,
        CastOp::SExt => InstructionOpcode::SExt,
        CastOp::SIToFP => InstructionOpcode::SIToFP,
        CastOp::FPExt => InstructionOpcode::FPExt,
        CastOp::FPTrunc => InstructionOpcode::FPTrunc,
    }
}

fn int_predicate(pred: IntPredicate) -> inkwell::IntPredicate {
    match pred {
        IntPredicate::Eq => inkwell::IntPredicate::EQ,
        IntPredicate::Ne => inkwell::IntPredicate::NE,
        IntPredicate::Slt => inkwell::IntPredicate::SLT,
        IntPredicate::Sle => inkwell::IntPredicate::SLE,
        IntPredicate::Sgt => inkwell::IntPredicate::SGT,
        IntPredicate::Sge => inkwell::IntPredicate::SGE,
    }
}

fn float_predicate(pred: FloatPredicate) -> inkwell::FloatPredicate {
    match pred {
        FloatPredicate::Oeq => inkwell::FloatPredicate::OEQ,
        FloatPredicate::Olt => inkwell::FloatPredicate::OLT,
        FloatPredicate::Ogt => inkwell::FloatPredicate::OGT,
    }
}
