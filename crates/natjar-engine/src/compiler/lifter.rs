//! Stack-to-IR lifter
//!
//! Converts a method's bytecode into native IR by abstractly simulating the
//! operand stack. Values within a block stay in registers; across block
//! boundaries every stack entry and local variable lives in a stack slot
//! keyed by position and kind, which the optimizer forwards where it can.
//!
//! Object-model operations go through the JNI function table. After every
//! call that may raise, the pending-exception flag is checked and control
//! moves to a dispatch block that matches the method's exception table.

use rustc_hash::FxHashMap;

use super::bridge::{call_jni, from_jni, to_jni, BridgeCache, JniFunction, JniType};
use super::cfg::{build_cfg, ControlFlowGraph};
use super::{error_at, CompileError, CompileErrorKind};
use crate::classfile::{
    ClassFormatError, ConstantPool, ExceptionEntry, FieldType, Instruction, Loadable, MethodDescriptor, Opcode,
    Operand,
};
use crate::index::{ClassEntry, Method, MethodId, ProgramIndex};
use crate::ir::{
    BinOp, BlockId, Callee, CastOp, FloatPredicate, Function, FunctionBuilder, FunctionId, IntPredicate, IrType,
    NativeModule, Terminator, Value,
};

const NULL_POINTER: &str = "java/lang/NullPointerException";
const ARITHMETIC: &str = "java/lang/ArithmeticException";
const CLASS_CAST: &str = "java/lang/ClassCastException";

/// Verification kind of a stack entry or local. Long and double values take
/// a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

/// Kinds in the order of the typed opcode families (`iload`, `lload`, ...)
const FAMILY: [Kind; 5] = [Kind::Int, Kind::Long, Kind::Float, Kind::Double, Kind::Ref];

impl Kind {
    fn of(ty: JniType) -> Kind {
        match ty {
            JniType::Long => Kind::Long,
            JniType::Float => Kind::Float,
            JniType::Double => Kind::Double,
            JniType::Object | JniType::Void => Kind::Ref,
            _ => Kind::Int,
        }
    }

    fn ir_type(self) -> IrType {
        match self {
            Kind::Int => IrType::I32,
            Kind::Long => IrType::I64,
            Kind::Float => IrType::F32,
            Kind::Double => IrType::F64,
            Kind::Ref => IrType::Ptr,
        }
    }

    fn is_wide(self) -> bool {
        matches!(self, Kind::Long | Kind::Double)
    }
}

/// Element type of the `?aload` / `?astore` families, in opcode order
const ARRAY_ELEMENTS: [JniType; 8] = [
    JniType::Int,
    JniType::Long,
    JniType::Float,
    JniType::Double,
    JniType::Object,
    JniType::Byte,
    JniType::Char,
    JniType::Short,
];

pub(super) struct LiftContext<'a> {
    pub index: &'a ProgramIndex,
    pub method: MethodId,
    pub module: &'a mut NativeModule,
    pub bridge: &'a mut BridgeCache,
    /// Functions of marked methods, for direct calls
    pub direct: &'a FxHashMap<MethodId, FunctionId>,
}

/// Lift a method's bytecode into `func`
pub(super) fn lift_method(ctx: LiftContext<'_>, func: &mut Function) -> Result<(), CompileError> {
    let mut lifter = Lifter::new(ctx, func)?;
    lifter.prologue()?;
    lifter.run()
}

struct Lifter<'a> {
    index: &'a ProgramIndex,
    method_id: MethodId,
    class: &'a ClassEntry,
    method: &'a Method,
    pool: &'a ConstantPool,
    handlers: &'a [ExceptionEntry],
    descriptor: MethodDescriptor,
    ret_type: JniType,
    module: &'a mut NativeModule,
    bridge: &'a mut BridgeCache,
    direct: &'a FxHashMap<MethodId, FunctionId>,
    b: FunctionBuilder<'a>,
    cfg: ControlFlowGraph,
    /// IR block of each CFG block
    blocks: Vec<BlockId>,
    /// Stack kinds on entry, once some predecessor reaches the block
    shapes: Vec<Option<Vec<Kind>>>,
    worklist: Vec<usize>,
    locals: FxHashMap<(u16, Kind), Value>,
    spills: FxHashMap<(usize, Kind), Value>,
    /// One-element buffers for array region transfers
    scratch: FxHashMap<IrType, Value>,
    /// Dispatch block per set of covering handlers
    dispatch: FxHashMap<Vec<usize>, BlockId>,
    stack: Vec<(Kind, Value)>,
    pc: u32,
    opcode: Option<Opcode>,
}

impl<'a> Lifter<'a> {
    fn new(ctx: LiftContext<'a>, func: &'a mut Function) -> Result<Self, CompileError> {
        let LiftContext {
            index,
            method: method_id,
            module,
            bridge,
            direct,
        } = ctx;
        let class = index.class(method_id.class);
        let method = index.method(method_id);
        let file = class.file();
        let fail = |kind: CompileErrorKind| error_at(index, method_id, 0, None, kind);

        let code = file.methods[method_id.index as usize]
            .code()
            .ok_or_else(|| fail(CompileErrorKind::NoBody))?;
        let descriptor = MethodDescriptor::parse(&method.descriptor).map_err(|e| fail(e.into()))?;
        let cfg = build_cfg(&method.instructions, &code.exception_table).map_err(|e| fail(e.into()))?;
        let ret_type = JniType::of_return(descriptor.ret.as_ref());

        let mut b = FunctionBuilder::new(func);
        let blocks: Vec<BlockId> = cfg.blocks.iter().map(|_| b.create_block()).collect();
        let count = cfg.len();

        Ok(Lifter {
            index,
            method_id,
            class,
            method,
            pool: &file.pool,
            handlers: &code.exception_table,
            descriptor,
            ret_type,
            module,
            bridge,
            direct,
            b,
            cfg,
            blocks,
            shapes: vec![None; count],
            worklist: vec![],
            locals: FxHashMap::default(),
            spills: FxHashMap::default(),
            scratch: FxHashMap::default(),
            dispatch: FxHashMap::default(),
            stack: vec![],
            pc: 0,
            opcode: None,
        })
    }

    fn fail(&self, kind: CompileErrorKind) -> CompileError {
        error_at(self.index, self.method_id, self.pc, self.opcode, kind)
    }

    fn env(&self) -> Value {
        self.b.param(0)
    }

    // ===== Block structure =====

    /// Move parameters into their local slots and enter the first block
    fn prologue(&mut self) -> Result<(), CompileError> {
        let mut slot = 0u16;
        if !self.method.is_static() {
            let this = self.b.param(1);
            self.store_local(0, Kind::Ref, this);
            slot = 1;
        }
        let params = self.descriptor.params.clone();
        for (i, ty) in params.iter().enumerate() {
            let jni = JniType::of(ty);
            let raw = self.b.param(i + 2);
            let value = from_jni(&mut self.b, jni, raw);
            self.store_local(slot, Kind::of(jni), value);
            slot += ty.slot_size();
        }
        let first = self.cfg.blocks[0].start_offset;
        let target = self.edge_with(first, vec![])?;
        self.b.jump(target);
        Ok(())
    }

    fn run(&mut self) -> Result<(), CompileError> {
        let mut visited = vec![false; self.cfg.len()];
        while let Some(i) = self.worklist.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            self.lift_block(i)?;
        }
        for (i, seen) in visited.iter().enumerate() {
            if !seen {
                self.b.switch_to_block(self.blocks[i]);
                self.b.terminate(Terminator::Unreachable);
            }
        }
        Ok(())
    }

    fn lift_block(&mut self, i: usize) -> Result<(), CompileError> {
        let block = self.cfg.blocks[i].clone();
        self.b.switch_to_block(self.blocks[i]);
        self.stack.clear();
        let shape = self.shapes[i].clone().unwrap_or_default();
        for (depth, kind) in shape.into_iter().enumerate() {
            let slot = self.spill_slot(depth, kind);
            let value = self.b.load(kind.ir_type(), slot);
            self.stack.push((kind, value));
        }

        let method = self.method;
        for insn in &method.instructions[block.instrs.clone()] {
            self.pc = insn.offset;
            self.opcode = Some(insn.opcode);
            self.lift_insn(insn)?;
        }

        // A conditional branch already wired its fallthrough edge
        if block.falls_through && !self.b.is_terminated() {
            let next = self.cfg.blocks[i + 1].start_offset;
            self.spill();
            let target = self.edge(next)?;
            self.b.jump(target);
        }
        Ok(())
    }

    /// Successor block for a transfer with the current stack
    fn edge(&mut self, offset: u32) -> Result<BlockId, CompileError> {
        let shape = self.stack.iter().map(|(k, _)| *k).collect();
        self.edge_with(offset, shape)
    }

    fn edge_with(&mut self, offset: u32, shape: Vec<Kind>) -> Result<BlockId, CompileError> {
        let i = self.cfg.block_at(offset).map_err(|e| self.fail(e.into()))?;
        match &self.shapes[i] {
            Some(existing) if *existing != shape => {
                return Err(self.fail(CompileErrorKind::StackMismatch {
                    target: offset,
                    expected: format!("{:?}", existing),
                    found: format!("{:?}", shape),
                }))
            }
            Some(_) => {}
            None => {
                self.shapes[i] = Some(shape);
                self.worklist.push(i);
            }
        }
        Ok(self.blocks[i])
    }

    /// Store the live stack into its slots before leaving the block
    fn spill(&mut self) {
        let stack = self.stack.clone();
        for (depth, (kind, value)) in stack.into_iter().enumerate() {
            let slot = self.spill_slot(depth, kind);
            self.b.store(kind.ir_type(), value, slot);
        }
    }

    fn spill_slot(&mut self, depth: usize, kind: Kind) -> Value {
        if let Some(slot) = self.spills.get(&(depth, kind)) {
            return *slot;
        }
        let slot = self.b.entry_alloca(kind.ir_type(), 1);
        self.spills.insert((depth, kind), slot);
        slot
    }

    fn local_slot(&mut self, index: u16, kind: Kind) -> Value {
        if let Some(slot) = self.locals.get(&(index, kind)) {
            return *slot;
        }
        let slot = self.b.entry_alloca(kind.ir_type(), 1);
        self.locals.insert((index, kind), slot);
        slot
    }

    fn store_local(&mut self, index: u16, kind: Kind, value: Value) {
        let slot = self.local_slot(index, kind);
        self.b.store(kind.ir_type(), value, slot);
    }

    fn scratch_slot(&mut self, ty: IrType) -> Value {
        if let Some(slot) = self.scratch.get(&ty) {
            return *slot;
        }
        let slot = self.b.entry_alloca(ty, 1);
        self.scratch.insert(ty, slot);
        slot
    }

    // ===== Operand stack =====

    fn push(&mut self, kind: Kind, value: Value) {
        self.stack.push((kind, value));
    }

    fn pop(&mut self) -> Result<(Kind, Value), CompileError> {
        self.stack.pop().ok_or_else(|| self.fail(CompileErrorKind::StackUnderflow))
    }

    fn pop_value(&mut self) -> Result<Value, CompileError> {
        Ok(self.pop()?.1)
    }

    // ===== Exceptions =====

    /// Return from the method leaving the pending exception for the caller
    fn return_pending(&mut self) {
        let value = match self.ret_type {
            JniType::Void => None,
            JniType::Object => Some(Value::Null),
            JniType::Float => Some(Value::f32(0.0)),
            JniType::Double => Some(Value::f64(0.0)),
            _ => Some(Value::Int(0)),
        };
        self.b.ret(value);
    }

    /// Block that routes the pending exception at the current offset
    fn dispatch_block(&mut self) -> Result<BlockId, CompileError> {
        let pc = self.pc;
        let covering: Vec<usize> = self
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.start_pc as u32 <= pc && pc < h.end_pc as u32)
            .map(|(i, _)| i)
            .collect();
        if let Some(block) = self.dispatch.get(&covering) {
            return Ok(*block);
        }

        let saved = self.b.current_block();
        let block = self.b.create_block();
        self.dispatch.insert(covering.clone(), block);
        self.b.switch_to_block(block);

        if covering.is_empty() {
            self.return_pending();
            self.b.switch_to_block(saved);
            return Ok(block);
        }

        let env = self.env();
        let exception = call_jni(&mut self.b, env, JniFunction::ExceptionOccurred, vec![]).unwrap_or(Value::Null);
        call_jni(&mut self.b, env, JniFunction::ExceptionClear, vec![]);

        let mut caught_all = false;
        for i in covering {
            let handler = self.handlers[i];
            if handler.catch_type == 0 {
                self.enter_handler(handler.handler_pc as u32, exception)?;
                caught_all = true;
                break;
            }
            let name = self.pool.class_name(handler.catch_type).map_err(|e| self.fail(e.into()))?;
            let class = self.class_ref(&name);

            // A failed lookup leaves its own exception pending
            let missing = self.b.icmp(IntPredicate::Eq, IrType::Ptr, class, Value::Null);
            let lookup_failed = self.b.create_block();
            let test = self.b.create_block();
            self.b.branch(missing, lookup_failed, test);
            self.b.switch_to_block(lookup_failed);
            self.return_pending();

            self.b.switch_to_block(test);
            let is = call_jni(
                &mut self.b,
                env,
                JniFunction::IsInstanceOf,
                vec![(IrType::Ptr, exception), (IrType::Ptr, class)],
            )
            .unwrap_or(Value::Int(0));
            let matched = self.b.icmp(IntPredicate::Ne, IrType::I8, is, Value::Int(0));
            let enter = self.b.create_block();
            let next = self.b.create_block();
            self.b.branch(matched, enter, next);
            self.b.switch_to_block(enter);
            self.enter_handler(handler.handler_pc as u32, exception)?;
            self.b.switch_to_block(next);
        }
        if !caught_all {
            call_jni(&mut self.b, env, JniFunction::Throw, vec![(IrType::Ptr, exception)]);
            self.return_pending();
        }

        self.b.switch_to_block(saved);
        Ok(block)
    }

    fn enter_handler(&mut self, handler_pc: u32, exception: Value) -> Result<(), CompileError> {
        let slot = self.spill_slot(0, Kind::Ref);
        self.b.store(IrType::Ptr, exception, slot);
        let target = self.edge_with(handler_pc, vec![Kind::Ref])?;
        self.b.jump(target);
        Ok(())
    }

    /// Branch to dispatch when an exception is pending
    fn check_exception(&mut self) -> Result<(), CompileError> {
        let env = self.env();
        let pending = call_jni(&mut self.b, env, JniFunction::ExceptionCheck, vec![]).unwrap_or(Value::Int(0));
        let raised = self.b.icmp(IntPredicate::Ne, IrType::I8, pending, Value::Int(0));
        let target = self.dispatch_block()?;
        let cont = self.b.create_block();
        self.b.branch(raised, target, cont);
        self.b.switch_to_block(cont);
        Ok(())
    }

    /// Raise a new exception of `class` and dispatch it
    fn throw_new(&mut self, class: &str, message: Option<&str>) -> Result<(), CompileError> {
        let cls = self.class_ref(class);
        let target = self.dispatch_block()?;
        let missing = self.b.icmp(IntPredicate::Eq, IrType::Ptr, cls, Value::Null);
        let found = self.b.create_block();
        self.b.branch(missing, target, found);
        self.b.switch_to_block(found);
        let text = match message {
            Some(text) => self.bridge.cstring(self.module, text),
            None => Value::Null,
        };
        let env = self.env();
        call_jni(
            &mut self.b,
            env,
            JniFunction::ThrowNew,
            vec![(IrType::Ptr, cls), (IrType::Ptr, text)],
        );
        self.b.jump(target);
        Ok(())
    }

    /// Raise `class` when `cond` holds; continue in a fresh block otherwise
    fn throw_if(&mut self, cond: Value, class: &str, message: Option<&str>) -> Result<(), CompileError> {
        let fail = self.b.create_block();
        let ok = self.b.create_block();
        self.b.branch(cond, fail, ok);
        self.b.switch_to_block(fail);
        self.throw_new(class, message)?;
        self.b.switch_to_block(ok);
        Ok(())
    }

    fn null_check(&mut self, value: Value) -> Result<(), CompileError> {
        let is_null = self.b.icmp(IntPredicate::Eq, IrType::Ptr, value, Value::Null);
        self.throw_if(is_null, NULL_POINTER, None)
    }

    // ===== Helpers =====

    fn call_helper(&mut self, helper: FunctionId) -> Value {
        let env = self.env();
        self.b
            .call(IrType::Ptr, Callee::Function(helper), vec![(IrType::Ptr, env)])
            .unwrap_or(Value::Null)
    }

    /// Global reference to a class, null with an exception pending on failure
    fn class_ref(&mut self, name: &str) -> Value {
        let helper = self.bridge.class_ref(self.module, name);
        self.call_helper(helper)
    }

    /// Class reference that must exist for execution to continue
    fn resolved_class(&mut self, name: &str) -> Result<Value, CompileError> {
        let class = self.class_ref(name);
        self.check_exception()?;
        Ok(class)
    }

    fn intrinsic(&mut self, name: &str, ret: IrType, arg: IrType, value: Value) -> Value {
        self.module.declare(name, ret, vec![arg]);
        self.b
            .call(ret, Callee::Declared(name.to_string()), vec![(arg, value)])
            .unwrap_or(Value::Undef)
    }

    // ===== Instructions =====

    fn lift_insn(&mut self, insn: &Instruction) -> Result<(), CompileError> {
        let op = insn.opcode;
        let byte = op as u8;
        match op {
            Opcode::Nop => {}

            // ===== Constants =====
            Opcode::AconstNull => self.push(Kind::Ref, Value::Null),
            Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5 => self.push(Kind::Int, Value::Int(byte as i64 - 3)),
            Opcode::Lconst0 | Opcode::Lconst1 => self.push(Kind::Long, Value::Int(byte as i64 - 9)),
            Opcode::Fconst0 | Opcode::Fconst1 | Opcode::Fconst2 => {
                self.push(Kind::Float, Value::f32((byte - 0x0b) as f32))
            }
            Opcode::Dconst0 | Opcode::Dconst1 => self.push(Kind::Double, Value::f64((byte - 0x0e) as f64)),
            Opcode::Bipush | Opcode::Sipush => {
                let value = match insn.operand {
                    Operand::Int(v) => v,
                    _ => return Err(self.fail(CompileErrorKind::UnsupportedInstruction)),
                };
                self.push(Kind::Int, Value::Int(value as i64));
            }
            Opcode::Ldc | Opcode::LdcW | Opcode::Ldc2W => {
                let index = self.constant_index(insn)?;
                self.lift_ldc(index)?;
            }

            // ===== Locals =====
            _ if (0x15..=0x19).contains(&byte) || (0x1a..=0x2d).contains(&byte) => {
                let kind = if byte <= 0x19 {
                    FAMILY[(byte - 0x15) as usize]
                } else {
                    FAMILY[((byte - 0x1a) / 4) as usize]
                };
                let index = self.local_index(insn)?;
                let slot = self.local_slot(index, kind);
                let value = self.b.load(kind.ir_type(), slot);
                self.push(kind, value);
            }
            _ if (0x36..=0x3a).contains(&byte) || (0x3b..=0x4e).contains(&byte) => {
                let kind = if byte <= 0x3a {
                    FAMILY[(byte - 0x36) as usize]
                } else {
                    FAMILY[((byte - 0x3b) / 4) as usize]
                };
                let index = self.local_index(insn)?;
                let value = self.pop_value()?;
                self.store_local(index, kind, value);
            }
            Opcode::Iinc => {
                let (index, delta) = match insn.operand {
                    Operand::Iinc { local, delta } => (local, delta),
                    _ => return Err(self.fail(CompileErrorKind::UnsupportedInstruction)),
                };
                let slot = self.local_slot(index, Kind::Int);
                let value = self.b.load(IrType::I32, slot);
                let sum = self.b.bin(BinOp::Add, IrType::I32, value, Value::Int(delta as i64));
                self.b.store(IrType::I32, sum, slot);
            }

            // ===== Arrays =====
            _ if (0x2e..=0x35).contains(&byte) => self.lift_array_load(ARRAY_ELEMENTS[(byte - 0x2e) as usize])?,
            _ if (0x4f..=0x56).contains(&byte) => self.lift_array_store(ARRAY_ELEMENTS[(byte - 0x4f) as usize])?,
            Opcode::Newarray => {
                let ty = match insn.operand {
                    Operand::ArrayType(code) => JniType::from_array_code(code),
                    _ => None,
                }
                .ok_or_else(|| self.fail(CompileErrorKind::UnsupportedInstruction))?;
                let count = self.pop_value()?;
                let env = self.env();
                let array = call_jni(&mut self.b, env, JniFunction::NewArray(ty), vec![(IrType::I32, count)])
                    .unwrap_or(Value::Null);
                self.check_exception()?;
                self.push(Kind::Ref, array);
            }
            Opcode::Anewarray => {
                let name = self.class_operand(insn)?;
                let count = self.pop_value()?;
                let class = self.resolved_class(&name)?;
                let env = self.env();
                let array = call_jni(
                    &mut self.b,
                    env,
                    JniFunction::NewObjectArray,
                    vec![(IrType::I32, count), (IrType::Ptr, class), (IrType::Ptr, Value::Null)],
                )
                .unwrap_or(Value::Null);
                self.check_exception()?;
                self.push(Kind::Ref, array);
            }
            Opcode::Arraylength => {
                let array = self.pop_value()?;
                self.null_check(array)?;
                let env = self.env();
                let length = call_jni(&mut self.b, env, JniFunction::GetArrayLength, vec![(IrType::Ptr, array)])
                    .unwrap_or(Value::Int(0));
                self.push(Kind::Int, length);
            }

            // ===== Stack manipulation =====
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Pop2 => {
                let (kind, _) = self.pop()?;
                if !kind.is_wide() {
                    self.pop()?;
                }
            }
            Opcode::Dup => {
                let top = self.pop()?;
                self.stack.extend([top, top]);
            }
            Opcode::DupX1 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.stack.extend([v1, v2, v1]);
            }
            Opcode::DupX2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                if v2.0.is_wide() {
                    self.stack.extend([v1, v2, v1]);
                } else {
                    let v3 = self.pop()?;
                    self.stack.extend([v1, v3, v2, v1]);
                }
            }
            Opcode::Dup2 => {
                let v1 = self.pop()?;
                if v1.0.is_wide() {
                    self.stack.extend([v1, v1]);
                } else {
                    let v2 = self.pop()?;
                    self.stack.extend([v2, v1, v2, v1]);
                }
            }
            Opcode::Swap => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.stack.extend([v1, v2]);
            }

            // ===== Arithmetic =====
            Opcode::Iadd => self.binary(Kind::Int, BinOp::Add)?,
            Opcode::Ladd => self.binary(Kind::Long, BinOp::Add)?,
            Opcode::Fadd => self.binary(Kind::Float, BinOp::FAdd)?,
            Opcode::Dadd => self.binary(Kind::Double, BinOp::FAdd)?,
            Opcode::Isub => self.binary(Kind::Int, BinOp::Sub)?,
            Opcode::Lsub => self.binary(Kind::Long, BinOp::Sub)?,
            Opcode::Fsub => self.binary(Kind::Float, BinOp::FSub)?,
            Opcode::Dsub => self.binary(Kind::Double, BinOp::FSub)?,
            Opcode::Imul => self.binary(Kind::Int, BinOp::Mul)?,
            Opcode::Lmul => self.binary(Kind::Long, BinOp::Mul)?,
            Opcode::Fmul => self.binary(Kind::Float, BinOp::FMul)?,
            Opcode::Dmul => self.binary(Kind::Double, BinOp::FMul)?,
            Opcode::Fdiv => self.binary(Kind::Float, BinOp::FDiv)?,
            Opcode::Ddiv => self.binary(Kind::Double, BinOp::FDiv)?,
            Opcode::Frem => self.binary(Kind::Float, BinOp::FRem)?,
            Opcode::Drem => self.binary(Kind::Double, BinOp::FRem)?,
            Opcode::Idiv => self.division(Kind::Int, false)?,
            Opcode::Ldiv => self.division(Kind::Long, false)?,
            Opcode::Irem => self.division(Kind::Int, true)?,
            Opcode::Lrem => self.division(Kind::Long, true)?,
            Opcode::Ineg | Opcode::Lneg => {
                let (kind, value) = self.pop()?;
                let negated = self.b.bin(BinOp::Sub, kind.ir_type(), Value::Int(0), value);
                self.push(kind, negated);
            }
            Opcode::Fneg | Opcode::Dneg => {
                let (kind, value) = self.pop()?;
                let negated = self.b.fneg(kind.ir_type(), value);
                self.push(kind, negated);
            }
            Opcode::Ishl => self.shift(Kind::Int, BinOp::Shl)?,
            Opcode::Lshl => self.shift(Kind::Long, BinOp::Shl)?,
            Opcode::Ishr => self.shift(Kind::Int, BinOp::AShr)?,
            Opcode::Lshr => self.shift(Kind::Long, BinOp::AShr)?,
            Opcode::Iushr => self.shift(Kind::Int, BinOp::LShr)?,
            Opcode::Lushr => self.shift(Kind::Long, BinOp::LShr)?,
            Opcode::Iand => self.binary(Kind::Int, BinOp::And)?,
            Opcode::Land => self.binary(Kind::Long, BinOp::And)?,
            Opcode::Ior => self.binary(Kind::Int, BinOp::Or)?,
            Opcode::Lor => self.binary(Kind::Long, BinOp::Or)?,
            Opcode::Ixor => self.binary(Kind::Int, BinOp::Xor)?,
            Opcode::Lxor => self.binary(Kind::Long, BinOp::Xor)?,

            // ===== Conversions =====
            Opcode::I2l => self.convert(CastOp::SExt, Kind::Int, Kind::Long)?,
            Opcode::I2f => self.convert(CastOp::SIToFP, Kind::Int, Kind::Float)?,
            Opcode::I2d => self.convert(CastOp::SIToFP, Kind::Int, Kind::Double)?,
            Opcode::L2i => self.convert(CastOp::Trunc, Kind::Long, Kind::Int)?,
            Opcode::L2f => self.convert(CastOp::SIToFP, Kind::Long, Kind::Float)?,
            Opcode::L2d => self.convert(CastOp::SIToFP, Kind::Long, Kind::Double)?,
            Opcode::F2d => self.convert(CastOp::FPExt, Kind::Float, Kind::Double)?,
            Opcode::D2f => self.convert(CastOp::FPTrunc, Kind::Double, Kind::Float)?,
            Opcode::F2i => self.saturating(Kind::Float, Kind::Int)?,
            Opcode::F2l => self.saturating(Kind::Float, Kind::Long)?,
            Opcode::D2i => self.saturating(Kind::Double, Kind::Int)?,
            Opcode::D2l => self.saturating(Kind::Double, Kind::Long)?,
            Opcode::I2b => self.narrow(IrType::I8, CastOp::SExt)?,
            Opcode::I2c => self.narrow(IrType::I16, CastOp::ZExt)?,
            Opcode::I2s => self.narrow(IrType::I16, CastOp::SExt)?,

            // ===== Comparisons =====
            Opcode::Lcmp => {
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                let gt = self.b.icmp(IntPredicate::Sgt, IrType::I64, lhs, rhs);
                let lt = self.b.icmp(IntPredicate::Slt, IrType::I64, lhs, rhs);
                let below = self.b.select(IrType::I32, lt, Value::Int(-1), Value::Int(0));
                let result = self.b.select(IrType::I32, gt, Value::Int(1), below);
                self.push(Kind::Int, result);
            }
            Opcode::Fcmpl | Opcode::Fcmpg | Opcode::Dcmpl | Opcode::Dcmpg => {
                let ty = if matches!(op, Opcode::Fcmpl | Opcode::Fcmpg) {
                    IrType::F32
                } else {
                    IrType::F64
                };
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                let eq = self.b.fcmp(FloatPredicate::Oeq, ty, lhs, rhs);
                let result = if matches!(op, Opcode::Fcmpl | Opcode::Dcmpl) {
                    // NaN compares as less
                    let gt = self.b.fcmp(FloatPredicate::Ogt, ty, lhs, rhs);
                    let rest = self.b.select(IrType::I32, eq, Value::Int(0), Value::Int(-1));
                    self.b.select(IrType::I32, gt, Value::Int(1), rest)
                } else {
                    let lt = self.b.fcmp(FloatPredicate::Olt, ty, lhs, rhs);
                    let rest = self.b.select(IrType::I32, eq, Value::Int(0), Value::Int(1));
                    self.b.select(IrType::I32, lt, Value::Int(-1), rest)
                };
                self.push(Kind::Int, result);
            }

            // ===== Control flow =====
            Opcode::Ifeq | Opcode::Ifne | Opcode::Iflt | Opcode::Ifge | Opcode::Ifgt | Opcode::Ifle => {
                let value = self.pop_value()?;
                let cond = self.b.icmp(int_predicate(byte - 0x99), IrType::I32, value, Value::Int(0));
                self.conditional(insn, cond)?;
            }
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple => {
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                let cond = self.b.icmp(int_predicate(byte - 0x9f), IrType::I32, lhs, rhs);
                self.conditional(insn, cond)?;
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                let env = self.env();
                let same = call_jni(
                    &mut self.b,
                    env,
                    JniFunction::IsSameObject,
                    vec![(IrType::Ptr, lhs), (IrType::Ptr, rhs)],
                )
                .unwrap_or(Value::Int(0));
                let pred = if op == Opcode::IfAcmpeq {
                    IntPredicate::Ne
                } else {
                    IntPredicate::Eq
                };
                let cond = self.b.icmp(pred, IrType::I8, same, Value::Int(0));
                self.conditional(insn, cond)?;
            }
            Opcode::Ifnull | Opcode::Ifnonnull => {
                let value = self.pop_value()?;
                let pred = if op == Opcode::Ifnull {
                    IntPredicate::Eq
                } else {
                    IntPredicate::Ne
                };
                let cond = self.b.icmp(pred, IrType::Ptr, value, Value::Null);
                self.conditional(insn, cond)?;
            }
            Opcode::Goto | Opcode::GotoW => {
                let target = self.branch_target(insn)?;
                self.spill();
                let block = self.edge(target)?;
                self.b.jump(block);
            }
            Opcode::Tableswitch | Opcode::Lookupswitch => self.lift_switch(insn)?,
            Opcode::Ireturn | Opcode::Lreturn | Opcode::Freturn | Opcode::Dreturn | Opcode::Areturn => {
                let value = self.pop_value()?;
                let value = match self.ret_type {
                    JniType::Boolean => {
                        let bit = self.b.bin(BinOp::And, IrType::I32, value, Value::Int(1));
                        self.b.cast(CastOp::Trunc, IrType::I32, bit, IrType::I8)
                    }
                    ty => to_jni(&mut self.b, ty, value),
                };
                self.b.ret(Some(value));
            }
            Opcode::Return => self.b.ret(None),
            Opcode::Athrow => {
                let exception = self.pop_value()?;
                self.null_check(exception)?;
                let env = self.env();
                call_jni(&mut self.b, env, JniFunction::Throw, vec![(IrType::Ptr, exception)]);
                let target = self.dispatch_block()?;
                self.b.jump(target);
            }

            // ===== Fields =====
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => self.lift_field(insn)?,

            // ===== Invocation =====
            Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic | Opcode::Invokeinterface => {
                self.lift_invoke(insn)?
            }

            // ===== Objects =====
            Opcode::New => {
                let name = self.class_operand(insn)?;
                let class = self.resolved_class(&name)?;
                let env = self.env();
                let object = call_jni(&mut self.b, env, JniFunction::AllocObject, vec![(IrType::Ptr, class)])
                    .unwrap_or(Value::Null);
                self.check_exception()?;
                self.push(Kind::Ref, object);
            }
            Opcode::Checkcast => {
                let name = self.class_operand(insn)?;
                let (_, object) = *self
                    .stack
                    .last()
                    .ok_or_else(|| self.fail(CompileErrorKind::StackUnderflow))?;
                let class = self.resolved_class(&name)?;
                let is_null = self.b.icmp(IntPredicate::Eq, IrType::Ptr, object, Value::Null);
                let test = self.b.create_block();
                let ok = self.b.create_block();
                self.b.branch(is_null, ok, test);
                self.b.switch_to_block(test);
                let env = self.env();
                let is = call_jni(
                    &mut self.b,
                    env,
                    JniFunction::IsInstanceOf,
                    vec![(IrType::Ptr, object), (IrType::Ptr, class)],
                )
                .unwrap_or(Value::Int(0));
                let rejected = self.b.icmp(IntPredicate::Eq, IrType::I8, is, Value::Int(0));
                let message = format!("Cannot cast to {}", name.replace('/', "."));
                self.throw_if(rejected, CLASS_CAST, Some(&message))?;
                self.b.jump(ok);
                self.b.switch_to_block(ok);
            }
            Opcode::Instanceof => {
                let name = self.class_operand(insn)?;
                let object = self.pop_value()?;
                let class = self.resolved_class(&name)?;
                let env = self.env();
                let is = call_jni(
                    &mut self.b,
                    env,
                    JniFunction::IsInstanceOf,
                    vec![(IrType::Ptr, object), (IrType::Ptr, class)],
                )
                .unwrap_or(Value::Int(0));
                // JNI treats null as an instance of every class
                let matched = self.b.icmp(IntPredicate::Ne, IrType::I8, is, Value::Int(0));
                let present = self.b.icmp(IntPredicate::Ne, IrType::Ptr, object, Value::Null);
                let both = self.b.bin(BinOp::And, IrType::I1, matched, present);
                let result = self.b.cast(CastOp::ZExt, IrType::I1, both, IrType::I32);
                self.push(Kind::Int, result);
            }
            Opcode::Monitorenter | Opcode::Monitorexit => {
                let object = self.pop_value()?;
                self.null_check(object)?;
                let f = if op == Opcode::Monitorenter {
                    JniFunction::MonitorEnter
                } else {
                    JniFunction::MonitorExit
                };
                let env = self.env();
                call_jni(&mut self.b, env, f, vec![(IrType::Ptr, object)]);
                self.check_exception()?;
            }

            _ => return Err(self.fail(CompileErrorKind::UnsupportedInstruction)),
        }
        Ok(())
    }

    // ===== Operand decoding =====

    fn constant_index(&self, insn: &Instruction) -> Result<u16, CompileError> {
        match insn.operand {
            Operand::Constant(index) | Operand::Interface { index, .. } => Ok(index),
            _ => Err(self.fail(CompileErrorKind::UnsupportedInstruction)),
        }
    }

    fn class_operand(&self, insn: &Instruction) -> Result<String, CompileError> {
        let index = self.constant_index(insn)?;
        self.pool.class_name(index).map_err(|e| self.fail(e.into()))
    }

    fn local_index(&self, insn: &Instruction) -> Result<u16, CompileError> {
        insn.local().ok_or_else(|| self.fail(CompileErrorKind::UnsupportedInstruction))
    }

    fn branch_target(&self, insn: &Instruction) -> Result<u32, CompileError> {
        match insn.operand {
            Operand::Branch(target) => Ok(target),
            _ => Err(self.fail(CompileErrorKind::UnsupportedInstruction)),
        }
    }

    fn format_error(&self, e: ClassFormatError) -> CompileError {
        self.fail(e.into())
    }

    // ===== Lowering helpers =====

    fn binary(&mut self, kind: Kind, op: BinOp) -> Result<(), CompileError> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        let result = self.b.bin(op, kind.ir_type(), lhs, rhs);
        self.push(kind, result);
        Ok(())
    }

    /// Integer division: zero divisors raise, `MIN / -1` wraps
    fn division(&mut self, kind: Kind, remainder: bool) -> Result<(), CompileError> {
        let ty = kind.ir_type();
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        let zero = self.b.icmp(IntPredicate::Eq, ty, rhs, Value::Int(0));
        self.throw_if(zero, ARITHMETIC, Some("/ by zero"))?;

        let minus_one = self.b.icmp(IntPredicate::Eq, ty, rhs, Value::Int(-1));
        let divisor = self.b.select(ty, minus_one, Value::Int(1), rhs);
        let result = if remainder {
            let rem = self.b.bin(BinOp::SRem, ty, lhs, divisor);
            self.b.select(ty, minus_one, Value::Int(0), rem)
        } else {
            let quot = self.b.bin(BinOp::SDiv, ty, lhs, divisor);
            let negated = self.b.bin(BinOp::Sub, ty, Value::Int(0), lhs);
            self.b.select(ty, minus_one, negated, quot)
        };
        self.push(kind, result);
        Ok(())
    }

    fn shift(&mut self, kind: Kind, op: BinOp) -> Result<(), CompileError> {
        let count = self.pop_value()?;
        let value = self.pop_value()?;
        let (mask, ty) = if kind == Kind::Long {
            (63, IrType::I64)
        } else {
            (31, IrType::I32)
        };
        let masked = self.b.bin(BinOp::And, IrType::I32, count, Value::Int(mask));
        let amount = if ty == IrType::I64 {
            self.b.cast(CastOp::ZExt, IrType::I32, masked, IrType::I64)
        } else {
            masked
        };
        let result = self.b.bin(op, ty, value, amount);
        self.push(kind, result);
        Ok(())
    }

    fn convert(&mut self, op: CastOp, from: Kind, to: Kind) -> Result<(), CompileError> {
        let value = self.pop_value()?;
        let result = self.b.cast(op, from.ir_type(), value, to.ir_type());
        self.push(to, result);
        Ok(())
    }

    /// Float to integer: NaN becomes zero, out-of-range values saturate
    fn saturating(&mut self, from: Kind, to: Kind) -> Result<(), CompileError> {
        let value = self.pop_value()?;
        let name = format!(
            "llvm.fptosi.sat.{}.{}",
            intrinsic_suffix(to.ir_type()),
            intrinsic_suffix(from.ir_type())
        );
        let result = self.intrinsic(&name, to.ir_type(), from.ir_type(), value);
        self.push(to, result);
        Ok(())
    }

    fn narrow(&mut self, ty: IrType, extend: CastOp) -> Result<(), CompileError> {
        let value = self.pop_value()?;
        let short = self.b.cast(CastOp::Trunc, IrType::I32, value, ty);
        let result = self.b.cast(extend, ty, short, IrType::I32);
        self.push(Kind::Int, result);
        Ok(())
    }

    fn conditional(&mut self, insn: &Instruction, cond: Value) -> Result<(), CompileError> {
        let target = self.branch_target(insn)?;
        self.spill();
        let taken = self.edge(target)?;
        let fallthrough = self.edge(insn.next_offset())?;
        self.b.branch(cond, taken, fallthrough);
        Ok(())
    }

    fn lift_switch(&mut self, insn: &Instruction) -> Result<(), CompileError> {
        let key = self.pop_value()?;
        self.spill();
        let (default, arms): (u32, Vec<(i64, u32)>) = match &insn.operand {
            Operand::TableSwitch { default, low, targets } => (
                *default,
                targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (*low as i64 + i as i64, *t))
                    .collect(),
            ),
            Operand::LookupSwitch { default, pairs } => {
                (*default, pairs.iter().map(|(k, t)| (*k as i64, *t)).collect())
            }
            _ => return Err(self.fail(CompileErrorKind::UnsupportedInstruction)),
        };
        let default = self.edge(default)?;
        let mut cases = Vec::with_capacity(arms.len());
        for (value, target) in arms {
            cases.push((value, self.edge(target)?));
        }
        self.b.terminate(Terminator::Switch {
            ty: IrType::I32,
            value: key,
            default,
            cases,
        });
        Ok(())
    }

    fn lift_ldc(&mut self, index: u16) -> Result<(), CompileError> {
        let constant = self.pool.loadable(index).map_err(|e| self.format_error(e))?;
        match constant {
            Loadable::Int(v) => self.push(Kind::Int, Value::Int(v as i64)),
            Loadable::Float(v) => self.push(Kind::Float, Value::f32(v)),
            Loadable::Long(v) => self.push(Kind::Long, Value::Int(v)),
            Loadable::Double(v) => self.push(Kind::Double, Value::f64(v)),
            Loadable::String(text) => {
                let helper = self.bridge.string(self.module, &text);
                let value = self.call_helper(helper);
                self.check_exception()?;
                self.push(Kind::Ref, value);
            }
            Loadable::Class(name) => {
                let class = self.resolved_class(&name)?;
                self.push(Kind::Ref, class);
            }
            Loadable::MethodType | Loadable::MethodHandle | Loadable::Dynamic => {
                return Err(self.fail(CompileErrorKind::UnsupportedConstant))
            }
        }
        Ok(())
    }

    fn lift_array_load(&mut self, element: JniType) -> Result<(), CompileError> {
        let index = self.pop_value()?;
        let array = self.pop_value()?;
        self.null_check(array)?;
        let env = self.env();
        let value = if element == JniType::Object {
            call_jni(
                &mut self.b,
                env,
                JniFunction::GetObjectArrayElement,
                vec![(IrType::Ptr, array), (IrType::I32, index)],
            )
            .unwrap_or(Value::Null)
        } else {
            let ty = element.ir_type();
            let buffer = self.scratch_slot(ty);
            call_jni(
                &mut self.b,
                env,
                JniFunction::GetArrayRegion(element),
                vec![
                    (IrType::Ptr, array),
                    (IrType::I32, index),
                    (IrType::I32, Value::Int(1)),
                    (IrType::Ptr, buffer),
                ],
            );
            self.check_exception()?;
            let raw = self.b.load(ty, buffer);
            from_jni(&mut self.b, element, raw)
        };
        if element == JniType::Object {
            self.check_exception()?;
        }
        self.push(Kind::of(element), value);
        Ok(())
    }

    fn lift_array_store(&mut self, element: JniType) -> Result<(), CompileError> {
        let value = self.pop_value()?;
        let index = self.pop_value()?;
        let array = self.pop_value()?;
        self.null_check(array)?;
        let env = self.env();
        if element == JniType::Object {
            call_jni(
                &mut self.b,
                env,
                JniFunction::SetObjectArrayElement,
                vec![(IrType::Ptr, array), (IrType::I32, index), (IrType::Ptr, value)],
            );
        } else {
            let ty = element.ir_type();
            let buffer = self.scratch_slot(ty);
            let raw = to_jni(&mut self.b, element, value);
            self.b.store(ty, raw, buffer);
            call_jni(
                &mut self.b,
                env,
                JniFunction::SetArrayRegion(element),
                vec![
                    (IrType::Ptr, array),
                    (IrType::I32, index),
                    (IrType::I32, Value::Int(1)),
                    (IrType::Ptr, buffer),
                ],
            );
        }
        self.check_exception()
    }

    fn lift_field(&mut self, insn: &Instruction) -> Result<(), CompileError> {
        let index = self.constant_index(insn)?;
        let member = self.pool.member_ref(index).map_err(|e| self.format_error(e))?;
        let field_type = FieldType::parse(&member.descriptor).map_err(|e| self.format_error(e))?;
        let ty = JniType::of(&field_type);
        let kind = Kind::of(ty);
        let is_static = matches!(insn.opcode, Opcode::Getstatic | Opcode::Putstatic);

        let value = match insn.opcode {
            Opcode::Putstatic | Opcode::Putfield => Some(self.pop_value()?),
            _ => None,
        };
        let receiver = if is_static {
            None
        } else {
            let object = self.pop_value()?;
            self.null_check(object)?;
            Some(object)
        };

        let helper = self
            .bridge
            .field_id(self.module, &member.owner, &member.name, &member.descriptor, is_static);
        let field = self.call_helper(helper);
        self.check_exception()?;
        // The id lookup above already resolved the class
        let target = match receiver {
            Some(object) => object,
            None => self.class_ref(&member.owner),
        };

        let env = self.env();
        match value {
            Some(value) => {
                let raw = to_jni(&mut self.b, ty, value);
                let f = if is_static {
                    JniFunction::SetStaticField(ty)
                } else {
                    JniFunction::SetField(ty)
                };
                call_jni(
                    &mut self.b,
                    env,
                    f,
                    vec![(IrType::Ptr, target), (IrType::Ptr, field), (ty.ir_type(), raw)],
                );
            }
            None => {
                let f = if is_static {
                    JniFunction::GetStaticField(ty)
                } else {
                    JniFunction::GetField(ty)
                };
                let raw = call_jni(&mut self.b, env, f, vec![(IrType::Ptr, target), (IrType::Ptr, field)])
                    .unwrap_or(Value::Undef);
                let value = from_jni(&mut self.b, ty, raw);
                self.push(kind, value);
            }
        }
        Ok(())
    }

    fn lift_invoke(&mut self, insn: &Instruction) -> Result<(), CompileError> {
        let index = self.constant_index(insn)?;
        let member = self.pool.member_ref(index).map_err(|e| self.format_error(e))?;
        let descriptor = MethodDescriptor::parse(&member.descriptor).map_err(|e| self.format_error(e))?;
        let ret = JniType::of_return(descriptor.ret.as_ref());

        let mut args = Vec::with_capacity(descriptor.params.len());
        for _ in 0..descriptor.params.len() {
            args.push(self.pop_value()?);
        }
        args.reverse();
        let typed_args: Vec<(JniType, Value)> = descriptor
            .params
            .iter()
            .map(JniType::of)
            .zip(args)
            .collect();

        let result = if insn.opcode == Opcode::Invokestatic {
            match self.direct_callee(&member.owner, &member.name, &member.descriptor) {
                Some(function) => {
                    let class = if self.method.is_static() {
                        self.b.param(1)
                    } else {
                        let own = self.class;
                        self.resolved_class(&own.name)?
                    };
                    let env = self.env();
                    let mut call_args = vec![(IrType::Ptr, env), (IrType::Ptr, class)];
                    for (ty, value) in typed_args {
                        let raw = to_jni(&mut self.b, ty, value);
                        call_args.push((ty.ir_type(), raw));
                    }
                    self.b.call(ret.ir_type(), Callee::Function(function), call_args)
                }
                None => {
                    let helper =
                        self.bridge
                            .method_id(self.module, &member.owner, &member.name, &member.descriptor, true);
                    let method = self.call_helper(helper);
                    self.check_exception()?;
                    let class = self.class_ref(&member.owner);
                    let buffer = self.argument_buffer(typed_args);
                    let env = self.env();
                    call_jni(
                        &mut self.b,
                        env,
                        JniFunction::CallStaticMethodA(ret),
                        vec![(IrType::Ptr, class), (IrType::Ptr, method), (IrType::Ptr, buffer)],
                    )
                }
            }
        } else {
            let receiver = self.pop_value()?;
            self.null_check(receiver)?;
            let helper = self
                .bridge
                .method_id(self.module, &member.owner, &member.name, &member.descriptor, false);
            let method = self.call_helper(helper);
            self.check_exception()?;
            let buffer = self.argument_buffer(typed_args);
            let env = self.env();
            if insn.opcode == Opcode::Invokespecial {
                let class = self.class_ref(&member.owner);
                call_jni(
                    &mut self.b,
                    env,
                    JniFunction::CallNonvirtualMethodA(ret),
                    vec![
                        (IrType::Ptr, receiver),
                        (IrType::Ptr, class),
                        (IrType::Ptr, method),
                        (IrType::Ptr, buffer),
                    ],
                )
            } else {
                call_jni(
                    &mut self.b,
                    env,
                    JniFunction::CallMethodA(ret),
                    vec![(IrType::Ptr, receiver), (IrType::Ptr, method), (IrType::Ptr, buffer)],
                )
            }
        };
        self.check_exception()?;

        if let Some(raw) = result {
            let value = from_jni(&mut self.b, ret, raw);
            self.push(Kind::of(ret), value);
        }
        Ok(())
    }

    /// Marked static method of this class, callable without JNI. Synchronized
    /// callees take their lock in the trampoline, so they are called through it.
    fn direct_callee(&self, owner: &str, name: &str, descriptor: &str) -> Option<FunctionId> {
        if owner != self.class.name {
            return None;
        }
        let index = self.class.find_method(name, descriptor)?;
        let id = MethodId {
            class: self.method_id.class,
            index,
        };
        let callee = self.index.method(id);
        if !(callee.marked && callee.is_static()) || callee.is_synchronized() {
            return None;
        }
        self.direct.get(&id).copied()
    }

    /// `jvalue` array holding call arguments; null when there are none
    fn argument_buffer(&mut self, args: Vec<(JniType, Value)>) -> Value {
        if args.is_empty() {
            return Value::Null;
        }
        let buffer = self.b.entry_alloca(IrType::I64, args.len() as u32);
        for (i, (ty, value)) in args.into_iter().enumerate() {
            let raw = to_jni(&mut self.b, ty, value);
            let slot = self.b.gep(IrType::I64, buffer, i as i64);
            self.b.store(ty.ir_type(), raw, slot);
        }
        buffer
    }
}

/// Type suffix of an overloaded intrinsic name
fn intrinsic_suffix(ty: IrType) -> &'static str {
    match ty {
        IrType::F32 => "f32",
        IrType::F64 => "f64",
        IrType::I64 => "i64",
        _ => "i32",
    }
}

/// Predicate for the `if<cond>` families, in opcode order
fn int_predicate(ordinal: u8) -> IntPredicate {
    match ordinal {
        0 => IntPredicate::Eq,
        1 => IntPredicate::Ne,
        2 => IntPredicate::Slt,
        3 => IntPredicate::Sge,
        4 => IntPredicate::Sgt,
        _ => IntPredicate::Sle,
    }
}
