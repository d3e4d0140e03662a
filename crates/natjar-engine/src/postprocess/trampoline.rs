//! Trampoline bodies
//!
//! A compiled method keeps its name, descriptor and flags; only its code is
//! replaced with a forward to the native stub.

use crate::classfile::{Code, CodeAssembler, ConstantPool, FieldType, MethodDescriptor, Opcode};

use super::PostprocessError;

/// Explicit and `_0` load forms for a value type
fn load_ops(ty: &FieldType) -> (Opcode, Opcode) {
    match ty {
        FieldType::Long => (Opcode::Lload, Opcode::Lload0),
        FieldType::Float => (Opcode::Fload, Opcode::Fload0),
        FieldType::Double => (Opcode::Dload, Opcode::Dload0),
        FieldType::Object(_) | FieldType::Array(_) => (Opcode::Aload, Opcode::Aload0),
        _ => (Opcode::Iload, Opcode::Iload0),
    }
}

fn return_op(ty: Option<&FieldType>) -> Opcode {
    match ty {
        None => Opcode::Return,
        Some(FieldType::Long) => Opcode::Lreturn,
        Some(FieldType::Float) => Opcode::Freturn,
        Some(FieldType::Double) => Opcode::Dreturn,
        Some(FieldType::Object(_)) | Some(FieldType::Array(_)) => Opcode::Areturn,
        Some(_) => Opcode::Ireturn,
    }
}

/// Where the trampoline forwards to
pub struct StubTarget<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
}

/// Body that loads the receiver and parameters, calls the stub, and returns
/// its result
pub fn trampoline_code(pool: &mut ConstantPool, target: &StubTarget<'_>) -> Result<Code, PostprocessError> {
    let descriptor = MethodDescriptor::parse(target.descriptor)?;
    let method_ref = pool.intern_method_ref(target.owner, target.name, target.descriptor, false)?;
    let code_name = pool.intern_utf8("Code")?;

    let mut asm = CodeAssembler::new();
    let mut slot = 0u16;
    if !target.is_static {
        asm.op(Opcode::Aload0);
        slot = 1;
    }
    for param in &descriptor.params {
        let (base, short_base) = load_ops(param);
        asm.local(base, short_base, slot);
        slot += param.slot_size();
    }
    let call = if target.is_static {
        Opcode::Invokestatic
    } else {
        Opcode::Invokespecial
    };
    asm.op_u16(call, method_ref);
    asm.op(return_op(descriptor.ret.as_ref()));

    let ret_slots = descriptor.ret.as_ref().map_or(0, FieldType::slot_size);
    let max_stack = slot.max(ret_slots);
    Ok(asm.finish(code_name, max_stack, slot)?)
}
