//! Native IR
//!
//! One `NativeModule` per run collects every translated method plus the
//! helper functions and globals they share. The `llvm` backend lowers it,
//! verifies and optimizes it, and renders LLVM textual IR for the external
//! toolchain.

pub mod builder;
pub mod instr;
pub mod llvm;
pub mod types;

pub use builder::FunctionBuilder;
pub use instr::{
    BinOp, Block, BlockId, Callee, CastOp, FloatPredicate, Function, FunctionId, GlobalId, Instr, IntPredicate,
    Linkage, Reg, Terminator, Value,
};
pub use llvm::{emit_textual_ir, BackendError};
pub use types::IrType;

/// Initial contents of a module global
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    /// Mutable pointer cell starting out null
    NullPtr,
    /// Read-only NUL-terminated byte string; the terminator is added on output
    CString(Vec<u8>),
}

/// A module global
#[derive(Debug, Clone)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub init: GlobalInit,
}

/// An external function the module calls by name
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub ret: IrType,
    pub params: Vec<IrType>,
}

/// The translation unit
#[derive(Debug, Clone)]
pub struct NativeModule {
    name: String,
    functions: Vec<Function>,
    declarations: Vec<Declaration>,
    globals: Vec<Global>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        NativeModule {
            name: name.into(),
            functions: vec![],
            declarations: vec![],
            globals: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a function without a body
    pub fn add_function(&mut self, name: impl Into<String>, params: Vec<IrType>, ret: IrType) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function::new(id, name, params, ret));
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Declare an external function; repeated declarations are merged
    pub fn declare(&mut self, name: &str, ret: IrType, params: Vec<IrType>) {
        if !self.declarations.iter().any(|d| d.name == name) {
            self.declarations.push(Declaration {
                name: name.to_string(),
                ret,
                params,
            });
        }
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn add_global(&mut self, name: impl Into<String>, init: GlobalInit) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            id,
            name: name.into(),
            init,
        });
        id
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Give a function its final symbol name
    pub fn rename(&mut self, id: FunctionId, symbol: impl Into<String>) {
        self.function_mut(id).name = symbol.into();
    }

    /// Make a function visible outside the built library
    pub fn export(&mut self, id: FunctionId) {
        self.function_mut(id).linkage = Linkage::External;
    }
}
