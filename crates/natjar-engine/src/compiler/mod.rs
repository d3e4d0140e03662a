//! Translation engine
//!
//! Lifts each marked method's bytecode into a native function of the shared
//! `NativeModule`. The function takes the JNI calling convention of a native
//! method with the same descriptor: `(JNIEnv*, jobject-or-jclass, args...)`.
//!
//! Compilation runs in two steps: every marked method first gets an empty
//! function so translated code can call its siblings directly, then each body
//! is lifted.

pub mod bridge;
pub mod cfg;
mod lifter;
pub mod registry;

use rustc_hash::FxHashMap;

use crate::classfile::{ClassFormatError, MethodDescriptor, Opcode};
use crate::index::{MethodId, ProgramIndex};
use crate::ir::{Function, FunctionId, IrType, NativeModule};

pub use bridge::{BridgeCache, JniFunction, JniType};
pub use cfg::{build_cfg, CfgError, ControlFlowGraph};
pub use registry::{CompiledMethod, CompiledRegistry};

/// Why a method could not be translated
#[derive(Debug, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("method is not selected for compilation")]
    NotMarked,
    #[error("method has no code")]
    NoBody,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("stack shape at offset {target} differs between predecessors: {expected} vs {found}")]
    StackMismatch {
        target: u32,
        expected: String,
        found: String,
    },
    #[error("unsupported instruction")]
    UnsupportedInstruction,
    #[error("unsupported constant")]
    UnsupportedConstant,
    #[error(transparent)]
    Cfg(#[from] CfgError),
    #[error(transparent)]
    ClassFormat(#[from] ClassFormatError),
}

/// Translation failure with its location
#[derive(Debug, thiserror::Error)]
#[error(
    "Cannot compile {class}.{method}{descriptor} at offset {offset}{}: {kind}",
    .opcode.map(|op| format!(" ({})", op)).unwrap_or_default()
)]
pub struct CompileError {
    pub class: String,
    pub method: String,
    pub descriptor: String,
    pub offset: u32,
    pub opcode: Option<Opcode>,
    #[source]
    pub kind: CompileErrorKind,
}

/// Native signature of a method: `(env, receiver-or-class, params...) -> ret`
pub fn native_signature(descriptor: &MethodDescriptor) -> (Vec<IrType>, IrType) {
    let mut params = vec![IrType::Ptr, IrType::Ptr];
    params.extend(descriptor.params.iter().map(|p| JniType::of(p).ir_type()));
    let ret = JniType::of_return(descriptor.ret.as_ref()).ir_type();
    (params, ret)
}

/// Translates marked methods into one native module
#[derive(Debug)]
pub struct Compiler {
    module: NativeModule,
    bridge: BridgeCache,
    registry: CompiledRegistry,
    functions: FxHashMap<MethodId, FunctionId>,
}

impl Compiler {
    pub fn new(module_name: &str) -> Self {
        Compiler {
            module: NativeModule::new(module_name),
            bridge: BridgeCache::new(),
            registry: CompiledRegistry::new(),
            functions: FxHashMap::default(),
        }
    }

    /// Compile every marked method in index order, marking each compiled
    pub fn compile_marked(&mut self, index: &mut ProgramIndex) -> Result<usize, CompileError> {
        let _span = tracing::info_span!("compile").entered();
        let marked: Vec<MethodId> = index
            .class_ids()
            .flat_map(|class| index.method_ids(class))
            .filter(|&id| index.method(id).marked)
            .collect();

        for &id in &marked {
            self.declare(index, id)?;
        }
        for &id in &marked {
            self.compile_method(index, id)?;
            index.set_compiled(id);
        }
        tracing::info!(
            methods = marked.len(),
            helpers = self.bridge.helper_count(),
            "translation finished"
        );
        Ok(marked.len())
    }

    /// Translate one marked method. Same-class static callees that are
    /// marked are called directly, so callers are expected to compile every
    /// marked method.
    pub fn compile_method(&mut self, index: &ProgramIndex, method: MethodId) -> Result<FunctionId, CompileError> {
        let m = index.method(method);
        if !m.marked {
            return Err(error_at(index, method, 0, None, CompileErrorKind::NotMarked));
        }
        let id = self.declare(index, method)?;
        for sibling in index.method_ids(method.class) {
            let s = index.method(sibling);
            if s.marked && s.is_static() {
                self.declare(index, sibling)?;
            }
        }

        let (params, ret) = {
            let func = self.module.function(id);
            (func.params.clone(), func.ret)
        };
        let mut func = Function::new(id, self.module.function(id).name.clone(), params, ret);
        lifter::lift_method(
            lifter::LiftContext {
                index,
                method,
                module: &mut self.module,
                bridge: &mut self.bridge,
                direct: &self.functions,
            },
            &mut func,
        )?;
        tracing::debug!(
            class = %index.class(method.class).name,
            method = %m.name,
            descriptor = %m.descriptor,
            blocks = func.blocks.len(),
            "method translated"
        );
        *self.module.function_mut(id) = func;
        self.registry.insert(method, id);
        Ok(id)
    }

    /// Function shell for a method, created on first request
    fn declare(&mut self, index: &ProgramIndex, method: MethodId) -> Result<FunctionId, CompileError> {
        if let Some(id) = self.functions.get(&method) {
            return Ok(*id);
        }
        let m = index.method(method);
        let descriptor = MethodDescriptor::parse(&m.descriptor)
            .map_err(|e| error_at(index, method, 0, None, e.into()))?;
        let (params, ret) = native_signature(&descriptor);
        let id = self
            .module
            .add_function(format!("natjar.fn.{}", self.functions.len()), params, ret);
        self.functions.insert(method, id);
        Ok(id)
    }

    pub fn module(&self) -> &NativeModule {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut NativeModule {
        &mut self.module
    }

    pub fn registry(&self) -> &CompiledRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CompiledRegistry {
        &mut self.registry
    }

    pub fn into_parts(self) -> (NativeModule, CompiledRegistry) {
        (self.module, self.registry)
    }
}

pub(crate) fn error_at(
    index: &ProgramIndex,
    method: MethodId,
    offset: u32,
    opcode: Option<Opcode>,
    kind: CompileErrorKind,
) -> CompileError {
    let m = index.method(method);
    CompileError {
        class: index.class(method.class).name.clone(),
        method: m.name.clone(),
        descriptor: m.descriptor.clone(),
        offset,
        opcode,
        kind,
    }
}
