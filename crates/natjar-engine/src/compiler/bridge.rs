//! Managed-runtime bridge
//!
//! Translated code reaches the JVM through the JNI function table: every
//! `JNIEnv*` points at a table of function pointers at fixed indices. This
//! module enumerates the entries the translator uses, emits indirect calls
//! through the table, and generates the cached lookup helpers
//! (`natjar.class.N`, `natjar.method.N`, `natjar.field.N`, `natjar.string.N`)
//! that resolve class references, method and field ids, and string literals
//! once per process.

use rustc_hash::FxHashMap;

use crate::classfile::constants::encode_modified_utf8;
use crate::classfile::FieldType;
use crate::ir::{
    Callee, CastOp, Function, FunctionBuilder, FunctionId, GlobalId, GlobalInit, IntPredicate, IrType, NativeModule,
    Value,
};

/// JNI value types, in function-table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JniType {
    Object,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl JniType {
    /// JNI type of a field or parameter type
    pub fn of(ty: &FieldType) -> JniType {
        match ty {
            FieldType::Boolean => JniType::Boolean,
            FieldType::Byte => JniType::Byte,
            FieldType::Char => JniType::Char,
            FieldType::Short => JniType::Short,
            FieldType::Int => JniType::Int,
            FieldType::Long => JniType::Long,
            FieldType::Float => JniType::Float,
            FieldType::Double => JniType::Double,
            FieldType::Object(_) | FieldType::Array(_) => JniType::Object,
        }
    }

    /// JNI type of a method's return type
    pub fn of_return(ret: Option<&FieldType>) -> JniType {
        ret.map_or(JniType::Void, JniType::of)
    }

    /// Position in the `Call<T>Method` / `Get<T>Field` families
    fn ordinal(self) -> usize {
        self as usize
    }

    /// Position in the primitive array families (`New<P>Array`, ...)
    fn primitive_ordinal(self) -> usize {
        match self {
            JniType::Object | JniType::Void => 0,
            other => other as usize - 1,
        }
    }

    pub fn ir_type(self) -> IrType {
        match self {
            JniType::Object => IrType::Ptr,
            JniType::Boolean | JniType::Byte => IrType::I8,
            JniType::Char | JniType::Short => IrType::I16,
            JniType::Int => IrType::I32,
            JniType::Long => IrType::I64,
            JniType::Float => IrType::F32,
            JniType::Double => IrType::F64,
            JniType::Void => IrType::Void,
        }
    }

    /// Element type of a `newarray` type code
    pub fn from_array_code(code: u8) -> Option<JniType> {
        Some(match code {
            4 => JniType::Boolean,
            5 => JniType::Char,
            6 => JniType::Float,
            7 => JniType::Double,
            8 => JniType::Byte,
            9 => JniType::Short,
            10 => JniType::Int,
            11 => JniType::Long,
            _ => return None,
        })
    }
}

/// JNI function table entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JniFunction {
    FindClass,
    Throw,
    ThrowNew,
    ExceptionOccurred,
    ExceptionClear,
    NewGlobalRef,
    DeleteLocalRef,
    IsSameObject,
    AllocObject,
    IsInstanceOf,
    GetMethodID,
    CallMethodA(JniType),
    CallNonvirtualMethodA(JniType),
    GetFieldID,
    GetField(JniType),
    SetField(JniType),
    GetStaticMethodID,
    CallStaticMethodA(JniType),
    GetStaticFieldID,
    GetStaticField(JniType),
    SetStaticField(JniType),
    NewStringUTF,
    GetArrayLength,
    NewObjectArray,
    GetObjectArrayElement,
    SetObjectArrayElement,
    NewArray(JniType),
    GetArrayRegion(JniType),
    SetArrayRegion(JniType),
    MonitorEnter,
    MonitorExit,
    ExceptionCheck,
}

impl JniFunction {
    /// Index in the function table
    pub fn index(self) -> usize {
        match self {
            JniFunction::FindClass => 6,
            JniFunction::Throw => 13,
            JniFunction::ThrowNew => 14,
            JniFunction::ExceptionOccurred => 15,
            JniFunction::ExceptionClear => 17,
            JniFunction::NewGlobalRef => 21,
            JniFunction::DeleteLocalRef => 23,
            JniFunction::IsSameObject => 24,
            JniFunction::AllocObject => 27,
            JniFunction::IsInstanceOf => 32,
            JniFunction::GetMethodID => 33,
            JniFunction::CallMethodA(t) => 36 + 3 * t.ordinal(),
            JniFunction::CallNonvirtualMethodA(t) => 66 + 3 * t.ordinal(),
            JniFunction::GetFieldID => 94,
            JniFunction::GetField(t) => 95 + t.ordinal(),
            JniFunction::SetField(t) => 104 + t.ordinal(),
            JniFunction::GetStaticMethodID => 113,
            JniFunction::CallStaticMethodA(t) => 116 + 3 * t.ordinal(),
            JniFunction::GetStaticFieldID => 144,
            JniFunction::GetStaticField(t) => 145 + t.ordinal(),
            JniFunction::SetStaticField(t) => 154 + t.ordinal(),
            JniFunction::NewStringUTF => 167,
            JniFunction::GetArrayLength => 171,
            JniFunction::NewObjectArray => 172,
            JniFunction::GetObjectArrayElement => 173,
            JniFunction::SetObjectArrayElement => 174,
            JniFunction::NewArray(p) => 175 + p.primitive_ordinal(),
            JniFunction::GetArrayRegion(p) => 199 + p.primitive_ordinal(),
            JniFunction::SetArrayRegion(p) => 207 + p.primitive_ordinal(),
            JniFunction::MonitorEnter => 217,
            JniFunction::MonitorExit => 218,
            JniFunction::ExceptionCheck => 228,
        }
    }

    /// Return type
    pub fn ret(self) -> IrType {
        match self {
            JniFunction::Throw
            | JniFunction::ThrowNew
            | JniFunction::MonitorEnter
            | JniFunction::MonitorExit
            | JniFunction::GetArrayLength => IrType::I32,
            JniFunction::ExceptionClear
            | JniFunction::DeleteLocalRef
            | JniFunction::SetField(_)
            | JniFunction::SetStaticField(_)
            | JniFunction::SetObjectArrayElement
            | JniFunction::GetArrayRegion(_)
            | JniFunction::SetArrayRegion(_) => IrType::Void,
            JniFunction::IsSameObject | JniFunction::IsInstanceOf | JniFunction::ExceptionCheck => IrType::I8,
            JniFunction::CallMethodA(t)
            | JniFunction::CallNonvirtualMethodA(t)
            | JniFunction::CallStaticMethodA(t)
            | JniFunction::GetField(t)
            | JniFunction::GetStaticField(t) => t.ir_type(),
            _ => IrType::Ptr,
        }
    }
}

/// Emit `(*env)->f(env, args...)`
pub fn call_jni(b: &mut FunctionBuilder<'_>, env: Value, f: JniFunction, args: Vec<(IrType, Value)>) -> Option<Value> {
    let table = b.load(IrType::Ptr, env);
    let slot = b.gep(IrType::Ptr, table, f.index() as i64);
    let target = b.load(IrType::Ptr, slot);
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push((IrType::Ptr, env));
    all.extend(args);
    b.call(f.ret(), Callee::Indirect(target), all)
}

/// Convert a JVM stack value to its JNI representation
pub fn to_jni(b: &mut FunctionBuilder<'_>, ty: JniType, value: Value) -> Value {
    match ty {
        JniType::Boolean | JniType::Byte => b.cast(CastOp::Trunc, IrType::I32, value, IrType::I8),
        JniType::Char | JniType::Short => b.cast(CastOp::Trunc, IrType::I32, value, IrType::I16),
        _ => value,
    }
}

/// Convert a JNI value to its JVM stack representation
pub fn from_jni(b: &mut FunctionBuilder<'_>, ty: JniType, value: Value) -> Value {
    match ty {
        JniType::Boolean => b.cast(CastOp::ZExt, IrType::I8, value, IrType::I32),
        JniType::Byte => b.cast(CastOp::SExt, IrType::I8, value, IrType::I32),
        JniType::Char => b.cast(CastOp::ZExt, IrType::I16, value, IrType::I32),
        JniType::Short => b.cast(CastOp::SExt, IrType::I16, value, IrType::I32),
        _ => value,
    }
}

/// Member lookup key: owner, name, descriptor, static
type MemberKey = (String, String, String, bool);

/// Generated lookup helpers, shared by every function in the module
#[derive(Debug, Default)]
pub struct BridgeCache {
    classes: FxHashMap<String, FunctionId>,
    methods: FxHashMap<MemberKey, FunctionId>,
    fields: FxHashMap<MemberKey, FunctionId>,
    strings: FxHashMap<String, FunctionId>,
    cstrings: FxHashMap<Vec<u8>, GlobalId>,
}

impl BridgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global holding a NUL-terminated modified UTF-8 copy of `value`
    pub fn cstring(&mut self, module: &mut NativeModule, value: &str) -> Value {
        let bytes = encode_modified_utf8(value);
        let next = self.cstrings.len();
        let id = *self
            .cstrings
            .entry(bytes.clone())
            .or_insert_with(|| module.add_global(format!("natjar.cstr.{}", next), GlobalInit::CString(bytes)));
        Value::Global(id)
    }

    /// Helper `(env) -> jclass` returning a cached global reference to
    /// `name`, or null with an exception pending
    pub fn class_ref(&mut self, module: &mut NativeModule, name: &str) -> FunctionId {
        if let Some(id) = self.classes.get(name) {
            return *id;
        }
        let n = self.classes.len();
        let cache = module.add_global(format!("natjar.class.{}.ref", n), GlobalInit::NullPtr);
        let cname = self.cstring(module, name);
        let id = module.add_function(format!("natjar.class.{}", n), vec![IrType::Ptr], IrType::Ptr);

        let mut func = Function::new(id, format!("natjar.class.{}", n), vec![IrType::Ptr], IrType::Ptr);
        {
            let mut b = FunctionBuilder::new(&mut func);
            let env = b.param(0);
            cached_or_slow(&mut b, cache);
            let local = call_jni(&mut b, env, JniFunction::FindClass, vec![(IrType::Ptr, cname)]).unwrap_or(Value::Null);
            return_null_if_null(&mut b, local);
            let global = call_jni(&mut b, env, JniFunction::NewGlobalRef, vec![(IrType::Ptr, local)]).unwrap_or(Value::Null);
            call_jni(&mut b, env, JniFunction::DeleteLocalRef, vec![(IrType::Ptr, local)]);
            b.store(IrType::Ptr, global, Value::Global(cache));
            b.ret(Some(global));
        }
        *module.function_mut(id) = func;
        self.classes.insert(name.to_string(), id);
        id
    }

    /// Helper `(env) -> jmethodID`, null with an exception pending on failure
    pub fn method_id(
        &mut self,
        module: &mut NativeModule,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> FunctionId {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string(), is_static);
        if let Some(id) = self.methods.get(&key) {
            return *id;
        }
        let lookup = if is_static {
            JniFunction::GetStaticMethodID
        } else {
            JniFunction::GetMethodID
        };
        let n = self.methods.len();
        let id = self.member_helper(module, format!("natjar.method.{}", n), owner, name, descriptor, lookup);
        self.methods.insert(key, id);
        id
    }

    /// Helper `(env) -> jfieldID`, null with an exception pending on failure
    pub fn field_id(
        &mut self,
        module: &mut NativeModule,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> FunctionId {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string(), is_static);
        if let Some(id) = self.fields.get(&key) {
            return *id;
        }
        let lookup = if is_static {
            JniFunction::GetStaticFieldID
        } else {
            JniFunction::GetFieldID
        };
        let n = self.fields.len();
        let id = self.member_helper(module, format!("natjar.field.{}", n), owner, name, descriptor, lookup);
        self.fields.insert(key, id);
        id
    }

    fn member_helper(
        &mut self,
        module: &mut NativeModule,
        symbol: String,
        owner: &str,
        name: &str,
        descriptor: &str,
        lookup: JniFunction,
    ) -> FunctionId {
        let class = self.class_ref(module, owner);
        let cache = module.add_global(format!("{}.id", symbol), GlobalInit::NullPtr);
        let cname = self.cstring(module, name);
        let cdesc = self.cstring(module, descriptor);
        let id = module.add_function(symbol.clone(), vec![IrType::Ptr], IrType::Ptr);

        let mut func = Function::new(id, symbol, vec![IrType::Ptr], IrType::Ptr);
        {
            let mut b = FunctionBuilder::new(&mut func);
            let env = b.param(0);
            cached_or_slow(&mut b, cache);
            let cls = b
                .call(IrType::Ptr, Callee::Function(class), vec![(IrType::Ptr, env)])
                .unwrap_or(Value::Null);
            return_null_if_null(&mut b, cls);
            let member = call_jni(
                &mut b,
                env,
                lookup,
                vec![(IrType::Ptr, cls), (IrType::Ptr, cname), (IrType::Ptr, cdesc)],
            )
            .unwrap_or(Value::Null);
            return_null_if_null(&mut b, member);
            b.store(IrType::Ptr, member, Value::Global(cache));
            b.ret(Some(member));
        }
        *module.function_mut(id) = func;
        id
    }

    /// Helper `(env) -> jstring` returning a cached global reference to the
    /// interned string `value`
    pub fn string(&mut self, module: &mut NativeModule, value: &str) -> FunctionId {
        if let Some(id) = self.strings.get(value) {
            return *id;
        }
        let intern = self.method_id(module, "java/lang/String", "intern", "()Ljava/lang/String;", false);
        let n = self.strings.len();
        let cache = module.add_global(format!("natjar.string.{}.ref", n), GlobalInit::NullPtr);
        let text = self.cstring(module, value);
        let symbol = format!("natjar.string.{}", n);
        let id = module.add_function(symbol.clone(), vec![IrType::Ptr], IrType::Ptr);

        let mut func = Function::new(id, symbol, vec![IrType::Ptr], IrType::Ptr);
        {
            let mut b = FunctionBuilder::new(&mut func);
            let env = b.param(0);
            cached_or_slow(&mut b, cache);
            let fresh = call_jni(&mut b, env, JniFunction::NewStringUTF, vec![(IrType::Ptr, text)]).unwrap_or(Value::Null);
            return_null_if_null(&mut b, fresh);
            let mid = b
                .call(IrType::Ptr, Callee::Function(intern), vec![(IrType::Ptr, env)])
                .unwrap_or(Value::Null);
            return_null_if_null(&mut b, mid);
            let interned = call_jni(
                &mut b,
                env,
                JniFunction::CallMethodA(JniType::Object),
                vec![(IrType::Ptr, fresh), (IrType::Ptr, mid), (IrType::Ptr, Value::Null)],
            )
            .unwrap_or(Value::Null);
            return_null_if_pending(&mut b, env, fresh);
            return_null_if_null(&mut b, interned);
            let global = call_jni(&mut b, env, JniFunction::NewGlobalRef, vec![(IrType::Ptr, interned)]).unwrap_or(Value::Null);
            call_jni(&mut b, env, JniFunction::DeleteLocalRef, vec![(IrType::Ptr, fresh)]);
            call_jni(&mut b, env, JniFunction::DeleteLocalRef, vec![(IrType::Ptr, interned)]);
            b.store(IrType::Ptr, global, Value::Global(cache));
            b.ret(Some(global));
        }
        *module.function_mut(id) = func;
        self.strings.insert(value.to_string(), id);
        id
    }

    pub fn helper_count(&self) -> usize {
        self.classes.len() + self.methods.len() + self.fields.len() + self.strings.len()
    }
}

/// Return the cached pointer when set; continue in a fresh block otherwise
fn cached_or_slow(b: &mut FunctionBuilder<'_>, cache: GlobalId) {
    let cached = b.load(IrType::Ptr, Value::Global(cache));
    let is_null = b.icmp(IntPredicate::Eq, IrType::Ptr, cached, Value::Null);
    let hit = b.create_block();
    let slow = b.create_block();
    b.branch(is_null, slow, hit);
    b.switch_to_block(hit);
    b.ret(Some(cached));
    b.switch_to_block(slow);
}

/// Return null when `value` is null; continue in a fresh block otherwise
fn return_null_if_null(b: &mut FunctionBuilder<'_>, value: Value) {
    let is_null = b.icmp(IntPredicate::Eq, IrType::Ptr, value, Value::Null);
    let fail = b.create_block();
    let ok = b.create_block();
    b.branch(is_null, fail, ok);
    b.switch_to_block(fail);
    b.ret(Some(Value::Null));
    b.switch_to_block(ok);
}

/// Release `local` and return null when an exception is pending
fn return_null_if_pending(b: &mut FunctionBuilder<'_>, env: Value, local: Value) {
    let pending = call_jni(b, env, JniFunction::ExceptionCheck, Vec::new()).unwrap_or(Value::Int(0));
    let thrown = b.icmp(IntPredicate::Ne, IrType::I8, pending, Value::Int(0));
    let fail = b.create_block();
    let ok = b.create_block();
    b.branch(thrown, fail, ok);
    b.switch_to_block(fail);
    call_jni(b, env, JniFunction::DeleteLocalRef, vec![(IrType::Ptr, local)]);
    b.ret(Some(Value::Null));
    b.switch_to_block(ok);
}
