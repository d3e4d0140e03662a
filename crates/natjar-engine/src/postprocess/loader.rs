//! Generated JVM loader class
//!
//! The shipped program loads its native library through a small generated
//! class, equivalent to:
//!
//! ```java
//! public final class NativeLoader {
//!     private static volatile boolean loaded;
//!
//!     public static void ensureLoaded() {
//!         if (!loaded) load();
//!     }
//!
//!     private static synchronized void load() {
//!         if (loaded) return;
//!         // 64-bit os.arch only; resource picked by os.name (linux, mac, win)
//!         // copied from "/<prefix><file>" to a temp file, then System.load
//!         loaded = true;
//!     }
//! }
//! ```
//!
//! Every failure surfaces as `UnsatisfiedLinkError`. The class targets
//! version 49 so no stack-map frames are needed.

use natjar_runtime::OsFamily;

use crate::classfile::{access, ClassBuilder, ClassFile, Code, CodeAssembler, ConstantPool, Opcode};

use super::PostprocessError;

const CLASS_VERSION: u16 = 49;
const FLAG: &str = "loaded";
pub const ENSURE_LOADED: &str = "ensureLoaded";
const LOAD: &str = "load";
const LINK_ERROR: &str = "java/lang/UnsatisfiedLinkError";
const STRING: &str = "java/lang/String";

/// Build the loader class `name` reading artifacts from `natives_prefix`
pub fn generate_loader(name: &str, natives_prefix: &str) -> Result<ClassFile, PostprocessError> {
    let mut class = ClassBuilder::new(
        CLASS_VERSION,
        access::PUBLIC | access::FINAL | access::SUPER,
        name,
        "java/lang/Object",
    )?;
    class.field(access::PRIVATE | access::STATIC | access::VOLATILE, FLAG, "Z")?;

    let ensure = ensure_loaded_code(class.pool(), name)?;
    class.method(access::PUBLIC | access::STATIC, ENSURE_LOADED, "()V", Some(ensure))?;

    let load = load_code(class.pool(), name, natives_prefix)?;
    class.method(
        access::PRIVATE | access::STATIC | access::SYNCHRONIZED,
        LOAD,
        "()V",
        Some(load),
    )?;
    Ok(class.build())
}

fn ensure_loaded_code(pool: &mut ConstantPool, name: &str) -> Result<Code, PostprocessError> {
    let flag = pool.intern_field_ref(name, FLAG, "Z")?;
    let load = pool.intern_method_ref(name, LOAD, "()V", false)?;
    let code_name = pool.intern_utf8("Code")?;

    let mut asm = CodeAssembler::new();
    let done = asm.new_label();
    asm.op_u16(Opcode::Getstatic, flag).branch(Opcode::Ifne, done);
    asm.op_u16(Opcode::Invokestatic, load);
    asm.bind(done);
    asm.op(Opcode::Return);
    Ok(asm.finish(code_name, 1, 0)?)
}

/// Interned references used by `load()`
struct Refs {
    flag: u16,
    get_property: u16,
    contains: u16,
    concat: u16,
    to_lower: u16,
    link_error: u16,
    link_error_init: u16,
}

impl Refs {
    fn new(pool: &mut ConstantPool, name: &str) -> Result<Refs, PostprocessError> {
        Ok(Refs {
            flag: pool.intern_field_ref(name, FLAG, "Z")?,
            get_property: pool.intern_method_ref(
                "java/lang/System",
                "getProperty",
                "(Ljava/lang/String;)Ljava/lang/String;",
                false,
            )?,
            contains: pool.intern_method_ref(STRING, "contains", "(Ljava/lang/CharSequence;)Z", false)?,
            concat: pool.intern_method_ref(STRING, "concat", "(Ljava/lang/String;)Ljava/lang/String;", false)?,
            to_lower: pool.intern_method_ref(STRING, "toLowerCase", "()Ljava/lang/String;", false)?,
            link_error: pool.intern_class(LINK_ERROR)?,
            link_error_init: pool.intern_method_ref(LINK_ERROR, "<init>", "(Ljava/lang/String;)V", false)?,
        })
    }
}

/// `throw new UnsatisfiedLinkError(message [+ local])`
fn throw_link_error(
    asm: &mut CodeAssembler,
    pool: &mut ConstantPool,
    refs: &Refs,
    message: &str,
    suffix_local: Option<u16>,
) -> Result<(), PostprocessError> {
    let text = pool.intern_string(message)?;
    asm.op_u16(Opcode::New, refs.link_error).op(Opcode::Dup).ldc(text);
    if let Some(slot) = suffix_local {
        asm.local(Opcode::Aload, Opcode::Aload0, slot);
        asm.op_u16(Opcode::Invokevirtual, refs.concat);
    }
    asm.op_u16(Opcode::Invokespecial, refs.link_error_init).op(Opcode::Athrow);
    Ok(())
}

fn load_code(pool: &mut ConstantPool, name: &str, natives_prefix: &str) -> Result<Code, PostprocessError> {
    // Locals: 0 arch, 1 os, 2 file name, 3 stream, 4 temp file, 5 caught exception
    let refs = Refs::new(pool, name)?;
    let code_name = pool.intern_utf8("Code")?;
    let os_arch = pool.intern_string("os.arch")?;
    let os_name = pool.intern_string("os.name")?;
    let bits = pool.intern_string("64")?;

    let mut asm = CodeAssembler::new();

    // Re-check under the class monitor
    let go = asm.new_label();
    asm.op_u16(Opcode::Getstatic, refs.flag).branch(Opcode::Ifeq, go);
    asm.op(Opcode::Return);
    asm.bind(go);

    // Architecture
    let bad_arch = asm.new_label();
    let arch_ok = asm.new_label();
    asm.ldc(os_arch).op_u16(Opcode::Invokestatic, refs.get_property).op(Opcode::Astore0);
    asm.op(Opcode::Aload0).branch(Opcode::Ifnull, bad_arch);
    asm.op(Opcode::Aload0).ldc(bits).op_u16(Opcode::Invokevirtual, refs.contains);
    asm.branch(Opcode::Ifne, arch_ok);
    asm.bind(bad_arch);
    throw_link_error(&mut asm, pool, &refs, "natjar: only 64-bit hosts are supported", None)?;
    asm.bind(arch_ok);

    // Operating system, tested in the runtime loader's order
    asm.ldc(os_name)
        .op_u16(Opcode::Invokestatic, refs.get_property)
        .op_u16(Opcode::Invokevirtual, refs.to_lower)
        .op(Opcode::Astore1);
    let chosen = asm.new_label();
    for os in OsFamily::PROBE_ORDER {
        let keyword = pool.intern_string(os.keyword())?;
        let file = pool.intern_string(os.artifact_name())?;
        let next = asm.new_label();
        asm.op(Opcode::Aload1).ldc(keyword).op_u16(Opcode::Invokevirtual, refs.contains);
        asm.branch(Opcode::Ifeq, next);
        asm.ldc(file).op(Opcode::Astore2).branch(Opcode::Goto, chosen);
        asm.bind(next);
    }
    throw_link_error(&mut asm, pool, &refs, "natjar: unsupported operating system ", Some(1))?;
    asm.bind(chosen);

    // Extract and load
    let this_class = pool.intern_class(name)?;
    let resource_dir = pool.intern_string(&format!("/{}", natives_prefix))?;
    let get_resource = pool.intern_method_ref(
        "java/lang/Class",
        "getResourceAsStream",
        "(Ljava/lang/String;)Ljava/io/InputStream;",
        false,
    )?;
    let tmp_prefix = pool.intern_string("natjar_")?;
    let tmp_suffix = pool.intern_string(".tmp")?;
    let create_temp = pool.intern_method_ref(
        "java/io/File",
        "createTempFile",
        "(Ljava/lang/String;Ljava/lang/String;)Ljava/io/File;",
        false,
    )?;
    let delete_on_exit = pool.intern_method_ref("java/io/File", "deleteOnExit", "()V", false)?;
    let to_path = pool.intern_method_ref("java/io/File", "toPath", "()Ljava/nio/file/Path;", false)?;
    let copy_option = pool.intern_class("java/nio/file/CopyOption")?;
    let replace = pool.intern_field_ref(
        "java/nio/file/StandardCopyOption",
        "REPLACE_EXISTING",
        "Ljava/nio/file/StandardCopyOption;",
    )?;
    let copy = pool.intern_method_ref(
        "java/nio/file/Files",
        "copy",
        "(Ljava/io/InputStream;Ljava/nio/file/Path;[Ljava/nio/file/CopyOption;)J",
        false,
    )?;
    let close = pool.intern_method_ref("java/io/InputStream", "close", "()V", false)?;
    let absolute = pool.intern_method_ref("java/io/File", "getAbsolutePath", "()Ljava/lang/String;", false)?;
    let system_load = pool.intern_method_ref("java/lang/System", "load", "(Ljava/lang/String;)V", false)?;
    let io_exception = pool.intern_class("java/io/IOException")?;
    let to_string = pool.intern_method_ref("java/lang/Object", "toString", "()Ljava/lang/String;", false)?;

    let try_start = asm.new_label();
    let try_end = asm.new_label();
    let handler = asm.new_label();
    let found = asm.new_label();

    asm.bind(try_start);
    asm.ldc(this_class)
        .ldc(resource_dir)
        .op(Opcode::Aload2)
        .op_u16(Opcode::Invokevirtual, refs.concat)
        .op_u16(Opcode::Invokevirtual, get_resource)
        .op(Opcode::Astore3);
    asm.op(Opcode::Aload3).branch(Opcode::Ifnonnull, found);
    throw_link_error(&mut asm, pool, &refs, "natjar: missing native library ", Some(2))?;
    asm.bind(found);

    asm.ldc(tmp_prefix)
        .ldc(tmp_suffix)
        .op_u16(Opcode::Invokestatic, create_temp)
        .local(Opcode::Astore, Opcode::Astore0, 4);
    asm.local(Opcode::Aload, Opcode::Aload0, 4)
        .op_u16(Opcode::Invokevirtual, delete_on_exit);
    asm.op(Opcode::Aload3)
        .local(Opcode::Aload, Opcode::Aload0, 4)
        .op_u16(Opcode::Invokevirtual, to_path)
        .iconst(1)
        .op_u16(Opcode::Anewarray, copy_option)
        .op(Opcode::Dup)
        .iconst(0)
        .op_u16(Opcode::Getstatic, replace)
        .op(Opcode::Aastore)
        .op_u16(Opcode::Invokestatic, copy)
        .op(Opcode::Pop2);
    asm.op(Opcode::Aload3).op_u16(Opcode::Invokevirtual, close);
    asm.local(Opcode::Aload, Opcode::Aload0, 4)
        .op_u16(Opcode::Invokevirtual, absolute)
        .op_u16(Opcode::Invokestatic, system_load);
    asm.bind(try_end);

    asm.iconst(1).op_u16(Opcode::Putstatic, refs.flag).op(Opcode::Return);

    asm.bind(handler);
    asm.local(Opcode::Astore, Opcode::Astore0, 5);
    let text = pool.intern_string("natjar: cannot extract native library: ")?;
    asm.op_u16(Opcode::New, refs.link_error)
        .op(Opcode::Dup)
        .ldc(text)
        .local(Opcode::Aload, Opcode::Aload0, 5)
        .op_u16(Opcode::Invokevirtual, to_string)
        .op_u16(Opcode::Invokevirtual, refs.concat)
        .op_u16(Opcode::Invokespecial, refs.link_error_init)
        .op(Opcode::Athrow);
    asm.handler(try_start, try_end, handler, io_exception);

    Ok(asm.finish(code_name, 6, 6)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{decode_code, Loadable};

    #[test]
    fn test_loader_shape() {
        let file = generate_loader("natjar/NativeLoader", "META-INF/natives/").unwrap();
        let reparsed = ClassFile::parse(&file.to_bytes()).unwrap();
        assert_eq!(reparsed.name().unwrap(), "natjar/NativeLoader");
        assert_eq!(reparsed.major_version, 49);
        assert_eq!(reparsed.fields.len(), 1);
        assert_ne!(reparsed.fields[0].access_flags & access::VOLATILE, 0);

        let ensure = reparsed.find_method(ENSURE_LOADED, "()V").unwrap();
        assert!(reparsed.methods[ensure].is_static());
        let load = reparsed.find_method(LOAD, "()V").unwrap();
        let load = &reparsed.methods[load];
        assert_ne!(load.access_flags & access::SYNCHRONIZED, 0);

        let code = load.code().unwrap();
        assert_eq!(code.exception_table.len(), 1);
        decode_code(&code.code).unwrap();
    }

    #[test]
    fn test_loader_strings() {
        let file = generate_loader("x/L", "natives/").unwrap();
        let strings: Vec<String> = (1..file.pool.count() as u16)
            .filter_map(|i| match file.pool.loadable(i) {
                Ok(Loadable::String(s)) => Some(s),
                _ => None,
            })
            .collect();
        for expected in ["/natives/", "linux64.so", "win64.dll", "macosx.dylib", "natjar_", ".tmp", "os.arch"] {
            assert!(strings.iter().any(|s| s == expected), "missing {}", expected);
        }
    }
}
