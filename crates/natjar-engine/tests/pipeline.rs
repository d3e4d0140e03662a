//! End-to-end runs of the compilation pipeline on a small generated jar

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use natjar_engine::archive::read_jar;
use natjar_engine::classfile::{access, decode_code, ClassBuilder, ClassFile, CodeAssembler, Opcode};
use natjar_engine::{CompileOptions, Error, MethodPattern, Session, ToolchainError};
use natjar_runtime::OsFamily;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// `Calc` with `static int add(int, int)` and a constructor
fn calc_class() -> Vec<u8> {
    let mut class = ClassBuilder::new(52, access::PUBLIC | access::SUPER, "Calc", "java/lang/Object").unwrap();
    let code_name = class.pool().intern_utf8("Code").unwrap();
    let object_init = class
        .pool()
        .intern_method_ref("java/lang/Object", "<init>", "()V", false)
        .unwrap();

    let mut asm = CodeAssembler::new();
    asm.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, object_init).op(Opcode::Return);
    let init = asm.finish(code_name, 1, 1).unwrap();
    class.method(access::PUBLIC, "<init>", "()V", Some(init)).unwrap();

    let mut asm = CodeAssembler::new();
    asm.op(Opcode::Iload0).op(Opcode::Iload1).op(Opcode::Iadd).op(Opcode::Ireturn);
    let add = asm.finish(code_name, 2, 2).unwrap();
    class
        .method(access::PUBLIC | access::STATIC, "add", "(II)I", Some(add))
        .unwrap();

    class.build().to_bytes()
}

fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("app.jar");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default();
    zip.add_directory("META-INF/", options).unwrap();
    zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
    zip.write_all(b"Manifest-Version: 1.0\nMain-Class: Calc\n").unwrap();
    zip.start_file("Calc.class", options).unwrap();
    zip.write_all(&calc_class()).unwrap();
    zip.start_file("notes.txt", options).unwrap();
    zip.write_all(b"plain resource").unwrap();
    zip.finish().unwrap();
    path
}

fn opcodes(class: &[u8], name: &str, descriptor: &str) -> Vec<Opcode> {
    let file = ClassFile::parse(class).unwrap();
    let method = file.find_method(name, descriptor).unwrap();
    let code = file.methods[method].code().unwrap();
    decode_code(&code.code).unwrap().iter().map(|i| i.opcode).collect()
}

#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
const WRITE_OUTPUT: &str = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
echo "fake library" > "$out"
"#;

/// Both scripted runs live in one test so no other thread of this binary
/// forks while a script is open for writing.
#[cfg(unix)]
#[test]
fn test_compile_with_fake_toolchain() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path());

    // Successful build for Linux
    let tools = dir.path().join("llvm");
    std::fs::create_dir(&tools).unwrap();
    script(&tools, "clang", WRITE_OUTPUT);
    script(&tools, "ld.lld", WRITE_OUTPUT);

    let output = dir.path().join("out.jar");
    let ir = dir.path().join("app.ll");
    let mut options = CompileOptions::new(&input, &output);
    options.targets = vec![OsFamily::Linux];
    options.toolchain_dir = Some(tools.clone());
    options.ir_output = Some(ir.clone());
    options.workers = 2;

    let report = Session::new(options).run().unwrap();
    assert_eq!(report.compiled, 1);
    assert_eq!(report.stubs, 1);
    assert!(report.notices.is_empty());
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].entry, "META-INF/natives/linux64.so");
    assert_eq!(report.artifacts[0].path, None);

    let text = std::fs::read_to_string(&ir).unwrap();
    assert!(
        text.lines().any(|l| l.starts_with("define") && l.contains("i32 @Java_Calc_")),
        "{}",
        text
    );

    let entries = read_jar(&output).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"META-INF/natives/linux64.so"));
    assert!(names.contains(&"natjar/NativeLoader.class"));
    let native = entries.iter().find(|e| e.name == "META-INF/natives/linux64.so").unwrap();
    assert_eq!(native.data, b"fake library\n");
    let notes = entries.iter().find(|e| e.name == "notes.txt").unwrap();
    assert_eq!(notes.data, b"plain resource");

    let calc = entries.iter().find(|e| e.name == "Calc.class").unwrap();
    assert_eq!(
        opcodes(&calc.data, "add", "(II)I"),
        vec![Opcode::Iload0, Opcode::Iload1, Opcode::Invokestatic, Opcode::Ireturn]
    );
    assert_eq!(opcodes(&calc.data, "<clinit>", "()V"), vec![Opcode::Invokestatic, Opcode::Return]);
    let file = ClassFile::parse(&calc.data).unwrap();
    let natives = file.methods.iter().filter(|m| m.is_native()).count();
    assert_eq!(natives, 1);

    // A failing code generator aborts the run without output
    let broken = dir.path().join("broken");
    std::fs::create_dir(&broken).unwrap();
    script(&broken, "clang", "echo 'error: bad IR' >&2\nexit 2\n");
    let failed_output = dir.path().join("failed.jar");
    let mut options = CompileOptions::new(&input, &failed_output);
    options.targets = vec![OsFamily::Linux];
    options.toolchain_dir = Some(broken);

    match Session::new(options).run() {
        Err(Error::Toolchain(ToolchainError::ProcessFailed { tool, code, stderr, .. })) => {
            assert_eq!(tool, "clang");
            assert_eq!(code, Some(2));
            assert!(stderr.contains("bad IR"));
        }
        other => panic!("expected a toolchain failure, got {:?}", other.map(|r| r.compiled)),
    }
    assert!(!failed_output.exists());
}

#[test]
fn test_mac_target_fails_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path());
    let output = dir.path().join("out.jar");

    // Linux listed first must not reach the (missing) toolchain either
    for targets in [vec![OsFamily::MacOs], vec![OsFamily::Linux, OsFamily::MacOs]] {
        let mut options = CompileOptions::new(&input, &output);
        options.targets = targets;
        options.toolchain_dir = Some(dir.path().join("no-such-toolchain"));

        let err = Session::new(options).run().unwrap_err();
        assert!(
            matches!(err, Error::Toolchain(ToolchainError::UnsupportedTarget(OsFamily::MacOs))),
            "unexpected error: {}",
            err
        );
        assert!(!output.exists());
    }
}

#[test]
fn test_everything_excluded_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path());
    let output = dir.path().join("out.jar");
    let mut options = CompileOptions::new(&input, &output);
    options.exclusions = vec![MethodPattern::new("**", "**", "**")];

    let report = Session::new(options).run().unwrap();
    assert_eq!(report.compiled, 0);
    assert_eq!(report.modified_classes, 0);
    assert_eq!(report.notices.len(), 1);
    assert_eq!(read_jar(&input).unwrap(), read_jar(&output).unwrap());
}
