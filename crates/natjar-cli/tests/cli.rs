//! Runs the `natjar` binary against small generated jars

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use natjar_engine::classfile::{access, ClassBuilder, CodeAssembler, Opcode};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn natjar(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_natjar"))
        .args(args)
        .env_remove("NATJAR_LOG")
        .output()
        .unwrap()
}

fn input_jar(dir: &Path) -> PathBuf {
    let mut class = ClassBuilder::new(52, access::PUBLIC | access::SUPER, "app/Calc", "java/lang/Object").unwrap();
    let code_name = class.pool().intern_utf8("Code").unwrap();
    let mut asm = CodeAssembler::new();
    asm.op(Opcode::Iload0).op(Opcode::Iload1).op(Opcode::Imul).op(Opcode::Ireturn);
    let mul = asm.finish(code_name, 2, 2).unwrap();
    class
        .method(access::PUBLIC | access::STATIC, "mul", "(II)I", Some(mul))
        .unwrap();

    let path = dir.join("app.jar");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("app/Calc.class", SimpleFileOptions::default()).unwrap();
    zip.write_all(&class.build().to_bytes()).unwrap();
    zip.finish().unwrap();
    path
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn test_help_lists_commands() {
    let out = natjar(&["--help"]);
    assert!(out.status.success());
    let stdout = text(&out.stdout);
    assert!(stdout.contains("compile"));
    assert!(stdout.contains("probe"));
}

#[test]
fn test_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.jar");
    let output = dir.path().join("out.jar");
    let out = natjar(&["compile", missing.to_str().unwrap(), output.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = text(&out.stderr);
    assert!(stderr.starts_with("Error:"), "{}", stderr);
    assert!(stderr.contains("does not exist"));
    assert!(!output.exists());
}

#[test]
fn test_excluded_methods_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_jar(dir.path());
    let output = dir.path().join("out.jar");
    let config = dir.path().join("natjar.json");
    std::fs::write(&config, r#"{ "ignoredMethods": [{ "owner": "app.*", "name": "mul" }] }"#).unwrap();

    let out = natjar(&[
        "compile",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", text(&out.stderr));
    let stdout = text(&out.stdout);
    assert!(stdout.contains(r#"Method "mul" (Parent: "app/Calc", desc: "(II)I") will be ignored by config."#));
    assert!(stdout.contains("0 method(s) compiled"));
    assert!(output.exists());
}

#[test]
fn test_mac_target_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_jar(dir.path());
    let output = dir.path().join("out.jar");
    let out = natjar(&[
        "compile",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--compile-for",
        "linux,mac",
        "--llvm-dir",
        dir.path().join("no-such-toolchain").to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = text(&out.stderr);
    assert!(!stderr.contains("Failed to start"), "{}", stderr);
    assert_eq!(stderr.matches("Target mac is not supported").count(), 1, "{}", stderr);
    assert!(!output.exists());
}

#[test]
fn test_probe_without_natives_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_jar(dir.path());
    let out = natjar(&["probe", input.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(text(&out.stderr).starts_with("Error: Failed to load the native library"));
}
