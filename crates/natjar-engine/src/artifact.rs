//! Cross-compiler driver
//!
//! Turns the textual IR of the native module into one shared library per
//! target OS by running the external `clang` (and, for Linux, `ld.lld`).
//! Intermediate files live in scoped temporaries that are removed on every
//! exit path. Tool output is forwarded to our stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use natjar_runtime::OsFamily;
use tempfile::NamedTempFile;

/// Errors from running the external toolchain
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("Target {0} is not supported")]
    UnsupportedTarget(OsFamily),
    #[error("Failed to start {tool}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} failed for {target} (exit code {}): {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()))]
    ProcessFailed {
        tool: String,
        target: OsFamily,
        code: Option<i32>,
        stderr: String,
    },
}

const CLANG: &str = "clang";
const LINKER: &str = "ld.lld";

/// Target triple passed to the code generator
pub fn target_triple(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Windows => "x86_64-pc-windows-gnu",
        OsFamily::Linux => "x86_64-pc-linux-gnu",
        OsFamily::MacOs => "x86_64-apple-darwin",
    }
}

/// Targets the driver can build; the Mac triple is named but not built
pub fn is_supported(os: OsFamily) -> bool {
    os != OsFamily::MacOs
}

/// Fail on the first unsupported target, before anything is built
pub fn ensure_supported(targets: &[OsFamily]) -> Result<(), ToolchainError> {
    match targets.iter().find(|t| !is_supported(**t)) {
        Some(&target) => Err(ToolchainError::UnsupportedTarget(target)),
        None => Ok(()),
    }
}

/// Runs the external code generator and linker
#[derive(Debug, Clone, Default)]
pub struct ToolchainDriver {
    /// Directory holding the tools; `PATH` is searched when unset
    toolchain_dir: Option<PathBuf>,
}

impl ToolchainDriver {
    pub fn new(toolchain_dir: Option<PathBuf>) -> Self {
        ToolchainDriver { toolchain_dir }
    }

    /// Full path (or bare name) of a tool
    pub fn tool(&self, name: &str) -> PathBuf {
        let file = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
        match &self.toolchain_dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }

    /// Build the shared library for `target` into `output_dir`, returning its
    /// path. The file name comes from the shared artifact table.
    pub fn compile_for(&self, ir: &[u8], output_dir: &Path, target: OsFamily) -> Result<PathBuf, ToolchainError> {
        if !is_supported(target) {
            return Err(ToolchainError::UnsupportedTarget(target));
        }
        let _span = tracing::info_span!("toolchain", %target).entered();

        let mut ir_file = temp_file(".ll")?;
        ir_file.write_all(ir).map_err(|e| io_error(ir_file.path(), e))?;
        ir_file.flush().map_err(|e| io_error(ir_file.path(), e))?;

        let output = output_dir.join(target.artifact_name());
        let triple = target_triple(target);
        match target {
            OsFamily::Windows => {
                let mut cmd = Command::new(self.tool(CLANG));
                cmd.args(["-O3", "-shared", "-target", triple, "-o"])
                    .arg(&output)
                    .arg(ir_file.path());
                self.run(CLANG, target, cmd)?;
            }
            OsFamily::Linux => {
                let object = temp_file(".o")?;
                let mut cmd = Command::new(self.tool(CLANG));
                cmd.args(["-O3", "-c", "-target", triple, "-fPIC", "-o"])
                    .arg(object.path())
                    .arg(ir_file.path());
                self.run(CLANG, target, cmd)?;

                let mut cmd = Command::new(self.tool(LINKER));
                cmd.args(["-shared", "-o"]).arg(&output).arg(object.path());
                self.run(LINKER, target, cmd)?;
            }
            OsFamily::MacOs => return Err(ToolchainError::UnsupportedTarget(target)),
        }

        tracing::info!(artifact = %output.display(), "native library built");
        Ok(output)
    }

    fn run(&self, tool: &str, target: OsFamily, mut cmd: Command) -> Result<(), ToolchainError> {
        tracing::debug!(command = ?cmd, "running tool");
        let Output { status, stdout, stderr } = cmd.output().map_err(|source| ToolchainError::Spawn {
            tool: self.tool(tool),
            source,
        })?;

        let mut err = std::io::stderr().lock();
        let _ = err.write_all(&stdout);
        let _ = err.write_all(&stderr);

        if !status.success() {
            return Err(ToolchainError::ProcessFailed {
                tool: tool.to_string(),
                target,
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(())
    }
}

fn temp_file(suffix: &str) -> Result<NamedTempFile, ToolchainError> {
    tempfile::Builder::new()
        .prefix("natjar-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| io_error(&std::env::temp_dir(), e))
}

fn io_error(path: &Path, source: std::io::Error) -> ToolchainError {
    ToolchainError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ToolchainDriver::new(Some(dir.path().join("missing")));
        let err = driver.compile_for(b"", dir.path(), OsFamily::MacOs).unwrap_err();
        assert!(matches!(err, ToolchainError::UnsupportedTarget(OsFamily::MacOs)));
        assert!(!dir.path().join("macosx.dylib").exists());
    }

    #[test]
    fn test_mixed_target_list_rejected() {
        assert!(ensure_supported(&[OsFamily::Linux, OsFamily::Windows]).is_ok());
        let err = ensure_supported(&[OsFamily::Linux, OsFamily::MacOs]).unwrap_err();
        assert!(matches!(err, ToolchainError::UnsupportedTarget(OsFamily::MacOs)));
    }

    #[test]
    fn test_triples_and_tools() {
        assert_eq!(target_triple(OsFamily::Linux), "x86_64-pc-linux-gnu");
        assert_eq!(target_triple(OsFamily::Windows), "x86_64-pc-windows-gnu");
        let driver = ToolchainDriver::new(Some(PathBuf::from("/opt/llvm/bin")));
        assert!(driver.tool("clang").starts_with("/opt/llvm/bin"));
        assert_eq!(ToolchainDriver::default().tool("ld.lld").parent(), Some(Path::new("")));
    }

    /// All process-spawning checks share one test so no other test thread
    /// forks while a script is still open for writing.
    #[cfg(unix)]
    #[test]
    fn test_fake_toolchain() {
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        const WRITE_OUTPUT: &str = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
echo built > "$out"
"#;

        let good = tempfile::tempdir().unwrap();
        script(good.path(), "clang", WRITE_OUTPUT);
        script(good.path(), "ld.lld", WRITE_OUTPUT);
        let out = tempfile::tempdir().unwrap();
        let driver = ToolchainDriver::new(Some(good.path().to_path_buf()));

        let linux = driver.compile_for(b"; empty\n", out.path(), OsFamily::Linux).unwrap();
        assert_eq!(linux, out.path().join("linux64.so"));
        assert!(linux.exists());
        let windows = driver.compile_for(b"; empty\n", out.path(), OsFamily::Windows).unwrap();
        assert_eq!(windows, out.path().join("win64.dll"));

        let bad = tempfile::tempdir().unwrap();
        script(bad.path(), "clang", "echo boom >&2\nexit 3\n");
        let err = ToolchainDriver::new(Some(bad.path().to_path_buf()))
            .compile_for(b"", out.path(), OsFamily::Linux)
            .unwrap_err();
        match err {
            ToolchainError::ProcessFailed { tool, target, code, stderr } => {
                assert_eq!(tool, "clang");
                assert_eq!(target, OsFamily::Linux);
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {}", other),
        }

        let missing = ToolchainDriver::new(Some(bad.path().join("nope")));
        let err = missing.compile_for(b"", out.path(), OsFamily::Windows).unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }
}
