//! One compilation run, start to finish
//!
//! Reads the input (and library) jars, builds the index, selects and
//! translates methods, patches the program, builds one native library per
//! requested target and writes the output jar. Any failure aborts the run
//! before the output path is touched.

use std::fs;
use std::path::{Path, PathBuf};

use natjar_runtime::OsFamily;

use crate::archive::{read_jar, write_jar, OutputPlan};
use crate::artifact::{ensure_supported, ToolchainDriver};
use crate::compiler::Compiler;
use crate::config::CompileOptions;
use crate::error::{Error, Result};
use crate::index::{ClassSource, ProgramIndex, Provenance};
use crate::ir::emit_textual_ir;
use crate::postprocess::Postprocessor;
use crate::select::{select_for_compilation, SkipNotice};

/// A native library embedded in the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedArtifact {
    pub target: OsFamily,
    /// Archive entry name
    pub entry: String,
    /// Kept copy on disk, when natives are kept
    pub path: Option<PathBuf>,
    pub size: usize,
}

/// Summary of a finished run
#[derive(Debug, Default)]
pub struct SessionReport {
    pub classes: usize,
    /// Entries passed through because they failed to parse
    pub rejected: Vec<String>,
    pub notices: Vec<SkipNotice>,
    pub compiled: usize,
    pub stubs: usize,
    pub modified_classes: usize,
    pub artifacts: Vec<EmbeddedArtifact>,
}

/// Drives the pipeline for one set of options
#[derive(Debug)]
pub struct Session {
    options: CompileOptions,
}

impl Session {
    pub fn new(options: CompileOptions) -> Self {
        Session { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn run(&self) -> Result<SessionReport> {
        let opts = &self.options;
        opts.validate()?;
        ensure_supported(&opts.targets)?;
        let _span = tracing::info_span!("session", input = %opts.input.display()).entered();
        let mut report = SessionReport::default();

        // Index
        let mut sources: Vec<ClassSource> = read_jar(&opts.input)?
            .into_iter()
            .filter(|e| e.is_class())
            .map(|e| ClassSource::program(e.name, e.data))
            .collect();
        for library in &opts.libraries {
            sources.extend(
                read_jar(library)?
                    .into_iter()
                    .filter(|e| e.is_class())
                    .map(|e| ClassSource::library(e.name, e.data)),
            );
        }
        let (mut index, build) = ProgramIndex::build(&sources, opts.workers)?;
        drop(sources);
        report.classes = index.len();
        report.rejected = build.rejected;

        // Select and translate
        report.notices = select_for_compilation(&mut index, &opts.exclusions)?;
        let mut compiler = Compiler::new(&module_name(&opts.input));
        report.compiled = compiler.compile_marked(&mut index)?;
        let (mut module, mut registry) = compiler.into_parts();

        // Patch back
        let patch = Postprocessor::new(&opts.loader_class, &opts.natives_prefix).postprocess(
            &mut index,
            &mut registry,
            &mut module,
        )?;
        report.stubs = patch.stubs;

        // Native code
        let ir = emit_textual_ir(&module, opts.optimization_level)?;
        if let Some(path) = &opts.ir_output {
            fs::write(path, &ir).map_err(|source| io_error(path, source))?;
            tracing::info!(path = %path.display(), "IR written");
        }

        let mut plan = OutputPlan::new();
        if !opts.targets.is_empty() {
            report.artifacts = self.build_natives(&ir, &mut plan)?;
        }

        // Output
        for entry in index.modified_classes() {
            let bytes = entry.file().to_bytes();
            match entry.provenance {
                Provenance::Synthetic => plan.add(entry.entry_name.clone(), bytes)?,
                _ => plan.replace(entry.entry_name.clone(), bytes),
            }
            report.modified_classes += 1;
        }
        write_jar(&opts.input, &opts.output, &plan)?;

        tracing::info!(
            output = %opts.output.display(),
            compiled = report.compiled,
            modified = report.modified_classes,
            artifacts = report.artifacts.len(),
            "output written"
        );
        Ok(report)
    }

    /// Build every target and queue the libraries for embedding
    fn build_natives(&self, ir: &[u8], plan: &mut OutputPlan) -> Result<Vec<EmbeddedArtifact>> {
        let opts = &self.options;
        let driver = ToolchainDriver::new(opts.toolchain_dir.clone());

        // Kept output directory, or a scratch one removed on return
        let scratch;
        let (dir, keep) = match (&opts.output_dir, opts.create_natives) {
            (Some(dir), true) => {
                fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
                (dir.clone(), true)
            }
            _ => {
                scratch = tempfile::Builder::new()
                    .prefix("natjar-natives-")
                    .tempdir()
                    .map_err(|source| io_error(&std::env::temp_dir(), source))?;
                (scratch.path().to_path_buf(), false)
            }
        };

        let mut artifacts = Vec::with_capacity(opts.targets.len());
        for &target in &opts.targets {
            let path = driver.compile_for(ir, &dir, target)?;
            let bytes = fs::read(&path).map_err(|source| io_error(&path, source))?;
            let entry = format!("{}{}", opts.natives_prefix, target.artifact_name());
            artifacts.push(EmbeddedArtifact {
                target,
                entry: entry.clone(),
                path: keep.then(|| path.clone()),
                size: bytes.len(),
            });
            plan.add(entry, bytes)?;
        }
        Ok(artifacts)
    }
}

/// Native module name derived from the input file
fn module_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "natjar".to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("/tmp/app.jar")), "app");
        assert_eq!(module_name(Path::new("/")), "natjar");
    }

    #[test]
    fn test_missing_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = CompileOptions::new(dir.path().join("none.jar"), dir.path().join("out.jar"));
        let err = Session::new(options).run().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!dir.path().join("out.jar").exists());
    }
}
