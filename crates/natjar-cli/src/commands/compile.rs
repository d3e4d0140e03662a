//! `natjar compile`

use anyhow::Context;
use natjar_engine::{CompileOptions, Config, Session};

use crate::cli::CompileArgs;

/// Resolve options: defaults, then the configuration document, then flags
pub fn resolve_options(args: CompileArgs) -> anyhow::Result<CompileOptions> {
    let mut options = CompileOptions::new(args.input, args.output);

    if let Some(path) = &args.config {
        let config = Config::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))?;
        options.apply_config(&config)?;
    }

    options.libraries.extend(args.libraries);
    if args.ir_output.is_some() {
        options.ir_output = args.ir_output;
    }
    if args.llvm_dir.is_some() {
        options.toolchain_dir = args.llvm_dir;
    }
    if args.output_dir.is_some() {
        options.output_dir = args.output_dir;
    }
    options.create_natives |= args.create_natives;
    if !args.compile_for.is_empty() {
        options.targets.clear();
        for name in &args.compile_for {
            options.add_target(name)?;
        }
    }
    if let Some(prefix) = &args.natives_path {
        options.set_natives_prefix(prefix);
    }
    if let Some(loader) = args.loader_class {
        options.loader_class = loader;
    }
    if let Some(level) = args.opt_level {
        options.optimization_level = level;
    }
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    Ok(options)
}

pub fn execute(args: CompileArgs) -> anyhow::Result<()> {
    let options = resolve_options(args)?;
    let input = options.input.clone();
    let output = options.output.clone();

    let report = Session::new(options)
        .run()
        .with_context(|| format!("Failed to compile {}", input.display()))?;

    for notice in &report.notices {
        println!("{}", notice);
    }
    for entry in &report.rejected {
        eprintln!("Warning: {} is not a valid class file and was copied unchanged", entry);
    }
    println!(
        "Indexed {} classes: {} method(s) compiled to native code, {} class(es) rewritten",
        report.classes, report.compiled, report.modified_classes
    );
    for artifact in &report.artifacts {
        match &artifact.path {
            Some(path) => println!("Embedded {} ({} bytes, kept at {})", artifact.entry, artifact.size, path.display()),
            None => println!("Embedded {} ({} bytes)", artifact.entry, artifact.size),
        }
    }
    println!("Wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use natjar_runtime::OsFamily;

    use crate::cli::{Cli, Commands};

    fn compile_args(argv: &[&str]) -> CompileArgs {
        let mut full = vec!["natjar", "compile"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Compile(args) => args,
            _ => panic!("expected compile"),
        }
    }

    #[test]
    fn test_flags_override_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("natjar.json");
        std::fs::write(
            &config,
            r#"{ "optimizationLevel": 1, "compileFor": ["windows"], "nativesPath": "libs", "ignoredMethods": [{ "owner": "a.**" }] }"#,
        )
        .unwrap();

        let args = compile_args(&[
            "in.jar",
            "out.jar",
            "--config",
            config.to_str().unwrap(),
            "--compile-for",
            "linux",
            "-O",
            "0",
        ]);
        let options = resolve_options(args).unwrap();
        assert_eq!(options.optimization_level, 0);
        assert_eq!(options.targets, vec![OsFamily::Linux]);
        assert_eq!(options.natives_prefix, "libs/");
        assert_eq!(options.exclusions.len(), 1);
    }

    #[test]
    fn test_unknown_target() {
        let args = compile_args(&["in.jar", "out.jar", "--compile-for", "solaris"]);
        let err = resolve_options(args).unwrap_err();
        assert!(format!("{:#}", err).contains("solaris"));
    }

    #[test]
    fn test_missing_config_reports_path() {
        let args = compile_args(&["in.jar", "out.jar", "--config", "/no/such/natjar.json"]);
        let err = resolve_options(args).unwrap_err();
        assert!(format!("{:#}", err).contains("/no/such/natjar.json"));
    }
}
