//! Command-line definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "natjar")]
#[command(about = "Compile JVM bytecode methods to native code behind JNI", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate eligible methods of a jar and write the repackaged jar
    Compile(CompileArgs),

    /// Load the native library embedded in a packaged jar on this host
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Input jar
    pub input: PathBuf,

    /// Output jar
    pub output: PathBuf,

    /// Library jar indexed for type resolution only (repeatable)
    #[arg(short = 'l', long = "library")]
    pub libraries: Vec<PathBuf>,

    /// JSON configuration document
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write the textual IR to this file
    #[arg(long)]
    pub ir_output: Option<PathBuf>,

    /// Directory containing clang and ld.lld (default: PATH)
    #[arg(long)]
    pub llvm_dir: Option<PathBuf>,

    /// Directory the built libraries are kept in (with --create-natives)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Keep the built libraries in --output-dir
    #[arg(long)]
    pub create_natives: bool,

    /// Target OS to build for: windows, linux, mac (repeatable or comma separated)
    #[arg(long = "compile-for", value_delimiter = ',')]
    pub compile_for: Vec<String>,

    /// Archive directory the libraries are embedded under
    #[arg(long)]
    pub natives_path: Option<String>,

    /// Internal name of the generated loader class
    #[arg(long)]
    pub loader_class: Option<String>,

    /// Optimization level (0-3)
    #[arg(short = 'O', long = "opt-level")]
    pub opt_level: Option<u8>,

    /// Worker threads for class parsing
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Packaged jar
    pub jar: PathBuf,

    /// Archive directory the libraries are embedded under
    #[arg(long, default_value = natjar_runtime::DEFAULT_NATIVES_PREFIX)]
    pub natives_path: String,

    /// JNI symbol that must be exported by the library
    #[arg(long)]
    pub symbol: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile() {
        let cli = Cli::try_parse_from([
            "natjar",
            "compile",
            "in.jar",
            "out.jar",
            "--compile-for",
            "linux,windows",
            "-O",
            "2",
            "-l",
            "rt.jar",
        ])
        .unwrap();
        let Commands::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(args.input, PathBuf::from("in.jar"));
        assert_eq!(args.compile_for, vec!["linux", "windows"]);
        assert_eq!(args.opt_level, Some(2));
        assert_eq!(args.libraries, vec![PathBuf::from("rt.jar")]);
        assert!(!args.create_natives);
    }

    #[test]
    fn test_parse_probe_defaults() {
        let cli = Cli::try_parse_from(["natjar", "probe", "app.jar"]).unwrap();
        let Commands::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.natives_path, "META-INF/natives/");
        assert!(args.symbol.is_empty());
    }

    #[test]
    fn test_missing_output_rejected() {
        assert!(Cli::try_parse_from(["natjar", "compile", "in.jar"]).is_err());
    }
}
