//! Run configuration
//!
//! Two layers: the optional JSON document (`Config`) and the resolved options
//! a session runs with (`CompileOptions`). Command-line values are applied on
//! top of the document by the CLI.

use std::path::{Path, PathBuf};

use natjar_runtime::OsFamily;
use serde::{Deserialize, Serialize};

/// Loader class generated into the output when none is configured
pub const DEFAULT_LOADER_CLASS: &str = "natjar/NativeLoader";

/// Default optimization level
pub const DEFAULT_OPTIMIZATION_LEVEL: u8 = 3;

/// Errors found while reading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed configuration document")]
    Json(#[from] serde_json::Error),
    #[error("Invalid exclusion pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Optimization level {0} is out of range (0-3)")]
    InvalidOptimizationLevel(u8),
    #[error("Unknown target OS {0:?} (expected windows, linux or mac)")]
    UnknownTarget(String),
    #[error("Input {0} does not exist")]
    MissingInput(PathBuf),
    #[error("--create-natives requires an output directory")]
    MissingOutputDir,
    #[error("Invalid loader class name {0:?}")]
    InvalidLoaderClass(String),
    #[error("Worker count must be at least 1")]
    InvalidWorkers,
}

/// One `ignoredMethods` entry: glob patterns over owner, name and descriptor.
/// Omitted parts match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodPattern {
    #[serde(default = "match_all")]
    pub owner: String,
    #[serde(default = "match_all")]
    pub name: String,
    #[serde(default = "match_all")]
    pub desc: String,
}

fn match_all() -> String {
    "**".to_string()
}

impl MethodPattern {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        MethodPattern {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// The JSON configuration document (all keys optional)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    pub ignored_methods: Vec<MethodPattern>,
    pub optimization_level: Option<u8>,
    pub natives_path: Option<String>,
    pub loader_class: Option<String>,
    pub workers: Option<usize>,
    pub compile_for: Vec<String>,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_json(&text)
    }
}

/// Fully resolved options for one run
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Jars indexed read-only for type resolution
    pub libraries: Vec<PathBuf>,
    /// Also write the textual IR here
    pub ir_output: Option<PathBuf>,
    /// Directory holding `clang` and `ld.lld` (`PATH` lookup when unset)
    pub toolchain_dir: Option<PathBuf>,
    /// Where built libraries are kept when `create_natives` is set
    pub output_dir: Option<PathBuf>,
    pub create_natives: bool,
    pub targets: Vec<OsFamily>,
    /// Archive directory the libraries are embedded under, ending in `/`
    pub natives_prefix: String,
    pub loader_class: String,
    pub optimization_level: u8,
    pub workers: usize,
    pub exclusions: Vec<MethodPattern>,
}

impl CompileOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        CompileOptions {
            input: input.into(),
            output: output.into(),
            libraries: vec![],
            ir_output: None,
            toolchain_dir: None,
            output_dir: None,
            create_natives: false,
            targets: vec![],
            natives_prefix: natjar_runtime::DEFAULT_NATIVES_PREFIX.to_string(),
            loader_class: DEFAULT_LOADER_CLASS.to_string(),
            optimization_level: DEFAULT_OPTIMIZATION_LEVEL,
            workers: num_cpus::get().max(1),
            exclusions: vec![],
        }
    }

    /// Merge a configuration document into these options
    pub fn apply_config(&mut self, config: &Config) -> Result<(), ConfigError> {
        self.exclusions.extend(config.ignored_methods.iter().cloned());
        if let Some(level) = config.optimization_level {
            self.optimization_level = level;
        }
        if let Some(path) = &config.natives_path {
            self.set_natives_prefix(path);
        }
        if let Some(loader) = &config.loader_class {
            self.loader_class = loader.clone();
        }
        if let Some(workers) = config.workers {
            self.workers = workers;
        }
        for name in &config.compile_for {
            self.add_target(name)?;
        }
        Ok(())
    }

    /// Add a target by its short name, ignoring duplicates
    pub fn add_target(&mut self, name: &str) -> Result<(), ConfigError> {
        let os = OsFamily::from_name(name.trim()).ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))?;
        if !self.targets.contains(&os) {
            self.targets.push(os);
        }
        Ok(())
    }

    /// Set the natives prefix, normalized to a relative directory ending in `/`
    pub fn set_natives_prefix(&mut self, prefix: &str) {
        let trimmed = prefix.trim_start_matches('/');
        self.natives_prefix = if trimmed.is_empty() || trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{}/", trimmed)
        };
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input.exists() {
            return Err(ConfigError::MissingInput(self.input.clone()));
        }
        for library in &self.libraries {
            if !library.exists() {
                return Err(ConfigError::MissingInput(library.clone()));
            }
        }
        if self.optimization_level > 3 {
            return Err(ConfigError::InvalidOptimizationLevel(self.optimization_level));
        }
        if self.create_natives && self.output_dir.is_none() {
            return Err(ConfigError::MissingOutputDir);
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        let valid_loader = !self.loader_class.is_empty()
            && !self.loader_class.starts_with('/')
            && !self.loader_class.ends_with('/')
            && !self.loader_class.contains(['.', ';', '[', '<', '>'])
            && !self.loader_class.contains("//");
        if !valid_loader {
            return Err(ConfigError::InvalidLoaderClass(self.loader_class.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let config = Config::from_json(
            r#"{
                "ignoredMethods": [
                    { "owner": "a.b.*", "name": "*Impl", "desc": "**" },
                    { "owner": "c.D" }
                ],
                "optimizationLevel": 2,
                "compileFor": ["linux", "windows"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.ignored_methods.len(), 2);
        assert_eq!(config.ignored_methods[1], MethodPattern::new("c.D", "**", "**"));
        assert_eq!(config.optimization_level, Some(2));
        assert_eq!(config.compile_for, vec!["linux", "windows"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            Config::from_json(r#"{ "ignoredMethod": [] }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_apply_config() {
        let mut options = CompileOptions::new("in.jar", "out.jar");
        let config = Config {
            optimization_level: Some(1),
            natives_path: Some("/native/libs".into()),
            compile_for: vec!["linux".into(), "LINUX".into()],
            ..Config::default()
        };
        options.apply_config(&config).unwrap();
        assert_eq!(options.optimization_level, 1);
        assert_eq!(options.natives_prefix, "native/libs/");
        assert_eq!(options.targets, vec![OsFamily::Linux]);
    }

    #[test]
    fn test_unknown_target() {
        let mut options = CompileOptions::new("in.jar", "out.jar");
        assert!(matches!(options.add_target("amiga"), Err(ConfigError::UnknownTarget(_))));
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        std::fs::write(&input, b"").unwrap();

        let mut options = CompileOptions::new(&input, dir.path().join("out.jar"));
        options.validate().unwrap();

        options.optimization_level = 4;
        assert!(matches!(options.validate(), Err(ConfigError::InvalidOptimizationLevel(4))));
        options.optimization_level = 3;

        options.create_natives = true;
        assert!(matches!(options.validate(), Err(ConfigError::MissingOutputDir)));
        options.create_natives = false;

        options.loader_class = "a.b.Loader".into();
        assert!(matches!(options.validate(), Err(ConfigError::InvalidLoaderClass(_))));

        let missing = CompileOptions::new(dir.path().join("nope.jar"), "out.jar");
        assert!(matches!(missing.validate(), Err(ConfigError::MissingInput(_))));
    }
}
