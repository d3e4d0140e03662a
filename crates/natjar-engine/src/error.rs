//! Top-level error type
//!
//! Each stage has its own error enum; this aggregates them so the session can
//! propagate any of them with `?`. Stage errors already say what failed, so
//! they are forwarded unchanged.

use crate::archive::PackageError;
use crate::artifact::ToolchainError;
use crate::classfile::ClassFormatError;
use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::index::IndexError;
use crate::ir::BackendError;
use crate::postprocess::PostprocessError;

/// Any failure that aborts a run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ClassFormat(#[from] ClassFormatError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Postprocess(#[from] PostprocessError),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("I/O error on {path}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
