//! Errors raised while loading an embedded native artifact

use thiserror::Error;

/// Errors that can occur while locating, extracting or opening the native artifact.
///
/// The loader caches the outcome of its single load attempt, so every variant
/// carries owned, clonable data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// Only 64-bit hosts have artifacts
    #[error("Unsupported architecture: {arch} (only 64-bit hosts are supported)")]
    UnsupportedArchitecture {
        /// Architecture string reported by the host
        arch: String,
    },

    /// Host OS name matched none of the known families
    #[error("Unrecognized operating system: {os_name}")]
    UnrecognizedOs {
        /// OS name reported by the host
        os_name: String,
    },

    /// The package does not contain an artifact for this host
    #[error("Native artifact {name} not found in {source_desc}")]
    ArtifactMissing {
        /// Artifact file name
        name: String,
        /// Human-readable description of where we looked
        source_desc: String,
    },

    /// Reading the artifact or writing the temporary copy failed
    #[error("Failed to extract native artifact {name}: {message}")]
    Extract {
        /// Artifact file name
        name: String,
        /// Underlying I/O or archive error
        message: String,
    },

    /// Library file not found or could not be loaded
    #[error("Library not found: {path}")]
    NotFound {
        /// Path that was attempted
        path: String,
    },

    /// Symbol not found in library
    #[error("Symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Symbol name that was not found
        symbol: String,
        /// Library path
        library: String,
    },

    /// Platform-specific error
    #[error("Platform error: {0}")]
    PlatformError(String),

    /// Invalid path encoding
    #[error("Invalid UTF-8 in path: {0}")]
    InvalidPath(String),
}
