//! natjar runtime
//!
//! Support code that runs inside a shipped program:
//! - Host detection and the artifact naming table shared with the packager (`platform`)
//! - Cross-platform dynamic library loading (`library`)
//! - One-shot, thread-safe extraction and loading of the embedded artifact (`loader`)

#![warn(rust_2018_idioms)]

pub mod error;
pub mod library;
pub mod loader;
pub mod platform;

pub use error::LoadError;
pub use library::{Library, LibraryOpener, LoadedLibrary, SystemOpener};
pub use loader::{ArtifactSource, DirArtifactSource, JarArtifactSource, LoadedArtifact, NativeLoader};
pub use platform::{HostPlatform, OsFamily};

/// Resource prefix under which native artifacts are embedded by default
pub const DEFAULT_NATIVES_PREFIX: &str = "META-INF/natives/";
