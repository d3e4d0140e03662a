//! One-shot loader for the embedded native artifact
//!
//! `ensure_loaded` is safe to call from any number of threads. The first
//! caller detects the host, extracts the matching artifact to a temporary file
//! and opens it; everyone else either takes the lock-free fast path or blocks
//! on the gate until that attempt finishes. The outcome, success or failure,
//! is recorded once and returned to every later caller.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::LoadError;
use crate::library::{LibraryOpener, LoadedLibrary, SystemOpener};
use crate::platform::{HostPlatform, OsFamily};
use crate::DEFAULT_NATIVES_PREFIX;

/// Where embedded artifacts are read from
pub trait ArtifactSource: Send + Sync {
    /// Read the artifact with the given file name
    fn read_artifact(&self, name: &str) -> Result<Vec<u8>, LoadError>;

    /// Human-readable description for diagnostics
    fn describe(&self) -> String;
}

/// Reads artifacts from `<prefix><name>` entries of a jar
#[derive(Debug, Clone)]
pub struct JarArtifactSource {
    jar: PathBuf,
    prefix: String,
}

impl JarArtifactSource {
    pub fn new(jar: impl Into<PathBuf>) -> Self {
        Self::with_prefix(jar, DEFAULT_NATIVES_PREFIX)
    }

    pub fn with_prefix(jar: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        JarArtifactSource {
            jar: jar.into(),
            prefix: prefix.into(),
        }
    }
}

impl ArtifactSource for JarArtifactSource {
    fn read_artifact(&self, name: &str) -> Result<Vec<u8>, LoadError> {
        let extract_err = |message: String| LoadError::Extract {
            name: name.to_string(),
            message,
        };

        let file = File::open(&self.jar).map_err(|e| extract_err(e.to_string()))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| extract_err(e.to_string()))?;

        let entry_name = format!("{}{}", self.prefix, name);
        let mut entry = match archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(LoadError::ArtifactMissing {
                    name: entry_name,
                    source_desc: self.describe(),
                })
            }
            Err(e) => return Err(extract_err(e.to_string())),
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| extract_err(e.to_string()))?;
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("jar {}", self.jar.display())
    }
}

/// Reads artifacts from a plain directory (e.g. the `--create-natives` output)
#[derive(Debug, Clone)]
pub struct DirArtifactSource {
    dir: PathBuf,
}

impl DirArtifactSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirArtifactSource { dir: dir.into() }
    }
}

impl ArtifactSource for DirArtifactSource {
    fn read_artifact(&self, name: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LoadError::ArtifactMissing {
                name: name.to_string(),
                source_desc: self.describe(),
            }),
            Err(e) => Err(LoadError::Extract {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

/// A successfully loaded artifact
pub struct LoadedArtifact {
    pub os: OsFamily,
    pub artifact: &'static str,
    library: Box<dyn LoadedLibrary>,
}

impl LoadedArtifact {
    /// Path of the extracted temporary copy
    pub fn path(&self) -> &Path {
        self.library.path()
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.library.has_symbol(symbol)
    }
}

impl std::fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("os", &self.os)
            .field("artifact", &self.artifact)
            .field("path", &self.path())
            .finish()
    }
}

/// Idempotent, concurrency-safe loader for one package's native artifact
pub struct NativeLoader {
    platform: HostPlatform,
    source: Box<dyn ArtifactSource>,
    opener: Box<dyn LibraryOpener>,
    gate: Mutex<()>,
    state: OnceCell<Result<LoadedArtifact, LoadError>>,
}

impl NativeLoader {
    pub fn new(
        platform: HostPlatform,
        source: Box<dyn ArtifactSource>,
        opener: Box<dyn LibraryOpener>,
    ) -> Self {
        NativeLoader {
            platform,
            source,
            opener,
            gate: Mutex::new(()),
            state: OnceCell::new(),
        }
    }

    /// Loader for a jar on the current host, using the system library loader
    pub fn for_jar(jar: impl Into<PathBuf>, prefix: &str) -> Self {
        NativeLoader::new(
            HostPlatform::detect(),
            Box::new(JarArtifactSource::with_prefix(jar, prefix)),
            Box::new(SystemOpener),
        )
    }

    pub fn platform(&self) -> &HostPlatform {
        &self.platform
    }

    /// Whether a load attempt has completed (successfully or not)
    pub fn is_settled(&self) -> bool {
        self.state.get().is_some()
    }

    /// Load the artifact for this host, at most once per loader.
    pub fn ensure_loaded(&self) -> Result<&LoadedArtifact, LoadError> {
        if let Some(state) = self.state.get() {
            return state.as_ref().map_err(Clone::clone);
        }

        let _guard = self.gate.lock();
        let state = self.state.get_or_init(|| {
            let result = self.load();
            match &result {
                Ok(loaded) => tracing::info!(
                    artifact = loaded.artifact,
                    path = %loaded.path().display(),
                    "native artifact loaded"
                ),
                Err(e) => tracing::warn!(error = %e, "native artifact failed to load"),
            }
            result
        });
        state.as_ref().map_err(Clone::clone)
    }

    fn load(&self) -> Result<LoadedArtifact, LoadError> {
        let os = self.platform.os_family()?;
        let artifact = os.artifact_name();
        let bytes = self.source.read_artifact(artifact)?;
        let path = extract_to_temp(artifact, &bytes)?;
        let library = self.opener.open(&path)?;
        Ok(LoadedArtifact { os, artifact, library })
    }
}

/// Write the artifact to a fresh temporary file that outlives the process
/// handle, since the mapped library must stay on disk while in use.
fn extract_to_temp(name: &str, bytes: &[u8]) -> Result<PathBuf, LoadError> {
    let extract_err = |message: String| LoadError::Extract {
        name: name.to_string(),
        message,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("natjar_")
        .suffix(".tmp")
        .tempfile()
        .map_err(|e| extract_err(e.to_string()))?;
    tmp.write_all(bytes).map_err(|e| extract_err(e.to_string()))?;
    tmp.flush().map_err(|e| extract_err(e.to_string()))?;

    let (_file, path) = tmp.keep().map_err(|e| extract_err(e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<u8>);

    impl ArtifactSource for FixedSource {
        fn read_artifact(&self, _name: &str) -> Result<Vec<u8>, LoadError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    struct FakeLibrary(PathBuf);

    impl LoadedLibrary for FakeLibrary {
        fn path(&self) -> &Path {
            &self.0
        }

        fn has_symbol(&self, _symbol: &str) -> bool {
            false
        }
    }

    struct FakeOpener;

    impl LibraryOpener for FakeOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, LoadError> {
            Ok(Box::new(FakeLibrary(path.to_path_buf())))
        }
    }

    #[test]
    fn test_extracted_copy_matches_artifact() {
        let loader = NativeLoader::new(
            HostPlatform::new("linux", "x86_64"),
            Box::new(FixedSource(b"\x7fELF-fake".to_vec())),
            Box::new(FakeOpener),
        );
        let loaded = loader.ensure_loaded().unwrap();
        assert_eq!(loaded.artifact, "linux64.so");
        assert_eq!(std::fs::read(loaded.path()).unwrap(), b"\x7fELF-fake");
        let name = loaded.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("natjar_") && name.ends_with(".tmp"));
        std::fs::remove_file(loaded.path()).unwrap();
    }

    #[test]
    fn test_failure_is_sticky() {
        let loader = NativeLoader::new(
            HostPlatform::new("haiku", "x86_64"),
            Box::new(FixedSource(vec![])),
            Box::new(FakeOpener),
        );
        assert!(!loader.is_settled());
        let first = loader.ensure_loaded().unwrap_err();
        let second = loader.ensure_loaded().unwrap_err();
        assert_eq!(first, second);
        assert!(loader.is_settled());
    }

    #[test]
    fn test_dir_source_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirArtifactSource::new(dir.path());
        assert!(matches!(
            source.read_artifact("linux64.so"),
            Err(LoadError::ArtifactMissing { .. })
        ));
    }
}
