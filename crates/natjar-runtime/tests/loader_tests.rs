use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use natjar_runtime::{
    HostPlatform, JarArtifactSource, LibraryOpener, LoadError, LoadedLibrary, NativeLoader,
};

struct CountingOpener {
    opened: Arc<AtomicUsize>,
}

struct Recorded(PathBuf);

impl LoadedLibrary for Recorded {
    fn path(&self) -> &Path {
        &self.0
    }

    fn has_symbol(&self, symbol: &str) -> bool {
        symbol == "Java_Calc_add"
    }
}

impl LibraryOpener for CountingOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, LoadError> {
        // Widen the race window
        std::thread::sleep(std::time::Duration::from_millis(20));
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Recorded(path.to_path_buf())))
    }
}

fn write_jar(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join("app.jar");
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
    path
}

#[test]
fn test_linux_host_loads_exactly_once_under_contention() {
    let dir = tempfile::tempdir().unwrap();
    let jar = write_jar(
        dir.path(),
        &[
            ("META-INF/natives/linux64.so", b"linux-artifact"),
            ("META-INF/natives/win64.dll", b"windows-artifact"),
        ],
    );

    let opened = Arc::new(AtomicUsize::new(0));
    let loader = Arc::new(NativeLoader::new(
        HostPlatform::new("linux", "x86_64"),
        Box::new(JarArtifactSource::new(&jar)),
        Box::new(CountingOpener {
            opened: opened.clone(),
        }),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let loader = loader.clone();
            std::thread::spawn(move || {
                let loaded = loader.ensure_loaded().unwrap();
                (loaded.artifact, loaded.path().to_path_buf())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|(name, _)| *name == "linux64.so"));
    assert!(results.windows(2).all(|w| w[0].1 == w[1].1));

    let loaded = loader.ensure_loaded().unwrap();
    assert_eq!(std::fs::read(loaded.path()).unwrap(), b"linux-artifact");
    assert!(loaded.has_symbol("Java_Calc_add"));
    std::fs::remove_file(loaded.path()).unwrap();
}

#[test]
fn test_unrecognized_os_fails_descriptively() {
    let dir = tempfile::tempdir().unwrap();
    let jar = write_jar(dir.path(), &[("META-INF/natives/linux64.so", b"x")]);
    let opened = Arc::new(AtomicUsize::new(0));
    let loader = NativeLoader::new(
        HostPlatform::new("OS/2", "x86_64"),
        Box::new(JarArtifactSource::new(&jar)),
        Box::new(CountingOpener {
            opened: opened.clone(),
        }),
    );

    let err = loader.ensure_loaded().unwrap_err();
    assert!(matches!(err, LoadError::UnrecognizedOs { .. }));
    assert!(err.to_string().contains("OS/2"));
    assert_eq!(opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_artifact_names_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let jar = write_jar(dir.path(), &[("META-INF/natives/linux64.so", b"x")]);
    let loader = NativeLoader::new(
        HostPlatform::new("Windows 11", "amd64"),
        Box::new(JarArtifactSource::new(&jar)),
        Box::new(CountingOpener {
            opened: Arc::new(AtomicUsize::new(0)),
        }),
    );

    match loader.ensure_loaded() {
        Err(LoadError::ArtifactMissing { name, .. }) => {
            assert_eq!(name, "META-INF/natives/win64.dll")
        }
        other => panic!("expected ArtifactMissing, got {:?}", other),
    }
}

#[test]
fn test_32_bit_host_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let jar = write_jar(dir.path(), &[("META-INF/natives/linux64.so", b"x")]);
    let loader = NativeLoader::new(
        HostPlatform::new("linux", "i686"),
        Box::new(JarArtifactSource::new(&jar)),
        Box::new(CountingOpener {
            opened: Arc::new(AtomicUsize::new(0)),
        }),
    );
    assert!(matches!(
        loader.ensure_loaded(),
        Err(LoadError::UnsupportedArchitecture { .. })
    ));
}

struct Tracked {
    path: PathBuf,
    closed: Arc<AtomicUsize>,
}

impl LoadedLibrary for Tracked {
    fn path(&self) -> &Path {
        &self.path
    }

    fn has_symbol(&self, _symbol: &str) -> bool {
        false
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct TrackingOpener {
    closed: Arc<AtomicUsize>,
}

impl LibraryOpener for TrackingOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, LoadError> {
        Ok(Box::new(Tracked {
            path: path.to_path_buf(),
            closed: self.closed.clone(),
        }))
    }
}

#[test]
fn test_library_stays_open_while_loader_lives() {
    let dir = tempfile::tempdir().unwrap();
    let jar = write_jar(dir.path(), &[("META-INF/natives/linux64.so", b"linux-artifact")]);

    let closed = Arc::new(AtomicUsize::new(0));
    let loader = NativeLoader::new(
        HostPlatform::new("linux", "x86_64"),
        Box::new(JarArtifactSource::new(&jar)),
        Box::new(TrackingOpener { closed: closed.clone() }),
    );
    loader.ensure_loaded().unwrap();
    loader.ensure_loaded().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    drop(loader);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
