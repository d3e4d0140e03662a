//! Jar input and output
//!
//! The output archive is the input archive with some entries replaced and
//! some appended. Untouched entries are copied through raw (compressed bytes
//! and metadata as they were), so re-packaging without changes reproduces
//! every entry exactly. The archive is assembled in a temporary file next to
//! the destination and only moved into place once complete.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Errors raised while reading or writing archives
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Archive error in {path}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Duplicate output entry {0}")]
    DuplicateEntry(String),
}

impl PackageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(path: &Path, source: zip::result::ZipError) -> Self {
        PackageError::Zip {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One archive entry with its uncompressed content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarEntry {
    pub name: String,
    pub is_dir: bool,
    pub data: Vec<u8>,
}

impl JarEntry {
    pub fn is_class(&self) -> bool {
        !self.is_dir && self.name.ends_with(".class")
    }
}

/// Read every entry of a jar, in archive order
pub fn read_jar(path: &Path) -> Result<Vec<JarEntry>, PackageError> {
    let file = File::open(path).map_err(|e| PackageError::io(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| PackageError::zip(path, e))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| PackageError::zip(path, e))?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).map_err(|e| PackageError::io(path, e))?;
        entries.push(JarEntry {
            name: entry.name().to_string(),
            is_dir: entry.is_dir(),
            data,
        });
    }
    Ok(entries)
}

/// Changes to apply on top of the input archive
#[derive(Debug, Default)]
pub struct OutputPlan {
    /// Entry name -> new content, written in the entry's original position
    replaced: FxHashMap<String, Vec<u8>>,
    /// New entries appended after the input's, replacing same-named inputs
    added: Vec<(String, Vec<u8>)>,
}

impl OutputPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.replaced.insert(name.into(), data);
    }

    pub fn add(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<(), PackageError> {
        let name = name.into();
        if self.added.iter().any(|(n, _)| *n == name) {
            return Err(PackageError::DuplicateEntry(name));
        }
        self.added.push((name, data));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.replaced.is_empty() && self.added.is_empty()
    }

    pub fn replaced_count(&self) -> usize {
        self.replaced.len()
    }

    pub fn added_names(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(|(n, _)| n.as_str())
    }
}

/// Write `input` with `plan` applied to `output`
pub fn write_jar(input: &Path, output: &Path, plan: &OutputPlan) -> Result<(), PackageError> {
    let file = File::open(input).map_err(|e| PackageError::io(input, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| PackageError::zip(input, e))?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".natjar-")
        .suffix(".jar.tmp")
        .tempfile_in(&parent)
        .map_err(|e| PackageError::io(&parent, e))?;
    let mut writer = ZipWriter::new(tmp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let added: FxHashSet<&str> = plan.added_names().collect();
    let mut present: FxHashSet<String> = FxHashSet::default();

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| PackageError::zip(input, e))?;
        let name = entry.name().to_string();
        if added.contains(name.as_str()) {
            continue;
        }
        if let Some(data) = plan.replaced.get(&name) {
            drop(entry);
            writer.start_file(name.as_str(), options).map_err(|e| PackageError::zip(output, e))?;
            writer.write_all(data).map_err(|e| PackageError::io(output, e))?;
        } else {
            writer.raw_copy_file(entry).map_err(|e| PackageError::zip(output, e))?;
        }
        present.insert(name);
    }

    for (name, data) in &plan.added {
        for dir in parent_dirs(name) {
            if present.insert(dir.clone()) {
                writer.add_directory(dir, options).map_err(|e| PackageError::zip(output, e))?;
            }
        }
        writer.start_file(name.as_str(), options).map_err(|e| PackageError::zip(output, e))?;
        writer.write_all(data).map_err(|e| PackageError::io(output, e))?;
        present.insert(name.clone());
    }

    let tmp = writer.finish().map_err(|e| PackageError::zip(output, e))?;
    tmp.persist(output).map_err(|e| PackageError::io(output, e.error))?;
    tracing::debug!(
        output = %output.display(),
        replaced = plan.replaced.len(),
        added = plan.added.len(),
        "archive written"
    );
    Ok(())
}

/// `a/b/c.so` -> [`a/`, `a/b/`]
fn parent_dirs(name: &str) -> Vec<String> {
    name.match_indices('/')
        .map(|(i, _)| name[..=i].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parent_dirs() {
        assert_eq!(parent_dirs("META-INF/natives/linux64.so"), vec!["META-INF/", "META-INF/natives/"]);
        assert!(parent_dirs("top.txt").is_empty());
    }

    #[test]
    fn test_empty_plan_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        let output = dir.path().join("out.jar");
        make_jar(
            &input,
            &[("META-INF/", b""), ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"), ("a/B.class", b"\xca\xfe")],
        );

        write_jar(&input, &output, &OutputPlan::new()).unwrap();
        assert_eq!(read_jar(&input).unwrap(), read_jar(&output).unwrap());
    }

    #[test]
    fn test_replace_and_add() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        let output = dir.path().join("out.jar");
        make_jar(
            &input,
            &[("a/B.class", b"old"), ("META-INF/natives/linux64.so", b"stale"), ("z.txt", b"keep")],
        );

        let mut plan = OutputPlan::new();
        plan.replace("a/B.class", b"new".to_vec());
        plan.add("META-INF/natives/linux64.so", b"fresh".to_vec()).unwrap();
        plan.add("natjar/NativeLoader.class", b"loader".to_vec()).unwrap();
        assert!(plan.add("natjar/NativeLoader.class", vec![]).is_err());
        write_jar(&input, &output, &plan).unwrap();

        let entries = read_jar(&output).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "a/B.class",
                "z.txt",
                "META-INF/",
                "META-INF/natives/",
                "META-INF/natives/linux64.so",
                "natjar/",
                "natjar/NativeLoader.class"
            ]
        );
        assert_eq!(entries[0].data, b"new");
        assert_eq!(entries[1].data, b"keep");
        assert_eq!(entries[4].data, b"fresh");
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_jar(&dir.path().join("missing.jar"));
        assert!(matches!(result, Err(PackageError::Io { .. })));
    }
}
