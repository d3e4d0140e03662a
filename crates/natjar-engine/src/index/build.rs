//! Parallel index construction

use crossbeam::channel;

use super::{ClassEntry, IndexError, ProgramIndex, Provenance};
use crate::classfile::ClassFile;

/// Raw bytes of one class-file entry
#[derive(Debug, Clone)]
pub struct ClassSource {
    pub entry_name: String,
    pub bytes: Vec<u8>,
    pub library: bool,
}

impl ClassSource {
    pub fn program(entry_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ClassSource {
            entry_name: entry_name.into(),
            bytes,
            library: false,
        }
    }

    pub fn library(entry_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ClassSource {
            entry_name: entry_name.into(),
            bytes,
            library: true,
        }
    }
}

/// Outcome of building an index
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Program entries that failed to parse; they are carried through as resources
    pub rejected: Vec<String>,
    /// Entries skipped because another entry already defined the class
    pub shadowed: Vec<String>,
}

impl ProgramIndex {
    /// Parse and index `sources` on `workers` threads. Program classes take
    /// precedence over library classes with the same name; within each group
    /// the first definition wins.
    pub fn build(sources: &[ClassSource], workers: usize) -> Result<(ProgramIndex, BuildReport), IndexError> {
        let mut parsed: Vec<Option<Result<ClassEntry, IndexError>>> =
            parse_all(sources, workers.max(1))?.into_iter().map(Some).collect();

        let mut index = ProgramIndex::new();
        let mut report = BuildReport::default();

        // Program classes first so they shadow library copies
        let order = sources
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.library)
            .chain(sources.iter().enumerate().filter(|(_, s)| s.library));

        for (i, source) in order {
            let entry = match parsed[i].take() {
                Some(Ok(entry)) => entry,
                None => continue,
                Some(Err(e)) => {
                    if !source.library {
                        tracing::warn!(entry = %source.entry_name, error = %e, "class will be copied through unmodified");
                        report.rejected.push(source.entry_name.clone());
                    }
                    continue;
                }
            };
            match index.insert(entry) {
                Ok(_) => {}
                Err(IndexError::DuplicateClass(name)) => {
                    tracing::debug!(class = %name, entry = %source.entry_name, "duplicate class definition skipped");
                    report.shadowed.push(source.entry_name.clone());
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            classes = index.len(),
            rejected = report.rejected.len(),
            "program index built"
        );
        Ok((index, report))
    }
}

fn parse_one(source: &ClassSource) -> Result<ClassEntry, IndexError> {
    let provenance = if source.library {
        Provenance::Library
    } else {
        Provenance::Program
    };
    let to_err = |e| IndexError::ClassFormat {
        class: source.entry_name.clone(),
        source: e,
    };
    let file = ClassFile::parse(&source.bytes).map_err(to_err)?;
    ClassEntry::new(file, source.entry_name.clone(), provenance).map_err(to_err)
}

/// Parse every source; the result vector is indexed like `sources`
fn parse_all(sources: &[ClassSource], workers: usize) -> Result<Vec<Result<ClassEntry, IndexError>>, IndexError> {
    let (job_tx, job_rx) = channel::unbounded::<usize>();
    let (result_tx, result_rx) = channel::unbounded::<(usize, Result<ClassEntry, IndexError>)>();

    for i in 0..sources.len() {
        // Receiver is alive for the whole function
        let _ = job_tx.send(i);
    }
    drop(job_tx);

    crossbeam::scope(|scope| {
        for _ in 0..workers.min(sources.len().max(1)) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                for i in job_rx.iter() {
                    if result_tx.send((i, parse_one(&sources[i]))).is_err() {
                        break;
                    }
                }
            });
        }
    })
    .map_err(|_| IndexError::WorkerPanicked)?;
    drop(result_tx);

    let mut slots: Vec<Option<Result<ClassEntry, IndexError>>> = (0..sources.len()).map(|_| None).collect();
    for (i, result) in result_rx.iter() {
        slots[i] = Some(result);
    }
    slots
        .into_iter()
        .map(|slot| slot.ok_or(IndexError::WorkerPanicked))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{access, ClassBuilder};

    fn class_bytes(name: &str, methods: &[&str]) -> Vec<u8> {
        let mut builder = ClassBuilder::new(52, access::PUBLIC, name, "java/lang/Object").unwrap();
        for m in methods {
            builder.method(access::PUBLIC | access::ABSTRACT, m, "()V", None).unwrap();
        }
        builder.build().to_bytes()
    }

    #[test]
    fn test_build_is_deterministic() {
        let sources: Vec<ClassSource> = (0..40)
            .map(|i| ClassSource::program(format!("p/C{}.class", i), class_bytes(&format!("p/C{}", i), &["run"])))
            .collect();

        let (a, _) = ProgramIndex::build(&sources, 1).unwrap();
        let (b, _) = ProgramIndex::build(&sources, 8).unwrap();
        let names_a: Vec<&str> = a.class_ids().map(|id| a.class(id).name.as_str()).collect();
        let names_b: Vec<&str> = b.class_ids().map(|id| b.class(id).name.as_str()).collect();
        assert_eq!(names_a, names_b);
        assert_eq!(names_a[7], "p/C7");
    }

    #[test]
    fn test_malformed_class_is_rejected_not_fatal() {
        let sources = vec![
            ClassSource::program("good/A.class", class_bytes("good/A", &[])),
            ClassSource::program("bad/B.class", b"not a class".to_vec()),
        ];
        let (index, report) = ProgramIndex::build(&sources, 2).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(report.rejected, vec!["bad/B.class".to_string()]);
    }

    #[test]
    fn test_program_shadows_library() {
        let sources = vec![
            ClassSource::library("lib/X.class", class_bytes("shared/X", &["fromLib"])),
            ClassSource::program("shared/X.class", class_bytes("shared/X", &["fromProgram"])),
        ];
        let (index, report) = ProgramIndex::build(&sources, 2).unwrap();
        let id = index.lookup_class("shared/X").unwrap();
        assert!(!index.class(id).is_library());
        assert!(index.class(id).has_method("fromProgram", "()V"));
        assert_eq!(report.shadowed, vec!["lib/X.class".to_string()]);
    }
}
