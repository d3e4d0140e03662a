//! Program index
//!
//! An arena of every class in the program (and any library jars), addressed by
//! stable `ClassId`s. Each class keeps a `(name, descriptor) -> method` lookup
//! that is rebuilt whenever the class gains a method, so lookups never observe
//! a half-updated class.
//!
//! Construction parses class files on a fixed-size worker pool; results are put
//! back in input order so the index is identical run to run.

mod build;

use std::fmt;

use rustc_hash::FxHashMap;

use crate::classfile::{
    annotation_types, decode_code, ClassFile, ClassFormatError, Code, Instruction, MethodInfo,
};

pub use build::{BuildReport, ClassSource};

/// Errors from index lookups and mutations
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Class {0} not found")]
    ClassNotFound(String),
    #[error("Method {owner}.{name}{descriptor} not found")]
    MethodNotFound {
        owner: String,
        name: String,
        descriptor: String,
    },
    #[error("Class {0} is a library class and cannot be modified")]
    ReadOnly(String),
    #[error("Class {owner} already declares {name}{descriptor}")]
    DuplicateMethod {
        owner: String,
        name: String,
        descriptor: String,
    },
    #[error("Class {0} is defined twice")]
    DuplicateClass(String),
    #[error("Malformed class {class}")]
    ClassFormat {
        class: String,
        #[source]
        source: ClassFormatError,
    },
    #[error("Index worker panicked")]
    WorkerPanicked,
}

/// Stable handle to a class in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Stable handle to a method: its class and position within the class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    pub class: ClassId,
    pub index: u32,
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Where a class came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Part of the program being compiled
    Program,
    /// Referenced for type resolution only; read-only
    Library,
    /// Generated during this run
    Synthetic,
}

/// A method and its per-run state
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Decoded body; empty for abstract and native methods
    pub instructions: Vec<Instruction>,
    /// Annotation type descriptors
    pub annotations: Vec<String>,
    /// Chosen for translation by the selector
    pub marked: bool,
    /// Translation finished
    pub compiled: bool,
}

impl Method {
    fn from_info(file: &ClassFile, info: &MethodInfo) -> Result<Method, ClassFormatError> {
        let instructions = match info.code() {
            Some(code) => decode_code(&code.code)?,
            None => vec![],
        };
        Ok(Method {
            name: file.pool.utf8(info.name_index)?,
            descriptor: file.pool.utf8(info.descriptor_index)?,
            access_flags: info.access_flags,
            instructions,
            annotations: annotation_types(&file.pool, &info.attributes),
            marked: false,
            compiled: false,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & crate::classfile::access::STATIC != 0
    }

    pub fn is_synchronized(&self) -> bool {
        self.access_flags & crate::classfile::access::SYNCHRONIZED != 0
    }
}

/// A class in the index
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub name: String,
    pub super_name: Option<String>,
    /// Archive entry the class was read from (`a/b/C.class`)
    pub entry_name: String,
    pub provenance: Provenance,
    file: ClassFile,
    annotations: Vec<String>,
    methods: Vec<Method>,
    lookup: FxHashMap<(String, String), u32>,
    modified: bool,
}

impl ClassEntry {
    pub(crate) fn new(
        file: ClassFile,
        entry_name: String,
        provenance: Provenance,
    ) -> Result<ClassEntry, ClassFormatError> {
        let name = file.name()?;
        let super_name = file.super_name()?;
        let methods = file
            .methods
            .iter()
            .map(|info| Method::from_info(&file, info))
            .collect::<Result<Vec<_>, _>>()?;
        let annotations = annotation_types(&file.pool, &file.attributes);
        let mut entry = ClassEntry {
            name,
            super_name,
            entry_name,
            provenance,
            file,
            annotations,
            methods,
            lookup: FxHashMap::default(),
            modified: provenance == Provenance::Synthetic,
        };
        entry.refresh();
        Ok(entry)
    }

    /// Rebuild the method lookup from the method list
    pub fn refresh(&mut self) {
        self.lookup.clear();
        for (i, method) in self.methods.iter().enumerate() {
            self.lookup
                .insert((method.name.clone(), method.descriptor.clone()), i as u32);
        }
    }

    pub fn file(&self) -> &ClassFile {
        &self.file
    }

    /// Annotation type descriptors on the class itself
    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn method(&self, index: u32) -> &Method {
        &self.methods[index as usize]
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<u32> {
        self.lookup
            .get(&(name.to_string(), descriptor.to_string()))
            .copied()
    }

    pub fn has_method(&self, name: &str, descriptor: &str) -> bool {
        self.find_method(name, descriptor).is_some()
    }

    pub fn is_library(&self) -> bool {
        self.provenance == Provenance::Library
    }

    pub fn is_interface(&self) -> bool {
        self.file.is_interface()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

/// Arena of classes with name lookup
#[derive(Debug, Default)]
pub struct ProgramIndex {
    classes: Vec<ClassEntry>,
    by_name: FxHashMap<String, ClassId>,
}

impl ProgramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Every class id, in insertion order
    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len() as u32).map(ClassId)
    }

    pub fn class(&self, id: ClassId) -> &ClassEntry {
        &self.classes[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        self.class(id.class).method(id.index)
    }

    pub fn method_ids(&self, class: ClassId) -> impl Iterator<Item = MethodId> {
        let count = self.class(class).methods.len() as u32;
        (0..count).map(move |index| MethodId { class, index })
    }

    /// Insert a class; names must be unique
    pub fn insert(&mut self, entry: ClassEntry) -> Result<ClassId, IndexError> {
        if self.by_name.contains_key(&entry.name) {
            return Err(IndexError::DuplicateClass(entry.name));
        }
        let id = ClassId(self.classes.len() as u32);
        self.by_name.insert(entry.name.clone(), id);
        self.classes.push(entry);
        Ok(id)
    }

    /// Add a class generated during this run
    pub fn add_class(&mut self, file: ClassFile) -> Result<ClassId, IndexError> {
        let name = file.name().map_err(|source| IndexError::ClassFormat {
            class: "<synthetic>".to_string(),
            source,
        })?;
        let entry = ClassEntry::new(file, format!("{}.class", name), Provenance::Synthetic)
            .map_err(|source| IndexError::ClassFormat { class: name, source })?;
        self.insert(entry)
    }

    pub fn lookup_class(&self, name: &str) -> Result<ClassId, IndexError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| IndexError::ClassNotFound(name.to_string()))
    }

    pub fn lookup_method(&self, owner: &str, name: &str, descriptor: &str) -> Result<MethodId, IndexError> {
        let class = self.lookup_class(owner)?;
        self.class(class)
            .find_method(name, descriptor)
            .map(|index| MethodId { class, index })
            .ok_or_else(|| IndexError::MethodNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })
    }

    /// Re-derive the lookup view of one class
    pub fn refresh(&mut self, class: ClassId) {
        self.classes[class.0 as usize].refresh();
    }

    fn writable(&mut self, class: ClassId) -> Result<&mut ClassEntry, IndexError> {
        let entry = &mut self.classes[class.0 as usize];
        if entry.is_library() {
            return Err(IndexError::ReadOnly(entry.name.clone()));
        }
        Ok(entry)
    }

    /// Mutable class file of a program class; marks the class modified
    pub fn file_mut(&mut self, class: ClassId) -> Result<&mut ClassFile, IndexError> {
        let entry = self.writable(class)?;
        entry.modified = true;
        Ok(&mut entry.file)
    }

    pub fn set_marked(&mut self, id: MethodId, marked: bool) {
        self.classes[id.class.0 as usize].methods[id.index as usize].marked = marked;
    }

    pub fn set_compiled(&mut self, id: MethodId) {
        self.classes[id.class.0 as usize].methods[id.index as usize].compiled = true;
    }

    /// Append a method to a program class. The class lookup is refreshed
    /// before this returns.
    pub fn add_method(&mut self, class: ClassId, info: MethodInfo) -> Result<MethodId, IndexError> {
        let entry = self.writable(class)?;
        let method = Method::from_info(&entry.file, &info).map_err(|source| IndexError::ClassFormat {
            class: entry.name.clone(),
            source,
        })?;
        if entry.has_method(&method.name, &method.descriptor) {
            return Err(IndexError::DuplicateMethod {
                owner: entry.name.clone(),
                name: method.name,
                descriptor: method.descriptor,
            });
        }
        entry.file.methods.push(info);
        entry.methods.push(method);
        entry.modified = true;
        entry.refresh();
        Ok(MethodId {
            class,
            index: entry.methods.len() as u32 - 1,
        })
    }

    /// Replace a method's body (or give a body to a method without one)
    pub fn replace_code(&mut self, id: MethodId, code: Code) -> Result<(), IndexError> {
        let entry = self.writable(id.class)?;
        let instructions = decode_code(&code.code).map_err(|e| IndexError::ClassFormat {
            class: entry.name.clone(),
            source: e.into(),
        })?;
        let info = &mut entry.file.methods[id.index as usize];
        match info.code_mut() {
            Some(existing) => *existing = code,
            None => info.attributes.push(crate::classfile::Attribute::Code(code)),
        }
        entry.methods[id.index as usize].instructions = instructions;
        entry.modified = true;
        Ok(())
    }

    /// Classes whose bytes must be re-encoded in the output
    pub fn modified_classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.iter().filter(|c| c.modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{access, ClassBuilder, CodeAssembler, Opcode};

    fn sample_class(name: &str) -> ClassFile {
        let mut builder = ClassBuilder::new(52, access::PUBLIC | access::SUPER, name, "java/lang/Object").unwrap();
        let code_name = builder.pool().intern_utf8("Code").unwrap();
        let mut asm = CodeAssembler::new();
        asm.op(Opcode::Iload0).op(Opcode::Iload1).op(Opcode::Iadd).op(Opcode::Ireturn);
        let code = asm.finish(code_name, 2, 2).unwrap();
        builder
            .method(access::PUBLIC | access::STATIC, "add", "(II)I", Some(code))
            .unwrap();
        builder.build()
    }

    fn native_stub(file: &mut ClassFile, name: &str, desc: &str) -> MethodInfo {
        MethodInfo {
            access_flags: access::PRIVATE | access::NATIVE,
            name_index: file.pool.intern_utf8(name).unwrap(),
            descriptor_index: file.pool.intern_utf8(desc).unwrap(),
            attributes: vec![],
        }
    }

    #[test]
    fn test_lookup() {
        let mut index = ProgramIndex::new();
        let entry = ClassEntry::new(sample_class("Calc"), "Calc.class".into(), Provenance::Program).unwrap();
        let id = index.insert(entry).unwrap();

        assert_eq!(index.lookup_class("Calc").unwrap(), id);
        let m = index.lookup_method("Calc", "add", "(II)I").unwrap();
        assert_eq!(index.method(m).instructions.len(), 4);
        assert!(matches!(index.lookup_class("Nope"), Err(IndexError::ClassNotFound(_))));
        assert!(matches!(
            index.lookup_method("Calc", "add", "(JJ)J"),
            Err(IndexError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_add_method_refreshes_lookup() {
        let mut index = ProgramIndex::new();
        let entry = ClassEntry::new(sample_class("Calc"), "Calc.class".into(), Provenance::Program).unwrap();
        let id = index.insert(entry).unwrap();
        assert!(!index.class(id).is_modified());

        let info = {
            let file = index.file_mut(id).unwrap();
            native_stub(file, "stub", "(II)I")
        };
        let added = index.add_method(id, info).unwrap();
        assert_eq!(index.lookup_method("Calc", "stub", "(II)I").unwrap(), added);
        assert!(index.class(id).is_modified());

        let dup = {
            let file = index.file_mut(id).unwrap();
            native_stub(file, "add", "(II)I")
        };
        assert!(matches!(index.add_method(id, dup), Err(IndexError::DuplicateMethod { .. })));
    }

    #[test]
    fn test_library_classes_are_read_only() {
        let mut index = ProgramIndex::new();
        let entry = ClassEntry::new(sample_class("lib/Util"), "lib/Util.class".into(), Provenance::Library).unwrap();
        let id = index.insert(entry).unwrap();
        assert!(matches!(index.file_mut(id), Err(IndexError::ReadOnly(_))));
        assert_eq!(index.modified_classes().count(), 0);
    }

    #[test]
    fn test_duplicate_class() {
        let mut index = ProgramIndex::new();
        index
            .insert(ClassEntry::new(sample_class("A"), "A.class".into(), Provenance::Program).unwrap())
            .unwrap();
        let again = ClassEntry::new(sample_class("A"), "A.class".into(), Provenance::Program).unwrap();
        assert!(matches!(index.insert(again), Err(IndexError::DuplicateClass(_))));
    }

    #[test]
    fn test_synthetic_class_is_modified() {
        let mut index = ProgramIndex::new();
        let id = index.add_class(sample_class("gen/Loader")).unwrap();
        assert!(index.class(id).is_modified());
        assert_eq!(index.class(id).entry_name, "gen/Loader.class");
    }
}
