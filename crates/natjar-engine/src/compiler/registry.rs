//! Compiled-method registry
//!
//! Maps each translated method to its native function. The patch-back pass
//! fills in the stub name and exported symbol once they are chosen.

use rustc_hash::FxHashMap;

use crate::index::MethodId;
use crate::ir::FunctionId;

/// A translated method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod {
    pub method: MethodId,
    pub function: FunctionId,
    /// Name of the generated native stub in the owning class
    pub stub_name: Option<String>,
    /// Exported JNI symbol of `function`
    pub symbol: Option<String>,
}

/// Translated methods in compilation order
#[derive(Debug, Default)]
pub struct CompiledRegistry {
    entries: Vec<CompiledMethod>,
    by_method: FxHashMap<MethodId, usize>,
}

impl CompiledRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a translation; re-recording a method replaces its function
    pub fn insert(&mut self, method: MethodId, function: FunctionId) {
        match self.by_method.get(&method) {
            Some(&i) => self.entries[i].function = function,
            None => {
                self.by_method.insert(method, self.entries.len());
                self.entries.push(CompiledMethod {
                    method,
                    function,
                    stub_name: None,
                    symbol: None,
                });
            }
        }
    }

    pub fn get(&self, method: MethodId) -> Option<&CompiledMethod> {
        self.by_method.get(&method).map(|&i| &self.entries[i])
    }

    /// Attach the stub and symbol names chosen during patch-back
    pub fn set_names(&mut self, method: MethodId, stub_name: String, symbol: String) {
        if let Some(&i) = self.by_method.get(&method) {
            let entry = &mut self.entries[i];
            entry.stub_name = Some(stub_name);
            entry.symbol = Some(symbol);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledMethod> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ClassId;

    #[test]
    fn test_insert_and_name() {
        let mut registry = CompiledRegistry::new();
        let m = MethodId {
            class: ClassId(0),
            index: 2,
        };
        registry.insert(m, FunctionId(0));
        registry.insert(m, FunctionId(4));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(m).unwrap().function, FunctionId(4));

        registry.set_names(m, "stub".into(), "Java_A_stub".into());
        let entry = registry.get(m).unwrap();
        assert_eq!(entry.stub_name.as_deref(), Some("stub"));
        assert_eq!(entry.symbol.as_deref(), Some("Java_A_stub"));
    }
}
