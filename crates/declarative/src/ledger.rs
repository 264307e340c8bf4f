//! Tracked state between runs
//!
//! The ledger is an ordered list of `(address, state)` entries. Order is
//! significant: new entries are created in declaration order and pruned in
//! reverse.

use serde::{Deserialize, Serialize};

/// One tracked resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<S> {
    pub address: String,
    pub state: S,
}

/// Ordered collection of tracked resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger<S> {
    #[serde(default = "Vec::new")]
    entries: Vec<Entry<S>>,
}

impl<S> Default for Ledger<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S> Ledger<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&S> {
        self.entries
            .iter()
            .find(|e| e.address == address)
            .map(|e| &e.state)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    /// Replace the state at `address`, or append a new entry
    pub fn upsert(&mut self, address: impl Into<String>, state: S) {
        let address = address.into();
        match self.entries.iter_mut().find(|e| e.address == address) {
            Some(entry) => entry.state = state,
            None => self.entries.push(Entry { address, state }),
        }
    }

    /// Stop tracking `address`, returning its last state
    pub fn remove(&mut self, address: &str) -> Option<S> {
        let index = self.entries.iter().position(|e| e.address == address)?;
        Some(self.entries.remove(index).state)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Entry<S>> {
        self.entries.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.address.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort entries by their position in `order`
    ///
    /// Entries missing from `order` keep their relative order after the
    /// ordered ones.
    pub fn reorder(&mut self, order: &[String]) {
        self.entries.sort_by_key(|e| {
            order
                .iter()
                .position(|a| *a == e.address)
                .unwrap_or(usize::MAX)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ledger() -> Ledger<u32> {
        let mut ledger = Ledger::new();
        ledger.upsert("a.one", 1);
        ledger.upsert("b.two", 2);
        ledger.upsert("c.three", 3);
        ledger
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut ledger = ledger();
        ledger.upsert("a.one", 10);
        assert_eq!(
            ledger.addresses().collect::<Vec<_>>(),
            vec!["a.one", "b.two", "c.three"]
        );
        assert_eq!(ledger.get("a.one"), Some(&10));
    }

    #[test]
    fn test_remove() {
        let mut ledger = ledger();
        assert_eq!(ledger.remove("b.two"), Some(2));
        assert_eq!(ledger.remove("b.two"), None);
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.contains("b.two"));
    }

    #[test]
    fn test_reorder_puts_unknown_last() {
        let mut ledger = ledger();
        ledger.upsert("z.orphan", 9);
        ledger.reorder(&["c.three".to_string(), "a.one".to_string()]);
        assert_eq!(
            ledger.addresses().collect::<Vec<_>>(),
            vec!["c.three", "a.one", "b.two", "z.orphan"]
        );
    }

    #[test]
    fn test_toml_file_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.toml");

        fs::write(&path, toml::to_string(&ledger()).unwrap()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[entries]]"));

        let loaded: Ledger<u32> = toml::from_str(&text).unwrap();
        assert_eq!(loaded, ledger());

        let empty: Ledger<u32> = toml::from_str("").unwrap();
        assert!(empty.is_empty());
    }
}
