//! L1 Cache Module
//!
//! Process-local fast path in front of the router's backend. Entries carry
//! no expiration: once populated they are served until this process
//! overwrites, forgets or flushes them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

// == L1 Cache ==
#[derive(Debug, Default)]
pub struct L1Cache {
    entries: Mutex<HashMap<String, Value>>,
}

impl L1Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A panic mid-insert leaves the map usable
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let l1 = L1Cache::new();
        l1.insert("a", json!(1));

        assert_eq!(l1.get("a"), Some(json!(1)));
        assert_eq!(l1.get("b"), None);
    }

    #[test]
    fn test_overwrite_remove_clear() {
        let l1 = L1Cache::new();
        l1.insert("a", json!(1));
        l1.insert("a", json!(2));
        l1.insert("b", json!(3));
        assert_eq!(l1.get("a"), Some(json!(2)));
        assert_eq!(l1.len(), 2);

        l1.remove("a");
        assert_eq!(l1.get("a"), None);

        l1.clear();
        assert!(l1.is_empty());
    }
}
