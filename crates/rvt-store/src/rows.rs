use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreResult;

/// Opaque persistent key-value collaborator.
///
/// Committed state is written as bincode rows under string keys. The store
/// never interprets row contents.
pub trait RowStore: Send + Sync {
    /// Write a row, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Read a row. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Delete a row. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All keys, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// In-memory, `HashMap`-based row store for tests and embedding.
pub struct InMemoryRowStore {
    rows: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all rows.
    pub fn total_bytes(&self) -> usize {
        self.rows
            .read()
            .expect("lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl Default for InMemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStore for InMemoryRowStore {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut map = self.rows.write().expect("lock poisoned");
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.rows.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.rows.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        let map = self.rows.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let map = self.rows.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for InMemoryRowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRowStore")
            .field("row_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let rows = InMemoryRowStore::new();
        assert!(rows.is_empty());
        rows.put("nodes", b"abc").unwrap();
        assert_eq!(rows.get("nodes").unwrap(), Some(b"abc".to_vec()));
        assert!(rows.contains("nodes").unwrap());

        rows.put("nodes", b"abcd").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.total_bytes(), 4);

        assert!(rows.delete("nodes").unwrap());
        assert!(!rows.delete("nodes").unwrap());
        assert_eq!(rows.get("nodes").unwrap(), None);
    }

    #[test]
    fn keys_are_sorted() {
        let rows = InMemoryRowStore::new();
        rows.put("b", b"").unwrap();
        rows.put("a", b"").unwrap();
        rows.put("c", b"").unwrap();
        assert_eq!(rows.keys().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn works_as_trait_object() {
        let rows: Box<dyn RowStore> = Box::new(InMemoryRowStore::default());
        rows.put("k", b"v").unwrap();
        assert!(rows.contains("k").unwrap());
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let rows = Arc::new(InMemoryRowStore::new());
        rows.put("shared", b"data").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rows = Arc::clone(&rows);
                thread::spawn(move || {
                    assert_eq!(rows.get("shared").unwrap(), Some(b"data".to_vec()));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
