use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

/// Key/value store abstraction for disposable read models.
pub trait ReadModelStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn upsert(&self, key: K, value: V);
    /// Returns the removed value, if any.
    fn remove(&self, key: &K) -> Option<V>;
    fn list(&self) -> Vec<V>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Drop every record (rebuild support).
    fn clear(&self);
}

impl<K, V, S> ReadModelStore<K, V> for Arc<S>
where
    S: ReadModelStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) {
        (**self).upsert(key, value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadModelStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadModelStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadModelStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadModelStore<K, V> for InMemoryReadModelStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    fn upsert(&self, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key, value);
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(key)
    }

    fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_and_remove_returns_old_value() {
        let store = InMemoryReadModelStore::new();
        store.upsert(1, "a");
        store.upsert(1, "b");
        assert_eq!(store.get(&1), Some("b"));
        assert_eq!(store.remove(&1), Some("b"));
        assert_eq!(store.remove(&1), None);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = InMemoryReadModelStore::new();
        store.upsert(1, 10);
        store.upsert(2, 20);
        assert_eq!(store.len(), 2);
        store.clear();
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }
}
