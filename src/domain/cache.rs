//! Keyed memo cache for per-run computations.
//!
//! Scoped to a single engine instance rather than process-global, so two
//! runs in one process never share state. Interior mutability keeps the
//! engine's public methods `&self`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct Cache<K, V> {
    entries: RefCell<HashMap<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Cache {
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, computing and storing it on a
    /// miss. `compute` must not re-enter the same cache.
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.entries.borrow().get(&key) {
            return value.clone();
        }
        let value = compute();
        self.entries
            .borrow_mut()
            .insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Cache::new()
    }
}
