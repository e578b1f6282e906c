// SPDX-License-Identifier: AGPL-3.0

//! Memo tables owned by the engine.
//!
//! Values are immutable once inserted. Two callers racing on the same key may both
//! compute the value; the first insert wins and both get the same `Arc`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
pub struct Cache<K, T> {
    entries: RwLock<HashMap<K, Arc<T>>>,
}

impl<K: Eq + Hash, T> Cache<K, T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Cached value for `key`, computing and storing it on a miss. Errors are not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = Arc::new(compute()?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.entry(key).or_insert(value).clone())
    }

    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> T) -> Arc<T> {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = Arc::new(compute());
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key).or_insert(value).clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<K: Eq + Hash, T> Default for Cache<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_computes_once() {
        let cache: Cache<u64, String> = Cache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>("value".to_string())
        };

        let first = cache.get_or_try_insert_with(1, compute).unwrap();
        let second = cache
            .get_or_try_insert_with(1, || Ok::<_, ()>("other".to_string()))
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "value");
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: Cache<u64, u32> = Cache::new();
        assert_eq!(cache.get_or_try_insert_with(7, || Err("boom")), Err("boom"));
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_try_insert_with(7, || Ok::<_, &str>(3)).unwrap(), 3);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.get(&7).is_none());
    }
}
