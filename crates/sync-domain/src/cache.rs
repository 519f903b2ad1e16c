//! Cache acotada de comparaciones.
//!
//! Desalojo por orden de inserción (el más antiguo primero) al superar la
//! capacidad; un acierto no reordena la entrada.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use sync_core::locks;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

pub(crate) struct BoundedCache<K, V> {
    capacity: usize,
    entries: Mutex<IndexMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity,
               entries: Mutex::new(IndexMap::with_capacity(capacity.min(4096))),
               hits: AtomicU64::new(0),
               misses: AtomicU64::new(0) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let found = locks::lock(&self.entries).get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = locks::lock(&self.entries);
        entries.insert(key, value);
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn clear(&self) {
        locks::lock(&self.entries).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed),
                     misses: self.misses.load(Ordering::Relaxed),
                     size: locks::lock(&self.entries).len(),
                     capacity: self.capacity }
    }
}
