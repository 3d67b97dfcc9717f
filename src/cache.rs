// ==============================================================================
// cache.rs - Bounded Query Cache
// ==============================================================================
// Description: LRU cache for store queries keyed by a query fingerprint
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use tracing::debug;

/// SHA-256 of (collection, query parameters)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    pub fn new(collection: &str, params: &[(&str, &str)]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        for (key, value) in params {
            // Length prefixes keep ("ab","c") and ("a","bc") apart
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct CacheEntry<V> {
    collection: String,
    value: V,
}

/// Bounded, explicitly invalidated query cache
pub struct QueryCache<V> {
    entries: LruCache<QueryFingerprint, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &QueryFingerprint) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, collection: &str, key: QueryFingerprint, value: V) {
        self.entries.put(
            key,
            CacheEntry {
                collection: collection.to_string(),
                value,
            },
        );
    }

    /// Drop every cached query against a collection (after it was mutated)
    pub fn invalidate_collection(&mut self, collection: &str) -> usize {
        let stale: Vec<QueryFingerprint> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.collection == collection)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.entries.pop(key);
        }

        debug!("Invalidated {} cached queries for {}", stale.len(), collection);
        stale.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_distinguishes_params() {
        let a = QueryFingerprint::new("mRNA", &[("name", "TP53")]);
        let b = QueryFingerprint::new("mRNA", &[("name", "TP53")]);
        let c = QueryFingerprint::new("miRNA", &[("name", "TP53")]);
        let d = QueryFingerprint::new("mRNA", &[("nam", "eTP53")]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_bounded_lru_eviction() {
        let mut cache: QueryCache<u32> = QueryCache::new(2);
        let k1 = QueryFingerprint::new("c", &[("name", "1")]);
        let k2 = QueryFingerprint::new("c", &[("name", "2")]);
        let k3 = QueryFingerprint::new("c", &[("name", "3")]);

        cache.insert("c", k1.clone(), 1);
        cache.insert("c", k2.clone(), 2);
        assert_eq!(cache.get(&k1), Some(1));
        cache.insert("c", k3.clone(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&k2), None);
        assert_eq!(cache.get(&k1), Some(1));
        assert_eq!(cache.get(&k3), Some(3));
        assert_eq!(cache.stats(), (3, 1));
    }

    #[test]
    fn test_invalidate_collection() {
        let mut cache: QueryCache<&'static str> = QueryCache::new(8);
        cache.insert("mRNA", QueryFingerprint::new("mRNA", &[("op", "names")]), "a");
        cache.insert("mRNA", QueryFingerprint::new("mRNA", &[("name", "TP53")]), "b");
        cache.insert("DNAm", QueryFingerprint::new("DNAm", &[("op", "names")]), "c");

        assert_eq!(cache.invalidate_collection("mRNA"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&QueryFingerprint::new("DNAm", &[("op", "names")])), Some("c"));
    }
}
