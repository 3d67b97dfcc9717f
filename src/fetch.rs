// ==============================================================================
// fetch.rs - Cached Store Reads
// ==============================================================================
// Description: Read-side access to collections through the bounded query cache
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::sync::Arc;

use crate::cache::{QueryCache, QueryFingerprint};
use crate::error::Result;
use crate::store::{DocumentStore, StoreField};

#[derive(Clone)]
enum CachedQuery {
    Names(Arc<Vec<String>>),
    Values(Arc<Vec<f64>>),
}

/// Shared data-fetch capability for the variance builder and report steps
pub struct DataFetcher<'a> {
    store: &'a dyn DocumentStore,
    cache: QueryCache<CachedQuery>,
}

impl<'a> DataFetcher<'a> {
    pub fn new(store: &'a dyn DocumentStore, cache_capacity: usize) -> Self {
        Self {
            store,
            cache: QueryCache::new(cache_capacity),
        }
    }

    /// Sorted distinct feature names of a collection
    pub fn names(&mut self, collection: &str) -> Result<Arc<Vec<String>>> {
        let key = QueryFingerprint::new(collection, &[("distinct", StoreField::Name.column())]);
        if let Some(CachedQuery::Names(names)) = self.cache.get(&key) {
            return Ok(names);
        }

        let names = Arc::new(self.store.distinct(collection, StoreField::Name)?);
        self.cache
            .insert(collection, key, CachedQuery::Names(Arc::clone(&names)));
        Ok(names)
    }

    /// Non-null stored values of one feature
    pub fn values(&mut self, collection: &str, name: &str) -> Result<Arc<Vec<f64>>> {
        let key = QueryFingerprint::new(collection, &[("name", name)]);
        if let Some(CachedQuery::Values(values)) = self.cache.get(&key) {
            return Ok(values);
        }

        let values: Vec<f64> = self
            .store
            .find_values(collection, name)?
            .into_iter()
            .flatten()
            .collect();
        let values = Arc::new(values);
        self.cache
            .insert(collection, key, CachedQuery::Values(Arc::clone(&values)));
        Ok(values)
    }

    /// Forget cached reads of a collection after it changed
    pub fn invalidate(&mut self, collection: &str) {
        self.cache.invalidate_collection(collection);
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }
}
