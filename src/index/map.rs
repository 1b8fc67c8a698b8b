//! Hash-keyed map index
//!
//! Values are stored under caller-supplied string keys, hashed into the
//! `u64` space (see `key::hash_key`). Listing walks pages by page id and
//! each page in insertion order, which is hash order overall, not string
//! order.

use std::sync::Arc;

use crate::error::Result;
use crate::page::MapPage;
use crate::result::QueryResult;
use crate::selector::Selector;
use crate::storage::StorageDriver;

use super::PagedIndex;

/// Index of values keyed by strings
pub struct MapIndex {
    inner: PagedIndex<MapPage>,
}

impl MapIndex {
    /// Handle on an existing map index namespace.
    ///
    /// `page_size` is the width of the hashed key range per page.
    pub fn new(
        name: impl Into<String>,
        driver: Arc<dyn StorageDriver>,
        page_size: u64,
    ) -> Result<Self> {
        Ok(Self {
            inner: PagedIndex::new(name, driver, page_size)?,
        })
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn page_size(&self) -> u64 {
        self.inner.page_size()
    }

    pub fn query<S: Selector<Key = Result<u64>>>(&self, selector: S) -> Result<QueryResult> {
        self.inner
            .query(selector, |page, key| page.query(key).map(str::to_string))
    }

    /// Strict insert of `value` under every selected key.
    ///
    /// Fails with `KeyAlreadyExists` (or `Empty` in a batch) for keys that
    /// are already present.
    pub fn insert<S: Selector<Key = Result<u64>>>(
        &self,
        selector: S,
        value: &str,
    ) -> Result<QueryResult> {
        self.inner.mutate(selector, true, |page, key| {
            page.add(key, value)?;
            Ok(value.to_string())
        })
    }

    /// Strict update: every selected key must already exist
    pub fn update<S: Selector<Key = Result<u64>>>(
        &self,
        selector: S,
        value: &str,
    ) -> Result<QueryResult> {
        self.inner.mutate(selector, false, |page, key| {
            page.overwrite(key, value)?;
            Ok(value.to_string())
        })
    }

    /// Insert or replace, creating the target page when needed
    pub fn upsert<S: Selector<Key = Result<u64>>>(
        &self,
        selector: S,
        value: &str,
    ) -> Result<QueryResult> {
        self.inner.mutate(selector, true, |page, key| {
            page.upsert(key, value);
            Ok(value.to_string())
        })
    }

    /// Remove every selected key. Reports the removed value per key.
    pub fn delete<S: Selector<Key = Result<u64>>>(&self, selector: S) -> Result<QueryResult> {
        self.inner.mutate(selector, false, |page, key| page.delete(key))
    }

    pub fn list(&self, limit: usize, offset: usize, descending: bool) -> Result<QueryResult> {
        self.inner.list(limit, offset, descending)
    }

    pub fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

impl std::fmt::Debug for MapIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapIndex")
            .field("name", &self.name())
            .field("page_size", &self.page_size())
            .finish()
    }
}
