//! Auto-increment index
//!
//! Values are stored under dense, monotonically increasing `u64` ids. The
//! highest-numbered page is the only one that grows; once the next id falls
//! past its range a new page is started whose minimum id continues the
//! sequence.
//!
//! Deleting pages out of band is unsupported: id allocation assumes the
//! highest page present is the highest page ever created.

use std::sync::Arc;

use crate::error::Result;
use crate::page::Page;
use crate::result::QueryResult;
use crate::selector::Selector;
use crate::storage::StorageDriver;

use super::{PagedIndex, StoredPage};

/// Index of values keyed by auto-assigned ids
pub struct AutoIndex {
    inner: PagedIndex<Page>,
}

impl AutoIndex {
    /// Handle on an existing auto index namespace.
    ///
    /// `page_size` is the number of ids per page and must match the value
    /// used when the index was populated.
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

    /// Look up the selected ids.
    ///
    /// A multi-key selection yields a `Collection` with `Empty` for every id
    /// that could not be read.
    pub fn query<S: Selector<Key = u64>>(&self, selector: S) -> Result<QueryResult> {
        self.inner
            .query(selector, |page, id| page.query(id).map(str::to_string))
    }

    /// Append `value` under the next id and return that id
    pub fn insert(&self, value: &str) -> Result<u64> {
        let lock = self.inner.lock()?;

        let latest = self
            .inner
            .driver()
            .list_pages(self.name(), true)?
            .first()
            .copied();
        let (mut page_id, mut page) = match latest {
            Some(page_id) => (page_id, self.inner.load(page_id)?),
            None => (0, Page::fresh(0, self.page_size())),
        };

        // Crossing into the next page: continue the sequence there
        let next = page.next_key();
        let next_page_id = self.inner.page_of(next);
        if next_page_id > page_id {
            tracing::debug!(index = self.name(), page_id = next_page_id, first_id = next, "starting new page");
            page = Page::fresh(next_page_id, self.page_size());
            page.set_minimum_key(next);
            page_id = next_page_id;
        }

        let id = page.append(value);
        self.inner.store(&page, page_id)?;
        lock.release()?;
        Ok(id)
    }

    /// Replace the value of every selected id. Reports the new value per id.
    pub fn update<S: Selector<Key = u64>>(&self, selector: S, value: &str) -> Result<QueryResult> {
        self.inner.mutate(selector, false, |page, id| {
            page.overwrite(id, value)?;
            Ok(value.to_string())
        })
    }

    /// Same as `update`: ids are only ever created by `insert`, so there is
    /// nothing to create for a missing id.
    pub fn upsert<S: Selector<Key = u64>>(&self, selector: S, value: &str) -> Result<QueryResult> {
        self.update(selector, value)
    }

    /// Remove every selected id. Reports the removed value per id.
    pub fn delete<S: Selector<Key = u64>>(&self, selector: S) -> Result<QueryResult> {
        self.inner.mutate(selector, false, |page, id| page.delete(id))
    }

    /// Values in insertion order (or its reverse), skipping `offset`
    /// records and returning at most `limit` (0 = no limit)
    pub fn list(&self, limit: usize, offset: usize, descending: bool) -> Result<QueryResult> {
        self.inner.list(limit, offset, descending)
    }

    /// Number of records, counted by scanning every page
    pub fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

impl std::fmt::Debug for AutoIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoIndex")
            .field("name", &self.name())
            .field("page_size", &self.page_size())
            .finish()
    }
}
