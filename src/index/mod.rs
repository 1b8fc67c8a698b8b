//! Index Module
//!
//! The two index flavors built on top of pages, drivers and locks.
//!
//! ## Responsibilities
//! - Resolve each selected key to its page and load pages once per run
//! - Serialize mutations per namespace with the advisory lock
//! - Apply partial-failure semantics to multi-key operations
//!
//! ## Batching
//! Consecutive keys that fall into the same page share one page load and,
//! for mutations, one page write:
//!
//! ```text
//! keys:   3   5   8 │ 12  14 │ 7
//! pages:  0   0   0 │  1   1 │ 0
//!         └─ load, apply ×3, write ─┘ └ load, apply ×2, write ┘ └ load ...
//! ```
//!
//! A page revisited later in the selector is loaded again. No ordering is
//! imposed on the selector; a write happens whenever the page id changes.

mod auto;
mod map;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{PageKvError, Result};
use crate::lock::{IndexLock, LockCoordinator};
use crate::page::{page_id, MapPage, Page, PageData};
use crate::result::QueryResult;
use crate::selector::{SelectedKey, Selector};
use crate::storage::StorageDriver;

pub use auto::AutoIndex;
pub use map::MapIndex;

/// Upper bound for the capacity hint passed to drivers
const MAX_SIZE_HINT: usize = 4096;

/// A page type the generic index core can load and store
pub(crate) trait StoredPage: Sized {
    fn load(
        driver: &dyn StorageDriver,
        page_id: u64,
        page_size: u64,
        index_name: &str,
    ) -> Result<Self>;

    fn store(&self, driver: &dyn StorageDriver, page_id: u64, index_name: &str) -> Result<()>;

    /// A page that does not exist yet
    fn fresh(page_id: u64, page_size: u64) -> Self;

    fn data(&self) -> &PageData;
}

impl StoredPage for Page {
    fn load(
        driver: &dyn StorageDriver,
        page_id: u64,
        page_size: u64,
        index_name: &str,
    ) -> Result<Self> {
        let data = driver.read_page(page_id, index_name, size_hint(page_size))?;
        let mut page = Page::from_data(data);
        // Ids below the page's range were never valid here
        page.set_minimum_key(page_id.saturating_mul(page_size));
        Ok(page)
    }

    fn store(&self, driver: &dyn StorageDriver, page_id: u64, index_name: &str) -> Result<()> {
        driver.write_page(self.data(), page_id, index_name)
    }

    fn fresh(page_id: u64, page_size: u64) -> Self {
        let mut page = Page::new();
        page.set_minimum_key(page_id.saturating_mul(page_size));
        page
    }

    fn data(&self) -> &PageData {
        Page::data(self)
    }
}

impl StoredPage for MapPage {
    fn load(
        driver: &dyn StorageDriver,
        page_id: u64,
        _page_size: u64,
        index_name: &str,
    ) -> Result<Self> {
        let data = driver.read_map_page(page_id, index_name, 64)?;
        Ok(MapPage::from_data(data))
    }

    fn store(&self, driver: &dyn StorageDriver, page_id: u64, index_name: &str) -> Result<()> {
        driver.write_map_page(self.data(), page_id, index_name)
    }

    fn fresh(_page_id: u64, _page_size: u64) -> Self {
        MapPage::new()
    }

    fn data(&self) -> &PageData {
        MapPage::data(self)
    }
}

fn size_hint(page_size: u64) -> usize {
    usize::try_from(page_size)
        .unwrap_or(MAX_SIZE_HINT)
        .min(MAX_SIZE_HINT)
}

/// The page currently open during a batched mutation
struct Run<P> {
    page_id: u64,
    /// None when the page could not be opened; its keys fail individually
    page: Option<P>,
    dirty: bool,
}

/// Shared machinery of both index flavors
pub(crate) struct PagedIndex<P> {
    name: String,
    driver: Arc<dyn StorageDriver>,
    page_size: u64,
    locks: LockCoordinator,
    _page: PhantomData<fn() -> P>,
}

impl<P: StoredPage> PagedIndex<P> {
    pub(crate) fn new(
        name: impl Into<String>,
        driver: Arc<dyn StorageDriver>,
        page_size: u64,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(PageKvError::Config("page size must be greater than zero".to_string()));
        }
        let locks = LockCoordinator::new(driver.lock_settings());
        Ok(Self {
            name: name.into(),
            driver,
            page_size,
            locks,
            _page: PhantomData,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn page_size(&self) -> u64 {
        self.page_size
    }

    pub(crate) fn driver(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }

    pub(crate) fn page_of(&self, key: u64) -> u64 {
        page_id(key, self.page_size)
    }

    pub(crate) fn load(&self, page_id: u64) -> Result<P> {
        P::load(self.driver(), page_id, self.page_size, &self.name)
    }

    /// Load a page, or start a fresh one if it does not exist yet
    pub(crate) fn load_or_fresh(&self, page_id: u64) -> Result<P> {
        match self.load(page_id) {
            Err(PageKvError::NotExist(_)) => Ok(P::fresh(page_id, self.page_size)),
            other => other,
        }
    }

    pub(crate) fn store(&self, page: &P, page_id: u64) -> Result<()> {
        page.store(self.driver(), page_id, &self.name)
    }

    pub(crate) fn lock(&self) -> Result<IndexLock> {
        self.locks.acquire(&self.driver, &self.name)
    }

    /// Look up every selected key.
    ///
    /// A single selection propagates its error; a multi selection records
    /// `Empty` for each failed key. An empty selection yields an empty
    /// `Collection`.
    pub(crate) fn query<S>(
        &self,
        mut selector: S,
        lookup: impl Fn(&P, u64) -> Result<String>,
    ) -> Result<QueryResult>
    where
        S: Selector,
        S::Key: SelectedKey,
    {
        if selector.is_empty() {
            return Ok(QueryResult::Collection(Vec::new()));
        }
        let strict = !selector.is_multi();
        let mut results = Vec::with_capacity(selector.len().min(MAX_SIZE_HINT));
        let mut cached: Option<(u64, Option<P>)> = None;

        while selector.next() {
            let key = match selector.select().into_key() {
                Ok(key) => key,
                Err(e) if strict => return Err(e),
                Err(e) => {
                    self.note_key_failure(None, &e);
                    results.push(QueryResult::Empty);
                    continue;
                }
            };

            let page_id = self.page_of(key);
            if cached.as_ref().map(|(id, _)| *id) != Some(page_id) {
                let page = match self.load(page_id) {
                    Ok(page) => Some(page),
                    Err(e) if strict => return Err(e),
                    Err(e) => {
                        self.note_key_failure(Some(key), &e);
                        None
                    }
                };
                cached = Some((page_id, page));
            }

            let page = cached.as_ref().and_then(|(_, page)| page.as_ref());
            match page.map(|page| lookup(page, key)) {
                Some(Ok(value)) => results.push(QueryResult::Single(value)),
                Some(Err(e)) if strict => return Err(e),
                Some(Err(e)) => {
                    self.note_key_failure(Some(key), &e);
                    results.push(QueryResult::Empty);
                }
                None => results.push(QueryResult::Empty),
            }
        }

        Ok(finish(results, strict))
    }

    /// Apply `apply` to every selected key under the index lock.
    ///
    /// Pages are written whenever the page id changes and once more at the
    /// end. With `create_missing`, a page that does not exist yet is started
    /// fresh instead of failing its keys.
    pub(crate) fn mutate<S>(
        &self,
        mut selector: S,
        create_missing: bool,
        mut apply: impl FnMut(&mut P, u64) -> Result<String>,
    ) -> Result<QueryResult>
    where
        S: Selector,
        S::Key: SelectedKey,
    {
        // Nothing to write: skip the lock entirely
        if selector.is_empty() {
            return Ok(QueryResult::Collection(Vec::new()));
        }
        let lock = self.lock()?;
        let strict = !selector.is_multi();
        let mut results = Vec::with_capacity(selector.len().min(MAX_SIZE_HINT));
        let mut run: Option<Run<P>> = None;

        while selector.next() {
            let key = match selector.select().into_key() {
                Ok(key) => key,
                Err(e) if strict => return Err(e),
                Err(e) => {
                    self.note_key_failure(None, &e);
                    results.push(QueryResult::Empty);
                    continue;
                }
            };

            let page_id = self.page_of(key);
            if run.as_ref().map(|r| r.page_id) != Some(page_id) {
                if let Some(finished) = run.take() {
                    self.flush(finished)?;
                }
                let opened = if create_missing {
                    self.load_or_fresh(page_id)
                } else {
                    self.load(page_id)
                };
                let page = match opened {
                    Ok(page) => Some(page),
                    Err(e) if strict => return Err(e),
                    Err(e) => {
                        self.note_key_failure(Some(key), &e);
                        None
                    }
                };
                run = Some(Run {
                    page_id,
                    page,
                    dirty: false,
                });
            }

            let Some(current) = run.as_mut() else {
                continue;
            };
            let outcome = current.page.as_mut().map(|page| apply(page, key));
            match outcome {
                Some(Ok(reported)) => {
                    current.dirty = true;
                    results.push(QueryResult::Single(reported));
                }
                Some(Err(e)) if strict => return Err(e),
                Some(Err(e)) => {
                    self.note_key_failure(Some(key), &e);
                    results.push(QueryResult::Empty);
                }
                None => results.push(QueryResult::Empty),
            }
        }

        if let Some(finished) = run.take() {
            self.flush(finished)?;
        }
        lock.release()?;
        Ok(finish(results, strict))
    }

    fn flush(&self, run: Run<P>) -> Result<()> {
        match run.page {
            Some(page) if run.dirty => self.store(&page, run.page_id),
            _ => Ok(()),
        }
    }

    /// Values across pages in page order, honoring offset and limit (0 = all)
    pub(crate) fn list(&self, limit: usize, offset: usize, descending: bool) -> Result<QueryResult> {
        let mut skipped = 0;
        let mut out = Vec::new();
        for page_id in self.driver.list_pages(&self.name, descending)? {
            let page = self.load(page_id)?;
            let data = page.data();

            // Whole pages inside the offset are skipped without walking them
            if skipped + data.len() <= offset {
                skipped += data.len();
                continue;
            }
            for value in data.values_in_order(descending) {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                out.push(QueryResult::single(value));
                if limit > 0 && out.len() >= limit {
                    return Ok(QueryResult::Collection(out));
                }
            }
        }
        Ok(QueryResult::Collection(out))
    }

    /// Records across all pages; a full scan
    pub(crate) fn count(&self) -> Result<usize> {
        let mut total = 0;
        for page_id in self.driver.list_pages(&self.name, false)? {
            total += self.load(page_id)?.data().len();
        }
        Ok(total)
    }

    fn note_key_failure(&self, key: Option<u64>, error: &PageKvError) {
        if error.is_key_level() {
            tracing::debug!(index = %self.name, ?key, %error, "batch key failed");
        } else {
            tracing::warn!(index = %self.name, ?key, %error, "batch key failed");
        }
    }
}

fn finish(mut results: Vec<QueryResult>, strict: bool) -> QueryResult {
    if strict {
        results.pop().unwrap_or(QueryResult::Empty)
    } else {
        QueryResult::Collection(results)
    }
}
