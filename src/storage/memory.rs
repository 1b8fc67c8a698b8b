//! In-memory storage driver
//!
//! Keeps pages as plain values behind a `parking_lot::RwLock`. Intended for
//! tests and ephemeral indexes. Every call is atomic within the process, so
//! the advisory lock primitives are no-ops.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::config::LockSettings;
use crate::error::{PageKvError, Result};
use crate::page::PageData;

use super::{validate_index_name, IndexKind, LockStatus, StorageDriver};

struct Namespace {
    kind: IndexKind,
    pages: BTreeMap<u64, PageData>,
}

/// Process-local storage driver
pub struct MemoryDriver {
    namespaces: RwLock<HashMap<String, Namespace>>,
    lock_settings: LockSettings,
}

impl MemoryDriver {
    pub fn new(lock_settings: LockSettings) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            lock_settings,
        }
    }

    fn read(&self, page_id: u64, index_name: &str) -> Result<PageData> {
        let namespaces = self.namespaces.read();
        let namespace = namespaces
            .get(index_name)
            .ok_or_else(|| PageKvError::not_exist(format!("index '{}'", index_name)))?;
        namespace.pages.get(&page_id).cloned().ok_or_else(|| {
            PageKvError::not_exist(format!("page {} of index '{}'", page_id, index_name))
        })
    }

    fn write(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write();
        let namespace = namespaces
            .get_mut(index_name)
            .ok_or_else(|| PageKvError::not_exist(format!("index '{}'", index_name)))?;
        namespace.pages.insert(page_id, page.clone());
        Ok(())
    }

    fn create(&self, index_name: &str, kind: IndexKind) -> Result<()> {
        validate_index_name(index_name)?;
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(index_name) {
            return Err(PageKvError::KeyAlreadyExists(format!("index '{}'", index_name)));
        }
        namespaces.insert(
            index_name.to_string(),
            Namespace {
                kind,
                pages: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn drop_namespace(&self, index_name: &str, kind: IndexKind) -> Result<()> {
        let mut namespaces = self.namespaces.write();
        match namespaces.get(index_name) {
            Some(namespace) if namespace.kind == kind => {
                namespaces.remove(index_name);
                Ok(())
            }
            _ => Err(PageKvError::not_exist(format!(
                "{} index '{}'",
                kind, index_name
            ))),
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(crate::config::Config::default().memory_lock)
    }
}

impl StorageDriver for MemoryDriver {
    fn read_page(&self, page_id: u64, index_name: &str, _size_hint: usize) -> Result<PageData> {
        self.read(page_id, index_name)
    }

    fn write_page(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()> {
        self.write(page, page_id, index_name)
    }

    fn read_map_page(
        &self,
        page_id: u64,
        index_name: &str,
        _size_hint: usize,
    ) -> Result<PageData> {
        self.read(page_id, index_name)
    }

    fn write_map_page(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()> {
        self.write(page, page_id, index_name)
    }

    fn list_pages(&self, index_name: &str, descending: bool) -> Result<Vec<u64>> {
        let namespaces = self.namespaces.read();
        let namespace = namespaces
            .get(index_name)
            .ok_or_else(|| PageKvError::not_exist(format!("index '{}'", index_name)))?;
        let mut ids: Vec<u64> = namespace.pages.keys().copied().collect();
        if descending {
            ids.reverse();
        }
        Ok(ids)
    }

    fn create_auto_index(&self, index_name: &str) -> Result<()> {
        self.create(index_name, IndexKind::Auto)
    }

    fn create_map_index(&self, index_name: &str) -> Result<()> {
        self.create(index_name, IndexKind::Map)
    }

    fn drop_auto_index(&self, index_name: &str) -> Result<()> {
        self.drop_namespace(index_name, IndexKind::Auto)
    }

    fn drop_map_index(&self, index_name: &str) -> Result<()> {
        self.drop_namespace(index_name, IndexKind::Map)
    }

    fn index_kind(&self, index_name: &str) -> Result<IndexKind> {
        self.namespaces
            .read()
            .get(index_name)
            .map(|namespace| namespace.kind)
            .ok_or_else(|| PageKvError::not_exist(format!("index '{}'", index_name)))
    }

    fn index_is_locked(&self, _index_name: &str) -> Result<LockStatus> {
        Ok(LockStatus::UNLOCKED)
    }

    fn lock_index(&self, _index_name: &str) -> Result<Option<u64>> {
        Ok(Some(super::expiry_after(self.lock_settings.duration)))
    }

    fn release_lock(&self, _index_name: &str, _expires_at_ms: u64) -> Result<()> {
        Ok(())
    }

    fn unlock_index(&self, _index_name: &str) -> Result<()> {
        Ok(())
    }

    fn lock_settings(&self) -> LockSettings {
        self.lock_settings
    }
}
