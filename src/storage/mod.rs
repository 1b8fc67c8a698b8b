//! Storage Module
//!
//! Pluggable durable storage for index pages.
//!
//! ## Responsibilities
//! - Read, write and enumerate the pages of an index namespace
//! - Create and drop whole namespaces
//! - Provide advisory lock primitives for the lock coordinator
//!
//! ## Backends
//! ```text
//! ┌───────────────┬──────────────────────────────────────────────┐
//! │ MemoryDriver  │ maps in process memory, locking is a no-op   │
//! │ FsDriver      │ {root}/{index}/{page_id}{suffix}             │
//! │ ObjectDriver  │ {prefix}/{index}/{page_id}{suffix} objects   │
//! └───────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Index names are unique across both flavors. Each namespace records its
//! kind at creation so that an auto index cannot be opened as a map index.
//!
//! Drivers are constructed once and shared as `Arc<dyn StorageDriver>`.

mod fs;
mod memory;
mod object;
#[cfg(feature = "s3")]
mod s3;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::LockSettings;
use crate::error::Result;
use crate::page::PageData;

pub use fs::FsDriver;
pub use memory::MemoryDriver;
pub use object::{MemoryObjectClient, ObjectClient, ObjectDriver};
#[cfg(feature = "s3")]
pub use s3::S3ObjectClient;

/// The two index flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Auto,
    Map,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Auto => "auto",
            IndexKind::Map => "map",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "auto" => Some(IndexKind::Auto),
            "map" => Some(IndexKind::Map),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock state of an index namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,

    /// Latest unexpired expiry (epoch millis), 0 when unlocked
    pub expires_at_ms: u64,
}

impl LockStatus {
    pub const UNLOCKED: LockStatus = LockStatus {
        locked: false,
        expires_at_ms: 0,
    };
}

/// Durable page storage plus advisory locking
///
/// Page ids are passed as integers; drivers add their configured suffix when
/// naming files or objects.
pub trait StorageDriver: Send + Sync {
    // -------------------------------------------------------------------------
    // Page I/O
    // -------------------------------------------------------------------------
    /// Read an auto index page. `size_hint` presizes the page's collections.
    fn read_page(&self, page_id: u64, index_name: &str, size_hint: usize) -> Result<PageData>;

    fn write_page(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()>;

    fn read_map_page(&self, page_id: u64, index_name: &str, size_hint: usize)
        -> Result<PageData>;

    fn write_map_page(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()>;

    /// Page ids present in the namespace, numerically sorted
    fn list_pages(&self, index_name: &str, descending: bool) -> Result<Vec<u64>>;

    // -------------------------------------------------------------------------
    // Namespace Lifecycle
    // -------------------------------------------------------------------------
    fn create_auto_index(&self, index_name: &str) -> Result<()>;

    fn create_map_index(&self, index_name: &str) -> Result<()>;

    fn drop_auto_index(&self, index_name: &str) -> Result<()>;

    fn drop_map_index(&self, index_name: &str) -> Result<()>;

    /// Kind recorded when the namespace was created. `NotExist` if absent.
    fn index_kind(&self, index_name: &str) -> Result<IndexKind>;

    // -------------------------------------------------------------------------
    // Advisory Locking
    // -------------------------------------------------------------------------
    fn index_is_locked(&self, index_name: &str) -> Result<LockStatus>;

    /// Try to place a lock marker.
    ///
    /// Returns the marker's expiry on success, or `None` when another
    /// caller's unexpired marker appeared concurrently and this attempt
    /// backed off.
    fn lock_index(&self, index_name: &str) -> Result<Option<u64>>;

    /// Remove only the marker placed by a `lock_index` call returning
    /// `expires_at_ms`.
    fn release_lock(&self, index_name: &str, expires_at_ms: u64) -> Result<()>;

    /// Remove every lock marker in the namespace
    fn unlock_index(&self, index_name: &str) -> Result<()>;

    /// Lock timing configured for this backend
    fn lock_settings(&self) -> LockSettings;
}

/// Reject index names that cannot be used as a single path or key segment
pub(crate) fn validate_index_name(index_name: &str) -> Result<()> {
    let bad = index_name.is_empty()
        || index_name == "."
        || index_name == ".."
        || index_name.starts_with('.')
        || index_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(crate::PageKvError::InvalidKey(format!(
            "invalid index name {:?}",
            index_name
        )));
    }
    Ok(())
}

/// Current wall-clock time in epoch millis
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn expiry_after(duration: Duration) -> u64 {
    now_millis() + duration.as_millis() as u64
}

/// Naming for page and lock marker entries inside a namespace
#[derive(Debug, Clone)]
pub(crate) struct EntryNames {
    page_suffix: String,
    lock_suffix: String,
}

/// A namespace entry classified by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    Page(u64),
    Lock(u64),
    /// Ends in the page suffix but has no numeric root
    Corrupt,
    Other,
}

impl EntryNames {
    pub(crate) fn new(page_suffix: impl Into<String>, lock_suffix: impl Into<String>) -> Self {
        Self {
            page_suffix: page_suffix.into(),
            lock_suffix: lock_suffix.into(),
        }
    }

    /// `"{page_id}{page_suffix}"`
    pub(crate) fn page(&self, page_id: u64) -> String {
        format!("{}{}", page_id, self.page_suffix)
    }

    /// `"{expiry_ms}{page_suffix}{lock_suffix}"`
    pub(crate) fn lock(&self, expires_at_ms: u64) -> String {
        format!("{}{}{}", expires_at_ms, self.page_suffix, self.lock_suffix)
    }

    pub(crate) fn classify(&self, name: &str) -> Entry {
        let lock_tail = format!("{}{}", self.page_suffix, self.lock_suffix);
        if let Some(root) = name.strip_suffix(&lock_tail) {
            return match root.parse() {
                Ok(expiry) => Entry::Lock(expiry),
                Err(_) => Entry::Other,
            };
        }
        if let Some(root) = name.strip_suffix(&self.page_suffix) {
            return match root.parse() {
                Ok(page_id) => Entry::Page(page_id),
                Err(_) => Entry::Corrupt,
            };
        }
        Entry::Other
    }
}

/// Collect page ids from entry names, warning about corrupt ones
pub(crate) fn collect_page_ids<'a>(
    names: &EntryNames,
    index_name: &str,
    entries: impl IntoIterator<Item = &'a str>,
    descending: bool,
) -> Vec<u64> {
    let mut ids: Vec<u64> = entries
        .into_iter()
        .filter_map(|name| match names.classify(name) {
            Entry::Page(id) => Some(id),
            Entry::Corrupt => {
                tracing::warn!(index = index_name, entry = name, "skipping page with non-numeric name");
                None
            }
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    if descending {
        ids.reverse();
    }
    ids
}

/// Fold lock marker expiries into a status, ignoring expired ones
pub(crate) fn lock_status(expiries: impl IntoIterator<Item = u64>) -> LockStatus {
    let now = now_millis();
    expiries
        .into_iter()
        .filter(|expiry| *expiry > now)
        .max()
        .map(|expires_at_ms| LockStatus {
            locked: true,
            expires_at_ms,
        })
        .unwrap_or(LockStatus::UNLOCKED)
}
