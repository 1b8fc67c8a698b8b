//! Filesystem storage driver
//!
//! One directory per index, one file per page.
//!
//! ## Layout
//! ```text
//! {root}/
//!   └── {index}/
//!         ├── .kind                      ("auto" or "map")
//!         ├── 0.page
//!         ├── 1.page
//!         └── 1718000000123.page.lock    (advisory lock marker)
//! ```
//!
//! ## Page File Format
//! ```text
//! ┌──────────┬────────────┬──────────┬──────────────────────────────┐
//! │Magic (4) │Version (2) │ CRC (4)  │ bincode(PageData)            │
//! │ "PKVP"   │  u16 LE    │ u32 LE   │ values + ordered keys + min  │
//! └──────────┴────────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! Pages are written to a temporary sibling and renamed into place, so a
//! reader sees either the old or the new page body.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::LockSettings;
use crate::error::{PageKvError, Result};
use crate::page::PageData;

use super::{
    collect_page_ids, expiry_after, lock_status, now_millis, validate_index_name, Entry,
    EntryNames, IndexKind, LockStatus, StorageDriver,
};

/// Magic bytes identifying a PageKV page file
const MAGIC: &[u8; 4] = b"PKVP";

/// Current page file format version
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + CRC (4) = 10 bytes
const HEADER_SIZE: usize = 10;

/// Marker file recording the namespace kind
const KIND_FILE: &str = ".kind";

/// Distinguishes temporary files of concurrent writers in one process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed storage driver
pub struct FsDriver {
    root: PathBuf,
    names: EntryNames,
    lock_settings: LockSettings,
}

impl FsDriver {
    /// Open (or create) a store rooted at `root`
    pub fn open(
        root: impl Into<PathBuf>,
        page_suffix: &str,
        lock_suffix: &str,
        lock_settings: LockSettings,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| PageKvError::write(root.display().to_string(), e))?;
        Ok(Self {
            root,
            names: EntryNames::new(page_suffix, lock_suffix),
            lock_settings,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_dir(&self, index_name: &str) -> Result<PathBuf> {
        validate_index_name(index_name)?;
        Ok(self.root.join(index_name))
    }

    fn page_path(&self, index_name: &str, page_id: u64) -> Result<PathBuf> {
        Ok(self.index_dir(index_name)?.join(self.names.page(page_id)))
    }

    /// File names in the namespace directory
    fn entries(&self, index_name: &str) -> Result<Vec<String>> {
        let dir = self.index_dir(index_name)?;
        let context = || format!("index '{}'", index_name);
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| PageKvError::read(context(), e))? {
            let entry = entry.map_err(|e| PageKvError::read(context(), e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn lock_expiries(&self, index_name: &str) -> Result<Vec<u64>> {
        Ok(self
            .entries(index_name)?
            .iter()
            .filter_map(|name| match self.names.classify(name) {
                Entry::Lock(expiry) => Some(expiry),
                _ => None,
            })
            .collect())
    }

    fn read(&self, page_id: u64, index_name: &str) -> Result<PageData> {
        let path = self.page_path(index_name, page_id)?;
        let bytes = fs::read(&path).map_err(|e| PageKvError::read(path.display().to_string(), e))?;
        let page = decode_page(&bytes)
            .map_err(|reason| PageKvError::corrupt(format!("{}: {}", path.display(), reason)))?;
        tracing::debug!(index = index_name, page_id, records = page.len(), "read page");
        Ok(page)
    }

    fn write(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()> {
        let path = self.page_path(index_name, page_id)?;
        let body = encode_page(page)?;

        let tmp_path = path.with_file_name(format!(
            "{}.tmp-{}-{}",
            self.names.page(page_id),
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let context = || path.display().to_string();

        // No fsync here: a page write has to fit inside one lock duration
        let written = File::create(&tmp_path)
            .and_then(|mut file| file.write_all(&body))
            .and_then(|_| fs::rename(&tmp_path, &path));
        if let Err(e) = written {
            discard_tmp(&tmp_path);
            return Err(PageKvError::write(context(), e));
        }

        tracing::debug!(index = index_name, page_id, records = page.len(), "wrote page");
        Ok(())
    }

    fn create(&self, index_name: &str, kind: IndexKind) -> Result<()> {
        let dir = self.index_dir(index_name)?;
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PageKvError::KeyAlreadyExists(format!("index '{}'", index_name)));
            }
            Err(e) => return Err(PageKvError::write(dir.display().to_string(), e)),
        }
        fs::write(dir.join(KIND_FILE), kind.as_str())
            .map_err(|e| PageKvError::write(dir.display().to_string(), e))?;
        tracing::info!(index = index_name, %kind, "created index");
        Ok(())
    }

    fn drop_namespace(&self, index_name: &str, kind: IndexKind) -> Result<()> {
        if self.index_kind(index_name)? != kind {
            return Err(PageKvError::not_exist(format!("{} index '{}'", kind, index_name)));
        }
        let dir = self.index_dir(index_name)?;
        fs::remove_dir_all(&dir).map_err(|e| PageKvError::write(dir.display().to_string(), e))?;
        tracing::info!(index = index_name, %kind, "dropped index");
        Ok(())
    }

    fn remove_marker(&self, index_name: &str, expires_at_ms: u64) -> Result<()> {
        let path = self.index_dir(index_name)?.join(self.names.lock(expires_at_ms));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PageKvError::write(path.display().to_string(), e)),
        }
    }
}

impl StorageDriver for FsDriver {
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
        let entries = self.entries(index_name)?;
        Ok(collect_page_ids(
            &self.names,
            index_name,
            entries.iter().map(String::as_str),
            descending,
        ))
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
        let path = self.index_dir(index_name)?.join(KIND_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| PageKvError::read(format!("index '{}'", index_name), e))?;
        IndexKind::parse(&raw).ok_or_else(|| PageKvError::corrupt(path.display().to_string()))
    }

    fn index_is_locked(&self, index_name: &str) -> Result<LockStatus> {
        Ok(lock_status(self.lock_expiries(index_name)?))
    }

    fn lock_index(&self, index_name: &str) -> Result<Option<u64>> {
        let expiry = expiry_after(self.lock_settings.duration);
        let path = self.index_dir(index_name)?.join(self.names.lock(expiry));

        // create_new keeps two callers from sharing one marker name
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = write!(file, "{}", std::process::id()) {
                    drop(file);
                    self.remove_marker(index_name, expiry)?;
                    return Err(PageKvError::write(path.display().to_string(), e));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(PageKvError::write(path.display().to_string(), e)),
        }

        // Whoever sees a rival marker after placing its own backs off
        let now = now_millis();
        let contended = self
            .lock_expiries(index_name)?
            .into_iter()
            .any(|other| other != expiry && other > now);
        if contended {
            self.remove_marker(index_name, expiry)?;
            return Ok(None);
        }
        Ok(Some(expiry))
    }

    fn release_lock(&self, index_name: &str, expires_at_ms: u64) -> Result<()> {
        self.remove_marker(index_name, expires_at_ms)
    }

    fn unlock_index(&self, index_name: &str) -> Result<()> {
        for expiry in self.lock_expiries(index_name)? {
            self.remove_marker(index_name, expiry)?;
        }
        Ok(())
    }

    fn lock_settings(&self) -> LockSettings {
        self.lock_settings
    }
}

/// Remove a temporary page file left by a failed write
fn discard_tmp(tmp_path: &Path) {
    match fs::remove_file(tmp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %tmp_path.display(), error = %e, "failed to remove temporary page file");
        }
    }
}

// =============================================================================
// Page Codec
// =============================================================================

fn encode_page(page: &PageData) -> Result<Vec<u8>> {
    let payload = bincode::serialize(page)
        .map_err(|e| PageKvError::corrupt(format!("failed to encode page: {}", e)))?;

    let mut body = Vec::with_capacity(HEADER_SIZE + payload.len());
    body.extend_from_slice(MAGIC);
    body.extend_from_slice(&VERSION.to_le_bytes());
    body.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    body.extend_from_slice(&payload);
    Ok(body)
}

fn decode_page(bytes: &[u8]) -> std::result::Result<PageData, String> {
    if bytes.len() < HEADER_SIZE {
        return Err(format!("truncated header ({} bytes)", bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(format!("bad magic {:?}", &bytes[0..4]));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(format!("unsupported page version {}", version));
    }
    let expected = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let payload = &bytes[HEADER_SIZE..];
    if crc32fast::hash(payload) != expected {
        return Err("checksum mismatch".to_string());
    }

    let page: PageData = bincode::deserialize(payload).map_err(|e| e.to_string())?;
    if !page.is_consistent() {
        return Err("value map and ordered keys disagree".to_string());
    }
    Ok(page)
}
