//! Remote object store driver
//!
//! Same logical contract as the filesystem driver over a flat key space:
//!
//! ```text
//! {prefix}/{index}/.kind
//! {prefix}/{index}/{page_id}{suffix}
//! {prefix}/{index}/{expiry_ms}{suffix}{lock_suffix}
//! ```
//!
//! ## Page Object Format
//! Newline-delimited records. The first line carries the page's minimum id,
//! every following line is one `key:value` record in insertion order:
//!
//! ```text
//! #min:26
//! 21:first value
//! 24:second\nvalue with an escaped newline
//! ```
//!
//! Values escape `\`, newline and carriage return. Keys are integers, so the
//! first `:` always terminates the key.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::LockSettings;
use crate::error::{PageKvError, Result};
use crate::page::PageData;

use super::{
    collect_page_ids, expiry_after, lock_status, now_millis, validate_index_name, Entry,
    EntryNames, IndexKind, LockStatus, StorageDriver,
};

const KIND_OBJECT: &str = ".kind";
const MIN_KEY_HEADER: &str = "#min:";

/// Minimal blocking object store client
///
/// Implementations map "object missing" to `PageKvError::NotExist`.
pub trait ObjectClient: Send + Sync {
    fn get(&self, key: &str) -> Result<Bytes>;

    fn put(&self, key: &str, body: Bytes) -> Result<()>;

    /// Create the object only if absent. Returns false if it already existed.
    fn put_if_absent(&self, key: &str, body: Bytes) -> Result<bool>;

    /// Delete an object. Deleting a missing object succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Full keys of every object under `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<C: ObjectClient + ?Sized> ObjectClient for Arc<C> {
    fn get(&self, key: &str) -> Result<Bytes> {
        (**self).get(key)
    }

    fn put(&self, key: &str, body: Bytes) -> Result<()> {
        (**self).put(key, body)
    }

    fn put_if_absent(&self, key: &str, body: Bytes) -> Result<bool> {
        (**self).put_if_absent(key, body)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix)
    }
}

/// In-process bucket, for tests and local development
#[derive(Default)]
pub struct MemoryObjectClient {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

impl ObjectClient for MemoryObjectClient {
    fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| PageKvError::not_exist(format!("object '{}'", key)))
    }

    fn put(&self, key: &str, body: Bytes) -> Result<()> {
        self.objects.lock().insert(key.to_string(), body);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, body: Bytes) -> Result<bool> {
        let mut objects = self.objects.lock();
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.to_string(), body);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Storage driver over an object store bucket
pub struct ObjectDriver<C> {
    client: C,
    prefix: Option<String>,
    names: EntryNames,
    lock_settings: LockSettings,
}

impl<C: ObjectClient> ObjectDriver<C> {
    pub fn new(
        client: C,
        prefix: Option<String>,
        page_suffix: &str,
        lock_suffix: &str,
        lock_settings: LockSettings,
    ) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self {
            client,
            prefix,
            names: EntryNames::new(page_suffix, lock_suffix),
            lock_settings,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// `"{prefix}/{index}/"`
    fn namespace(&self, index_name: &str) -> Result<String> {
        validate_index_name(index_name)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}/", prefix, index_name),
            None => format!("{}/", index_name),
        })
    }

    fn page_key(&self, index_name: &str, page_id: u64) -> Result<String> {
        Ok(format!("{}{}", self.namespace(index_name)?, self.names.page(page_id)))
    }

    /// Object names relative to the namespace
    fn entries(&self, index_name: &str) -> Result<Vec<String>> {
        let namespace = self.namespace(index_name)?;
        let keys = self.client.list(&namespace)?;
        if !keys.iter().any(|key| key.ends_with(KIND_OBJECT)) {
            return Err(PageKvError::not_exist(format!("index '{}'", index_name)));
        }
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&namespace).map(str::to_string))
            .collect())
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

    fn read(&self, page_id: u64, index_name: &str, size_hint: usize) -> Result<PageData> {
        let key = self.page_key(index_name, page_id)?;
        let body = self.client.get(&key)?;
        let page = decode_records(&body, size_hint)
            .map_err(|reason| PageKvError::corrupt(format!("{}: {}", key, reason)))?;
        tracing::debug!(index = index_name, page_id, records = page.len(), "read page object");
        Ok(page)
    }

    fn write(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()> {
        // Make sure the namespace still exists before creating objects in it
        self.index_kind(index_name)?;
        let key = self.page_key(index_name, page_id)?;
        self.client.put(&key, encode_records(page))?;
        tracing::debug!(index = index_name, page_id, records = page.len(), "wrote page object");
        Ok(())
    }

    fn create(&self, index_name: &str, kind: IndexKind) -> Result<()> {
        let key = format!("{}{}", self.namespace(index_name)?, KIND_OBJECT);
        if !self
            .client
            .put_if_absent(&key, Bytes::from_static(kind.as_str().as_bytes()))?
        {
            return Err(PageKvError::KeyAlreadyExists(format!("index '{}'", index_name)));
        }
        tracing::info!(index = index_name, %kind, "created index");
        Ok(())
    }

    fn drop_namespace(&self, index_name: &str, kind: IndexKind) -> Result<()> {
        if self.index_kind(index_name)? != kind {
            return Err(PageKvError::not_exist(format!("{} index '{}'", kind, index_name)));
        }
        let namespace = self.namespace(index_name)?;
        let keys = self.client.list(&namespace)?;
        // The kind marker goes last so a half-finished drop still looks like an index
        let (kind_keys, rest): (Vec<String>, Vec<String>) =
            keys.into_iter().partition(|key| key.ends_with(KIND_OBJECT));
        for key in rest.iter().chain(kind_keys.iter()) {
            self.client.delete(key)?;
        }
        tracing::info!(index = index_name, %kind, "dropped index");
        Ok(())
    }

    fn remove_marker(&self, index_name: &str, expires_at_ms: u64) -> Result<()> {
        let key = format!(
            "{}{}",
            self.namespace(index_name)?,
            self.names.lock(expires_at_ms)
        );
        self.client.delete(&key)
    }
}

impl<C: ObjectClient> StorageDriver for ObjectDriver<C> {
    fn read_page(&self, page_id: u64, index_name: &str, size_hint: usize) -> Result<PageData> {
        self.read(page_id, index_name, size_hint)
    }

    fn write_page(&self, page: &PageData, page_id: u64, index_name: &str) -> Result<()> {
        self.write(page, page_id, index_name)
    }

    fn read_map_page(
        &self,
        page_id: u64,
        index_name: &str,
        size_hint: usize,
    ) -> Result<PageData> {
        self.read(page_id, index_name, size_hint)
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
        let key = format!("{}{}", self.namespace(index_name)?, KIND_OBJECT);
        let body = self.client.get(&key).map_err(|e| match e {
            PageKvError::NotExist(_) => PageKvError::not_exist(format!("index '{}'", index_name)),
            other => other,
        })?;
        std::str::from_utf8(&body)
            .ok()
            .and_then(IndexKind::parse)
            .ok_or_else(|| PageKvError::corrupt(key))
    }

    fn index_is_locked(&self, index_name: &str) -> Result<LockStatus> {
        Ok(lock_status(self.lock_expiries(index_name)?))
    }

    fn lock_index(&self, index_name: &str) -> Result<Option<u64>> {
        let expiry = expiry_after(self.lock_settings.duration);
        let key = format!("{}{}", self.namespace(index_name)?, self.names.lock(expiry));
        if !self.client.put_if_absent(&key, Bytes::new())? {
            return Ok(None);
        }

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

// =============================================================================
// Record Codec
// =============================================================================

fn encode_records(page: &PageData) -> Bytes {
    let mut out = String::with_capacity(16 + page.len() * 24);
    out.push_str(MIN_KEY_HEADER);
    out.push_str(&page.min_key.to_string());
    out.push('\n');
    for key in &page.ordered_keys {
        if let Some(value) = page.values.get(key) {
            out.push_str(&key.to_string());
            out.push(':');
            escape_into(value, &mut out);
            out.push('\n');
        }
    }
    Bytes::from(out)
}

fn decode_records(body: &[u8], size_hint: usize) -> std::result::Result<PageData, String> {
    let text = std::str::from_utf8(body).map_err(|e| e.to_string())?;
    let mut lines = text.lines();

    let header = lines.next().ok_or("empty page object")?;
    let min_key = header
        .strip_prefix(MIN_KEY_HEADER)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| format!("bad header {:?}", header))?;

    let mut page = PageData::with_capacity(size_hint);
    page.min_key = min_key;
    for (line_no, line) in lines.enumerate() {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| format!("record {} has no delimiter", line_no + 1))?;
        let key: u64 = key
            .parse()
            .map_err(|_| format!("record {} has non-numeric key {:?}", line_no + 1, key))?;
        if page.values.contains_key(&key) {
            return Err(format!("duplicate key {}", key));
        }
        page.insert(key, unescape(value)?);
    }
    Ok(page)
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => return Err(format!("bad escape sequence \\{:?}", other)),
        }
    }
    Ok(out)
}
