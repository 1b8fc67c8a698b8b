//! Auto index page
//!
//! Holds a dense run of auto-increment ids for one page id.

use crate::error::{PageKvError, Result};

use super::PageData;

/// One page of an auto-increment index
///
/// ## Invariant
/// `min_key` never decreases. Every append raises it past the id it handed
/// out, so an id stays retired even if its record and every later record in
/// the page are deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    data: PageData,
}

impl Page {
    /// Create an empty page
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a page from its persisted form
    pub fn from_data(data: PageData) -> Self {
        Self { data }
    }

    /// Borrow the persisted form
    pub fn data(&self) -> &PageData {
        &self.data
    }

    pub fn into_data(self) -> PageData {
        self.data
    }

    /// Highest id on the page, or 0 when empty
    pub fn max_key(&self) -> u64 {
        self.data.values.keys().copied().max().unwrap_or(0)
    }

    pub fn min_key(&self) -> u64 {
        self.data.min_key
    }

    /// Raise the minimum id for the next append. Lower values are ignored.
    pub fn set_minimum_key(&mut self, key: u64) {
        self.data.min_key = self.data.min_key.max(key);
    }

    /// The id the next `append` would return
    pub fn next_key(&self) -> u64 {
        (self.max_key() + 1).max(self.data.min_key)
    }

    /// Store `value` under the next id and return it
    pub fn append(&mut self, value: impl Into<String>) -> u64 {
        let id = self.next_key();
        self.data.insert(id, value.into());
        self.data.min_key = id + 1;
        id
    }

    pub fn query(&self, id: u64) -> Result<&str> {
        self.data
            .values
            .get(&id)
            .map(String::as_str)
            .ok_or_else(|| PageKvError::not_exist(format!("id {}", id)))
    }

    /// Replace the value of an existing id
    pub fn overwrite(&mut self, id: u64, value: impl Into<String>) -> Result<()> {
        match self.data.values.get_mut(&id) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(PageKvError::not_exist(format!("id {}", id))),
        }
    }

    pub fn delete(&mut self, id: u64) -> Result<String> {
        self.data
            .remove(id)
            .ok_or_else(|| PageKvError::not_exist(format!("id {}", id)))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `(id, value)` pairs in insertion order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, &str)> + '_ {
        self.data.ordered_keys.iter().filter_map(move |id| {
            self.data.values.get(id).map(|value| (*id, value.as_str()))
        })
    }
}
