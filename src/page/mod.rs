//! Page Module
//!
//! In-memory value objects for one partition of an index.
//!
//! ## Responsibilities
//! - Hold an ordered key → value collection for one page id
//! - Enforce strict insert/update semantics per key
//! - Track the next auto-increment id so deleted ids are never handed out again
//!
//! ## Partitioning
//! ```text
//! page_id = key / page_size
//!
//!   page_size = 10
//!   ┌──────────┬──────────┬──────────┐
//!   │ page 0   │ page 1   │ page 2   │
//!   │ ids 1..9 │ ids10..19│ ids20..29│
//!   └──────────┴──────────┴──────────┘
//! ```
//!
//! Map index keys are hashed into the same u64 space first (see `key`).
//!
//! Pages never hand their storage to a driver by reference for longer than
//! one call: drivers serialize or clone `PageData` before returning, so a
//! caller mutating a page after `write_page` cannot affect the stored copy.

mod auto;
mod map;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use auto::Page;
pub use map::MapPage;

/// Page id that `key` belongs to for a given page size
pub fn page_id(key: u64, page_size: u64) -> u64 {
    key / page_size
}

/// The persisted shape of a page, shared by both index flavors
///
/// Insertion order cannot be recovered from the value map, so the ordered
/// key list is stored next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    pub values: HashMap<u64, String>,

    /// Keys in insertion order
    pub ordered_keys: Vec<u64>,

    /// Lowest id the next append may use. Always 0 for map pages.
    #[serde(default)]
    pub min_key: u64,
}

impl PageData {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
            ordered_keys: Vec::with_capacity(capacity),
            min_key: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ordered_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_keys.is_empty()
    }

    /// Check that the value map and the ordered key list describe the same
    /// key set, once each.
    pub fn is_consistent(&self) -> bool {
        if self.values.len() != self.ordered_keys.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::with_capacity(self.ordered_keys.len());
        self.ordered_keys
            .iter()
            .all(|key| self.values.contains_key(key) && seen.insert(*key))
    }

    /// Values in insertion order, or its reverse
    pub fn values_in_order(&self, descending: bool) -> Vec<&str> {
        let lookup = |key: &u64| self.values.get(key).map(String::as_str);
        if descending {
            self.ordered_keys.iter().rev().filter_map(lookup).collect()
        } else {
            self.ordered_keys.iter().filter_map(lookup).collect()
        }
    }

    pub(crate) fn insert(&mut self, key: u64, value: String) {
        if self.values.insert(key, value).is_none() {
            self.ordered_keys.push(key);
        }
    }

    pub(crate) fn remove(&mut self, key: u64) -> Option<String> {
        let value = self.values.remove(&key)?;
        if let Some(pos) = self.ordered_keys.iter().position(|k| *k == key) {
            self.ordered_keys.remove(pos);
        }
        Some(value)
    }
}
