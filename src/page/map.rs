//! Map index page
//!
//! Hashed keys in insertion order. Unlike auto pages there is no id
//! sequence to maintain.

use crate::error::{PageKvError, Result};

use super::PageData;

/// One page of a map index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapPage {
    data: PageData,
}

impl MapPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: PageData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &PageData {
        &self.data
    }

    pub fn into_data(self) -> PageData {
        self.data
    }

    /// Strict insert: fails if `key` is already present
    pub fn add(&mut self, key: u64, value: impl Into<String>) -> Result<()> {
        if self.data.values.contains_key(&key) {
            return Err(PageKvError::KeyAlreadyExists(key.to_string()));
        }
        self.data.insert(key, value.into());
        Ok(())
    }

    /// Strict update: fails if `key` is absent
    pub fn overwrite(&mut self, key: u64, value: impl Into<String>) -> Result<()> {
        match self.data.values.get_mut(&key) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(PageKvError::not_exist(format!("key {}", key))),
        }
    }

    /// Insert or replace. An existing key keeps its position in the order.
    pub fn upsert(&mut self, key: u64, value: impl Into<String>) {
        self.data.insert(key, value.into());
    }

    pub fn delete(&mut self, key: u64) -> Result<String> {
        self.data
            .remove(key)
            .ok_or_else(|| PageKvError::not_exist(format!("key {}", key)))
    }

    pub fn query(&self, key: u64) -> Result<&str> {
        self.data
            .values
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| PageKvError::not_exist(format!("key {}", key)))
    }

    pub fn contains(&self, key: u64) -> bool {
        self.data.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, &str)> + '_ {
        self.data.ordered_keys.iter().filter_map(move |key| {
            self.data.values.get(key).map(|value| (*key, value.as_str()))
        })
    }
}
