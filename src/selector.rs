//! Selector Module
//!
//! Describes which keys an operation targets. A selector is a lazy,
//! finite, single-pass cursor:
//!
//! ```text
//! while selector.next() {
//!     let key = selector.select();
//!     ...
//! }
//! ```
//!
//! Three shapes are supported for both index flavors:
//! - **Single**: yields exactly one key
//! - **Range**: yields every integer in `min..=max`, ascending
//! - **Array**: replays a caller-given list verbatim, duplicates included
//!
//! Auto indexes select `u64` ids directly. Map indexes carry raw strings and
//! hash them only when `select()` is called, so an invalid key surfaces as a
//! per-key error at its position instead of failing the whole selector.

use crate::error::{PageKvError, Result};
use crate::key::hash_key;

/// Cursor over the keys targeted by one operation
pub trait Selector {
    type Key;

    /// Advance to the next key. Returns false once exhausted.
    fn next(&mut self) -> bool;

    /// The current key. Only meaningful after `next()` returned true.
    fn select(&self) -> Self::Key;

    /// Total number of keys this selector yields
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// More than one key: per-key failures become `Empty` placeholders
    /// instead of failing the call.
    fn is_multi(&self) -> bool {
        self.len() > 1
    }
}

/// Normalizes what `select()` yields into a page-space key
pub trait SelectedKey {
    fn into_key(self) -> Result<u64>;
}

impl SelectedKey for u64 {
    fn into_key(self) -> Result<u64> {
        Ok(self)
    }
}

impl SelectedKey for Result<u64> {
    fn into_key(self) -> Result<u64> {
        self
    }
}

/// Where a selector's keys come from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source<T> {
    Single(T),
    Range { min: u64, max: u64 },
    Array(Vec<T>),
}

/// Selector over keys of type `T`
///
/// `KeySelector<u64>` drives auto indexes, `KeySelector<String>` drives map
/// indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySelector<T> {
    source: Source<T>,
    /// Number of keys yielded so far; the current key is at `position - 1`
    position: usize,
}

/// Selector over auto index ids
pub type AutoSelector = KeySelector<u64>;

/// Selector over map index string keys
pub type MapSelector = KeySelector<String>;

impl<T> KeySelector<T> {
    /// Every integer from `min` to `max` inclusive.
    ///
    /// Fails with `InvalidSelector` when `max < min`.
    pub fn range(min: u64, max: u64) -> Result<Self> {
        if max < min {
            return Err(PageKvError::InvalidSelector(format!(
                "range upper bound {} is below lower bound {}",
                max, min
            )));
        }
        Ok(Self::from_source(Source::Range { min, max }))
    }

    fn from_source(source: Source<T>) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    fn total(&self) -> usize {
        match &self.source {
            Source::Single(_) => 1,
            // A range spanning the whole u64 domain cannot be counted in usize
            Source::Range { min, max } => usize::try_from(max - min)
                .ok()
                .and_then(|n| n.checked_add(1))
                .unwrap_or(usize::MAX),
            Source::Array(keys) => keys.len(),
        }
    }

    fn advance(&mut self) -> bool {
        if self.position < self.total() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn current_offset(&self) -> usize {
        self.position.saturating_sub(1)
    }
}

impl KeySelector<u64> {
    pub fn single(id: u64) -> Self {
        Self::from_source(Source::Single(id))
    }

    pub fn array(ids: impl IntoIterator<Item = u64>) -> Self {
        Self::from_source(Source::Array(ids.into_iter().collect()))
    }
}

impl Selector for KeySelector<u64> {
    type Key = u64;

    fn next(&mut self) -> bool {
        self.advance()
    }

    fn select(&self) -> u64 {
        let offset = self.current_offset();
        match &self.source {
            Source::Single(key) => *key,
            Source::Range { min, .. } => min + offset as u64,
            Source::Array(keys) => keys.get(offset).copied().unwrap_or_default(),
        }
    }

    fn len(&self) -> usize {
        self.total()
    }
}

impl Selector for KeySelector<String> {
    type Key = Result<u64>;

    fn next(&mut self) -> bool {
        self.advance()
    }

    fn select(&self) -> Result<u64> {
        let offset = self.current_offset();
        match &self.source {
            Source::Single(key) => hash_key(key),
            Source::Range { min, .. } => Ok(min + offset as u64),
            Source::Array(keys) => match keys.get(offset) {
                Some(key) => hash_key(key),
                None => Err(PageKvError::InvalidSelector(
                    "select() called on an exhausted selector".to_string(),
                )),
            },
        }
    }

    fn len(&self) -> usize {
        self.total()
    }
}

impl KeySelector<String> {
    pub fn single(key: impl Into<String>) -> Self {
        Self::from_source(Source::Single(key.into()))
    }

    pub fn array<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_source(Source::Array(keys.into_iter().map(Into::into).collect()))
    }

    /// The raw string at the current position, for diagnostics
    pub fn raw(&self) -> String {
        let offset = self.current_offset();
        match &self.source {
            Source::Single(key) => key.clone(),
            Source::Range { min, .. } => (min + offset as u64).to_string(),
            Source::Array(keys) => keys.get(offset).cloned().unwrap_or_default(),
        }
    }
}
