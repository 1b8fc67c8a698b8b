//! Command definitions
//!
//! The structured form of a request, as produced by a query-language parser
//! or a network front end. The engine routes each command to the index it
//! names.

use crate::error::{PageKvError, Result};
use crate::selector::{AutoSelector, MapSelector};
use crate::storage::IndexKind;

/// Keys targeted by a command, before the index flavor is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keys {
    Single(String),
    Range { min: u64, max: u64 },
    Array(Vec<String>),
}

impl Keys {
    pub fn single(key: impl Into<String>) -> Self {
        Keys::Single(key.into())
    }

    pub fn array<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Keys::Array(keys.into_iter().map(Into::into).collect())
    }

    /// Selector for an auto index. Every key must be a numeric id.
    pub fn to_auto_selector(&self) -> Result<AutoSelector> {
        match self {
            Keys::Single(raw) => Ok(AutoSelector::single(parse_id(raw)?)),
            Keys::Range { min, max } => AutoSelector::range(*min, *max),
            Keys::Array(raws) => {
                let ids = raws
                    .iter()
                    .map(|raw| parse_id(raw))
                    .collect::<Result<Vec<u64>>>()?;
                Ok(AutoSelector::array(ids))
            }
        }
    }

    pub fn to_map_selector(&self) -> Result<MapSelector> {
        match self {
            Keys::Single(raw) => Ok(MapSelector::single(raw.clone())),
            Keys::Range { min, max } => MapSelector::range(*min, *max),
            Keys::Array(raws) => Ok(MapSelector::array(raws.iter().cloned())),
        }
    }
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| PageKvError::InvalidKey(format!("{:?} is not a numeric id", raw)))
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an empty index
    Create { kind: IndexKind, index: String },

    /// Drop an index and all of its pages
    Drop { kind: IndexKind, index: String },

    /// Read the selected keys
    Query { index: String, keys: Keys },

    /// Auto index: append `value` (`keys` must be `None`).
    /// Map index: strict insert under `keys`.
    Insert {
        index: String,
        keys: Option<Keys>,
        value: String,
    },

    /// Strict update of existing keys
    Update {
        index: String,
        keys: Keys,
        value: String,
    },

    /// Insert or replace
    Upsert {
        index: String,
        keys: Keys,
        value: String,
    },

    /// Remove the selected keys
    Delete { index: String, keys: Keys },

    /// Page through records
    List {
        index: String,
        limit: usize,
        offset: usize,
        descending: bool,
    },

    /// Count records
    Count { index: String },
}

impl Command {
    /// Name of the index the command addresses
    pub fn index(&self) -> &str {
        match self {
            Command::Create { index, .. }
            | Command::Drop { index, .. }
            | Command::Query { index, .. }
            | Command::Insert { index, .. }
            | Command::Update { index, .. }
            | Command::Upsert { index, .. }
            | Command::Delete { index, .. }
            | Command::List { index, .. }
            | Command::Count { index } => index,
        }
    }

    /// True for commands that take the index lock
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Insert { .. }
                | Command::Update { .. }
                | Command::Upsert { .. }
                | Command::Delete { .. }
        )
    }
}
