//! Query result envelope
//!
//! Every index operation answers with a `QueryResult`. Batched operations
//! return a `Collection` with one element per selected key, in selection
//! order; a key that failed contributes `Empty` at its position, so callers
//! must check elements individually.

use std::fmt;

/// Uniform result of an index operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// One value (or the affected key for mutations)
    Single(String),

    /// Ordered results of a multi-key operation or a listing
    Collection(Vec<QueryResult>),

    /// No data, or the sub-operation at this position failed
    Empty,
}

impl QueryResult {
    pub fn single(value: impl Into<String>) -> Self {
        QueryResult::Single(value.into())
    }

    /// False only for `Empty`
    pub fn is_valid(&self) -> bool {
        !matches!(self, QueryResult::Empty)
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            QueryResult::Single(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[QueryResult]> {
        match self {
            QueryResult::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Number of top-level entries: 1 for `Single`, 0 for `Empty`
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Single(_) => 1,
            QueryResult::Collection(items) => items.len(),
            QueryResult::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positions of `Empty` elements in a collection
    pub fn failed_positions(&self) -> Vec<usize> {
        match self {
            QueryResult::Collection(items) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| !item.is_valid())
                .map(|(pos, _)| pos)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Flatten to the single values, skipping `Empty` placeholders
    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryResult::Single(value) => vec![value.as_str()],
            QueryResult::Collection(items) => items.iter().flat_map(|item| item.values()).collect(),
            QueryResult::Empty => Vec::new(),
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Single(value) => f.write_str(value),
            QueryResult::Empty => f.write_str("(empty)"),
            QueryResult::Collection(items) => {
                for (pos, item) in items.iter().enumerate() {
                    if pos > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}
