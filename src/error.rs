//! Error types for PageKV
//!
//! Provides a unified error type for all engine operations. Callers match on
//! the variant to decide how to surface a failure; the engine itself never
//! produces user-facing messages beyond `Display`.

use thiserror::Error;

/// Result type alias using PageKvError
pub type Result<T> = std::result::Result<T, PageKvError>;

/// Unified error type for PageKV operations
#[derive(Debug, Error)]
pub enum PageKvError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    /// Index, page or key is missing
    #[error("does not exist: {0}")]
    NotExist(String),

    /// Strict insert into a key that is already present
    #[error("key already exists: {0}")]
    KeyAlreadyExists(String),

    /// String key too long, empty, or containing forbidden characters
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Selector could not be built (e.g. range with max < min)
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("read failure on {context}: {source}")]
    ReadFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write failure on {context}: {source}")]
    WriteFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Unparseable page body or page name
    #[error("corrupt data in {0}")]
    CorruptData(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    /// Advisory lock could not be acquired within the configured wait
    #[error("timed out after {waited_ms}ms waiting for lock on index '{index}'")]
    LockTimeout { index: String, waited_ms: u64 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl PageKvError {
    pub fn not_exist(what: impl Into<String>) -> Self {
        Self::NotExist(what.into())
    }

    pub fn corrupt(what: impl Into<String>) -> Self {
        Self::CorruptData(what.into())
    }

    /// Wrap an I/O error raised while reading `context`.
    ///
    /// `NotFound` is promoted to `NotExist` so callers can tell a missing
    /// page apart from a failing backend.
    pub fn read(context: impl Into<String>, source: std::io::Error) -> Self {
        let context = context.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotExist(context);
        }
        Self::ReadFailure { context, source }
    }

    /// Wrap an I/O error raised while writing `context`.
    ///
    /// A missing parent (dropped index) is reported as `NotExist`.
    pub fn write(context: impl Into<String>, source: std::io::Error) -> Self {
        let context = context.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotExist(context);
        }
        Self::WriteFailure { context, source }
    }

    /// True for errors that only concern the addressed key, as opposed to
    /// the backend or the index as a whole.
    pub fn is_key_level(&self) -> bool {
        matches!(
            self,
            Self::NotExist(_) | Self::KeyAlreadyExists(_) | Self::InvalidKey(_)
        )
    }
}
