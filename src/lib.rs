//! # PageKV
//!
//! An embeddable key-value storage engine with:
//! - Auto-increment indexes (dense `u64` ids) and hash-keyed map indexes
//! - Fixed-capacity pages behind a pluggable storage driver
//! - Per-index advisory locking for multi-process writers
//! - Partial-failure results for batched multi-key operations
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Engine (Command routing)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  AutoIndex  │          │  MapIndex   │ ◄── Selector
//!   └──────┬──────┘          └──────┬──────┘
//!          │  Page / MapPage        │
//!          └────────────┬───────────┘
//!                       ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │ LockCoordinator ──► StorageDriver                        │
//!   │                     (memory │ filesystem │ object store) │
//!   └─────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod selector;
pub mod page;
pub mod storage;
pub mod lock;
pub mod result;
pub mod index;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{PageKvError, Result};
pub use config::{BackendKind, Config, LockSettings};
pub use selector::{AutoSelector, MapSelector, Selector};
pub use result::QueryResult;
pub use index::{AutoIndex, MapIndex};
pub use storage::{IndexKind, StorageDriver};
pub use command::{Command, Keys};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of PageKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
