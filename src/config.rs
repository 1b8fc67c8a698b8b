//! Configuration for PageKV
//!
//! Centralized configuration with sensible defaults. Values arrive here
//! already resolved; sourcing them from env vars or files is the caller's job.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a PageKV engine
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Page Configuration
    // -------------------------------------------------------------------------
    /// Records per page for auto-increment indexes
    pub auto_page_size: u64,

    /// Key-space width per page for map indexes
    pub map_page_size: u64,

    /// Suffix appended to every page file/object name
    pub page_suffix: String,

    /// Suffix appended after `page_suffix` on lock markers
    pub lock_suffix: String,

    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Which storage driver the engine builds at startup
    pub backend: BackendKind,

    /// Root directory for the filesystem backend
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {index}/
    ///           ├── .kind     ("auto" or "map")
    ///           └── 0.page
    pub data_dir: PathBuf,

    /// Bucket and key prefix for the object store backend
    pub object_store: ObjectStoreConfig,

    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    pub filesystem_lock: LockSettings,
    pub object_store_lock: LockSettings,
    pub memory_lock: LockSettings,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Process-local maps, for tests and ephemeral use
    Memory,

    /// One directory per index, one file per page
    Filesystem,

    /// One object per page in a bucket
    ObjectStore,
}

impl std::str::FromStr for BackendKind {
    type Err = crate::PageKvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "filesystem" | "fs" | "file" => Ok(Self::Filesystem),
            "objectstore" | "object" | "s3" => Ok(Self::ObjectStore),
            other => Err(crate::PageKvError::Config(format!(
                "unknown backend kind '{}'",
                other
            ))),
        }
    }
}

/// Remote object store location
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreConfig {
    pub bucket: String,

    /// Optional key prefix inside the bucket
    pub prefix: Option<String>,

    /// Optional endpoint override (MinIO, LocalStack)
    pub endpoint: Option<String>,
}

/// Advisory lock timing for one backend
#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    /// How long an acquired lock stays valid. Must exceed the slowest
    /// single page write on the backend.
    pub duration: Duration,

    /// Sleep between `index_is_locked` checks while waiting
    pub poll_interval: Duration,

    /// Give up with `LockTimeout` after waiting this long
    pub max_wait: Duration,
}

impl LockSettings {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            poll_interval: Duration::from_millis(5),
            max_wait: duration * 100,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_page_size: 1000,
            map_page_size: 1 << 54,
            page_suffix: ".page".to_string(),
            lock_suffix: ".lock".to_string(),
            backend: BackendKind::Filesystem,
            data_dir: PathBuf::from("./pagekv_data"),
            object_store: ObjectStoreConfig::default(),
            filesystem_lock: LockSettings::new(Duration::from_millis(50)),
            object_store_lock: LockSettings::new(Duration::from_millis(2000)),
            memory_lock: LockSettings::new(Duration::from_millis(1)),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Lock timing for the configured backend
    pub fn lock_settings(&self) -> LockSettings {
        match self.backend {
            BackendKind::Memory => self.memory_lock,
            BackendKind::Filesystem => self.filesystem_lock,
            BackendKind::ObjectStore => self.object_store_lock,
        }
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.auto_page_size == 0 || self.map_page_size == 0 {
            return Err(crate::PageKvError::Config(
                "page sizes must be greater than zero".to_string(),
            ));
        }
        if self.page_suffix.is_empty() || self.lock_suffix.is_empty() {
            return Err(crate::PageKvError::Config(
                "page and lock suffixes must not be empty".to_string(),
            ));
        }
        if self.backend == BackendKind::ObjectStore && self.object_store.bucket.is_empty() {
            return Err(crate::PageKvError::Config(
                "object store backend requires a bucket".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the auto index page size (records per page)
    pub fn auto_page_size(mut self, size: u64) -> Self {
        self.config.auto_page_size = size;
        self
    }

    /// Set the map index page size (hash range per page)
    pub fn map_page_size(mut self, size: u64) -> Self {
        self.config.map_page_size = size;
        self
    }

    pub fn page_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.page_suffix = suffix.into();
        self
    }

    pub fn lock_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.lock_suffix = suffix.into();
        self
    }

    /// Select the storage backend
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the data directory (root for the filesystem backend)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn object_store(mut self, object_store: ObjectStoreConfig) -> Self {
        self.config.object_store = object_store;
        self
    }

    pub fn filesystem_lock(mut self, settings: LockSettings) -> Self {
        self.config.filesystem_lock = settings;
        self
    }

    pub fn object_store_lock(mut self, settings: LockSettings) -> Self {
        self.config.object_store_lock = settings;
        self
    }

    pub fn memory_lock(mut self, settings: LockSettings) -> Self {
        self.config.memory_lock = settings;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
