//! Engine Module
//!
//! Entry point that owns the configured storage driver and hands out index
//! handles.
//!
//! ## Responsibilities
//! - Build the storage driver once, from `Config`
//! - Create, open and drop indexes by name
//! - Route structured `Command`s to the right index flavor
//!
//! Indexes are cheap handles; opening one performs a single namespace lookup
//! and no page I/O.

use std::sync::Arc;

use crate::command::{Command, Keys};
use crate::config::{BackendKind, Config};
use crate::error::{PageKvError, Result};
use crate::index::{AutoIndex, MapIndex};
use crate::result::QueryResult;
use crate::storage::{FsDriver, IndexKind, MemoryDriver, StorageDriver};

/// The storage engine
///
/// ## Concurrency Model
/// The engine holds no locks of its own. Every mutation takes the advisory
/// lock of its index namespace through the driver, so several engines (in
/// one process or many) may share a filesystem or object store.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Storage backend shared by every index handle
    driver: Arc<dyn StorageDriver>,
}

impl Engine {
    /// Build the configured driver and open an engine over it
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let driver = build_driver(&config)?;
        tracing::info!(backend = ?config.backend, "engine opened");
        Ok(Self { config, driver })
    }

    /// Open over an already-constructed driver
    pub fn with_driver(config: Config, driver: Arc<dyn StorageDriver>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, driver })
    }

    /// In-memory engine with default settings
    pub fn in_memory() -> Self {
        let config = Config::builder().backend(BackendKind::Memory).build();
        let driver: Arc<dyn StorageDriver> = Arc::new(MemoryDriver::new(config.memory_lock));
        Self { config, driver }
    }

    // =========================================================================
    // Index Lifecycle
    // =========================================================================

    pub fn create_auto_index(&self, name: &str) -> Result<AutoIndex> {
        self.driver.create_auto_index(name)?;
        AutoIndex::new(name, Arc::clone(&self.driver), self.config.auto_page_size)
    }

    pub fn create_map_index(&self, name: &str) -> Result<MapIndex> {
        self.driver.create_map_index(name)?;
        MapIndex::new(name, Arc::clone(&self.driver), self.config.map_page_size)
    }

    /// Open an existing auto index. `NotExist` if absent or a map index.
    pub fn auto_index(&self, name: &str) -> Result<AutoIndex> {
        self.expect_kind(name, IndexKind::Auto)?;
        AutoIndex::new(name, Arc::clone(&self.driver), self.config.auto_page_size)
    }

    /// Open an existing map index. `NotExist` if absent or an auto index.
    pub fn map_index(&self, name: &str) -> Result<MapIndex> {
        self.expect_kind(name, IndexKind::Map)?;
        MapIndex::new(name, Arc::clone(&self.driver), self.config.map_page_size)
    }

    pub fn drop_auto_index(&self, name: &str) -> Result<()> {
        self.driver.drop_auto_index(name)
    }

    pub fn drop_map_index(&self, name: &str) -> Result<()> {
        self.driver.drop_map_index(name)
    }

    pub fn index_kind(&self, name: &str) -> Result<IndexKind> {
        self.driver.index_kind(name)
    }

    fn expect_kind(&self, name: &str, kind: IndexKind) -> Result<()> {
        if self.driver.index_kind(name)? != kind {
            return Err(PageKvError::not_exist(format!("{} index '{}'", kind, name)));
        }
        Ok(())
    }

    // =========================================================================
    // Command Routing
    // =========================================================================

    /// Execute a command against the index it names
    pub fn execute(&self, command: Command) -> Result<QueryResult> {
        tracing::debug!(index = command.index(), mutation = command.is_mutation(), "execute");
        match command {
            Command::Create { kind, index } => {
                match kind {
                    IndexKind::Auto => self.driver.create_auto_index(&index)?,
                    IndexKind::Map => self.driver.create_map_index(&index)?,
                }
                Ok(QueryResult::Single(index))
            }
            Command::Drop { kind, index } => {
                match kind {
                    IndexKind::Auto => self.drop_auto_index(&index)?,
                    IndexKind::Map => self.drop_map_index(&index)?,
                }
                Ok(QueryResult::Single(index))
            }
            Command::Query { index, keys } => match self.open_index(&index)? {
                Opened::Auto(auto) => auto.query(keys.to_auto_selector()?),
                Opened::Map(map) => map.query(keys.to_map_selector()?),
            },
            Command::Insert { index, keys, value } => match (self.open_index(&index)?, keys) {
                (Opened::Auto(auto), None) => {
                    Ok(QueryResult::Single(auto.insert(&value)?.to_string()))
                }
                (Opened::Auto(_), Some(_)) => Err(PageKvError::InvalidSelector(
                    "auto index ids are assigned by insert".to_string(),
                )),
                (Opened::Map(map), Some(keys)) => map.insert(keys.to_map_selector()?, &value),
                (Opened::Map(_), None) => Err(PageKvError::InvalidSelector(
                    "map index insert needs a key".to_string(),
                )),
            },
            Command::Update { index, keys, value } => match self.open_index(&index)? {
                Opened::Auto(auto) => auto.update(keys.to_auto_selector()?, &value),
                Opened::Map(map) => map.update(keys.to_map_selector()?, &value),
            },
            Command::Upsert { index, keys, value } => match self.open_index(&index)? {
                Opened::Auto(auto) => auto.upsert(keys.to_auto_selector()?, &value),
                Opened::Map(map) => map.upsert(keys.to_map_selector()?, &value),
            },
            Command::Delete { index, keys } => match self.open_index(&index)? {
                Opened::Auto(auto) => auto.delete(keys.to_auto_selector()?),
                Opened::Map(map) => map.delete(keys.to_map_selector()?),
            },
            Command::List {
                index,
                limit,
                offset,
                descending,
            } => match self.open_index(&index)? {
                Opened::Auto(auto) => auto.list(limit, offset, descending),
                Opened::Map(map) => map.list(limit, offset, descending),
            },
            Command::Count { index } => {
                let count = match self.open_index(&index)? {
                    Opened::Auto(auto) => auto.count()?,
                    Opened::Map(map) => map.count()?,
                };
                Ok(QueryResult::Single(count.to_string()))
            }
        }
    }

    /// Shorthand for a map lookup of one key
    pub fn get(&self, index: &str, key: &str) -> Result<QueryResult> {
        self.execute(Command::Query {
            index: index.to_string(),
            keys: Keys::single(key),
        })
    }

    fn open_index(&self, name: &str) -> Result<Opened> {
        let driver = Arc::clone(&self.driver);
        Ok(match self.driver.index_kind(name)? {
            IndexKind::Auto => Opened::Auto(AutoIndex::new(name, driver, self.config.auto_page_size)?),
            IndexKind::Map => Opened::Map(MapIndex::new(name, driver, self.config.map_page_size)?),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> Arc<dyn StorageDriver> {
        Arc::clone(&self.driver)
    }
}

enum Opened {
    Auto(AutoIndex),
    Map(MapIndex),
}

/// Construct the backend named by `config.backend`
pub fn build_driver(config: &Config) -> Result<Arc<dyn StorageDriver>> {
    let driver: Arc<dyn StorageDriver> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryDriver::new(config.memory_lock)),
        BackendKind::Filesystem => Arc::new(FsDriver::open(
            &config.data_dir,
            &config.page_suffix,
            &config.lock_suffix,
            config.filesystem_lock,
        )?),
        BackendKind::ObjectStore => build_object_driver(config)?,
    };
    Ok(driver)
}

#[cfg(feature = "s3")]
fn build_object_driver(config: &Config) -> Result<Arc<dyn StorageDriver>> {
    use crate::storage::{ObjectDriver, S3ObjectClient};

    let client = S3ObjectClient::connect(&config.object_store)?;
    Ok(Arc::new(ObjectDriver::new(
        client,
        config.object_store.prefix.clone(),
        &config.page_suffix,
        &config.lock_suffix,
        config.object_store_lock,
    )))
}

#[cfg(not(feature = "s3"))]
fn build_object_driver(_config: &Config) -> Result<Arc<dyn StorageDriver>> {
    Err(PageKvError::Config(
        "object store backend requires the `s3` feature; use Engine::with_driver to supply another ObjectClient".to_string(),
    ))
}
