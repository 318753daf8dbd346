//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StrataError};

/// Main configuration for a StrataKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     ├── MANIFEST         (live table list)
    ///     └── <level>.<index>.db
    pub data_dir: PathBuf,

    /// Size budget of level 0 in bytes; level N gets `level0_size * 10^N`
    pub level0_size: u64,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Number of memtable entries (tombstones included) that triggers a flush
    pub memtable_flush_threshold: usize,

    // -------------------------------------------------------------------------
    // Maintenance Configuration
    // -------------------------------------------------------------------------
    /// Tick interval of the background maintenance thread (milliseconds)
    pub maintenance_interval_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N entries; writes in between are only in the OS page cache
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stratakv_data"),
            level0_size: 1024 * 1024, // 1 MB
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_flush_threshold: 4096,
            maintenance_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.level0_size == 0 {
            return Err(StrataError::Config("level0_size must be > 0".to_string()));
        }
        if self.memtable_flush_threshold == 0 {
            return Err(StrataError::Config(
                "memtable_flush_threshold must be > 0".to_string(),
            ));
        }
        if self.maintenance_interval_ms == 0 {
            return Err(StrataError::Config(
                "maintenance_interval_ms must be > 0".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(StrataError::Config(
                "EveryNEntries sync count must be > 0".to_string(),
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
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the level-0 size budget (in bytes)
    pub fn level0_size(mut self, size: u64) -> Self {
        self.config.level0_size = size;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable flush threshold (in entries)
    pub fn memtable_flush_threshold(mut self, entries: usize) -> Self {
        self.config.memtable_flush_threshold = entries;
        self
    }

    /// Set the background maintenance interval (in milliseconds)
    pub fn maintenance_interval_ms(mut self, ms: u64) -> Self {
        self.config.maintenance_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
