//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and the leveled TableManager
//! - Handle concurrent read/write access
//! - Flush the MemTable when it reaches its entry threshold
//! - Drive compaction from the maintenance hook
//! - Replay the WAL on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::Result;
use crate::memtable::MemTable;
use crate::record::{Lookup, Record};
use crate::storage::{CompactionResult, TableManager, LEVEL_COUNT};
use crate::wal::{WalRecovery, WalWriter};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/flush): Serialized by `write_lock`
///   - Only ONE write operation at a time, so per-key program order holds
///   - Order inside a write: WAL append → memtable update
///   - A failed WAL append leaves the memtable untouched
///
/// - **Reads** (get): never take `write_lock`
///   - MemTable uses an internal RwLock (many concurrent readers)
///   - `flushing` keeps a snapshot visible while its table is being built
///   - TableManager clones its level lists and reads tables without its lock
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Records detached from the memtable whose SSTable is not yet live
    flushing: RwLock<Option<Arc<Vec<Record>>>>,

    /// Leveled on-disk tables (internal RwLock on the level lists)
    storage: TableManager,

    /// Serializes write operations (put/delete/flush)
    write_lock: Mutex<()>,
}

/// What one maintenance pass did
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// Whether the memtable was flushed to level 0
    pub flushed: bool,
    /// Compactions performed, top level first
    pub compactions: Vec<CompactionResult>,
}

/// Point-in-time counters for diagnostics
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Live memtable entries
    pub memtable_live: usize,
    /// Memtable entries including tombstones
    pub memtable_entries: usize,
    /// Per level: (table count, bytes on disk, byte budget)
    pub levels: Vec<(usize, u64, u64)>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create data directory
    /// 2. Load live SSTables into their levels
    /// 3. Replay the WAL into a fresh memtable
    /// 4. Reopen the WAL for appends
    ///
    /// Any failure here is fatal: the engine does not start.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let storage = TableManager::open(&config.data_dir, config.level0_size)?;

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let (memtable, recovery) = WalRecovery::replay(&wal_path)?;
        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        tracing::info!(
            "Engine opened at {:?}: {} tables, {} WAL entries replayed{}",
            config.data_dir,
            storage.table_count(),
            recovery.entries_recovered,
            if recovery.was_truncated { " (torn tail discarded)" } else { "" }
        );

        Ok(Self {
            config,
            wal: Mutex::new(wal),
            memtable,
            flushing: RwLock::new(None),
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Look up a key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Snapshot currently being flushed
    /// 3. SSTables, level 0 first, newest first within a level
    pub fn get(&self, key: &str) -> Result<Lookup> {
        match self.memtable.get(key) {
            Lookup::NotPresent => {}
            found => return Ok(found),
        }

        if let Some(snapshot) = self.flushing.read().as_ref() {
            if let Ok(pos) = snapshot.binary_search_by(|record| record.key.as_str().cmp(key)) {
                return Ok(snapshot[pos].to_lookup());
            }
        }

        self.storage.search(key)
    }

    /// Store a value, returning the previous live record if any
    ///
    /// The mutation is durable once this returns `Ok`.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<Option<Record>> {
        let _write_guard = self.write_lock.lock();

        let record = Record::live(key, value);
        self.wal.lock().write(&record)?;

        let previous = self.memtable.put(record.key, value.to_vec());
        self.flush_if_full();
        Ok(previous)
    }

    /// Delete a key, returning the previous live record if any
    ///
    /// Always logs a tombstone, even for keys absent from the memtable, so
    /// older SSTables are shadowed after the next flush.
    pub fn delete(&self, key: &str) -> Result<Option<Record>> {
        let _write_guard = self.write_lock.lock();

        let record = Record::tombstone(key);
        self.wal.lock().write(&record)?;

        let previous = self.memtable.delete(record.key);
        self.flush_if_full();
        Ok(previous)
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size. Returns whether a table
    /// was written.
    pub fn flush(&self) -> Result<bool> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// One maintenance pass: flush if the memtable is full, then compact
    /// every level that exceeds its budget
    pub fn maintain(&self) -> Result<MaintenanceReport> {
        let flushed = {
            let _write_guard = self.write_lock.lock();
            if self.memtable.entry_count() >= self.config.memtable_flush_threshold {
                self.flush_internal()?
            } else {
                false
            }
        };

        let compactions = self.storage.compact_if_needed()?;
        Ok(MaintenanceReport {
            flushed,
            compactions,
        })
    }

    /// Compact one level right away, regardless of its size
    pub fn compact_level(&self, level: usize) -> Result<Option<CompactionResult>> {
        self.storage.compact(level)
    }

    /// Start a thread that runs [`Engine::maintain`] every
    /// `maintenance_interval_ms` until the handle is stopped or dropped
    pub fn spawn_maintenance(engine: Arc<Engine>) -> Result<MaintenanceHandle> {
        let interval = Duration::from_millis(engine.config.maintenance_interval_ms);
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let thread = thread::Builder::new()
            .name("stratakv-maintenance".to_string())
            .spawn(move || loop {
                crossbeam::select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        match engine.maintain() {
                            Ok(report) if report.flushed || !report.compactions.is_empty() => {
                                tracing::debug!(
                                    "Maintenance: flushed={}, compactions={}",
                                    report.flushed,
                                    report.compactions.len()
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Maintenance pass failed: {}", e),
                        }
                    }
                }
            })?;

        Ok(MaintenanceHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Flush inline when a write fills the memtable (called with write lock
    /// held). The triggering write is already durable in the WAL, so a
    /// failure is logged and left for the next maintenance pass.
    fn flush_if_full(&self) {
        if self.memtable.entry_count() < self.config.memtable_flush_threshold {
            return;
        }
        if let Err(e) = self.flush_internal() {
            tracing::warn!("Inline flush failed, will retry during maintenance: {}", e);
        }
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<bool> {
        // Skip if memtable is empty
        if self.memtable.is_empty() {
            return Ok(false);
        }

        // Step 1: Detach memtable contents, keeping them readable
        let records = {
            let mut flushing = self.flushing.write();
            let records = Arc::new(self.memtable.snapshot_and_clear());
            *flushing = Some(Arc::clone(&records));
            records
        };

        // Step 2: Write level-0 SSTable (visible to reads once this returns)
        if let Err(e) = self.storage.flush(&records) {
            self.memtable.absorb(records.iter().cloned());
            *self.flushing.write() = None;
            return Err(e);
        }
        *self.flushing.write() = None;

        // Step 3: Reset WAL (entries are now durable in an SSTable). The
        // flush has already taken effect, so a failed reset only leaves
        // records in the log that replay onto the same values.
        if let Err(e) = self.wal.lock().reset() {
            tracing::warn!("Flushed to SSTable but could not reset WAL: {}", e);
        }

        Ok(true)
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        tracing::info!("Engine at {:?} closed", self.config.data_dir);
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the write-ahead log
    pub fn wal_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::WAL_FILENAME)
    }

    /// Number of live memtable entries
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Memtable entries including tombstones
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn table_count(&self) -> usize {
        self.storage.table_count()
    }

    /// The leveled table manager
    pub fn storage(&self) -> &TableManager {
        &self.storage
    }

    /// Snapshot of memtable and per-level counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            memtable_live: self.memtable.size(),
            memtable_entries: self.memtable.entry_count(),
            levels: (0..LEVEL_COUNT)
                .map(|level| {
                    (
                        self.storage.level_table_count(level),
                        self.storage.level_size(level),
                        self.storage.level_max_size(level),
                    )
                })
                .collect(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Stops the background maintenance thread when dropped
pub struct MaintenanceHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Maintenance thread panicked");
            }
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
