//! Table Manager
//!
//! Manages the leveled SSTable tree and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Load live SSTables on startup, discard files the manifest does not list
//! - Search levels 0 → 9, newest → oldest inside a level
//! - Create level-0 SSTables from memtable flushes
//! - Compact a level into the next one when it outgrows its budget

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, StrataError};
use crate::record::{Lookup, Record};

use super::compaction::{CompactionResult, MergeIterator, TableSink};
use super::manifest::{Manifest, TableId};
use super::sstable::{SSTable, SSTableBuilder, SSTableMeta};

/// Number of levels in the tree
pub const LEVEL_COUNT: usize = 10;

/// Each level may hold this many times the bytes of the level above it
pub const LEVEL_SIZE_MULTIPLIER: u64 = 10;

/// Tables per level plus the manifest describing them
struct TreeState {
    /// Per level, ordered by ascending creation index (oldest first)
    levels: Vec<Vec<Arc<SSTable>>>,
    manifest: Manifest,
}

impl TreeState {
    fn live_ids(&self) -> Vec<TableId> {
        self.levels
            .iter()
            .flatten()
            .map(|table| TableId::new(table.level(), table.index()))
            .collect()
    }
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `state`: RwLock held only to clone or swap table lists, never during
///   table I/O
/// - `next_index`: per-level atomic counters, never reused within a process
/// - `compaction_lock`: one compaction at a time
pub struct TableManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    state: RwLock<TreeState>,

    next_index: Vec<AtomicU64>,

    /// Byte budget per level
    level_max_size: [u64; LEVEL_COUNT],

    compaction_lock: Mutex<()>,
}

impl TableManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Remove leftover temporary build files
    /// 2. Load the manifest, or adopt every `<level>.<index>.db` if none exists
    /// 3. Delete table files not recorded as live
    /// 4. Open live tables (loads indexes into RAM), ordered by creation index
    pub fn open(path: &Path, level0_size: u64) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut on_disk: Vec<TableId> = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();

            if name.ends_with(".db.tmp") {
                tracing::info!("Removing unfinished table file {:?}", file_path);
                fs::remove_file(&file_path)?;
            } else if let Some(id) = TableId::parse(&name) {
                if id.level < LEVEL_COUNT {
                    on_disk.push(id);
                } else {
                    tracing::warn!("Ignoring table file with out-of-range level: {:?}", file_path);
                }
            }
        }

        let manifest = match Manifest::load(path)? {
            Some(manifest) => manifest,
            None => {
                tracing::info!("No manifest in {:?}; adopting {} table files", path, on_disk.len());
                Manifest::create(path, on_disk.clone())?
            }
        };

        let live: HashSet<TableId> = manifest.tables().iter().copied().collect();
        for id in &on_disk {
            if !live.contains(id) {
                let orphan = path.join(id.file_name());
                tracing::info!("Removing table not recorded as live: {:?}", orphan);
                fs::remove_file(&orphan)?;
            }
        }

        let mut levels: Vec<Vec<Arc<SSTable>>> = vec![Vec::new(); LEVEL_COUNT];
        for id in manifest.tables() {
            let table_path = path.join(id.file_name());
            if !table_path.exists() {
                return Err(StrataError::Corruption(format!(
                    "manifest lists missing table {:?}",
                    table_path
                )));
            }
            let table = SSTable::open(&table_path, id.level, id.index)?;
            tracing::debug!("Loaded {:?}", table);
            levels[id.level].push(Arc::new(table));
        }
        for level in &mut levels {
            level.sort_by_key(|table| table.index());
        }

        let next_index = levels
            .iter()
            .map(|level| {
                let next = level.last().map_or(0, |table| table.index() + 1);
                AtomicU64::new(next)
            })
            .collect();

        let mut level_max_size = [0u64; LEVEL_COUNT];
        level_max_size[0] = level0_size;
        for i in 1..LEVEL_COUNT {
            level_max_size[i] = level_max_size[i - 1].saturating_mul(LEVEL_SIZE_MULTIPLIER);
        }

        Ok(Self {
            data_dir: path.to_path_buf(),
            state: RwLock::new(TreeState { levels, manifest }),
            next_index,
            level_max_size,
            compaction_lock: Mutex::new(()),
        })
    }

    /// Look up a key across every level
    ///
    /// Returns the first `Found`/`Deleted` answer: lower levels before higher
    /// ones, later tables before earlier ones inside a level.
    pub fn search(&self, key: &str) -> Result<Lookup> {
        let levels = self.state.read().levels.clone();

        for level in &levels {
            for table in level.iter().rev() {
                if !table.might_contain(key) {
                    continue;
                }
                match table.search(key)? {
                    Lookup::NotPresent => continue,
                    found => return Ok(found),
                }
            }
        }

        Ok(Lookup::NotPresent)
    }

    /// Write sorted records into a new level-0 SSTable
    ///
    /// Returns `None` for empty input.
    pub fn flush(&self, records: &[Record]) -> Result<Option<SSTableMeta>> {
        if records.is_empty() {
            return Ok(None);
        }

        let id = TableId::new(0, self.allocate_index(0));
        let path = self.table_path(&id);
        let tmp_path = self.data_dir.join(format!("{}.tmp", id.file_name()));

        let mut builder = SSTableBuilder::new(&tmp_path)?;
        for record in records {
            builder.add(record)?;
        }
        let mut metadata = builder.finish()?;
        fs::rename(&tmp_path, &path)?;
        metadata.path = path.clone();

        let table = Arc::new(SSTable::open(&path, id.level, id.index)?);

        {
            let mut state = self.state.write();
            let mut live = state.live_ids();
            live.push(id);
            if let Err(e) = state.manifest.commit(live) {
                drop(state);
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            insert_by_index(&mut state.levels[0], table);
        }

        tracing::info!(
            "Flushed {} records to {} ({} bytes)",
            metadata.entry_count,
            id.file_name(),
            metadata.file_size
        );
        Ok(Some(metadata))
    }

    /// Merge every table at `level` into the next level
    ///
    /// The deepest level is merged in place and loses its tombstones.
    /// Merge I/O runs without the tree lock; only the final swap takes it.
    pub fn compact(&self, level: usize) -> Result<Option<CompactionResult>> {
        if level >= LEVEL_COUNT {
            return Err(StrataError::Storage(format!(
                "level {} out of range (0..{})",
                level, LEVEL_COUNT
            )));
        }

        let _compaction_guard = self.compaction_lock.lock();

        let inputs: Vec<Arc<SSTable>> = self.state.read().levels[level].clone();
        let deepest = level == LEVEL_COUNT - 1;
        if inputs.is_empty() || (deepest && inputs.len() < 2) {
            return Ok(None);
        }
        let target_level = if deepest { level } else { level + 1 };

        tracing::info!(
            "Compacting {} tables at level {} into level {}",
            inputs.len(),
            level,
            target_level
        );

        let mut sink = TableSink::new(
            &self.data_dir,
            target_level,
            self.level_max_size[target_level],
            || self.allocate_index(target_level),
        );
        let merged = MergeIterator::new(&inputs, deepest).and_then(|mut merge| {
            for record in merge.by_ref() {
                sink.add(&record?)?;
            }
            Ok(merge.tombstones_dropped())
        });
        let tombstones_dropped = match merged {
            Ok(dropped) => dropped,
            Err(e) => {
                sink.abandon();
                return Err(e);
            }
        };
        let outputs = sink.finish()?;

        let mut produced = Vec::with_capacity(outputs.len());
        for output in &outputs {
            match SSTable::open(&output.path, output.id.level, output.id.index) {
                Ok(table) => produced.push(Arc::new(table)),
                Err(e) => {
                    remove_outputs(outputs.iter().map(|o| o.path.as_path()));
                    return Err(e);
                }
            }
        }

        let consumed: Vec<TableId> = inputs
            .iter()
            .map(|table| TableId::new(table.level(), table.index()))
            .collect();
        let produced_ids: Vec<TableId> = outputs.iter().map(|output| output.id).collect();

        {
            let mut state = self.state.write();
            let consumed_set: HashSet<TableId> = consumed.iter().copied().collect();
            let mut live: Vec<TableId> = state
                .live_ids()
                .into_iter()
                .filter(|id| !consumed_set.contains(id))
                .collect();
            live.extend(produced_ids.iter().copied());

            if let Err(e) = state.manifest.commit(live) {
                drop(state);
                remove_outputs(outputs.iter().map(|o| o.path.as_path()));
                return Err(e);
            }

            state.levels[level].retain(|table| {
                !consumed_set.contains(&TableId::new(table.level(), table.index()))
            });
            for table in produced {
                insert_by_index(&mut state.levels[target_level], table);
            }
        }

        for table in &inputs {
            table.mark_obsolete();
        }

        let result = CompactionResult {
            source_level: level,
            target_level,
            consumed,
            produced: produced_ids,
            records_written: outputs.iter().map(|output| output.entry_count).sum(),
            tombstones_dropped,
        };
        tracing::info!(
            "Compaction of level {} done: {} tables in, {} tables out, {} records, {} tombstones dropped",
            level,
            result.consumed.len(),
            result.produced.len(),
            result.records_written,
            result.tombstones_dropped
        );
        Ok(Some(result))
    }

    /// Compact every level whose size exceeds its budget, top to bottom
    pub fn compact_if_needed(&self) -> Result<Vec<CompactionResult>> {
        let mut results = Vec::new();
        for level in 0..LEVEL_COUNT {
            if self.needs_compaction(level) {
                if let Some(result) = self.compact(level)? {
                    results.push(result);
                }
            }
        }
        Ok(results)
    }

    /// Whether `level` has outgrown its budget
    pub fn needs_compaction(&self, level: usize) -> bool {
        if level >= LEVEL_COUNT {
            return false;
        }
        let over_budget = self.level_size(level) > self.level_max_size[level];
        if level == LEVEL_COUNT - 1 {
            over_budget && self.level_table_count(level) > 1
        } else {
            over_budget
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Summed on-disk size of all tables at `level`
    pub fn level_size(&self, level: usize) -> u64 {
        self.state
            .read()
            .levels
            .get(level)
            .map_or(0, |tables| tables.iter().map(|table| table.file_size()).sum())
    }

    /// Byte budget of `level`
    pub fn level_max_size(&self, level: usize) -> u64 {
        self.level_max_size.get(level).copied().unwrap_or(u64::MAX)
    }

    /// Total number of live SSTables
    pub fn table_count(&self) -> usize {
        self.state.read().levels.iter().map(Vec::len).sum()
    }

    pub fn level_table_count(&self, level: usize) -> usize {
        self.state.read().levels.get(level).map_or(0, Vec::len)
    }

    /// Creation indexes of the tables at `level`, oldest first
    pub fn level_indexes(&self, level: usize) -> Vec<u64> {
        self.state
            .read()
            .levels
            .get(level)
            .map_or_else(Vec::new, |tables| tables.iter().map(|table| table.index()).collect())
    }

    /// Handles to the tables at `level`, oldest first
    pub fn level_tables(&self, level: usize) -> Vec<Arc<SSTable>> {
        self.state.read().levels.get(level).cloned().unwrap_or_default()
    }

    /// Live tables as recorded in the manifest
    pub fn live_tables(&self) -> Vec<TableId> {
        self.state.read().manifest.tables().to_vec()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn allocate_index(&self, level: usize) -> u64 {
        self.next_index[level].fetch_add(1, Ordering::SeqCst)
    }

    fn table_path(&self, id: &TableId) -> PathBuf {
        self.data_dir.join(id.file_name())
    }
}

/// Keep a level ordered by creation index
fn insert_by_index(level: &mut Vec<Arc<SSTable>>, table: Arc<SSTable>) {
    let position = level.partition_point(|existing| existing.index() < table.index());
    level.insert(position, table);
}

fn remove_outputs<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to remove compaction output {:?}: {}", path, e);
        }
    }
}
