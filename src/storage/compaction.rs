//! Compaction
//!
//! K-way merge of the SSTables at one level into new SSTables one level
//! down.
//!
//! ## Merge rules
//! - Keys come out in ascending order, each exactly once
//! - For a key present in several inputs, the input with the highest
//!   creation index wins (same precedence as reads)
//! - Tombstones are dropped only when merging the deepest level; anywhere
//!   else they must survive to shadow older data further down

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::record::Record;

use super::manifest::TableId;
use super::sstable::{SSTable, SSTableBuilder, SSTableIterator};

/// Outcome of one compaction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Level whose tables were consumed
    pub source_level: usize,
    /// Level the output was written to (same as source for the deepest level)
    pub target_level: usize,
    /// Tables removed from the tree
    pub consumed: Vec<TableId>,
    /// Tables added to the tree
    pub produced: Vec<TableId>,
    /// Records written across all produced tables
    pub records_written: u64,
    /// Tombstones discarded because nothing deeper can hold the key
    pub tombstones_dropped: u64,
}

// =============================================================================
// Merge Iterator
// =============================================================================

/// Heap item: the current head record of one input
struct HeapEntry {
    record: Record,
    /// Input position; inputs are ordered oldest → newest
    source: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: smallest key first, then newest source
        other
            .record
            .key
            .cmp(&self.record.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Merges sorted record streams with newest-wins deduplication
pub struct MergeIterator<'a> {
    sources: Vec<SSTableIterator<'a>>,
    heap: BinaryHeap<HeapEntry>,
    drop_tombstones: bool,
    tombstones_dropped: u64,
}

impl<'a> MergeIterator<'a> {
    /// `tables` must be ordered oldest → newest
    pub fn new(tables: &'a [Arc<SSTable>], drop_tombstones: bool) -> Result<Self> {
        let mut merge = Self {
            sources: Vec::with_capacity(tables.len()),
            heap: BinaryHeap::with_capacity(tables.len()),
            drop_tombstones,
            tombstones_dropped: 0,
        };
        for table in tables {
            merge.sources.push(table.iter()?);
        }
        for source in 0..merge.sources.len() {
            merge.advance(source)?;
        }
        Ok(merge)
    }

    /// Tombstones skipped so far
    pub fn tombstones_dropped(&self) -> u64 {
        self.tombstones_dropped
    }

    /// Push the next record of `source` onto the heap
    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(next) = self.sources[source].next() {
            self.heap.push(HeapEntry {
                record: next?,
                source,
            });
        }
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let winner = match self.heap.pop() {
                Some(entry) => entry,
                None => return Ok(None),
            };
            self.advance(winner.source)?;

            // Older versions of the same key are shadowed
            while self
                .heap
                .peek()
                .is_some_and(|head| head.record.key == winner.record.key)
            {
                if let Some(shadowed) = self.heap.pop() {
                    self.advance(shadowed.source)?;
                }
            }

            if self.drop_tombstones && winner.record.tombstone {
                self.tombstones_dropped += 1;
                continue;
            }
            return Ok(Some(winner.record));
        }
    }
}

impl<'a> Iterator for MergeIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

// =============================================================================
// Output
// =============================================================================

/// A finished compaction output, renamed to its final name but not yet live
pub struct SinkOutput {
    pub id: TableId,
    pub path: PathBuf,
    pub entry_count: u64,
}

/// Writes merged records into size-bounded SSTables at one level
pub struct TableSink<F: FnMut() -> u64> {
    dir: PathBuf,
    level: usize,
    max_table_bytes: u64,
    next_index: F,
    current: Option<(TableId, PathBuf, SSTableBuilder)>,
    finished: Vec<SinkOutput>,
}

impl<F: FnMut() -> u64> TableSink<F> {
    /// `next_index` hands out creation indexes for `level`
    pub fn new(dir: &Path, level: usize, max_table_bytes: u64, next_index: F) -> Self {
        Self {
            dir: dir.to_path_buf(),
            level,
            max_table_bytes,
            next_index,
            current: None,
            finished: Vec::new(),
        }
    }

    pub fn add(&mut self, record: &Record) -> Result<()> {
        let record_len = bincode::serialized_size(record)?;
        let full = self.current.as_ref().is_some_and(|(_, _, builder)| {
            !builder.is_empty() && builder.data_len() + record_len > self.max_table_bytes
        });
        if full {
            self.finish_current()?;
        }

        if self.current.is_none() {
            let id = TableId::new(self.level, (self.next_index)());
            let tmp_path = self.dir.join(format!("{}.tmp", id.file_name()));
            let builder = SSTableBuilder::new(&tmp_path)?;
            self.current = Some((id, tmp_path, builder));
        }

        if let Some((_, _, builder)) = self.current.as_mut() {
            builder.add(record)?;
        }
        Ok(())
    }

    fn finish_current(&mut self) -> Result<()> {
        if let Some((id, tmp_path, builder)) = self.current.take() {
            let meta = builder.finish()?;
            let path = self.dir.join(id.file_name());
            fs::rename(&tmp_path, &path)?;
            self.finished.push(SinkOutput {
                id,
                path,
                entry_count: meta.entry_count,
            });
        }
        Ok(())
    }

    /// Finish the open table and return every output
    pub fn finish(mut self) -> Result<Vec<SinkOutput>> {
        self.finish_current()?;
        Ok(std::mem::take(&mut self.finished))
    }

    /// Remove every file written so far (used when the compaction fails)
    pub fn abandon(mut self) {
        let leftovers = self
            .finished
            .drain(..)
            .map(|output| output.path)
            .chain(self.current.take().map(|(_, tmp_path, _)| tmp_path));
        for path in leftovers {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to remove abandoned compaction output {:?}: {}", path, e);
            }
        }
    }
}
