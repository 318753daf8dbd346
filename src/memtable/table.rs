//! MemTable implementation
//!
//! AVL-tree memtable with RwLock for concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::record::{Lookup, Record};

use super::AvlTree;

/// In-memory table for recent writes
///
/// ## Concurrency:
/// - `tree`: reads take the shared lock, mutations and the flush snapshot
///   take the exclusive lock
/// - counters are only written while the exclusive lock is held
pub struct MemTable {
    tree: RwLock<AvlTree>,

    /// Live (non-tombstone) entries
    live_count: AtomicUsize,

    /// Sum of key and value lengths, tombstones included
    approximate_bytes: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(AvlTree::new()),
            live_count: AtomicUsize::new(0),
            approximate_bytes: AtomicUsize::new(0),
        }
    }

    /// Look up a key (shared lock)
    pub fn get(&self, key: &str) -> Lookup {
        let tree = self.tree.read();
        match tree.get(key) {
            Some(record) => record.to_lookup(),
            None => Lookup::NotPresent,
        }
    }

    /// Insert or overwrite a key (exclusive lock)
    ///
    /// Returns the previous live record, if any.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Option<Record> {
        let record = Record::live(key, value);
        let added_bytes = record.approximate_size();

        let mut tree = self.tree.write();
        match tree.get_mut(&record.key) {
            Some(existing) => {
                let previous = std::mem::replace(existing, record);
                self.approximate_bytes.fetch_add(added_bytes, Ordering::Relaxed);
                self.approximate_bytes
                    .fetch_sub(previous.approximate_size(), Ordering::Relaxed);
                if previous.is_tombstone() {
                    self.live_count.fetch_add(1, Ordering::Relaxed);
                    None
                } else {
                    Some(previous)
                }
            }
            None => {
                tree.insert(record);
                self.approximate_bytes.fetch_add(added_bytes, Ordering::Relaxed);
                self.live_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Delete a key (exclusive lock)
    ///
    /// - live key: becomes a tombstone, the prior record is returned
    /// - already a tombstone: no-op, returns `None`
    /// - absent: a tombstone placeholder is inserted so the next flush still
    ///   shadows older tables, returns `None`
    pub fn delete(&self, key: impl Into<String>) -> Option<Record> {
        let key = key.into();

        let mut tree = self.tree.write();
        match tree.get_mut(&key) {
            Some(existing) if existing.is_tombstone() => None,
            Some(existing) => {
                let previous = std::mem::replace(existing, Record::tombstone(key));
                let value_len = previous.value.as_ref().map_or(0, Vec::len);
                self.approximate_bytes.fetch_sub(value_len, Ordering::Relaxed);
                self.live_count.fetch_sub(1, Ordering::Relaxed);
                Some(previous)
            }
            None => {
                self.approximate_bytes.fetch_add(key.len(), Ordering::Relaxed);
                tree.insert(Record::tombstone(key));
                None
            }
        }
    }

    /// Number of live (non-tombstone) entries
    pub fn size(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }

    /// Number of entries including tombstones
    pub fn entry_count(&self) -> usize {
        self.tree.read().len()
    }

    /// Approximate payload size in bytes
    pub fn approximate_bytes(&self) -> usize {
        self.approximate_bytes.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    /// Detach the current tree and install an empty one, returning every
    /// record (tombstones included) in ascending key order.
    ///
    /// The swap happens under the exclusive lock; the traversal of the
    /// detached tree happens after the lock is released.
    pub fn snapshot_and_clear(&self) -> Vec<Record> {
        let detached = {
            let mut tree = self.tree.write();
            self.live_count.store(0, Ordering::Relaxed);
            self.approximate_bytes.store(0, Ordering::Relaxed);
            std::mem::take(&mut *tree)
        };
        detached.into_records()
    }

    /// Copy of every record in ascending key order, leaving the table intact
    pub fn records(&self) -> Vec<Record> {
        self.tree.read().records()
    }

    /// Re-apply records in order (live → put, tombstone → delete)
    pub fn absorb(&self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            match record.value {
                Some(value) if !record.tombstone => {
                    self.put(record.key, value);
                }
                _ => {
                    self.delete(record.key);
                }
            }
        }
    }

    /// Whether the underlying tree satisfies the AVL invariant
    pub fn is_balanced(&self) -> bool {
        self.tree.read().is_balanced()
    }

    /// Height of the underlying tree
    pub fn height(&self) -> i32 {
        self.tree.read().height()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
