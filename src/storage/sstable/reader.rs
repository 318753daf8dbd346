//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, StrataError};
use crate::record::{Lookup, Record};

use super::iterator::SSTableIterator;
use super::{Footer, IndexEntry, FOOTER_SIZE};

/// An open, immutable SSTable
///
/// ## Concurrency:
/// - `file`: one handle shared by lookups, locked for each seek + read
/// - the index is immutable after open and read without locking
pub struct SSTable {
    path: PathBuf,
    level: usize,
    index: u64,
    /// File handle for point lookups
    file: Mutex<BufReader<File>>,
    footer: Footer,
    /// Sparse index: key → location in data region
    sparse_index: BTreeMap<String, IndexEntry>,
    /// Keys in ascending order, for binary search
    sorted_keys: Vec<String>,
    file_size: u64,
    /// Set once compacted away; the file is removed on drop
    obsolete: AtomicBool,
}

impl SSTable {
    /// Open an SSTable for reading
    ///
    /// Reads the footer from the end of the file, then loads the whole
    /// index region into memory.
    pub fn open(path: &Path, level: usize, index: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE {
            return Err(StrataError::Corruption(format!(
                "{:?} is too small to be an SSTable ({} bytes)",
                path, file_size
            )));
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_bytes = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_bytes)?;
        let footer = Footer::decode(&footer_bytes)?;
        footer.validate(file_size)?;

        file.seek(SeekFrom::Start(footer.index_start as u64))?;
        let mut index_bytes = vec![0u8; footer.index_len as usize];
        file.read_exact(&mut index_bytes)?;
        let sparse_index: BTreeMap<String, IndexEntry> = bincode::deserialize(&index_bytes)?;
        if let Some((key, entry)) = sparse_index
            .iter()
            .find(|(_, entry)| !entry.fits_in(footer.data_len))
        {
            return Err(StrataError::Corruption(format!(
                "{:?}: index entry for {:?} ({:?}) lies outside the data region of {} bytes",
                path, key, entry, footer.data_len
            )));
        }

        let mut sorted_keys: Vec<String> = sparse_index.keys().cloned().collect();
        sorted_keys.sort();

        Ok(Self {
            path: path.to_path_buf(),
            level,
            index,
            file: Mutex::new(BufReader::new(file)),
            footer,
            sparse_index,
            sorted_keys,
            file_size,
            obsolete: AtomicBool::new(false),
        })
    }

    /// Look up a key
    ///
    /// Tombstones are answered from the index alone. Seek, read or decode
    /// failures surface as `Err`.
    pub fn search(&self, key: &str) -> Result<Lookup> {
        if self
            .sorted_keys
            .binary_search_by(|probe| probe.as_str().cmp(key))
            .is_err()
        {
            return Ok(Lookup::NotPresent);
        }

        let entry = self.sparse_index.get(key).ok_or_else(|| {
            StrataError::Corruption(format!("{:?}: key {:?} missing from index", self.path, key))
        })?;
        if entry.deleted {
            return Ok(Lookup::Deleted);
        }

        let record = self.read_record(entry)?;
        if record.key != key {
            return Err(StrataError::Corruption(format!(
                "{:?}: index points at {:?} for key {:?}",
                self.path, record.key, key
            )));
        }
        Ok(record.to_lookup())
    }

    fn read_record(&self, entry: &IndexEntry) -> Result<Record> {
        let mut buf = vec![0u8; entry.len as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start((self.footer.data_start + entry.start) as u64))?;
            file.read_exact(&mut buf)?;
        }
        Record::decode(&buf)
    }

    /// Stream every record in key order through a separate file handle
    pub fn iter(&self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(self)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Creation index within the level
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn entry_count(&self) -> usize {
        self.sorted_keys.len()
    }

    pub fn min_key(&self) -> Option<&str> {
        self.sorted_keys.first().map(String::as_str)
    }

    pub fn max_key(&self) -> Option<&str> {
        self.sorted_keys.last().map(String::as_str)
    }

    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &str) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    pub(super) fn sorted_keys(&self) -> &[String] {
        &self.sorted_keys
    }

    pub(super) fn index_entry(&self, key: &str) -> Option<&IndexEntry> {
        self.sparse_index.get(key)
    }

    /// Delete the backing file once the last handle is dropped
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::SeqCst);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::SeqCst)
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if self.is_obsolete() {
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!("Removed obsolete SSTable {:?}", self.path),
                Err(e) => tracing::warn!("Failed to remove obsolete SSTable {:?}: {}", self.path, e),
            }
        }
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("index", &self.index)
            .field("entries", &self.sorted_keys.len())
            .field("file_size", &self.file_size)
            .finish()
    }
}
