//! SSTable Builder
//!
//! Writes sorted records to a new SSTable file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};
use crate::record::Record;

use super::{Footer, IndexEntry, SSTableMeta, FORMAT_VERSION};

/// Builder for creating new SSTables from sorted records
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Bytes written to the data region so far
    data_len: u64,
    /// Index: key → location in data region
    index: BTreeMap<String, IndexEntry>,
    /// Last key accepted, for order checks
    last_key: Option<String>,
    tombstone_count: u64,
}

impl SSTableBuilder {
    /// Create a new SSTable builder, truncating any file at `path`
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            data_len: 0,
            index: BTreeMap::new(),
            last_key: None,
            tombstone_count: 0,
        })
    }

    /// Append a record; keys must be strictly ascending
    ///
    /// A key equal to the previous one is ignored and `Ok(false)` returned,
    /// the first record for a key stays authoritative.
    pub fn add(&mut self, record: &Record) -> Result<bool> {
        if let Some(last) = &self.last_key {
            if record.key == *last {
                tracing::debug!("Skipping duplicate key {:?} in {:?}", record.key, self.path);
                return Ok(false);
            }
            if record.key < *last {
                return Err(StrataError::Storage(format!(
                    "keys out of order: {:?} after {:?}",
                    record.key, last
                )));
            }
        }

        let encoded = record.encode()?;
        self.writer.write_all(&encoded)?;

        self.index.insert(
            record.key.clone(),
            IndexEntry {
                start: self.data_len as i64,
                len: encoded.len() as i64,
                deleted: record.tombstone,
            },
        );
        if record.tombstone {
            self.tombstone_count += 1;
        }
        self.data_len += encoded.len() as u64;
        self.last_key = Some(record.key.clone());
        Ok(true)
    }

    /// Bytes in the data region so far
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Records accepted so far
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Finish building: write index region, footer, fsync
    pub fn finish(mut self) -> Result<SSTableMeta> {
        let index_bytes = bincode::serialize(&self.index)?;
        self.writer.write_all(&index_bytes)?;

        let footer = Footer {
            version: FORMAT_VERSION,
            data_start: 0,
            data_len: self.data_len as i64,
            index_start: self.data_len as i64,
            index_len: index_bytes.len() as i64,
        };
        self.writer.write_all(&footer.encode())?;
        self.writer.flush()?;

        let file = self.writer.into_inner().map_err(|e| {
            StrataError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();

        Ok(SSTableMeta {
            path: self.path,
            entry_count: self.index.len() as u64,
            tombstone_count: self.tombstone_count,
            min_key: self.index.keys().next().cloned(),
            max_key: self.last_key,
            data_len: self.data_len,
            file_size,
        })
    }
}
