//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted record storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Region (dataLen bytes)                             │
//! │   bincode(Record) bincode(Record) ...                   │
//! │   (ascending key order, one record per key)             │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Region (indexLen bytes)                           │
//! │   bincode(BTreeMap<key, {start, len, deleted}>)         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (40 bytes, all i64 LE)                           │
//! │   version | dataStart | dataLen | indexStart | indexLen │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTable;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Current SSTable format version
pub(crate) const FORMAT_VERSION: i64 = 1;

/// Footer size: five i64 fields
pub(crate) const FOOTER_SIZE: u64 = 40;

// =============================================================================
// Index & Footer
// =============================================================================

/// Location of one record inside the data region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Offset relative to the data region start
    pub start: i64,
    /// Encoded record length
    pub len: i64,
    /// Record is a tombstone
    pub deleted: bool,
}

impl IndexEntry {
    /// Whether the entry lies inside a data region of `data_len` bytes
    pub fn fits_in(&self, data_len: i64) -> bool {
        self.start >= 0
            && self.len >= 0
            && matches!(self.start.checked_add(self.len), Some(end) if end <= data_len)
    }
}

/// Fixed-size trailer describing the two regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub version: i64,
    pub data_start: i64,
    pub data_len: i64,
    pub index_start: i64,
    pub index_len: i64,
}

impl Footer {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE as usize);
        buf.put_i64_le(self.version);
        buf.put_i64_le(self.data_start);
        buf.put_i64_le(self.data_len);
        buf.put_i64_le(self.index_start);
        buf.put_i64_le(self.index_len);
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() != FOOTER_SIZE as usize {
            return Err(StrataError::Corruption(format!(
                "footer must be {} bytes, got {}",
                FOOTER_SIZE,
                buf.len()
            )));
        }
        Ok(Self {
            version: buf.get_i64_le(),
            data_start: buf.get_i64_le(),
            data_len: buf.get_i64_le(),
            index_start: buf.get_i64_le(),
            index_len: buf.get_i64_le(),
        })
    }

    /// Check version and that both regions lie inside the file body
    pub fn validate(&self, file_size: u64) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(StrataError::Corruption(format!(
                "unsupported SSTable version: {}",
                self.version
            )));
        }
        let body = i64::try_from(file_size.saturating_sub(FOOTER_SIZE)).unwrap_or(i64::MAX);
        let fields = [self.data_start, self.data_len, self.index_start, self.index_len];
        let data_end = self.data_start.checked_add(self.data_len);
        let index_end = self.index_start.checked_add(self.index_len);
        let in_bounds = matches!(
            (data_end, index_end),
            (Some(data_end), Some(index_end)) if data_end <= self.index_start && index_end <= body
        );
        if fields.iter().any(|&v| v < 0) || !in_bounds {
            return Err(StrataError::Corruption(format!(
                "footer regions out of bounds: {:?} (file size {})",
                self, file_size
            )));
        }
        Ok(())
    }
}

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Summary of a freshly built SSTable
#[derive(Debug, Clone)]
pub struct SSTableMeta {
    /// Path the builder wrote to
    pub path: PathBuf,
    /// Number of records, tombstones included
    pub entry_count: u64,
    /// Number of tombstone records
    pub tombstone_count: u64,
    /// Smallest key
    pub min_key: Option<String>,
    /// Largest key
    pub max_key: Option<String>,
    /// Data region length in bytes
    pub data_len: u64,
    /// File size in bytes
    pub file_size: u64,
}
