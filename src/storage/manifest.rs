//! Manifest
//!
//! Durable list of live SSTables. A table file that exists on disk but is not
//! listed here (e.g. the output of a compaction that crashed before its swap)
//! is discarded on open.
//!
//! ## File Format
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ CRC32 (4)    │ bincode(ManifestData)    │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! Updates are written to `MANIFEST.tmp`, fsynced and renamed over
//! `MANIFEST`, so a reader always sees either the old or the new list.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// Placement of one SSTable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId {
    pub level: usize,
    pub index: u64,
}

impl TableId {
    pub fn new(level: usize, index: u64) -> Self {
        Self { level, index }
    }

    /// `<level>.<index>.db`
    pub fn file_name(&self) -> String {
        format!("{}.{}.db", self.level, self.index)
    }

    /// Parse "3.17.db" → TableId { level: 3, index: 17 }
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".db")?;
        let (level, index) = stem.split_once('.')?;
        Some(Self {
            level: level.parse().ok()?,
            index: index.parse().ok()?,
        })
    }
}

/// Persisted manifest contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestData {
    /// Incremented on every commit
    pub version: u64,
    /// Live tables, sorted
    pub tables: Vec<TableId>,
}

/// Handle to the manifest file in a data directory
#[derive(Debug)]
pub struct Manifest {
    dir: PathBuf,
    data: ManifestData,
}

impl Manifest {
    /// Load the manifest in `dir`; `Ok(None)` when none has been written yet
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        if bytes.len() < 4 {
            return Err(StrataError::Corruption(format!(
                "manifest {:?} is truncated",
                path
            )));
        }
        let (crc_bytes, payload) = bytes.split_at(4);
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(payload) != stored_crc {
            return Err(StrataError::Corruption(format!(
                "manifest {:?} checksum mismatch",
                path
            )));
        }

        let data: ManifestData = bincode::deserialize(payload)?;
        Ok(Some(Self {
            dir: dir.to_path_buf(),
            data,
        }))
    }

    /// Create a manifest listing `tables` and persist it
    pub fn create(dir: &Path, tables: Vec<TableId>) -> Result<Self> {
        let mut manifest = Self {
            dir: dir.to_path_buf(),
            data: ManifestData::default(),
        };
        manifest.commit(tables)?;
        Ok(manifest)
    }

    /// Atomically replace the live table list
    pub fn commit(&mut self, mut tables: Vec<TableId>) -> Result<()> {
        tables.sort();
        let next = ManifestData {
            version: self.data.version + 1,
            tables,
        };

        let payload = bincode::serialize(&next)?;
        let tmp_path = self.dir.join(MANIFEST_TMP_FILENAME);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, self.dir.join(MANIFEST_FILENAME))?;
        sync_dir(&self.dir)?;

        self.data = next;
        Ok(())
    }

    pub fn tables(&self) -> &[TableId] {
        &self.data.tables
    }

    pub fn version(&self) -> u64 {
        self.data.version
    }

    pub fn contains(&self, id: &TableId) -> bool {
        self.data.tables.binary_search(id).is_ok()
    }
}

/// fsync a directory so renames inside it are durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
