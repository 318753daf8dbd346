//! WAL Writer
//!
//! Handles appending frames to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, StrataError};
use crate::record::Record;

use super::WalFrame;

/// File operations the writer relies on
///
/// Implemented for [`File`]. Writes must land at the end of the file, so a
/// `File` is opened in append mode.
pub trait LogFile: Write {
    /// Current length in bytes
    fn file_len(&self) -> io::Result<u64>;

    /// Cut or extend the file to `len` bytes
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    /// Flush contents and size to stable storage
    fn sync_contents(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn file_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync_contents(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Writes frames to the WAL file
///
/// Exclusive access is required for `write` and `reset`; the engine wraps the
/// writer in a mutex.
///
/// A failed append is cut back off the file before the error is returned, so
/// the log only ever holds whole frames for acknowledged writes. If that
/// rollback fails too, the writer refuses every further append until a
/// successful `reset`.
pub struct WalWriter<F: LogFile = File> {
    path: PathBuf,
    file: F,
    sync_strategy: WalSyncStrategy,
    /// Length of the log up to the last acknowledged frame
    offset: u64,
    /// Frames appended since the last fsync
    unsynced: usize,
    /// Frames appended since open or the last reset
    entries_written: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file in append mode
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Self::with_file(path, file, sync_strategy)
    }
}

impl<F: LogFile> WalWriter<F> {
    /// Wrap an already open log file
    ///
    /// `path` is only used for reporting.
    pub fn with_file(path: &Path, file: F, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let offset = file.file_len()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            sync_strategy,
            offset,
            unsynced: 0,
            entries_written: 0,
            poisoned: false,
        })
    }

    /// Append a record to the tail of the log
    ///
    /// With `EveryWrite` the frame is on stable storage when this returns.
    /// On error the log is left as it was before the call; nothing is retried.
    pub fn write(&mut self, record: &Record) -> Result<()> {
        if self.poisoned {
            return Err(StrataError::Storage(format!(
                "WAL at {:?} rejected write: an earlier failed append could not be rolled back",
                self.path
            )));
        }

        let frame = WalFrame::encode(record)?;
        if let Err(e) = self.append(&frame) {
            self.rollback();
            return Err(e.into());
        }

        self.offset += frame.len() as u64;
        self.entries_written += 1;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_contents()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Truncate the log to empty in place
    ///
    /// Only valid once every logged record is durable in a disk table. If the
    /// truncation fails the log and the writer are unchanged. A successful
    /// reset also clears a poisoned writer.
    pub fn reset(&mut self) -> Result<()> {
        tracing::debug!("Resetting WAL at {:?}", self.path);
        self.file.truncate_to(0)?;
        self.offset = 0;
        self.unsynced = 0;
        self.entries_written = 0;
        self.poisoned = false;
        self.file.sync_contents()?;
        Ok(())
    }

    /// Frames appended since open or the last reset
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Current length of the log file
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.file_len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether appends are refused after a failed rollback
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)?;

        let sync_due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count,
        };
        if sync_due {
            self.file.sync_contents()?;
            self.unsynced = 0;
        } else {
            self.unsynced += 1;
        }
        Ok(())
    }

    /// Cut the file back to the last acknowledged frame
    fn rollback(&mut self) {
        let restored = match self.file.truncate_to(self.offset) {
            Ok(()) => self.file.sync_contents(),
            Err(e) => Err(e),
        };
        match restored {
            Ok(()) => {
                tracing::warn!(
                    "Rolled back failed WAL append at {:?}, offset {}",
                    self.path,
                    self.offset
                );
            }
            Err(e) => {
                tracing::error!(
                    "Could not roll back failed WAL append at {:?}: {}; refusing further writes",
                    self.path,
                    e
                );
                self.poisoned = true;
            }
        }
    }
}
