//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL into a memtable.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;
use crate::memtable::MemTable;
use crate::record::Record;

use super::{ReadOutcome, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of frames successfully applied
    pub entries_recovered: u64,

    /// Length of the valid frame prefix
    pub bytes_valid: u64,

    /// Whether a torn trailing frame was found (and, for `replay`, cut off)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Rebuild a memtable from the log at `path`
    ///
    /// Frames are applied in file order (`put` for live records, `delete`
    /// for tombstones), so the last frame for a key wins. A torn trailing
    /// frame ends replay and is cut from the file so later appends remain
    /// reachable. A missing file replays as an empty table.
    pub fn replay(path: &Path) -> Result<(MemTable, RecoveryResult)> {
        let memtable = MemTable::new();
        if !path.exists() {
            return Ok((
                memtable,
                RecoveryResult {
                    entries_recovered: 0,
                    bytes_valid: 0,
                    was_truncated: false,
                },
            ));
        }

        let result = Self::scan(path, |record| {
            memtable.absorb(std::iter::once(record));
        })?;

        if result.was_truncated {
            tracing::warn!(
                "WAL {:?} has a torn tail; truncating to {} bytes",
                path,
                result.bytes_valid
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.bytes_valid)?;
            file.sync_all()?;
        }

        tracing::debug!(
            "Replayed {} WAL entries from {:?}",
            result.entries_recovered,
            path
        );
        Ok((memtable, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path, |_| {})
    }

    fn scan(path: &Path, mut apply: impl FnMut(Record)) -> Result<RecoveryResult> {
        let mut reader = WalReader::open(path)?;
        let mut entries_recovered = 0;

        loop {
            match reader.next_frame()? {
                ReadOutcome::Frame(frame) => {
                    apply(frame.record);
                    entries_recovered += 1;
                }
                ReadOutcome::End => {
                    return Ok(RecoveryResult {
                        entries_recovered,
                        bytes_valid: reader.position(),
                        was_truncated: false,
                    });
                }
                ReadOutcome::Truncated { offset } => {
                    return Ok(RecoveryResult {
                        entries_recovered,
                        bytes_valid: offset,
                        was_truncated: true,
                    });
                }
            }
        }
    }
}
