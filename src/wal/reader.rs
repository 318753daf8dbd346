//! WAL Reader
//!
//! Sequential frame reader over a WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, StrataError};
use crate::record::Record;

use super::{WalFrame, HEADER_SIZE};

/// What the reader found at its current position
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete, decodable frame
    Frame(WalFrame),

    /// Clean end of file
    End,

    /// A torn frame starts at `offset`; everything from there is unusable
    Truncated { offset: u64 },
}

/// Reads frames from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next unread frame
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next frame
    ///
    /// A frame whose header or declared payload runs past EOF is reported as
    /// `Truncated`. A complete frame that fails to decode is `Truncated` only
    /// when it is the last frame in the file; earlier ones are corruption.
    pub fn next_frame(&mut self) -> Result<ReadOutcome> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(ReadOutcome::End);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(ReadOutcome::Truncated {
                offset: self.position,
            });
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let payload_len = u64::from_le_bytes(header);

        if payload_len > remaining - HEADER_SIZE as u64 {
            return Ok(ReadOutcome::Truncated {
                offset: self.position,
            });
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;

        let offset = self.position;
        let frame_end = offset + WalFrame::encoded_len(payload_len);

        match Record::decode(&payload) {
            Ok(record) => {
                self.position = frame_end;
                Ok(ReadOutcome::Frame(WalFrame { offset, record }))
            }
            Err(_) if frame_end == self.file_len => Ok(ReadOutcome::Truncated { offset }),
            Err(e) => Err(StrataError::WalCorruption(format!(
                "undecodable frame at offset {}: {}",
                offset, e
            ))),
        }
    }

    /// Offset just past the last frame successfully read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the file when it was opened
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Iterate over all complete frames, stopping silently at a torn tail
    pub fn frames(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL frames
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_frame() {
            Ok(ReadOutcome::Frame(frame)) => Some(Ok(frame)),
            Ok(ReadOutcome::End) | Ok(ReadOutcome::Truncated { .. }) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
