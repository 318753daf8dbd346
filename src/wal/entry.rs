//! WAL frame definitions
//!
//! A frame is the on-disk form of one logged record.

use bytes::{BufMut, BytesMut};

use crate::error::Result;
use crate::record::Record;

/// Length prefix size: u64 little-endian
pub const HEADER_SIZE: usize = 8;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalFrame {
    /// Byte offset of the frame header within the log
    pub offset: u64,

    /// The logged record
    pub record: Record,
}

impl WalFrame {
    /// Encode `record` as `[len][payload]`
    pub fn encode(record: &Record) -> Result<BytesMut> {
        let payload = record.encode()?;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u64_le(payload.len() as u64);
        buf.put_slice(&payload);
        Ok(buf)
    }

    /// Total size on disk of a frame with this payload length
    pub fn encoded_len(payload_len: u64) -> u64 {
        HEADER_SIZE as u64 + payload_len
    }
}
