//! Record definitions
//!
//! The unit of data shared by the memtable, the WAL and disk tables.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single key with its value or deletion marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Keys are ordered by their UTF-8 bytes
    pub key: String,

    /// `None` for tombstones
    pub value: Option<Vec<u8>>,

    /// Marks a logical deletion
    pub tombstone: bool,
}

impl Record {
    /// A live record holding `value`
    pub fn live(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            tombstone: false,
        }
    }

    /// A deletion marker for `key`
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            tombstone: true,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    /// Key length plus value length
    pub fn approximate_size(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }

    /// Serialize into the on-disk representation (bincode)
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes produced by [`Record::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Tri-state view of this record
    pub fn to_lookup(&self) -> Lookup {
        match (&self.value, self.tombstone) {
            (Some(value), false) => Lookup::Found(value.clone()),
            _ => Lookup::Deleted,
        }
    }
}

/// Outcome of a point lookup
///
/// I/O failures are reported through `Err`, never as `NotPresent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Key holds this value
    Found(Vec<u8>),

    /// Key was deleted (tombstone is authoritative)
    Deleted,

    /// No record for this key
    NotPresent,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_not_present(&self) -> bool {
        matches!(self, Lookup::NotPresent)
    }

    /// The value when found, `None` for both deleted and absent keys
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Deleted | Lookup::NotPresent => None,
        }
    }
}
