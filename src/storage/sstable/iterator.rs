//! SSTable Iterator
//!
//! Sequential iteration over all records in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{Result, StrataError};
use crate::record::Record;

use super::SSTable;

/// Iterator over SSTable records in sorted key order
///
/// Owns its own file handle so a long scan never holds the table's lookup
/// lock.
pub struct SSTableIterator<'a> {
    table: &'a SSTable,
    file: BufReader<File>,
    /// Next key position in the table's sorted key array
    position: usize,
    /// Current offset within the data region
    data_offset: i64,
}

impl<'a> SSTableIterator<'a> {
    pub(super) fn new(table: &'a SSTable) -> Result<Self> {
        let mut file = BufReader::new(File::open(table.path())?);
        let data_start = table.footer().data_start;
        file.seek(SeekFrom::Start(data_start as u64))?;
        Ok(Self {
            table,
            file,
            position: 0,
            data_offset: 0,
        })
    }

    fn read_next(&mut self, key: &str) -> Result<Record> {
        let entry = *self.table.index_entry(key).ok_or_else(|| {
            StrataError::Corruption(format!(
                "{:?}: key {:?} missing from index",
                self.table.path(),
                key
            ))
        })?;

        // Records are laid out in key order; only reposition if they are not
        if entry.start != self.data_offset {
            let data_start = self.table.footer().data_start;
            self.file.seek(SeekFrom::Start((data_start + entry.start) as u64))?;
        }

        let mut buf = vec![0u8; entry.len as usize];
        self.file.read_exact(&mut buf)?;
        self.data_offset = entry.start + entry.len;

        let record = Record::decode(&buf)?;
        if record.key != key || record.tombstone != entry.deleted {
            return Err(StrataError::Corruption(format!(
                "{:?}: record at offset {} does not match index entry for {:?}",
                self.table.path(),
                entry.start,
                key
            )));
        }
        Ok(record)
    }
}

impl<'a> Iterator for SSTableIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.table;
        let key = table.sorted_keys().get(self.position)?;
        self.position += 1;
        Some(self.read_next(key))
    }
}
