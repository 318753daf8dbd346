//! Storage Module
//!
//! Persistent storage layer: leveled, immutable SSTables.
//!
//! ## Responsibilities
//! - Persist flushed memtables as level-0 SSTables
//! - Point lookups across levels with newest-wins precedence
//! - Size-triggered compaction into deeper levels
//! - Crash-safe table list via the manifest
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── MANIFEST          live (level, index) pairs
//!   ├── 0.4.db            level 0, creation index 4
//!   ├── 0.5.db
//!   └── 1.0.db
//! ```

pub mod compaction;
pub mod manifest;
mod manager;
pub mod sstable;

pub use compaction::{CompactionResult, MergeIterator};
pub use manager::{TableManager, LEVEL_COUNT, LEVEL_SIZE_MULTIPLIER};
pub use manifest::{Manifest, TableId};
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableMeta};
