//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track live entries for flush triggers
//! - Ordered snapshot for SSTable creation
//!
//! ## Data Structure Choice
//! An AVL tree wrapped in RwLock:
//! - Ordered keys (required for SSTable generation)
//! - O(log n) search and insert under any key distribution
//! - Deletes never unlink nodes; they leave a tombstone that the next flush
//!   must carry to disk

mod avl;
mod table;

pub use avl::AvlTree;
pub use table::MemTable;
