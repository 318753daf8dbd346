//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append a frame for every mutation before it becomes visible
//! - Replay frames into a fresh memtable on startup
//! - Discard a torn trailing frame left by a crash mid-write
//! - Reset to empty once the protected memtable is on disk
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────────┬───────────────────────┐ │
//! │ │ Len (8, LE) │ bincode(Record)       │ │
//! │ └─────────────┴───────────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────────┬───────────────────────┐ │
//! │ │ Len (8, LE) │ bincode(Record)       │ │
//! │ └─────────────┴───────────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{WalFrame, HEADER_SIZE};
pub use reader::{ReadOutcome, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::{LogFile, WalWriter};
