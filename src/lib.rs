//! # StrataKV
//!
//! An embedded, log-structured merge key-value storage engine with:
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with torn-write handling
//! - AVL-tree memtable (bounded latency under skewed keys)
//! - Immutable SSTables with a sparse index and fixed footer
//! - Ten size-tiered levels with newest-wins compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (AVL+RwLock)│
//!   └─────────────┘          └──────┬──────┘
//!                                   │ flush
//!                                   ▼
//!                           ┌───────────────┐
//!                           │ TableManager  │
//!                           │ L0 … L9       │
//!                           │ (compaction)  │
//!                           └───────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use stratakv::{Engine, Lookup};
//!
//! let engine = Engine::open_path(std::path::Path::new("./data")).unwrap();
//! engine.put("a", b"1").unwrap();
//! assert_eq!(engine.get("a").unwrap(), Lookup::Found(b"1".to_vec()));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod record;

pub mod engine;
pub mod memtable;
pub mod storage;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use engine::{Engine, EngineStats, MaintenanceHandle, MaintenanceReport};
pub use error::{Result, StrataError};
pub use record::{Lookup, Record};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
