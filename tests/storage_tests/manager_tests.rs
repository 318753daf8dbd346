//! Tests for TableManager
//!
//! These tests verify:
//! - Opening/creating storage directories
//! - Flushing sorted records to level-0 SSTables
//! - Newest-wins search across tables and levels
//! - Tombstone handling across SSTables
//! - Persistence (restart and rediscover SSTables)
//! - Cleanup of files not recorded as live

use std::fs;
use std::path::{Path, PathBuf};

use stratakv::storage::{Manifest, TableId, TableManager, LEVEL_COUNT};
use stratakv::{Lookup, Record, StrataError};
use tempfile::TempDir;

const LEVEL0_SIZE: u64 = 1024 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_storage() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn live(key: &str, value: &str) -> Record {
    Record::live(key, value.as_bytes().to_vec())
}

fn table_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".db"))
        .collect();
    names.sort();
    names
}

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("storage");

    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    assert!(path.is_dir());
    assert_eq!(manager.table_count(), 0);
    assert_eq!(manager.data_dir(), path.as_path());
}

#[test]
fn test_level_budgets_grow_tenfold() {
    let (_temp, path) = setup_temp_storage();

    let manager = TableManager::open(&path, 1000).unwrap();

    assert_eq!(manager.level_max_size(0), 1000);
    for level in 1..LEVEL_COUNT {
        assert_eq!(
            manager.level_max_size(level),
            manager.level_max_size(level - 1) * 10
        );
    }
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_creates_level0_table() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    let meta = manager
        .flush(&[live("a", "1"), live("b", "2")])
        .unwrap()
        .unwrap();

    assert_eq!(meta.entry_count, 2);
    assert_eq!(meta.path, path.join("0.0.db"));
    assert_eq!(manager.level_table_count(0), 1);
    assert_eq!(table_files(&path), vec!["0.0.db"]);
    assert!(manager.level_size(0) > 0);
}

#[test]
fn test_flush_empty_input_writes_nothing() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    assert!(manager.flush(&[]).unwrap().is_none());
    assert_eq!(manager.table_count(), 0);
    assert!(table_files(&path).is_empty());
}

#[test]
fn test_flush_indexes_are_sequential() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    for i in 0..3 {
        manager.flush(&[live(&format!("k{}", i), "v")]).unwrap();
    }

    assert_eq!(manager.level_indexes(0), vec![0, 1, 2]);
    assert_eq!(table_files(&path), vec!["0.0.db", "0.1.db", "0.2.db"]);
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_search_empty_storage() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    assert_eq!(manager.search("anything").unwrap(), Lookup::NotPresent);
}

#[test]
fn test_newer_table_wins_within_level() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    manager.flush(&[live("k", "old"), live("only_old", "x")]).unwrap();
    manager.flush(&[live("k", "new")]).unwrap();

    assert_eq!(manager.search("k").unwrap(), Lookup::Found(b"new".to_vec()));
    assert_eq!(
        manager.search("only_old").unwrap(),
        Lookup::Found(b"x".to_vec())
    );
}

#[test]
fn test_tombstone_shadows_older_value() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    manager.flush(&[live("k", "v")]).unwrap();
    manager.flush(&[Record::tombstone("k")]).unwrap();

    assert_eq!(manager.search("k").unwrap(), Lookup::Deleted);
}

#[test]
fn test_lower_level_wins_over_deeper_level() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    manager.flush(&[live("k", "deep")]).unwrap();
    manager.compact(0).unwrap().unwrap();
    assert_eq!(manager.level_table_count(1), 1);

    manager.flush(&[live("k", "shallow")]).unwrap();

    assert_eq!(
        manager.search("k").unwrap(),
        Lookup::Found(b"shallow".to_vec())
    );
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_tables_survive_reopen() {
    let (_temp, path) = setup_temp_storage();
    {
        let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();
        manager.flush(&[live("a", "1")]).unwrap();
        manager.flush(&[live("a", "2"), live("b", "3")]).unwrap();
        manager.compact(0).unwrap();
        manager.flush(&[Record::tombstone("b")]).unwrap();
    }

    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    assert_eq!(manager.level_table_count(0), 1);
    assert_eq!(manager.level_table_count(1), 1);
    assert_eq!(manager.search("a").unwrap(), Lookup::Found(b"2".to_vec()));
    assert_eq!(manager.search("b").unwrap(), Lookup::Deleted);
}

#[test]
fn test_reopen_continues_index_sequence() {
    let (_temp, path) = setup_temp_storage();
    {
        let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();
        manager.flush(&[live("a", "1")]).unwrap();
        manager.flush(&[live("b", "2")]).unwrap();
    }

    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();
    manager.flush(&[live("a", "3")]).unwrap();

    assert_eq!(manager.level_indexes(0), vec![0, 1, 2]);
    assert_eq!(manager.search("a").unwrap(), Lookup::Found(b"3".to_vec()));
}

#[test]
fn test_open_without_manifest_adopts_table_files() {
    let (_temp, path) = setup_temp_storage();
    {
        let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();
        manager.flush(&[live("a", "1")]).unwrap();
        manager.flush(&[live("a", "2")]).unwrap();
    }
    fs::remove_file(path.join("MANIFEST")).unwrap();

    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    assert_eq!(manager.level_table_count(0), 2);
    assert_eq!(manager.search("a").unwrap(), Lookup::Found(b"2".to_vec()));
    assert!(path.join("MANIFEST").exists());
}

#[test]
fn test_open_removes_unlisted_and_temporary_files() {
    let (_temp, path) = setup_temp_storage();
    {
        let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();
        manager.flush(&[live("a", "1")]).unwrap();
    }
    // A compaction output that never made it into the manifest
    fs::copy(path.join("0.0.db"), path.join("1.0.db")).unwrap();
    fs::write(path.join("0.1.db.tmp"), b"partial").unwrap();

    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    assert_eq!(manager.table_count(), 1);
    assert_eq!(table_files(&path), vec!["0.0.db"]);
    assert!(!path.join("0.1.db.tmp").exists());
}

#[test]
fn test_open_fails_when_listed_table_is_missing() {
    let (_temp, path) = setup_temp_storage();
    {
        let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();
        manager.flush(&[live("a", "1")]).unwrap();
    }
    fs::remove_file(path.join("0.0.db")).unwrap();

    let result = TableManager::open(&path, LEVEL0_SIZE);

    assert!(matches!(result, Err(StrataError::Corruption(_))));
}

#[test]
fn test_manifest_tracks_live_tables() {
    let (_temp, path) = setup_temp_storage();
    let manager = TableManager::open(&path, LEVEL0_SIZE).unwrap();

    manager.flush(&[live("a", "1")]).unwrap();
    manager.flush(&[live("b", "2")]).unwrap();
    manager.compact(0).unwrap();

    let manifest = Manifest::load(&path).unwrap().unwrap();
    assert_eq!(manifest.tables(), &[TableId::new(1, 0)]);
    assert_eq!(manager.live_tables(), vec![TableId::new(1, 0)]);
}
