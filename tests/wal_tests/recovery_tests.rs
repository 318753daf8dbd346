//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Replay of a clean WAL into a memtable
//! - Last frame per key wins
//! - Torn trailing frames are discarded and cut from the file
//! - Corruption in the middle of the log is an error
//! - Replay idempotence

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use stratakv::config::WalSyncStrategy;
use stratakv::wal::{WalRecovery, WalWriter, HEADER_SIZE};
use stratakv::{Lookup, Record, StrataError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("wal.log");
    (temp_dir, wal_path)
}

/// Write records using WalWriter (produces a well-formed WAL)
fn write_records(path: &Path, records: &[Record]) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for record in records {
        writer.write(record).unwrap();
    }
}

/// Append raw bytes to the end of the file
fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

fn numbered_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::live(format!("key{}", i), format!("value{}", i).into_bytes()))
        .collect()
}

// =============================================================================
// Replay: Clean WAL Tests
// =============================================================================

#[test]
fn test_replay_missing_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert!(memtable.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_replay_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    fs::File::create(&wal_path).unwrap();

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert!(memtable.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.bytes_valid, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_replay_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(10));

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 10);
    assert_eq!(memtable.size(), 10);
    for i in 0..10 {
        assert_eq!(
            memtable.get(&format!("key{}", i)),
            Lookup::Found(format!("value{}", i).into_bytes())
        );
    }
}

#[test]
fn test_replay_last_entry_wins() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(
        &wal_path,
        &[
            Record::live("k1", b"v1".to_vec()),
            Record::tombstone("k1"),
            Record::live("k2", b"old".to_vec()),
            Record::live("k2", b"new".to_vec()),
            Record::tombstone("k3"),
        ],
    );

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 5);
    assert_eq!(memtable.get("k1"), Lookup::Deleted);
    assert_eq!(memtable.get("k2"), Lookup::Found(b"new".to_vec()));
    assert_eq!(memtable.get("k3"), Lookup::Deleted);
}

#[test]
fn test_replay_is_idempotent() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut records = numbered_records(20);
    records.push(Record::tombstone("key3"));
    records.push(Record::live("key5", b"rewritten".to_vec()));
    write_records(&wal_path, &records);

    let (first, _) = WalRecovery::replay(&wal_path).unwrap();
    let (second, _) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(first.records(), second.records());
    assert_eq!(first.size(), second.size());
}

// =============================================================================
// Replay: Torn Tail Tests (was_truncated = true)
// =============================================================================

#[test]
fn test_partial_header_is_discarded() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(3));
    let valid_len = fs::metadata(&wal_path).unwrap().len();

    append_raw(&wal_path, &[0x05, 0x00, 0x00]); // 3 of 8 header bytes

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(memtable.size(), 3);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_valid, valid_len);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), valid_len);
}

#[test]
fn test_declared_length_past_eof_is_discarded() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(2));
    let valid_len = fs::metadata(&wal_path).unwrap().len();

    // Header promises 100 bytes, only 10 follow
    let mut torn = 100u64.to_le_bytes().to_vec();
    torn.extend_from_slice(&[0xAB; 10]);
    append_raw(&wal_path, &torn);

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(memtable.size(), 2);
    assert_eq!(result.entries_recovered, 2);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), valid_len);
}

#[test]
fn test_truncated_real_frame_is_discarded() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(4));

    // Chop the last frame in half
    let full_len = fs::metadata(&wal_path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(full_len - 5).unwrap();

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(result.was_truncated);
    assert_eq!(memtable.get("key3"), Lookup::NotPresent);
}

#[test]
fn test_undecodable_final_frame_is_treated_as_torn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(2));

    // Zero-filled frame, as left by a filesystem that extended the file
    let mut torn = 4u64.to_le_bytes().to_vec();
    torn.extend_from_slice(&[0u8; 4]);
    append_raw(&wal_path, &torn);

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert_eq!(memtable.size(), 2);
    assert!(result.was_truncated);
}

#[test]
fn test_appends_after_torn_tail_are_replayed() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(2));
    append_raw(&wal_path, &[0xFF; 5]);

    WalRecovery::replay(&wal_path).unwrap();
    write_records(&wal_path, &[Record::live("after", b"crash".to_vec())]);

    let (memtable, result) = WalRecovery::replay(&wal_path).unwrap();

    assert!(!result.was_truncated);
    assert_eq!(memtable.get("after"), Lookup::Found(b"crash".to_vec()));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupted_middle_frame_is_an_error() {
    let (_temp, wal_path) = setup_temp_wal();

    // A complete but undecodable frame followed by a valid one
    let mut garbage = 4u64.to_le_bytes().to_vec();
    garbage.extend_from_slice(&[0u8; 4]);
    fs::write(&wal_path, &garbage).unwrap();
    write_records(&wal_path, &numbered_records(1));

    let result = WalRecovery::replay(&wal_path);

    assert!(matches!(result, Err(StrataError::WalCorruption(_))));
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_records(&wal_path, &numbered_records(3));
    append_raw(&wal_path, &[0x01; HEADER_SIZE - 1]);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}
