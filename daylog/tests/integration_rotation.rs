//! Integration tests for pool initialization, daily rotation and restarts.
//!
//! Day boundaries are simulated with `ManualDate`; rotation state is kept in
//! a `JsonFileStore` so restarts go through the same file a real embedder
//! would use.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use daylog::state::keys;
use daylog::{
    FilePoolManager, JsonFileStore, KeyValueStore, LogRecord, ManualDate, PoolConfig, Severity,
    SlotStatus,
};
use tempfile::tempdir;

fn start_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 9, 30).unwrap()
}

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap()
}

fn warning(body: &str) -> LogRecord {
    LogRecord::new(Severity::Warn, epoch(), "file", "function", 1, body)
}

fn open(root: &Path, pool_size: usize, dates: &Arc<ManualDate>) -> FilePoolManager {
    let store = JsonFileStore::open(root.join("state.json")).unwrap();
    FilePoolManager::open(
        PoolConfig::new(root.join("logs"), pool_size),
        store,
        dates.clone(),
    )
    .unwrap()
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_initialization_of_fresh_location() {
    let temp_dir = tempdir().unwrap();
    let dates = Arc::new(ManualDate::new(start_day()));

    let pool = open(temp_dir.path(), 3, &dates);

    let log_dir = temp_dir.path().join("logs");
    assert!(log_dir.is_dir());
    assert_eq!(count_files(&log_dir), 0);
    assert_eq!(pool.directory(), log_dir);

    let store = JsonFileStore::open(temp_dir.path().join("state.json")).unwrap();
    assert_eq!(
        store.get(keys::CURRENT_LOG_FILE_NUMBER).unwrap().as_deref(),
        Some("0")
    );
    assert_eq!(
        store.get(keys::DATE_OF_LAST_LOG).unwrap().as_deref(),
        Some("2021-09-30")
    );
    assert_eq!(
        store.get(keys::NUM_OF_LOG_FILES).unwrap().as_deref(),
        Some("3")
    );
    assert_eq!(
        store.get(keys::LOG_DIR).unwrap(),
        Some(log_dir.to_string_lossy().into_owned())
    );
}

#[test]
fn test_file_rotation() {
    let temp_dir = tempdir().unwrap();
    let dates = Arc::new(ManualDate::new(start_day()));
    let pool = open(temp_dir.path(), 3, &dates);
    let log_dir = temp_dir.path().join("logs");

    // Day 1 == file 0, day 2 == file 1, day 3 == file 2, day 4 == file 0
    for expected in [0usize, 1, 2, 0] {
        pool.append_record(&warning("Warning message")).unwrap();

        assert_eq!(pool.active_slot(), expected);
        assert_eq!(
            pool.current_slot_path(),
            log_dir.join(format!("{expected}.log"))
        );
        assert!(count_files(&log_dir) <= 3);

        dates.advance_days(1);
    }

    assert_eq!(count_files(&log_dir), 3);
}

#[test]
fn test_single_logging_file() {
    let temp_dir = tempdir().unwrap();
    let dates = Arc::new(ManualDate::new(start_day()));
    let pool = open(temp_dir.path(), 3, &dates);

    let first = LogRecord::new(Severity::Info, epoch(), "file", "function", 1, "Error message");
    let second = LogRecord::new(
        Severity::Info,
        epoch(),
        "file2",
        "function2",
        20,
        "Warning message\nThis is test!",
    );
    pool.append_record(&first).unwrap();
    pool.append_record(&second).unwrap();

    let decoded = pool.read_records(&pool.current_slot_path()).unwrap();
    assert!(decoded.is_clean());
    assert_eq!(decoded.records.len(), 2);

    assert_eq!(decoded.records[0].header.severity, Severity::Info);
    assert_eq!(decoded.records[0].header.timestamp, epoch());
    assert_eq!(decoded.records[0].location.file, "file");
    assert_eq!(decoded.records[0].location.function, "function");
    assert_eq!(decoded.records[0].location.line, 1);
    assert_eq!(decoded.records[0].body, "Error message");

    assert_eq!(decoded.records[1].location.file, "file2");
    assert_eq!(decoded.records[1].location.function, "function2");
    assert_eq!(decoded.records[1].location.line, 20);
    assert_eq!(decoded.records[1].body, "Warning message\nThis is test!");
}

#[test]
fn test_rotation_resumes_after_restart() {
    let temp_dir = tempdir().unwrap();
    let dates = Arc::new(ManualDate::new(start_day()));

    {
        let pool = open(temp_dir.path(), 3, &dates);
        pool.append_record(&warning("day one")).unwrap();
        dates.advance_days(1);
        pool.append_record(&warning("day two")).unwrap();
    }

    // Same day after restart: keep appending to slot 1.
    {
        let pool = open(temp_dir.path(), 3, &dates);
        assert_eq!(pool.active_slot(), 1);
        pool.append_record(&warning("day two again")).unwrap();
        assert_eq!(pool.read_slot(1).unwrap().records.len(), 2);
    }

    // Next day after another restart: rotate to slot 2.
    dates.advance_days(1);
    let pool = open(temp_dir.path(), 3, &dates);
    let outcome = pool.append_record(&warning("day three")).unwrap();
    assert_eq!(outcome.slot, 2);
    assert!(outcome.rotated);

    assert_eq!(pool.read_slot(0).unwrap().records, vec![warning("day one")]);
    assert_eq!(pool.slot_status(2).unwrap(), SlotStatus::Populated {
        bytes: fs::metadata(pool.slot_path(2)).unwrap().len(),
    });
}

#[test]
fn test_wraparound_discards_stale_slot() {
    let temp_dir = tempdir().unwrap();
    let dates = Arc::new(ManualDate::new(start_day()));
    let pool = open(temp_dir.path(), 2, &dates);

    pool.append_record(&warning("old 1")).unwrap();
    pool.append_record(&warning("old 2")).unwrap();
    dates.advance_days(1);
    pool.append_record(&warning("middle")).unwrap();
    dates.advance_days(1);
    pool.append_record(&warning("new")).unwrap();

    assert_eq!(pool.active_slot(), 0);
    assert_eq!(pool.read_slot(0).unwrap().records, vec![warning("new")]);
    assert_eq!(pool.read_slot(1).unwrap().records, vec![warning("middle")]);
}

#[test]
fn test_long_gap_does_not_skip_slots() {
    let temp_dir = tempdir().unwrap();
    let dates = Arc::new(ManualDate::new(start_day()));
    let pool = open(temp_dir.path(), 3, &dates);

    pool.append_record(&warning("before holiday")).unwrap();
    dates.advance_days(30);
    pool.append_record(&warning("after holiday")).unwrap();

    assert_eq!(pool.active_slot(), 1);
    assert_eq!(
        pool.read_slot(0).unwrap().records,
        vec![warning("before holiday")]
    );
    assert_eq!(pool.slot_status(2).unwrap(), SlotStatus::Absent);
}
