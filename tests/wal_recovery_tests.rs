use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tempfile::tempdir;

use gnomon::telemetry::noop_event_listener;
use gnomon::{DataPoint, StoreConfig, TagSet, TimeSeriesStore, WriteAheadLog};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

fn tags_from(pairs: &[(&str, &str)]) -> TagSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn open_store(wal_path: PathBuf) -> TimeSeriesStore {
    TimeSeriesStore::open(StoreConfig {
        wal_path,
        sweep_interval: Duration::from_secs(3600),
        ..StoreConfig::default()
    })
    .unwrap()
}

#[test]
fn test_recovery_after_crash_wal_append() {
    // Simulate "crash after WAL append": records reached the WAL but the
    // process died before any orderly close.
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("timeseries.log");
    let now = now_millis();

    {
        let events = noop_event_listener();
        let mut wal = WriteAheadLog::open(&wal_path, u64::MAX).unwrap();
        wal.append(
            &DataPoint {
                timestamp: now,
                metric: "series_a".to_string(),
                value: 1.25,
                tags: TagSet::new(),
            },
            &*events,
        )
        .unwrap();
        wal.append(
            &DataPoint {
                timestamp: now + 1,
                metric: "series_a".to_string(),
                value: 2.25,
                tags: tags_from(&[("host", "server1")]),
            },
            &*events,
        )
        .unwrap();
        // Intentionally no close() to mimic abrupt termination.
    }

    let store = open_store(wal_path);
    let results = store.query("series_a", 0, u64::MAX, None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value, 1.25);
    assert_eq!(results[1].value, 2.25);
    assert_eq!(results[1].tags.get("host"), Some(&"server1".to_string()));
}

#[test]
fn test_replay_skips_malformed_and_filters_expired() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("timeseries.log");
    let now = now_millis();

    // Hand-written WAL: a fresh record, an expired record (far older than the
    // 24 h horizon), garbage, a truncated record, and another fresh record.
    let contents = format!(
        "{now},cpu.usage,45.2,host=server1\n\
         1000,cpu.usage,9.9,host=ancient\n\
         this is garbage\n\
         {now},cpu.usage,3.0\n\
         {later},cpu.usage,47.0,host=server2\n",
        now = now,
        later = now + 5,
    );
    fs::write(&wal_path, contents).unwrap();

    let store = open_store(wal_path);
    let results = store.query("cpu.usage", 0, u64::MAX, None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tags.get("host"), Some(&"server1".to_string()));
    assert_eq!(results[1].tags.get("host"), Some(&"server2".to_string()));
}

#[test]
fn test_escaped_content_survives_restart() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("timeseries.log");
    let now = now_millis();

    let metric = "weird,metric;with=specials\\";
    let tags = tags_from(&[("key,1", "value;a"), ("key=2", "value\\b")]);
    {
        let store = open_store(wal_path.clone());
        store.insert(now, metric, 1.5, tags.clone()).unwrap();
        store.close().unwrap();
    }

    let store = open_store(wal_path);
    let results = store.query(metric, now, now + 1, Some(&tags)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metric, metric);
    assert_eq!(results[0].tags, tags);
}

#[test]
fn test_rotated_siblings_are_not_replayed() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("timeseries.log");
    let now = now_millis();

    // A rotated sibling holds a record for `archived.metric`; only the active
    // file's record must come back.
    fs::write(
        dir.path().join("timeseries_123.log"),
        format!("{},archived.metric,1.0,\n", now),
    )
    .unwrap();
    fs::write(&wal_path, format!("{},active.metric,2.0,\n", now)).unwrap();

    let store = open_store(wal_path);
    assert!(store.query("archived.metric", 0, u64::MAX, None).unwrap().is_empty());
    assert_eq!(store.query("active.metric", 0, u64::MAX, None).unwrap().len(), 1);
}

#[test]
fn test_open_with_empty_or_missing_wal() {
    let dir = tempdir().unwrap();

    // Missing file: open creates it.
    let store = open_store(dir.path().join("fresh").join("timeseries.log"));
    assert!(store.query("anything", 0, u64::MAX, None).unwrap().is_empty());
    store.close().unwrap();

    // Empty file: replay finds nothing.
    let empty_path = dir.path().join("empty.log");
    fs::write(&empty_path, "").unwrap();
    let store = open_store(empty_path);
    assert!(store.query("anything", 0, u64::MAX, None).unwrap().is_empty());
}

#[test]
fn test_reopen_appends_after_replayed_records() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("timeseries.log");
    let now = now_millis();

    {
        let store = open_store(wal_path.clone());
        store.insert(now, "m", 1.0, TagSet::new()).unwrap();
        store.close().unwrap();
    }
    {
        let store = open_store(wal_path.clone());
        store.insert(now + 1, "m", 2.0, TagSet::new()).unwrap();
        store.close().unwrap();
    }

    // Both generations of writes survive the second restart.
    let store = open_store(wal_path);
    let results = store.query("m", 0, u64::MAX, None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value, 1.0);
    assert_eq!(results[1].value, 2.0);
}
