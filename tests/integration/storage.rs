//! Disk-backed datasets end to end: text decoders, the read-through blob
//! cache observable through cursor statistics, and Mabel-partitioned
//! layouts scoped by `FOR` temporal clauses.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use basalt::morsel::Datum;
use basalt::{connect, Connection, MemoryCache};
use serial_test::serial;
use chrono::{Datelike, Utc};

fn write_blob(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(content).unwrap();
}

fn run_in(dir: &Path, connection: &Connection, sql: &str) -> basalt::Morsel {
    // dataset paths are relative; run from the fixture directory
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir).unwrap();
    let mut cursor = connection.cursor();
    let outcome = cursor.execute(sql, &[]);
    std::env::set_current_dir(previous).unwrap();
    outcome.unwrap();
    cursor.fetch_all().unwrap()
}

#[test]
#[serial]
fn jsonl_and_csv_datasets() {
    let dir = tempfile::tempdir().unwrap();
    write_blob(
        dir.path(),
        "trades/part-0.jsonl",
        b"{\"price\": 1.5, \"ticker\": \"AAA\"}\n{\"price\": 2.5, \"ticker\": \"BBB\"}\n",
    );
    write_blob(
        dir.path(),
        "quotes/part-0.csv",
        b"ticker,bid\nAAA,1\nBBB,2\nCCC,3\n",
    );

    let connection = connect().unwrap();
    let trades = run_in(dir.path(), &connection, "SELECT * FROM trades ORDER BY price");
    assert_eq!(trades.num_rows(), 2);
    assert_eq!(
        trades.column("ticker").unwrap().values.get(0),
        Datum::Varchar("AAA".to_string())
    );

    let quotes = run_in(
        dir.path(),
        &connection,
        "SELECT COUNT(*) FROM quotes",
    );
    assert_eq!(
        quotes.column("COUNT(*)").unwrap().values.get(0),
        Datum::Integer(3)
    );
}

#[test]
#[serial]
fn zstd_wrapped_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let raw = b"{\"id\": 1}\n{\"id\": 2}\n";
    let compressed = zstd_encode(raw);
    write_blob(dir.path(), "packed/part-0.zst", &compressed);

    let connection = connect().unwrap();
    let result = run_in(dir.path(), &connection, "SELECT COUNT(*) FROM packed");
    assert_eq!(
        result.column("COUNT(*)").unwrap().values.get(0),
        Datum::Integer(2)
    );
}

fn zstd_encode(raw: &[u8]) -> Vec<u8> {
    // encode through the same crate the decoder uses
    zstd::encode_all(raw, 1).unwrap()
}

#[test]
#[serial]
fn cache_misses_then_hits() {
    let dir = tempfile::tempdir().unwrap();
    write_blob(dir.path(), "cached/part-0.jsonl", b"{\"id\": 1}\n");

    let cache = Arc::new(MemoryCache::new(8));
    let connection = Connection::new(Some(cache), None).unwrap();

    // first read misses and populates
    let _ = run_in(dir.path(), &connection, "SELECT * FROM cached");

    // second read hits; schema is served from the catalogue now, so the
    // only blob access is the scan itself
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let mut cursor = connection.cursor();
    cursor.execute("SELECT * FROM cached", &[]).unwrap();
    std::env::set_current_dir(previous).unwrap();
    let stats = cursor.stats();
    assert!(stats["cache_hits"] >= 1, "{stats:?}");
    assert_eq!(stats["cache_misses"], 0, "{stats:?}");
}

#[test]
#[serial]
fn mabel_partitioned_dataset_with_temporal_clause() {
    let dir = tempfile::tempdir().unwrap();
    let today = Utc::now().date_naive();
    let today_path = format!(
        "events/year_{:04}/month_{:02}/day_{:02}/as_at_001",
        today.year(),
        today.month(),
        today.day()
    );
    write_blob(
        dir.path(),
        &format!("{today_path}/frame.complete"),
        b"",
    );
    write_blob(
        dir.path(),
        &format!("{today_path}/part-0.jsonl"),
        b"{\"event\": \"today\"}\n",
    );

    let connection = connect().unwrap();
    // no FOR clause defaults to today
    let result = run_in(dir.path(), &connection, "SELECT * FROM events");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(
        result.column("event").unwrap().values.get(0),
        Datum::Varchar("today".to_string())
    );

    let result = run_in(
        dir.path(),
        &connection,
        "SELECT COUNT(*) FROM events FOR DATES IN TODAY",
    );
    assert_eq!(
        result.column("COUNT(*)").unwrap().values.get(0),
        Datum::Integer(1)
    );
}

#[test]
#[serial]
fn empty_dataset_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("hollow")).unwrap();

    let connection = connect().unwrap();
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let mut cursor = connection.cursor();
    let outcome = cursor.execute("SELECT * FROM hollow", &[]);
    std::env::set_current_dir(previous).unwrap();
    assert_eq!(
        outcome.unwrap_err().kind(),
        basalt::errors::ErrorKind::EmptyDataset
    );
}
