//! The error taxonomy as seen from the cursor: every failure carries a
//! machine-readable kind and a human-readable message, and nothing is
//! retried inside the core.

use std::time::Duration;

use basalt::connect;
use basalt::errors::ErrorKind;
use basalt::morsel::Datum;
use basalt::{Connection, Permission};
use test_case::test_case;

fn run_err(sql: &str) -> basalt::EngineError {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    cursor.execute(sql, &[]).unwrap_err()
}

#[test_case("SELECT FROM WHERE", ErrorKind::Sql; "parse failure")]
#[test_case("SELECT nothing FROM $planets", ErrorKind::ColumnNotFound; "unknown column")]
#[test_case(
    "SELECT name FROM $planets AS a CROSS JOIN $planets AS b WHERE id = 1",
    ErrorKind::AmbiguousIdentifier;
    "ambiguous column"
)]
#[test_case("SELECT name FROM $planets WHERE mass", ErrorKind::TypeMismatch; "non-boolean filter")]
#[test_case("SELECT name FROM $missing_sample", ErrorKind::DatasetNotFound; "missing dataset")]
#[test_case("GRANT ALL ON x TO y", ErrorKind::UnsupportedSyntax; "unsupported statement")]
fn taxonomy_kinds(sql: &str, kind: ErrorKind) {
    let error = run_err(sql);
    assert_eq!(error.kind(), kind, "{error}");
    assert!(!error.to_string().is_empty());
}

#[test]
fn missing_statement() {
    assert_eq!(run_err("").kind(), ErrorKind::MissingSqlStatement);
}

#[test]
fn parameter_count_mismatch() {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    let error = cursor
        .execute("SELECT name FROM $planets WHERE id = ?", &[])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parameter);

    let mut cursor = connection.cursor();
    let error = cursor
        .execute("SELECT name FROM $planets", &[Datum::Integer(1)])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parameter);
}

#[test]
fn permissions_gate_statement_kinds() {
    let connection = Connection::new(None, Some(&[Permission::Show])).unwrap();
    let mut cursor = connection.cursor();
    let error = cursor.execute("SELECT 1", &[]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Permissions);
    assert_eq!(error.exit_code(), 2);

    // the granted kind still works
    let mut cursor = connection.cursor();
    cursor.execute("SHOW FUNCTIONS", &[]).unwrap();
}

#[test]
fn strict_cast_fails_try_cast_nulls() {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    let error = cursor
        .execute("SELECT CAST(name AS INTEGER) FROM $planets", &[])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TypeMismatch);

    let mut cursor = connection.cursor();
    cursor
        .execute("SELECT TRY_CAST(name AS INTEGER) AS n FROM $planets LIMIT 1", &[])
        .unwrap();
    let result = cursor.fetch_all().unwrap();
    assert_eq!(result.column("n").unwrap().values.get(0), Datum::Null);
}

#[test]
fn division_by_zero_is_null_not_an_error() {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    cursor
        .execute("SELECT mass / (id - 1) AS ratio FROM $planets ORDER BY id LIMIT 1", &[])
        .unwrap();
    let result = cursor.fetch_all().unwrap();
    assert_eq!(result.column("ratio").unwrap().values.get(0), Datum::Null);
}

#[test]
fn deadline_cancels_between_batches() {
    let connection = connect().unwrap();
    let mut cursor = connection
        .cursor()
        .with_deadline(Duration::from_nanos(1));
    let error = cursor.execute("SELECT name FROM $planets", &[]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert_eq!(error.exit_code(), 4);
}

#[test]
fn memory_ceiling_raises_out_of_memory() {
    // the smallest ceiling the config accepts, and a sort (greedy) over a
    // cartesian blow-up that comfortably exceeds it
    let config = basalt::config::EngineConfig {
        max_materialized_bytes: 1024 * 1024,
        ..Default::default()
    };
    let connection = connect().unwrap().with_config(config);
    let mut cursor = connection.cursor();
    let error = cursor
        .execute(
            "SELECT a.id FROM $planets AS a \
             CROSS JOIN $planets AS b CROSS JOIN $planets AS c \
             CROSS JOIN $planets AS d CROSS JOIN $planets AS e \
             ORDER BY a.id",
            &[],
        )
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::OutOfMemory);
}
