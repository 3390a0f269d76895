//! End-to-end scenarios over the built-in `$planets` relation: nine rows of
//! `{id: INTEGER, name: VARCHAR, mass: DOUBLE}`.

use basalt::connect;
use basalt::morsel::{Datum, Morsel};

fn run(sql: &str) -> Morsel {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    cursor.execute(sql, &[]).unwrap();
    cursor.fetch_all().unwrap()
}

fn cell(morsel: &Morsel, column: &str, row: usize) -> Datum {
    morsel.column(column).unwrap().values.get(row)
}

#[test]
fn count_star_over_planets() {
    let result = run("SELECT COUNT(*) FROM $planets");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(cell(&result, "COUNT(*)", 0), Datum::Integer(9));
}

#[test]
fn filter_and_order() {
    let result = run("SELECT name FROM $planets WHERE id = 3 ORDER BY name");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(cell(&result, "name", 0), Datum::Varchar("Earth".to_string()));
}

#[test]
fn self_join_using_coalesces_keys() {
    let result = run("SELECT * FROM $planets INNER JOIN $planets USING (name, id)");
    assert_eq!(result.num_rows(), 9);
    // one copy of the join keys, both mass columns
    assert!(result.has_column("id"));
    assert!(result.has_column("name"));
    let mass_columns = result
        .column_names()
        .iter()
        .filter(|name| name.contains("mass"))
        .count();
    assert_eq!(mass_columns, 2);
    assert_eq!(result.num_columns(), 4);
}

#[test]
fn projection_alias_and_limit() {
    let result = run("SELECT UPPER(name) AS n FROM $planets LIMIT 2");
    assert_eq!(result.num_rows(), 2);
    assert_eq!(cell(&result, "n", 0), Datum::Varchar("MERCURY".to_string()));
    assert_eq!(cell(&result, "n", 1), Datum::Varchar("VENUS".to_string()));
}

#[test]
fn generate_series_in_select_position() {
    let result = run("SELECT GENERATE_SERIES(1, 5) AS i");
    assert_eq!(result.num_rows(), 5);
    let values: Vec<Datum> = (0..5).map(|row| cell(&result, "i", row)).collect();
    assert_eq!(
        values,
        (1..=5).map(Datum::Integer).collect::<Vec<_>>()
    );
}

#[test]
fn group_by_with_having() {
    let result =
        run("SELECT id, SUM(mass) FROM $planets GROUP BY id HAVING SUM(mass) > 0");
    assert_eq!(result.num_rows(), 9);
    // exactly one row per id
    let mut ids: Vec<Datum> = (0..result.num_rows())
        .map(|row| cell(&result, "id", row))
        .collect();
    ids.dedup();
    assert_eq!(ids.len(), 9);
}

// boundary behaviours

#[test]
fn count_star_over_zero_batches_is_zero() {
    let result = run("SELECT COUNT(*) FROM $planets WHERE id > 100");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(cell(&result, "COUNT(*)", 0), Datum::Integer(0));
}

#[test]
fn limit_zero_is_an_empty_stream() {
    let result = run("SELECT name FROM $planets LIMIT 0");
    assert_eq!(result.num_rows(), 0);
}

#[test]
fn distinct_over_empty_relation_is_empty() {
    let result = run("SELECT DISTINCT name FROM $planets WHERE id > 100");
    assert_eq!(result.num_rows(), 0);
}

#[test]
fn heap_sort_with_large_k_is_a_full_stable_sort() {
    // LIMIT larger than the relation: the fused HeapSort degenerates to a
    // full sort
    let result = run("SELECT name FROM $planets ORDER BY mass LIMIT 100");
    assert_eq!(result.num_rows(), 9);
    assert_eq!(cell(&result, "name", 0), Datum::Varchar("Pluto".to_string()));
    assert_eq!(
        cell(&result, "name", 8),
        Datum::Varchar("Jupiter".to_string())
    );
}

#[test]
fn sort_preserves_input_order_on_ties() {
    // every key is equal, so the output order is the input order
    let result = run("SELECT name FROM $planets ORDER BY SIGN(mass)");
    assert_eq!(
        cell(&result, "name", 0),
        Datum::Varchar("Mercury".to_string())
    );
    assert_eq!(cell(&result, "name", 8), Datum::Varchar("Pluto".to_string()));
}

// wider surface

#[test]
fn distinct_reduces_duplicates() {
    let result = run("SELECT DISTINCT SIGN(mass) AS s FROM $planets");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(cell(&result, "s", 0), Datum::Integer(1));
}

#[test]
fn union_all_and_union_distinct() {
    let all = run("SELECT name FROM $planets UNION ALL SELECT name FROM $planets");
    assert_eq!(all.num_rows(), 18);
    let distinct = run("SELECT name FROM $planets UNION SELECT name FROM $planets");
    assert_eq!(distinct.num_rows(), 9);
}

#[test]
fn left_join_pads_with_nulls() {
    let result = run(
        "SELECT a.name, b.name FROM $planets AS a \
         LEFT JOIN (SELECT name FROM $planets WHERE id < 3) AS b ON a.name = b.name \
         ORDER BY a.id",
    );
    assert_eq!(result.num_rows(), 9);
    assert_eq!(
        cell(&result, "name", 0),
        Datum::Varchar("Mercury".to_string())
    );
    assert_eq!(cell(&result, "b.name", 8), Datum::Null);
}

#[test]
fn cte_and_parameters() {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    cursor
        .execute(
            "WITH heavy AS (SELECT name, mass FROM $planets WHERE mass > ?) \
             SELECT COUNT(*) FROM heavy",
            &[Datum::Double(100.0)],
        )
        .unwrap();
    let result = cursor.fetch_all().unwrap();
    // Jupiter, Saturn and Neptune are heavier than 100
    assert_eq!(cell(&result, "COUNT(*)", 0), Datum::Integer(3));
}

#[test]
fn values_as_a_relation() {
    let result = run("SELECT * FROM (VALUES (1, 'one'), (2, 'two')) AS t (n, word)");
    assert_eq!(result.num_rows(), 2);
    assert_eq!(cell(&result, "word", 1), Datum::Varchar("two".to_string()));
}

#[test]
fn aggregates_over_groups() {
    let result = run(
        "SELECT SIGN(mass) AS s, COUNT(*), MIN(mass), MAX(mass) FROM $planets GROUP BY SIGN(mass)",
    );
    assert_eq!(result.num_rows(), 1);
    assert_eq!(cell(&result, "COUNT(*)", 0), Datum::Integer(9));
    assert_eq!(cell(&result, "MIN(mass)", 0), Datum::Double(0.0146));
    assert_eq!(cell(&result, "MAX(mass)", 0), Datum::Double(1898.0));
}

#[test]
fn explain_renders_a_plan_without_reading_data() {
    let result = run("EXPLAIN SELECT name FROM $planets ORDER BY name LIMIT 2");
    assert!(result.num_rows() >= 3);
    let operators: Vec<String> = (0..result.num_rows())
        .map(|row| cell(&result, "operator", row).to_string())
        .collect();
    assert!(operators.iter().any(|name| name.contains("HeapSort")));
    assert!(operators.iter().any(|name| name.contains("Exit")));
}

#[test]
fn show_statements() {
    let columns = run("SHOW COLUMNS FROM $planets");
    assert_eq!(columns.num_rows(), 3);

    let functions = run("SHOW FUNCTIONS");
    assert!(functions.num_rows() > 20);

    let databases = run("SHOW DATABASES");
    assert!(databases.num_rows() >= 1);

    let create = run("SHOW CREATE TABLE $planets");
    assert_eq!(create.num_rows(), 1);
    assert!(cell(&create, "create_table", 0)
        .to_string()
        .contains("mass DOUBLE"));
}

#[test]
fn stats_count_rows_read() {
    let connection = connect().unwrap();
    let mut cursor = connection.cursor();
    cursor.execute("SELECT name FROM $planets", &[]).unwrap();
    let stats = cursor.stats();
    assert_eq!(stats["rows_read"], 9);
    assert!(stats["columns_read"] >= 3);
}
