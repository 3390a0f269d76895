//! Properties of the rewrite stages: the SQL rewriter is idempotent on
//! clean SQL, parsing commutes with repeated rewriting, and the AST
//! rewriter is the identity on parameter-free input.

use basalt::ast_rewriter;
use basalt::parser;
use basalt::sql_rewriter;
use test_case::test_case;

#[test_case("SELECT a FROM t WHERE b = 1")]
#[test_case("SELECT COUNT(*) FROM $planets")]
#[test_case("SELECT 'string with -- dashes' FROM t")]
fn sql_rewriter_idempotent_on_clean_sql(sql: &str) {
    let (first, _) = sql_rewriter::rewrite(sql).unwrap();
    let (second, _) = sql_rewriter::rewrite(&first).unwrap();
    assert_eq!(first, second);
}

#[test_case("SELECT  a   FROM t -- comment")]
#[test_case("SELECT a /* block */ FROM t")]
#[test_case("SELECT a FROM t WHERE b = 'kept /* not a comment */'")]
fn parse_commutes_with_repeated_rewrites(sql: &str) {
    let (once, _) = sql_rewriter::rewrite(sql).unwrap();
    let (twice, _) = sql_rewriter::rewrite(&once).unwrap();
    assert_eq!(parser::parse(&once).unwrap(), parser::parse(&twice).unwrap());
}

#[test]
fn ast_rewriter_identity_without_parameters() {
    let statements = parser::parse("SELECT a, b FROM t WHERE c < 10 ORDER BY a").unwrap();
    let rewritten = ast_rewriter::rewrite(
        statements.clone(),
        &sql_rewriter::TemporalFilters::new(),
        &[],
        None,
    )
    .unwrap();
    assert_eq!(statements, rewritten);
}

#[test]
fn temporal_clauses_survive_the_full_rewrite_path() {
    let (clean, filters) = sql_rewriter::rewrite(
        "SELECT * FROM observations FOR DATES BETWEEN '2024-03-01' AND '2024-03-02'",
    )
    .unwrap();
    let statements = parser::parse(&clean).unwrap();
    // validation matches the filter key against the relation reference
    assert!(ast_rewriter::rewrite(statements, &filters, &[], None).is_ok());
    let range = filters.get("observations").unwrap();
    assert!(range.start < range.end);
}
