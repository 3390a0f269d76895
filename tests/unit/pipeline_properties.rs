//! Cross-stage invariants: bound plans only reference identities present
//! in their input schemas, physical plans have exactly one Exit terminal,
//! and binding either succeeds with unique user-facing names or fails with
//! a taxonomy error.

use basalt::binder::{bind, BindContext};
use basalt::config::EngineConfig;
use basalt::errors::EngineError;
use basalt::logical_planner::{plan_statement, LogicalPlan};
use basalt::parser;
use basalt::permissions::all_permissions;
use basalt::physical_planner::create_physical_plan;
use basalt::sql_rewriter::TemporalFilters;
use test_case::test_case;

fn bound_plan(sql: &str) -> Result<LogicalPlan, EngineError> {
    let statements = parser::parse(sql)?;
    let planned = plan_statement(&statements[0], &TemporalFilters::new(), &all_permissions())?;
    bind(planned.plan, &BindContext::new(None))
}

/// Every identifier bound inside a node must resolve into the node's input
/// schema.
fn check_identifier_closure(plan: &LogicalPlan) {
    if let Some(input) = plan.inputs().first() {
        if let Some(input_schema) = input.schema() {
            let collect = |expressions: Vec<&basalt::expression::Expression>| {
                for expression in expressions {
                    for identity in expression.referenced_identities() {
                        assert!(
                            input_schema.column_by_identity(&identity).is_some(),
                            "{} references identity '{}' missing from its input",
                            plan.node_name(),
                            identity
                        );
                    }
                }
            };
            match plan {
                LogicalPlan::Filter(node) => collect(vec![&node.predicate]),
                LogicalPlan::Project(node) => collect(node.columns.iter().collect()),
                LogicalPlan::Sort(node) => {
                    collect(node.keys.iter().map(|(key, _)| key).collect())
                }
                _ => {}
            }
        }
    }
    for input in plan.inputs() {
        check_identifier_closure(input);
    }
}

#[test_case("SELECT name FROM $planets WHERE id = 3 ORDER BY name")]
#[test_case("SELECT id, SUM(mass) FROM $planets GROUP BY id HAVING SUM(mass) > 0")]
#[test_case("SELECT UPPER(name) AS n FROM $planets LIMIT 2")]
#[test_case("SELECT * FROM $planets AS a INNER JOIN $planets AS b ON a.id = b.id")]
fn bound_expressions_reference_input_identities(sql: &str) {
    let plan = bound_plan(sql).unwrap();
    check_identifier_closure(&plan);
}

#[test_case("SELECT nothing FROM $planets")]
#[test_case("SELECT name FROM $planets WHERE mass")]
#[test_case("SELECT name FROM $planets GROUP BY 99")]
#[test_case("SELECT id FROM $planets UNION SELECT id, name FROM $planets")]
fn binding_failures_carry_taxonomy_kinds(sql: &str) {
    let error = bound_plan(sql).unwrap_err();
    // every failure is a classified engine error with a message
    assert!(!error.to_string().is_empty());
    let _ = error.kind();
}

#[test_case("SELECT name FROM $planets")]
#[test_case("SELECT COUNT(*) FROM $planets")]
#[test_case("EXPLAIN SELECT name FROM $planets ORDER BY name LIMIT 2")]
#[test_case("SELECT name FROM $planets UNION SELECT name FROM $planets")]
fn physical_plans_have_one_exit_terminal(sql: &str) {
    let plan = bound_plan(sql).unwrap();
    let physical = create_physical_plan(&plan, &EngineConfig::default()).unwrap();
    let rendered = physical.render();
    // the root is the Exit and no other Exit appears at the top level plan
    assert_eq!(rendered[0].0.trim_start(), "Exit");
    let top_level_exits = rendered
        .iter()
        .filter(|(name, _)| name.trim_start() == "Exit" && !name.starts_with(' '))
        .count();
    assert_eq!(top_level_exits, 1);
}

#[test]
fn unique_user_facing_names_at_exit() {
    let plan = bound_plan("SELECT * FROM $planets INNER JOIN $planets USING (name, id)").unwrap();
    let schema = plan.schema().unwrap();
    let mut names: Vec<&str> = schema
        .columns
        .iter()
        .map(|column| column.query_column.as_str())
        .collect();
    let before = names.len();
    names.sort();
    names.dedup();
    assert_eq!(before, names.len());
}
