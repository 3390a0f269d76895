//! The pipeline driver.
//!
//! ```text
//! SQL text ─► SQL Rewriter ─► Parser ─► AST Rewriter ─► Logical Planner
//!          ─► Binder ─► Physical Planner ─► pull-ready plans
//! ```
//!
//! One physical plan per `;`-separated statement, in order. Everything
//! here is pure transformation; execution happens when the cursor pulls.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast_rewriter;
use crate::binder::{self, BindContext};
use crate::cache::KeyValueStore;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::logical_planner;
use crate::morsel::Datum;
use crate::parser;
use crate::permissions::Permission;
use crate::physical_planner::{create_physical_plan, PhysicalPlan};
use crate::sql_rewriter;

pub struct PipelineOptions<'a> {
    pub permissions: &'a HashSet<Permission>,
    pub default_schema: Option<&'a str>,
    pub cache: Option<Arc<dyn KeyValueStore>>,
    pub config: &'a EngineConfig,
}

pub fn plan_statements(
    raw_sql: &str,
    parameters: &[Datum],
    options: &PipelineOptions<'_>,
) -> Result<Vec<PhysicalPlan>> {
    // SQL Rewriter removes comments and whitespace and extracts temporal
    // filters
    let (clean_sql, temporal_filters) = sql_rewriter::rewrite(raw_sql)?;
    log::debug!("clean sql: {clean_sql}");

    // Parser converts the SQL into ASTs
    let statements = parser::parse(&clean_sql)?;

    // AST Rewriter binds parameters and connection defaults
    let statements = ast_rewriter::rewrite(
        statements,
        &temporal_filters,
        parameters,
        options.default_schema,
    )?;

    let bind_context = BindContext::new(options.cache.clone());
    let mut plans = Vec::with_capacity(statements.len());
    for statement in &statements {
        // Logical Planner checks permissions and shapes the plan
        let planned =
            logical_planner::plan_statement(statement, &temporal_filters, options.permissions)?;

        // Binder attaches schemas and resolves names
        let bound = binder::bind(planned.plan, &bind_context)?;

        // Physical Planner lowers to the operator DAG
        plans.push(create_physical_plan(&bound, options.config)?);
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::all_permissions;

    fn options_with<'a>(
        permissions: &'a HashSet<Permission>,
        config: &'a EngineConfig,
    ) -> PipelineOptions<'a> {
        PipelineOptions {
            permissions,
            default_schema: None,
            cache: None,
            config,
        }
    }

    #[test]
    fn test_single_statement_single_plan() {
        let permissions = all_permissions();
        let config = EngineConfig::default();
        let plans = plan_statements(
            "SELECT name FROM $planets",
            &[],
            &options_with(&permissions, &config),
        )
        .unwrap();
        assert_eq!(plans.len(), 1);
    }

    #[test]
    fn test_multiple_statements_multiple_plans() {
        let permissions = all_permissions();
        let config = EngineConfig::default();
        let plans = plan_statements(
            "SELECT 1; SELECT COUNT(*) FROM $planets;",
            &[],
            &options_with(&permissions, &config),
        )
        .unwrap();
        assert_eq!(plans.len(), 2);
    }
}
