//! AST rewriting.
//!
//! Runs between the parser and the logical planner:
//!
//! - substitutes positional `?` placeholders with parameter literals, in
//!   order, rejecting count mismatches;
//! - validates that every extracted temporal filter matches a relation
//!   reference (the planner stamps the ranges onto its Read nodes);
//! - qualifies unqualified relation names with the connection's default
//!   schema.
//!
//! With no parameters, no filters and no default schema this is the
//! identity transformation.

use sqlparser::ast as sql;
use sqlparser::ast::Statement;

use crate::errors::{EngineError, Result};
use crate::morsel::Datum;
use crate::sql_rewriter::TemporalFilters;

pub fn rewrite(
    statements: Vec<Statement>,
    temporal_filters: &TemporalFilters,
    parameters: &[Datum],
    default_schema: Option<&str>,
) -> Result<Vec<Statement>> {
    let mut statements = statements;
    let mut cursor = 0usize;

    for statement in &mut statements {
        walk_statement(statement, &mut |expr| {
            substitute_placeholder(expr, parameters, &mut cursor)
        })?;
        if let Some(schema) = default_schema {
            qualify_relations(statement, schema)?;
        }
    }

    if cursor != parameters.len() {
        return Err(EngineError::Parameter(format!(
            "statement expects {} parameters, {} were provided",
            cursor,
            parameters.len()
        )));
    }

    validate_temporal_filters(&statements, temporal_filters)?;

    Ok(statements)
}

fn substitute_placeholder(
    expr: &mut sql::Expr,
    parameters: &[Datum],
    cursor: &mut usize,
) -> Result<()> {
    if let sql::Expr::Value(sql::Value::Placeholder(_)) = expr {
        let value = parameters.get(*cursor).ok_or_else(|| {
            EngineError::Parameter(format!(
                "statement expects more than {} parameters, {} were provided",
                cursor,
                parameters.len()
            ))
        })?;
        *cursor += 1;
        *expr = sql::Expr::Value(datum_to_sql_value(value)?);
    }
    Ok(())
}

fn datum_to_sql_value(datum: &Datum) -> Result<sql::Value> {
    match datum {
        Datum::Null => Ok(sql::Value::Null),
        Datum::Boolean(b) => Ok(sql::Value::Boolean(*b)),
        Datum::Integer(i) => Ok(sql::Value::Number(i.to_string(), false)),
        Datum::Double(d) => Ok(sql::Value::Number(d.to_string(), false)),
        Datum::Varchar(s) => Ok(sql::Value::SingleQuotedString(s.clone())),
        Datum::Timestamp(ts) => Ok(sql::Value::SingleQuotedString(
            ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        )),
        other => Err(EngineError::Parameter(format!(
            "{} values cannot be passed as parameters",
            other.data_type()
        ))),
    }
}

// ---------------------------------------------------------------------------
// AST traversal

fn walk_statement(
    statement: &mut Statement,
    visit: &mut impl FnMut(&mut sql::Expr) -> Result<()>,
) -> Result<()> {
    match statement {
        Statement::Query(query) => walk_query(query, visit),
        Statement::Explain { statement, .. } => walk_statement(statement, visit),
        _ => Ok(()),
    }
}

fn walk_query(
    query: &mut sql::Query,
    visit: &mut impl FnMut(&mut sql::Expr) -> Result<()>,
) -> Result<()> {
    if let Some(with) = &mut query.with {
        for cte in &mut with.cte_tables {
            walk_query(&mut cte.query, visit)?;
        }
    }
    walk_set_expr(&mut query.body, visit)?;
    for order_by in &mut query.order_by {
        walk_expr(&mut order_by.expr, visit)?;
    }
    if let Some(limit) = &mut query.limit {
        walk_expr(limit, visit)?;
    }
    if let Some(offset) = &mut query.offset {
        walk_expr(&mut offset.value, visit)?;
    }
    Ok(())
}

fn walk_set_expr(
    body: &mut sql::SetExpr,
    visit: &mut impl FnMut(&mut sql::Expr) -> Result<()>,
) -> Result<()> {
    match body {
        sql::SetExpr::Select(select) => walk_select(select, visit),
        sql::SetExpr::Query(query) => walk_query(query, visit),
        sql::SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, visit)?;
            walk_set_expr(right, visit)
        }
        sql::SetExpr::Values(values) => {
            for row in &mut values.rows {
                for expr in row {
                    walk_expr(expr, visit)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn walk_select(
    select: &mut sql::Select,
    visit: &mut impl FnMut(&mut sql::Expr) -> Result<()>,
) -> Result<()> {
    for item in &mut select.projection {
        match item {
            sql::SelectItem::UnnamedExpr(expr) => walk_expr(expr, visit)?,
            sql::SelectItem::ExprWithAlias { expr, .. } => walk_expr(expr, visit)?,
            _ => {}
        }
    }
    for table in &mut select.from {
        walk_table_factor(&mut table.relation, visit)?;
        for join in &mut table.joins {
            walk_table_factor(&mut join.relation, visit)?;
            if let Some(sql::JoinConstraint::On(expr)) = constraint_of_mut(&mut join.join_operator)
            {
                walk_expr(expr, visit)?;
            }
        }
    }
    if let Some(selection) = &mut select.selection {
        walk_expr(selection, visit)?;
    }
    if let sql::GroupByExpr::Expressions(exprs) = &mut select.group_by {
        for expr in exprs {
            walk_expr(expr, visit)?;
        }
    }
    if let Some(having) = &mut select.having {
        walk_expr(having, visit)?;
    }
    Ok(())
}

fn walk_table_factor(
    relation: &mut sql::TableFactor,
    visit: &mut impl FnMut(&mut sql::Expr) -> Result<()>,
) -> Result<()> {
    match relation {
        sql::TableFactor::Table { args, .. } => {
            if let Some(args) = args {
                for arg in args {
                    if let sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(expr)) = arg {
                        walk_expr(expr, visit)?;
                    }
                }
            }
            Ok(())
        }
        sql::TableFactor::Derived { subquery, .. } => walk_query(subquery, visit),
        sql::TableFactor::UNNEST { array_exprs, .. } => {
            for expr in array_exprs {
                walk_expr(expr, visit)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn constraint_of_mut(join_operator: &mut sql::JoinOperator) -> Option<&mut sql::JoinConstraint> {
    match join_operator {
        sql::JoinOperator::Inner(constraint)
        | sql::JoinOperator::LeftOuter(constraint)
        | sql::JoinOperator::RightOuter(constraint)
        | sql::JoinOperator::FullOuter(constraint)
        | sql::JoinOperator::LeftSemi(constraint)
        | sql::JoinOperator::RightSemi(constraint)
        | sql::JoinOperator::LeftAnti(constraint)
        | sql::JoinOperator::RightAnti(constraint) => Some(constraint),
        _ => None,
    }
}

/// Pre-order walk; the visitor may replace the node it is handed.
fn walk_expr(
    expr: &mut sql::Expr,
    visit: &mut impl FnMut(&mut sql::Expr) -> Result<()>,
) -> Result<()> {
    visit(expr)?;
    match expr {
        sql::Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, visit)?;
            walk_expr(right, visit)
        }
        sql::Expr::UnaryOp { expr, .. }
        | sql::Expr::Nested(expr)
        | sql::Expr::IsNull(expr)
        | sql::Expr::IsNotNull(expr)
        | sql::Expr::Cast { expr, .. }
        | sql::Expr::TryCast { expr, .. } => walk_expr(expr, visit),
        sql::Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, visit)?;
            walk_expr(low, visit)?;
            walk_expr(high, visit)
        }
        sql::Expr::Like { expr, pattern, .. } | sql::Expr::ILike { expr, pattern, .. } => {
            walk_expr(expr, visit)?;
            walk_expr(pattern, visit)
        }
        sql::Expr::InList { expr, list, .. } => {
            walk_expr(expr, visit)?;
            for item in list {
                walk_expr(item, visit)?;
            }
            Ok(())
        }
        sql::Expr::Function(function) => {
            for arg in &mut function.args {
                if let sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(expr)) = arg {
                    walk_expr(expr, visit)?;
                }
            }
            Ok(())
        }
        sql::Expr::ArrayAgg(array_agg) => walk_expr(&mut array_agg.expr, visit),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// default schema and temporal validation

fn qualify_relations(statement: &mut Statement, schema: &str) -> Result<()> {
    let cte_names = collect_cte_names(statement);
    visit_tables(statement, &mut |name: &mut sql::ObjectName| {
        if name.0.len() == 1 {
            let bare = name.0[0].value.clone();
            if !bare.starts_with('$') && !cte_names.contains(&bare.to_lowercase()) {
                name.0.insert(0, sql::Ident::new(schema));
            }
        }
    });
    Ok(())
}

fn collect_cte_names(statement: &Statement) -> Vec<String> {
    let mut names = Vec::new();
    if let Statement::Query(query) = statement {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                names.push(cte.alias.name.value.to_lowercase());
            }
        }
    }
    names
}

fn visit_tables(statement: &mut Statement, visit: &mut impl FnMut(&mut sql::ObjectName)) {
    fn in_query(query: &mut sql::Query, visit: &mut impl FnMut(&mut sql::ObjectName)) {
        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                in_query(&mut cte.query, visit);
            }
        }
        in_set_expr(&mut query.body, visit);
    }
    fn in_set_expr(body: &mut sql::SetExpr, visit: &mut impl FnMut(&mut sql::ObjectName)) {
        match body {
            sql::SetExpr::Select(select) => {
                for table in &mut select.from {
                    in_table_factor(&mut table.relation, visit);
                    for join in &mut table.joins {
                        in_table_factor(&mut join.relation, visit);
                    }
                }
            }
            sql::SetExpr::Query(query) => in_query(query, visit),
            sql::SetExpr::SetOperation { left, right, .. } => {
                in_set_expr(left, visit);
                in_set_expr(right, visit);
            }
            _ => {}
        }
    }
    fn in_table_factor(
        relation: &mut sql::TableFactor,
        visit: &mut impl FnMut(&mut sql::ObjectName),
    ) {
        match relation {
            // table functions keep their bare names
            sql::TableFactor::Table { name, args: None, .. } => visit(name),
            sql::TableFactor::Derived { subquery, .. } => in_query(subquery, visit),
            _ => {}
        }
    }

    match statement {
        Statement::Query(query) => in_query(query, visit),
        Statement::Explain { statement, .. } => visit_tables(statement, visit),
        _ => {}
    }
}

/// Every temporal filter key must match a referenced relation or alias.
fn validate_temporal_filters(
    statements: &[Statement],
    temporal_filters: &TemporalFilters,
) -> Result<()> {
    if temporal_filters.is_empty() {
        return Ok(());
    }
    let mut references: Vec<String> = Vec::new();
    for statement in statements {
        collect_relation_references(statement, &mut references);
    }
    for key in temporal_filters.keys() {
        if !references.contains(key) {
            return Err(EngineError::Sql(format!(
                "temporal clause references unknown relation '{key}'"
            )));
        }
    }
    Ok(())
}

pub fn collect_relation_references(statement: &Statement, references: &mut Vec<String>) {
    // shared with the planner: all the names a FOR clause may key on
    let mut record = |name: &sql::ObjectName, alias: &Option<sql::TableAlias>| {
        if let Some(last) = name.0.last() {
            references.push(last.value.to_lowercase());
        }
        references.push(name.to_string().to_lowercase());
        if let Some(alias) = alias {
            references.push(alias.name.value.to_lowercase());
        }
    };

    fn in_query(
        query: &sql::Query,
        record: &mut impl FnMut(&sql::ObjectName, &Option<sql::TableAlias>),
    ) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                in_query(&cte.query, record);
            }
        }
        in_set_expr(&query.body, record);
    }
    fn in_set_expr(
        body: &sql::SetExpr,
        record: &mut impl FnMut(&sql::ObjectName, &Option<sql::TableAlias>),
    ) {
        match body {
            sql::SetExpr::Select(select) => {
                for table in &select.from {
                    in_table_factor(&table.relation, record);
                    for join in &table.joins {
                        in_table_factor(&join.relation, record);
                    }
                }
            }
            sql::SetExpr::Query(query) => in_query(query, record),
            sql::SetExpr::SetOperation { left, right, .. } => {
                in_set_expr(left, record);
                in_set_expr(right, record);
            }
            _ => {}
        }
    }
    fn in_table_factor(
        relation: &sql::TableFactor,
        record: &mut impl FnMut(&sql::ObjectName, &Option<sql::TableAlias>),
    ) {
        match relation {
            sql::TableFactor::Table { name, alias, .. } => record(name, alias),
            sql::TableFactor::Derived { subquery, .. } => in_query(subquery, record),
            _ => {}
        }
    }

    match statement {
        Statement::Query(query) => in_query(query, &mut record),
        Statement::Explain { statement, .. } => {
            collect_relation_references(statement, references)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::sql_rewriter;

    #[test]
    fn test_identity_without_parameters() {
        let statements = parser::parse("SELECT a FROM t WHERE b = 1").unwrap();
        let rewritten = rewrite(
            statements.clone(),
            &TemporalFilters::new(),
            &[],
            None,
        )
        .unwrap();
        assert_eq!(statements, rewritten);
    }

    #[test]
    fn test_placeholders_substituted_in_order() {
        let statements = parser::parse("SELECT a FROM t WHERE b = ? AND c = ?").unwrap();
        let rewritten = rewrite(
            statements,
            &TemporalFilters::new(),
            &[Datum::Integer(7), Datum::Varchar("x".to_string())],
            None,
        )
        .unwrap();
        let rendered = rewritten[0].to_string();
        assert!(rendered.contains("b = 7"));
        assert!(rendered.contains("c = 'x'"));
    }

    #[test]
    fn test_too_few_parameters() {
        let statements = parser::parse("SELECT a FROM t WHERE b = ?").unwrap();
        let result = rewrite(statements, &TemporalFilters::new(), &[], None);
        assert!(matches!(result, Err(EngineError::Parameter(_))));
    }

    #[test]
    fn test_too_many_parameters() {
        let statements = parser::parse("SELECT a FROM t").unwrap();
        let result = rewrite(
            statements,
            &TemporalFilters::new(),
            &[Datum::Integer(1)],
            None,
        );
        assert!(matches!(result, Err(EngineError::Parameter(_))));
    }

    #[test]
    fn test_default_schema_qualifies_bare_names() {
        let statements = parser::parse("SELECT a FROM logs").unwrap();
        let rewritten = rewrite(
            statements,
            &TemporalFilters::new(),
            &[],
            Some("warehouse"),
        )
        .unwrap();
        assert!(rewritten[0].to_string().contains("warehouse.logs"));
    }

    #[test]
    fn test_sample_names_not_qualified() {
        let statements = parser::parse("SELECT a FROM $planets").unwrap();
        let rewritten = rewrite(
            statements,
            &TemporalFilters::new(),
            &[],
            Some("warehouse"),
        )
        .unwrap();
        assert!(!rewritten[0].to_string().contains("warehouse"));
    }

    #[test]
    fn test_unmatched_temporal_filter_rejected() {
        let (clean, filters) =
            sql_rewriter::rewrite("SELECT a FROM logs FOR TODAY").unwrap();
        let statements = parser::parse(&clean).unwrap();
        // replace the statements with ones that no longer mention 'logs'
        let other = parser::parse("SELECT 1").unwrap();
        assert!(rewrite(other, &filters, &[], None).is_err());
        assert!(rewrite(statements, &filters, &[], None).is_ok());
    }
}
