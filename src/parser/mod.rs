//! SQL text to AST.
//!
//! A pure function over the cleaned SQL; the heavy lifting is delegated to
//! the `sqlparser` crate (MySQL-ish dialect, the closest match for the
//! accepted surface). Parser failures are wrapped into `EngineError::Sql`
//! with the parser's own positional message preserved.

use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser as SqlParser;

use crate::errors::{EngineError, Result};

/// Parse one or more `;`-separated statements.
pub fn parse(clean_sql: &str) -> Result<Vec<Statement>> {
    if clean_sql.trim().is_empty() {
        return Err(EngineError::MissingSqlStatement);
    }
    SqlParser::parse_sql(&MySqlDialect {}, clean_sql)
        .map_err(|parser_error| EngineError::Sql(parser_error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_statement() {
        let statements = parse("SELECT 1").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_multiple_statements() {
        let statements = parse("SELECT 1; SELECT 2;").unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("  "), Err(EngineError::MissingSqlStatement));
    }

    #[test]
    fn test_parser_message_is_wrapped() {
        let error = parse("SELECT FROM WHERE").unwrap_err();
        assert!(matches!(error, EngineError::Sql(_)));
    }
}
