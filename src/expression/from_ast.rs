//! Conversion from the parser's AST expressions into engine expressions.
//!
//! Kept deliberately tolerant of parser-library detail: cast targets are
//! matched on their rendered names, and anything outside the supported
//! surface becomes `UnsupportedSyntax` rather than a panic.

use sqlparser::ast as sql;

use crate::errors::{EngineError, Result};
use crate::expression::{
    aggregations, BinaryOp, ComparisonOp, Expression, ExpressionKind, UnaryOp,
};
use crate::morsel::Datum;

pub fn convert_expr(expr: &sql::Expr) -> Result<Expression> {
    match expr {
        sql::Expr::Identifier(ident) => Ok(Expression::identifier(None, ident.value.clone())),
        sql::Expr::CompoundIdentifier(parts) => {
            if parts.is_empty() {
                return Err(EngineError::Sql("empty identifier".to_string()));
            }
            let name = parts[parts.len() - 1].value.clone();
            let qualifier = parts[..parts.len() - 1]
                .iter()
                .map(|p| p.value.clone())
                .collect::<Vec<_>>()
                .join(".");
            Ok(Expression::identifier(Some(qualifier), name))
        }
        sql::Expr::Value(value) => Ok(Expression::literal(literal_from_value(value)?)),
        sql::Expr::BinaryOp { left, op, right } => {
            let left = Box::new(convert_expr(left)?);
            let right = Box::new(convert_expr(right)?);
            Ok(match op {
                sql::BinaryOperator::And => {
                    Expression::new(ExpressionKind::And { left, right })
                }
                sql::BinaryOperator::Or => Expression::new(ExpressionKind::Or { left, right }),
                sql::BinaryOperator::Plus => binary(BinaryOp::Plus, left, right),
                sql::BinaryOperator::Minus => binary(BinaryOp::Minus, left, right),
                sql::BinaryOperator::Multiply => binary(BinaryOp::Multiply, left, right),
                sql::BinaryOperator::Divide => binary(BinaryOp::Divide, left, right),
                sql::BinaryOperator::Modulo => binary(BinaryOp::Modulo, left, right),
                sql::BinaryOperator::StringConcat => {
                    binary(BinaryOp::StringConcat, left, right)
                }
                sql::BinaryOperator::Eq => comparison(ComparisonOp::Eq, left, right),
                sql::BinaryOperator::NotEq => comparison(ComparisonOp::NotEq, left, right),
                sql::BinaryOperator::Lt => comparison(ComparisonOp::Lt, left, right),
                sql::BinaryOperator::LtEq => comparison(ComparisonOp::LtEq, left, right),
                sql::BinaryOperator::Gt => comparison(ComparisonOp::Gt, left, right),
                sql::BinaryOperator::GtEq => comparison(ComparisonOp::GtEq, left, right),
                other => {
                    return Err(EngineError::UnsupportedSyntax(format!(
                        "operator '{other}'"
                    )))
                }
            })
        }
        sql::Expr::UnaryOp { op, expr } => {
            let operand = convert_expr(expr)?;
            match op {
                sql::UnaryOperator::Plus => Ok(operand),
                sql::UnaryOperator::Minus => Ok(Expression::new(ExpressionKind::UnaryOperator {
                    op: UnaryOp::Negative,
                    operand: Box::new(operand),
                })),
                sql::UnaryOperator::Not => {
                    Ok(Expression::new(ExpressionKind::Not(Box::new(operand))))
                }
                other => Err(EngineError::UnsupportedSyntax(format!(
                    "unary operator '{other}'"
                ))),
            }
        }
        sql::Expr::IsNull(inner) => Ok(Expression::new(ExpressionKind::UnaryOperator {
            op: UnaryOp::IsNull,
            operand: Box::new(convert_expr(inner)?),
        })),
        sql::Expr::IsNotNull(inner) => Ok(Expression::new(ExpressionKind::UnaryOperator {
            op: UnaryOp::IsNotNull,
            operand: Box::new(convert_expr(inner)?),
        })),
        sql::Expr::Nested(inner) => Ok(Expression::new(ExpressionKind::Nested(Box::new(
            convert_expr(inner)?,
        )))),
        sql::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let subject = convert_expr(expr)?;
            let lower = comparison(
                ComparisonOp::GtEq,
                Box::new(subject.clone()),
                Box::new(convert_expr(low)?),
            );
            let upper = comparison(
                ComparisonOp::LtEq,
                Box::new(subject),
                Box::new(convert_expr(high)?),
            );
            let both = Expression::new(ExpressionKind::And {
                left: Box::new(lower),
                right: Box::new(upper),
            });
            if *negated {
                Ok(Expression::new(ExpressionKind::Not(Box::new(both))))
            } else {
                Ok(both)
            }
        }
        sql::Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => Ok(comparison(
            if *negated {
                ComparisonOp::NotLike
            } else {
                ComparisonOp::Like
            },
            Box::new(convert_expr(expr)?),
            Box::new(convert_expr(pattern)?),
        )),
        sql::Expr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => {
            let like = comparison(
                ComparisonOp::ILike,
                Box::new(convert_expr(expr)?),
                Box::new(convert_expr(pattern)?),
            );
            if *negated {
                Ok(Expression::new(ExpressionKind::Not(Box::new(like))))
            } else {
                Ok(like)
            }
        }
        sql::Expr::InList {
            expr,
            list,
            negated,
        } => {
            let mut items = Vec::with_capacity(list.len());
            for entry in list {
                match convert_expr(entry)?.kind {
                    ExpressionKind::Literal(datum) => items.push(datum),
                    _ => {
                        return Err(EngineError::UnsupportedSyntax(
                            "IN lists must contain literals".to_string(),
                        ))
                    }
                }
            }
            Ok(comparison(
                if *negated {
                    ComparisonOp::NotIn
                } else {
                    ComparisonOp::In
                },
                Box::new(convert_expr(expr)?),
                Box::new(Expression::literal(Datum::List(items))),
            ))
        }
        sql::Expr::Cast {
            expr, data_type, ..
        } => cast_call(expr, data_type, false),
        sql::Expr::TryCast {
            expr, data_type, ..
        } => cast_call(expr, data_type, true),
        sql::Expr::Function(function) => convert_function(function),
        sql::Expr::ArrayAgg(array_agg) => convert_array_agg(array_agg),
        other => Err(EngineError::UnsupportedSyntax(format!("{other}"))),
    }
}

fn binary(op: BinaryOp, left: Box<Expression>, right: Box<Expression>) -> Expression {
    Expression::new(ExpressionKind::BinaryOperator { op, left, right })
}

fn comparison(op: ComparisonOp, left: Box<Expression>, right: Box<Expression>) -> Expression {
    Expression::new(ExpressionKind::ComparisonOperator { op, left, right })
}

pub fn literal_from_value(value: &sql::Value) -> Result<Datum> {
    match value {
        sql::Value::Number(text, _) => {
            if text.contains('.') || text.contains('e') || text.contains('E') {
                text.parse::<f64>()
                    .map(Datum::Double)
                    .map_err(|_| EngineError::Sql(format!("invalid number literal '{text}'")))
            } else {
                text.parse::<i64>().map(Datum::Integer).or_else(|_| {
                    text.parse::<f64>()
                        .map(Datum::Double)
                        .map_err(|_| EngineError::Sql(format!("invalid number literal '{text}'")))
                })
            }
        }
        sql::Value::SingleQuotedString(s) | sql::Value::DoubleQuotedString(s) => {
            Ok(Datum::Varchar(s.clone()))
        }
        sql::Value::Boolean(b) => Ok(Datum::Boolean(*b)),
        sql::Value::Null => Ok(Datum::Null),
        sql::Value::Placeholder(_) => Err(EngineError::Parameter(
            "a parameter placeholder was not bound to a value".to_string(),
        )),
        other => Err(EngineError::UnsupportedSyntax(format!(
            "literal '{other}'"
        ))),
    }
}

/// Cast target by rendered type name, tolerant of dialect spellings.
fn cast_target(data_type: &sql::DataType) -> Result<&'static str> {
    let rendered = data_type.to_string().to_uppercase();
    let target = if rendered.starts_with("BOOL") {
        "BOOLEAN"
    } else if rendered.contains("INT") {
        "INTEGER"
    } else if rendered.starts_with("FLOAT")
        || rendered.starts_with("DOUBLE")
        || rendered.starts_with("REAL")
        || rendered.starts_with("NUMERIC")
        || rendered.starts_with("DECIMAL")
    {
        "DOUBLE"
    } else if rendered.starts_with("VARCHAR")
        || rendered.starts_with("CHAR")
        || rendered.starts_with("TEXT")
        || rendered.starts_with("STRING")
    {
        "VARCHAR"
    } else if rendered.starts_with("TIMESTAMP")
        || rendered.starts_with("DATETIME")
        || rendered.starts_with("DATE")
    {
        "TIMESTAMP"
    } else if rendered.starts_with("JSON") || rendered.starts_with("STRUCT") {
        "STRUCT"
    } else {
        return Err(EngineError::UnsupportedSyntax(format!(
            "cast to {rendered}"
        )));
    };
    Ok(target)
}

fn cast_call(expr: &sql::Expr, data_type: &sql::DataType, lenient: bool) -> Result<Expression> {
    let target = cast_target(data_type)?;
    let name = if lenient {
        format!("TRY_{target}")
    } else {
        target.to_string()
    };
    Ok(Expression::new(ExpressionKind::Function {
        name,
        parameters: vec![convert_expr(expr)?],
    }))
}

fn convert_function(function: &sql::Function) -> Result<Expression> {
    let name = function
        .name
        .0
        .last()
        .map(|ident| ident.value.to_uppercase())
        .ok_or_else(|| EngineError::Sql("function with no name".to_string()))?;

    let mut parameters = Vec::with_capacity(function.args.len());
    for arg in &function.args {
        match arg {
            sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(expr)) => {
                parameters.push(convert_expr(expr)?);
            }
            sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Wildcard) => {
                parameters.push(Expression::new(ExpressionKind::Wildcard { qualifier: None }));
            }
            sql::FunctionArg::Unnamed(sql::FunctionArgExpr::QualifiedWildcard(qualifier)) => {
                parameters.push(Expression::new(ExpressionKind::Wildcard {
                    qualifier: Some(qualifier.to_string()),
                }));
            }
            sql::FunctionArg::Named { .. } => {
                return Err(EngineError::UnsupportedSyntax(format!(
                    "named arguments in '{name}'"
                )))
            }
        }
    }

    if aggregations::is_aggregator_name(&name) {
        let order_ascending = function
            .order_by
            .first()
            .map(|item| item.asc.unwrap_or(true));
        return Ok(Expression::new(ExpressionKind::Aggregator {
            name,
            parameters,
            distinct: function.distinct,
            order_ascending,
            limit: None,
        }));
    }

    Ok(Expression::new(ExpressionKind::Function { name, parameters }))
}

fn convert_array_agg(array_agg: &sql::ArrayAgg) -> Result<Expression> {
    let parameter = convert_expr(&array_agg.expr)?;
    let order_ascending = array_agg
        .order_by
        .as_ref()
        .and_then(|items| items.first())
        .map(|item| item.asc.unwrap_or(true));
    let limit = match &array_agg.limit {
        Some(limit) => match convert_expr(limit)?.kind {
            ExpressionKind::Literal(Datum::Integer(n)) if n >= 0 => Some(n as usize),
            _ => {
                return Err(EngineError::UnsupportedSyntax(
                    "ARRAY_AGG LIMIT must be a non-negative integer".to_string(),
                ))
            }
        },
        None => None,
    };
    Ok(Expression::new(ExpressionKind::Aggregator {
        name: "ARRAY_AGG".to_string(),
        parameters: vec![parameter],
        distinct: array_agg.distinct,
        order_ascending,
        limit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(text: &str) -> sql::Expr {
        let sql = format!("SELECT {text}");
        let statements = Parser::parse_sql(&MySqlDialect {}, &sql).unwrap();
        match &statements[0] {
            sql::Statement::Query(query) => match query.body.as_ref() {
                sql::SetExpr::Select(select) => match &select.projection[0] {
                    sql::SelectItem::UnnamedExpr(expr) => expr.clone(),
                    _ => panic!("expected unnamed expression"),
                },
                _ => panic!("expected select"),
            },
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_convert_literals() {
        assert_eq!(
            convert_expr(&parse_expr("42")).unwrap().kind,
            ExpressionKind::Literal(Datum::Integer(42))
        );
        assert_eq!(
            convert_expr(&parse_expr("1.5")).unwrap().kind,
            ExpressionKind::Literal(Datum::Double(1.5))
        );
        assert_eq!(
            convert_expr(&parse_expr("'mars'")).unwrap().kind,
            ExpressionKind::Literal(Datum::Varchar("mars".to_string()))
        );
    }

    #[test]
    fn test_count_star_is_aggregator() {
        let expr = convert_expr(&parse_expr("COUNT(*)")).unwrap();
        assert!(matches!(
            expr.kind,
            ExpressionKind::Aggregator { ref name, .. } if name == "COUNT"
        ));
        assert_eq!(expr.to_string(), "COUNT(*)");
    }

    #[test]
    fn test_between_desugars() {
        let expr = convert_expr(&parse_expr("id BETWEEN 1 AND 3")).unwrap();
        assert_eq!(expr.to_string(), "id >= 1 AND id <= 3");
    }

    #[test]
    fn test_in_list() {
        let expr = convert_expr(&parse_expr("id IN (1, 2, 3)")).unwrap();
        assert!(matches!(
            expr.kind,
            ExpressionKind::ComparisonOperator {
                op: ComparisonOp::In,
                ..
            }
        ));
    }

    #[test]
    fn test_cast_maps_to_conversion_function() {
        let expr = convert_expr(&parse_expr("CAST(id AS VARCHAR)")).unwrap();
        assert!(matches!(
            expr.kind,
            ExpressionKind::Function { ref name, .. } if name == "VARCHAR"
        ));
    }

    #[test]
    fn test_unsupported_surface_is_flagged() {
        let result = convert_expr(&parse_expr("CASE WHEN id = 1 THEN 'a' ELSE 'b' END"));
        assert!(matches!(
            result,
            Err(EngineError::UnsupportedSyntax(_))
        ));
    }
}
