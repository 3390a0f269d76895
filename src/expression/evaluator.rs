//! Expression evaluation over morsels.
//!
//! `evaluate` turns a bound expression into one output array. When an
//! expression already has a bound identity present in the morsel (a column
//! materialised by an upstream step) the column is reused rather than
//! re-evaluated; that is what lets aggregators and sort keys see scalar
//! inputs.

use std::collections::HashMap;

use regex::Regex;

use crate::errors::{EngineError, Result};
use crate::expression::{functions, BinaryOp, ComparisonOp, Expression, ExpressionKind, UnaryOp};
use crate::morsel::{Array, DataType, Datum, DatumKey, Morsel};

pub fn evaluate(expression: &Expression, morsel: &Morsel) -> Result<Array> {
    // a column already computed under this identity wins over re-evaluation
    if let Some(identity) = expression.identity() {
        if let Some(column) = morsel.column(identity) {
            return Ok(column.values.clone());
        }
    }

    match &expression.kind {
        ExpressionKind::Literal(datum) => Ok(Array::repeat(datum.clone(), morsel.num_rows())),
        ExpressionKind::Identifier { name, .. } => {
            let identity = expression.identity().ok_or_else(|| {
                EngineError::Internal(format!("identifier '{name}' reached execution unbound"))
            })?;
            morsel
                .column(identity)
                .map(|column| column.values.clone())
                .ok_or_else(|| {
                    EngineError::Internal(format!(
                        "column '{name}' ({identity}) missing from input morsel"
                    ))
                })
        }
        ExpressionKind::Wildcard { .. } => Err(EngineError::Internal(
            "wildcard evaluated in scalar context".to_string(),
        )),
        ExpressionKind::Function { name, parameters } => {
            let entry = functions::lookup(name).ok_or_else(|| {
                EngineError::UnsupportedSyntax(format!("function '{name}' is not defined"))
            })?;
            let args: Vec<Array> = parameters
                .iter()
                .map(|p| evaluate(p, morsel))
                .collect::<Result<_>>()?;
            (entry.kernel)(&args, morsel.num_rows())
        }
        ExpressionKind::Aggregator { name, .. } => Err(EngineError::Internal(format!(
            "aggregator '{name}' evaluated outside an aggregation operator"
        ))),
        ExpressionKind::BinaryOperator { op, left, right } => {
            let left = evaluate(left, morsel)?;
            let right = evaluate(right, morsel)?;
            binary_kernel(*op, &left, &right)
        }
        ExpressionKind::ComparisonOperator { op, left, right } => {
            let left = evaluate(left, morsel)?;
            let right = evaluate(right, morsel)?;
            comparison_kernel(*op, &left, &right)
        }
        ExpressionKind::UnaryOperator { op, operand } => {
            let operand = evaluate(operand, morsel)?;
            unary_kernel(*op, &operand)
        }
        ExpressionKind::Nested(inner) => evaluate(inner, morsel),
        ExpressionKind::And { left, right } => {
            let left = boolean_values(&evaluate(left, morsel)?)?;
            let right = boolean_values(&evaluate(right, morsel)?)?;
            Ok(Array::Boolean(
                left.iter()
                    .zip(&right)
                    .map(|(a, b)| match (a, b) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    })
                    .collect(),
            ))
        }
        ExpressionKind::Or { left, right } => {
            let left = boolean_values(&evaluate(left, morsel)?)?;
            let right = boolean_values(&evaluate(right, morsel)?)?;
            Ok(Array::Boolean(
                left.iter()
                    .zip(&right)
                    .map(|(a, b)| match (a, b) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    })
                    .collect(),
            ))
        }
        ExpressionKind::Not(inner) => {
            let inner = boolean_values(&evaluate(inner, morsel)?)?;
            Ok(Array::Boolean(inner.iter().map(|v| v.map(|b| !b)).collect()))
        }
    }
}

/// Evaluate each expression and append its result under the expression's
/// bound identity, skipping columns already present. This is step (1) of
/// the evaluation-ordering contract shared by the projection, selection,
/// sort, distinct and aggregation operators.
pub fn evaluate_and_append(expressions: &[&Expression], morsel: Morsel) -> Result<Morsel> {
    let mut morsel = morsel;
    for expression in expressions {
        let identity = match expression.identity() {
            Some(identity) => identity.to_string(),
            None => continue,
        };
        if morsel.has_column(&identity) {
            continue;
        }
        let values = evaluate(expression, &morsel)?;
        morsel = morsel.append_column(identity, values)?;
    }
    Ok(morsel)
}

/// A predicate result as a selection mask; NULL rows are filtered out.
pub fn boolean_mask(array: &Array) -> Result<Vec<bool>> {
    Ok(boolean_values(array)?
        .into_iter()
        .map(|v| v.unwrap_or(false))
        .collect())
}

fn boolean_values(array: &Array) -> Result<Vec<Option<bool>>> {
    match array {
        Array::Boolean(values) => Ok(values.clone()),
        Array::Null(n) => Ok(vec![None; *n]),
        other => Err(EngineError::TypeMismatch(format!(
            "predicate must evaluate to BOOLEAN, got {}",
            other.data_type()
        ))),
    }
}

fn binary_kernel(op: BinaryOp, left: &Array, right: &Array) -> Result<Array> {
    let rows = left.len().max(right.len());
    let mut out = Vec::with_capacity(rows);
    for i in 0..rows {
        let a = left.get(i.min(left.len().saturating_sub(1)));
        let b = right.get(i.min(right.len().saturating_sub(1)));
        out.push(binary_scalar(op, a, b)?);
    }
    Array::infer_from_datums(out)
}

fn binary_scalar(op: BinaryOp, a: Datum, b: Datum) -> Result<Datum> {
    if a.is_null() || b.is_null() {
        return Ok(Datum::Null);
    }
    if op == BinaryOp::StringConcat {
        return Ok(Datum::Varchar(format!("{a}{b}")));
    }
    let integer_args = matches!((&a, &b), (Datum::Integer(_), Datum::Integer(_)));
    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(EngineError::TypeMismatch(format!(
                "cannot apply '{op}' to {} and {}",
                a.data_type(),
                b.data_type()
            )))
        }
    };
    match op {
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply => {
            if integer_args {
                let (ai, bi) = (x as i64, y as i64);
                let result = match op {
                    BinaryOp::Plus => ai.checked_add(bi),
                    BinaryOp::Minus => ai.checked_sub(bi),
                    _ => ai.checked_mul(bi),
                };
                Ok(result.map(Datum::Integer).unwrap_or(Datum::Null))
            } else {
                let result = match op {
                    BinaryOp::Plus => x + y,
                    BinaryOp::Minus => x - y,
                    _ => x * y,
                };
                Ok(Datum::Double(result))
            }
        }
        // division by zero is NULL, not an error
        BinaryOp::Divide => {
            if y == 0.0 {
                Ok(Datum::Null)
            } else {
                Ok(Datum::Double(x / y))
            }
        }
        BinaryOp::Modulo => {
            if y == 0.0 {
                Ok(Datum::Null)
            } else if integer_args {
                Ok(Datum::Integer((x as i64) % (y as i64)))
            } else {
                Ok(Datum::Double(x % y))
            }
        }
        BinaryOp::StringConcat => unreachable!(),
    }
}

fn comparison_kernel(op: ComparisonOp, left: &Array, right: &Array) -> Result<Array> {
    let rows = left.len().max(right.len());
    let mut pattern_cache: HashMap<String, Regex> = HashMap::new();
    let mut out: Vec<Option<bool>> = Vec::with_capacity(rows);
    for i in 0..rows {
        let a = left.get(i.min(left.len().saturating_sub(1)));
        let b = right.get(i.min(right.len().saturating_sub(1)));
        out.push(comparison_scalar(op, a, b, &mut pattern_cache)?);
    }
    Ok(Array::Boolean(out))
}

fn comparison_scalar(
    op: ComparisonOp,
    a: Datum,
    b: Datum,
    pattern_cache: &mut HashMap<String, Regex>,
) -> Result<Option<bool>> {
    match op {
        ComparisonOp::In | ComparisonOp::NotIn => {
            if a.is_null() {
                return Ok(None);
            }
            let items = match b {
                Datum::List(items) => items,
                Datum::Null => return Ok(None),
                other => {
                    return Err(EngineError::TypeMismatch(format!(
                        "IN expects a LIST on the right, got {}",
                        other.data_type()
                    )))
                }
            };
            let key = DatumKey::from(&a);
            let found = items.iter().any(|item| DatumKey::from(item) == key);
            Ok(Some(if op == ComparisonOp::In { found } else { !found }))
        }
        ComparisonOp::Like | ComparisonOp::NotLike | ComparisonOp::ILike => {
            if a.is_null() || b.is_null() {
                return Ok(None);
            }
            let (value, pattern) = match (&a, &b) {
                (Datum::Varchar(value), Datum::Varchar(pattern)) => (value, pattern),
                _ => {
                    return Err(EngineError::TypeMismatch(
                        "LIKE expects VARCHAR operands".to_string(),
                    ))
                }
            };
            let case_insensitive = op == ComparisonOp::ILike;
            let cache_key = format!("{case_insensitive}:{pattern}");
            if !pattern_cache.contains_key(&cache_key) {
                let regex = like_to_regex(pattern, case_insensitive)?;
                pattern_cache.insert(cache_key.clone(), regex);
            }
            let matched = pattern_cache[&cache_key].is_match(value);
            Ok(Some(if op == ComparisonOp::NotLike {
                !matched
            } else {
                matched
            }))
        }
        _ => {
            if a.is_null() || b.is_null() {
                return Ok(None);
            }
            let comparable = a.data_type() == b.data_type()
                || (a.as_f64().is_some() && b.as_f64().is_some());
            if !comparable {
                return Err(EngineError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    a.data_type(),
                    b.data_type()
                )));
            }
            let ordering = a.sort_cmp(&b);
            Ok(Some(match op {
                ComparisonOp::Eq => ordering.is_eq(),
                ComparisonOp::NotEq => !ordering.is_eq(),
                ComparisonOp::Lt => ordering.is_lt(),
                ComparisonOp::LtEq => ordering.is_le(),
                ComparisonOp::Gt => ordering.is_gt(),
                ComparisonOp::GtEq => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
    }
}

fn like_to_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        translated.push_str("(?i)");
    }
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated)
        .map_err(|e| EngineError::Sql(format!("invalid LIKE pattern '{pattern}': {e}")))
}

fn unary_kernel(op: UnaryOp, operand: &Array) -> Result<Array> {
    match op {
        UnaryOp::Negative => {
            let values = operand
                .iter()
                .map(|v| match v {
                    Datum::Null => Ok(Datum::Null),
                    Datum::Integer(i) => Ok(Datum::Integer(-i)),
                    Datum::Double(d) => Ok(Datum::Double(-d)),
                    other => Err(EngineError::TypeMismatch(format!(
                        "cannot negate {}",
                        other.data_type()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Array::infer_from_datums(values)
        }
        UnaryOp::IsNull => Ok(Array::Boolean(
            operand.iter().map(|v| Some(v.is_null())).collect(),
        )),
        UnaryOp::IsNotNull => Ok(Array::Boolean(
            operand.iter().map(|v| Some(!v.is_null())).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::new_identity;
    use crate::expression::ColumnBinding;
    use crate::morsel::Column;

    fn bound_identifier(name: &str, identity: &str, data_type: DataType) -> Expression {
        let mut expr = Expression::identifier(None, name);
        expr.binding = Some(ColumnBinding {
            identity: identity.to_string(),
            query_column: name.to_string(),
            data_type,
        });
        expr
    }

    fn numbers() -> (Morsel, Expression) {
        let identity = new_identity();
        let morsel = Morsel::new(vec![Column::new(
            identity.clone(),
            Array::Integer(vec![Some(10), Some(0), None]),
        )])
        .unwrap();
        let expr = bound_identifier("n", &identity, DataType::Integer);
        (morsel, expr)
    }

    #[test]
    fn test_division_by_zero_is_null() {
        let (morsel, n) = numbers();
        let expr = Expression::new(ExpressionKind::BinaryOperator {
            op: BinaryOp::Divide,
            left: Box::new(Expression::literal(Datum::Integer(100))),
            right: Box::new(n),
        });
        let result = evaluate(&expr, &morsel).unwrap();
        assert_eq!(result.get(0), Datum::Double(10.0));
        assert_eq!(result.get(1), Datum::Null);
        assert_eq!(result.get(2), Datum::Null);
    }

    #[test]
    fn test_three_valued_and() {
        let t = Array::Boolean(vec![Some(true), Some(true), Some(true)]);
        let mixed = Array::Boolean(vec![Some(true), Some(false), None]);
        let morsel = Morsel::new(vec![
            Column::new("t", t),
            Column::new("m", mixed),
        ])
        .unwrap();
        let expr = Expression::new(ExpressionKind::And {
            left: Box::new(bound_identifier("t", "t", DataType::Boolean)),
            right: Box::new(bound_identifier("m", "m", DataType::Boolean)),
        });
        let result = evaluate(&expr, &morsel).unwrap();
        assert_eq!(result.get(0), Datum::Boolean(true));
        assert_eq!(result.get(1), Datum::Boolean(false));
        assert_eq!(result.get(2), Datum::Null);
    }

    #[test]
    fn test_like() {
        let names = Array::Varchar(vec![
            Some("Earth".to_string()),
            Some("Mars".to_string()),
        ]);
        let morsel = Morsel::new(vec![Column::new("n", names)]).unwrap();
        let expr = Expression::new(ExpressionKind::ComparisonOperator {
            op: ComparisonOp::Like,
            left: Box::new(bound_identifier("n", "n", DataType::Varchar)),
            right: Box::new(Expression::literal(Datum::Varchar("Ea%".to_string()))),
        });
        let mask = boolean_mask(&evaluate(&expr, &morsel).unwrap()).unwrap();
        assert_eq!(mask, vec![true, false]);
    }

    #[test]
    fn test_evaluate_and_append_skips_existing() {
        let (morsel, n) = numbers();
        let mut computed = Expression::new(ExpressionKind::BinaryOperator {
            op: BinaryOp::Plus,
            left: Box::new(n.clone()),
            right: Box::new(Expression::literal(Datum::Integer(1))),
        });
        computed.binding = Some(ColumnBinding {
            identity: "plus-one".to_string(),
            query_column: "n + 1".to_string(),
            data_type: DataType::Integer,
        });
        let appended = evaluate_and_append(&[&computed], morsel).unwrap();
        assert!(appended.has_column("plus-one"));
        // appending again is a no-op
        let again = evaluate_and_append(&[&computed], appended.clone()).unwrap();
        assert_eq!(again, appended);
    }
}
