//! Aggregate functions.
//!
//! `COUNT(col)` ignores nulls; `COUNT(*)` counts all rows including nulls —
//! the aggregation operators arrange for `*` to arrive as a synthetic
//! column of ones, so the distinction is handled by the caller choosing the
//! input column. Every other aggregator skips nulls.

use std::collections::HashSet;

use crate::errors::{EngineError, Result};
use crate::morsel::{DataType, Datum, DatumKey};

/// Names accepted in aggregator position, including aliases.
const AGGREGATORS: [&str; 20] = [
    "ALL",
    "ANY",
    "ANY_VALUE",
    "APPROXIMATE_MEDIAN",
    "ARRAY_AGG",
    "AVG",
    "AVERAGE",
    "COUNT",
    "COUNT_DISTINCT",
    "MAX",
    "MAXIMUM",
    "MEAN",
    "MIN",
    "MINIMUM",
    "MIN_MAX",
    "ONE",
    "PRODUCT",
    "STDDEV",
    "SUM",
    "VARIANCE",
];

pub fn is_aggregator_name(name: &str) -> bool {
    AGGREGATORS.contains(&name.to_uppercase().as_str())
}

pub fn aggregator_names() -> Vec<&'static str> {
    AGGREGATORS.to_vec()
}

/// Result type of an aggregator over a column of `input` type.
pub fn return_type(name: &str, input: DataType) -> DataType {
    match name.to_uppercase().as_str() {
        "COUNT" | "COUNT_DISTINCT" => DataType::Integer,
        "ALL" | "ANY" => DataType::Boolean,
        "AVG" | "AVERAGE" | "MEAN" | "APPROXIMATE_MEDIAN" | "STDDEV" | "VARIANCE" | "PRODUCT" => {
            DataType::Double
        }
        "SUM" => match input {
            DataType::Integer => DataType::Integer,
            _ => DataType::Double,
        },
        "ARRAY_AGG" | "MIN_MAX" => DataType::List,
        _ => input,
    }
}

/// Apply one aggregator to the values of a group.
pub fn apply(
    name: &str,
    values: &[Datum],
    distinct: bool,
    order_ascending: Option<bool>,
    limit: Option<usize>,
) -> Result<Datum> {
    let canonical = name.to_uppercase();
    match canonical.as_str() {
        "COUNT" => Ok(Datum::Integer(
            values.iter().filter(|v| !v.is_null()).count() as i64,
        )),
        "COUNT_DISTINCT" => {
            let mut seen: HashSet<DatumKey> = HashSet::new();
            for value in values.iter().filter(|v| !v.is_null()) {
                seen.insert(DatumKey::from(value));
            }
            Ok(Datum::Integer(seen.len() as i64))
        }
        "SUM" => numeric_fold(values, &canonical, |numbers| numbers.iter().sum::<f64>()),
        "PRODUCT" => numeric_fold(values, &canonical, |numbers| {
            numbers.iter().product::<f64>()
        }),
        "AVG" | "AVERAGE" | "MEAN" => numeric_fold(values, &canonical, |numbers| {
            numbers.iter().sum::<f64>() / numbers.len() as f64
        }),
        "APPROXIMATE_MEDIAN" => numeric_fold(values, &canonical, |numbers| {
            let mut sorted = numbers.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }),
        "STDDEV" => numeric_fold(values, &canonical, |numbers| variance_of(numbers).sqrt()),
        "VARIANCE" => numeric_fold(values, &canonical, variance_of),
        "MIN" | "MINIMUM" => Ok(values
            .iter()
            .filter(|v| !v.is_null())
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Datum::Null)),
        "MAX" | "MAXIMUM" => Ok(values
            .iter()
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Datum::Null)),
        "MIN_MAX" => {
            let min = apply("MIN", values, false, None, None)?;
            let max = apply("MAX", values, false, None, None)?;
            Ok(Datum::List(vec![min, max]))
        }
        "ANY_VALUE" | "ONE" => Ok(values
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Datum::Null)),
        "ALL" | "ANY" => {
            let mut booleans = Vec::new();
            for value in values.iter().filter(|v| !v.is_null()) {
                match value {
                    Datum::Boolean(b) => booleans.push(*b),
                    other => {
                        return Err(EngineError::TypeMismatch(format!(
                            "{canonical} expects BOOLEAN values, got {}",
                            other.data_type()
                        )))
                    }
                }
            }
            if booleans.is_empty() {
                return Ok(Datum::Null);
            }
            Ok(Datum::Boolean(if canonical == "ALL" {
                booleans.iter().all(|b| *b)
            } else {
                booleans.iter().any(|b| *b)
            }))
        }
        "ARRAY_AGG" => {
            let mut collected: Vec<Datum> = values.to_vec();
            if distinct {
                let mut seen: HashSet<DatumKey> = HashSet::new();
                collected.retain(|value| seen.insert(DatumKey::from(value)));
            }
            if let Some(ascending) = order_ascending {
                collected.sort_by(|a, b| {
                    let ordering = a.sort_cmp(b);
                    if ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                });
            }
            if let Some(limit) = limit {
                collected.truncate(limit);
            }
            Ok(Datum::List(collected))
        }
        other => Err(EngineError::UnsupportedSyntax(format!(
            "unknown aggregator '{other}'"
        ))),
    }
}

/// Population variance; matches the columnar kernels this replaces.
fn variance_of(numbers: &[f64]) -> f64 {
    let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
    numbers.iter().map(|n| (n - mean).powi(2)).sum::<f64>() / numbers.len() as f64
}

fn numeric_fold(
    values: &[Datum],
    name: &str,
    fold: impl Fn(&[f64]) -> f64,
) -> Result<Datum> {
    let mut integers_only = true;
    let mut numbers = Vec::with_capacity(values.len());
    for value in values.iter().filter(|v| !v.is_null()) {
        if !matches!(value, Datum::Integer(_)) {
            integers_only = false;
        }
        numbers.push(value.as_f64().ok_or_else(|| {
            EngineError::TypeMismatch(format!(
                "{name} expects numeric values, got {}",
                value.data_type()
            ))
        })?);
    }
    if numbers.is_empty() {
        return Ok(Datum::Null);
    }
    let result = fold(&numbers);
    if name == "SUM" && integers_only {
        Ok(Datum::Integer(result as i64))
    } else {
        Ok(Datum::Double(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed() -> Vec<Datum> {
        vec![
            Datum::Integer(3),
            Datum::Null,
            Datum::Integer(1),
            Datum::Integer(3),
        ]
    }

    #[test]
    fn test_count_ignores_nulls() {
        assert_eq!(
            apply("COUNT", &mixed(), false, None, None).unwrap(),
            Datum::Integer(3)
        );
    }

    #[test]
    fn test_count_distinct() {
        assert_eq!(
            apply("COUNT_DISTINCT", &mixed(), false, None, None).unwrap(),
            Datum::Integer(2)
        );
    }

    #[test]
    fn test_sum_stays_integer() {
        assert_eq!(
            apply("SUM", &mixed(), false, None, None).unwrap(),
            Datum::Integer(7)
        );
        let doubles = vec![Datum::Double(1.5), Datum::Integer(1)];
        assert_eq!(
            apply("SUM", &doubles, false, None, None).unwrap(),
            Datum::Double(2.5)
        );
    }

    #[test]
    fn test_empty_aggregates_are_null() {
        assert_eq!(apply("SUM", &[], false, None, None).unwrap(), Datum::Null);
        assert_eq!(apply("MIN", &[], false, None, None).unwrap(), Datum::Null);
        assert_eq!(
            apply("COUNT", &[], false, None, None).unwrap(),
            Datum::Integer(0)
        );
    }

    #[test]
    fn test_array_agg_distinct_order_limit() {
        let result = apply("ARRAY_AGG", &mixed(), true, Some(true), Some(2)).unwrap();
        // distinct keeps first occurrence (3, null, 1), order sorts with
        // nulls last (1, 3, null), limit truncates
        assert_eq!(
            result,
            Datum::List(vec![Datum::Integer(1), Datum::Integer(3)])
        );
    }

    #[test]
    fn test_min_max_pair() {
        let result = apply("MIN_MAX", &mixed(), false, None, None).unwrap();
        assert_eq!(
            result,
            Datum::List(vec![Datum::Integer(1), Datum::Integer(3)])
        );
    }

    #[test]
    fn test_all_any() {
        let values = vec![Datum::Boolean(true), Datum::Boolean(false), Datum::Null];
        assert_eq!(
            apply("ALL", &values, false, None, None).unwrap(),
            Datum::Boolean(false)
        );
        assert_eq!(
            apply("ANY", &values, false, None, None).unwrap(),
            Datum::Boolean(true)
        );
    }
}
