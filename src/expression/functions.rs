//! Scalar function registry.
//!
//! Maps a function name to its kernel and return type. The table is built
//! once at init and immutable afterwards; `SHOW FUNCTIONS` reads it.
//!
//! Kernels are elementwise over [`Datum`] views of the argument arrays.
//! NULL propagates through every kernel; NaN is converted to NULL only in
//! the null-aware kernels (COALESCE, NULLIF). Strict casts raise
//! `TypeMismatch`, `TRY_*` casts yield NULL instead.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDateTime, Timelike, Utc};
use lazy_static::lazy_static;

use crate::errors::{EngineError, Result};
use crate::morsel::{Array, DataType, Datum};

/// A scalar kernel: argument columns plus the row count (for zero-argument
/// functions) to one output column.
pub type ScalarKernel = fn(&[Array], usize) -> Result<Array>;

#[derive(Clone)]
pub struct FunctionEntry {
    pub name: &'static str,
    pub kernel: ScalarKernel,
    /// Result type given argument types
    pub return_type: fn(&[DataType]) -> DataType,
}

pub fn lookup(name: &str) -> Option<FunctionEntry> {
    FUNCTIONS.get(name.to_uppercase().as_str()).cloned()
}

pub fn function_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = FUNCTIONS.keys().copied().collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// helpers

fn rows_of(args: &[Array], rows: usize) -> usize {
    args.first().map(|a| a.len()).unwrap_or(rows)
}

fn map_unary(args: &[Array], rows: usize, f: impl Fn(Datum) -> Result<Datum>) -> Result<Array> {
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let value = args[0].get(i);
        if value.is_null() {
            out.push(Datum::Null);
        } else {
            out.push(f(value)?);
        }
    }
    Array::infer_from_datums(out)
}

fn map_binary(
    args: &[Array],
    rows: usize,
    f: impl Fn(Datum, Datum) -> Result<Datum>,
) -> Result<Array> {
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let a = args[0].get(i);
        let b = args[1].get(i);
        if a.is_null() || b.is_null() {
            out.push(Datum::Null);
        } else {
            out.push(f(a, b)?);
        }
    }
    Array::infer_from_datums(out)
}

fn want_varchar(value: &Datum) -> Result<String> {
    match value {
        Datum::Varchar(s) => Ok(s.clone()),
        other => Err(EngineError::TypeMismatch(format!(
            "expected VARCHAR, got {}",
            other.data_type()
        ))),
    }
}

fn want_f64(value: &Datum) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        EngineError::TypeMismatch(format!("expected a numeric value, got {}", value.data_type()))
    })
}

fn want_timestamp(value: &Datum) -> Result<NaiveDateTime> {
    match value {
        Datum::Timestamp(ts) => Ok(*ts),
        other => Err(EngineError::TypeMismatch(format!(
            "expected TIMESTAMP, got {}",
            other.data_type()
        ))),
    }
}

fn arg_count(args: &[Array], expected: std::ops::RangeInclusive<usize>, name: &str) -> Result<()> {
    if expected.contains(&args.len()) {
        Ok(())
    } else {
        Err(EngineError::Sql(format!(
            "{name} expects {} to {} arguments, got {}",
            expected.start(),
            expected.end(),
            args.len()
        )))
    }
}

// ---------------------------------------------------------------------------
// string functions

fn fn_upper(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "UPPER")?;
    map_unary(args, rows, |v| Ok(Datum::Varchar(want_varchar(&v)?.to_uppercase())))
}

fn fn_lower(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "LOWER")?;
    map_unary(args, rows, |v| Ok(Datum::Varchar(want_varchar(&v)?.to_lowercase())))
}

fn fn_length(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "LENGTH")?;
    map_unary(args, rows, |v| match v {
        Datum::Varchar(s) => Ok(Datum::Integer(s.chars().count() as i64)),
        Datum::List(items) => Ok(Datum::Integer(items.len() as i64)),
        other => Err(EngineError::TypeMismatch(format!(
            "LENGTH expects VARCHAR or LIST, got {}",
            other.data_type()
        ))),
    })
}

fn fn_trim(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "TRIM")?;
    map_unary(args, rows, |v| Ok(Datum::Varchar(want_varchar(&v)?.trim().to_string())))
}

fn fn_reverse(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "REVERSE")?;
    map_unary(args, rows, |v| {
        Ok(Datum::Varchar(want_varchar(&v)?.chars().rev().collect()))
    })
}

fn fn_left(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 2..=2, "LEFT")?;
    map_binary(args, rows, |s, n| {
        let s = want_varchar(&s)?;
        let n = want_f64(&n)? as usize;
        Ok(Datum::Varchar(s.chars().take(n).collect()))
    })
}

fn fn_right(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 2..=2, "RIGHT")?;
    map_binary(args, rows, |s, n| {
        let s = want_varchar(&s)?;
        let n = want_f64(&n)? as usize;
        let chars: Vec<char> = s.chars().collect();
        let start = chars.len().saturating_sub(n);
        Ok(Datum::Varchar(chars[start..].iter().collect()))
    })
}

fn fn_concat(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=16, "CONCAT")?;
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    'rows: for i in 0..count {
        let mut joined = String::new();
        for arg in args {
            match arg.get(i) {
                Datum::Null => {
                    out.push(Datum::Null);
                    continue 'rows;
                }
                value => joined.push_str(&value.to_string()),
            }
        }
        out.push(Datum::Varchar(joined));
    }
    Array::infer_from_datums(out)
}

// ---------------------------------------------------------------------------
// numeric functions

fn fn_abs(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "ABS")?;
    map_unary(args, rows, |v| match v {
        Datum::Integer(i) => Ok(Datum::Integer(i.abs())),
        other => Ok(Datum::Double(want_f64(&other)?.abs())),
    })
}

fn fn_ceil(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "CEIL")?;
    map_unary(args, rows, |v| Ok(Datum::Double(want_f64(&v)?.ceil())))
}

fn fn_floor(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "FLOOR")?;
    map_unary(args, rows, |v| Ok(Datum::Double(want_f64(&v)?.floor())))
}

fn fn_round(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=2, "ROUND")?;
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let value = args[0].get(i);
        if value.is_null() {
            out.push(Datum::Null);
            continue;
        }
        let places = if args.len() > 1 {
            match args[1].get(i) {
                Datum::Null => {
                    out.push(Datum::Null);
                    continue;
                }
                p => want_f64(&p)? as i32,
            }
        } else {
            0
        };
        let factor = 10f64.powi(places);
        out.push(Datum::Double((want_f64(&value)? * factor).round() / factor));
    }
    Array::infer_from_datums(out)
}

fn fn_sqrt(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "SQRT")?;
    map_unary(args, rows, |v| Ok(Datum::Double(want_f64(&v)?.sqrt())))
}

fn fn_sign(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "SIGN")?;
    map_unary(args, rows, |v| {
        let value = want_f64(&v)?;
        Ok(Datum::Integer(if value > 0.0 {
            1
        } else if value < 0.0 {
            -1
        } else {
            0
        }))
    })
}

// ---------------------------------------------------------------------------
// null-aware functions

/// NaN counts as NULL here, and only here (plus NULLIF which shares the
/// normalisation).
fn normalise_nan(value: Datum) -> Datum {
    match value {
        Datum::Double(d) if d.is_nan() => Datum::Null,
        other => other,
    }
}

fn fn_coalesce(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=16, "COALESCE")?;
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let mut found = Datum::Null;
        for arg in args {
            let value = normalise_nan(arg.get(i));
            if !value.is_null() {
                found = value;
                break;
            }
        }
        out.push(found);
    }
    Array::infer_from_datums(out)
}

fn fn_nullif(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 2..=2, "NULLIF")?;
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let a = normalise_nan(args[0].get(i));
        let b = normalise_nan(args[1].get(i));
        if !a.is_null() && a == b {
            out.push(Datum::Null);
        } else {
            out.push(a);
        }
    }
    Array::infer_from_datums(out)
}

/// Subscript into a LIST (numeric key) or STRUCT (string key); misses are
/// NULL, not errors.
fn fn_get(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 2..=2, "GET")?;
    map_binary(args, rows, |value, key| match (value, key) {
        (Datum::List(items), key) => {
            let index = want_f64(&key)? as usize;
            Ok(items.get(index).cloned().unwrap_or(Datum::Null))
        }
        (Datum::Struct(map), Datum::Varchar(key)) => Ok(map
            .get(&key)
            .map(Datum::from_json)
            .unwrap_or(Datum::Null)),
        (value, key) => Err(EngineError::TypeMismatch(format!(
            "cannot subscript {} with {}",
            value.data_type(),
            key.data_type()
        ))),
    })
}

// ---------------------------------------------------------------------------
// date and time functions

fn today_midnight() -> NaiveDateTime {
    Utc::now()
        .naive_utc()
        .date()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
}

fn fn_now(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 0..=0, "NOW")?;
    Ok(Array::repeat(Datum::Timestamp(Utc::now().naive_utc()), rows))
}

fn fn_today(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 0..=0, "TODAY")?;
    Ok(Array::repeat(Datum::Timestamp(today_midnight()), rows))
}

fn fn_year(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "YEAR")?;
    map_unary(args, rows, |v| {
        Ok(Datum::Integer(want_timestamp(&v)?.year() as i64))
    })
}

fn fn_month(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "MONTH")?;
    map_unary(args, rows, |v| {
        Ok(Datum::Integer(want_timestamp(&v)?.month() as i64))
    })
}

fn fn_day(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "DAY")?;
    map_unary(args, rows, |v| {
        Ok(Datum::Integer(want_timestamp(&v)?.day() as i64))
    })
}

fn fn_date(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "DATE")?;
    map_unary(args, rows, |v| {
        let ts = cast_datum(&v, DataType::Timestamp)?;
        let ts = want_timestamp(&ts)?;
        Ok(Datum::Timestamp(
            ts.date().and_hms_opt(0, 0, 0).unwrap_or(ts),
        ))
    })
}

fn fn_hour(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 1..=1, "HOUR")?;
    map_unary(args, rows, |v| {
        Ok(Datum::Integer(want_timestamp(&v)?.hour() as i64))
    })
}

// ---------------------------------------------------------------------------
// other functions

fn fn_version(args: &[Array], rows: usize) -> Result<Array> {
    arg_count(args, 0..=0, "VERSION")?;
    Ok(Array::repeat(
        Datum::Varchar(env!("CARGO_PKG_VERSION").to_string()),
        rows,
    ))
}

// ---------------------------------------------------------------------------
// casts

pub(crate) fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let trimmed = text.trim().trim_end_matches('Z');
    for format in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One scalar cast; shared by the strict and TRY_ kernels.
fn cast_datum(value: &Datum, target: DataType) -> Result<Datum> {
    let fail = || {
        EngineError::TypeMismatch(format!(
            "cannot cast {} value '{}' to {}",
            value.data_type(),
            value,
            target
        ))
    };
    if value.is_null() {
        return Ok(Datum::Null);
    }
    match target {
        DataType::Boolean => match value {
            Datum::Boolean(b) => Ok(Datum::Boolean(*b)),
            Datum::Integer(i) => Ok(Datum::Boolean(*i != 0)),
            Datum::Varchar(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Ok(Datum::Boolean(true)),
                "false" | "f" | "0" | "no" => Ok(Datum::Boolean(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        DataType::Integer => match value {
            Datum::Integer(i) => Ok(Datum::Integer(*i)),
            Datum::Double(d) if d.is_finite() => Ok(Datum::Integer(*d as i64)),
            Datum::Boolean(b) => Ok(Datum::Integer(i64::from(*b))),
            Datum::Varchar(s) => s.trim().parse::<i64>().map(Datum::Integer).map_err(|_| fail()),
            _ => Err(fail()),
        },
        DataType::Double => match value {
            Datum::Double(d) => Ok(Datum::Double(*d)),
            Datum::Integer(i) => Ok(Datum::Double(*i as f64)),
            Datum::Boolean(b) => Ok(Datum::Double(if *b { 1.0 } else { 0.0 })),
            Datum::Varchar(s) => s.trim().parse::<f64>().map(Datum::Double).map_err(|_| fail()),
            _ => Err(fail()),
        },
        DataType::Varchar => Ok(Datum::Varchar(value.to_string())),
        DataType::Timestamp => match value {
            Datum::Timestamp(ts) => Ok(Datum::Timestamp(*ts)),
            Datum::Integer(i) => chrono::DateTime::from_timestamp(*i, 0)
                .map(|dt| Datum::Timestamp(dt.naive_utc()))
                .ok_or_else(fail),
            Datum::Varchar(s) => parse_timestamp(s).map(Datum::Timestamp).ok_or_else(fail),
            _ => Err(fail()),
        },
        DataType::Struct => match value {
            Datum::Struct(map) => Ok(Datum::Struct(map.clone())),
            Datum::Varchar(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(serde_json::Value::Object(map)) => Ok(Datum::Struct(map)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        _ => Err(fail()),
    }
}

fn cast_kernel(args: &[Array], rows: usize, target: DataType, lenient: bool) -> Result<Array> {
    let count = rows_of(args, rows);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let value = args[0].get(i);
        match cast_datum(&value, target) {
            Ok(cast) => out.push(cast),
            Err(_) if lenient => out.push(Datum::Null),
            Err(error) => return Err(error),
        }
    }
    Array::from_datums(target, out)
}

macro_rules! cast_fns {
    ($strict:ident, $lenient:ident, $target:expr) => {
        fn $strict(args: &[Array], rows: usize) -> Result<Array> {
            cast_kernel(args, rows, $target, false)
        }
        fn $lenient(args: &[Array], rows: usize) -> Result<Array> {
            cast_kernel(args, rows, $target, true)
        }
    };
}

cast_fns!(fn_cast_boolean, fn_try_cast_boolean, DataType::Boolean);
cast_fns!(fn_cast_integer, fn_try_cast_integer, DataType::Integer);
cast_fns!(fn_cast_double, fn_try_cast_double, DataType::Double);
cast_fns!(fn_cast_varchar, fn_try_cast_varchar, DataType::Varchar);
cast_fns!(fn_cast_timestamp, fn_try_cast_timestamp, DataType::Timestamp);
cast_fns!(fn_cast_struct, fn_try_cast_struct, DataType::Struct);

// ---------------------------------------------------------------------------
// registry

fn rt_varchar(_: &[DataType]) -> DataType {
    DataType::Varchar
}
fn rt_integer(_: &[DataType]) -> DataType {
    DataType::Integer
}
fn rt_double(_: &[DataType]) -> DataType {
    DataType::Double
}
fn rt_boolean(_: &[DataType]) -> DataType {
    DataType::Boolean
}
fn rt_timestamp(_: &[DataType]) -> DataType {
    DataType::Timestamp
}
fn rt_struct(_: &[DataType]) -> DataType {
    DataType::Struct
}
fn rt_first(args: &[DataType]) -> DataType {
    args.first().copied().unwrap_or(DataType::Null)
}
fn rt_first_nonnull(args: &[DataType]) -> DataType {
    args.iter()
        .copied()
        .find(|t| *t != DataType::Null)
        .unwrap_or(DataType::Null)
}
fn rt_abs(args: &[DataType]) -> DataType {
    match args.first() {
        Some(DataType::Integer) => DataType::Integer,
        _ => DataType::Double,
    }
}

lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, FunctionEntry> = {
        let mut m: HashMap<&'static str, FunctionEntry> = HashMap::new();
        let mut add = |name: &'static str, kernel: ScalarKernel, return_type: fn(&[DataType]) -> DataType| {
            m.insert(name, FunctionEntry { name, kernel, return_type });
        };

        // strings
        add("UPPER", fn_upper, rt_varchar);
        add("LOWER", fn_lower, rt_varchar);
        add("LENGTH", fn_length, rt_integer);
        add("TRIM", fn_trim, rt_varchar);
        add("REVERSE", fn_reverse, rt_varchar);
        add("LEFT", fn_left, rt_varchar);
        add("RIGHT", fn_right, rt_varchar);
        add("CONCAT", fn_concat, rt_varchar);

        // numbers
        add("ABS", fn_abs, rt_abs);
        add("CEIL", fn_ceil, rt_double);
        add("CEILING", fn_ceil, rt_double);
        add("FLOOR", fn_floor, rt_double);
        add("ROUND", fn_round, rt_double);
        add("SQRT", fn_sqrt, rt_double);
        add("SIGN", fn_sign, rt_integer);

        // null handling
        add("COALESCE", fn_coalesce, rt_first_nonnull);
        add("NULLIF", fn_nullif, rt_first);
        add("GET", fn_get, rt_first);

        // dates
        add("NOW", fn_now, rt_timestamp);
        add("TODAY", fn_today, rt_timestamp);
        add("YEAR", fn_year, rt_integer);
        add("MONTH", fn_month, rt_integer);
        add("DAY", fn_day, rt_integer);
        add("HOUR", fn_hour, rt_integer);
        add("DATE", fn_date, rt_timestamp);

        // conversions; STRING/STR are aliases for VARCHAR
        add("BOOLEAN", fn_cast_boolean, rt_boolean);
        add("INTEGER", fn_cast_integer, rt_integer);
        add("DOUBLE", fn_cast_double, rt_double);
        add("VARCHAR", fn_cast_varchar, rt_varchar);
        add("STRING", fn_cast_varchar, rt_varchar);
        add("STR", fn_cast_varchar, rt_varchar);
        add("TIMESTAMP", fn_cast_timestamp, rt_timestamp);
        add("STRUCT", fn_cast_struct, rt_struct);
        add("TRY_BOOLEAN", fn_try_cast_boolean, rt_boolean);
        add("TRY_INTEGER", fn_try_cast_integer, rt_integer);
        add("TRY_DOUBLE", fn_try_cast_double, rt_double);
        add("TRY_VARCHAR", fn_try_cast_varchar, rt_varchar);
        add("TRY_TIMESTAMP", fn_try_cast_timestamp, rt_timestamp);
        add("TRY_STRUCT", fn_try_cast_struct, rt_struct);

        add("VERSION", fn_version, rt_varchar);

        m
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varchar(values: &[&str]) -> Array {
        Array::Varchar(values.iter().map(|s| Some(s.to_string())).collect())
    }

    #[test]
    fn test_upper() {
        let result = fn_upper(&[varchar(&["earth", "Mars"])], 2).unwrap();
        assert_eq!(result.get(0), Datum::Varchar("EARTH".to_string()));
        assert_eq!(result.get(1), Datum::Varchar("MARS".to_string()));
    }

    #[test]
    fn test_coalesce_treats_nan_as_null() {
        let first = Array::Double(vec![Some(f64::NAN), Some(1.5)]);
        let second = Array::Double(vec![Some(9.0), Some(2.0)]);
        let result = fn_coalesce(&[first, second], 2).unwrap();
        assert_eq!(result.get(0), Datum::Double(9.0));
        assert_eq!(result.get(1), Datum::Double(1.5));
    }

    #[test]
    fn test_strict_cast_fails_lenient_nulls() {
        let values = varchar(&["12", "pebble"]);
        assert!(fn_cast_integer(&[values.clone()], 2).is_err());
        let result = fn_try_cast_integer(&[values], 2).unwrap();
        assert_eq!(result.get(0), Datum::Integer(12));
        assert_eq!(result.get(1), Datum::Null);
    }

    #[test]
    fn test_division_of_round_places() {
        let result = fn_round(
            &[
                Array::Double(vec![Some(2.71828)]),
                Array::Integer(vec![Some(2)]),
            ],
            1,
        )
        .unwrap();
        assert_eq!(result.get(0), Datum::Double(2.72));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2021-02-21").is_some());
        assert!(parse_timestamp("2021-02-21T12:00:30").is_some());
        assert!(parse_timestamp("2021-02-21 12:00:30.500").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_nulls_propagate() {
        let result = fn_length(&[Array::Varchar(vec![None, Some("abc".to_string())])], 2).unwrap();
        assert_eq!(result.get(0), Datum::Null);
        assert_eq!(result.get(1), Datum::Integer(3));
    }
}
