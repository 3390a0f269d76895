//! Typed columnar arrays and scalar values.
//!
//! The type set is closed: BOOLEAN, INTEGER, DOUBLE, VARCHAR, TIMESTAMP,
//! LIST, STRUCT and NULL. Arrays are immutable once built; operators build
//! new arrays rather than mutating existing ones.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Integer,
    Double,
    Varchar,
    Timestamp,
    List,
    Struct,
    Null,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Double => "DOUBLE",
            DataType::Varchar => "VARCHAR",
            DataType::Timestamp => "TIMESTAMP",
            DataType::List => "LIST",
            DataType::Struct => "STRUCT",
            DataType::Null => "NULL",
        };
        write!(f, "{name}")
    }
}

impl DataType {
    /// The wider of two types when concatenating or comparing columns.
    /// NULL promotes to anything; INTEGER promotes to DOUBLE.
    pub fn promote(self, other: DataType) -> Option<DataType> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (DataType::Null, b) => Some(b),
            (a, DataType::Null) => Some(a),
            (DataType::Integer, DataType::Double) | (DataType::Double, DataType::Integer) => {
                Some(DataType::Double)
            }
            _ => None,
        }
    }
}

/// A single scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Varchar(String),
    Timestamp(NaiveDateTime),
    List(Vec<Datum>),
    Struct(serde_json::Map<String, JsonValue>),
}

impl Datum {
    pub fn data_type(&self) -> DataType {
        match self {
            Datum::Null => DataType::Null,
            Datum::Boolean(_) => DataType::Boolean,
            Datum::Integer(_) => DataType::Integer,
            Datum::Double(_) => DataType::Double,
            Datum::Varchar(_) => DataType::Varchar,
            Datum::Timestamp(_) => DataType::Timestamp,
            Datum::List(_) => DataType::List,
            Datum::Struct(_) => DataType::Struct,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Numeric view used by arithmetic and comparison kernels.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Integer(i) => Some(*i as f64),
            Datum::Double(d) => Some(*d),
            Datum::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Ordering used by Sort and HeapSort. Nulls order after every value;
    /// cross numeric types compare by value.
    pub fn sort_cmp(&self, other: &Datum) -> Ordering {
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Null, _) => Ordering::Greater,
            (_, Datum::Null) => Ordering::Less,
            (Datum::Boolean(a), Datum::Boolean(b)) => a.cmp(b),
            (Datum::Integer(a), Datum::Integer(b)) => a.cmp(b),
            (Datum::Varchar(a), Datum::Varchar(b)) => a.cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Datum::Null => JsonValue::Null,
            Datum::Boolean(b) => JsonValue::Bool(*b),
            Datum::Integer(i) => JsonValue::from(*i),
            Datum::Double(d) => JsonValue::from(*d),
            Datum::Varchar(s) => JsonValue::String(s.clone()),
            Datum::Timestamp(ts) => JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Datum::List(items) => JsonValue::Array(items.iter().map(Datum::to_json).collect()),
            Datum::Struct(map) => JsonValue::Object(map.clone()),
        }
    }

    pub fn from_json(value: &JsonValue) -> Datum {
        match value {
            JsonValue::Null => Datum::Null,
            JsonValue::Bool(b) => Datum::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Datum::Integer(i)
                } else {
                    Datum::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Datum::Varchar(s.clone()),
            JsonValue::Array(items) => Datum::List(items.iter().map(Datum::from_json).collect()),
            JsonValue::Object(map) => Datum::Struct(map.clone()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Boolean(b) => write!(f, "{b}"),
            Datum::Integer(i) => write!(f, "{i}"),
            Datum::Double(d) => write!(f, "{d}"),
            Datum::Varchar(s) => write!(f, "{s}"),
            Datum::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Datum::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Datum::Struct(map) => write!(f, "{}", JsonValue::Object(map.clone())),
        }
    }
}

/// Hashable projection of a [`Datum`] for grouping and DISTINCT keys.
/// Doubles hash on their bit pattern; NaNs are normalised so they group
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatumKey {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(u64),
    Varchar(String),
    Timestamp(i64),
    Other(String),
}

impl From<&Datum> for DatumKey {
    fn from(datum: &Datum) -> Self {
        match datum {
            Datum::Null => DatumKey::Null,
            Datum::Boolean(b) => DatumKey::Boolean(*b),
            Datum::Integer(i) => DatumKey::Integer(*i),
            Datum::Double(d) => {
                if d.is_nan() {
                    DatumKey::Double(f64::NAN.to_bits())
                } else {
                    DatumKey::Double(d.to_bits())
                }
            }
            Datum::Varchar(s) => DatumKey::Varchar(s.clone()),
            Datum::Timestamp(ts) => DatumKey::Timestamp(ts.and_utc().timestamp_micros()),
            other => DatumKey::Other(other.to_string()),
        }
    }
}

/// A typed column of values, nullable throughout.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Boolean(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Varchar(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    List(Vec<Option<Vec<Datum>>>),
    Struct(Vec<Option<serde_json::Map<String, JsonValue>>>),
    /// An untyped all-null column of the given length
    Null(usize),
}

impl Array {
    pub fn len(&self) -> usize {
        match self {
            Array::Boolean(v) => v.len(),
            Array::Integer(v) => v.len(),
            Array::Double(v) => v.len(),
            Array::Varchar(v) => v.len(),
            Array::Timestamp(v) => v.len(),
            Array::List(v) => v.len(),
            Array::Struct(v) => v.len(),
            Array::Null(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Array::Boolean(_) => DataType::Boolean,
            Array::Integer(_) => DataType::Integer,
            Array::Double(_) => DataType::Double,
            Array::Varchar(_) => DataType::Varchar,
            Array::Timestamp(_) => DataType::Timestamp,
            Array::List(_) => DataType::List,
            Array::Struct(_) => DataType::Struct,
            Array::Null(_) => DataType::Null,
        }
    }

    pub fn get(&self, index: usize) -> Datum {
        match self {
            Array::Boolean(v) => v[index].map(Datum::Boolean).unwrap_or(Datum::Null),
            Array::Integer(v) => v[index].map(Datum::Integer).unwrap_or(Datum::Null),
            Array::Double(v) => v[index].map(Datum::Double).unwrap_or(Datum::Null),
            Array::Varchar(v) => v[index]
                .as_ref()
                .map(|s| Datum::Varchar(s.clone()))
                .unwrap_or(Datum::Null),
            Array::Timestamp(v) => v[index].map(Datum::Timestamp).unwrap_or(Datum::Null),
            Array::List(v) => v[index]
                .as_ref()
                .map(|items| Datum::List(items.clone()))
                .unwrap_or(Datum::Null),
            Array::Struct(v) => v[index]
                .as_ref()
                .map(|map| Datum::Struct(map.clone()))
                .unwrap_or(Datum::Null),
            Array::Null(_) => Datum::Null,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Datum> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Build an array of the given type from scalars, accepting nulls and
    /// INTEGER→DOUBLE widening.
    pub fn from_datums(data_type: DataType, values: Vec<Datum>) -> Result<Array> {
        let mismatch = |value: &Datum| {
            EngineError::TypeMismatch(format!(
                "cannot place {} value in {} column",
                value.data_type(),
                data_type
            ))
        };
        match data_type {
            DataType::Boolean => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::Boolean(b) => out.push(Some(b)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::Boolean(out))
            }
            DataType::Integer => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::Integer(i) => out.push(Some(i)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::Integer(out))
            }
            DataType::Double => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::Double(d) => out.push(Some(d)),
                        Datum::Integer(i) => out.push(Some(i as f64)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::Double(out))
            }
            DataType::Varchar => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::Varchar(s) => out.push(Some(s)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::Varchar(out))
            }
            DataType::Timestamp => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::Timestamp(ts) => out.push(Some(ts)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::Timestamp(out))
            }
            DataType::List => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::List(items) => out.push(Some(items)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::List(out))
            }
            DataType::Struct => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Datum::Null => out.push(None),
                        Datum::Struct(map) => out.push(Some(map)),
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(Array::Struct(out))
            }
            DataType::Null => Ok(Array::Null(values.len())),
        }
    }

    /// Infer the narrowest type that holds every scalar, then build.
    pub fn infer_from_datums(values: Vec<Datum>) -> Result<Array> {
        let mut data_type = DataType::Null;
        for value in &values {
            data_type = data_type.promote(value.data_type()).ok_or_else(|| {
                EngineError::TypeMismatch(format!(
                    "mixed {} and {} values in one column",
                    data_type,
                    value.data_type()
                ))
            })?;
        }
        Array::from_datums(data_type, values)
    }

    pub fn repeat(datum: Datum, count: usize) -> Array {
        match datum {
            Datum::Null => Array::Null(count),
            Datum::Boolean(b) => Array::Boolean(vec![Some(b); count]),
            Datum::Integer(i) => Array::Integer(vec![Some(i); count]),
            Datum::Double(d) => Array::Double(vec![Some(d); count]),
            Datum::Varchar(s) => Array::Varchar(vec![Some(s); count]),
            Datum::Timestamp(ts) => Array::Timestamp(vec![Some(ts); count]),
            Datum::List(items) => Array::List(vec![Some(items); count]),
            Datum::Struct(map) => Array::Struct(vec![Some(map); count]),
        }
    }

    /// Select rows by index; `None` produces a null (used by outer joins).
    pub fn take(&self, indices: &[Option<usize>]) -> Array {
        let values = indices
            .iter()
            .map(|idx| match idx {
                Some(i) => self.get(*i),
                None => Datum::Null,
            })
            .collect();
        // the source array was well-typed, so rebuilding cannot fail
        Array::from_datums(self.data_type(), values).unwrap_or(Array::Null(indices.len()))
    }

    pub fn filter(&self, mask: &[bool]) -> Array {
        let indices: Vec<Option<usize>> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| Some(i))
            .collect();
        self.take(&indices)
    }

    pub fn slice(&self, offset: usize, length: usize) -> Array {
        let end = (offset + length).min(self.len());
        let indices: Vec<Option<usize>> = (offset..end).map(Some).collect();
        self.take(&indices)
    }

    /// Concatenate, widening to a common type. An incompatible pair is a
    /// TypeMismatch.
    pub fn concat(arrays: Vec<Array>) -> Result<Array> {
        let mut data_type = DataType::Null;
        for array in &arrays {
            data_type = data_type.promote(array.data_type()).ok_or_else(|| {
                EngineError::TypeMismatch(format!(
                    "cannot combine {} and {} columns",
                    data_type,
                    array.data_type()
                ))
            })?;
        }
        let mut values = Vec::new();
        for array in &arrays {
            values.extend(array.iter());
        }
        Array::from_datums(data_type, values)
    }

    /// Rough in-memory footprint, used for greedy-operator accounting.
    pub fn nbytes(&self) -> u64 {
        match self {
            Array::Boolean(v) => v.len() as u64 * 2,
            Array::Integer(v) => v.len() as u64 * 9,
            Array::Double(v) => v.len() as u64 * 9,
            Array::Timestamp(v) => v.len() as u64 * 13,
            Array::Varchar(v) => v
                .iter()
                .map(|s| s.as_ref().map(|s| s.len() as u64 + 24).unwrap_or(1))
                .sum(),
            Array::List(v) => v
                .iter()
                .map(|l| l.as_ref().map(|l| l.len() as u64 * 16 + 24).unwrap_or(1))
                .sum(),
            Array::Struct(v) => v.len() as u64 * 64,
            Array::Null(n) => *n as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote() {
        assert_eq!(
            DataType::Integer.promote(DataType::Double),
            Some(DataType::Double)
        );
        assert_eq!(
            DataType::Null.promote(DataType::Varchar),
            Some(DataType::Varchar)
        );
        assert_eq!(DataType::Boolean.promote(DataType::Integer), None);
    }

    #[test]
    fn test_take_with_null_slots() {
        let array = Array::Integer(vec![Some(1), Some(2), Some(3)]);
        let taken = array.take(&[Some(2), None, Some(0)]);
        assert_eq!(taken.get(0), Datum::Integer(3));
        assert_eq!(taken.get(1), Datum::Null);
        assert_eq!(taken.get(2), Datum::Integer(1));
    }

    #[test]
    fn test_concat_widens_integer_to_double() {
        let a = Array::Integer(vec![Some(1)]);
        let b = Array::Double(vec![Some(2.5)]);
        let combined = Array::concat(vec![a, b]).unwrap();
        assert_eq!(combined.data_type(), DataType::Double);
        assert_eq!(combined.get(0), Datum::Double(1.0));
    }

    #[test]
    fn test_concat_rejects_mixed_types() {
        let a = Array::Integer(vec![Some(1)]);
        let b = Array::Varchar(vec![Some("x".to_string())]);
        assert!(Array::concat(vec![a, b]).is_err());
    }

    #[test]
    fn test_null_sorts_last() {
        let mut values = vec![Datum::Integer(3), Datum::Null, Datum::Integer(1)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values[0], Datum::Integer(1));
        assert_eq!(values[2], Datum::Null);
    }

    #[test]
    fn test_infer_from_datums() {
        let array =
            Array::infer_from_datums(vec![Datum::Null, Datum::Integer(2), Datum::Double(0.5)])
                .unwrap();
        assert_eq!(array.data_type(), DataType::Double);
    }
}
