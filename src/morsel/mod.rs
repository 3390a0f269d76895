//! Morsels: the columnar batches that flow between operators.
//!
//! A morsel is an ordered set of named columns of equal length. Internally
//! columns are named by their plan identity; the Exit operator renames them
//! to user-facing query names. Morsels are immutable once produced.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::errors::{EngineError, Result};

pub mod array;

pub use array::{Array, DataType, Datum, DatumKey};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Array,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Array) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Morsel {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Morsel {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        for column in &columns {
            if column.values.len() != num_rows {
                return Err(EngineError::Internal(format!(
                    "ragged morsel: column '{}' has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            num_rows: 0,
        }
    }

    /// A morsel with rows but no columns; columns are appended afterwards.
    pub fn with_row_count(num_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            num_rows,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Add a column; replacing an existing name is an internal error.
    pub fn append_column(mut self, name: impl Into<String>, values: Array) -> Result<Self> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(EngineError::Internal(format!(
                "column '{name}' appended twice"
            )));
        }
        if values.len() != self.num_rows && !self.columns.is_empty() {
            return Err(EngineError::Internal(format!(
                "appended column '{name}' has {} rows, expected {}",
                values.len(),
                self.num_rows
            )));
        }
        if self.columns.is_empty() {
            self.num_rows = values.len();
        }
        self.columns.push(Column::new(name, values));
        Ok(self)
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Morsel> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| EngineError::Internal(format!("column '{name}' lost in flight")))?;
            columns.push(column.clone());
        }
        Ok(Morsel {
            columns,
            num_rows: self.num_rows,
        })
    }

    pub fn rename_columns(&self, names: &[String]) -> Result<Morsel> {
        if names.len() != self.columns.len() {
            return Err(EngineError::Internal(format!(
                "rename expected {} names, got {}",
                self.columns.len(),
                names.len()
            )));
        }
        let columns = self
            .columns
            .iter()
            .zip(names)
            .map(|(column, name)| Column::new(name.clone(), column.values.clone()))
            .collect();
        Ok(Morsel {
            columns,
            num_rows: self.num_rows,
        })
    }

    pub fn filter(&self, mask: &[bool]) -> Morsel {
        let num_rows = mask.iter().filter(|keep| **keep).count();
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values.filter(mask)))
            .collect();
        Morsel { columns, num_rows }
    }

    /// Select rows by index; `None` slots become null rows (outer joins).
    pub fn take(&self, indices: &[Option<usize>]) -> Morsel {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values.take(indices)))
            .collect();
        Morsel {
            columns,
            num_rows: indices.len(),
        }
    }

    pub fn slice(&self, offset: usize, length: usize) -> Morsel {
        let length = length.min(self.num_rows.saturating_sub(offset));
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values.slice(offset, length)))
            .collect();
        Morsel {
            columns,
            num_rows: length,
        }
    }

    /// Vertically combine morsels. The output carries the union of column
    /// names; columns absent from a source are promoted to nulls, numeric
    /// columns widen.
    pub fn concat(morsels: &[Morsel]) -> Result<Morsel> {
        if morsels.is_empty() {
            return Ok(Morsel::empty());
        }
        let mut names: Vec<String> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for morsel in morsels {
            for column in &morsel.columns {
                if seen.insert(column.name.clone()) {
                    names.push(column.name.clone());
                }
            }
        }
        let num_rows = morsels.iter().map(|m| m.num_rows).sum();
        let mut columns = Vec::with_capacity(names.len());
        for name in &names {
            let parts: Vec<Array> = morsels
                .iter()
                .map(|morsel| match morsel.column(name) {
                    Some(column) => column.values.clone(),
                    None => Array::Null(morsel.num_rows),
                })
                .collect();
            columns.push(Column::new(name.clone(), Array::concat(parts)?));
        }
        Ok(Morsel { columns, num_rows })
    }

    /// Hash key for a row over the named columns, for grouping/DISTINCT.
    pub fn row_key(&self, names: &[String], row: usize) -> Vec<DatumKey> {
        names
            .iter()
            .map(|name| match self.column(name) {
                Some(column) => DatumKey::from(&column.values.get(row)),
                None => DatumKey::Null,
            })
            .collect()
    }

    pub fn row(&self, index: usize) -> Vec<Datum> {
        self.columns.iter().map(|c| c.values.get(index)).collect()
    }

    pub fn nbytes(&self) -> u64 {
        self.columns.iter().map(|c| c.values.nbytes()).sum()
    }

    /// Rows as JSON objects keyed by column name (CLI output).
    pub fn to_json_rows(&self) -> JsonValue {
        let rows: Vec<JsonValue> = (0..self.num_rows)
            .map(|row| {
                let mut object = serde_json::Map::new();
                for column in &self.columns {
                    object.insert(column.name.clone(), column.values.get(row).to_json());
                }
                JsonValue::Object(object)
            })
            .collect();
        JsonValue::Array(rows)
    }
}

impl fmt::Display for Morsel {
    /// Plain ASCII table rendering, used by the CLI.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        let mut rendered: Vec<Vec<String>> = Vec::with_capacity(self.num_rows);
        for row in 0..self.num_rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|c| c.values.get(row).to_string())
                .collect();
            for (i, cell) in cells.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
            rendered.push(cells);
        }
        let rule = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            for width in &widths {
                write!(f, "+{}", "-".repeat(width + 2))?;
            }
            writeln!(f, "+")
        };
        rule(f)?;
        for (header, width) in headers.iter().zip(&widths) {
            let width = *width;
            write!(f, "| {header:width$} ")?;
        }
        writeln!(f, "|")?;
        rule(f)?;
        for cells in &rendered {
            for (cell, width) in cells.iter().zip(&widths) {
                let width = *width;
                write!(f, "| {cell:width$} ")?;
            }
            writeln!(f, "|")?;
        }
        rule(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Morsel {
        Morsel::new(vec![
            Column::new("a", Array::Integer(vec![Some(1), Some(2), Some(3)])),
            Column::new(
                "b",
                Array::Varchar(vec![
                    Some("x".to_string()),
                    None,
                    Some("z".to_string()),
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_ragged_morsel_rejected() {
        let result = Morsel::new(vec![
            Column::new("a", Array::Integer(vec![Some(1)])),
            Column::new("b", Array::Integer(vec![Some(1), Some(2)])),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_filter() {
        let filtered = sample().filter(&[true, false, true]);
        assert_eq!(filtered.num_rows(), 2);
        assert_eq!(
            filtered.column("a").unwrap().values,
            Array::Integer(vec![Some(1), Some(3)])
        );
    }

    #[test]
    fn test_concat_promotes_missing_columns() {
        let left = sample();
        let right = Morsel::new(vec![Column::new("a", Array::Integer(vec![Some(9)]))]).unwrap();
        let combined = Morsel::concat(&[left, right]).unwrap();
        assert_eq!(combined.num_rows(), 4);
        assert_eq!(combined.column("b").unwrap().values.get(3), Datum::Null);
    }

    #[test]
    fn test_select_preserves_order() {
        let selected = sample().select(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(selected.column_names(), vec!["b", "a"]);
    }

    #[test]
    fn test_slice_clamps() {
        let sliced = sample().slice(2, 10);
        assert_eq!(sliced.num_rows(), 1);
        assert_eq!(sliced.column("a").unwrap().values.get(0), Datum::Integer(3));
    }
}
