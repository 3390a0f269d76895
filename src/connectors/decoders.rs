//! File decoders, a registry keyed by blob extension.
//!
//! Shipped decoders cover the text formats: `jsonl`, `csv` and `zst`
//! (zstd-wrapped JSONL). Columnar formats (parquet, orc, arrow) are
//! external collaborators; embedders attach their decoders with
//! [`register_decoder`]. A blob whose extension has no registered decoder
//! surfaces `UnsupportedFileType`, which scans treat as skip-this-blob.

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use serde_json::Value as JsonValue;

use crate::errors::{EngineError, Result};
use crate::morsel::{Array, Column, Datum, Morsel};

pub type Decoder = fn(&[u8]) -> Result<Morsel>;

lazy_static! {
    static ref DECODERS: RwLock<HashMap<String, Decoder>> = {
        let mut m: HashMap<String, Decoder> = HashMap::new();
        m.insert("jsonl".to_string(), decode_jsonl as Decoder);
        m.insert("csv".to_string(), decode_csv as Decoder);
        m.insert("zst".to_string(), decode_zstd_jsonl as Decoder);
        RwLock::new(m)
    };
}

pub fn register_decoder(extension: &str, decoder: Decoder) {
    let mut decoders = DECODERS.write().unwrap_or_else(|e| e.into_inner());
    decoders.insert(extension.to_lowercase(), decoder);
}

pub fn known_extensions() -> Vec<String> {
    let decoders = DECODERS.read().unwrap_or_else(|e| e.into_inner());
    let mut extensions: Vec<String> = decoders.keys().cloned().collect();
    extensions.sort();
    extensions
}

pub fn get_decoder(blob_name: &str) -> Result<Decoder> {
    let extension = blob_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let decoders = DECODERS.read().unwrap_or_else(|e| e.into_inner());
    decoders
        .get(&extension)
        .copied()
        .ok_or_else(|| EngineError::UnsupportedFileType(extension))
}

// ---------------------------------------------------------------------------
// jsonl

fn decode_jsonl(bytes: &[u8]) -> Result<Morsel> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| EngineError::UnsupportedFileType("jsonl blob is not utf-8".to_string()))?;

    let mut names: Vec<String> = Vec::new();
    let mut rows: Vec<serde_json::Map<String, JsonValue>> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: JsonValue = serde_json::from_str(line).map_err(|error| {
            EngineError::UnsupportedFileType(format!("invalid JSONL record: {error}"))
        })?;
        match parsed {
            JsonValue::Object(object) => {
                for key in object.keys() {
                    if !names.contains(key) {
                        names.push(key.clone());
                    }
                }
                rows.push(object);
            }
            _ => {
                return Err(EngineError::UnsupportedFileType(
                    "JSONL records must be objects".to_string(),
                ))
            }
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let values: Vec<Datum> = rows
            .iter()
            .map(|row| row.get(name).map(Datum::from_json).unwrap_or(Datum::Null))
            .collect();
        columns.push(Column::new(name.clone(), Array::infer_from_datums(values)?));
    }
    Morsel::new(columns)
}

fn decode_zstd_jsonl(bytes: &[u8]) -> Result<Morsel> {
    let decompressed = zstd::decode_all(bytes).map_err(|error| {
        EngineError::UnsupportedFileType(format!("zstd decompression failed: {error}"))
    })?;
    decode_jsonl(&decompressed)
}

// ---------------------------------------------------------------------------
// csv

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

fn sniff_csv_value(field: &str) -> Datum {
    if field.is_empty() {
        return Datum::Null;
    }
    if let Ok(integer) = field.parse::<i64>() {
        return Datum::Integer(integer);
    }
    if let Ok(double) = field.parse::<f64>() {
        return Datum::Double(double);
    }
    match field.to_lowercase().as_str() {
        "true" => Datum::Boolean(true),
        "false" => Datum::Boolean(false),
        _ => Datum::Varchar(field.to_string()),
    }
}

fn decode_csv(bytes: &[u8]) -> Result<Morsel> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| EngineError::UnsupportedFileType("csv blob is not utf-8".to_string()))?;
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let headers = match lines.next() {
        Some(header) => split_csv_line(header),
        None => return Morsel::new(Vec::new()),
    };

    let mut rows: Vec<Vec<Datum>> = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        rows.push(
            (0..headers.len())
                .map(|i| fields.get(i).map(|f| sniff_csv_value(f)).unwrap_or(Datum::Null))
                .collect(),
        );
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (index, name) in headers.iter().enumerate() {
        let values: Vec<Datum> = rows.iter().map(|row| row[index].clone()).collect();
        let values = unify_csv_column(values);
        columns.push(Column::new(name.clone(), Array::infer_from_datums(values)?));
    }
    Morsel::new(columns)
}

/// Per-value sniffing can disagree within a column ("1" then "x"); fall
/// back to VARCHAR when it does.
fn unify_csv_column(values: Vec<Datum>) -> Vec<Datum> {
    let mut kind = crate::morsel::DataType::Null;
    let mut mixed = false;
    for value in &values {
        if value.is_null() {
            continue;
        }
        match kind.promote(value.data_type()) {
            Some(promoted) => kind = promoted,
            None => {
                mixed = true;
                break;
            }
        }
    }
    if mixed {
        values
            .into_iter()
            .map(|value| match value {
                Datum::Null => Datum::Null,
                other => Datum::Varchar(other.to_string()),
            })
            .collect()
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::DataType;

    #[test]
    fn test_decode_jsonl() {
        let data = b"{\"id\": 1, \"name\": \"one\"}\n{\"id\": 2, \"name\": \"two\", \"extra\": true}\n";
        let morsel = decode_jsonl(data).unwrap();
        assert_eq!(morsel.num_rows(), 2);
        assert_eq!(morsel.num_columns(), 3);
        assert_eq!(morsel.column("extra").unwrap().values.get(0), Datum::Null);
    }

    #[test]
    fn test_decode_csv_type_sniffing() {
        let data = b"id,name,mass\n1,Mercury,0.33\n2,Venus,4.87\n";
        let morsel = decode_csv(data).unwrap();
        assert_eq!(morsel.num_rows(), 2);
        assert_eq!(
            morsel.column("id").unwrap().values.data_type(),
            DataType::Integer
        );
        assert_eq!(
            morsel.column("mass").unwrap().values.data_type(),
            DataType::Double
        );
    }

    #[test]
    fn test_decode_csv_quoted_fields() {
        let data = b"a,b\n\"x,y\",\"with \"\"quotes\"\"\"\n";
        let morsel = decode_csv(data).unwrap();
        assert_eq!(
            morsel.column("a").unwrap().values.get(0),
            Datum::Varchar("x,y".to_string())
        );
        assert_eq!(
            morsel.column("b").unwrap().values.get(0),
            Datum::Varchar("with \"quotes\"".to_string())
        );
    }

    #[test]
    fn test_mixed_csv_column_falls_back_to_varchar() {
        let data = b"v\n1\npebble\n";
        let morsel = decode_csv(data).unwrap();
        assert_eq!(
            morsel.column("v").unwrap().values.data_type(),
            DataType::Varchar
        );
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            get_decoder("data/blob.parquet"),
            Err(EngineError::UnsupportedFileType(_))
        ));
        assert!(get_decoder("data/blob.jsonl").is_ok());
    }

    #[test]
    fn test_zstd_round_trip() {
        let raw = b"{\"id\": 1}\n";
        let compressed = zstd::encode_all(&raw[..], 1).unwrap();
        let morsel = decode_zstd_jsonl(&compressed).unwrap();
        assert_eq!(morsel.num_rows(), 1);
    }
}
