//! Built-in sample relations.
//!
//! These are addressable as `$planets` and `$no_table`. `$no_table` stands
//! in when a query has no FROM clause; it is a real relation with one row
//! and one column so expression-only queries still have something to scan.

use crate::catalogue::{RelationSchema, SchemaColumn};
use crate::errors::Result;
use crate::morsel::{Array, Column, DataType, Morsel};

pub const PLANETS: &str = "$planets";
pub const NO_TABLE: &str = "$no_table";

/// Schemas for every sample relation, registered in the catalogue at init.
pub fn sample_schemas() -> Vec<(String, RelationSchema)> {
    vec![
        (
            PLANETS.to_string(),
            RelationSchema::new(
                PLANETS,
                vec![
                    SchemaColumn::new("id", DataType::Integer),
                    SchemaColumn::new("name", DataType::Varchar),
                    SchemaColumn::new("mass", DataType::Double),
                ],
            ),
        ),
        (
            NO_TABLE.to_string(),
            RelationSchema::new(
                NO_TABLE,
                vec![SchemaColumn::new("column", DataType::Integer)],
            ),
        ),
    ]
}

pub fn is_sample(name: &str) -> bool {
    name.eq_ignore_ascii_case(PLANETS) || name.eq_ignore_ascii_case(NO_TABLE)
}

/// Materialise a sample relation, columns under their source names.
pub fn read(name: &str) -> Option<Result<Morsel>> {
    if name.eq_ignore_ascii_case(PLANETS) {
        Some(planets())
    } else if name.eq_ignore_ascii_case(NO_TABLE) {
        Some(no_table())
    } else {
        None
    }
}

/// Masses in 10^24 kg.
fn planets() -> Result<Morsel> {
    let names = [
        "Mercury", "Venus", "Earth", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune", "Pluto",
    ];
    let masses = [0.33, 4.87, 5.97, 0.642, 1898.0, 568.0, 86.8, 102.0, 0.0146];
    Morsel::new(vec![
        Column::new(
            "id",
            Array::Integer((1..=9).map(Some).collect()),
        ),
        Column::new(
            "name",
            Array::Varchar(names.iter().map(|n| Some(n.to_string())).collect()),
        ),
        Column::new(
            "mass",
            Array::Double(masses.iter().copied().map(Some).collect()),
        ),
    ])
}

fn no_table() -> Result<Morsel> {
    Morsel::new(vec![Column::new("column", Array::Integer(vec![None]))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::Datum;

    #[test]
    fn test_planets_has_nine_rows() {
        let morsel = read(PLANETS).unwrap().unwrap();
        assert_eq!(morsel.num_rows(), 9);
        assert_eq!(morsel.num_columns(), 3);
        assert_eq!(
            morsel.column("name").unwrap().values.get(2),
            Datum::Varchar("Earth".to_string())
        );
    }

    #[test]
    fn test_no_table_single_null_cell() {
        let morsel = read(NO_TABLE).unwrap().unwrap();
        assert_eq!(morsel.num_rows(), 1);
        assert_eq!(morsel.column("column").unwrap().values.get(0), Datum::Null);
    }

    #[test]
    fn test_unknown_sample() {
        assert!(read("$missing").is_none());
    }
}
