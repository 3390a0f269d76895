//! Relation schemas and column identities.
//!
//! Every column in a plan carries a stable, opaque `identity` that survives
//! renames; the `query_column` is the user-facing name a result set shows.
//! Morsels name their columns by identity until the Exit operator renames
//! them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::morsel::DataType;

/// Mint a fresh identity, unique within any plan that sees it.
pub fn new_identity() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    /// Opaque handle, stable across renames
    pub identity: String,
    /// Source-side column name
    pub name: String,
    /// Name the user sees in results
    pub query_column: String,
    #[serde(skip, default = "default_data_type")]
    pub data_type: DataType,
    /// Relation (or alias) this column came from, when known
    pub relation: Option<String>,
    /// Additional names this column answers to
    pub aliases: Vec<String>,
}

fn default_data_type() -> DataType {
    DataType::Null
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            identity: new_identity(),
            query_column: name.clone(),
            name,
            data_type,
            relation: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Does this column answer to `name`, optionally qualified?
    /// Unquoted SQL identifiers compare case-insensitively.
    pub fn answers_to(&self, qualifier: Option<&str>, name: &str) -> bool {
        if let Some(qualifier) = qualifier {
            let matches_relation = self
                .relation
                .as_deref()
                .map(|relation| relation.eq_ignore_ascii_case(qualifier))
                .unwrap_or(false);
            if !matches_relation {
                return false;
            }
        }
        self.name.eq_ignore_ascii_case(name)
            || self.query_column.eq_ignore_ascii_case(name)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
}

impl RelationSchema {
    pub fn new(name: impl Into<String>, columns: Vec<SchemaColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column_by_identity(&self, identity: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.identity == identity)
    }

    pub fn find_columns(&self, qualifier: Option<&str>, name: &str) -> Vec<&SchemaColumn> {
        self.columns
            .iter()
            .filter(|c| c.answers_to(qualifier, name))
            .collect()
    }

    pub fn identities(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.identity.clone()).collect()
    }

    /// Copy this schema with fresh identities, stamped with the relation
    /// alias it is being read as. Each Read of a relation gets its own
    /// instance so self-joins do not share identities.
    pub fn instantiate(&self, alias: &str) -> RelationSchema {
        let columns = self
            .columns
            .iter()
            .map(|column| SchemaColumn {
                identity: new_identity(),
                name: column.name.clone(),
                query_column: column.query_column.clone(),
                data_type: column.data_type,
                relation: Some(alias.to_string()),
                aliases: column.aliases.clone(),
            })
            .collect();
        RelationSchema::new(self.name.clone(), columns)
    }

    /// Closest column name to a miss, for error hints.
    pub fn suggestion(&self, name: &str) -> Option<String> {
        self.columns
            .iter()
            .map(|c| (edit_distance(&c.query_column.to_lowercase(), &name.to_lowercase()), c))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, c)| c.query_column.clone())
    }
}

/// Levenshtein distance, small inputs only.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current.push(substitution.min(previous[j + 1] + 1).min(current[j] + 1));
        }
        previous = current;
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planets_like() -> RelationSchema {
        RelationSchema::new(
            "$planets",
            vec![
                SchemaColumn::new("id", DataType::Integer),
                SchemaColumn::new("name", DataType::Varchar),
                SchemaColumn::new("mass", DataType::Double),
            ],
        )
    }

    #[test]
    fn test_answers_to_is_case_insensitive() {
        let schema = planets_like().instantiate("p");
        assert_eq!(schema.find_columns(None, "NAME").len(), 1);
        assert_eq!(schema.find_columns(Some("p"), "name").len(), 1);
        assert_eq!(schema.find_columns(Some("q"), "name").len(), 0);
    }

    #[test]
    fn test_instantiate_mints_fresh_identities() {
        let schema = planets_like();
        let left = schema.instantiate("l");
        let right = schema.instantiate("r");
        assert_ne!(left.columns[0].identity, right.columns[0].identity);
        assert_eq!(left.columns[0].name, right.columns[0].name);
    }

    #[test]
    fn test_suggestion() {
        let schema = planets_like();
        assert_eq!(schema.suggestion("nmae"), Some("name".to_string()));
        assert_eq!(schema.suggestion("orbital_period"), None);
    }
}
