//! The fixed permission vocabulary.
//!
//! A connection carries a subset of these; the logical planner checks the
//! top-level statement kind against them before emitting a plan.

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// SELECT and other result-producing statements
    Query,
    /// EXPLAIN
    Explain,
    /// SHOW introspection statements
    Show,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Query => "Query",
            Permission::Explain => "Explain",
            Permission::Show => "Show",
        };
        write!(f, "{name}")
    }
}

pub fn all_permissions() -> HashSet<Permission> {
    [Permission::Query, Permission::Explain, Permission::Show]
        .into_iter()
        .collect()
}
