//! Expression trees.
//!
//! Every expression is a tagged node drawn from a closed set of kinds. A
//! node carries its payload (value, children) and, after the bind phase, a
//! [`ColumnBinding`] pointing at a schema column. The invariant the binder
//! maintains: a bound expression references only identities present in its
//! producing operator's input schema.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::morsel::{DataType, Datum};

pub mod aggregations;
pub mod evaluator;
pub mod from_ast;
pub mod functions;

/// The closed tag set for expression nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Literal,
    Identifier,
    Wildcard,
    Function,
    Aggregator,
    BinaryOperator,
    ComparisonOperator,
    UnaryOperator,
    Nested,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    StringConcat,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::StringConcat => "||",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    ILike,
    In,
    NotIn,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
            ComparisonOp::Like => "LIKE",
            ComparisonOp::NotLike => "NOT LIKE",
            ComparisonOp::ILike => "ILIKE",
            ComparisonOp::In => "IN",
            ComparisonOp::NotIn => "NOT IN",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negative,
    IsNull,
    IsNotNull,
}

/// Handle into the plan's catalogue view, attached by the binder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBinding {
    pub identity: String,
    pub query_column: String,
    #[serde(skip, default = "null_type")]
    pub data_type: DataType,
}

fn null_type() -> DataType {
    DataType::Null
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Datum),
    Identifier {
        qualifier: Option<String>,
        name: String,
    },
    Wildcard {
        qualifier: Option<String>,
    },
    Function {
        name: String,
        parameters: Vec<Expression>,
    },
    Aggregator {
        name: String,
        parameters: Vec<Expression>,
        distinct: bool,
        /// (ascending?) ordering applied to collected values (ARRAY_AGG)
        order_ascending: Option<bool>,
        limit: Option<usize>,
    },
    BinaryOperator {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    ComparisonOperator {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    UnaryOperator {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Nested(Box<Expression>),
    And {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Or {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub binding: Option<ColumnBinding>,
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            binding: None,
        }
    }

    pub fn literal(datum: Datum) -> Self {
        Self::new(ExpressionKind::Literal(datum))
    }

    pub fn identifier(qualifier: Option<String>, name: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Identifier {
            qualifier,
            name: name.into(),
        })
    }

    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            ExpressionKind::Literal(_) => NodeType::Literal,
            ExpressionKind::Identifier { .. } => NodeType::Identifier,
            ExpressionKind::Wildcard { .. } => NodeType::Wildcard,
            ExpressionKind::Function { .. } => NodeType::Function,
            ExpressionKind::Aggregator { .. } => NodeType::Aggregator,
            ExpressionKind::BinaryOperator { .. } => NodeType::BinaryOperator,
            ExpressionKind::ComparisonOperator { .. } => NodeType::ComparisonOperator,
            ExpressionKind::UnaryOperator { .. } => NodeType::UnaryOperator,
            ExpressionKind::Nested(_) => NodeType::Nested,
            ExpressionKind::And { .. } => NodeType::And,
            ExpressionKind::Or { .. } => NodeType::Or,
            ExpressionKind::Not(_) => NodeType::Not,
        }
    }

    pub fn children(&self) -> Vec<&Expression> {
        match &self.kind {
            ExpressionKind::Literal(_)
            | ExpressionKind::Identifier { .. }
            | ExpressionKind::Wildcard { .. } => Vec::new(),
            ExpressionKind::Function { parameters, .. }
            | ExpressionKind::Aggregator { parameters, .. } => parameters.iter().collect(),
            ExpressionKind::BinaryOperator { left, right, .. }
            | ExpressionKind::ComparisonOperator { left, right, .. }
            | ExpressionKind::And { left, right }
            | ExpressionKind::Or { left, right } => vec![left, right],
            ExpressionKind::UnaryOperator { operand, .. } => vec![operand],
            ExpressionKind::Nested(inner) | ExpressionKind::Not(inner) => vec![inner],
        }
    }

    /// Pre-order walk over this node and all descendants.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// All nodes of the selected types, pre-order.
    pub fn nodes_of_type<'a>(&'a self, select: &[NodeType]) -> Vec<&'a Expression> {
        let mut found = Vec::new();
        self.walk(&mut |node| {
            if select.contains(&node.node_type()) {
                found.push(node);
            }
        });
        found
    }

    pub fn contains_aggregator(&self) -> bool {
        !self.nodes_of_type(&[NodeType::Aggregator]).is_empty()
    }

    /// The identities of every bound identifier under this node.
    pub fn referenced_identities(&self) -> Vec<String> {
        let mut identities = Vec::new();
        self.walk(&mut |node| {
            if node.node_type() == NodeType::Identifier {
                if let Some(binding) = &node.binding {
                    if !identities.contains(&binding.identity) {
                        identities.push(binding.identity.clone());
                    }
                }
            }
        });
        identities
    }

    /// The identity this expression's result lives under, once bound.
    pub fn identity(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.identity.as_str())
    }
}

/// Canonical rendering, used for user-facing column names and for matching
/// repeated aggregate expressions across SELECT and HAVING.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::Literal(Datum::Varchar(s)) => write!(f, "'{s}'"),
            ExpressionKind::Literal(datum) => write!(f, "{datum}"),
            ExpressionKind::Identifier { qualifier, name } => match qualifier {
                Some(qualifier) => write!(f, "{qualifier}.{name}"),
                None => write!(f, "{name}"),
            },
            ExpressionKind::Wildcard { qualifier } => match qualifier {
                Some(qualifier) => write!(f, "{qualifier}.*"),
                None => write!(f, "*"),
            },
            ExpressionKind::Function { name, parameters } => {
                write!(f, "{name}(")?;
                for (i, parameter) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{parameter}")?;
                }
                write!(f, ")")
            }
            ExpressionKind::Aggregator {
                name,
                parameters,
                distinct,
                order_ascending,
                limit,
            } => {
                write!(f, "{name}(")?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                for (i, parameter) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{parameter}")?;
                }
                if let Some(ascending) = order_ascending {
                    write!(f, " ORDER BY 1 {}", if *ascending { "ASC" } else { "DESC" })?;
                }
                if let Some(limit) = limit {
                    write!(f, " LIMIT {limit}")?;
                }
                write!(f, ")")
            }
            ExpressionKind::BinaryOperator { op, left, right } => {
                write!(f, "{left} {op} {right}")
            }
            ExpressionKind::ComparisonOperator { op, left, right } => {
                write!(f, "{left} {op} {right}")
            }
            ExpressionKind::UnaryOperator { op, operand } => match op {
                UnaryOp::Negative => write!(f, "-{operand}"),
                UnaryOp::IsNull => write!(f, "{operand} IS NULL"),
                UnaryOp::IsNotNull => write!(f, "{operand} IS NOT NULL"),
            },
            ExpressionKind::Nested(inner) => write!(f, "({inner})"),
            ExpressionKind::And { left, right } => write!(f, "{left} AND {right}"),
            ExpressionKind::Or { left, right } => write!(f, "{left} OR {right}"),
            ExpressionKind::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_star() -> Expression {
        Expression::new(ExpressionKind::Aggregator {
            name: "COUNT".to_string(),
            parameters: vec![Expression::new(ExpressionKind::Wildcard { qualifier: None })],
            distinct: false,
            order_ascending: None,
            limit: None,
        })
    }

    #[test]
    fn test_format_count_star() {
        assert_eq!(count_star().to_string(), "COUNT(*)");
    }

    #[test]
    fn test_format_arithmetic() {
        let expr = Expression::new(ExpressionKind::BinaryOperator {
            op: BinaryOp::Plus,
            left: Box::new(Expression::identifier(None, "id")),
            right: Box::new(Expression::literal(Datum::Integer(1))),
        });
        assert_eq!(expr.to_string(), "id + 1");
    }

    #[test]
    fn test_contains_aggregator_nested() {
        let expr = Expression::new(ExpressionKind::BinaryOperator {
            op: BinaryOp::Multiply,
            left: Box::new(count_star()),
            right: Box::new(Expression::literal(Datum::Integer(2))),
        });
        assert!(expr.contains_aggregator());
        assert!(!Expression::identifier(None, "id").contains_aggregator());
    }

    #[test]
    fn test_nodes_of_type() {
        let expr = Expression::new(ExpressionKind::And {
            left: Box::new(Expression::identifier(None, "a")),
            right: Box::new(Expression::new(ExpressionKind::Not(Box::new(
                Expression::identifier(None, "b"),
            )))),
        });
        assert_eq!(expr.nodes_of_type(&[NodeType::Identifier]).len(), 2);
    }
}
