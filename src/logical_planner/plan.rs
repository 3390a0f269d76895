//! Logical plan representation.
//!
//! The intermediate representation between the parsed AST and the physical
//! operator DAG. Nodes hold unbound expressions when they leave the
//! planner; the binder fills in column bindings and output schemas, leaving
//! the shape untouched.
//!
//! ```text
//! SQL → AST → LogicalPlan → PhysicalPlan
//!             ^^^^^^^^^^^
//!             this module
//! ```

use std::fmt;

use crate::catalogue::RelationSchema;
use crate::expression::Expression;
use crate::sql_rewriter::TemporalRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    LeftSemi,
    LeftAnti,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "INNER",
            JoinType::LeftOuter => "LEFT OUTER",
            JoinType::RightOuter => "RIGHT OUTER",
            JoinType::FullOuter => "FULL OUTER",
            JoinType::LeftSemi => "LEFT SEMI",
            JoinType::LeftAnti => "LEFT ANTI",
            JoinType::Cross => "CROSS",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFunction {
    Values,
    Unnest,
    GenerateSeries,
    Fake,
}

impl fmt::Display for DatasetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetFunction::Values => "VALUES",
            DatasetFunction::Unnest => "UNNEST",
            DatasetFunction::GenerateSeries => "GENERATE_SERIES",
            DatasetFunction::Fake => "FAKE",
        };
        write!(f, "{name}")
    }
}

/// Read of a named relation: a sample, a blob-backed dataset, or (when
/// `subplan` is set) a CTE or derived-table sub-plan being read under an
/// alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    pub relation: String,
    pub alias: String,
    pub temporal: Option<TemporalRange>,
    pub subplan: Option<Box<LogicalPlan>>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDataset {
    pub function: DatasetFunction,
    pub alias: String,
    /// Output column names; one for series/unnest, several for VALUES
    pub columns: Vec<String>,
    pub args: Vec<Expression>,
    /// Literal rows for VALUES
    pub rows: Vec<Vec<Expression>>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub predicate: Expression,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub columns: Vec<Expression>,
    pub input: Box<LogicalPlan>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub aggregates: Vec<Expression>,
    pub input: Box<LogicalPlan>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateAndGroup {
    pub groups: Vec<Expression>,
    pub aggregates: Vec<Expression>,
    /// The SELECT items, used to resolve positional GROUP BY references
    pub projection: Vec<Expression>,
    pub input: Box<LogicalPlan>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    /// Equality pairs from ON, sides normalised by the binder
    pub on: Vec<(Expression, Expression)>,
    /// Column names from USING
    pub using: Vec<String>,
    pub left: Box<LogicalPlan>,
    pub right: Box<LogicalPlan>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub keys: Vec<(Expression, Direction)>,
    /// SELECT items, so keys may reference projection aliases
    pub hints: Vec<Expression>,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub limit: Option<usize>,
    pub offset: usize,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distinct {
    /// The projected tuple distinctness applies to
    pub on: Vec<Expression>,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub all: bool,
    pub left: Box<LogicalPlan>,
    pub right: Box<LogicalPlan>,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explain {
    pub inner: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowColumns {
    pub relation: String,
    pub full: bool,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowCreate {
    pub relation: String,
    pub schema: Option<RelationSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Read(Read),
    FunctionDataset(FunctionDataset),
    Filter(Filter),
    Project(Project),
    Aggregate(Aggregate),
    AggregateAndGroup(AggregateAndGroup),
    Join(Join),
    Sort(Sort),
    Limit(Limit),
    Distinct(Distinct),
    Union(Union),
    Explain(Explain),
    ShowColumns(ShowColumns),
    ShowCreate(ShowCreate),
    ShowVariables,
    ShowFunctions,
    ShowDatabases,
}

impl LogicalPlan {
    /// The bound output schema; pass-through nodes defer to their input.
    pub fn schema(&self) -> Option<&RelationSchema> {
        match self {
            LogicalPlan::Read(node) => node.schema.as_ref(),
            LogicalPlan::FunctionDataset(node) => node.schema.as_ref(),
            LogicalPlan::Filter(node) => node.input.schema(),
            LogicalPlan::Project(node) => node.schema.as_ref(),
            LogicalPlan::Aggregate(node) => node.schema.as_ref(),
            LogicalPlan::AggregateAndGroup(node) => node.schema.as_ref(),
            LogicalPlan::Join(node) => node.schema.as_ref(),
            LogicalPlan::Sort(node) => node.input.schema(),
            LogicalPlan::Limit(node) => node.input.schema(),
            LogicalPlan::Distinct(node) => node.input.schema(),
            LogicalPlan::Union(node) => node.schema.as_ref(),
            LogicalPlan::Explain(_) => None,
            LogicalPlan::ShowColumns(node) => node.schema.as_ref(),
            LogicalPlan::ShowCreate(node) => node.schema.as_ref(),
            LogicalPlan::ShowVariables
            | LogicalPlan::ShowFunctions
            | LogicalPlan::ShowDatabases => None,
        }
    }

    pub fn node_name(&self) -> &'static str {
        match self {
            LogicalPlan::Read(_) => "Read",
            LogicalPlan::FunctionDataset(_) => "FunctionDataset",
            LogicalPlan::Filter(_) => "Filter",
            LogicalPlan::Project(_) => "Project",
            LogicalPlan::Aggregate(_) => "Aggregate",
            LogicalPlan::AggregateAndGroup(_) => "AggregateAndGroup",
            LogicalPlan::Join(_) => "Join",
            LogicalPlan::Sort(_) => "Sort",
            LogicalPlan::Limit(_) => "Limit",
            LogicalPlan::Distinct(_) => "Distinct",
            LogicalPlan::Union(_) => "Union",
            LogicalPlan::Explain(_) => "Explain",
            LogicalPlan::ShowColumns(_) => "ShowColumns",
            LogicalPlan::ShowCreate(_) => "ShowCreate",
            LogicalPlan::ShowVariables => "ShowVariables",
            LogicalPlan::ShowFunctions => "ShowFunctions",
            LogicalPlan::ShowDatabases => "ShowDatabases",
        }
    }

    pub fn inputs(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Read(node) => {
                node.subplan.iter().map(|p| p.as_ref()).collect()
            }
            LogicalPlan::Filter(node) => vec![&node.input],
            LogicalPlan::Project(node) => vec![&node.input],
            LogicalPlan::Aggregate(node) => vec![&node.input],
            LogicalPlan::AggregateAndGroup(node) => vec![&node.input],
            LogicalPlan::Join(node) => vec![&node.left, &node.right],
            LogicalPlan::Sort(node) => vec![&node.input],
            LogicalPlan::Limit(node) => vec![&node.input],
            LogicalPlan::Distinct(node) => vec![&node.input],
            LogicalPlan::Union(node) => vec![&node.left, &node.right],
            LogicalPlan::Explain(node) => vec![&node.inner],
            _ => Vec::new(),
        }
    }

    /// Single-line description for plan rendering.
    pub fn describe(&self) -> String {
        match self {
            LogicalPlan::Read(node) => match &node.subplan {
                Some(_) => format!("Read ({} as {})", node.relation, node.alias),
                None => format!("Read ({})", node.relation),
            },
            LogicalPlan::FunctionDataset(node) => {
                format!("FunctionDataset ({})", node.function)
            }
            LogicalPlan::Filter(node) => format!("Filter ({})", node.predicate),
            LogicalPlan::Project(node) => format!(
                "Project ({})",
                node.columns
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LogicalPlan::Aggregate(node) => format!(
                "Aggregate ({})",
                node.aggregates
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LogicalPlan::AggregateAndGroup(node) => format!(
                "AggregateAndGroup (groups: {}; aggregates: {})",
                node.groups
                    .iter()
                    .map(|g| g.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                node.aggregates
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LogicalPlan::Join(node) => format!("Join ({})", node.join_type),
            LogicalPlan::Sort(node) => format!(
                "Sort ({})",
                node.keys
                    .iter()
                    .map(|(k, d)| format!(
                        "{k} {}",
                        if *d == Direction::Ascending { "ASC" } else { "DESC" }
                    ))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LogicalPlan::Limit(node) => match node.limit {
                Some(limit) => format!("Limit ({limit} offset {})", node.offset),
                None => format!("Limit (offset {})", node.offset),
            },
            LogicalPlan::Distinct(_) => "Distinct".to_string(),
            LogicalPlan::Union(node) => {
                format!("Union ({})", if node.all { "ALL" } else { "DISTINCT" })
            }
            LogicalPlan::Explain(_) => "Explain".to_string(),
            LogicalPlan::ShowColumns(node) => format!("ShowColumns ({})", node.relation),
            LogicalPlan::ShowCreate(node) => format!("ShowCreate ({})", node.relation),
            other => other.node_name().to_string(),
        }
    }

    /// Indented tree rendering (EXPLAIN and logs).
    pub fn draw(&self) -> String {
        fn draw_node(plan: &LogicalPlan, depth: usize, out: &mut String) {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&plan.describe());
            out.push('\n');
            for input in plan.inputs() {
                draw_node(input, depth + 1, out);
            }
        }
        let mut out = String::new();
        draw_node(self, 0, &mut out);
        out
    }
}
