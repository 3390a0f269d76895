//! Engine error taxonomy.
//!
//! Every user-visible failure carries a human-readable message plus a
//! machine-readable [`ErrorKind`]. Parsing and binding failures surface
//! before any result batch; execution failures observed after the first
//! batch terminate the stream, leaving already-emitted batches valid.

use std::time::Duration;

use thiserror::Error;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Sql,
    MissingSqlStatement,
    UnsupportedSyntax,
    Parameter,
    ColumnNotFound,
    AmbiguousIdentifier,
    TypeMismatch,
    Permissions,
    DatasetNotFound,
    EmptyDataset,
    UnsupportedFileType,
    UnsupportedSegmentation,
    CursorInvalidState,
    OutOfMemory,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("SQL error: {0}")]
    Sql(String),

    #[error("SQL statement not found")]
    MissingSqlStatement,

    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),

    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("column '{column}' not found{hint}")]
    ColumnNotFound { column: String, hint: String },

    #[error("identifier '{0}' matches more than one column")]
    AmbiguousIdentifier(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("permission denied: {0}")]
    Permissions(String),

    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("dataset '{0}' contains no data")]
    EmptyDataset(String),

    #[error("file type not supported: '{0}'")]
    UnsupportedFileType(String),

    #[error("dataset '{0}' uses an unsupported segmentation scheme")]
    UnsupportedSegmentation(String),

    #[error("cursor can only be executed once")]
    CursorInvalidState,

    #[error("operator exceeded the memory ceiling of {0} bytes")]
    OutOfMemory(u64),

    #[error("query cancelled after {}ms", elapsed.as_millis())]
    Cancelled { elapsed: Duration },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Build a `ColumnNotFound` with an optional nearest-name suggestion.
    pub fn column_not_found(column: impl Into<String>, suggestion: Option<&str>) -> Self {
        let hint = match suggestion {
            Some(name) => format!(", did you mean '{name}'?"),
            None => String::new(),
        };
        EngineError::ColumnNotFound {
            column: column.into(),
            hint,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Sql(_) => ErrorKind::Sql,
            EngineError::MissingSqlStatement => ErrorKind::MissingSqlStatement,
            EngineError::UnsupportedSyntax(_) => ErrorKind::UnsupportedSyntax,
            EngineError::Parameter(_) => ErrorKind::Parameter,
            EngineError::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            EngineError::AmbiguousIdentifier(_) => ErrorKind::AmbiguousIdentifier,
            EngineError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            EngineError::Permissions(_) => ErrorKind::Permissions,
            EngineError::DatasetNotFound(_) => ErrorKind::DatasetNotFound,
            EngineError::EmptyDataset(_) => ErrorKind::EmptyDataset,
            EngineError::UnsupportedFileType(_) => ErrorKind::UnsupportedFileType,
            EngineError::UnsupportedSegmentation(_) => ErrorKind::UnsupportedSegmentation,
            EngineError::CursorInvalidState => ErrorKind::CursorInvalidState,
            EngineError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            EngineError::Cancelled { .. } => ErrorKind::Cancelled,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Process exit code for CLI use: 0 success, 1 SQL error, 2 permission
    /// denied, 3 dataset not found, 4 internal error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Permissions => 2,
            ErrorKind::DatasetNotFound | ErrorKind::EmptyDataset => 3,
            ErrorKind::Internal | ErrorKind::OutOfMemory | ErrorKind::Cancelled => 4,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(EngineError::Sql("x".into()).exit_code(), 1);
        assert_eq!(EngineError::Permissions("x".into()).exit_code(), 2);
        assert_eq!(EngineError::DatasetNotFound("x".into()).exit_code(), 3);
        assert_eq!(EngineError::Internal("x".into()).exit_code(), 4);
    }

    #[test]
    fn test_column_not_found_hint() {
        let err = EngineError::column_not_found("nmae", Some("name"));
        assert_eq!(
            err.to_string(),
            "column 'nmae' not found, did you mean 'name'?"
        );
        let err = EngineError::column_not_found("ghost", None);
        assert_eq!(err.to_string(), "column 'ghost' not found");
    }
}
