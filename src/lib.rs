//! Basalt - an embeddable SQL query engine for columnar datasets
//!
//! This crate reads heterogeneous columnar and row-oriented datasets from
//! blob storage and returns results as columnar tables, through:
//! - A cursor-style client interface for submitting statements
//! - A multi-stage compilation pipeline (rewrite, parse, plan, bind, lower)
//! - A pull-based streaming operator runtime over columnar morsels
//!
//! ```no_run
//! let connection = basalt::connect().unwrap();
//! let mut cursor = connection.cursor();
//! cursor.execute("SELECT name FROM $planets WHERE id = 3", &[]).unwrap();
//! let result = cursor.fetch_all().unwrap();
//! assert_eq!(result.num_rows(), 1);
//! ```

pub mod ast_rewriter;
pub mod binder;
pub mod cache;
pub mod catalogue;
pub mod config;
pub mod connection;
pub mod connectors;
pub mod context;
pub mod errors;
pub mod expression;
pub mod logical_planner;
pub mod morsel;
pub mod operators;
pub mod parser;
pub mod partitions;
pub mod permissions;
pub mod physical_planner;
pub mod pipeline;
pub mod samples;
pub mod sql_rewriter;

pub use cache::{KeyValueStore, MemoryCache};
pub use connection::{connect, Connection, Cursor};
pub use errors::{EngineError, ErrorKind};
pub use morsel::{Datum, Morsel};
pub use permissions::Permission;
