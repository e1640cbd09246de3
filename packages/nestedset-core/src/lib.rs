#![forbid(unsafe_code)]
//! Nested-set (left/right interval) tree maintenance over a relational table.
//! The engine stays independent of concrete databases: it speaks to storage through the
//! `RowStore` trait and renders SQL through a configurable dialect, so SQLite, PostgreSQL, or an
//! in-memory store can sit underneath.

pub mod cache;
pub mod config;
pub mod error;
pub mod expr;
pub mod hooks;
pub mod ids;
pub mod model;
pub mod query;
pub mod sql;
pub mod traits;
pub mod tree;

pub use cache::{Delta, NodeRegistry, Slot};
pub use config::{ColumnNames, DeleteMode, PathMode, TreeConfig};
pub use error::{Error, Result};
pub use expr::{Assignment, CmpOp, Column, Condition, Direction, RowFields, Select, Value};
pub use hooks::{HookPoint, NoHooks, TreeHooks};
pub use ids::{NodeId, TypeTag};
pub use model::{parent_path, validate_rows, NewRow, NodeHandle, NodeRow, TreeNode};
pub use query::{QueryOutput, TreeQuery};
pub use sql::{render_delete, render_insert, render_select, render_update, Rendered, SqlDialect};
pub use traits::{MemoryRowStore, RowStore};
pub use tree::NestedSet;
