#![forbid(unsafe_code)]
//! PostgreSQL storage for `nestedset-core`.
//!
//! All tree semantics stay in the core engine; this crate only renders its statements with the
//! PostgreSQL dialect and runs them over a shared synchronous `postgres::Client`, wrapped in a `PgConnection` that
//! also tracks the connection's transaction.

mod connection;
mod schema;
mod store;

pub use connection::PgConnection;
pub use schema::{drop_table_for_tests, ensure_schema};
pub use store::PostgresRowStore;
