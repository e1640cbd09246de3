#![forbid(unsafe_code)]
//! SQLite storage for `nestedset-core`.
//! The store renders every statement through the core SQL layer with the SQLite dialect, so the
//! engine's bulk updates run as single `UPDATE ... WHERE` statements inside one transaction.

mod schema;
mod store;

pub use schema::ensure_schema;
pub use store::SqliteRowStore;
