//! SQLite storage layer.
//!
//! The schema-reconciling table store backed by SQLite with WAL mode and
//! split read/write connection pools. Tables are created at runtime from
//! declared schemas, so there are no compile-time migrations here.

pub mod pool;
pub mod table_store;
