//! Table store and change notification port traits.
//!
//! This module defines the `TableStore` trait that the infrastructure
//! layer implements for schema reconciliation and generic row CRUD, and
//! the `ChangeNotifier` hook a store invokes after writes to mirrored
//! tables.

use intake_types::error::{ConfigError, StoreError, TransportError};
use intake_types::schema::{Row, TableSchema, Value};

/// How a table came to be registered, which decides whether writes to it
/// notify the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    /// Declared in the config document; changes notify the mirror.
    Configured,
    /// Registered by engine code for its own bookkeeping; never mirrored.
    Internal,
}

/// Persistence port for schema-reconciled dynamic tables.
///
/// Implementations live in intake-infra (e.g., `SqliteTableStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// Every write is a single self-contained statement: a failed call leaves
/// no partial row behind. All operations require the table to have been
/// registered through `reconcile` first, and column lookups are
/// case-insensitive throughout.
pub trait TableStore: Send + Sync {
    /// Reconcile a declared schema against physical storage.
    ///
    /// Creates the table when it does not exist. When it does, every
    /// configured column must already be present physically; a missing
    /// column is a fatal error naming the table and column, never a
    /// silent migration. Success registers the schema for CRUD.
    fn reconcile(
        &self,
        schema: &TableSchema,
        origin: TableOrigin,
    ) -> impl std::future::Future<Output = Result<(), ConfigError>> + Send;

    /// Insert one row.
    ///
    /// Values are coerced to the declared column types first. Returns the
    /// generated key when the table has an incrementing integer column,
    /// `None` otherwise.
    fn insert(
        &self,
        table: &str,
        row: &Row,
    ) -> impl std::future::Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Fetch the first row where `column` equals `value`.
    ///
    /// "First" means lowest rowid, i.e. insertion order. Zero matches is
    /// a `NotFound` error.
    fn get_one(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> impl std::future::Future<Output = Result<Row, StoreError>> + Send;

    /// Like `get_one`, but skip rows where `exclude_column` equals
    /// `exclude_value`.
    fn get_one_excluding(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        exclude_column: &str,
        exclude_value: &Value,
    ) -> impl std::future::Future<Output = Result<Row, StoreError>> + Send;

    /// Fetch every row where `column` equals `value`, in insertion order.
    /// Zero matches is a `NotFound` error.
    fn get_many(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> impl std::future::Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Fetch every row where `column` lies strictly between `low` and
    /// `high` (both bounds excluded). Zero matches is an `EmptyRange`
    /// error.
    fn get_range(
        &self,
        table: &str,
        column: &str,
        low: &Value,
        high: &Value,
    ) -> impl std::future::Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Fetch the whole table in insertion order. An empty table yields an
    /// empty list, not an error; this is the mirror's read path.
    fn get_all(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Column names of a registered table, in declaration order.
    fn column_names(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Set `target_column` to `target_value` on every row where
    /// `search_column` equals `search_value`. Returns the number of rows
    /// changed; zero matches is a `NotFound` error.
    fn update(
        &self,
        table: &str,
        search_column: &str,
        search_value: &Value,
        target_column: &str,
        target_value: &Value,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Delete every row where `search_column` equals `search_value`.
    /// Returns the number of rows deleted; zero matches is a `NotFound`
    /// error.
    fn delete(
        &self,
        table: &str,
        search_column: &str,
        search_value: &Value,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Drop the physical table and forget its registration.
    fn drop_table(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Hook invoked after a successful write to a mirrored table.
///
/// The mirror copy is best-effort: implementations may fail freely, the
/// store logs the failure and never propagates it into the write path.
pub trait ChangeNotifier: Send + Sync {
    /// Called once per successful insert/update/delete with the name of
    /// the table that changed.
    fn table_changed(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Notifier for stores without a mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    async fn table_changed(&self, _table: &str) -> Result<(), TransportError> {
        Ok(())
    }
}
