//! SQLite table store implementation.
//!
//! Implements `TableStore` from `intake-core` using sqlx with split
//! read/write pools. Tables come from declared schemas reconciled at
//! runtime, so every statement here is assembled dynamically; the only
//! identifiers that reach the SQL text are names a `TableSchema` has
//! already validated, and every value goes through a bind parameter.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row as _, Sqlite};
use tracing::{debug, info, warn};

use intake_core::store::{ChangeNotifier, NullNotifier, TableOrigin, TableStore};
use intake_types::error::{ConfigError, StoreError};
use intake_types::schema::{ColumnType, Row, TableSchema, Value};

use super::pool::DatabasePool;

/// A schema the store has reconciled and accepts CRUD for.
#[derive(Debug, Clone)]
struct RegisteredTable {
    schema: TableSchema,
    /// Configured tables notify the mirror on writes; tables registered
    /// by engine code do not.
    mirrored: bool,
}

/// SQLite-backed implementation of `TableStore`.
///
/// Shared freely: clones hand out the same pools, schema registry, and
/// notifier.
pub struct SqliteTableStore<N: ChangeNotifier = NullNotifier> {
    pool: DatabasePool,
    tables: Arc<DashMap<String, RegisteredTable>>,
    notifier: Arc<N>,
}

impl SqliteTableStore {
    /// Create a table store without a mirror hook.
    pub fn new(pool: DatabasePool) -> Self {
        Self::with_notifier(pool, NullNotifier)
    }
}

impl<N: ChangeNotifier> SqliteTableStore<N> {
    /// Create a table store that reports writes on configured tables to
    /// `notifier`.
    pub fn with_notifier(pool: DatabasePool, notifier: N) -> Self {
        Self {
            pool,
            tables: Arc::new(DashMap::new()),
            notifier: Arc::new(notifier),
        }
    }

    fn registered(&self, table: &str) -> Result<RegisteredTable, StoreError> {
        let key = table.trim().to_lowercase();
        self.tables
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    /// Resolve `column` against the schema and coerce `value` to its
    /// declared type. Returns the canonical column name, the only form
    /// that may appear in SQL text.
    fn coerced(
        schema: &TableSchema,
        column: &str,
        value: &Value,
    ) -> Result<(String, Value), StoreError> {
        let (name, ty) = schema
            .resolve_column(column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: schema.name().to_string(),
                column: column.to_string(),
            })?;
        Ok((name.to_string(), value.coerce_to(name, ty)?))
    }

    async fn notify_changed(&self, registered: &RegisteredTable) {
        if !registered.mirrored {
            return;
        }
        if let Err(err) = self.notifier.table_changed(registered.schema.name()).await {
            warn!(
                table = %registered.schema.name(),
                error = %err,
                "Change notification failed"
            );
        }
    }
}

impl<N: ChangeNotifier> Clone for SqliteTableStore<N> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            tables: Arc::clone(&self.tables),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup_error(table: &str, err: sqlx::Error) -> ConfigError {
    ConfigError::TableSetup {
        table: table.to_string(),
        reason: err.to_string(),
    }
}

fn query_error(err: sqlx::Error) -> StoreError {
    StoreError::Query(err.to_string())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Quoted, comma-separated list of the schema's columns for SELECT.
fn select_list(schema: &TableSchema) -> String {
    schema
        .columns()
        .map(|(name, _)| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bind one typed value as the next placeholder.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(n) => query.bind(*n),
        Value::Boolean(b) => query.bind(*b),
        Value::Text(text) => query.bind(text.clone()),
        Value::Timestamp(ts) => query.bind(format_datetime(ts)),
    }
}

/// Read one SQLite row back into a typed `Row`, column by declared column.
fn decode_row(schema: &TableSchema, sqlite_row: &SqliteRow) -> Result<Row, StoreError> {
    let mut row = Row::new();
    for (name, ty) in schema.columns() {
        let value = match ty {
            ColumnType::Integer | ColumnType::IncrementingInteger => sqlite_row
                .try_get::<Option<i64>, _>(name)
                .map_err(query_error)?
                .map(Value::Integer),
            ColumnType::Boolean => sqlite_row
                .try_get::<Option<bool>, _>(name)
                .map_err(query_error)?
                .map(Value::Boolean),
            ColumnType::String => sqlite_row
                .try_get::<Option<String>, _>(name)
                .map_err(query_error)?
                .map(Value::Text),
            ColumnType::DateTime => match sqlite_row
                .try_get::<Option<String>, _>(name)
                .map_err(query_error)?
            {
                None => None,
                Some(text) => Some(Value::Timestamp(parse_datetime(&text).map_err(|_| {
                    StoreError::Coercion {
                        column: name.to_string(),
                        value: format!("'{text}'"),
                        expected: "an RFC 3339 timestamp",
                    }
                })?)),
            },
        };
        row.set(name, value.unwrap_or(Value::Null));
    }
    Ok(row)
}

// ---------------------------------------------------------------------------
// TableStore implementation
// ---------------------------------------------------------------------------

impl<N: ChangeNotifier> TableStore for SqliteTableStore<N> {
    async fn reconcile(&self, schema: &TableSchema, origin: TableOrigin) -> Result<(), ConfigError> {
        let table = schema.name();

        let exists = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| setup_error(table, e))?;

        if exists.is_none() {
            let columns = schema
                .columns()
                .map(|(name, ty)| format!("\"{name}\" {}", ty.sql_definition()))
                .collect::<Vec<_>>()
                .join(", ");
            let ddl = format!("CREATE TABLE \"{table}\" ({columns})");
            sqlx::query(&ddl)
                .execute(&self.pool.writer)
                .await
                .map_err(|e| setup_error(table, e))?;
            info!(table = %table, "Created table");
        } else {
            let rows = sqlx::query("SELECT name FROM pragma_table_info(?)")
                .bind(table)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| setup_error(table, e))?;
            let mut physical = HashSet::with_capacity(rows.len());
            for row in &rows {
                let name: String = row.try_get("name").map_err(|e| setup_error(table, e))?;
                physical.insert(name.to_lowercase());
            }
            // Extra physical columns are left alone; a missing configured
            // column is an operator problem, never an ALTER TABLE.
            for (column, _) in schema.columns() {
                if !physical.contains(column) {
                    return Err(ConfigError::MissingColumn {
                        table: table.to_string(),
                        column: column.to_string(),
                    });
                }
            }
            debug!(table = %table, "Existing table matches declared schema");
        }

        self.tables.insert(
            table.to_string(),
            RegisteredTable {
                schema: schema.clone(),
                mirrored: origin == TableOrigin::Configured,
            },
        );
        Ok(())
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;

        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (column, value) in row.iter() {
            let (name, coerced) = Self::coerced(schema, column, value)?;
            columns.push(format!("\"{name}\""));
            values.push(coerced);
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES", schema.name())
        } else {
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                schema.name(),
                columns.join(", "),
                vec!["?"; values.len()].join(", ")
            )
        };

        let mut query = sqlx::query(&sql);
        for value in &values {
            query = bind_value(query, value);
        }
        let result = query
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        let generated = schema
            .auto_increment_column()
            .map(|_| result.last_insert_rowid());
        self.notify_changed(&registered).await;
        Ok(generated)
    }

    async fn get_one(&self, table: &str, column: &str, value: &Value) -> Result<Row, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;
        let (name, search) = Self::coerced(schema, column, value)?;

        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{name}\" = ? ORDER BY rowid LIMIT 1",
            select_list(schema),
            schema.name()
        );
        let found = bind_value(sqlx::query(&sql), &search)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match found {
            Some(sqlite_row) => decode_row(schema, &sqlite_row),
            None => Err(StoreError::NotFound {
                table: schema.name().to_string(),
                column: name,
                value: value.to_string(),
            }),
        }
    }

    async fn get_one_excluding(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        exclude_column: &str,
        exclude_value: &Value,
    ) -> Result<Row, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;
        let (name, search) = Self::coerced(schema, column, value)?;
        let (excluded, barred) = Self::coerced(schema, exclude_column, exclude_value)?;

        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{name}\" = ? AND \"{excluded}\" != ? \
             ORDER BY rowid LIMIT 1",
            select_list(schema),
            schema.name()
        );
        let found = bind_value(bind_value(sqlx::query(&sql), &search), &barred)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match found {
            Some(sqlite_row) => decode_row(schema, &sqlite_row),
            None => Err(StoreError::NotFound {
                table: schema.name().to_string(),
                column: name,
                value: value.to_string(),
            }),
        }
    }

    async fn get_many(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;
        let (name, search) = Self::coerced(schema, column, value)?;

        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{name}\" = ? ORDER BY rowid",
            select_list(schema),
            schema.name()
        );
        let found = bind_value(sqlx::query(&sql), &search)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        if found.is_empty() {
            return Err(StoreError::NotFound {
                table: schema.name().to_string(),
                column: name,
                value: value.to_string(),
            });
        }
        found.iter().map(|row| decode_row(schema, row)).collect()
    }

    async fn get_range(
        &self,
        table: &str,
        column: &str,
        low: &Value,
        high: &Value,
    ) -> Result<Vec<Row>, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;
        let (name, lower) = Self::coerced(schema, column, low)?;
        let (_, upper) = Self::coerced(schema, column, high)?;

        // Both bounds excluded, matching the range lookups this replaces.
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{name}\" > ? AND \"{name}\" < ? ORDER BY rowid",
            select_list(schema),
            schema.name()
        );
        let found = bind_value(bind_value(sqlx::query(&sql), &lower), &upper)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        if found.is_empty() {
            return Err(StoreError::EmptyRange {
                table: schema.name().to_string(),
                column: name,
                low: low.to_string(),
                high: high.to_string(),
            });
        }
        found.iter().map(|row| decode_row(schema, row)).collect()
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;

        let sql = format!(
            "SELECT {} FROM \"{}\" ORDER BY rowid",
            select_list(schema),
            schema.name()
        );
        let found = sqlx::query(&sql)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        found.iter().map(|row| decode_row(schema, row)).collect()
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.registered(table)?.schema.column_names())
    }

    async fn update(
        &self,
        table: &str,
        search_column: &str,
        search_value: &Value,
        target_column: &str,
        target_value: &Value,
    ) -> Result<u64, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;
        let (search_name, search) = Self::coerced(schema, search_column, search_value)?;
        let (target_name, target) = Self::coerced(schema, target_column, target_value)?;

        let sql = format!(
            "UPDATE \"{}\" SET \"{target_name}\" = ? WHERE \"{search_name}\" = ?",
            schema.name()
        );
        let result = bind_value(bind_value(sqlx::query(&sql), &target), &search)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: schema.name().to_string(),
                column: search_name,
                value: search_value.to_string(),
            });
        }
        self.notify_changed(&registered).await;
        Ok(result.rows_affected())
    }

    async fn delete(
        &self,
        table: &str,
        search_column: &str,
        search_value: &Value,
    ) -> Result<u64, StoreError> {
        let registered = self.registered(table)?;
        let schema = &registered.schema;
        let (name, search) = Self::coerced(schema, search_column, search_value)?;

        let sql = format!("DELETE FROM \"{}\" WHERE \"{name}\" = ?", schema.name());
        let result = bind_value(sqlx::query(&sql), &search)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: schema.name().to_string(),
                column: name,
                value: search_value.to_string(),
            });
        }
        self.notify_changed(&registered).await;
        Ok(result.rows_affected())
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let registered = self.registered(table)?;
        let name = registered.schema.name();

        warn!(table = %name, "Dropping table and its registration");
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{name}\""))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        self.tables.remove(name);
        Ok(())
    }
}
