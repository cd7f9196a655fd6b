//! Column types, table schemas, and dynamic row values.
//!
//! A `TableSchema` is the declared shape of one stored table. Names are
//! lowercased and validated as SQL identifiers on construction, which is
//! what makes it safe for the store to interpolate them into statements
//! later (values always travel as bind parameters).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};

/// Every accepted type spelling, for error messages.
const VALID_TYPE_NAMES: [&str; 10] = [
    "string",
    "str",
    "integer",
    "int",
    "incrementing_integer",
    "incr_integer",
    "boolean",
    "bool",
    "datetime",
    "date",
];

/// Storage type of a single column.
///
/// The set is closed: every configured column must map to one of these,
/// and each variant knows its SQLite representation. `IncrementingInteger`
/// marks the table's generated primary key; at most one per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    IncrementingInteger,
    Boolean,
    String,
    DateTime,
}

impl ColumnType {
    /// Parse a configured type name. Case- and whitespace-insensitive,
    /// accepting the short synonyms used in config files.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        match input.trim().to_lowercase().as_str() {
            "string" | "str" => Ok(ColumnType::String),
            "integer" | "int" => Ok(ColumnType::Integer),
            "incrementing_integer" | "incr_integer" => Ok(ColumnType::IncrementingInteger),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "datetime" | "date" => Ok(ColumnType::DateTime),
            other => Err(ConfigError::UnknownColumnType {
                input: other.to_string(),
                valid: VALID_TYPE_NAMES.join(", "),
            }),
        }
    }

    /// Canonical config name for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::IncrementingInteger => "incrementing_integer",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
        }
    }

    /// SQLite column definition fragment for this type.
    ///
    /// Booleans and datetimes lean on SQLite affinity: BOOLEAN stores as
    /// 0/1 integers, datetimes as RFC 3339 TEXT.
    pub fn sql_definition(&self) -> &'static str {
        match self {
            ColumnType::String => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::IncrementingInteger => "INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::DateTime => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lowercase and validate a table or column identifier.
///
/// Accepts `[a-z_][a-z0-9_]*` after trimming and lowercasing. Everything
/// that reaches a SQL statement as an identifier goes through here first.
fn normalize_identifier(raw: &str) -> Result<String, ConfigError> {
    let name = raw.trim().to_lowercase();
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_start || !valid_rest {
        return Err(ConfigError::InvalidIdentifier(raw.trim().to_string()));
    }
    Ok(name)
}

/// Declared shape of one stored table: ordered column names and types.
///
/// Construction normalizes every name and enforces the structural
/// invariants (unique columns, at most one incrementing integer), so a
/// `TableSchema` in hand is always safe to turn into DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<(String, ColumnType)>,
}

impl TableSchema {
    /// Build a schema from a table name and ordered column definitions.
    pub fn new(name: &str, columns: Vec<(String, ColumnType)>) -> Result<Self, ConfigError> {
        let table = normalize_identifier(name)?;

        let mut normalized: Vec<(String, ColumnType)> = Vec::with_capacity(columns.len());
        let mut auto_increment_seen = false;
        for (raw_name, column_type) in columns {
            let column = normalize_identifier(&raw_name)?;
            if normalized.iter().any(|(existing, _)| *existing == column) {
                return Err(ConfigError::DuplicateColumn {
                    table,
                    column,
                });
            }
            if column_type == ColumnType::IncrementingInteger {
                if auto_increment_seen {
                    return Err(ConfigError::MultipleAutoIncrement { table });
                }
                auto_increment_seen = true;
            }
            normalized.push((column, column_type));
        }

        Ok(Self {
            name: table,
            columns: normalized,
        })
    }

    /// Normalized table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Resolve a caller-supplied column name (any case) to the schema's
    /// stored name and type. The returned name is the validated one and
    /// the only form that may appear in a statement.
    pub fn resolve_column(&self, column: &str) -> Option<(&str, ColumnType)> {
        let want = column.trim().to_lowercase();
        self.columns
            .iter()
            .find(|(name, _)| *name == want)
            .map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Whether the schema declares this column (any case).
    pub fn has_column(&self, column: &str) -> bool {
        self.resolve_column(column).is_some()
    }

    /// Name of the incrementing integer column, if the table has one.
    pub fn auto_increment_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, ty)| *ty == ColumnType::IncrementingInteger)
            .map(|(name, _)| name.as_str())
    }
}

/// A dynamically typed cell value.
///
/// Insert and query parameters travel as `Value`s and are coerced to the
/// destination column's declared type before they reach a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Boolean(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Coerce this value to a column's declared type.
    ///
    /// Only lossless conversions are accepted: text parses into integers,
    /// booleans, and RFC 3339 timestamps (chat answers arrive as text),
    /// integers 0/1 become booleans, and integers and timestamps render
    /// into text columns. Anything else is a typed error naming the column.
    pub fn coerce_to(&self, column: &str, ty: ColumnType) -> Result<Value, StoreError> {
        let mismatch = || StoreError::Coercion {
            column: column.to_string(),
            value: self.to_string(),
            expected: ty.as_str(),
        };

        if matches!(self, Value::Null) {
            return Ok(Value::Null);
        }

        match ty {
            ColumnType::Integer | ColumnType::IncrementingInteger => match self {
                Value::Integer(_) => Ok(self.clone()),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            ColumnType::Boolean => match self {
                Value::Boolean(_) => Ok(self.clone()),
                Value::Integer(0) => Ok(Value::Boolean(false)),
                Value::Integer(1) => Ok(Value::Boolean(true)),
                Value::Text(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "1" => Ok(Value::Boolean(true)),
                    "false" | "no" | "0" => Ok(Value::Boolean(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            ColumnType::String => match self {
                Value::Text(_) => Ok(self.clone()),
                Value::Integer(i) => Ok(Value::Text(i.to_string())),
                Value::Timestamp(ts) => Ok(Value::Text(ts.to_rfc3339())),
                _ => Err(mismatch()),
            },
            ColumnType::DateTime => match self {
                Value::Timestamp(_) => Ok(self.clone()),
                Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// One stored record: ordered column name -> value pairs.
///
/// Column names are lowercased on the way in, matching the store's
/// casefold convention, and looked up case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for literals in call sites and tests.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value.into());
        self
    }

    /// Set a column, replacing any existing entry of the same name.
    pub fn set(&mut self, column: &str, value: Value) {
        let name = column.trim().to_lowercase();
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        let want = column.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(name, _)| *name == want)
            .map(|(_, value)| value)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
