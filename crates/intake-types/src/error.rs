//! Error types shared across the intake engine.
//!
//! One enum per concern: configuration loading, table store operations,
//! chat transport, and session processing. Configuration errors are fatal
//! at startup; store and transport errors are handled per call site.

use thiserror::Error;

/// Errors raised while loading and validating configuration.
///
/// Every variant aborts startup. A script or schema problem must never
/// leave a half-registered catalog behind, and a table mismatch must be
/// resolved by an operator rather than papered over.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(String),

    #[error("could not parse config: {0}")]
    Parse(String),

    #[error("unknown column type '{input}': valid types are {valid}")]
    UnknownColumnType { input: String, valid: String },

    #[error("invalid identifier '{0}': use lowercase letters, digits, and underscores")]
    InvalidIdentifier(String),

    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{table}' declares more than one incrementing integer column")]
    MultipleAutoIncrement { table: String },

    #[error(
        "table '{table}' exists but is missing configured column '{column}': \
         add the column to the database manually or remove it from the config"
    )]
    MissingColumn { table: String, column: String },

    #[error("could not prepare table '{table}': {reason}")]
    TableSetup { table: String, reason: String },

    #[error("script '{script}': question {index} is missing required attribute '{attribute}'")]
    MissingQuestionAttribute {
        script: String,
        index: usize,
        attribute: String,
    },

    #[error("script '{script}' is missing required attribute '{attribute}'")]
    MissingScriptAttribute { script: String, attribute: String },

    #[error(
        "script '{script}': question '{question}' must set valid_regex and \
         rejection_response together or not at all"
    )]
    UnpairedValidation { script: String, question: String },

    #[error("script '{script}': invalid valid_regex for question '{question}': {reason}")]
    InvalidPattern {
        script: String,
        question: String,
        reason: String,
    },

    #[error("script '{script}': duplicate question name '{question}'")]
    DuplicateQuestion { script: String, question: String },

    #[error("script '{script}' has no questions")]
    EmptyScript { script: String },

    #[error("script '{script}' targets unknown table '{table}'")]
    UnknownScriptTable { script: String, table: String },

    #[error("script '{script}': question '{question}' has no matching column in table '{table}'")]
    QuestionWithoutColumn {
        script: String,
        question: String,
        table: String,
    },
}

/// Errors from table store operations (used by trait definitions in intake-core).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("no row in '{table}' where {column} = {value}")]
    NotFound {
        table: String,
        column: String,
        value: String,
    },

    #[error("no rows in '{table}' where {column} is strictly between {low} and {high}")]
    EmptyRange {
        table: String,
        column: String,
        low: String,
        high: String,
    },

    #[error("cannot store {value} in column '{column}' (expects {expected})")]
    Coercion {
        column: String,
        value: String,
        expected: &'static str,
    },
}

impl StoreError {
    /// True for the absence-of-rows outcomes. Callers that treat "no data"
    /// as a normal answer branch on this instead of matching variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::EmptyRange { .. }
        )
    }
}

/// Errors from the chat transport (used by trait definitions in intake-core).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform refused the operation for lack of permission.
    /// Attempt-fatal only: the participant gets told in plain language.
    #[error("missing permission: {0}")]
    Permission(String),

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Errors surfaced by the session service while driving a conversation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown script kind '{0}'")]
    UnknownScript(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
