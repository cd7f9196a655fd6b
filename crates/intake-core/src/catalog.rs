//! Script catalog: validates and compiles every configured script at startup.
//!
//! Validation is eager and strict. A script that could fail mid-conversation
//! (a question with no destination column, a pattern that does not compile)
//! must be rejected before any participant can start it, so a violation
//! aborts the whole load with an error naming the script and the problem.
//! Unknown question attributes are the one exception: they are logged and
//! ignored so a config typo degrades loudly instead of fatally.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use intake_types::config::IntakeConfig;
use intake_types::error::ConfigError;
use intake_types::schema::TableSchema;
use intake_types::script::{AnswerRule, Question, QuestionConfig, ScriptConfig, ScriptTemplate};

/// Immutable registry of validated script templates.
///
/// Built once at startup; sessions receive `Arc` handles to the templates
/// and never copy or mutate them.
#[derive(Debug)]
pub struct ScriptCatalog {
    scripts: HashMap<String, Arc<ScriptTemplate>>,
}

impl ScriptCatalog {
    /// Validate and compile every script in the config.
    ///
    /// Nothing is registered on failure: the first violation fails the
    /// whole load.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, ConfigError> {
        let schemas: HashMap<String, TableSchema> = config
            .table_schemas()?
            .into_iter()
            .map(|schema| (schema.name().to_string(), schema))
            .collect();

        let mut scripts = HashMap::with_capacity(config.scripts.len());
        for (kind, script_config) in &config.scripts {
            let kind = kind.trim().to_lowercase();
            let template = build_template(&kind, script_config, &schemas)?;
            scripts.insert(kind, Arc::new(template));
        }

        info!(scripts = scripts.len(), "Script catalog loaded");
        Ok(Self { scripts })
    }

    /// Look up a script template by kind (case-insensitive).
    pub fn get(&self, kind: &str) -> Option<Arc<ScriptTemplate>> {
        self.scripts.get(&kind.trim().to_lowercase()).cloned()
    }

    /// Registered script kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

fn build_template(
    kind: &str,
    config: &ScriptConfig,
    schemas: &HashMap<String, TableSchema>,
) -> Result<ScriptTemplate, ConfigError> {
    let table = config
        .table
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ConfigError::MissingScriptAttribute {
            script: kind.to_string(),
            attribute: "table".to_string(),
        })?
        .to_lowercase();

    let schema = schemas
        .get(&table)
        .ok_or_else(|| ConfigError::UnknownScriptTable {
            script: kind.to_string(),
            table: table.clone(),
        })?;

    if config.questions.is_empty() {
        return Err(ConfigError::EmptyScript {
            script: kind.to_string(),
        });
    }

    let mut questions: Vec<Question> = Vec::with_capacity(config.questions.len());
    for (index, raw) in config.questions.iter().enumerate() {
        let question = build_question(kind, index, raw)?;
        if questions.iter().any(|q| q.name == question.name) {
            return Err(ConfigError::DuplicateQuestion {
                script: kind.to_string(),
                question: question.name,
            });
        }
        if !schema.has_column(&question.name) {
            return Err(ConfigError::QuestionWithoutColumn {
                script: kind.to_string(),
                question: question.name,
                table: table.clone(),
            });
        }
        questions.push(question);
    }

    Ok(ScriptTemplate {
        kind: kind.to_string(),
        beginning: config.beginning.clone(),
        ending: config.ending.clone(),
        table,
        questions,
    })
}

fn build_question(
    script: &str,
    index: usize,
    raw: &QuestionConfig,
) -> Result<Question, ConfigError> {
    if !raw.unknown.is_empty() {
        let keys: Vec<&str> = raw.unknown.keys().map(String::as_str).collect();
        warn!(
            script = %script,
            question = index,
            keys = ?keys,
            "Ignoring unknown question attributes"
        );
    }

    let name = required_attribute(script, index, "name", raw.name.as_deref())?.to_lowercase();
    let display_name =
        required_attribute(script, index, "display_name", raw.display_name.as_deref())?.to_string();
    let query = required_attribute(script, index, "query", raw.query.as_deref())?.to_string();

    let validation = match (&raw.valid_regex, &raw.rejection_response) {
        (None, None) => None,
        (Some(pattern), Some(rejection)) => {
            // Anchor so an answer must match the pattern in full.
            let anchored = format!("^(?:{pattern})$");
            let compiled = Regex::new(&anchored).map_err(|e| ConfigError::InvalidPattern {
                script: script.to_string(),
                question: name.clone(),
                reason: e.to_string(),
            })?;
            Some(AnswerRule {
                pattern: compiled,
                rejection: rejection.clone(),
            })
        }
        _ => {
            return Err(ConfigError::UnpairedValidation {
                script: script.to_string(),
                question: name,
            });
        }
    };

    Ok(Question {
        name,
        display_name,
        query,
        validation,
    })
}

fn required_attribute<'a>(
    script: &str,
    index: usize,
    attribute: &str,
    value: Option<&'a str>,
) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingQuestionAttribute {
            script: script.to_string(),
            index,
            attribute: attribute.to_string(),
        }),
    }
}
