//! Script and question definitions.
//!
//! The `*Config` structs mirror the config document one-to-one, with every
//! field optional so the catalog can report exactly which required
//! attribute is missing. The validated `Question`/`ScriptTemplate` forms
//! are built from them once at startup and never mutated afterwards:
//! sessions hold a shared reference to the template and keep their own
//! answer state.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Raw question entry as it appears in the config document.
///
/// Unrecognized keys land in `unknown` so the catalog can warn about them
/// instead of silently dropping typos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub query: Option<String>,
    pub valid_regex: Option<String>,
    pub rejection_response: Option<String>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

/// Raw script entry as it appears in the config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default)]
    pub beginning: String,
    #[serde(default)]
    pub ending: String,
    pub table: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionConfig>,
}

/// Compiled answer validation for one question.
#[derive(Debug, Clone)]
pub struct AnswerRule {
    /// Anchored pattern; an answer must match it in full.
    pub pattern: Regex,
    /// Sent verbatim when an answer does not match.
    pub rejection: String,
}

/// One prompt in a script, with optional answer validation.
#[derive(Debug, Clone)]
pub struct Question {
    /// Storage key, lowercased; must name a column of the script's table.
    pub name: String,
    /// Shown in the review listing and matched against edit requests.
    pub display_name: String,
    /// The prompt text sent to the participant.
    pub query: String,
    pub validation: Option<AnswerRule>,
}

/// An immutable, validated script: framing text plus ordered questions.
#[derive(Debug, Clone)]
pub struct ScriptTemplate {
    /// Script kind, e.g. "registration". Doubles as the registry key.
    pub kind: String,
    /// Sent once before the first question.
    pub beginning: String,
    /// Sent after a successful commit.
    pub ending: String,
    /// Destination table for committed answers, lowercased.
    pub table: String,
    pub questions: Vec<Question>,
}

impl ScriptTemplate {
    /// Position of the question whose display name matches `reply`
    /// (case-insensitive, trimmed).
    pub fn question_by_display_name(&self, reply: &str) -> Option<usize> {
        let want = reply.trim().to_lowercase();
        self.questions
            .iter()
            .position(|q| q.display_name.to_lowercase() == want)
    }
}
