//! Conversation state machine.
//!
//! A `ConversationSession` walks one participant through a script: ask
//! each question in order, reject answers that fail validation, then show
//! a review where single answers can be re-edited before the whole set is
//! committed as one row. The machine performs no I/O: `receive` maps a
//! reply to a `ReplyAction`, and the session service executes it.

use std::sync::Arc;

use intake_types::ids::{ChannelId, ParticipantId};
use intake_types::schema::{Row, Value};
use intake_types::script::ScriptTemplate;

/// Where the conversation stands between replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Walking the script; the indexed question is open.
    Asking(usize),
    /// Re-asking one question from the review; a valid answer returns
    /// straight to the review instead of continuing the walk.
    Editing(usize),
    /// All questions answered; waiting for "yes" or a question to change.
    Reviewing,
}

/// What the service must do with one processed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    /// The answer failed validation; send the rejection, the same
    /// question stays open.
    Rejected { message: String },
    /// The answer was recorded; send the next question.
    NextPrompt { message: String },
    /// Every question is answered; send the review listing.
    Review { message: String },
    /// A review reply named a question to change; re-ask it.
    EditPrompt { message: String },
    /// A review reply matched neither "yes" nor a question; re-explain.
    Clarify { message: String },
    /// The participant confirmed; commit `row` into `table`.
    Commit { table: String, row: Row },
}

/// One in-progress script conversation for one participant.
///
/// Holds a shared handle to the immutable template plus this session's
/// own answer slots. The template is guaranteed non-empty by the catalog.
#[derive(Debug)]
pub struct ConversationSession {
    template: Arc<ScriptTemplate>,
    participant: ParticipantId,
    target: ParticipantId,
    side_channel: Option<ChannelId>,
    phase: Phase,
    answers: Vec<Option<String>>,
}

impl ConversationSession {
    pub fn new(
        template: Arc<ScriptTemplate>,
        participant: ParticipantId,
        target: ParticipantId,
    ) -> Self {
        let answers = vec![None; template.questions.len()];
        Self {
            template,
            participant,
            target,
            side_channel: None,
            phase: Phase::Asking(0),
            answers,
        }
    }

    pub fn template(&self) -> &ScriptTemplate {
        &self.template
    }

    pub fn kind(&self) -> &str {
        &self.template.kind
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Whom the collected answers are about; defaults to the participant.
    pub fn target(&self) -> ParticipantId {
        self.target
    }

    pub fn side_channel(&self) -> Option<ChannelId> {
        self.side_channel
    }

    pub fn set_side_channel(&mut self, channel: ChannelId) {
        self.side_channel = Some(channel);
    }

    /// First message of the conversation: an optional cancellation notice
    /// for the session this one displaced, the script's beginning text,
    /// and the first question.
    pub fn opening_message(&self, cancelled_kind: Option<&str>) -> String {
        let mut message = String::new();
        if let Some(kind) = cancelled_kind {
            message.push_str(&format!("Cancelled the previous {kind} conversation.\n"));
        }
        if !self.template.beginning.is_empty() {
            message.push_str(&self.template.beginning);
            message.push_str("\n\n");
        }
        message.push_str(&self.template.questions[0].query);
        message
    }

    /// Feed one reply into the machine and get the action to perform.
    pub fn receive(&mut self, reply: &str) -> ReplyAction {
        match self.phase {
            Phase::Asking(index) => self.answer_question(index, reply, false),
            Phase::Editing(index) => self.answer_question(index, reply, true),
            Phase::Reviewing => self.review_reply(reply),
        }
    }

    fn answer_question(&mut self, index: usize, reply: &str, editing: bool) -> ReplyAction {
        let question = &self.template.questions[index];
        if let Some(rule) = &question.validation {
            if !rule.pattern.is_match(reply) {
                return ReplyAction::Rejected {
                    message: format!("{}\nPlease answer again.", rule.rejection),
                };
            }
        }

        self.answers[index] = Some(reply.to_string());

        if editing {
            self.phase = Phase::Reviewing;
            return ReplyAction::Review {
                message: self.review_message(),
            };
        }

        let next = index + 1;
        if next < self.template.questions.len() {
            self.phase = Phase::Asking(next);
            ReplyAction::NextPrompt {
                message: self.template.questions[next].query.clone(),
            }
        } else {
            self.phase = Phase::Reviewing;
            ReplyAction::Review {
                message: self.review_message(),
            }
        }
    }

    fn review_reply(&mut self, reply: &str) -> ReplyAction {
        if reply.trim().eq_ignore_ascii_case("yes") {
            return ReplyAction::Commit {
                table: self.template.table.clone(),
                row: self.completed_row(),
            };
        }

        if let Some(index) = self.template.question_by_display_name(reply) {
            self.phase = Phase::Editing(index);
            return ReplyAction::EditPrompt {
                message: self.template.questions[index].query.clone(),
            };
        }

        ReplyAction::Clarify {
            message: self.review_message(),
        }
    }

    /// Review listing: submission instructions, then one
    /// `Display Name: answer` line per question.
    fn review_message(&self) -> String {
        let example = &self.template.questions[0].display_name;
        let mut message = format!(
            "**Type \"yes\" to submit.**\n\
             Or type the name of what you want to change, such as \"{example}\".\n\n"
        );
        let lines: Vec<String> = self
            .template
            .questions
            .iter()
            .zip(&self.answers)
            .map(|(question, answer)| {
                format!(
                    "{}: {}",
                    question.display_name,
                    answer.as_deref().unwrap_or("")
                )
            })
            .collect();
        message.push_str(&lines.join("\n"));
        message
    }

    /// The finished row: question name -> answer, in question order.
    fn completed_row(&self) -> Row {
        let mut row = Row::new();
        for (question, answer) in self.template.questions.iter().zip(&self.answers) {
            if let Some(answer) = answer {
                row.set(&question.name, Value::Text(answer.clone()));
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_types::script::{AnswerRule, Question};
    use regex::Regex;

    fn question(name: &str, display_name: &str, query: &str) -> Question {
        Question {
            name: name.to_string(),
            display_name: display_name.to_string(),
            query: query.to_string(),
            validation: None,
        }
    }

    fn template() -> Arc<ScriptTemplate> {
        Arc::new(ScriptTemplate {
            kind: "registration".to_string(),
            beginning: "Welcome to registration.".to_string(),
            ending: "You are registered!".to_string(),
            table: "members".to_string(),
            questions: vec![
                question("name", "Name", "What is your name?"),
                Question {
                    validation: Some(AnswerRule {
                        pattern: Regex::new("^(?:[^@ ]+@[^@ ]+)$").unwrap(),
                        rejection: "That does not look like an email address.".to_string(),
                    }),
                    ..question("email", "Email", "What is your email?")
                },
            ],
        })
    }

    fn session() -> ConversationSession {
        ConversationSession::new(template(), ParticipantId(1), ParticipantId(1))
    }

    fn text(action: ReplyAction) -> String {
        match action {
            ReplyAction::Rejected { message }
            | ReplyAction::NextPrompt { message }
            | ReplyAction::Review { message }
            | ReplyAction::EditPrompt { message }
            | ReplyAction::Clarify { message } => message,
            ReplyAction::Commit { .. } => panic!("expected a message action"),
        }
    }

    // --- Opening ---

    #[test]
    fn test_opening_message_frames_first_question() {
        let opening = session().opening_message(None);
        assert_eq!(
            opening,
            "Welcome to registration.\n\nWhat is your name?"
        );
    }

    #[test]
    fn test_opening_message_announces_cancellation() {
        let opening = session().opening_message(Some("tag_report"));
        assert!(
            opening.starts_with("Cancelled the previous tag_report conversation.\n"),
            "got: {opening}"
        );
        assert!(opening.ends_with("What is your name?"));
    }

    #[test]
    fn test_opening_message_without_beginning_is_just_the_question() {
        let bare = Arc::new(ScriptTemplate {
            beginning: String::new(),
            ..(*template()).clone()
        });
        let session = ConversationSession::new(bare, ParticipantId(1), ParticipantId(1));
        assert_eq!(session.opening_message(None), "What is your name?");
    }

    // --- Walking the script ---

    #[test]
    fn test_valid_answers_advance_in_order() {
        let mut session = session();
        let action = session.receive("Joe");
        assert_eq!(
            action,
            ReplyAction::NextPrompt {
                message: "What is your email?".to_string()
            }
        );

        let ReplyAction::Review { message } = session.receive("joe@example.com") else {
            panic!("expected review after the last question");
        };
        assert!(message.contains("Type \"yes\" to submit."), "got: {message}");
        assert!(message.contains("such as \"Name\""), "got: {message}");
        assert!(message.contains("Name: Joe"), "got: {message}");
        assert!(message.contains("Email: joe@example.com"), "got: {message}");
    }

    #[test]
    fn test_rejected_answer_keeps_question_open() {
        let mut session = session();
        session.receive("Joe");

        let action = session.receive("not an email");
        assert_eq!(
            action,
            ReplyAction::Rejected {
                message: "That does not look like an email address.\nPlease answer again."
                    .to_string()
            }
        );

        // Still the same question: a valid answer now completes the walk.
        assert!(matches!(
            session.receive("joe@example.com"),
            ReplyAction::Review { .. }
        ));
    }

    #[test]
    fn test_display_name_text_is_an_ordinary_answer_while_asking() {
        let mut session = session();
        let action = session.receive("Email");
        assert!(matches!(action, ReplyAction::NextPrompt { .. }));
        session.receive("joe@example.com");

        let ReplyAction::Commit { row, .. } = session.receive("yes") else {
            panic!("expected commit");
        };
        assert_eq!(row.get("name"), Some(&Value::Text("Email".to_string())));
    }

    // --- Review and edit ---

    fn reviewed_session() -> ConversationSession {
        let mut session = session();
        session.receive("Joe");
        session.receive("joe@example.com");
        session
    }

    #[test]
    fn test_commit_carries_table_and_answers() {
        let mut session = reviewed_session();
        let ReplyAction::Commit { table, row } = session.receive("yes") else {
            panic!("expected commit");
        };
        assert_eq!(table, "members");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["name", "email"]);
        assert_eq!(row.get("name"), Some(&Value::Text("Joe".to_string())));
        assert_eq!(
            row.get("email"),
            Some(&Value::Text("joe@example.com".to_string()))
        );
    }

    #[test]
    fn test_affirmative_is_trimmed_and_case_insensitive() {
        let mut session = reviewed_session();
        assert!(matches!(
            session.receive("  YES "),
            ReplyAction::Commit { .. }
        ));
    }

    #[test]
    fn test_edit_resets_only_the_named_question() {
        let mut session = reviewed_session();

        let action = session.receive(" email ");
        assert_eq!(
            action,
            ReplyAction::EditPrompt {
                message: "What is your email?".to_string()
            }
        );

        // A valid replacement returns straight to the review.
        let ReplyAction::Review { message } = session.receive("new@example.com") else {
            panic!("expected review after edit");
        };
        assert!(message.contains("Email: new@example.com"), "got: {message}");
        assert!(message.contains("Name: Joe"), "got: {message}");

        let ReplyAction::Commit { row, .. } = session.receive("yes") else {
            panic!("expected commit");
        };
        assert_eq!(row.get("name"), Some(&Value::Text("Joe".to_string())));
        assert_eq!(
            row.get("email"),
            Some(&Value::Text("new@example.com".to_string()))
        );
    }

    #[test]
    fn test_edit_answers_are_validated_too() {
        let mut session = reviewed_session();
        session.receive("Email");

        let action = session.receive("still not an email");
        assert!(matches!(action, ReplyAction::Rejected { .. }));

        // The edit is still open; a valid answer returns to review.
        assert!(matches!(
            session.receive("fixed@example.com"),
            ReplyAction::Review { .. }
        ));
    }

    #[test]
    fn test_unrecognized_review_reply_re_explains() {
        let mut session = reviewed_session();
        let ReplyAction::Clarify { message } = session.receive("maybe?") else {
            panic!("expected clarify");
        };
        assert!(message.contains("Type \"yes\" to submit."), "got: {message}");

        // Still reviewing: yes commits.
        assert!(matches!(session.receive("yes"), ReplyAction::Commit { .. }));
    }

    #[test]
    fn test_one_question_script_reviews_with_its_own_example() {
        let single = Arc::new(ScriptTemplate {
            kind: "poll".to_string(),
            beginning: String::new(),
            ending: String::new(),
            table: "answers".to_string(),
            questions: vec![question("choice", "Choice", "Red or blue?")],
        });
        let mut session = ConversationSession::new(single, ParticipantId(2), ParticipantId(2));
        let review = text(session.receive("red"));
        assert!(review.contains("such as \"Choice\""), "got: {review}");
    }
}
