//! Registry of active conversations, one per participant.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};

use intake_types::ids::ParticipantId;

use crate::conversation::session::ConversationSession;

/// Mutable state of a registered conversation. Lives behind the
/// processing guard in [`ActiveSession`].
pub struct SessionState {
    pub conversation: ConversationSession,
    /// Set when the session reaches a terminal state. A task that
    /// acquired the guard through a stale handle checks this and
    /// drops the message instead of feeding a dead conversation.
    pub finished: bool,
}

/// A registered conversation plus its processing guard.
///
/// The mutex serializes message handling: whoever holds the guard is
/// the only task allowed to advance the conversation.
pub struct ActiveSession {
    state: Mutex<SessionState>,
}

impl ActiveSession {
    fn new(conversation: ConversationSession) -> Self {
        Self {
            state: Mutex::new(SessionState {
                conversation,
                finished: false,
            }),
        }
    }

    /// Take the processing guard without waiting.
    ///
    /// `None` means another message is being handled right now; that
    /// message wins and the caller drops this one.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, SessionState>> {
        self.state.try_lock().ok()
    }

    /// Wait for the processing guard. Used by cancellation, which must
    /// not silently lose to an in-flight reply.
    pub async fn acquire(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }
}

/// Concurrent map from participant to their single active session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ParticipantId, Arc<ActiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversation for a participant, returning the session
    /// it displaced if one was already running.
    pub fn insert(
        &self,
        participant: ParticipantId,
        conversation: ConversationSession,
    ) -> Option<Arc<ActiveSession>> {
        self.sessions
            .insert(participant, Arc::new(ActiveSession::new(conversation)))
    }

    pub fn get(&self, participant: ParticipantId) -> Option<Arc<ActiveSession>> {
        self.sessions
            .get(&participant)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, participant: ParticipantId) -> Option<Arc<ActiveSession>> {
        self.sessions.remove(&participant).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_types::script::{Question, ScriptTemplate};

    fn conversation(kind: &str) -> ConversationSession {
        let template = Arc::new(ScriptTemplate {
            kind: kind.to_string(),
            beginning: String::new(),
            ending: String::new(),
            table: "members".to_string(),
            questions: vec![Question {
                name: "name".to_string(),
                display_name: "Name".to_string(),
                query: "What is your name?".to_string(),
                validation: None,
            }],
        });
        ConversationSession::new(template, ParticipantId(1), ParticipantId(1))
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.insert(ParticipantId(1), conversation("signup")).is_none());
        assert_eq!(registry.len(), 1);

        let active = registry.get(ParticipantId(1)).expect("session registered");
        assert_eq!(active.acquire().await.conversation.kind(), "signup");
        assert!(registry.get(ParticipantId(2)).is_none());

        assert!(registry.remove(ParticipantId(1)).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(ParticipantId(1)).is_none());
    }

    #[tokio::test]
    async fn test_insert_returns_displaced_session() {
        let registry = SessionRegistry::new();
        registry.insert(ParticipantId(1), conversation("signup"));

        let displaced = registry
            .insert(ParticipantId(1), conversation("feedback"))
            .expect("old session returned");
        assert_eq!(displaced.acquire().await.conversation.kind(), "signup");

        // The new session replaced it rather than piling up.
        assert_eq!(registry.len(), 1);
        let active = registry.get(ParticipantId(1)).unwrap();
        assert_eq!(active.acquire().await.conversation.kind(), "feedback");
    }

    #[tokio::test]
    async fn test_guard_excludes_concurrent_handling() {
        let registry = SessionRegistry::new();
        registry.insert(ParticipantId(1), conversation("signup"));
        let active = registry.get(ParticipantId(1)).unwrap();

        let guard = active.acquire().await;
        assert!(active.try_acquire().is_none());

        drop(guard);
        assert!(active.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_finished_flag_survives_removal() {
        let registry = SessionRegistry::new();
        registry.insert(ParticipantId(1), conversation("signup"));

        // A handle obtained before removal still sees the terminal flag.
        let stale = registry.get(ParticipantId(1)).unwrap();
        {
            let removed = registry.remove(ParticipantId(1)).unwrap();
            removed.acquire().await.finished = true;
        }
        assert!(stale.acquire().await.finished);
    }
}
