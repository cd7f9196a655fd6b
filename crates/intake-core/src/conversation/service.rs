//! Session service: starts script conversations and dispatches replies.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use intake_types::error::{SessionError, TransportError};
use intake_types::ids::{ChannelId, ParticipantId};

use crate::catalog::ScriptCatalog;
use crate::conversation::lifecycle::SideChannelManager;
use crate::conversation::registry::{SessionRegistry, SessionState};
use crate::conversation::session::{ConversationSession, ReplyAction};
use crate::store::TableStore;
use crate::transport::{Messenger, SideChannelHost};

/// Sent when processing fails beyond recovery and the session is dropped.
const ABANDON_NOTICE: &str =
    "The conversation had a critical error. You will need to restart from the beginning.";

/// Sent when the platform refuses to open a side channel.
const PERMISSION_NOTICE: &str = "I could not open a private channel for this conversation. \
                                 Please ask an admin to check my permissions.";

/// What became of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The participant has no active session; the message is not ours.
    NoSession,
    /// Dropped without effect: the session was still handling an earlier
    /// message, or had already finished.
    Ignored,
    /// The conversation advanced and awaits the next reply.
    Continued,
    /// The conversation committed its row and ended.
    Completed,
    /// Processing failed and the session was abandoned.
    Abandoned,
}

/// Drives conversations end to end: one instance owns the registry of
/// active sessions and every side channel.
///
/// Generic over the store and transport ports so this crate stays free of
/// infrastructure; the concrete types are wired up at startup.
pub struct SessionService<S, M, H>
where
    S: TableStore + Clone + 'static,
    M: Messenger,
    H: SideChannelHost + Clone + 'static,
{
    catalog: ScriptCatalog,
    registry: SessionRegistry,
    store: S,
    messenger: M,
    channels: SideChannelManager<S, H>,
}

impl<S, M, H> SessionService<S, M, H>
where
    S: TableStore + Clone + 'static,
    M: Messenger,
    H: SideChannelHost + Clone + 'static,
{
    pub fn new(
        catalog: ScriptCatalog,
        store: S,
        messenger: M,
        channels: SideChannelManager<S, H>,
    ) -> Self {
        Self {
            catalog,
            registry: SessionRegistry::new(),
            store,
            messenger,
            channels,
        }
    }

    pub fn catalog(&self) -> &ScriptCatalog {
        &self.catalog
    }

    /// Start a script conversation for a participant.
    ///
    /// A session the participant already has is cancelled first and the
    /// new opening message says so. `target` is who the collected answers
    /// are about and defaults to the participant themselves. With
    /// `parent_channel` set, the conversation gets a private side channel
    /// under it and every prompt is delivered there.
    pub async fn start_script(
        &self,
        kind: &str,
        participant: ParticipantId,
        target: Option<ParticipantId>,
        parent_channel: Option<ChannelId>,
    ) -> Result<(), SessionError> {
        let template = self
            .catalog
            .get(kind)
            .ok_or_else(|| SessionError::UnknownScript(kind.to_string()))?;

        let cancelled_kind = self.cancel_existing(participant).await;

        let mut conversation = ConversationSession::new(
            Arc::clone(&template),
            participant,
            target.unwrap_or(participant),
        );

        if let Some(parent) = parent_channel {
            match self.channels.create(parent, participant, &template.kind).await {
                Ok(channel) => conversation.set_side_channel(channel),
                Err(err) => {
                    if matches!(err, SessionError::Transport(TransportError::Permission(_))) {
                        self.notify_best_effort(participant, None, PERMISSION_NOTICE).await;
                    }
                    warn!(
                        participant = %participant,
                        script = %template.kind,
                        error = %err,
                        "Side channel creation failed, conversation not started"
                    );
                    return Err(err);
                }
            }
        }

        let opening = conversation.opening_message(cancelled_kind.as_deref());
        let side_channel = conversation.side_channel();

        if let Some(displaced) = self.registry.insert(participant, conversation) {
            // Lost a start/start race for the same participant.
            let mut state = displaced.acquire().await;
            state.finished = true;
            if let Some(channel) = state.conversation.side_channel() {
                self.channels.schedule_removal(channel);
            }
        }

        if let Err(err) = self
            .messenger
            .send_prompt(participant, side_channel, &opening)
            .await
        {
            // The participant never saw the first question; take the
            // session back out rather than leave it waiting forever.
            self.drop_session(participant).await;
            return Err(SessionError::Transport(err));
        }

        info!(participant = %participant, script = %template.kind, "Conversation started");
        Ok(())
    }

    /// Feed one inbound message into the participant's conversation.
    ///
    /// A message that arrives while the previous one is still being
    /// handled is dropped, not queued. Failures to persist or to reach
    /// the participant abandon the session after a best-effort notice.
    pub async fn dispatch_message(&self, participant: ParticipantId, text: &str) -> DispatchOutcome {
        let Some(active) = self.registry.get(participant) else {
            return DispatchOutcome::NoSession;
        };
        let Some(mut state) = active.try_acquire() else {
            debug!(participant = %participant, "Reply dropped, previous one still in flight");
            return DispatchOutcome::Ignored;
        };
        if state.finished {
            return DispatchOutcome::Ignored;
        }

        match state.conversation.receive(text) {
            ReplyAction::Commit { table, row } => match self.store.insert(&table, &row).await {
                Ok(generated) => {
                    info!(
                        participant = %participant,
                        table = %table,
                        id = ?generated,
                        "Conversation committed"
                    );
                    let ending = state.conversation.template().ending.clone();
                    if !ending.is_empty() {
                        // The row is already durable, so a lost closing
                        // message only warns.
                        self.notify_best_effort(
                            participant,
                            state.conversation.side_channel(),
                            &ending,
                        )
                        .await;
                    }
                    self.finish(&mut state, participant);
                    DispatchOutcome::Completed
                }
                Err(err) => {
                    self.abandon(&mut state, participant, &SessionError::Store(err)).await;
                    DispatchOutcome::Abandoned
                }
            },
            ReplyAction::Rejected { message }
            | ReplyAction::NextPrompt { message }
            | ReplyAction::Review { message }
            | ReplyAction::EditPrompt { message }
            | ReplyAction::Clarify { message } => {
                match self
                    .messenger
                    .send_prompt(participant, state.conversation.side_channel(), &message)
                    .await
                {
                    Ok(()) => DispatchOutcome::Continued,
                    Err(err) => {
                        self.abandon(&mut state, participant, &SessionError::Transport(err)).await;
                        DispatchOutcome::Abandoned
                    }
                }
            }
        }
    }

    /// Cancel the participant's current session, if any, returning its
    /// script kind for the cancellation notice.
    async fn cancel_existing(&self, participant: ParticipantId) -> Option<String> {
        let old = self.registry.remove(participant)?;
        let mut state = old.acquire().await;
        state.finished = true;
        if let Some(channel) = state.conversation.side_channel() {
            self.channels.schedule_removal(channel);
        }
        let kind = state.conversation.kind().to_string();
        info!(participant = %participant, script = %kind, "Cancelled previous conversation");
        Some(kind)
    }

    /// Remove a just-registered session again after a failed start.
    async fn drop_session(&self, participant: ParticipantId) {
        if let Some(session) = self.registry.remove(participant) {
            let mut state = session.acquire().await;
            state.finished = true;
            if let Some(channel) = state.conversation.side_channel() {
                self.channels.schedule_removal(channel);
            }
        }
    }

    /// Terminal cleanup, called with the processing guard held: mark the
    /// session finished, drop it from the registry, and schedule its side
    /// channel for removal.
    fn finish(&self, state: &mut SessionState, participant: ParticipantId) {
        state.finished = true;
        self.registry.remove(participant);
        if let Some(channel) = state.conversation.side_channel() {
            self.channels.schedule_removal(channel);
        }
    }

    async fn abandon(&self, state: &mut SessionState, participant: ParticipantId, err: &SessionError) {
        error!(
            participant = %participant,
            script = %state.conversation.kind(),
            error = %err,
            "Conversation abandoned"
        );
        self.notify_best_effort(participant, state.conversation.side_channel(), ABANDON_NOTICE)
            .await;
        self.finish(state, participant);
    }

    async fn notify_best_effort(
        &self,
        participant: ParticipantId,
        side_channel: Option<ChannelId>,
        text: &str,
    ) {
        if let Err(err) = self.messenger.send_prompt(participant, side_channel, text).await {
            warn!(participant = %participant, error = %err, "Failed to deliver notice");
        }
    }
}
