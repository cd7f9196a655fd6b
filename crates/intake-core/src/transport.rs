//! Chat transport port traits.
//!
//! The engine never talks to a chat platform directly. It consumes two
//! narrow capabilities: delivering a text prompt to a participant, and
//! managing the private side channel a conversation may run in. The
//! platform adapter implements both.

use intake_types::error::TransportError;
use intake_types::ids::{ChannelId, ParticipantId};

/// Outbound message delivery.
pub trait Messenger: Send + Sync {
    /// Deliver conversation text to a participant.
    ///
    /// `side_channel` is the session's private channel when the
    /// conversation has one; the engine supplies it because the transport
    /// has no way to know about channels the engine itself opened. With
    /// `None`, delivery goes wherever the adapter normally reaches the
    /// participant.
    fn send_prompt(
        &self,
        participant: ParticipantId,
        side_channel: Option<ChannelId>,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Creation and removal of private per-conversation channels.
pub trait SideChannelHost: Send + Sync {
    /// Open a private channel under `parent` for one conversation.
    ///
    /// Fails with `TransportError::Permission` when the platform refuses;
    /// the engine surfaces that to the participant in plain language.
    fn create_channel(
        &self,
        parent: ChannelId,
        participant: ParticipantId,
        label: &str,
    ) -> impl std::future::Future<Output = Result<ChannelId, TransportError>> + Send;

    /// Remove a channel. Must tolerate a channel that is already gone and
    /// report `Ok` for it; removal is best-effort by contract.
    fn delete_channel(
        &self,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}
