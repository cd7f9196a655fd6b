//! Side-channel lifecycle: bookkeeping, startup sweep, deferred removal.

use std::time::Duration;

use tracing::{debug, info, warn};

use intake_types::error::{ConfigError, SessionError};
use intake_types::ids::{ChannelId, ParticipantId};
use intake_types::schema::{ColumnType, Row, TableSchema, Value};

use crate::store::{TableOrigin, TableStore};
use crate::transport::SideChannelHost;

/// Bookkeeping table recording every channel the engine has opened.
pub const SIDE_CHANNEL_TABLE: &str = "side_channels";

fn side_channel_schema() -> Result<TableSchema, ConfigError> {
    TableSchema::new(
        SIDE_CHANNEL_TABLE,
        vec![
            ("channel_id".to_string(), ColumnType::Integer),
            ("participant_id".to_string(), ColumnType::Integer),
            ("kind".to_string(), ColumnType::String),
        ],
    )
}

/// Owns the private channels that conversations run in.
///
/// Channels are recorded in [`SIDE_CHANNEL_TABLE`] before their
/// conversation starts, and removal is deferred by a grace period so the
/// participant can read the closing message. Conversations do not survive
/// a restart, so [`SideChannelManager::open`] sweeps away every channel a
/// previous process left behind.
pub struct SideChannelManager<S, H>
where
    S: TableStore + Clone + 'static,
    H: SideChannelHost + Clone + 'static,
{
    store: S,
    host: H,
    grace: Duration,
}

impl<S, H> SideChannelManager<S, H>
where
    S: TableStore + Clone + 'static,
    H: SideChannelHost + Clone + 'static,
{
    /// Set up the bookkeeping table and sweep stale channels from a
    /// previous run.
    pub async fn open(store: S, host: H, grace: Duration) -> Result<Self, ConfigError> {
        store
            .reconcile(&side_channel_schema()?, TableOrigin::Internal)
            .await?;
        let manager = Self { store, host, grace };
        manager.sweep().await?;
        Ok(manager)
    }

    /// Delete every recorded channel and its record. Individual channels
    /// that no longer exist on the platform only warn; a broken
    /// bookkeeping table is fatal.
    async fn sweep(&self) -> Result<(), ConfigError> {
        let records = self
            .store
            .get_all(SIDE_CHANNEL_TABLE)
            .await
            .map_err(|e| ConfigError::TableSetup {
                table: SIDE_CHANNEL_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let mut swept = 0usize;
        for record in &records {
            let Some(Value::Integer(id)) = record.get("channel_id") else {
                warn!("Side channel record without a channel_id, skipping");
                continue;
            };
            let channel = ChannelId(*id);
            if let Err(err) = self.host.delete_channel(channel).await {
                warn!(channel = %channel, error = %err, "Failed to delete stale side channel");
            }
            match self
                .store
                .delete(SIDE_CHANNEL_TABLE, "channel_id", &Value::Integer(*id))
                .await
            {
                Ok(_) => swept += 1,
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(channel = %channel, error = %err, "Failed to delete side channel record");
                }
            }
        }
        if swept > 0 {
            info!(swept, "Removed stale side channels from a previous run");
        }
        Ok(())
    }

    /// Create a private channel for a conversation and record it.
    ///
    /// The record goes in before the conversation starts; if it cannot be
    /// written the channel is rolled back, because a channel without a
    /// record would outlive the startup sweep.
    pub async fn create(
        &self,
        parent: ChannelId,
        participant: ParticipantId,
        kind: &str,
    ) -> Result<ChannelId, SessionError> {
        let label = format!("{kind} for {participant}");
        let channel = self
            .host
            .create_channel(parent, participant, &label)
            .await
            .map_err(SessionError::Transport)?;

        let record = Row::new()
            .with("channel_id", channel.0)
            .with("participant_id", participant.0)
            .with("kind", kind);
        if let Err(err) = self.store.insert(SIDE_CHANNEL_TABLE, &record).await {
            if let Err(cleanup) = self.host.delete_channel(channel).await {
                warn!(channel = %channel, error = %cleanup, "Failed to roll back unrecorded side channel");
            }
            return Err(SessionError::Store(err));
        }
        debug!(channel = %channel, participant = %participant, kind, "Side channel created");
        Ok(channel)
    }

    /// Remove a channel after the grace period has passed.
    ///
    /// Runs in a background task; the conversation that owned the channel
    /// is already gone by the time this fires.
    pub fn schedule_removal(&self, channel: ChannelId) {
        let store = self.store.clone();
        let host = self.host.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(err) = host.delete_channel(channel).await {
                warn!(channel = %channel, error = %err, "Failed to delete side channel");
            }
            match store
                .delete(SIDE_CHANNEL_TABLE, "channel_id", &Value::Integer(channel.0))
                .await
            {
                Ok(_) => debug!(channel = %channel, "Side channel removed"),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(channel = %channel, error = %err, "Failed to delete side channel record");
                }
            }
        });
    }
}
