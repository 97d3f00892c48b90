//! Mod-log channel notifications
//!
//! Audit posts are best-effort: a guild without a configured log channel, or
//! a send failure, never fails the operation that produced the entry.

use std::sync::Arc;

use poise::serenity_prelude::CreateEmbed;
use tracing::warn;

use crate::gateway::ModerationGateway;
use crate::records::{self, GuildSettings};
use crate::store::{self, RecordStore};

/// Look up the guild's configured mod-log channel, if any
pub async fn mod_log_channel(store: &dyn RecordStore, guild_id: u64) -> Option<u64> {
    let filters = store::guild_filters(guild_id);
    match store::select_one(store, store::GUILD_SETTINGS, &filters).await {
        Ok(Some(document)) => match records::from_document::<GuildSettings>(document) {
            Ok(settings) => settings.mod_logs_channel_id,
            Err(err) => {
                warn!("Malformed guild_settings record for guild {guild_id}: {err}");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!("Failed to load guild settings for guild {guild_id}: {err}");
            None
        }
    }
}

/// Best-effort sender of audit embeds to a guild's mod-log channel
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn ModerationGateway>,
}

impl AuditLog {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn ModerationGateway>) -> Self {
        Self { store, gateway }
    }

    /// Post an embed to the guild's mod-log channel. Silently does nothing
    /// when no channel is configured; logs and swallows send failures.
    pub async fn send(&self, guild_id: u64, embed: CreateEmbed) {
        let Some(channel_id) = mod_log_channel(self.store.as_ref(), guild_id).await else {
            return;
        };
        if let Err(err) = self.gateway.send_embed(channel_id, embed).await {
            warn!("Failed to post audit embed to channel {channel_id} in guild {guild_id}: {err}");
        }
    }
}
