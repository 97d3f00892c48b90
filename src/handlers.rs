//! Gateway event handlers
//!
//! Membership and message events are mirrored into the guild's mod-log
//! channel; joins and leaves also greet in the system channel. All of it is
//! best-effort, like every other audit post.

use poise::serenity_prelude::{
    self as serenity, ChannelId, Context, CreateMessage, EventHandler, GuildId, Member,
    Mentionable, Message, MessageId, MessageUpdateEvent, Ready, User,
};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::EVENT_TARGET;
use crate::audit::mod_log_channel;
use crate::embeds;
use crate::expiry::SweepRequest;
use crate::store::RecordStore;

pub struct Handler {
    store: Arc<dyn RecordStore>,
    sweep_tx: Sender<SweepRequest>,
}

impl Handler {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, sweep_tx: Sender<SweepRequest>) -> Self {
        Self { store, sweep_tx }
    }

    /// Send an embed to the guild's configured mod-log channel, if any
    async fn log_event(&self, ctx: &Context, guild_id: GuildId, embed: serenity::CreateEmbed) {
        let Some(channel_id) = mod_log_channel(self.store.as_ref(), guild_id.get()).await else {
            return;
        };
        if let Err(err) = ChannelId::new(channel_id)
            .send_message(&ctx.http, CreateMessage::new().embed(embed))
            .await
        {
            warn!(
                target: EVENT_TARGET,
                "Failed to send event log to channel {channel_id} in guild {guild_id}: {err}"
            );
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, _ctx: Context, guilds: Vec<GuildId>) {
        info!(
            target: EVENT_TARGET,
            "Cache ready! The bot is in {} guild(s)",
            guilds.len()
        );
        // Mutes may have expired while the bot was down; reconcile promptly
        // instead of waiting for the first interval tick.
        if let Err(err) = self.sweep_tx.send(SweepRequest::Sweep).await {
            warn!(target: EVENT_TARGET, "Failed to request a catch-up mute sweep: {err}");
        }
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        let guild_id = new_member.guild_id;
        let (system_channel, member_count, guild_name) = {
            match ctx.cache.guild(guild_id) {
                Some(guild) => (guild.system_channel_id, guild.member_count, guild.name.clone()),
                None => (None, 0, guild_id.to_string()),
            }
        };

        if let Some(channel) = system_channel {
            let welcome = embeds::info(
                "👋 New Member!",
                &format!(
                    "Welcome {} to {guild_name}!\nWe hope you enjoy your stay.",
                    new_member.mention()
                ),
            )
            .footer(serenity::CreateEmbedFooter::new(format!(
                "ID: {} | Members: {member_count}",
                new_member.user.id
            )));
            if let Err(err) = channel
                .send_message(&ctx.http, CreateMessage::new().embed(welcome))
                .await
            {
                warn!(
                    target: EVENT_TARGET,
                    "Failed to send welcome message in guild {guild_id}: {err}"
                );
            }
        }

        let created = new_member.user.id.created_at().unix_timestamp();
        let embed = embeds::success(
            "➡️ Member Joined",
            &format!(
                "**User:** {} (`{}`)\n**Account created:** <t:{created}:F>",
                new_member.mention(),
                new_member.user.id
            ),
        );
        self.log_event(&ctx, guild_id, embed).await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data: Option<Member>,
    ) {
        let embed = embeds::warning(
            "⬅️ Member Left",
            &format!("**User:** {} (`{}`)", user.mention(), user.id),
        );
        self.log_event(&ctx, guild_id, embed).await;
    }

    async fn message_update(
        &self,
        ctx: Context,
        old_if_available: Option<Message>,
        new: Option<Message>,
        _event: MessageUpdateEvent,
    ) {
        let (Some(old), Some(new)) = (old_if_available, new) else {
            return;
        };
        let Some(guild_id) = new.guild_id else {
            return;
        };
        if old.author.bot || old.content == new.content {
            return;
        }

        let embed = embeds::warning(
            "✏️ Message Edited",
            &format!(
                "**Author:** {} (`{}`)\n**Channel:** {}\n[Jump to message]({})",
                old.author.mention(),
                old.author.id,
                new.channel_id.mention(),
                new.link()
            ),
        )
        .field("Before", truncate(&old.content), false)
        .field("After", truncate(&new.content), false)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Message ID: {}",
            new.id
        )));
        self.log_event(&ctx, guild_id, embed).await;
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };
        // Without the cached message there is nothing useful to report.
        let Some((author_id, author_bot, content)) = ({
            ctx.cache
                .message(channel_id, deleted_message_id)
                .map(|message| (message.author.id, message.author.bot, message.content.clone()))
        }) else {
            return;
        };
        if author_bot {
            return;
        }

        let mut embed = embeds::error(
            "🗑️ Message Deleted",
            &format!(
                "**Author:** <@{author_id}> (`{author_id}`)\n**Channel:** {}",
                channel_id.mention()
            ),
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Message ID: {deleted_message_id}"
        )));
        if !content.is_empty() {
            embed = embed.field("Content", truncate(&content), false);
        }
        self.log_event(&ctx, guild_id, embed).await;
    }
}

/// Embed field values cap out at 1024 characters
fn truncate(content: &str) -> String {
    content.chars().take(1000).collect()
}
