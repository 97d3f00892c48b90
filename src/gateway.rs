//! Platform collaborator for moderation actions
//!
//! Everything the core needs from Discord goes through `ModerationGateway`,
//! so the escalation and expiry logic can be exercised against a mock. The
//! error taxonomy separates permission failures (reported, never retried)
//! from not-found conditions (benign no-ops) and everything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serenity::{
    ChannelId, CreateEmbed, CreateMessage, EditMember, GuildId, Http, HttpError, UserId,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from platform mutations and lookups
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The bot lacks the permission for this action
    #[error("missing permission: {0}")]
    Forbidden(String),

    /// The target does not exist (already unbanned, left the guild, ...)
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other Discord API failure
    #[error("Discord API error: {0}")]
    Api(#[from] Box<serenity::Error>),
}

impl GatewayError {
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The slice of member state the core cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberView {
    /// When the member's current timeout ends, if one is applied
    pub timed_out_until: Option<DateTime<Utc>>,
}

/// Outbound platform operations used by commands, the auto punisher, and the
/// expiry sweep
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationGateway: Send + Sync {
    /// Whether the bot can still resolve this guild at all
    async fn resolve_guild(&self, guild_id: u64) -> Result<bool, GatewayError>;

    /// Look up a member; `Ok(None)` when they are no longer in the guild
    async fn resolve_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<MemberView>, GatewayError>;

    /// Apply a communication timeout until the given instant
    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), GatewayError>;

    /// Remove a member's communication timeout
    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> Result<(), GatewayError>;

    /// Ban a member
    async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), GatewayError>;

    /// Lift a ban
    async fn unban_member(&self, guild_id: u64, user_id: u64) -> Result<(), GatewayError>;

    /// Kick a member
    async fn kick_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), GatewayError>;

    /// Whether the bot's top role strictly outranks the target's
    async fn bot_outranks(&self, guild_id: u64, user_id: u64) -> Result<bool, GatewayError>;

    /// Post an embed to a channel
    async fn send_embed(&self, channel_id: u64, embed: CreateEmbed) -> Result<(), GatewayError>;
}

/// Map a serenity error onto the gateway taxonomy
fn classify(err: serenity::Error, what: &str) -> GatewayError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(ref response)) = err {
        match response.status_code.as_u16() {
            403 => return GatewayError::Forbidden(what.to_string()),
            404 => return GatewayError::NotFound(what.to_string()),
            _ => {}
        }
    }
    GatewayError::Api(Box::new(err))
}

/// Live gateway over the bot's HTTP client
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
}

impl SerenityGateway {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ModerationGateway for SerenityGateway {
    async fn resolve_guild(&self, guild_id: u64) -> Result<bool, GatewayError> {
        match GuildId::new(guild_id).to_partial_guild(&self.http).await {
            Ok(_) => Ok(true),
            Err(err) => {
                let classified = classify(err, "guild");
                // A guild the bot was removed from reads as gone, not as an
                // error worth aborting over.
                if classified.is_forbidden() || classified.is_not_found() {
                    Ok(false)
                } else {
                    Err(classified)
                }
            }
        }
    }

    async fn resolve_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<MemberView>, GatewayError> {
        match GuildId::new(guild_id)
            .member(&self.http, UserId::new(user_id))
            .await
        {
            Ok(member) => Ok(Some(MemberView {
                timed_out_until: member
                    .communication_disabled_until
                    .and_then(|ts| DateTime::from_timestamp(ts.unix_timestamp(), 0)),
            })),
            Err(err) => {
                let classified = classify(err, "member");
                if classified.is_not_found() {
                    Ok(None)
                } else {
                    Err(classified)
                }
            }
        }
    }

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new().disable_communication_until(until.to_rfc3339()),
            )
            .await
            .map_err(|err| classify(err, "timeout"))?;
        info!("Timed out user {user_id} in guild {guild_id} until {until}");
        Ok(())
    }

    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> Result<(), GatewayError> {
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new().enable_communication(),
            )
            .await
            .map_err(|err| classify(err, "timeout removal"))?;
        info!("Cleared timeout for user {user_id} in guild {guild_id}");
        Ok(())
    }

    async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), GatewayError> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await
            .map_err(|err| classify(err, "ban"))?;
        info!("Banned user {user_id} in guild {guild_id}");
        Ok(())
    }

    async fn unban_member(&self, guild_id: u64, user_id: u64) -> Result<(), GatewayError> {
        GuildId::new(guild_id)
            .unban(&self.http, UserId::new(user_id))
            .await
            .map_err(|err| classify(err, "unban"))?;
        info!("Unbanned user {user_id} in guild {guild_id}");
        Ok(())
    }

    async fn kick_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), GatewayError> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(user_id), reason)
            .await
            .map_err(|err| classify(err, "kick"))?;
        info!("Kicked user {user_id} from guild {guild_id}");
        Ok(())
    }

    async fn bot_outranks(&self, guild_id: u64, user_id: u64) -> Result<bool, GatewayError> {
        let guild_id = GuildId::new(guild_id);
        let guild = guild_id
            .to_partial_guild(&self.http)
            .await
            .map_err(|err| classify(err, "guild"))?;

        if guild.owner_id == UserId::new(user_id) {
            return Ok(false);
        }

        let bot_user = self
            .http
            .get_current_user()
            .await
            .map_err(|err| classify(err, "current user"))?;
        let bot_member = guild_id
            .member(&self.http, bot_user.id)
            .await
            .map_err(|err| classify(err, "bot member"))?;
        let target = guild_id
            .member(&self.http, UserId::new(user_id))
            .await
            .map_err(|err| classify(err, "member"))?;

        let top_position = |member: &serenity::Member| {
            member
                .roles
                .iter()
                .filter_map(|role_id| guild.roles.get(role_id))
                .map(|role| role.position)
                .max()
                .unwrap_or(0)
        };

        Ok(top_position(&bot_member) > top_position(&target))
    }

    async fn send_embed(&self, channel_id: u64, embed: CreateEmbed) -> Result<(), GatewayError> {
        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .map_err(|err| classify(err, "message send"))?;
        Ok(())
    }
}
