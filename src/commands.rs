//! Slash commands
//!
//! Thin glue between poise and the moderation components: resolve arguments,
//! run the hierarchy guard, call the gateway/store through `Data`, and answer
//! with an embed that distinguishes success, benign no-op, and hard failure.

use crate::gateway::GatewayError;
use crate::records::{self, BanRecord, GuildSettings, MuteRecord};
use crate::store::{self, select_one};
use crate::{Context, Error, embeds, expiry};
use chrono::{Duration, Utc};
use poise::CreateReply;
use poise::serenity_prelude as serenity;
use serenity::{ChannelType, CreateEmbed, GetMessages, Mentionable};
use tracing::error;

const DEFAULT_REASON: &str = "No reason provided.";
/// Discord caps communication timeouts at 28 days
const MAX_TIMEOUT_MINUTES: u32 = 28 * 24 * 60;

/// Reply with an embed, optionally only visible to the invoker
async fn reply(ctx: Context<'_>, embed: CreateEmbed, ephemeral: bool) -> Result<(), Error> {
    ctx.send(CreateReply::default().embed(embed).ephemeral(ephemeral))
        .await?;
    Ok(())
}

/// Embed for a platform call that failed
fn gateway_failure(action: &str, err: &GatewayError) -> CreateEmbed {
    if err.is_forbidden() {
        embeds::error(
            "Permission Error",
            &format!("I do not have permission to {action} this user."),
        )
    } else {
        embeds::error(
            "Error",
            &format!("Something went wrong trying to {action} this user: `{err}`"),
        )
    }
}

/// Role-hierarchy guard for moderator-initiated actions. Returns the refusal
/// text when the action must not proceed.
async fn hierarchy_rejection(
    ctx: &Context<'_>,
    target: &serenity::Member,
    verb: &str,
) -> Result<Option<String>, Error> {
    if target.user.id == ctx.author().id {
        return Ok(Some(format!("You cannot {verb} yourself.")));
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let cache = ctx.serenity_context().cache.clone();
    let bot_id = { cache.current_user().id };
    let owner_id = ctx
        .guild()
        .map(|guild| guild.owner_id)
        .ok_or("guild not in cache")?;

    if target.user.id == owner_id {
        return Ok(Some(format!("You cannot {verb} the server owner.")));
    }

    let position = |member: &serenity::Member| {
        member
            .highest_role_info(&cache)
            .map(|(_, position)| position)
            .unwrap_or(0)
    };
    let target_position = position(target);

    let author = ctx
        .author_member()
        .await
        .ok_or("could not resolve your guild membership")?;
    if ctx.author().id != owner_id && target_position >= position(author.as_ref()) {
        return Ok(Some(format!(
            "You cannot {verb} a member with a role equal to or above yours."
        )));
    }

    let bot_member = guild_id.member(ctx.http(), bot_id).await?;
    if target_position >= position(&bot_member) {
        return Ok(Some(format!(
            "I cannot {verb} this member, their top role is equal to or above mine."
        )));
    }

    Ok(None)
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Ban a member from the server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: serenity::Member,
    #[description = "Reason for the ban"] reason: Option<String>,
) -> Result<(), Error> {
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    if let Some(refusal) = hierarchy_rejection(&ctx, &user, "ban").await? {
        return reply(ctx, embeds::error("Error", &refusal), true).await;
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    if let Err(err) = data
        .gateway
        .ban_member(guild_id.get(), user.user.id.get(), &reason)
        .await
    {
        return reply(ctx, gateway_failure("ban", &err), true).await;
    }

    let record = BanRecord {
        user_id: user.user.id.get(),
        guild_id: guild_id.get(),
        reason: reason.clone(),
        moderator_id: ctx.author().id.get(),
        created_at: None,
    };
    match records::to_document(&record) {
        Ok(document) => {
            if let Err(err) = data.store.insert(store::BANS, document).await {
                error!("Member banned but the ban record write failed: {err}");
            }
        }
        Err(err) => error!("Failed to encode ban record: {err}"),
    }

    let embed = embeds::success(
        "Member Banned",
        &format!(
            "**User:** {} (`{}`)\n**Reason:** {reason}\n**Moderator:** {}",
            user.mention(),
            user.user.id,
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await
}

/// Lift a ban by user id
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "Id of the user to unban"] user_id: String,
    #[description = "Reason for the unban"] reason: Option<String>,
) -> Result<(), Error> {
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    let Ok(user_id) = user_id.trim().parse::<u64>() else {
        return reply(
            ctx,
            embeds::error("Invalid Id", "Please provide a valid user id."),
            true,
        )
        .await;
    };

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    match data.gateway.unban_member(guild_id.get(), user_id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            return reply(
                ctx,
                embeds::info("Info", "This user is not banned from the server."),
                true,
            )
            .await;
        }
        Err(err) => return reply(ctx, gateway_failure("unban", &err), true).await,
    }

    let filters = store::user_guild_filters(user_id, guild_id.get());
    if let Err(err) = data.store.delete(store::BANS, &filters).await {
        error!("Member unbanned but the ban record delete failed: {err}");
    }

    let embed = embeds::success(
        "Member Unbanned",
        &format!(
            "**User:** <@{user_id}> (`{user_id}`)\n**Reason:** {reason}\n**Moderator:** {}",
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await
}

/// Kick a member from the server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS",
    required_bot_permissions = "KICK_MEMBERS"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: serenity::Member,
    #[description = "Reason for the kick"] reason: Option<String>,
) -> Result<(), Error> {
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    if let Some(refusal) = hierarchy_rejection(&ctx, &user, "kick").await? {
        return reply(ctx, embeds::error("Error", &refusal), true).await;
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    if let Err(err) = data
        .gateway
        .kick_member(guild_id.get(), user.user.id.get(), &reason)
        .await
    {
        return reply(ctx, gateway_failure("kick", &err), true).await;
    }

    let embed = embeds::warning(
        "Member Kicked",
        &format!(
            "**User:** {} (`{}`)\n**Reason:** {reason}\n**Moderator:** {}",
            user.mention(),
            user.user.id,
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await
}

/// Time a member out for a number of minutes
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] user: serenity::Member,
    #[description = "Mute length in minutes"] duration_minutes: u32,
    #[description = "Reason for the mute"] reason: Option<String>,
) -> Result<(), Error> {
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    if duration_minutes == 0 {
        return reply(
            ctx,
            embeds::error(
                "Invalid Duration",
                "The mute duration must be a positive number of minutes.",
            ),
            true,
        )
        .await;
    }
    if duration_minutes > MAX_TIMEOUT_MINUTES {
        return reply(
            ctx,
            embeds::error(
                "Invalid Duration",
                &format!("The mute duration cannot exceed {MAX_TIMEOUT_MINUTES} minutes (28 days)."),
            ),
            true,
        )
        .await;
    }
    if let Some(refusal) = hierarchy_rejection(&ctx, &user, "mute").await? {
        return reply(ctx, embeds::error("Error", &refusal), true).await;
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    let ends_at = Utc::now() + Duration::minutes(i64::from(duration_minutes));
    if let Err(err) = data
        .gateway
        .timeout_member(guild_id.get(), user.user.id.get(), ends_at)
        .await
    {
        return reply(ctx, gateway_failure("mute", &err), true).await;
    }

    let record = MuteRecord {
        user_id: user.user.id.get(),
        guild_id: guild_id.get(),
        moderator_id: ctx.author().id.get(),
        reason: reason.clone(),
        ends_at,
        created_at: None,
    };
    if let Err(err) = expiry::upsert_mute(data.store.as_ref(), &record).await {
        error!("Member muted but the mute record write failed: {err}");
    }

    let embed = embeds::warning(
        "Member Muted",
        &format!(
            "**User:** {} (`{}`)\n**Duration:** {duration_minutes} minutes\n**Reason:** {reason}\n**Moderator:** {}",
            user.mention(),
            user.user.id,
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await
}

/// Remove a member's timeout
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: serenity::Member,
    #[description = "Reason for the unmute"] reason: Option<String>,
) -> Result<(), Error> {
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    if user.communication_disabled_until.is_none() {
        return reply(
            ctx,
            embeds::info("Info", "This member is not timed out."),
            true,
        )
        .await;
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    if let Err(err) = data
        .gateway
        .clear_timeout(guild_id.get(), user.user.id.get())
        .await
    {
        return reply(ctx, gateway_failure("unmute", &err), true).await;
    }

    if let Err(err) =
        expiry::remove_mute(data.store.as_ref(), user.user.id.get(), guild_id.get()).await
    {
        error!("Member unmuted but the mute record delete failed: {err}");
    }

    let embed = embeds::success(
        "Member Unmuted",
        &format!(
            "**User:** {} (`{}`)\n**Reason:** {reason}\n**Moderator:** {}",
            user.mention(),
            user.user.id,
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await
}

/// Add a warning to a member, escalating automatically at the configured
/// thresholds
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::Member,
    #[description = "Reason for the warning"] reason: String,
) -> Result<(), Error> {
    if user.user.id == ctx.author().id {
        return reply(ctx, embeds::error("Error", "You cannot warn yourself!"), true).await;
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    let record = match data
        .ledger
        .add(
            guild_id.get(),
            user.user.id.get(),
            ctx.author().id.get(),
            reason.clone(),
        )
        .await
    {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to record warning: {err}");
            return reply(
                ctx,
                embeds::error("Error", "The warning could not be saved. Try again."),
                true,
            )
            .await;
        }
    };

    let embed = embeds::warning(
        &format!("Warning #{}", record.count),
        &format!(
            "**User:** {} (`{}`)\n**Reason:** {reason}\n**Moderator:** {}",
            user.mention(),
            user.user.id,
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await?;

    // Automatic punishment, reported as a follow-up when a tier fires.
    let outcome = data.punisher.punish_for(&record).await;
    if let Some(embed) = outcome.response_embed(user.user.id.get()) {
        reply(ctx, embed, false).await?;
    }
    Ok(())
}

/// Show a member's warnings
#[poise::command(slash_command, guild_only)]
pub async fn warns(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: serenity::Member,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let warnings = ctx
        .data()
        .ledger
        .list(guild_id.get(), user.user.id.get())
        .await?;

    if warnings.is_empty() {
        return reply(
            ctx,
            embeds::info(
                "No Warnings",
                &format!("{} has no warnings in this server.", user.mention()),
            ),
            true,
        )
        .await;
    }

    let mut embed = embeds::warning(
        &format!("Warnings for {}", user.user.name),
        &format!("Total warnings: `{}`", warnings.len()),
    );
    // Discord caps embeds at 25 fields.
    for warning in warnings.iter().take(25) {
        let issued = warning
            .created_at
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map_or_else(|| "unknown".to_string(), |ts| format!("<t:{}:F>", ts.timestamp()));
        let punishment = warning
            .punishment_level
            .map_or_else(|| "None".to_string(), |p| p.to_string());
        embed = embed.field(
            format!("Warning #{}", warning.count),
            format!(
                "**Reason:** {}\n**Moderator:** <@{}>\n**Date:** {issued}\n**Auto punishment:** {punishment}",
                warning.reason, warning.moderator_id
            ),
            false,
        );
    }

    reply(ctx, embed, false).await
}

/// Remove all of a member's warnings
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn clear_warns(
    ctx: Context<'_>,
    #[description = "Member whose warnings to clear"] user: serenity::Member,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();
    let removed = data
        .ledger
        .clear(guild_id.get(), user.user.id.get())
        .await?;

    if removed == 0 {
        return reply(
            ctx,
            embeds::info(
                "Info",
                &format!("{} has no warnings to clear.", user.mention()),
            ),
            true,
        )
        .await;
    }

    let embed = embeds::success(
        "Warnings Cleared",
        &format!(
            "All `{removed}` warnings for {} were removed by {}.",
            user.mention(),
            ctx.author().mention()
        ),
    );
    data.audit.send(guild_id.get(), embed.clone()).await;
    reply(ctx, embed, false).await
}

/// Bulk-delete recent messages in this channel, keeping pinned ones
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES"
)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "Number of messages to delete (1-100)"] amount: u32,
) -> Result<(), Error> {
    if amount == 0 {
        return reply(
            ctx,
            embeds::error(
                "Invalid Amount",
                "The number of messages to delete must be positive.",
            ),
            true,
        )
        .await;
    }
    if amount > 100 {
        return reply(
            ctx,
            embeds::error("Limit Exceeded", "You can delete at most 100 messages at a time."),
            true,
        )
        .await;
    }

    ctx.defer_ephemeral().await?;

    let messages = ctx
        .channel_id()
        .messages(ctx.http(), GetMessages::new().limit(amount as u8))
        .await?;
    let ids: Vec<serenity::MessageId> = messages
        .iter()
        .filter(|message| !message.pinned)
        .map(|message| message.id)
        .collect();

    match ids.len() {
        0 => {
            return reply(
                ctx,
                embeds::info("Info", "There are no deletable messages here."),
                true,
            )
            .await;
        }
        1 => ctx.channel_id().delete_message(ctx.http(), ids[0]).await?,
        _ => ctx.channel_id().delete_messages(ctx.http(), &ids).await?,
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let audit_embed = embeds::info(
        "Messages Cleared",
        &format!(
            "🗑️ `{}` messages were deleted by {} in {}.",
            ids.len(),
            ctx.author().mention(),
            ctx.channel_id().mention()
        ),
    );
    ctx.data().audit.send(guild_id.get(), audit_embed).await;

    reply(
        ctx,
        embeds::success(
            "Cleanup Complete",
            &format!("🗑️ `{}` messages deleted in this channel.", ids.len()),
        ),
        true,
    )
    .await
}

/// Set the channel for moderation and event logs
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setup_logs(
    ctx: Context<'_>,
    #[description = "Text channel to receive the logs"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    if channel.kind != ChannelType::Text {
        return reply(
            ctx,
            embeds::error("Error", "The log channel must be a text channel."),
            true,
        )
        .await;
    }

    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();

    // Probe the channel before saving anything, so a misconfigured channel is
    // caught while the admin is watching.
    let probe = embeds::info(
        "Logs Configured!",
        &format!(
            "This channel ({}) now receives moderation logs, set up by {}.",
            channel.mention(),
            ctx.author().mention()
        ),
    );
    if let Err(err) = data.gateway.send_embed(channel.id.get(), probe).await {
        return reply(
            ctx,
            embeds::error(
                "Permission Error",
                &format!(
                    "I cannot send messages in {} (`{err}`). Pick another channel or fix my permissions.",
                    channel.mention()
                ),
            ),
            true,
        )
        .await;
    }

    let filters = store::guild_filters(guild_id.get());
    let updated = if select_one(data.store.as_ref(), store::GUILD_SETTINGS, &filters)
        .await?
        .is_some()
    {
        data.store
            .update(
                store::GUILD_SETTINGS,
                &filters,
                serde_json::json!({ "mod_logs_channel_id": channel.id.get().to_string() }),
            )
            .await?;
        true
    } else {
        let settings = GuildSettings {
            guild_id: guild_id.get(),
            mod_logs_channel_id: Some(channel.id.get()),
            created_at: None,
        };
        data.store
            .insert(store::GUILD_SETTINGS, records::to_document(&settings)?)
            .await?;
        false
    };

    let title = if updated {
        "Configuration Updated"
    } else {
        "Configuration Saved"
    };
    reply(
        ctx,
        embeds::success(
            title,
            &format!("The moderation log channel is now {}.", channel.mention()),
        ),
        true,
    )
    .await
}

/// Show the bot's settings for this server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn show_settings(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("this command is guild-only")?;
    let data = ctx.data();

    let filters = store::guild_filters(guild_id.get());
    let settings = select_one(data.store.as_ref(), store::GUILD_SETTINGS, &filters)
        .await?
        .map(records::from_document::<GuildSettings>)
        .transpose()?;

    let mut embed = embeds::info(
        "Server Settings",
        "Current bot configuration for this server.",
    );
    embed = match settings.and_then(|s| s.mod_logs_channel_id) {
        Some(channel_id) => embed.field("Moderation Log Channel", format!("<#{channel_id}>"), false),
        None => embed.field("Moderation Log Channel", "Not configured", false),
    };

    let tiers = data
        .policy
        .tiers()
        .iter()
        .map(|tier| format!("`{}` warnings → {}", tier.warnings, tier.action))
        .collect::<Vec<_>>()
        .join("\n");
    embed = embed.field("Automatic Punishments", tiers, false);

    reply(ctx, embed, true).await
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        ping(),
        ban(),
        unban(),
        kick(),
        mute(),
        unmute(),
        warn(),
        warns(),
        clear_warns(),
        clear(),
        setup_logs(),
        show_settings(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::serenity::Permissions;

    #[test]
    fn test_all_commands_are_guild_only() {
        let commands = all();
        assert_eq!(commands.len(), 12);
        for command in &commands {
            assert!(command.guild_only, "{} must be guild-only", command.name);
        }
    }

    #[test]
    fn test_moderation_commands_require_permissions() {
        let ban = ban();
        assert!(ban.required_permissions.contains(Permissions::BAN_MEMBERS));
        assert!(
            ban.required_bot_permissions
                .contains(Permissions::BAN_MEMBERS)
        );

        let warn = warn();
        assert!(
            warn.required_permissions
                .contains(Permissions::MODERATE_MEMBERS)
        );

        let clear = clear();
        assert!(
            clear
                .required_permissions
                .contains(Permissions::MANAGE_MESSAGES)
        );

        let setup = setup_logs();
        assert!(setup.required_permissions.contains(Permissions::ADMINISTRATOR));
    }

    #[test]
    fn test_commands_create_as_slash_commands() {
        for command in all() {
            assert!(
                command.create_as_slash_command().is_some(),
                "{} must register as a slash command",
                command.name
            );
        }
    }
}
