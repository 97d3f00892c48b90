//! Automatic punishment orchestration
//!
//! Invoked once per warning insertion with the freshly assigned count. The
//! policy decides whether a tier fires; this module applies the platform
//! effect, records it, marks the triggering warning, and reports the outcome
//! to the mod log whether it succeeded or not.
//!
//! The steps are not atomic. A platform failure skips the store writes but is
//! still reported; a store failure after a successful platform mutation
//! leaves the two divergent, which is logged at error severity and left for
//! an operator rather than auto-repaired.

use std::sync::Arc;

use chrono::{Duration, Utc};
use poise::serenity_prelude::CreateEmbed;
use tracing::{error, info};

use crate::audit::AuditLog;
use crate::embeds;
use crate::expiry::upsert_mute;
use crate::gateway::ModerationGateway;
use crate::policy::{PunishmentAction, PunishmentPolicy, PunishmentTier};
use crate::records::{self, AppliedPunishment, BanRecord, MuteRecord, WarningRecord};
use crate::store::{self, RecordStore};
use crate::COMMAND_TARGET;

/// What came of evaluating one warning against the policy
#[derive(Debug, Clone)]
pub enum PunishmentOutcome {
    /// The warning count matched no tier
    NotTriggered,
    /// The tier's action was applied on the platform
    Applied { tier: PunishmentTier },
    /// A tier fired but the action could not be applied
    Failed { tier: PunishmentTier, cause: String },
}

impl PunishmentOutcome {
    /// Follow-up embed for the invoking moderator, when a tier fired
    #[must_use]
    pub fn response_embed(&self, user_id: u64) -> Option<CreateEmbed> {
        match self {
            Self::NotTriggered => None,
            Self::Applied { tier } => Some(applied_embed(*tier, user_id, None)),
            Self::Failed { tier, cause } => Some(failed_embed(*tier, user_id, cause)),
        }
    }
}

fn applied_embed(tier: PunishmentTier, user_id: u64, reason: Option<&str>) -> CreateEmbed {
    let reason_line = reason.map_or(String::new(), |r| format!("\n**Reason:** {r}"));
    match tier.action {
        PunishmentAction::Mute { duration_secs } => embeds::warning(
            "Automatic Punishment Applied: Mute",
            &format!(
                "**User:** <@{user_id}> (`{user_id}`){reason_line}\n**Duration:** {} minutes",
                duration_secs / 60
            ),
        ),
        PunishmentAction::Ban => embeds::error(
            "Automatic Punishment Applied: Ban",
            &format!("**User:** <@{user_id}> (`{user_id}`){reason_line}"),
        ),
    }
}

fn failed_embed(tier: PunishmentTier, user_id: u64, cause: &str) -> CreateEmbed {
    embeds::error(
        "Automatic Punishment Failed",
        &format!("Could not {} <@{user_id}>: {cause}", verb(tier.action)),
    )
}

fn verb(action: PunishmentAction) -> &'static str {
    match action {
        PunishmentAction::Mute { .. } => "mute",
        PunishmentAction::Ban => "ban",
    }
}

/// Applies the punishment ladder as warnings accumulate
#[derive(Clone)]
pub struct AutoPunisher {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn ModerationGateway>,
    audit: AuditLog,
    policy: PunishmentPolicy,
    bot_user_id: u64,
}

impl AutoPunisher {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn ModerationGateway>,
        audit: AuditLog,
        policy: PunishmentPolicy,
        bot_user_id: u64,
    ) -> Self {
        Self {
            store,
            gateway,
            audit,
            policy,
            bot_user_id,
        }
    }

    /// Evaluate a freshly inserted warning and apply the matching tier, if
    /// any. Never returns an error: anything that goes wrong past the policy
    /// lookup becomes a reported `Failed` outcome.
    pub async fn punish_for(&self, warning: &WarningRecord) -> PunishmentOutcome {
        let Some(tier) = self.policy.tier_for(warning.count) else {
            return PunishmentOutcome::NotTriggered;
        };
        let tier = *tier;
        let reason = format!("Automatic punishment: {} warnings.", tier.warnings);

        // This action is bot-initiated, so the usual moderator-side hierarchy
        // checks never ran; verify the bot itself outranks the target.
        match self
            .gateway
            .bot_outranks(warning.guild_id, warning.user_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .fail(
                        warning,
                        tier,
                        "the member's top role is equal to or above mine".to_string(),
                    )
                    .await;
            }
            Err(err) => {
                return self
                    .fail(warning, tier, format!("hierarchy check failed: {err}"))
                    .await;
            }
        }

        let result = match tier.action {
            PunishmentAction::Mute { duration_secs } => {
                self.apply_mute(warning, duration_secs, &reason).await
            }
            PunishmentAction::Ban => self.apply_ban(warning, &reason).await,
        };

        match result {
            Ok(applied) => {
                self.mark_warning(warning, applied).await;
                info!(
                    target: COMMAND_TARGET,
                    user_id = %warning.user_id,
                    guild_id = %warning.guild_id,
                    count = warning.count,
                    action = %tier.action,
                    event = "auto_punishment_applied",
                    "Automatic punishment applied"
                );
                self.audit
                    .send(
                        warning.guild_id,
                        applied_embed(tier, warning.user_id, Some(&reason)),
                    )
                    .await;
                PunishmentOutcome::Applied { tier }
            }
            Err(cause) => self.fail(warning, tier, cause).await,
        }
    }

    async fn apply_mute(
        &self,
        warning: &WarningRecord,
        duration_secs: u32,
        reason: &str,
    ) -> Result<AppliedPunishment, String> {
        let ends_at = Utc::now() + Duration::seconds(i64::from(duration_secs));
        self.gateway
            .timeout_member(warning.guild_id, warning.user_id, ends_at)
            .await
            .map_err(|err| err.to_string())?;

        let record = MuteRecord {
            user_id: warning.user_id,
            guild_id: warning.guild_id,
            moderator_id: self.bot_user_id,
            reason: reason.to_string(),
            ends_at,
            created_at: None,
        };
        if let Err(err) = upsert_mute(self.store.as_ref(), &record).await {
            error!(
                user_id = %warning.user_id,
                guild_id = %warning.guild_id,
                error = %err,
                "Member was muted on the platform but the mute record write failed"
            );
        }
        Ok(AppliedPunishment::Mute)
    }

    async fn apply_ban(
        &self,
        warning: &WarningRecord,
        reason: &str,
    ) -> Result<AppliedPunishment, String> {
        self.gateway
            .ban_member(warning.guild_id, warning.user_id, reason)
            .await
            .map_err(|err| err.to_string())?;

        let record = BanRecord {
            user_id: warning.user_id,
            guild_id: warning.guild_id,
            reason: reason.to_string(),
            moderator_id: self.bot_user_id,
            created_at: None,
        };
        match records::to_document(&record) {
            Ok(document) => {
                if let Err(err) = self.store.insert(store::BANS, document).await {
                    error!(
                        user_id = %warning.user_id,
                        guild_id = %warning.guild_id,
                        error = %err,
                        "Member was banned on the platform but the ban record write failed"
                    );
                }
            }
            Err(err) => error!("Failed to encode ban record: {err}"),
        }
        Ok(AppliedPunishment::Ban)
    }

    /// Write-once mark on the warning that tripped the tier
    async fn mark_warning(&self, warning: &WarningRecord, applied: AppliedPunishment) {
        let mut filters = store::user_guild_filters(warning.user_id, warning.guild_id);
        filters.insert("count".to_string(), serde_json::json!(warning.count));
        let patch = serde_json::json!({ "punishment_level": applied.to_string() });
        if let Err(err) = self.store.update(store::WARNS, &filters, patch).await {
            error!(
                user_id = %warning.user_id,
                guild_id = %warning.guild_id,
                count = warning.count,
                error = %err,
                "Punishment applied but the warning could not be marked"
            );
        }
    }

    async fn fail(
        &self,
        warning: &WarningRecord,
        tier: PunishmentTier,
        cause: String,
    ) -> PunishmentOutcome {
        error!(
            target: COMMAND_TARGET,
            user_id = %warning.user_id,
            guild_id = %warning.guild_id,
            count = warning.count,
            action = %tier.action,
            cause = %cause,
            event = "auto_punishment_failed",
            "Automatic punishment failed"
        );
        self.audit
            .send(warning.guild_id, failed_embed(tier, warning.user_id, &cause))
            .await;
        PunishmentOutcome::Failed { tier, cause }
    }
}
