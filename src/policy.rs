//! Automatic punishment tiers
//!
//! A policy is an ordered set of warning-count thresholds, each mapping to a
//! punishment. It is loaded once at startup, validated, and read-only from
//! then on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What an automatic punishment does once a tier fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PunishmentAction {
    /// Timed mute (Discord timeout) for the given number of seconds
    #[display("mute for {duration_secs}s")]
    Mute { duration_secs: u32 },
    /// Permanent ban
    #[display("ban")]
    Ban,
}

/// One threshold in the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentTier {
    /// Warning count at which this tier fires, exactly
    pub warnings: u32,
    #[serde(flatten)]
    pub action: PunishmentAction,
}

/// Problems detected while validating a policy
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("punishment tier threshold must be positive")]
    ZeroThreshold,
    #[error("duplicate punishment tier threshold: {0}")]
    DuplicateThreshold(u32),
    #[error("mute tier at {0} warnings must have a positive duration")]
    ZeroDuration(u32),
}

/// Validated, ordered punishment tiers
#[derive(Debug, Clone)]
pub struct PunishmentPolicy {
    tiers: Vec<PunishmentTier>,
}

impl PunishmentPolicy {
    /// Validate and sort the configured tiers.
    ///
    /// # Errors
    /// Returns a `PolicyError` when a threshold is zero or duplicated, or a
    /// mute tier carries no duration.
    pub fn new(mut tiers: Vec<PunishmentTier>) -> Result<Self, PolicyError> {
        tiers.sort_by_key(|tier| tier.warnings);
        for (index, tier) in tiers.iter().enumerate() {
            if tier.warnings == 0 {
                return Err(PolicyError::ZeroThreshold);
            }
            if index > 0 && tiers[index - 1].warnings == tier.warnings {
                return Err(PolicyError::DuplicateThreshold(tier.warnings));
            }
            if let PunishmentAction::Mute { duration_secs: 0 } = tier.action {
                return Err(PolicyError::ZeroDuration(tier.warnings));
            }
        }
        Ok(Self { tiers })
    }

    /// The tier whose threshold equals `count` exactly, if any.
    ///
    /// Thresholds are distinct, so at most one tier can fire per warning
    /// insertion.
    #[must_use]
    pub fn tier_for(&self, count: u32) -> Option<&PunishmentTier> {
        self.tiers.iter().find(|tier| tier.warnings == count)
    }

    #[must_use]
    pub fn tiers(&self) -> &[PunishmentTier] {
        &self.tiers
    }

    /// The default ladder: two mutes of increasing length, then a ban.
    #[must_use]
    pub fn default_tiers() -> Vec<PunishmentTier> {
        vec![
            PunishmentTier {
                warnings: 3,
                action: PunishmentAction::Mute { duration_secs: 600 },
            },
            PunishmentTier {
                warnings: 5,
                action: PunishmentAction::Mute { duration_secs: 3600 },
            },
            PunishmentTier {
                warnings: 7,
                action: PunishmentAction::Ban,
            },
        ]
    }
}

impl Default for PunishmentPolicy {
    fn default() -> Self {
        Self {
            tiers: Self::default_tiers(),
        }
    }
}
