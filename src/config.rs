//! Bot configuration
//!
//! Loaded once at startup from a YAML file; secrets (token, store endpoint)
//! come from the environment instead. Missing file means defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::policy::{PolicyError, PunishmentPolicy, PunishmentTier};

/// Default location of the configuration file
pub const CONFIG_FILE: &str = "config/warden.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid punishment policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Tunable settings for the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Seconds between mute expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Automatic punishment ladder
    #[serde(default = "PunishmentPolicy::default_tiers")]
    pub punishment_tiers: Vec<PunishmentTier>,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            punishment_tiers: PunishmentPolicy::default_tiers(),
        }
    }
}

impl WardenConfig {
    /// Load the config file, falling back to defaults when it is absent.
    ///
    /// # Errors
    /// Returns a `ConfigError` when the file exists but cannot be read or
    /// parsed.
    pub async fn load(path: &str) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(serde_yaml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {path}, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Validate the configured tiers into a usable policy.
    ///
    /// # Errors
    /// Returns a `ConfigError` when thresholds are duplicated, zero, or a
    /// mute tier has no duration.
    pub fn policy(&self) -> Result<PunishmentPolicy, ConfigError> {
        Ok(PunishmentPolicy::new(self.punishment_tiers.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PunishmentAction;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.punishment_tiers.len(), 3);
        assert!(config.policy().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = "
sweep_interval_secs: 30
punishment_tiers:
  - warnings: 2
    action: mute
    duration_secs: 120
  - warnings: 4
    action: ban
";
        let config: WardenConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.sweep_interval_secs, 30);
        let policy = config.policy().expect("valid policy");
        assert_eq!(
            policy.tier_for(2).map(|t| t.action),
            Some(PunishmentAction::Mute { duration_secs: 120 })
        );
        assert_eq!(policy.tier_for(4).map(|t| t.action), Some(PunishmentAction::Ban));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: WardenConfig = serde_yaml::from_str("sweep_interval_secs: 15").expect("parse");
        assert_eq!(config.sweep_interval_secs, 15);
        assert_eq!(config.punishment_tiers.len(), 3);
    }

    #[test]
    fn test_invalid_tiers_rejected() {
        let yaml = "
punishment_tiers:
  - warnings: 3
    action: ban
  - warnings: 3
    action: ban
";
        let config: WardenConfig = serde_yaml::from_str(yaml).expect("parse");
        assert!(config.policy().is_err());
    }
}
