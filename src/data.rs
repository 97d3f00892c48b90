//! Centralized data structure for the bot

use std::{
    ops::Deref,
    sync::Arc,
};

use crate::audit::AuditLog;
use crate::config::WardenConfig;
use crate::enforcement::AutoPunisher;
use crate::gateway::ModerationGateway;
use crate::ledger::WarningLedger;
use crate::policy::PunishmentPolicy;
use crate::store::RecordStore;

/// Shared state handed to every command invocation
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

pub struct DataInner {
    /// Record store collaborator
    pub store: Arc<dyn RecordStore>,
    /// Platform collaborator
    pub gateway: Arc<dyn ModerationGateway>,
    /// Mod-log channel sender
    pub audit: AuditLog,
    /// Warning bookkeeping
    pub ledger: WarningLedger,
    /// Automatic punishment orchestration
    pub punisher: AutoPunisher,
    /// Validated punishment ladder
    pub policy: PunishmentPolicy,
    /// Startup configuration
    pub config: WardenConfig,
}

impl Data {
    /// Wire up the shared components around the two collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn ModerationGateway>,
        policy: PunishmentPolicy,
        config: WardenConfig,
        bot_user_id: u64,
    ) -> Self {
        let audit = AuditLog::new(store.clone(), gateway.clone());
        let ledger = WarningLedger::new(store.clone());
        let punisher = AutoPunisher::new(
            store.clone(),
            gateway.clone(),
            audit.clone(),
            policy.clone(),
            bot_user_id,
        );
        Self(Arc::new(DataInner {
            store,
            gateway,
            audit,
            ledger,
            punisher,
            policy,
            config,
        }))
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockModerationGateway;
    use crate::store::memory::MemoryStore;

    #[test]
    fn test_data_wires_the_policy_through() {
        let data = Data::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockModerationGateway::new()),
            PunishmentPolicy::default(),
            WardenConfig::default(),
            42,
        );
        assert!(data.policy.tier_for(3).is_some());
        assert_eq!(data.config.sweep_interval_secs, 60);
        assert!(format!("{data:?}").contains("policy"));
    }
}
