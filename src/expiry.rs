//! Timed mute registry and expiry sweep
//!
//! Mute records live in the store with a unix-timestamp expiry. The backend
//! cannot filter on "ends_at before now", so every sweep fetches the whole
//! collection and compares client-side.
//!
//! A sweep walks every record and, for the expired ones:
//! - drops the record outright when the guild is no longer resolvable or the
//!   member has left (stale-reference cleanup beats restriction lifting);
//! - clears the member's timeout only if one is still applied, so a timeout
//!   removed out-of-band never turns into an error;
//! - deletes the record whatever the platform call did, except when Discord
//!   refused for lack of permission, in which case the record is retained and
//!   flagged for manual follow-up.
//!
//! One record going sideways never stops the rest of the sweep.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::SWEEP_TARGET;
use crate::audit::AuditLog;
use crate::embeds;
use crate::gateway::ModerationGateway;
use crate::records::{self, MuteRecord};
use crate::store::{self, RecordStore, StoreError};

/// Replace any mute on record for the pair with this one.
///
/// The store enforces no uniqueness, so "one mute per (user, guild)" is a
/// convention kept by deleting before inserting.
///
/// # Errors
/// Returns a `StoreError` when the delete or insert fails.
pub async fn upsert_mute(store: &dyn RecordStore, record: &MuteRecord) -> Result<(), StoreError> {
    let filters = store::user_guild_filters(record.user_id, record.guild_id);
    store.delete(store::MUTES, &filters).await?;
    store
        .insert(store::MUTES, records::to_document(record)?)
        .await?;
    Ok(())
}

/// Drop the mute record for the pair, if one exists.
///
/// # Errors
/// Returns a `StoreError` when the delete fails.
pub async fn remove_mute(
    store: &dyn RecordStore,
    user_id: u64,
    guild_id: u64,
) -> Result<(), StoreError> {
    let filters = store::user_guild_filters(user_id, guild_id);
    store.delete(store::MUTES, &filters).await
}

/// Requests handled by the sweep task between ticks
#[derive(Debug, Clone, Copy)]
pub enum SweepRequest {
    /// Run a sweep immediately
    Sweep,
    /// Stop the task
    Shutdown,
}

/// What a single sweep did, for logs and tests
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Mute records inspected
    pub scanned: usize,
    /// Timeouts actually cleared on the platform
    pub lifted: usize,
    /// Records deleted from the store
    pub removed: usize,
    /// Records kept back because the platform refused the lift
    pub retained: usize,
}

/// Recurring task that lifts expired mutes and prunes stale records
#[derive(Clone)]
pub struct MuteSweeper {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn ModerationGateway>,
    audit: AuditLog,
}

impl MuteSweeper {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn ModerationGateway>,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            gateway,
            audit,
        }
    }

    /// Spawn the sweep loop. Callers must not start it before the gateway
    /// handshake has completed; the first interval tick runs right away.
    pub fn spawn(self, rx: Receiver<SweepRequest>, interval_secs: u64) {
        tokio::spawn(async move {
            self.run(rx, interval_secs).await;
        });
    }

    /// Create the request channel for a sweep task
    #[must_use]
    pub fn channel() -> (Sender<SweepRequest>, Receiver<SweepRequest>) {
        mpsc::channel(16)
    }

    async fn run(self, mut rx: Receiver<SweepRequest>, interval_secs: u64) {
        info!(target: SWEEP_TARGET, "Starting mute expiry sweep with {interval_secs}s interval");
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tokio::select! {
                Some(request) = rx.recv() => {
                    match request {
                        SweepRequest::Sweep => {
                            info!(target: SWEEP_TARGET, "Received request for an immediate sweep");
                            self.sweep().await;
                        }
                        SweepRequest::Shutdown => {
                            info!(target: SWEEP_TARGET, "Received shutdown request for sweep task");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!(target: SWEEP_TARGET, "Mute expiry sweep shut down");
    }

    /// Run one full pass over the mute collection
    pub async fn sweep(&self) -> SweepStats {
        let run_id = Uuid::new_v4();
        let mut stats = SweepStats::default();

        let documents = match self.store.select(store::MUTES, None).await {
            Ok(documents) => documents,
            Err(err) => {
                error!(target: SWEEP_TARGET, run_id = %run_id, "Failed to fetch mute records: {err}");
                return stats;
            }
        };

        let now = Utc::now();
        for document in documents {
            stats.scanned += 1;
            let mute = match records::from_document::<MuteRecord>(document) {
                Ok(mute) => mute,
                Err(err) => {
                    warn!(target: SWEEP_TARGET, run_id = %run_id, "Skipping malformed mute record: {err}");
                    continue;
                }
            };
            if !mute.is_expired(now) {
                continue;
            }
            self.reconcile_expired(&mute, &mut stats, run_id).await;
        }

        if stats.lifted + stats.removed + stats.retained > 0 {
            info!(
                target: SWEEP_TARGET,
                run_id = %run_id,
                scanned = stats.scanned,
                lifted = stats.lifted,
                removed = stats.removed,
                retained = stats.retained,
                "Mute sweep completed"
            );
        }
        stats
    }

    async fn reconcile_expired(&self, mute: &MuteRecord, stats: &mut SweepStats, run_id: Uuid) {
        let user_id = mute.user_id;
        let guild_id = mute.guild_id;

        match self.gateway.resolve_guild(guild_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    target: SWEEP_TARGET,
                    run_id = %run_id,
                    "Guild {guild_id} is gone; dropping stale mute for user {user_id}"
                );
                self.drop_record(mute, stats).await;
                return;
            }
            Err(err) => {
                error!(target: SWEEP_TARGET, run_id = %run_id, "Failed to resolve guild {guild_id}: {err}");
                return;
            }
        }

        let member = match self.gateway.resolve_member(guild_id, user_id).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                warn!(
                    target: SWEEP_TARGET,
                    run_id = %run_id,
                    "User {user_id} is no longer in guild {guild_id}; dropping stale mute"
                );
                self.drop_record(mute, stats).await;
                return;
            }
            Err(err) => {
                error!(
                    target: SWEEP_TARGET,
                    run_id = %run_id,
                    "Failed to resolve user {user_id} in guild {guild_id}: {err}"
                );
                return;
            }
        };

        // Only touch the platform if a timeout is actually still applied;
        // a moderator lifting it by hand must not produce errors here.
        if member.timed_out_until.is_some() {
            match self.gateway.clear_timeout(guild_id, user_id).await {
                Ok(()) => {
                    stats.lifted += 1;
                    info!(
                        target: SWEEP_TARGET,
                        run_id = %run_id,
                        "Mute expired for user {user_id} in guild {guild_id}, timeout cleared"
                    );
                    self.audit
                        .send(
                            guild_id,
                            embeds::success(
                                "Member Unmuted Automatically",
                                &format!(
                                    "**User:** <@{user_id}> (`{user_id}`)\n**Reason:** Mute duration expired."
                                ),
                            ),
                        )
                        .await;
                }
                Err(err) if err.is_forbidden() => {
                    // Deleting now would lose track of a mute the bot never
                    // managed to lift; keep it for manual follow-up.
                    stats.retained += 1;
                    error!(
                        target: SWEEP_TARGET,
                        run_id = %run_id,
                        "No permission to clear timeout for user {user_id} in guild {guild_id}; keeping record"
                    );
                    return;
                }
                Err(err) => {
                    error!(
                        target: SWEEP_TARGET,
                        run_id = %run_id,
                        "Failed to clear timeout for user {user_id} in guild {guild_id}: {err}"
                    );
                }
            }
        }

        self.drop_record(mute, stats).await;
    }

    async fn drop_record(&self, mute: &MuteRecord, stats: &mut SweepStats) {
        match remove_mute(self.store.as_ref(), mute.user_id, mute.guild_id).await {
            Ok(()) => stats.removed += 1,
            Err(err) => {
                error!(
                    target: SWEEP_TARGET,
                    "Failed to delete mute record for user {} in guild {}: {err}",
                    mute.user_id,
                    mute.guild_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MemberView, MockModerationGateway};
    use crate::store::memory::MemoryStore;
    use chrono::Duration as ChronoDuration;

    const GUILD: u64 = 10;
    const USER: u64 = 20;

    fn mute(user_id: u64, guild_id: u64, expired: bool) -> MuteRecord {
        let offset = if expired {
            -ChronoDuration::minutes(5)
        } else {
            ChronoDuration::minutes(5)
        };
        MuteRecord {
            user_id,
            guild_id,
            moderator_id: 1,
            reason: "test mute".to_string(),
            ends_at: Utc::now() + offset,
            created_at: None,
        }
    }

    async fn seed(store: &MemoryStore, record: &MuteRecord) {
        store
            .insert(store::MUTES, records::to_document(record).unwrap())
            .await
            .unwrap();
    }

    fn sweeper(store: Arc<MemoryStore>, gateway: MockModerationGateway) -> MuteSweeper {
        let gateway: Arc<dyn ModerationGateway> = Arc::new(gateway);
        let audit = AuditLog::new(store.clone(), gateway.clone());
        MuteSweeper::new(store, gateway, audit)
    }

    fn timed_out() -> MemberView {
        MemberView {
            timed_out_until: Some(Utc::now() + ChronoDuration::minutes(1)),
        }
    }

    #[tokio::test]
    async fn test_expired_mute_is_lifted_and_removed() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().returning(|_| Ok(true));
        gateway
            .expect_resolve_member()
            .returning(|_, _| Ok(Some(timed_out())));
        gateway
            .expect_clear_timeout()
            .times(1)
            .withf(|guild, user| *guild == GUILD && *user == USER)
            .returning(|_, _| Ok(()));

        let stats = sweeper(store.clone(), gateway).sweep().await;
        assert_eq!(
            stats,
            SweepStats { scanned: 1, lifted: 1, removed: 1, retained: 0 }
        );
        assert_eq!(store.len(store::MUTES), 0);
    }

    #[tokio::test]
    async fn test_unexpired_mutes_are_left_alone() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, false)).await;

        // No gateway expectations: any call would panic.
        let stats = sweeper(store.clone(), MockModerationGateway::new())
            .sweep()
            .await;
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.removed, 0);
        assert_eq!(store.len(store::MUTES), 1);
    }

    #[tokio::test]
    async fn test_gone_guild_drops_record_without_platform_call() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway
            .expect_resolve_guild()
            .times(1)
            .returning(|_| Ok(false));

        let stats = sweeper(store.clone(), gateway).sweep().await;
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.lifted, 0);
        assert_eq!(store.len(store::MUTES), 0);
    }

    #[tokio::test]
    async fn test_departed_member_drops_record_without_platform_call() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().returning(|_| Ok(true));
        gateway
            .expect_resolve_member()
            .times(1)
            .returning(|_, _| Ok(None));

        let stats = sweeper(store.clone(), gateway).sweep().await;
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.lifted, 0);
        assert_eq!(store.len(store::MUTES), 0);
    }

    #[tokio::test]
    async fn test_externally_unmuted_member_skips_the_platform_call() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().returning(|_| Ok(true));
        gateway
            .expect_resolve_member()
            .returning(|_, _| Ok(Some(MemberView { timed_out_until: None })));
        // expect_clear_timeout deliberately unset.

        let stats = sweeper(store.clone(), gateway).sweep().await;
        assert_eq!(stats.lifted, 0);
        assert_eq!(stats.removed, 1);
        assert_eq!(store.len(store::MUTES), 0);
    }

    #[tokio::test]
    async fn test_permission_failure_retains_the_record() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().returning(|_| Ok(true));
        gateway
            .expect_resolve_member()
            .returning(|_, _| Ok(Some(timed_out())));
        gateway
            .expect_clear_timeout()
            .returning(|_, _| Err(GatewayError::Forbidden("timeout removal".to_string())));

        let stats = sweeper(store.clone(), gateway).sweep().await;
        assert_eq!(
            stats,
            SweepStats { scanned: 1, lifted: 0, removed: 0, retained: 1 }
        );
        assert_eq!(store.len(store::MUTES), 1, "record must be kept for follow-up");
    }

    #[tokio::test]
    async fn test_not_found_on_lift_still_removes_the_record() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().returning(|_| Ok(true));
        gateway
            .expect_resolve_member()
            .returning(|_, _| Ok(Some(timed_out())));
        gateway
            .expect_clear_timeout()
            .returning(|_, _| Err(GatewayError::NotFound("member".to_string())));

        let stats = sweeper(store.clone(), gateway).sweep().await;
        assert_eq!(stats.removed, 1);
        assert_eq!(store.len(store::MUTES), 0);
    }

    #[tokio::test]
    async fn test_one_bad_record_does_not_stop_the_sweep() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;
        seed(&store, &mute(USER + 1, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().returning(|_| Ok(true));
        gateway.expect_resolve_member().returning(|_, user| {
            if user == USER {
                Err(GatewayError::Api(Box::new(
                    poise::serenity_prelude::Error::Other("boom"),
                )))
            } else {
                Ok(Some(timed_out()))
            }
        });
        gateway
            .expect_clear_timeout()
            .times(1)
            .withf(|_, user| *user == USER + 1)
            .returning(|_, _| Ok(()));

        let stats = sweeper(store.clone(), gateway).sweep().await;
        // The failing record is neither lifted nor removed; the other is both.
        assert_eq!(stats.lifted, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(store.len(store::MUTES), 1);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent_once_reconciled() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, &mute(USER, GUILD, true)).await;

        let mut gateway = MockModerationGateway::new();
        gateway.expect_resolve_guild().times(1).returning(|_| Ok(true));
        gateway
            .expect_resolve_member()
            .times(1)
            .returning(|_, _| Ok(Some(timed_out())));
        gateway
            .expect_clear_timeout()
            .times(1)
            .returning(|_, _| Ok(()));

        let sweeper = sweeper(store.clone(), gateway);
        let first = sweeper.sweep().await;
        assert_eq!(first.removed, 1);

        let deletes_after_first = store.delete_count();
        // All expectations are exhausted: a second platform call would panic.
        let second = sweeper.sweep().await;
        assert_eq!(
            second,
            SweepStats { scanned: 0, lifted: 0, removed: 0, retained: 0 }
        );
        assert_eq!(store.delete_count(), deletes_after_first);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_mute() {
        let store = MemoryStore::new();
        let first = mute(USER, GUILD, false);
        upsert_mute(&store, &first).await.unwrap();
        let second = MuteRecord {
            reason: "newer mute".to_string(),
            ..mute(USER, GUILD, false)
        };
        upsert_mute(&store, &second).await.unwrap();

        let rows = store.select(store::MUTES, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["reason"], "newer mute");
    }
}
