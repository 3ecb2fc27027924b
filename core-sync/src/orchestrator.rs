//! # Sync Orchestrator
//!
//! Runs full sync cycles across configured accounts.
//!
//! ## Overview
//!
//! One cycle per account: resolve the account's user from the cached users
//! table, snapshot assignment sets, upload local intent, download the
//! remote state, re-snapshot, and turn the assignment diff into stored
//! notifications and bus events. Upload runs before download so local
//! intent reaches the server before the mirror refresh can touch it.
//!
//! A [`SyncGuard`] refuses a second concurrent cycle outright; callers
//! retry on the next tick rather than queueing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(store, connector, FieldConfig::builtin());
//! let outcomes = orchestrator.sync_all().await?;
//! ```

use crate::assignment::AssignmentSnapshot;
use crate::download::DownloadSync;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::field_map::FieldConfig;
use crate::upload::UploadSync;
use async_trait::async_trait;
use core_remote::{RemoteClient, RpcClient, RpcConfig};
use core_store::{
    list_accounts, Account, NotificationStore, Settings, Store, SyncReport,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Refuses overlapping sync cycles. Acquisition is an explicit
/// try-acquire; holders release by dropping the permit.
#[derive(Default)]
pub struct SyncGuard {
    busy: AtomicBool,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` if a cycle is already running.
    pub fn try_acquire(&self) -> Option<SyncPermit<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(SyncPermit { guard: self })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of a cycle; dropping releases the guard.
pub struct SyncPermit<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

/// Produces a connected remote client for an account.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, account: &Account) -> Result<Arc<dyn RemoteClient>>;
}

/// Default connector speaking the JSON-RPC protocol.
pub struct RpcConnector;

#[async_trait]
impl RemoteConnector for RpcConnector {
    async fn connect(&self, account: &Account) -> Result<Arc<dyn RemoteClient>> {
        let client = RpcClient::connect(RpcConfig {
            url: account.url.clone(),
            database: account.database.clone(),
            login: account.login.clone(),
            api_key: account.api_key.clone(),
        })
        .await?;
        Ok(Arc::new(client))
    }
}

/// Outcome of one account's cycle.
#[derive(Debug)]
pub struct SyncOutcome {
    pub account_id: i64,
    pub success: bool,
    pub new_assignments: usize,
}

pub struct SyncOrchestrator {
    store: Store,
    connector: Arc<dyn RemoteConnector>,
    config: FieldConfig,
    guard: SyncGuard,
    events: EventBus,
}

impl SyncOrchestrator {
    pub fn new(store: Store, connector: Arc<dyn RemoteConnector>, config: FieldConfig) -> Self {
        Self {
            store,
            connector,
            config,
            guard: SyncGuard::new(),
            events: EventBus::default(),
        }
    }

    /// Subscribe to cycle events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Sync every configured account sequentially. Refused outright if a
    /// cycle is already running.
    pub async fn sync_all(&self) -> Result<Vec<SyncOutcome>> {
        let _permit = self.guard.try_acquire().ok_or(SyncError::SyncInProgress)?;

        let settings = Settings::new(&self.store).sync_settings().await?;
        let accounts = list_accounts(&self.store).await?;
        info!(accounts = accounts.len(), direction = %settings.sync_direction, "Starting sync cycle");

        let mut outcomes = Vec::with_capacity(accounts.len());
        for account in &accounts {
            outcomes.push(self.run_account(account, &settings.sync_direction).await);
        }
        Ok(outcomes)
    }

    /// Sync one account. Refused outright if a cycle is already running.
    pub async fn sync_account(&self, account: &Account) -> Result<SyncOutcome> {
        let _permit = self.guard.try_acquire().ok_or(SyncError::SyncInProgress)?;
        let settings = Settings::new(&self.store).sync_settings().await?;
        Ok(self.run_account(account, &settings.sync_direction).await)
    }

    async fn run_account(
        &self,
        account: &Account,
        direction: &core_store::SyncDirection,
    ) -> SyncOutcome {
        self.events.emit(SyncEvent::Started {
            account_id: account.id,
        });

        match self.run_account_inner(account, direction).await {
            Ok(outcome) => {
                let notifications = NotificationStore::new(&self.store);
                let report = if outcome.success {
                    SyncReport::success(account.id)
                } else {
                    SyncReport::failure(account.id, "One or more entities failed")
                };
                if let Err(e) = notifications.write_report(&report).await {
                    error!(account_id = account.id, error = %e, "Failed to write sync report");
                }
                self.events.emit(SyncEvent::Completed {
                    account_id: account.id,
                    success: outcome.success,
                });
                outcome
            }
            Err(e) => {
                error!(account_id = account.id, error = %e, "Sync cycle failed");
                let notifications = NotificationStore::new(&self.store);
                if let Err(we) = notifications
                    .write_report(&SyncReport::failure(account.id, e.to_string()))
                    .await
                {
                    error!(account_id = account.id, error = %we, "Failed to write sync report");
                }
                self.events.emit(SyncEvent::Completed {
                    account_id: account.id,
                    success: false,
                });
                SyncOutcome {
                    account_id: account.id,
                    success: false,
                    new_assignments: 0,
                }
            }
        }
    }

    async fn run_account_inner(
        &self,
        account: &Account,
        direction: &core_store::SyncDirection,
    ) -> Result<SyncOutcome> {
        let remote = self.connector.connect(account).await?;
        let user_remote_id = self.resolve_user(account).await?;

        let before = match user_remote_id {
            Some(uid) => AssignmentSnapshot::capture(&self.store, account.id, uid).await?,
            None => AssignmentSnapshot::default(),
        };

        let mut success = true;

        if direction.allows_upload() {
            let report = UploadSync::new(&self.store, remote.as_ref(), &self.config, account.id)
                .run()
                .await?;
            success &= report.failures.is_empty();
            self.surface_failures(
                account.id,
                report
                    .failures
                    .iter()
                    .map(|f| (f.entity, f.message.clone())),
            )
            .await;
        } else {
            debug!(account_id = account.id, "Upload phase disabled by direction");
        }

        if direction.allows_download() {
            let report = DownloadSync::new(&self.store, remote.as_ref(), &self.config, account.id)
                .run()
                .await?;
            success &= report.failures.is_empty();
            self.surface_failures(
                account.id,
                report
                    .failures
                    .iter()
                    .map(|f| (f.entity, f.message.clone())),
            )
            .await;
        } else {
            debug!(account_id = account.id, "Download phase disabled by direction");
        }

        // Without a resolvable user at cycle start there is no baseline to
        // diff against; this cycle's download establishes one and the next
        // cycle reports from it.
        let new_assignments = match user_remote_id {
            Some(uid) => {
                let after = AssignmentSnapshot::capture(&self.store, account.id, uid).await?;
                let new = before.diff(&after);
                self.notify_assignments(account.id, &new).await;
                new.len()
            }
            None => {
                debug!(
                    account_id = account.id,
                    login = %account.login,
                    "Login not yet present in cached users, skipping assignment diff"
                );
                0
            }
        };

        Ok(SyncOutcome {
            account_id: account.id,
            success,
            new_assignments,
        })
    }

    /// The account's user id on the remote, looked up by login in the
    /// cached users table.
    async fn resolve_user(&self, account: &Account) -> Result<Option<i64>> {
        let row = self
            .store
            .fetch_optional(
                "SELECT remote_id FROM users WHERE account_id = ? AND login = ?",
                &[account.id.into(), account.login.as_str().into()],
            )
            .await?;
        Ok(row.and_then(|r| r.get("remote_id").and_then(|v| v.as_i64())))
    }

    async fn surface_failures(
        &self,
        account_id: i64,
        failures: impl Iterator<Item = (core_store::EntityKind, String)>,
    ) {
        let notifications = NotificationStore::new(&self.store);
        for (entity, message) in failures {
            self.events.emit(SyncEvent::EntityFailed {
                account_id,
                entity: entity.remote_name().to_string(),
                message: message.clone(),
            });
            if entity.user_facing() {
                if let Err(e) = notifications
                    .add(
                        account_id,
                        "sync_failure",
                        &format!("Sync failed for {}: {}", entity.remote_name(), message),
                        None,
                    )
                    .await
                {
                    warn!(account_id, error = %e, "Failed to store failure notification");
                }
            }
        }
    }

    async fn notify_assignments(
        &self,
        account_id: i64,
        new: &[crate::assignment::NewAssignment],
    ) {
        let notifications = NotificationStore::new(&self.store);
        for assignment in new {
            info!(
                account_id,
                entity = assignment.entity.remote_name(),
                remote_id = assignment.remote_id,
                "New assignment"
            );
            self.events.emit(SyncEvent::NewAssignment {
                account_id,
                entity: assignment.entity.remote_name().to_string(),
                remote_id: assignment.remote_id,
                title: assignment.title.clone(),
            });
            let payload = json!({
                "entity": assignment.entity.remote_name(),
                "remote_id": assignment.remote_id,
            });
            if let Err(e) = notifications
                .add(
                    account_id,
                    "new_assignment",
                    &format!("Assigned to you: {}", assignment.title),
                    Some(&payload),
                )
                .await
            {
                warn!(account_id, error = %e, "Failed to store assignment notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_refuses_second_acquire() {
        let guard = SyncGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.try_acquire().is_none());
        assert!(guard.is_busy());
        drop(permit);
        assert!(guard.try_acquire().is_some());
    }
}
