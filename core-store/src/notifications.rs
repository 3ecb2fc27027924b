//! Persisted notifications and per-account sync reports.
//!
//! The engine records what happened; delivery (desktop popups, badges) is
//! a separate consumer reading these tables and the event bus.

use crate::error::Result;
use crate::store::Store;
use crate::value::{SqlRow, SqlValue};
use chrono::Utc;
use serde_json::Value as JsonValue;

/// One stored notification row.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub account_id: i64,
    pub kind: String,
    pub message: String,
    pub payload: Option<JsonValue>,
    pub read: bool,
    pub created_at: String,
}

impl Notification {
    fn from_row(row: &SqlRow) -> Option<Self> {
        Some(Self {
            id: row.get("id")?.as_i64()?,
            account_id: row.get("account_id")?.as_i64()?,
            kind: row.get("kind")?.as_str()?.to_string(),
            message: row.get("message")?.as_str()?.to_string(),
            payload: row
                .get("payload")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok()),
            read: row.get("read_status")?.as_i64()? != 0,
            created_at: row.get("created_at")?.as_str().unwrap_or_default().to_string(),
        })
    }
}

/// The outcome row one sync cycle leaves behind, one per account.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub account_id: i64,
    pub state: String,
    pub message: Option<String>,
}

impl SyncReport {
    pub fn success(account_id: i64) -> Self {
        Self {
            account_id,
            state: "success".to_string(),
            message: None,
        }
    }

    pub fn failure(account_id: i64, message: impl Into<String>) -> Self {
        Self {
            account_id,
            state: "failure".to_string(),
            message: Some(message.into()),
        }
    }
}

/// Accessor over the notifications and sync report tables.
pub struct NotificationStore<'a> {
    store: &'a Store,
}

impl<'a> NotificationStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert one unread notification.
    pub async fn add(
        &self,
        account_id: i64,
        kind: &str,
        message: &str,
        payload: Option<&JsonValue>,
    ) -> Result<i64> {
        let payload_text = match payload {
            Some(value) => SqlValue::Text(value.to_string()),
            None => SqlValue::Null,
        };
        self.store
            .insert(
                "INSERT INTO notifications (account_id, kind, message, payload, read_status, created_at) \
                 VALUES (?, ?, ?, ?, 0, ?)",
                &[
                    SqlValue::Integer(account_id),
                    kind.into(),
                    message.into(),
                    payload_text,
                    now().into(),
                ],
            )
            .await
    }

    pub async fn unread_count(&self) -> Result<i64> {
        let row = self
            .store
            .fetch_optional("SELECT COUNT(*) AS n FROM notifications WHERE read_status = 0", &[])
            .await?;
        Ok(row
            .and_then(|r| r.get("n").and_then(|v| v.as_i64()))
            .unwrap_or(0))
    }

    pub async fn mark_read(&self, id: i64) -> Result<()> {
        self.store
            .execute(
                "UPDATE notifications SET read_status = 1 WHERE id = ?",
                &[SqlValue::Integer(id)],
            )
            .await?;
        Ok(())
    }

    pub async fn list_unread(&self) -> Result<Vec<Notification>> {
        let rows = self
            .store
            .fetch(
                "SELECT id, account_id, kind, message, payload, read_status, created_at \
                 FROM notifications WHERE read_status = 0 ORDER BY id",
                &[],
            )
            .await?;
        Ok(rows.iter().filter_map(Notification::from_row).collect())
    }

    /// Replace the account's sync report with the latest cycle outcome.
    /// Only the most recent report per account is kept.
    pub async fn write_report(&self, report: &SyncReport) -> Result<()> {
        self.store
            .execute(
                "DELETE FROM sync_reports WHERE account_id = ?",
                &[SqlValue::Integer(report.account_id)],
            )
            .await?;
        self.store
            .execute(
                "INSERT INTO sync_reports (account_id, state, message, created_at) VALUES (?, ?, ?, ?)",
                &[
                    SqlValue::Integer(report.account_id),
                    report.state.as_str().into(),
                    report
                        .message
                        .as_deref()
                        .map(SqlValue::from)
                        .unwrap_or(SqlValue::Null),
                    now().into(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn latest_report(&self, account_id: i64) -> Result<Option<SyncReport>> {
        let row = self
            .store
            .fetch_optional(
                "SELECT state, message FROM sync_reports WHERE account_id = ?",
                &[SqlValue::Integer(account_id)],
            )
            .await?;
        Ok(row.map(|r| SyncReport {
            account_id,
            state: r
                .get("state")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            message: r.get("message").and_then(|v| v.as_str()).map(String::from),
        }))
    }
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn add_and_count_unread() {
        let store = Store::new(create_test_pool().await.unwrap());
        let notifications = NotificationStore::new(&store);

        let payload = json!({"entity": "task", "remote_id": 42});
        let id = notifications
            .add(1, "new_assignment", "New task assigned", Some(&payload))
            .await
            .unwrap();
        assert_eq!(notifications.unread_count().await.unwrap(), 1);

        let unread = notifications.list_unread().await.unwrap();
        assert_eq!(unread[0].payload, Some(payload));

        notifications.mark_read(id).await.unwrap();
        assert_eq!(notifications.unread_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn report_is_replaced_per_account() {
        let store = Store::new(create_test_pool().await.unwrap());
        let notifications = NotificationStore::new(&store);

        notifications
            .write_report(&SyncReport::failure(7, "connection refused"))
            .await
            .unwrap();
        notifications
            .write_report(&SyncReport::success(7))
            .await
            .unwrap();

        let report = notifications.latest_report(7).await.unwrap().unwrap();
        assert_eq!(report.state, "success");
        assert_eq!(report.message, None);

        let rows = store
            .fetch("SELECT COUNT(*) AS n FROM sync_reports", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], SqlValue::Integer(1));
    }
}
