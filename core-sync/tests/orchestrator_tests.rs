//! Full-cycle orchestrator tests: accounts, user resolution, assignment
//! notifications, events, and sync reports.

use async_trait::async_trait;
use core_remote::{
    FieldDescriptor, FieldKind, Filter, RemoteClient, RemoteRecord, RemoteSchema, RemoteValue,
};
use core_store::{
    create_test_pool, Account, NotificationStore, SqlValue, Store,
};
use core_sync::{FieldConfig, RemoteConnector, SyncEvent, SyncOrchestrator};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct FixtureTask {
    id: i64,
    name: String,
    user_ids: Vec<i64>,
    write_date: String,
}

/// Minimal remote: a fixed user plus a mutable set of tasks.
struct FixtureRemote {
    tasks: Mutex<Vec<FixtureTask>>,
}

impl FixtureRemote {
    fn new(tasks: &[(i64, &str, &[i64])]) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(
                tasks
                    .iter()
                    .map(|(id, name, users)| FixtureTask {
                        id: *id,
                        name: name.to_string(),
                        user_ids: users.to_vec(),
                        write_date: "2026-02-01 08:00:00".to_string(),
                    })
                    .collect(),
            ),
        })
    }

    /// Reassign with a newer write stamp, as a real edit would carry.
    fn assign(&self, task_id: i64, user_id: i64) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.user_ids.push(user_id);
            task.write_date = "2026-02-01 09:00:00".to_string();
        }
    }

    fn task_records(&self) -> Vec<RemoteRecord> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|task| RemoteRecord {
                id: task.id,
                values: HashMap::from([
                    ("name".to_string(), RemoteValue::Text(task.name.clone())),
                    (
                        "user_ids".to_string(),
                        RemoteValue::IdList(task.user_ids.clone()),
                    ),
                    (
                        "write_date".to_string(),
                        RemoteValue::Text(task.write_date.clone()),
                    ),
                ]),
            })
            .collect()
    }
}

#[async_trait]
impl RemoteClient for FixtureRemote {
    async fn search(&self, _entity: &str, _domain: &[Filter]) -> core_remote::Result<Vec<i64>> {
        Ok(Vec::new())
    }

    async fn search_read(
        &self,
        entity: &str,
        fields: &[String],
    ) -> core_remote::Result<Vec<RemoteRecord>> {
        match entity {
            "user" => Ok(vec![RemoteRecord {
                id: 7,
                values: HashMap::from([
                    ("name".to_string(), RemoteValue::Text("Alex".to_string())),
                    (
                        "login".to_string(),
                        RemoteValue::Text("alex@example.com".to_string()),
                    ),
                ]),
            }]),
            "task" => Ok(self
                .task_records()
                .into_iter()
                .map(|mut record| {
                    record.values.retain(|k, _| fields.contains(k));
                    record
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn read(
        &self,
        _entity: &str,
        _ids: &[i64],
        _fields: &[String],
    ) -> core_remote::Result<Vec<RemoteRecord>> {
        Ok(Vec::new())
    }

    async fn fields_get(&self, entity: &str) -> core_remote::Result<RemoteSchema> {
        use FieldKind::*;
        let fields: &[(&str, FieldKind)] = match entity {
            "task" => &[
                ("name", Char),
                ("user_ids", ManyToMany),
                ("write_date", Datetime),
            ],
            "user" => &[("name", Char), ("login", Char)],
            "project" => &[("name", Char), ("write_date", Datetime)],
            "timesheet" => &[("name", Char), ("write_date", Datetime)],
            "activity" => &[("summary", Char), ("write_date", Datetime)],
            "activity.type" => &[("name", Char)],
            _ => &[],
        };
        Ok(fields
            .iter()
            .map(|(name, kind)| (name.to_string(), FieldDescriptor { kind: *kind }))
            .collect())
    }

    async fn create(
        &self,
        _entity: &str,
        _values: &HashMap<String, RemoteValue>,
    ) -> core_remote::Result<i64> {
        Ok(1)
    }

    async fn write(
        &self,
        _entity: &str,
        _ids: &[i64],
        _values: &HashMap<String, RemoteValue>,
    ) -> core_remote::Result<()> {
        Ok(())
    }

    async fn unlink(&self, _entity: &str, _ids: &[i64]) -> core_remote::Result<()> {
        Ok(())
    }

    async fn exec_action(&self, _entity: &str, _action: &str, _ids: &[i64]) -> core_remote::Result<()> {
        Ok(())
    }
}

struct FixtureConnector {
    remote: Arc<FixtureRemote>,
}

#[async_trait]
impl RemoteConnector for FixtureConnector {
    async fn connect(
        &self,
        _account: &Account,
    ) -> core_sync::Result<Arc<dyn RemoteClient>> {
        Ok(self.remote.clone())
    }
}

async fn seed_account(store: &Store) -> i64 {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    store
        .insert(
            "INSERT INTO accounts (name, url, database, login, api_key) VALUES (?, ?, ?, ?, ?)",
            &[
                "work".into(),
                "https://records.example.com".into(),
                "prod".into(),
                "alex@example.com".into(),
                "key".into(),
            ],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn cycle_reports_success_and_notifies_new_assignments() {
    let store = Store::new(create_test_pool().await.unwrap());
    let account_id = seed_account(&store).await;
    let remote = FixtureRemote::new(&[(100, "Fix login page", &[7]), (101, "Write docs", &[8])]);

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        Arc::new(FixtureConnector {
            remote: remote.clone(),
        }),
        FieldConfig::builtin(),
    );
    let mut events = orchestrator.events().subscribe();

    // First cycle mirrors the users table, so the login resolves but the
    // assignment baseline is empty until the snapshot after download.
    let outcomes = orchestrator.sync_all().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success);
    // Task 100 was already assigned, but there was no prior snapshot with
    // a resolved user, so the first cycle stays quiet.
    assert_eq!(outcomes[0].new_assignments, 0);

    // Second cycle: a new assignment appears remotely.
    remote.assign(101, 7);
    let outcomes = orchestrator.sync_all().await.unwrap();
    assert_eq!(outcomes[0].new_assignments, 1);

    let notifications = NotificationStore::new(&store);
    let unread = notifications.list_unread().await.unwrap();
    let assignment: Vec<_> = unread
        .iter()
        .filter(|n| n.kind == "new_assignment")
        .collect();
    assert_eq!(assignment.len(), 1);
    assert!(assignment[0].message.contains("Write docs"));

    let report = notifications
        .latest_report(account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.state, "success");

    // Events from the first cycle, in order.
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::Started { account_id }
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        SyncEvent::Completed { success: true, .. }
    ));
}

#[tokio::test]
async fn accounts_without_url_are_skipped_entirely() {
    let store = Store::new(create_test_pool().await.unwrap());
    store
        .execute(
            "INSERT INTO accounts (name, url, database, login, api_key) VALUES (?, '', '', '', '')",
            &["unreachable".into()],
        )
        .await
        .unwrap();

    let remote = FixtureRemote::new(&[]);
    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        Arc::new(FixtureConnector { remote }),
        FieldConfig::builtin(),
    );
    let outcomes = orchestrator.sync_all().await.unwrap();
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn download_only_direction_skips_upload() {
    let store = Store::new(create_test_pool().await.unwrap());
    seed_account(&store).await;
    store
        .execute(
            "INSERT INTO app_settings (key, value) VALUES ('sync_direction', 'download_only')",
            &[],
        )
        .await
        .unwrap();

    // A pending local deletion must survive a download-only cycle.
    store
        .execute(
            "INSERT INTO projects (account_id, name, status) VALUES (?, ?, 'deleted')",
            &[SqlValue::Integer(1), "Poised for deletion".into()],
        )
        .await
        .unwrap();

    let remote = FixtureRemote::new(&[]);
    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        Arc::new(FixtureConnector { remote }),
        FieldConfig::builtin(),
    );
    orchestrator.sync_all().await.unwrap();

    let row = store
        .fetch_optional("SELECT status FROM projects WHERE name = ?", &["Poised for deletion".into()])
        .await
        .unwrap();
    assert!(row.is_some());
}
