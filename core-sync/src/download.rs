//! # Download Synchronizer
//!
//! Mirrors remote records into the local cache, one entity at a time.
//!
//! ## Overview
//!
//! For each entity the pass resolves the field map against the remote
//! schema, fetches every record, and merges each into the cache:
//! - Tables with a `last_modified` stamp overwrite only when the remote
//!   `write_date` is strictly newer; a tie keeps the local row.
//! - Tables without a stamp (the registries) overwrite unconditionally.
//! - A dirty local row keeps its protected columns and its pending status
//!   through the overwrite, so local intent survives a remote refresh.
//!
//! After the fetch loop an orphan sweep deletes local rows whose remote
//! counterpart disappeared, sparing rows with pending status or a retained
//! terminal state. One entity's failure never aborts the others.

use crate::convert;
use crate::error::Result;
use crate::field_map::FieldConfig;
use core_remote::{FieldKind, RemoteClient, RemoteRecord, RemoteSchema, RemoteValue};
use core_store::{EntityKind, RecordStatus, SqlValue, Store};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Counters for one download pass, summed across entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Records received from the remote.
    pub fetched: usize,
    /// Records written to the cache.
    pub written: usize,
    /// Records skipped because the local copy was as new or newer.
    pub skipped: usize,
    /// Orphaned local rows deleted by the sweep.
    pub swept: usize,
    /// Dirty rows that kept protected columns through an overwrite.
    pub protected: usize,
}

/// One entity that failed during the pass.
#[derive(Debug, Clone)]
pub struct EntityFailure {
    pub entity: EntityKind,
    pub message: String,
}

/// Outcome of a full download pass.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub stats: DownloadStats,
    pub failures: Vec<EntityFailure>,
}

pub struct DownloadSync<'a> {
    store: &'a Store,
    remote: &'a dyn RemoteClient,
    config: &'a FieldConfig,
    account_id: i64,
}

impl<'a> DownloadSync<'a> {
    pub fn new(
        store: &'a Store,
        remote: &'a dyn RemoteClient,
        config: &'a FieldConfig,
        account_id: i64,
    ) -> Self {
        Self {
            store,
            remote,
            config,
            account_id,
        }
    }

    /// Run the pass over every downloadable entity.
    pub async fn run(&self) -> Result<DownloadReport> {
        let mut report = DownloadReport::default();

        for entity in EntityKind::DOWNLOADS {
            match self.sync_entity(*entity).await {
                Ok(stats) => {
                    report.stats.fetched += stats.fetched;
                    report.stats.written += stats.written;
                    report.stats.skipped += stats.skipped;
                    report.stats.swept += stats.swept;
                    report.stats.protected += stats.protected;
                }
                Err(e) => {
                    warn!(entity = entity.remote_name(), error = %e, "Entity download failed, continuing");
                    report.failures.push(EntityFailure {
                        entity: *entity,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            account_id = self.account_id,
            fetched = report.stats.fetched,
            written = report.stats.written,
            skipped = report.stats.skipped,
            swept = report.stats.swept,
            failures = report.failures.len(),
            "Download pass finished"
        );
        Ok(report)
    }

    async fn sync_entity(&self, entity: EntityKind) -> Result<DownloadStats> {
        let mut stats = DownloadStats::default();

        let schema = self.remote.fields_get(entity.remote_name()).await?;
        let field_map = self.config.resolve(entity, &schema);
        if field_map.is_empty() {
            debug!(entity = entity.remote_name(), "No usable fields, skipping entity");
            return Ok(stats);
        }

        let mut fields: Vec<String> = field_map.iter().map(|(r, _)| r.clone()).collect();
        if entity.tracks_modification() && !fields.iter().any(|f| f == "write_date") {
            fields.push("write_date".to_string());
        }

        let records = self
            .remote
            .search_read(entity.remote_name(), &fields)
            .await?;
        stats.fetched = records.len();
        debug!(
            entity = entity.remote_name(),
            count = records.len(),
            "Fetched remote records"
        );

        let mut seen_ids = HashSet::with_capacity(records.len());
        for record in &records {
            seen_ids.insert(record.id);
            match self.merge_record(entity, &field_map, &schema, record).await? {
                MergeOutcome::Written { kept_protected } => {
                    stats.written += 1;
                    if kept_protected {
                        stats.protected += 1;
                    }
                }
                MergeOutcome::Skipped => stats.skipped += 1,
            }
        }

        stats.swept = self.sweep_orphans(entity, &seen_ids).await?;
        Ok(stats)
    }

    async fn merge_record(
        &self,
        entity: EntityKind,
        field_map: &[(String, String)],
        schema: &RemoteSchema,
        record: &RemoteRecord,
    ) -> Result<MergeOutcome> {
        let local = self.load_local(entity, record.id).await?;

        if entity.tracks_modification() {
            let remote_stamp = record.get("write_date").and_then(|v| v.as_str());
            if let Some(existing) = &local {
                if !should_overwrite(remote_stamp, existing.last_modified.as_deref()) {
                    debug!(
                        entity = entity.remote_name(),
                        remote_id = record.id,
                        "Local copy is current, skipping"
                    );
                    return Ok(MergeOutcome::Skipped);
                }
            } else if remote_stamp.is_none() {
                // A tracked record without a write stamp cannot be
                // compared on later cycles; store it anyway.
                debug!(
                    entity = entity.remote_name(),
                    remote_id = record.id,
                    "Remote record has no write stamp"
                );
            }
        }

        let mut columns: Vec<&str> = Vec::with_capacity(field_map.len() + 3);
        let mut values: Vec<SqlValue> = Vec::with_capacity(field_map.len() + 3);

        let dirty = local
            .as_ref()
            .map(|l| l.status.needs_upload())
            .unwrap_or(false);
        let mut kept_protected = false;

        for (remote_field, local_column) in field_map {
            if dirty && entity.protected_fields().contains(&local_column.as_str()) {
                if let Some(kept) = local.as_ref().and_then(|l| l.values.get(local_column)) {
                    columns.push(local_column.as_str());
                    values.push(kept.clone());
                    kept_protected = true;
                    continue;
                }
            }
            let value = record.get(remote_field).unwrap_or(&RemoteValue::Null);
            let kind = schema
                .get(remote_field)
                .map(|d| d.kind)
                .unwrap_or(FieldKind::Other);
            columns.push(local_column.as_str());
            values.push(convert::to_local_typed(value, kind));
        }

        // A relation also carries its display name; keep the local name
        // column in step with the id so a later create can resolve it.
        if let Some(reference) = entity.reference() {
            if let Some(RemoteValue::Relation(_, name)) = record.get(reference.remote_field) {
                if !columns.contains(&reference.name_column) {
                    columns.push(reference.name_column);
                    values.push(name.as_str().into());
                }
            }
        }

        columns.push("remote_id");
        values.push(record.id.into());
        columns.push("account_id");
        values.push(self.account_id.into());
        columns.push("status");
        let status = local.map(|l| l.status).unwrap_or(RecordStatus::Clean);
        values.push(status.as_str().into());

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            entity.table(),
            columns.join(", "),
            placeholders,
        );
        self.store.execute(&sql, &values).await?;
        Ok(MergeOutcome::Written { kept_protected })
    }

    async fn load_local(&self, entity: EntityKind, remote_id: i64) -> Result<Option<LocalRow>> {
        let mut select: Vec<&str> = vec!["status"];
        if entity.tracks_modification() {
            select.push("last_modified");
        }
        select.extend(entity.protected_fields());

        let sql = format!(
            "SELECT {} FROM {} WHERE account_id = ? AND remote_id = ?",
            select.join(", "),
            entity.table(),
        );
        let Some(row) = self
            .store
            .fetch_optional(&sql, &[self.account_id.into(), remote_id.into()])
            .await?
        else {
            return Ok(None);
        };

        let status = row
            .get("status")
            .and_then(|v| v.as_str())
            .map(RecordStatus::parse)
            .transpose()
            .unwrap_or(Some(RecordStatus::Clean))
            .unwrap_or(RecordStatus::Clean);
        let last_modified = row
            .get("last_modified")
            .and_then(|v| v.as_str())
            .map(String::from);
        let values: HashMap<String, SqlValue> = entity
            .protected_fields()
            .iter()
            .filter_map(|col| row.get(*col).map(|v| (col.to_string(), v.clone())))
            .collect();

        Ok(Some(LocalRow {
            status,
            last_modified,
            values,
        }))
    }

    /// Delete local rows whose remote counterpart vanished, sparing rows
    /// with local intent still pending and retained terminal states.
    async fn sweep_orphans(&self, entity: EntityKind, seen: &HashSet<i64>) -> Result<usize> {
        let sql = format!(
            "SELECT id, remote_id, status FROM {} WHERE account_id = ? AND remote_id IS NOT NULL",
            entity.table(),
        );
        let rows = self.store.fetch(&sql, &[self.account_id.into()]).await?;

        let mut swept = 0;
        for row in &rows {
            let (Some(local_id), Some(remote_id)) = (
                row.get("id").and_then(|v| v.as_i64()),
                row.get("remote_id").and_then(|v| v.as_i64()),
            ) else {
                continue;
            };
            if seen.contains(&remote_id) {
                continue;
            }
            let status = row
                .get("status")
                .and_then(|v| v.as_str())
                .map(|s| RecordStatus::parse(s).unwrap_or(RecordStatus::Clean))
                .unwrap_or(RecordStatus::Clean);
            if status.needs_upload() {
                debug!(
                    entity = entity.remote_name(),
                    local_id,
                    remote_id,
                    status = %status,
                    "Orphan has pending status, keeping"
                );
                continue;
            }
            if let Some(predicate) = entity.sweep_retain_predicate() {
                let check = format!(
                    "SELECT 1 AS keep FROM {} WHERE id = ? AND {}",
                    entity.table(),
                    predicate,
                );
                if self
                    .store
                    .fetch_optional(&check, &[local_id.into()])
                    .await?
                    .is_some()
                {
                    debug!(
                        entity = entity.remote_name(),
                        local_id, remote_id, "Orphan retained by terminal state"
                    );
                    continue;
                }
            }

            debug!(
                entity = entity.remote_name(),
                local_id, remote_id, "Deleting orphaned local row"
            );
            let delete = format!("DELETE FROM {} WHERE id = ?", entity.table());
            self.store.execute(&delete, &[local_id.into()]).await?;
            swept += 1;
        }
        Ok(swept)
    }
}

enum MergeOutcome {
    Written { kept_protected: bool },
    Skipped,
}

struct LocalRow {
    status: RecordStatus,
    last_modified: Option<String>,
    values: HashMap<String, SqlValue>,
}

/// Overwrite iff the remote stamp is strictly newer than the local one.
/// No remote stamp → keep local; no local stamp → overwrite; either stamp
/// unparseable → overwrite, the remote is the source of truth.
fn should_overwrite(remote: Option<&str>, local: Option<&str>) -> bool {
    let Some(remote) = remote.filter(|s| !s.trim().is_empty()) else {
        return false;
    };
    let Some(local) = local.filter(|s| !s.trim().is_empty()) else {
        return true;
    };
    match (convert::parse_timestamp(remote), convert::parse_timestamp(local)) {
        (Some(remote_dt), Some(local_dt)) => remote_dt > local_dt,
        _ => {
            warn!(remote, local, "Unparseable timestamp pair, overwriting");
            true
        }
    }
}
