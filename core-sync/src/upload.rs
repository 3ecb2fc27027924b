//! # Upload Synchronizer
//!
//! Pushes local intent back to the remote server, one entity at a time.
//!
//! ## Overview
//!
//! The pass runs in phases per entity:
//! 1. Cleanup: never-synced rows whose required reference is entirely
//!    absent can never upload and are dropped.
//! 2. Deletions: remote `unlink` first ("already gone" counts as done),
//!    then the local row. Any other remote failure aborts the entity's
//!    deletion phase without touching local rows.
//! 3. Modifications: rows with a remote id are diffed against a fresh
//!    remote read and only the changed subset is written; rows without
//!    one are created, after reference resolution and date clamping.
//!
//! Status clears are compare-and-reset: the UPDATE matches the status
//! observed at selection, so an edit racing the upload keeps its mark.

use crate::convert;
use crate::error::{Result, SyncError};
use crate::field_map::{FieldConfig, FieldMap};
use core_remote::{FieldKind, RemoteClient, RemoteSchema, RemoteValue};
use core_store::{EntityKind, RecordStatus, SqlRow, SqlValue, Store};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Counters for one upload pass, summed across entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Never-synced rows dropped by the cleanup phase.
    pub cleaned: usize,
}

/// One entity that failed during the pass.
#[derive(Debug, Clone)]
pub struct UploadFailure {
    pub entity: EntityKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub stats: UploadStats,
    pub failures: Vec<UploadFailure>,
}

pub struct UploadSync<'a> {
    store: &'a Store,
    remote: &'a dyn RemoteClient,
    config: &'a FieldConfig,
    account_id: i64,
}

impl<'a> UploadSync<'a> {
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

    /// Run the pass over every uploadable entity.
    pub async fn run(&self) -> Result<UploadReport> {
        let mut report = UploadReport::default();

        for entity in EntityKind::UPLOADS {
            match self.sync_entity(*entity).await {
                Ok(stats) => {
                    report.stats.created += stats.created;
                    report.stats.updated += stats.updated;
                    report.stats.deleted += stats.deleted;
                    report.stats.failed += stats.failed;
                    report.stats.cleaned += stats.cleaned;
                }
                Err(e) => {
                    warn!(entity = entity.remote_name(), error = %e, "Entity upload failed, continuing");
                    report.failures.push(UploadFailure {
                        entity: *entity,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            account_id = self.account_id,
            created = report.stats.created,
            updated = report.stats.updated,
            deleted = report.stats.deleted,
            failed = report.stats.failed,
            cleaned = report.stats.cleaned,
            "Upload pass finished"
        );
        Ok(report)
    }

    async fn sync_entity(&self, entity: EntityKind) -> Result<UploadStats> {
        let mut stats = UploadStats::default();

        stats.cleaned = self.clean_unuploadable(entity).await?;
        stats.deleted = self.push_deletions(entity).await?;

        let schema = self.remote.fields_get(entity.remote_name()).await?;
        let field_map = self.config.resolve(entity, &schema);
        if field_map.is_empty() {
            return Ok(stats);
        }

        let pending = self.load_pending(entity).await?;
        for row in &pending {
            let Some(local_id) = row.get("id").and_then(|v| v.as_i64()) else {
                continue;
            };
            let status = observed_status(row);
            let result = match row.get("remote_id").and_then(|v| v.as_i64()) {
                Some(remote_id) => {
                    self.push_update(entity, &field_map, &schema, row, local_id, remote_id, status)
                        .await
                }
                None => {
                    self.push_create(entity, &field_map, &schema, row, local_id, status)
                        .await
                }
            };
            match result {
                Ok(Pushed::Created) => stats.created += 1,
                Ok(Pushed::Updated) => stats.updated += 1,
                Ok(Pushed::Unchanged) => {}
                Err(e) => {
                    warn!(
                        entity = entity.remote_name(),
                        local_id,
                        error = %e,
                        "Record upload failed, continuing with the rest"
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Drop never-synced rows that can never upload: their required
    /// reference has neither a resolved id nor a name to resolve.
    async fn clean_unuploadable(&self, entity: EntityKind) -> Result<usize> {
        let Some(reference) = entity.reference() else {
            return Ok(0);
        };
        let sql = format!(
            "DELETE FROM {table} WHERE account_id = ? AND remote_id IS NULL \
             AND ({id} IS NULL OR {id} = 0) AND ({name} IS NULL OR {name} = '')",
            table = entity.table(),
            id = reference.id_column,
            name = reference.name_column,
        );
        let cleaned = self.store.execute(&sql, &[self.account_id.into()]).await? as usize;
        if cleaned > 0 {
            info!(
                entity = entity.remote_name(),
                cleaned, "Dropped unuploadable never-synced rows"
            );
        }
        Ok(cleaned)
    }

    /// Remove remotely, then locally. A record already gone remotely is a
    /// success; any other remote error aborts the phase with local rows
    /// intact so nothing is lost.
    async fn push_deletions(&self, entity: EntityKind) -> Result<usize> {
        let sql = format!(
            "SELECT id, remote_id FROM {} WHERE account_id = ? AND status = ?",
            entity.table(),
        );
        let rows = self
            .store
            .fetch(
                &sql,
                &[self.account_id.into(), RecordStatus::Deleted.as_str().into()],
            )
            .await?;

        let mut deleted = 0;
        for row in &rows {
            let Some(local_id) = row.get("id").and_then(|v| v.as_i64()) else {
                continue;
            };
            if let Some(remote_id) = row.get("remote_id").and_then(|v| v.as_i64()) {
                match self.remote.unlink(entity.remote_name(), &[remote_id]).await {
                    Ok(()) => {}
                    Err(e) if e.is_missing_record() => {
                        debug!(
                            entity = entity.remote_name(),
                            remote_id, "Remote record already gone"
                        );
                    }
                    Err(e) => {
                        return Err(SyncError::DeletionAborted {
                            entity: entity.remote_name().to_string(),
                            source: e,
                        });
                    }
                }
            }
            let delete = format!("DELETE FROM {} WHERE id = ?", entity.table());
            self.store.execute(&delete, &[local_id.into()]).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn load_pending(&self, entity: EntityKind) -> Result<Vec<SqlRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE account_id = ? AND status IN (?, ?)",
            entity.table(),
        );
        let rows = self
            .store
            .fetch(
                &sql,
                &[
                    self.account_id.into(),
                    RecordStatus::Updated.as_str().into(),
                    RecordStatus::Created.as_str().into(),
                ],
            )
            .await?;
        Ok(rows)
    }

    #[allow(clippy::too_many_arguments)]
    async fn push_update(
        &self,
        entity: EntityKind,
        field_map: &FieldMap,
        schema: &RemoteSchema,
        row: &SqlRow,
        local_id: i64,
        remote_id: i64,
        observed: RecordStatus,
    ) -> Result<Pushed> {
        let mut remote_fields: Vec<String> = field_map.iter().map(|(r, _)| r.clone()).collect();
        if !remote_fields.iter().any(|f| f == "write_date") {
            remote_fields.push("write_date".to_string());
        }
        let current = self
            .remote
            .read(entity.remote_name(), &[remote_id], &remote_fields)
            .await?;
        let Some(current) = current.into_iter().next() else {
            // Vanished between selection and read; the next download's
            // orphan sweep reconciles it.
            warn!(
                entity = entity.remote_name(),
                remote_id, "Remote record missing on read, skipping"
            );
            return Ok(Pushed::Unchanged);
        };

        let local_stamp = row.get("last_modified").and_then(|v| v.as_str());
        let remote_stamp = current.get("write_date").and_then(|v| v.as_str());
        let completion = entity.completion();

        let mut changes: HashMap<String, RemoteValue> = HashMap::new();
        for (remote_field, local_column) in field_map {
            if local_column == "last_modified" {
                continue;
            }
            // A completion state travels as a dedicated action, never as
            // a field write.
            if let Some(spec) = completion {
                if local_column == spec.state_column {
                    continue;
                }
            }
            let kind = schema
                .get(remote_field)
                .map(|d| d.kind)
                .unwrap_or(FieldKind::Other);
            let local_value = row.get(local_column).cloned().unwrap_or(SqlValue::Null);
            let shaped = convert::to_remote(remote_field, &local_value, kind);
            let remote_value = current.get(remote_field).unwrap_or(&RemoteValue::Null);

            if should_push(&shaped, remote_value, local_stamp, remote_stamp) {
                changes.insert(remote_field.clone(), shaped);
            }
        }

        let mut wrote = false;
        if !changes.is_empty() {
            debug!(
                entity = entity.remote_name(),
                remote_id,
                fields = changes.len(),
                "Writing changed fields"
            );
            self.remote
                .write(entity.remote_name(), &[remote_id], &changes)
                .await?;
            wrote = true;
        }

        if let Some(spec) = completion {
            let locally_done = row
                .get(spec.state_column)
                .and_then(|v| v.as_str())
                .map(|s| s == spec.done_value)
                .unwrap_or(false);
            let remotely_done = current
                .get(spec.state_column)
                .and_then(|v| v.as_str())
                .map(|s| s == spec.done_value)
                .unwrap_or(false);
            if locally_done && !remotely_done {
                debug!(
                    entity = entity.remote_name(),
                    remote_id,
                    action = spec.remote_action,
                    "Completing remotely"
                );
                self.remote
                    .exec_action(entity.remote_name(), spec.remote_action, &[remote_id])
                    .await?;
                wrote = true;
            }
        }

        let observed_stamp = row.get("last_modified").cloned().unwrap_or(SqlValue::Null);
        self.clear_status(entity, local_id, observed, observed_stamp)
            .await?;
        Ok(if wrote { Pushed::Updated } else { Pushed::Unchanged })
    }

    async fn push_create(
        &self,
        entity: EntityKind,
        field_map: &FieldMap,
        schema: &RemoteSchema,
        row: &SqlRow,
        local_id: i64,
        observed: RecordStatus,
    ) -> Result<Pushed> {
        let mut payload: HashMap<String, RemoteValue> = HashMap::new();
        let completion = entity.completion();

        for (remote_field, local_column) in field_map {
            if local_column == "last_modified" {
                continue;
            }
            if let Some(spec) = completion {
                if local_column == spec.state_column {
                    continue;
                }
            }
            let local_value = row.get(local_column).cloned().unwrap_or(SqlValue::Null);
            if local_value.is_null() {
                continue;
            }
            let kind = schema
                .get(remote_field)
                .map(|d| d.kind)
                .unwrap_or(FieldKind::Other);
            let shaped = convert::to_remote(remote_field, &local_value, kind);
            if !shaped.is_null() {
                payload.insert(remote_field.clone(), shaped);
            }
        }

        if let Some(reference) = entity.reference() {
            let resolved = self.resolve_reference(entity, reference, row, local_id).await?;
            payload.insert(reference.remote_field.to_string(), RemoteValue::Int(resolved));
        }

        if let Some(range) = entity.date_range() {
            clamp_date_range(&mut payload, field_map, range.start_column, range.end_column);
        }

        let remote_id = self.remote.create(entity.remote_name(), &payload).await?;
        info!(
            entity = entity.remote_name(),
            local_id, remote_id, "Created remote record"
        );

        // The remote id is stored unconditionally; even a racing edit must
        // not leave the row looking never-synced. Only the status clear is
        // guarded.
        let sql = format!("UPDATE {} SET remote_id = ? WHERE id = ?", entity.table());
        self.store
            .execute(&sql, &[remote_id.into(), local_id.into()])
            .await?;

        // The completion action runs before the clear: a failed action
        // must leave the row dirty so the terminal state retries on the
        // next pass (the stored remote id routes it through an update).
        if let Some(spec) = completion {
            let locally_done = row
                .get(spec.state_column)
                .and_then(|v| v.as_str())
                .map(|s| s == spec.done_value)
                .unwrap_or(false);
            if locally_done {
                self.remote
                    .exec_action(entity.remote_name(), spec.remote_action, &[remote_id])
                    .await?;
            }
        }

        let observed_stamp = row.get("last_modified").cloned().unwrap_or(SqlValue::Null);
        self.clear_status(entity, local_id, observed, observed_stamp)
            .await?;

        Ok(Pushed::Created)
    }

    /// Resolve a name-keyed reference through the locally cached registry.
    async fn resolve_reference(
        &self,
        entity: EntityKind,
        reference: core_store::ReferenceSpec,
        row: &SqlRow,
        local_id: i64,
    ) -> Result<i64> {
        if let Some(id) = row.get(reference.id_column).and_then(|v| v.as_i64()) {
            if id > 0 {
                return Ok(id);
            }
        }

        let name = row
            .get(reference.name_column)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let sql = format!(
            "SELECT remote_id FROM {} WHERE account_id = ? AND name = ?",
            reference.registry_table,
        );
        let resolved = self
            .store
            .fetch_optional(&sql, &[self.account_id.into(), name.as_str().into()])
            .await?
            .and_then(|r| r.get("remote_id").and_then(|v| v.as_i64()));

        resolved.ok_or_else(|| SyncError::UnresolvedReference {
            entity: entity.remote_name().to_string(),
            local_id,
            registry: reference.registry_table.to_string(),
            name,
        })
    }

    /// Clear the status only if nothing touched the row since selection.
    /// A racing local edit bumps `last_modified` (and may re-set the same
    /// status value), so the reset matches both observed fields.
    async fn clear_status(
        &self,
        entity: EntityKind,
        local_id: i64,
        observed: RecordStatus,
        observed_stamp: SqlValue,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = ? WHERE id = ? AND status = ? AND last_modified IS ?",
            entity.table(),
        );
        let affected = self
            .store
            .execute(
                &sql,
                &[
                    RecordStatus::Clean.as_str().into(),
                    local_id.into(),
                    observed.as_str().into(),
                    observed_stamp,
                ],
            )
            .await?;
        if affected == 0 {
            debug!(
                entity = entity.remote_name(),
                local_id, "Status changed during upload, leaving mark in place"
            );
        }
        Ok(())
    }
}

enum Pushed {
    Created,
    Updated,
    Unchanged,
}

fn observed_status(row: &SqlRow) -> RecordStatus {
    row.get("status")
        .and_then(|v| v.as_str())
        .map(|s| RecordStatus::parse(s).unwrap_or(RecordStatus::Clean))
        .unwrap_or(RecordStatus::Clean)
}

/// Per-field push decision with record-level timestamps. Equal values
/// never push; a missing remote stamp pushes; a missing local stamp
/// skips; otherwise local wins on or after the remote stamp. Stamps that
/// do not parse push, the local edit is presumed intentional.
fn should_push(
    local: &RemoteValue,
    remote: &RemoteValue,
    local_stamp: Option<&str>,
    remote_stamp: Option<&str>,
) -> bool {
    if values_equal(local, remote) {
        return false;
    }
    let Some(remote_stamp) = remote_stamp.filter(|s| !s.trim().is_empty()) else {
        return true;
    };
    let Some(local_stamp) = local_stamp.filter(|s| !s.trim().is_empty()) else {
        return false;
    };
    match (
        convert::parse_timestamp(local_stamp),
        convert::parse_timestamp(remote_stamp),
    ) {
        (Some(local_dt), Some(remote_dt)) => local_dt >= remote_dt,
        _ => true,
    }
}

/// Value equality across wire shapes: a relation equals its bare id, id
/// lists compare as sets, and null equals false for the remote's habit of
/// sending `false` for empty fields.
fn values_equal(local: &RemoteValue, remote: &RemoteValue) -> bool {
    match (local, remote) {
        (RemoteValue::Int(a), RemoteValue::Relation(b, _))
        | (RemoteValue::Relation(a, _), RemoteValue::Int(b)) => a == b,
        (RemoteValue::IdList(a), RemoteValue::IdList(b)) => {
            let mut a = a.clone();
            let mut b = b.clone();
            a.sort_unstable();
            b.sort_unstable();
            a == b
        }
        (RemoteValue::Null, RemoteValue::Bool(false))
        | (RemoteValue::Bool(false), RemoteValue::Null) => true,
        (a, b) => a == b,
    }
}

/// An inverted range collapses to a zero-length one at `start`; an end
/// that does not parse is dropped rather than submitted.
fn clamp_date_range(
    payload: &mut HashMap<String, RemoteValue>,
    field_map: &FieldMap,
    start_column: &str,
    end_column: &str,
) {
    let remote_for = |column: &str| {
        field_map
            .iter()
            .find(|(_, local)| local == column)
            .map(|(remote, _)| remote.clone())
    };
    let (Some(start_field), Some(end_field)) = (remote_for(start_column), remote_for(end_column))
    else {
        return;
    };

    let start = payload
        .get(&start_field)
        .and_then(|v| v.as_str())
        .and_then(convert::parse_timestamp);
    let end_raw = payload.get(&end_field).and_then(|v| v.as_str()).map(String::from);

    match (start, end_raw) {
        (Some(start_dt), Some(end_raw)) => match convert::parse_timestamp(&end_raw) {
            Some(end_dt) if end_dt < start_dt => {
                warn!(start = %start_dt, end = %end_dt, "Inverted date range, clamping end to start");
                let start_value = payload.get(&start_field).cloned();
                if let Some(value) = start_value {
                    payload.insert(end_field, value);
                }
            }
            Some(_) => {}
            None => {
                warn!(end = %end_raw, "Unparseable range end, dropping");
                payload.remove(&end_field);
            }
        },
        _ => {}
    }
}
