//! # Assignment Snapshot
//!
//! Detects records newly assigned to the account's user by comparing the
//! set of assigned remote ids before and after a cycle. Set difference,
//! not timestamps: a record assigned long ago but only now downloaded
//! still counts as new here, and a re-download of an already-seen
//! assignment does not.

use crate::error::Result;
use core_store::{AssignmentSpec, EntityKind, Store};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-entity set of remote ids assigned to one user, with display titles
/// for notification text.
#[derive(Debug, Clone, Default)]
pub struct AssignmentSnapshot {
    assigned: HashMap<EntityKind, HashMap<i64, String>>,
}

/// One newly assigned record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub entity: EntityKind,
    pub remote_id: i64,
    pub title: String,
}

impl AssignmentSnapshot {
    /// Capture the current assignment sets for `user_remote_id`. Only
    /// rows that already have a remote id participate; a locally created
    /// record is the user's own doing, not an incoming assignment.
    pub async fn capture(store: &Store, account_id: i64, user_remote_id: i64) -> Result<Self> {
        let mut assigned = HashMap::new();

        for entity in EntityKind::DOWNLOADS {
            let Some(spec) = entity.assignment() else {
                continue;
            };
            let column = match spec {
                AssignmentSpec::Scalar { column } | AssignmentSpec::CsvList { column } => column,
            };
            let title_column = entity.title_column();
            let sql = format!(
                "SELECT remote_id, {column}, {title_column} AS title FROM {table} \
                 WHERE account_id = ? AND remote_id IS NOT NULL",
                table = entity.table(),
            );
            let rows = store.fetch(&sql, &[account_id.into()]).await?;

            let mut ids: HashMap<i64, String> = HashMap::new();
            for row in &rows {
                let Some(remote_id) = row.get("remote_id").and_then(|v| v.as_i64()) else {
                    continue;
                };
                let is_assigned = match (&spec, row.get(column)) {
                    (AssignmentSpec::Scalar { .. }, Some(value)) => {
                        value.as_i64() == Some(user_remote_id)
                    }
                    (AssignmentSpec::CsvList { .. }, Some(value)) => value
                        .as_str()
                        .map(crate::convert::parse_id_list)
                        .map(|list| list.contains(&user_remote_id))
                        .unwrap_or(false),
                    _ => false,
                };
                if is_assigned {
                    let title = row
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    ids.insert(remote_id, title);
                }
            }
            debug!(
                entity = entity.remote_name(),
                assigned = ids.len(),
                "Captured assignment set"
            );
            assigned.insert(*entity, ids);
        }

        Ok(Self { assigned })
    }

    /// Remote ids for one entity, for direct set queries.
    pub fn ids(&self, entity: EntityKind) -> HashSet<i64> {
        self.assigned
            .get(&entity)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Records present in `after` but not in `self`.
    pub fn diff<'a>(&self, after: &'a AssignmentSnapshot) -> Vec<NewAssignment> {
        let mut new = Vec::new();
        for (entity, ids_after) in &after.assigned {
            let before = self.assigned.get(entity);
            for (remote_id, title) in ids_after {
                let seen = before.map(|m| m.contains_key(remote_id)).unwrap_or(false);
                if !seen {
                    new.push(NewAssignment {
                        entity: *entity,
                        remote_id: *remote_id,
                        title: title.clone(),
                    });
                }
            }
        }
        new.sort_by_key(|a| (a.entity.table(), a.remote_id));
        new
    }
}
