//! # Field Mapping Resolver
//!
//! Maps remote entity fields onto local cache columns.
//!
//! ## Overview
//!
//! The engine never hard-codes field lists: each entity's remote-field →
//! local-column map comes from a [`FieldConfig`], either the built-in
//! default or a JSON document with the same shape. Before each sync the
//! map is validated against the remote schema; fields the server does not
//! expose are dropped with a warning so a server running a different
//! edition degrades gracefully instead of failing the cycle. An entity
//! with no map at all simply syncs nothing.

use crate::error::{Result, SyncError};
use core_remote::RemoteSchema;
use core_store::EntityKind;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One entity's remote-field → local-column pairs, in declaration order.
pub type FieldMap = Vec<(String, String)>;

/// Remote-field → local-column maps for all entities.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct FieldConfig {
    entities: HashMap<String, HashMap<String, String>>,
}

impl FieldConfig {
    /// The default mapping shipped with the engine.
    pub fn builtin() -> Self {
        let mut entities = HashMap::new();

        entities.insert(
            "project".to_string(),
            map(&[
                ("name", "name"),
                ("parent_id", "parent_id"),
                ("planned_start_date", "planned_start_date"),
                ("planned_end_date", "planned_end_date"),
                ("allocated_hours", "allocated_hours"),
                ("favorite", "favorites"),
                ("description", "description"),
                ("last_update_status", "last_update_status"),
                ("write_date", "last_modified"),
            ]),
        );
        entities.insert(
            "task".to_string(),
            map(&[
                ("name", "name"),
                ("project_id", "project_id"),
                ("parent_id", "parent_id"),
                ("user_ids", "assignee_ids"),
                ("planned_date_begin", "start_date"),
                ("date_end", "end_date"),
                ("date_deadline", "deadline"),
                ("allocated_hours", "initial_planned_hours"),
                ("favorite", "favorites"),
                ("state", "state"),
                ("description", "description"),
                ("write_date", "last_modified"),
            ]),
        );
        entities.insert(
            "timesheet".to_string(),
            map(&[
                ("name", "name"),
                ("project_id", "project_id"),
                ("task_id", "task_id"),
                ("unit_amount", "unit_amount"),
                ("date", "entry_date"),
                ("write_date", "last_modified"),
            ]),
        );
        entities.insert(
            "activity".to_string(),
            map(&[
                ("activity_type_id", "activity_type_id"),
                ("summary", "summary"),
                ("user_id", "user_id"),
                ("date_deadline", "due_date"),
                ("note", "notes"),
                ("state", "state"),
                ("write_date", "last_modified"),
            ]),
        );
        entities.insert("activity.type".to_string(), map(&[("name", "name")]));
        entities.insert(
            "user".to_string(),
            map(&[("name", "name"), ("login", "login"), ("email", "email")]),
        );

        Self { entities }
    }

    /// Parse a JSON mapping document, the same shape as the built-in one:
    /// `{ "entity": { "remote_field": "local_column", ... }, ... }`.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::InvalidFieldConfig(e.to_string()))
    }

    /// The raw map for an entity, if one is configured.
    pub fn fields_for(&self, entity: EntityKind) -> Option<&HashMap<String, String>> {
        self.entities.get(entity.remote_name())
    }

    /// Resolve the entity's map against the remote schema. Remote fields
    /// the schema lacks are dropped with a warning. An entity with no map
    /// at all has nothing to sync and yields an empty map, same as an
    /// entity whose fields all dropped; the caller skips empty maps.
    pub fn resolve(&self, entity: EntityKind, schema: &RemoteSchema) -> FieldMap {
        let Some(configured) = self.fields_for(entity) else {
            debug!(
                entity = entity.remote_name(),
                "No field mapping configured, nothing to sync"
            );
            return FieldMap::new();
        };

        let mut resolved: FieldMap = Vec::with_capacity(configured.len());
        for (remote_field, local_column) in configured {
            if schema.contains_key(remote_field) {
                resolved.push((remote_field.clone(), local_column.clone()));
            } else {
                warn!(
                    entity = entity.remote_name(),
                    field = %remote_field,
                    "Remote schema does not expose mapped field, dropping"
                );
            }
        }
        resolved.sort();
        debug!(
            entity = entity.remote_name(),
            fields = resolved.len(),
            "Resolved field map"
        );
        resolved
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(r, l)| (r.to_string(), l.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_remote::{FieldDescriptor, FieldKind};

    fn schema_of(fields: &[&str]) -> RemoteSchema {
        fields
            .iter()
            .map(|f| (f.to_string(), FieldDescriptor { kind: FieldKind::Text }))
            .collect()
    }

    #[test]
    fn builtin_covers_all_synced_entities() {
        let config = FieldConfig::builtin();
        for entity in EntityKind::DOWNLOADS {
            assert!(config.fields_for(*entity).is_some(), "{entity:?}");
        }
    }

    #[test]
    fn missing_remote_fields_are_dropped() {
        let config = FieldConfig::builtin();
        let schema = schema_of(&["name", "login"]);
        let resolved = config.resolve(EntityKind::User, &schema);
        assert_eq!(resolved.len(), 2);
        assert!(!resolved.iter().any(|(r, _)| r == "email"));
    }

    #[test]
    fn unmapped_entity_resolves_to_nothing() {
        let config = FieldConfig::from_json("{}").unwrap();
        let resolved = config.resolve(EntityKind::Project, &schema_of(&["name"]));
        assert!(resolved.is_empty());
    }

    #[test]
    fn json_config_overrides_builtin() {
        let config = FieldConfig::from_json(r#"{"user": {"name": "name"}}"#).unwrap();
        let resolved = config.resolve(EntityKind::User, &schema_of(&["name", "login"]));
        assert_eq!(resolved, vec![("name".to_string(), "name".to_string())]);
    }
}
