//! Declarative registry of the synchronized entities.
//!
//! The engine is data-driven: everything entity-specific (table names,
//! sync participation, protected columns, reference resolution, completion
//! actions, assignment lookup) lives here as static descriptors, so the
//! download and upload passes contain no per-entity branching.

/// A date-range column pair clamped before submission. An inverted range
/// (end before start) is corrected to a zero-length range at `start`.
#[derive(Debug, Clone, Copy)]
pub struct DateRangeSpec {
    pub start_column: &'static str,
    pub end_column: &'static str,
}

/// A name-keyed foreign reference resolved through a locally cached
/// registry table before a remote create.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSpec {
    /// Local column holding the human-readable name.
    pub name_column: &'static str,
    /// Local column receiving the resolved remote id.
    pub id_column: &'static str,
    /// Registry table mapping names to remote ids.
    pub registry_table: &'static str,
    /// Remote field the resolved id is submitted as.
    pub remote_field: &'static str,
}

/// A local terminal workflow state that maps to a dedicated remote action
/// rather than a field write.
#[derive(Debug, Clone, Copy)]
pub struct CompletionSpec {
    pub state_column: &'static str,
    pub done_value: &'static str,
    pub remote_action: &'static str,
}

/// How records of an entity are attributed to a user.
#[derive(Debug, Clone, Copy)]
pub enum AssignmentSpec {
    /// A single user id column.
    Scalar { column: &'static str },
    /// A comma-separated list of user ids.
    CsvList { column: &'static str },
}

/// One synchronized entity and its per-entity behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Task,
    TimeEntry,
    Activity,
    ActivityType,
    User,
}

impl EntityKind {
    /// Download order. Registries (activity types, users) come first so
    /// reference and assignment lookups resolve within the same cycle.
    pub const DOWNLOADS: &'static [EntityKind] = &[
        EntityKind::ActivityType,
        EntityKind::User,
        EntityKind::Project,
        EntityKind::Task,
        EntityKind::TimeEntry,
        EntityKind::Activity,
    ];

    /// Upload order. Parents before children so created projects exist
    /// before the tasks that point at them.
    pub const UPLOADS: &'static [EntityKind] = &[
        EntityKind::Project,
        EntityKind::Task,
        EntityKind::TimeEntry,
        EntityKind::Activity,
    ];

    /// Local cache table.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Task => "tasks",
            EntityKind::TimeEntry => "time_entries",
            EntityKind::Activity => "activities",
            EntityKind::ActivityType => "activity_types",
            EntityKind::User => "users",
        }
    }

    /// Entity name on the remote server.
    pub fn remote_name(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::TimeEntry => "timesheet",
            EntityKind::Activity => "activity",
            EntityKind::ActivityType => "activity.type",
            EntityKind::User => "user",
        }
    }

    /// Column holding the record's human-readable title.
    pub fn title_column(&self) -> &'static str {
        match self {
            EntityKind::Activity => "summary",
            _ => "name",
        }
    }

    /// Whether failures on this entity surface as user notifications.
    /// Registry entities sync silently in the background.
    pub fn user_facing(&self) -> bool {
        !matches!(self, EntityKind::ActivityType | EntityKind::User)
    }

    /// Whether the table carries a `last_modified` drift stamp. Tables
    /// without one take the unconditional-overwrite download path and
    /// never upload.
    pub fn tracks_modification(&self) -> bool {
        !matches!(self, EntityKind::ActivityType | EntityKind::User)
    }

    /// Columns a download must not overwrite while the local row is dirty.
    pub fn protected_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Project => &["favorites"],
            EntityKind::Task => &["favorites", "state"],
            _ => &[],
        }
    }

    /// SQL predicate keeping terminal-state rows out of the orphan sweep,
    /// if any. Completed work stays visible locally even after the remote
    /// archives it.
    pub fn sweep_retain_predicate(&self) -> Option<&'static str> {
        match self {
            EntityKind::Task => Some("state = 'done'"),
            _ => None,
        }
    }

    pub fn date_range(&self) -> Option<DateRangeSpec> {
        match self {
            EntityKind::Task => Some(DateRangeSpec {
                start_column: "start_date",
                end_column: "end_date",
            }),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<ReferenceSpec> {
        match self {
            EntityKind::Activity => Some(ReferenceSpec {
                name_column: "activity_type_name",
                id_column: "activity_type_id",
                registry_table: "activity_types",
                remote_field: "activity_type_id",
            }),
            _ => None,
        }
    }

    pub fn completion(&self) -> Option<CompletionSpec> {
        match self {
            EntityKind::Activity => Some(CompletionSpec {
                state_column: "state",
                done_value: "done",
                remote_action: "action_done",
            }),
            _ => None,
        }
    }

    pub fn assignment(&self) -> Option<AssignmentSpec> {
        match self {
            EntityKind::Task => Some(AssignmentSpec::CsvList {
                column: "assignee_ids",
            }),
            EntityKind::Activity => Some(AssignmentSpec::Scalar { column: "user_id" }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_download_first() {
        let types_pos = EntityKind::DOWNLOADS
            .iter()
            .position(|e| *e == EntityKind::ActivityType)
            .unwrap();
        let activity_pos = EntityKind::DOWNLOADS
            .iter()
            .position(|e| *e == EntityKind::Activity)
            .unwrap();
        assert!(types_pos < activity_pos);
    }

    #[test]
    fn registry_entities_never_upload() {
        assert!(!EntityKind::UPLOADS.contains(&EntityKind::ActivityType));
        assert!(!EntityKind::UPLOADS.contains(&EntityKind::User));
    }

    #[test]
    fn upload_entities_track_modification() {
        for entity in EntityKind::UPLOADS {
            assert!(entity.tracks_modification(), "{entity:?}");
        }
    }

    #[test]
    fn activity_carries_reference_and_completion() {
        let reference = EntityKind::Activity.reference().unwrap();
        assert_eq!(reference.registry_table, "activity_types");
        let completion = EntityKind::Activity.completion().unwrap();
        assert_eq!(completion.remote_action, "action_done");
    }
}
