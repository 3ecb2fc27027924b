//! Per-record sync status lifecycle.
//!
//! Every cached record carries a status column describing what the next
//! upload pass owes the remote for it. The set of legal transitions is
//! closed; an attempt outside the table is a logic error surfaced as
//! [`StoreError::InvalidTransition`](crate::StoreError::InvalidTransition).

use crate::error::{Result, StoreError};
use std::fmt;
use std::str::FromStr;

/// What the local record owes the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    /// In sync with the remote; nothing to push.
    Clean,
    /// Locally modified; push a diff on the next upload pass.
    Updated,
    /// Created locally; has no remote id yet.
    Created,
    /// Deleted locally; remove the remote counterpart then the row.
    Deleted,
}

impl RecordStatus {
    /// Canonical storage form. `Clean` is stored as the empty string so
    /// freshly mirrored rows need no explicit status write.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Clean => "",
            RecordStatus::Updated => "updated",
            RecordStatus::Created => "created",
            RecordStatus::Deleted => "deleted",
        }
    }

    /// Lenient parser: empty, missing, or unrecognized-case values read
    /// back as their trimmed lowercase form, and blank means `Clean`.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "" => Ok(RecordStatus::Clean),
            "updated" => Ok(RecordStatus::Updated),
            "created" => Ok(RecordStatus::Created),
            "deleted" => Ok(RecordStatus::Deleted),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }

    /// Whether `self -> to` is a legal lifecycle step.
    ///
    /// A created record that is edited stays `Created` (it still needs a
    /// create, now with the newer values), and deleting one discards it
    /// entirely rather than tombstoning, so `Created -> Deleted` is legal
    /// only as the precursor to dropping the row.
    pub fn can_transition(&self, to: RecordStatus) -> bool {
        use RecordStatus::*;
        matches!(
            (self, to),
            (Clean, Updated)
                | (Clean, Deleted)
                | (Updated, Updated)
                | (Updated, Deleted)
                | (Updated, Clean)
                | (Created, Created)
                | (Created, Deleted)
                | (Created, Clean)
                | (Deleted, Deleted)
                | (Deleted, Clean)
                | (Clean, Clean)
        )
    }

    /// Validate and perform a transition.
    pub fn transition(&self, to: RecordStatus) -> Result<RecordStatus> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(StoreError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    /// Statuses whose records take part in an upload pass.
    pub fn needs_upload(&self) -> bool {
        !matches!(self, RecordStatus::Clean)
    }
}

impl Default for RecordStatus {
    fn default() -> Self {
        RecordStatus::Clean
    }
}

impl FromStr for RecordStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        RecordStatus::parse(s)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Clean => write!(f, "clean"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
