//! # Sync Engine
//!
//! Bidirectional synchronization between a remote record server and the
//! local SQLite cache.
//!
//! ## Overview
//!
//! This module manages the full sync cycle, including:
//! - Resolving remote-field → local-column maps against the live schema
//! - Downloading remote records with timestamp-gated overwrites
//! - Uploading local creations, edits, and deletions
//! - Detecting newly assigned records via snapshot set difference
//! - Emitting lifecycle events and persisting notifications
//!
//! ## Components
//!
//! - **Field Map** (`field_map`): Configurable field mapping validated per sync
//! - **Converters** (`convert`): Wire-shape ↔ column-shape value translation
//! - **Download** (`download`): Remote → local mirror with orphan sweep
//! - **Upload** (`upload`): Local → remote diffs, creates, and deletions
//! - **Assignment** (`assignment`): Snapshot/diff detection of new assignments
//! - **Orchestrator** (`orchestrator`): Per-account cycle with overlap guard

pub mod assignment;
pub mod convert;
pub mod download;
pub mod error;
pub mod events;
pub mod field_map;
pub mod orchestrator;
pub mod upload;

pub use assignment::{AssignmentSnapshot, NewAssignment};
pub use download::{DownloadReport, DownloadStats, DownloadSync};
pub use error::{Result, SyncError};
pub use events::{EventBus, SyncEvent};
pub use field_map::{FieldConfig, FieldMap};
pub use orchestrator::{
    RemoteConnector, RpcConnector, SyncGuard, SyncOrchestrator, SyncOutcome, SyncPermit,
};
pub use upload::{UploadReport, UploadStats, UploadSync};
