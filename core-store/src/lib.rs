//! # Local Cache Store
//!
//! Owns the local SQLite cache of remote business records and provides the
//! serialized access layer every other module goes through.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling, schema and migrations
//! - The serialized, retrying statement executor ([`Store`])
//! - The per-entity-type registry ([`EntityKind`]) driving the sync engine
//! - Record status tags and their legal transitions ([`RecordStatus`])
//! - Accounts, settings, and persisted notification records

pub mod accounts;
pub mod db;
pub mod entity;
pub mod error;
pub mod notifications;
pub mod settings;
pub mod status;
pub mod store;
pub mod value;

pub use accounts::{list_accounts, Account};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use entity::{
    AssignmentSpec, CompletionSpec, DateRangeSpec, EntityKind, ReferenceSpec,
};
pub use error::{Result, StoreError};
pub use notifications::{Notification, NotificationStore, SyncReport};
pub use settings::{Settings, SyncDirection, SyncSettings};
pub use status::RecordStatus;
pub use store::{Store, StoreConfig};
pub use value::{SqlRow, SqlValue};
