//! The client trait the sync engine programs against.
//!
//! Calls are synchronous from the engine's point of view: one request, one
//! response, no per-call timeout enforced here. A hung call stalls the
//! current entity type's sync but cannot corrupt local state.

use crate::error::Result;
use crate::types::{RemoteRecord, RemoteSchema, RemoteValue};
use async_trait::async_trait;
use std::collections::HashMap;

/// A single search criterion: `(field, operator, value)`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: String,
    pub value: RemoteValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: RemoteValue) -> Self {
        Self {
            field: field.into(),
            op: "=".to_string(),
            value,
        }
    }
}

/// Access to one remote record server.
///
/// Implementations carry their own credentials and pass them with every
/// call. All methods take the remote entity name (e.g. `"task"`).
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Return the ids of all records matching `domain` (empty domain
    /// matches everything).
    async fn search(&self, entity: &str, domain: &[Filter]) -> Result<Vec<i64>>;

    /// Fetch all records with the given fields in one round trip.
    async fn search_read(&self, entity: &str, fields: &[String]) -> Result<Vec<RemoteRecord>>;

    /// Read the given fields of the given records.
    async fn read(&self, entity: &str, ids: &[i64], fields: &[String])
        -> Result<Vec<RemoteRecord>>;

    /// Introspect the entity's schema.
    async fn fields_get(&self, entity: &str) -> Result<RemoteSchema>;

    /// Create a record, returning its server-assigned id.
    async fn create(&self, entity: &str, values: &HashMap<String, RemoteValue>) -> Result<i64>;

    /// Partial update: only the supplied fields are written.
    async fn write(
        &self,
        entity: &str,
        ids: &[i64],
        values: &HashMap<String, RemoteValue>,
    ) -> Result<()>;

    /// Delete records.
    async fn unlink(&self, entity: &str, ids: &[i64]) -> Result<()>;

    /// Invoke a named server-side action (e.g. a "mark complete" action)
    /// on the given records.
    async fn exec_action(&self, entity: &str, action: &str, ids: &[i64]) -> Result<()>;
}
