use core_remote::RemoteError;
use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress")]
    SyncInProgress,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unresolved reference for {entity} record {local_id}: no {registry} entry named {name:?}")]
    UnresolvedReference {
        entity: String,
        local_id: i64,
        registry: String,
        name: String,
    },

    #[error("Deletion pass aborted for {entity}: {source}")]
    DeletionAborted {
        entity: String,
        #[source]
        source: RemoteError,
    },

    #[error("Invalid field configuration: {0}")]
    InvalidFieldConfig(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
