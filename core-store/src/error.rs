use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database busy after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid record status: {0}")]
    InvalidStatus(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid setting value for {key}: {value}")]
    InvalidSetting { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
