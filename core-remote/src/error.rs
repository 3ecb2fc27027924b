use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Authentication failed for {login} on database {database}")]
    Auth { login: String, database: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote server fault: {message}")]
    Remote { message: String },
}

impl RemoteError {
    /// Whether this error means the target record no longer exists on the
    /// server. Deleting such a record is treated as success by the upload
    /// synchronizer, since the outcome matches intent.
    pub fn is_missing_record(&self) -> bool {
        match self {
            RemoteError::Remote { message } => {
                let msg = message.to_lowercase();
                msg.contains("does not exist") || msg.contains("has been deleted")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_record_detection() {
        let gone = RemoteError::Remote {
            message: "Record does not exist or has been deleted".to_string(),
        };
        assert!(gone.is_missing_record());

        let other = RemoteError::Remote {
            message: "Access denied".to_string(),
        };
        assert!(!other.is_missing_record());

        let transport = RemoteError::Transport("connection refused".to_string());
        assert!(!transport.is_missing_record());
    }
}
