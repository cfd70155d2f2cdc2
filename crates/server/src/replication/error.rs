//! Replication error types.

use tagindex_client::ClientError;
use thiserror::Error;

/// Errors raised while submitting or executing replication tasks.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The manager has been shut down and accepts no new tasks.
    #[error("replication queue is closed")]
    Closed,

    #[error("invalid replication task: {0}")]
    InvalidTask(String),

    #[error("task store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The destination rejected or could not be reached for a task.
    #[error("remote {destination}: {source}")]
    Remote {
        destination: String,
        #[source]
        source: ClientError,
    },
}

pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
