//! Replication task model.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tagindex_core::Digest;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle state of a stored task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    /// Fast retries were exhausted. Still retried at the slow interval
    /// until delivered, and rescheduled on recovery.
    Failed,
}

/// A request to push `tag -> digest` to `destination`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationTask {
    pub id: Uuid,
    pub tag: String,
    pub digest: Digest,
    /// Dependency digests, in the order the caller supplied them.
    pub dependencies: Vec<Digest>,
    /// Address of the remote tag index.
    pub destination: String,
    /// Time to wait after creation before the first attempt.
    pub delay_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "default_state")]
    pub state: TaskState,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn default_state() -> TaskState {
    TaskState::Pending
}

/// Identity used to collapse logically equal tasks. Delay is not part of it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub tag: String,
    pub digest: Digest,
    pub destination: String,
}

impl ReplicationTask {
    pub fn new(
        tag: impl Into<String>,
        digest: Digest,
        dependencies: Vec<Digest>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            digest,
            dependencies,
            destination: destination.into(),
            delay_ms: 0,
            created_at: OffsetDateTime::now_utc(),
            attempts: 0,
            state: TaskState::Pending,
            last_error: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            tag: self.tag.clone(),
            digest: self.digest.clone(),
            destination: self.destination.clone(),
        }
    }

    /// Delay still to be waited at `now`, measured from creation.
    pub fn remaining_delay(&self, now: OffsetDateTime) -> Duration {
        let elapsed = now - self.created_at;
        let elapsed = Duration::try_from(elapsed).unwrap_or(Duration::ZERO);
        self.delay().saturating_sub(elapsed)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.tag.is_empty() {
            return Err("empty tag".to_string());
        }
        if self.destination.trim().is_empty() {
            return Err(format!("empty destination for tag {}", self.tag));
        }
        Ok(())
    }
}
