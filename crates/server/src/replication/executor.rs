//! Task execution against remote tag indexes.

use super::error::{ReplicationError, ReplicationResult};
use super::task::ReplicationTask;
use async_trait::async_trait;
use std::sync::Arc;
use tagindex_client::{ClientError, TagClientProvider};

/// Runs a single attempt of a replication task.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, task: &ReplicationTask) -> ReplicationResult<()>;
}

/// Pushes tags to the remote tag index named by the task destination.
///
/// The remote is queried first; a remote that already binds the tag to the
/// same digest is left alone, which keeps staggered duplicates cheap.
pub struct RemoteExecutor {
    remotes: Arc<dyn TagClientProvider>,
}

impl RemoteExecutor {
    pub fn new(remotes: Arc<dyn TagClientProvider>) -> Self {
        Self { remotes }
    }
}

fn remote_error(task: &ReplicationTask, source: ClientError) -> ReplicationError {
    ReplicationError::Remote {
        destination: task.destination.clone(),
        source,
    }
}

#[async_trait]
impl Executor for RemoteExecutor {
    async fn execute(&self, task: &ReplicationTask) -> ReplicationResult<()> {
        let client = self
            .remotes
            .provide(&task.destination)
            .map_err(|e| remote_error(task, e))?;

        match client.get(&task.tag).await {
            Ok(existing) if existing == task.digest => {
                tracing::debug!(
                    tag = %task.tag,
                    remote = %task.destination,
                    "Remote already has tag, skipping"
                );
                return Ok(());
            }
            Ok(existing) => {
                tracing::info!(
                    tag = %task.tag,
                    remote = %task.destination,
                    existing = %existing,
                    digest = %task.digest,
                    "Overwriting remote tag"
                );
            }
            Err(ClientError::NotFound) => {}
            Err(e) => return Err(remote_error(task, e)),
        }

        client
            .put(&task.tag, &task.digest)
            .await
            .map_err(|e| remote_error(task, e))?;
        tracing::info!(
            tag = %task.tag,
            remote = %task.destination,
            dependencies = task.dependencies.len(),
            "Replicated tag"
        );
        Ok(())
    }
}
