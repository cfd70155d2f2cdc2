//! Persistence for replication tasks.

use super::error::ReplicationResult;
use super::task::{ReplicationTask, TaskState};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Durable record of replication tasks.
///
/// A task is saved before it is scheduled and removed only once it succeeds,
/// so whatever [`outstanding`](TaskStore::outstanding) returns after a restart
/// still has to run.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Insert or replace a task.
    async fn save(&self, task: &ReplicationTask) -> ReplicationResult<()>;

    /// Forget a task. Removing an unknown id is not an error.
    async fn remove(&self, id: Uuid) -> ReplicationResult<()>;

    /// Record that a task used up its fast retries.
    async fn mark_failed(&self, id: Uuid, error: &str) -> ReplicationResult<()>;

    /// Every undelivered task, failed ones included, oldest first.
    async fn outstanding(&self) -> ReplicationResult<Vec<ReplicationTask>>;
}

fn oldest_first(mut tasks: Vec<ReplicationTask>) -> Vec<ReplicationTask> {
    tasks.sort_by_key(|t| t.created_at);
    tasks
}

/// In-memory task store. Tasks do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<Uuid, ReplicationTask>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a task by id, in any state.
    pub fn get(&self, id: Uuid) -> Option<ReplicationTask> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &ReplicationTask) -> ReplicationResult<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> ReplicationResult<()> {
        self.tasks.remove(&id);
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> ReplicationResult<()> {
        if let Some(mut task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Failed;
            task.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn outstanding(&self) -> ReplicationResult<Vec<ReplicationTask>> {
        let tasks = self.tasks.iter().map(|t| t.clone()).collect();
        Ok(oldest_first(tasks))
    }
}

/// Task store backed by a single JSON file.
///
/// Every mutation rewrites the file through a temp file, fsync and rename,
/// so a crash leaves either the old or the new document.
pub struct FileTaskStore {
    path: PathBuf,
    tasks: Mutex<BTreeMap<Uuid, ReplicationTask>>,
}

impl FileTaskStore {
    /// Open the store at `path`, loading existing tasks if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> ReplicationResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let tasks = match fs::read(&path).await {
            Ok(data) if data.is_empty() => BTreeMap::new(),
            Ok(data) => {
                let list: Vec<ReplicationTask> = serde_json::from_slice(&data)?;
                list.into_iter().map(|t| (t.id, t)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), tasks = tasks.len(), "Opened task store");
        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, tasks: &BTreeMap<Uuid, ReplicationTask>) -> ReplicationResult<()> {
        let list: Vec<&ReplicationTask> = tasks.values().collect();
        let data = serde_json::to_vec_pretty(&list)?;

        let temp_path = self.path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task: &ReplicationTask) -> ReplicationResult<()> {
        let mut tasks = self.tasks.lock().await;
        let previous = tasks.insert(task.id, task.clone());
        if let Err(e) = self.persist(&tasks).await {
            match previous {
                Some(previous) => tasks.insert(task.id, previous),
                None => tasks.remove(&task.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> ReplicationResult<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.remove(&id).is_some() {
            self.persist(&tasks).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> ReplicationResult<()> {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.state = TaskState::Failed;
            task.last_error = Some(error.to_string());
            self.persist(&tasks).await?;
        }
        Ok(())
    }

    async fn outstanding(&self) -> ReplicationResult<Vec<ReplicationTask>> {
        let tasks = self.tasks.lock().await;
        Ok(oldest_first(tasks.values().cloned().collect()))
    }
}

impl std::fmt::Debug for FileTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTaskStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
