//! Replication task queue.

use super::backoff::Backoff;
use super::error::{ReplicationError, ReplicationResult};
use super::executor::Executor;
use super::store::TaskStore;
use super::task::{ReplicationTask, TaskKey, TaskState};
use crate::metrics;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tagindex_core::config::ReplicationConfig;
use time::OffsetDateTime;
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

/// Accepts replication tasks for asynchronous, retried delivery.
#[async_trait]
pub trait TaskManager: Send + Sync + 'static {
    /// Submit a task.
    ///
    /// Returns once the task is durably accepted, never after it runs.
    /// Submitting a task equal (by [`TaskKey`]) to one still pending is a
    /// successful no-op.
    async fn add(&self, task: ReplicationTask) -> ReplicationResult<()>;
}

/// Queue tuning, taken from the `replication` config section.
#[derive(Clone, Copy, Debug)]
pub struct ManagerSettings {
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Interval between attempts once `max_retries` is used up.
    pub failed_retry_ms: u64,
}

impl From<&ReplicationConfig> for ManagerSettings {
    fn from(config: &ReplicationConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
            retry_max_ms: config.retry_max_ms,
            failed_retry_ms: config.failed_retry_interval_secs.saturating_mul(1000),
        }
    }
}

struct Inner {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn Executor>,
    settings: ManagerSettings,
    backoff: Backoff,
    workers: Semaphore,
    /// Dedup keys of tasks that are stored and not yet finished.
    pending: DashMap<TaskKey, Uuid>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// [`TaskManager`] that persists tasks to a [`TaskStore`] and runs each one
/// on its own tokio task, bounded by a worker semaphore.
#[derive(Clone)]
pub struct ReplicationManager {
    inner: Arc<Inner>,
}

impl ReplicationManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn Executor>,
        settings: ManagerSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                backoff: Backoff::new(settings.retry_base_ms, settings.retry_max_ms),
                workers: Semaphore::new(settings.max_workers.max(1)),
                settings,
                pending: DashMap::new(),
                closed: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Reschedule tasks left in the store by a previous run, failed ones
    /// included.
    ///
    /// Delays are measured from each task's creation time, so a task whose
    /// delay already elapsed runs immediately.
    pub async fn recover(&self) -> ReplicationResult<usize> {
        let tasks = self.inner.store.outstanding().await?;
        let mut scheduled = 0;
        for task in tasks {
            let fresh = match self.inner.pending.entry(task.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(task.id);
                    true
                }
                Entry::Occupied(_) => false,
            };
            if fresh {
                self.spawn(task);
                scheduled += 1;
            } else {
                // Same key already scheduled
                self.inner.store.remove(task.id).await?;
            }
        }
        metrics::REPLICATION_TASKS_PENDING.set(self.inner.pending.len() as i64);
        Ok(scheduled)
    }

    /// Stop accepting tasks and stop scheduled tasks at their next wait.
    ///
    /// Unfinished tasks stay in the store for [`recover`](Self::recover).
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.shutdown.send_replace(true);
    }

    /// Number of tasks accepted and not yet finished.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    fn spawn(&self, task: ReplicationTask) {
        let inner = self.inner.clone();
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(run_task(inner, task, shutdown));
    }
}

#[async_trait]
impl TaskManager for ReplicationManager {
    async fn add(&self, task: ReplicationTask) -> ReplicationResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ReplicationError::Closed);
        }
        task.validate().map_err(ReplicationError::InvalidTask)?;

        let key = task.key();
        match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(_) => {
                metrics::REPLICATION_TASKS_DEDUPLICATED.inc();
                tracing::debug!(
                    tag = %task.tag,
                    remote = %task.destination,
                    "Replication task already pending"
                );
                return Ok(());
            }
            Entry::Vacant(slot) => {
                slot.insert(task.id);
            }
        }

        if let Err(e) = self.inner.store.save(&task).await {
            self.inner.pending.remove(&key);
            return Err(e);
        }

        metrics::REPLICATION_TASKS_ADDED.inc();
        metrics::REPLICATION_TASKS_PENDING.set(self.inner.pending.len() as i64);
        tracing::debug!(
            tag = %task.tag,
            remote = %task.destination,
            delay_ms = task.delay_ms,
            "Replication task added"
        );
        self.spawn(task);
        Ok(())
    }
}

/// Resolves when shutdown is signalled or the manager is dropped.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn run_task(
    inner: Arc<Inner>,
    mut task: ReplicationTask,
    mut shutdown: watch::Receiver<bool>,
) {
    let delay = task.remaining_delay(OffsetDateTime::now_utc());
    if !delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stopped(&mut shutdown) => return,
        }
    }

    loop {
        let permit = tokio::select! {
            permit = inner.workers.acquire() => permit,
            _ = stopped(&mut shutdown) => return,
        };
        let Ok(permit) = permit else {
            return;
        };

        task.attempts = task.attempts.saturating_add(1);
        let result = inner.executor.execute(&task).await;
        drop(permit);

        let error = match result {
            Ok(()) => {
                finish(&inner, &task).await;
                metrics::REPLICATION_TASKS_SUCCEEDED.inc();
                return;
            }
            Err(e) => e.to_string(),
        };

        let wait = if task.attempts > inner.settings.max_retries {
            if task.state != TaskState::Failed {
                tracing::error!(
                    tag = %task.tag,
                    remote = %task.destination,
                    attempts = task.attempts,
                    retry_in_ms = inner.settings.failed_retry_ms,
                    error = %error,
                    "Replication task exhausted retries"
                );
                task.state = TaskState::Failed;
                if let Err(e) = inner.store.mark_failed(task.id, &error).await {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to mark task as failed");
                }
                metrics::REPLICATION_TASKS_FAILED.inc();
            } else {
                tracing::warn!(
                    tag = %task.tag,
                    remote = %task.destination,
                    attempt = task.attempts,
                    error = %error,
                    "Failed replication task still undeliverable"
                );
            }
            Duration::from_millis(inner.settings.failed_retry_ms)
        } else {
            let wait = inner.backoff.delay(task.attempts);
            metrics::REPLICATION_TASK_RETRIES.inc();
            tracing::warn!(
                tag = %task.tag,
                remote = %task.destination,
                attempt = task.attempts,
                retry_in_ms = wait.as_millis() as u64,
                error = %error,
                "Replication attempt failed"
            );
            wait
        };
        task.last_error = Some(error);
        if let Err(e) = inner.store.save(&task).await {
            tracing::warn!(task_id = %task.id, error = %e, "Failed to record task attempt");
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stopped(&mut shutdown) => return,
        }
    }
}

async fn finish(inner: &Inner, task: &ReplicationTask) {
    if let Err(e) = inner.store.remove(task.id).await {
        tracing::warn!(task_id = %task.id, error = %e, "Failed to remove finished task");
    }
    release(inner, task);
    tracing::debug!(tag = %task.tag, remote = %task.destination, "Replication task done");
}

fn release(inner: &Inner, task: &ReplicationTask) {
    inner
        .pending
        .remove_if(&task.key(), |_, id| *id == task.id);
    metrics::REPLICATION_TASKS_PENDING.set(inner.pending.len() as i64);
}
