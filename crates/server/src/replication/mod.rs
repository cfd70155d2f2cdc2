//! Asynchronous replication of tags to remote tag indexes.
//!
//! Handlers only ever see [`TaskManager::add`]; everything after submission
//! (delays, retries, persistence) belongs to [`ReplicationManager`].

pub mod backoff;
pub mod error;
pub mod executor;
pub mod manager;
pub mod store;
pub mod task;

pub use error::{ReplicationError, ReplicationResult};
pub use executor::{Executor, RemoteExecutor};
pub use manager::{ManagerSettings, ReplicationManager, TaskManager};
pub use store::{FileTaskStore, MemoryTaskStore, TaskStore};
pub use task::{ReplicationTask, TaskKey, TaskState};
