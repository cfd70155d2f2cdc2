//! HTTP tag index server.
//!
//! This crate provides:
//! - Tag put/get with a single-flight read-through cache
//! - Namespace routing to storage backends and remotes
//! - Replication to remote indexes with staggered duplicates on local replicas
//! - The asynchronous, persisted replication queue

pub mod cache;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod remotes;
pub mod replication;
pub mod routes;
pub mod service;
pub mod singleflight;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use service::TagService;
pub use state::AppState;
