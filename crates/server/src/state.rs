//! Application state shared across handlers.

use crate::service::TagService;
use std::sync::Arc;
use tagindex_core::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tags: Arc<TagService>,
}

impl AppState {
    pub fn new(config: AppConfig, tags: TagService) -> Self {
        Self {
            config: Arc::new(config),
            tags: Arc::new(tags),
        }
    }
}
