//! Application state shared across handlers.

use crate::config::Config;
use crate::library::ContentStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Content store.
    pub store: Arc<ContentStore>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config, store: ContentStore) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
        }
    }
}
