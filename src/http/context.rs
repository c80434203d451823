//! Application state shared by every request handler.

use std::sync::Arc;

use crate::config::Config;
use crate::oauth::GrantCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Grant coordinator over the configured storage backend
    pub coordinator: Arc<GrantCoordinator>,
}

impl AppState {
    pub fn new(config: Arc<Config>, coordinator: Arc<GrantCoordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }
}
