use std::sync::Arc;

use quarry_config::AppConfig;
use quarry_db::UserStore;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<UserStore>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<UserStore>) -> Self {
        Self { config, store }
    }
}

pub type SharedState = Arc<AppState>;
