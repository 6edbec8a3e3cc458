use std::path::PathBuf;
use std::sync::Arc;

use quarry_common::{Error, Result};
use quarry_config::AppConfig;
use quarry_db::UserStore;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// The main gateway server: runs pending schema migrations, then binds to a
/// port and serves the user API.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);

        // Opening the store applies migrations. Any failure here is fatal;
        // the gateway must not accept traffic against an unverified schema.
        let store = self.open_user_store()?;

        let state = Arc::new(AppState::new(self.config, store));
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("quarry gateway listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        Ok(())
    }

    fn open_user_store(&self) -> Result<Arc<UserStore>> {
        let db_path = self.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Database(format!(
                    "failed to create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let store = UserStore::open(&db_path)?;
        info!("user store ready at {}", db_path.display());
        Ok(Arc::new(store))
    }

    fn database_path(&self) -> PathBuf {
        if let Some(file) = &self.config.database.file {
            return file.clone();
        }

        let data_dir = self.config.data_dir.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".quarry").join("data")
        });
        data_dir.join("users.db")
    }
}
