use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use review_flow::config::{ReviewFlowConfig, StorageBackend};
use review_flow::storage::{FileStore, MemoryStore, WorkItemStore};
use review_flow::workflows::{EngineSettings, ReviewEngine};

pub mod comments;
pub mod items;
pub mod lines;
pub mod table;
pub mod transition;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()>;
}

/// Builds the engine on top of the configured storage backend
pub async fn open_engine(config: &ReviewFlowConfig) -> Result<ReviewEngine> {
    let store: Arc<dyn WorkItemStore> = match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using the in-memory store; nothing will outlive this process");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::File => {
            info!(path = %config.storage.path.display(), "Opening file store");
            Arc::new(FileStore::open(&config.storage.path)?)
        }
        StorageBackend::Sqlite => open_sqlite(config).await?,
    };

    Ok(ReviewEngine::new(store).with_settings(EngineSettings::from(config)))
}

#[cfg(feature = "database")]
async fn open_sqlite(config: &ReviewFlowConfig) -> Result<Arc<dyn WorkItemStore>> {
    let storage = &config.storage;
    info!(url = %storage.database_url, "Opening sqlite store");
    let store = review_flow::database::SqliteStore::new(
        &storage.database_url,
        storage.max_connections,
        storage.auto_migrate,
    )
    .await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_sqlite(_config: &ReviewFlowConfig) -> Result<Arc<dyn WorkItemStore>> {
    anyhow::bail!("storage.backend = \"sqlite\" requires building with --features database")
}

/// Writes a JSON snapshot to stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
