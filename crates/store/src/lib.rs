//! Clinical store implementations for medctx.

pub mod in_memory;
pub mod seed;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use seed::Seed;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use medctx_config::StoreConfig;
use medctx_core::clinical::ClinicalStore;
use medctx_core::error::StoreError;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Open the configured backend and import the seed file, if any.
pub async fn build_from_config(config: &StoreConfig) -> Result<Arc<dyn ClinicalStore>, StoreError> {
    let seed = match &config.seed_file {
        Some(path) => Some(Seed::load(Path::new(path))?),
        None => None,
    };

    let store: Arc<dyn ClinicalStore> = match config.backend.as_str() {
        "memory" => {
            let store = InMemoryStore::new();
            if let Some(seed) = seed {
                store.import(seed).await?;
            }
            Arc::new(store)
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.path.as_deref().ok_or_else(|| {
                StoreError::Storage("store.path is required for the sqlite backend".into())
            })?;
            let store = SqliteStore::new(path).await?;
            if let Some(seed) = seed {
                store.import(seed).await?;
            }
            Arc::new(store)
        }
        other => {
            return Err(StoreError::Storage(format!(
                "store backend '{other}' is not available in this build"
            )));
        }
    };

    info!(backend = %config.backend, "Clinical store ready");
    Ok(store)
}
