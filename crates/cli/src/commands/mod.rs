pub mod classify;
pub mod context;
pub mod init;
pub mod insights;
pub mod serve;
pub mod status;

use medctx_aggregator::Aggregator;
use medctx_config::AppConfig;
use std::path::Path;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the configured store and wire up the aggregator.
pub async fn build_aggregator(config: &AppConfig) -> CliResult<Arc<Aggregator>> {
    let store = medctx_store::build_from_config(&config.store)
        .await
        .map_err(|e| format!("Failed to open store: {e}"))?;
    let aggregator = Aggregator::from_config(config, store);
    tracing::debug!(
        contributors = aggregator.contributors().len(),
        store = %config.store.backend,
        "Aggregator ready"
    );
    Ok(Arc::new(aggregator))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
