//! `medctx status`: show configuration and store health.

use medctx_aggregator::HealthStatus;
use std::path::Path;

pub async fn run(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;

    println!("medctx Status");
    println!("=============");
    println!("  Token budget:   {}", config.context.token_budget);
    println!("  Timeout:        {}ms", config.context.contributor_timeout_ms);
    println!("  Cache TTL:      {}s", config.context.cache_ttl_secs);
    println!("  Store:          {}", config.store.backend);
    if let Some(seed) = &config.store.seed_file {
        println!("  Seed file:      {seed}");
    }
    println!("  Gateway:        {}:{}", config.gateway.host, config.gateway.port);

    let aggregator = super::build_aggregator(&config).await?;
    println!("  Contributors:   {}", aggregator.contributors().names().join(", "));

    let health = aggregator.health().await;
    match health.status {
        HealthStatus::Healthy => println!("\n  Healthy"),
        HealthStatus::Degraded => println!(
            "\n  Degraded: {}",
            health.detail.as_deref().unwrap_or("unknown")
        ),
    }

    Ok(())
}
