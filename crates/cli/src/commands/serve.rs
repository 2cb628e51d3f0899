//! `medctx serve`: start the HTTP gateway.

use std::path::Path;

pub async fn run(
    path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let aggregator = super::build_aggregator(&config).await?;

    println!("medctx Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Contributors: {}", aggregator.contributors().len());

    medctx_gateway::start(&config, aggregator).await?;

    Ok(())
}
