//! `medctx classify`: classify a query into a service type.

use std::path::Path;

pub async fn run(path: Option<&Path>, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let aggregator = super::build_aggregator(&config).await?;
    super::print_json(&aggregator.classify(query)?)
}
