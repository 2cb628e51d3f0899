//! `medctx insights`: summarize one patient's history.

use std::path::Path;

pub async fn run(path: Option<&Path>, subject: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let aggregator = super::build_aggregator(&config).await?;
    super::print_json(&aggregator.insights(subject).await?)
}
