//! # medctx Aggregator
//!
//! Fans a query out to every registered [`Contributor`], merges the records
//! by relevance, fits them into a token budget, and caches the result.
//!
//! [`Contributor`]: medctx_core::Contributor

pub mod aggregator;
pub mod budget;
pub mod cache;
pub mod insights;
pub mod token;

pub use aggregator::{
    Aggregator, AggregatorSettings, AggregatorStats, FetchRequest, HealthReport, HealthStatus,
};
pub use budget::{Selection, select_within_budget};
pub use cache::{CacheKey, CacheStats, ContextCache, InMemoryContextCache};
pub use insights::{PatientInsights, SymptomCount};
pub use token::estimate_tokens;
