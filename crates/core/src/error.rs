//! Error types for the medctx domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; only [`Error::InvalidArgument`]
//! is ever surfaced by an aggregation call; everything else degrades the
//! result instead of failing it.

use thiserror::Error;

/// The top-level error type for all medctx operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Caller errors ---
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContributorError {
    #[error("Contributor '{contributor}' timed out after {timeout_ms}ms")]
    Timeout { contributor: String, timeout_ms: u64 },

    #[error("Contributor '{contributor}' unavailable: {reason}")]
    Unavailable { contributor: String, reason: String },
}

impl ContributorError {
    /// Name of the contributor that failed.
    pub fn contributor(&self) -> &str {
        match self {
            Self::Timeout { contributor, .. } | Self::Unavailable { contributor, .. } => {
                contributor
            }
        }
    }

    /// Wrap a store failure as an unavailable contributor.
    pub fn unavailable(contributor: &str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            contributor: contributor.to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid seed data: {0}")]
    InvalidSeed(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}
