//! Contributor trait: one independent source of context.
//!
//! A contributor looks at a subject and a free-text query and returns a
//! [`ContextRecord`]. Contributors know nothing about each other; the
//! aggregator fans out to all of them and merges the results.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::ContextRecord;
use crate::error::ContributorError;

/// The core Contributor trait.
///
/// Contract:
/// - "No data found" is `Ok(ContextRecord::empty(name))`, never an error.
/// - A failing dependency is [`ContributorError::Unavailable`].
/// - Implementations only read shared storage.
///
/// Timeouts are enforced by the caller, so implementations do not need to
/// race their own clocks.
#[async_trait]
pub trait Contributor: Send + Sync {
    /// The unique name of this contributor (e.g., "patient_history").
    fn name(&self) -> &str;

    /// Produce this contributor's record for one query.
    async fn fetch(
        &self,
        subject_id: &str,
        query: &str,
        conversation_id: Option<&str>,
    ) -> std::result::Result<ContextRecord, ContributorError>;
}

/// An ordered set of contributors, built once at startup.
///
/// Registration order is the declaration order used to break relevance
/// ties, so output is deterministic.
#[derive(Clone, Default)]
pub struct ContributorSet {
    contributors: Vec<Arc<dyn Contributor>>,
}

impl ContributorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contributor. A contributor with the same name is replaced
    /// in place, keeping its original position.
    pub fn register(&mut self, contributor: Arc<dyn Contributor>) {
        match self
            .contributors
            .iter()
            .position(|c| c.name() == contributor.name())
        {
            Some(idx) => self.contributors[idx] = contributor,
            None => self.contributors.push(contributor),
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, contributor: Arc<dyn Contributor>) -> Self {
        self.register(contributor);
        self
    }

    /// Contributors selected by an optional name filter, in declaration order.
    ///
    /// Unknown names in the filter are ignored.
    pub fn select(&self, filter: Option<&BTreeSet<String>>) -> Vec<Arc<dyn Contributor>> {
        self.contributors
            .iter()
            .filter(|c| filter.is_none_or(|names| names.contains(c.name())))
            .cloned()
            .collect()
    }

    /// Get a contributor by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Contributor>> {
        self.contributors.iter().find(|c| c.name() == name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }
}
