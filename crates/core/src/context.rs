//! Context records and the aggregated context returned to callers.
//!
//! A [`ContextRecord`] is what one contributor produces for one call. The
//! aggregator merges many of them into an [`AggregatedContext`], which is the
//! only shape downstream prompt builders (or diagnostic endpoints) consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ContributorError;

/// A single primitive payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

/// A payload value: a primitive or a flat list of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Scalar(Primitive),
    List(Vec<Primitive>),
}

/// Flat key-value facts extracted by a contributor.
///
/// A `BTreeMap` keeps serialization order stable across calls.
pub type Payload = BTreeMap<String, PayloadValue>;

impl From<bool> for PayloadValue {
    fn from(v: bool) -> Self {
        Self::Scalar(Primitive::Bool(v))
    }
}

impl From<i64> for PayloadValue {
    fn from(v: i64) -> Self {
        Self::Scalar(Primitive::Integer(v))
    }
}

impl From<usize> for PayloadValue {
    fn from(v: usize) -> Self {
        Self::Scalar(Primitive::Integer(i64::try_from(v).unwrap_or(i64::MAX)))
    }
}

impl From<f64> for PayloadValue {
    fn from(v: f64) -> Self {
        Self::Scalar(Primitive::Number(v))
    }
}

impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        Self::Scalar(Primitive::Text(v.to_string()))
    }
}

impl From<String> for PayloadValue {
    fn from(v: String) -> Self {
        Self::Scalar(Primitive::Text(v))
    }
}

impl From<Vec<String>> for PayloadValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v.into_iter().map(Primitive::Text).collect())
    }
}

impl From<Vec<f64>> for PayloadValue {
    fn from(v: Vec<f64>) -> Self {
        Self::List(v.into_iter().map(Primitive::Number).collect())
    }
}

/// The unit of output from one contributor.
///
/// Immutable once built: fields are private and only the builder-style
/// [`ContextRecord::with`] (which consumes `self`) adds payload entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    source: String,
    summary: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    payload: Payload,
    relevance: f64,
}

impl ContextRecord {
    /// Create a record. Relevance is clamped to `[0.0, 1.0]`; NaN becomes 0.0.
    pub fn new(source: impl Into<String>, summary: impl Into<String>, relevance: f64) -> Self {
        Self {
            source: source.into(),
            summary: summary.into(),
            payload: Payload::new(),
            relevance: clamp_relevance(relevance),
        }
    }

    /// The "no data found" record: empty summary, empty payload, relevance 0.
    pub fn empty(source: impl Into<String>) -> Self {
        Self::new(source, String::new(), 0.0)
    }

    /// Add a payload entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn relevance(&self) -> f64 {
        self.relevance
    }

    /// True for the "no data found" shape.
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.payload.is_empty() && self.relevance == 0.0
    }
}

fn clamp_relevance(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Why a contributor contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Unavailable,
}

/// A contributor failure, attached to the result instead of being raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorFailure {
    pub contributor: String,
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ContributorError> for ContributorFailure {
    fn from(err: &ContributorError) -> Self {
        let kind = match err {
            ContributorError::Timeout { .. } => FailureKind::Timeout,
            ContributorError::Unavailable { .. } => FailureKind::Unavailable,
        };
        Self {
            contributor: err.contributor().to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

/// The consolidated context returned by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContext {
    /// When the aggregate was computed (not when it was served from cache).
    pub generated_at: DateTime<Utc>,
    /// The subject the query was about.
    pub subject_id: String,
    /// Conversation the query belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Included records, relevance descending.
    pub records: Vec<ContextRecord>,
    /// Sum of `relevance` over `records`.
    pub total_relevance: f64,
    /// One `"<source>: <summary>"` line per included non-empty summary.
    pub summary_text: String,
    /// Token budget applied to `summary_text`.
    pub token_budget: usize,
    /// Estimated tokens of `summary_text`.
    pub estimated_tokens: usize,
    /// Contributors that timed out or were unavailable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ContributorFailure>,
}

impl AggregatedContext {
    /// An aggregate with nothing in it.
    pub fn empty(
        subject_id: impl Into<String>,
        conversation_id: Option<String>,
        token_budget: usize,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            subject_id: subject_id.into(),
            conversation_id,
            records: Vec::new(),
            total_relevance: 0.0,
            summary_text: String::new(),
            token_budget,
            estimated_tokens: 0,
            failures: Vec::new(),
        }
    }

    /// Included payloads keyed by contributor name.
    pub fn by_source(&self) -> BTreeMap<&str, &Payload> {
        self.records
            .iter()
            .map(|r| (r.source(), r.payload()))
            .collect()
    }

    /// Look up the included record for a contributor.
    pub fn record(&self, source: &str) -> Option<&ContextRecord> {
        self.records.iter().find(|r| r.source() == source)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
