//! # medctx Core
//!
//! Domain types, traits, and error definitions for the medctx context
//! aggregation service. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Contributor`]: one independent source of context (`medctx-contributors`)
//! - [`ClinicalStore`]: read-only access to clinical records (`medctx-store`)
//!
//! The aggregator (`medctx-aggregator`) only sees these traits, so tests can
//! swap in scripted contributors and in-memory stores.

pub mod clinical;
pub mod context;
pub mod contributor;
pub mod error;

// Re-export key types at crate root for ergonomics
pub use clinical::{
    ChatMessage, ClinicalStore, ConversationRecord, KnowledgeEntry, MessageRole, PatientProfile,
};
pub use context::{
    AggregatedContext, ContextRecord, ContributorFailure, FailureKind, Payload, PayloadValue,
    Primitive,
};
pub use contributor::{Contributor, ContributorSet};
pub use error::{CacheError, ContributorError, Error, Result, StoreError};
