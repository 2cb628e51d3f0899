//! Clinical store trait: read-only access to patient records.
//!
//! Contributors read conversations, messages, patient profiles, and the
//! curated knowledge base through this trait. Implementations live in
//! `medctx-store` (in-memory, SQLite).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A past consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub subject_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u32,
}

fn default_topic() -> String {
    "General".into()
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Doctor,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Doctor => "doctor",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "doctor" => Ok(Self::Doctor),
            other => Err(StoreError::QueryFailed(format!("unknown role '{other}'"))),
        }
    }
}

/// A single chat message within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The parts of a patient profile contributors care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub allergies: Vec<String>,
}

/// A curated knowledge base entry written by clinicians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub specialty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Read-only clinical data access.
///
/// Implementations: SQLite, in-memory (for testing and seeded demos).
#[async_trait]
pub trait ClinicalStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Most recent conversations for a subject, newest first.
    async fn recent_conversations(
        &self,
        subject_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<ConversationRecord>, StoreError>;

    /// Messages belonging to any of the given conversations, newest first.
    async fn messages_in(
        &self,
        conversation_ids: &[String],
        limit: usize,
    ) -> std::result::Result<Vec<ChatMessage>, StoreError>;

    /// The subject's profile, if one exists.
    async fn patient_profile(
        &self,
        subject_id: &str,
    ) -> std::result::Result<Option<PatientProfile>, StoreError>;

    /// Knowledge entries for any of the given specialties.
    async fn knowledge_for(
        &self,
        specialties: &[&str],
        limit: usize,
    ) -> std::result::Result<Vec<KnowledgeEntry>, StoreError>;

    /// Messages across all subjects whose content mentions `term`
    /// (case-insensitive), optionally restricted by time and role.
    async fn messages_mentioning(
        &self,
        term: &str,
        since: Option<DateTime<Utc>>,
        role: Option<MessageRole>,
        limit: usize,
    ) -> std::result::Result<Vec<ChatMessage>, StoreError>;

    /// Cheap liveness check.
    async fn ping(&self) -> std::result::Result<(), StoreError>;
}
