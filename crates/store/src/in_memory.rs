//! In-memory backend for tests and seeded demo sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medctx_core::clinical::{
    ChatMessage, ClinicalStore, ConversationRecord, KnowledgeEntry, MessageRole, PatientProfile,
};
use medctx_core::error::StoreError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::seed::Seed;

/// Rows in insertion order with an id index for upserts.
struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    /// Replace the row with this id in place, or append it.
    fn upsert(&mut self, id: String, row: T) {
        match self.index.get(&id) {
            Some(&slot) => self.rows[slot] = row,
            None => {
                self.index.insert(id, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, PatientProfile>,
    conversations: Table<ConversationRecord>,
    messages: Table<ChatMessage>,
    knowledge: Table<KnowledgeEntry>,
}

/// An in-memory store holding every table in id-indexed vectors.
/// Useful for testing and sessions where persistence isn't needed.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from seed data.
    pub async fn from_seed(seed: Seed) -> Result<Self, StoreError> {
        let store = Self::new();
        store.import(seed).await?;
        Ok(store)
    }

    /// Import seed data, replacing records with the same id.
    pub async fn import(&self, seed: Seed) -> Result<(), StoreError> {
        seed.validate()?;
        for profile in seed.profiles {
            self.add_profile(profile).await;
        }
        for conversation in seed.conversations {
            self.add_conversation(conversation).await;
        }
        for message in seed.messages {
            self.add_message(message).await;
        }
        for entry in seed.knowledge {
            self.add_knowledge(entry).await;
        }
        Ok(())
    }

    pub async fn add_profile(&self, profile: PatientProfile) {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.id.clone(), profile);
    }

    pub async fn add_conversation(&self, mut conversation: ConversationRecord) -> String {
        if conversation.id.is_empty() {
            conversation.id = Uuid::new_v4().to_string();
        }
        let id = conversation.id.clone();
        self.tables
            .write()
            .await
            .conversations
            .upsert(id.clone(), conversation);
        id
    }

    pub async fn add_message(&self, mut message: ChatMessage) -> String {
        if message.id.is_empty() {
            message.id = Uuid::new_v4().to_string();
        }
        let id = message.id.clone();
        self.tables
            .write()
            .await
            .messages
            .upsert(id.clone(), message);
        id
    }

    pub async fn add_knowledge(&self, mut entry: KnowledgeEntry) -> String {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.tables
            .write()
            .await
            .knowledge
            .upsert(id.clone(), entry);
        id
    }
}

#[async_trait]
impl ClinicalStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn recent_conversations(
        &self,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut found: Vec<ConversationRecord> = tables
            .conversations
            .iter()
            .filter(|c| c.subject_id == subject_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn messages_in(
        &self,
        conversation_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let wanted: HashSet<&str> = conversation_ids.iter().map(|s| s.as_str()).collect();
        let tables = self.tables.read().await;
        let mut found: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| wanted.contains(m.conversation_id.as_str()))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit);
        Ok(found)
    }

    async fn patient_profile(&self, subject_id: &str) -> Result<Option<PatientProfile>, StoreError> {
        Ok(self.tables.read().await.profiles.get(subject_id).cloned())
    }

    async fn knowledge_for(
        &self,
        specialties: &[&str],
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .knowledge
            .iter()
            .filter(|k| specialties.contains(&k.specialty.as_str()))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn messages_mentioning(
        &self,
        term: &str,
        since: Option<DateTime<Utc>>,
        role: Option<MessageRole>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Ok(vec![]);
        }
        let tables = self.tables.read().await;
        let mut found: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| since.is_none_or(|cutoff| m.timestamp >= cutoff))
            .filter(|m| role.is_none_or(|r| m.role == r))
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit);
        Ok(found)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
