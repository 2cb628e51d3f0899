//! JSON seed data loaded into a store at startup.
//!
//! The same file format feeds both backends, so demos and tests can start
//! from a known dataset.

use medctx_core::clinical::{ChatMessage, ConversationRecord, KnowledgeEntry, PatientProfile};
use medctx_core::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A snapshot of clinical records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub profiles: Vec<PatientProfile>,
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntry>,
}

impl Seed {
    /// Read and validate a seed file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidSeed(format!("cannot read {}: {e}", path.display()))
        })?;
        let seed: Self = serde_json::from_str(&content).map_err(|e| {
            StoreError::InvalidSeed(format!("cannot parse {}: {e}", path.display()))
        })?;
        seed.validate()?;
        Ok(seed)
    }

    /// Every message must belong to a known conversation.
    pub fn validate(&self) -> Result<(), StoreError> {
        let known: HashSet<&str> = self.conversations.iter().map(|c| c.id.as_str()).collect();
        if let Some(orphan) = self
            .messages
            .iter()
            .find(|m| !known.contains(m.conversation_id.as_str()))
        {
            return Err(StoreError::InvalidSeed(format!(
                "message '{}' references unknown conversation '{}'",
                orphan.id, orphan.conversation_id
            )));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
            && self.conversations.is_empty()
            && self.messages.is_empty()
            && self.knowledge.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "profiles": [{"id": "p1", "name": "Asha", "allergies": ["penicillin"]}],
        "conversations": [{"id": "c1", "subject_id": "p1", "topic": "Headache", "created_at": "2025-03-01T10:00:00Z", "message_count": 1}],
        "messages": [{"id": "m1", "conversation_id": "c1", "role": "user", "content": "I have a headache", "timestamp": "2025-03-01T10:01:00Z"}]
    }"#;

    #[test]
    fn load_valid_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let seed = Seed::load(&path).unwrap();
        assert_eq!(seed.profiles[0].allergies, vec!["penicillin"]);
        assert_eq!(seed.messages.len(), 1);
        assert!(seed.knowledge.is_empty());
        assert!(!seed.is_empty());
    }

    #[test]
    fn orphan_message_rejected() {
        let mut seed: Seed = serde_json::from_str(SAMPLE).unwrap();
        seed.conversations.clear();
        let err = seed.validate().unwrap_err();
        assert!(err.to_string().contains("unknown conversation"));
    }

    #[test]
    fn missing_file_is_invalid_seed() {
        let err = Seed::load(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSeed(_)));
    }
}
