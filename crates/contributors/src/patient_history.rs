//! Patient history contributor: what this patient has talked about before.

use async_trait::async_trait;
use chrono::Utc;
use medctx_core::clinical::ClinicalStore;
use medctx_core::context::ContextRecord;
use medctx_core::contributor::Contributor;
use medctx_core::error::ContributorError;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::entities;

pub const NAME: &str = "patient_history";

const CONVERSATION_LIMIT: usize = 50;
const RECENT_CONVERSATIONS: usize = 10;
const MESSAGE_LIMIT: usize = 100;
const SYMPTOMS_IN_SUMMARY: usize = 10;

/// Reads the subject's past conversations, extracts symptoms from the most
/// recent ones, and attaches known allergies.
pub struct PatientHistoryContributor {
    store: Arc<dyn ClinicalStore>,
}

impl PatientHistoryContributor {
    pub fn new(store: Arc<dyn ClinicalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Contributor for PatientHistoryContributor {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(
        &self,
        subject_id: &str,
        query: &str,
        _conversation_id: Option<&str>,
    ) -> Result<ContextRecord, ContributorError> {
        let conversations = self
            .store
            .recent_conversations(subject_id, CONVERSATION_LIMIT)
            .await
            .map_err(|e| ContributorError::unavailable(NAME, e))?;

        if conversations.is_empty() {
            debug!(subject_id, "No conversation history");
            return Ok(ContextRecord::empty(NAME));
        }

        let recent_ids: Vec<String> = conversations
            .iter()
            .take(RECENT_CONVERSATIONS)
            .map(|c| c.id.clone())
            .collect();
        let messages = self
            .store
            .messages_in(&recent_ids, MESSAGE_LIMIT)
            .await
            .map_err(|e| ContributorError::unavailable(NAME, e))?;

        let symptoms: BTreeSet<String> = messages
            .iter()
            .flat_map(|m| entities::symptoms(&m.content))
            .collect();

        let allergies = self
            .store
            .patient_profile(subject_id)
            .await
            .map_err(|e| ContributorError::unavailable(NAME, e))?
            .map(|p| p.allergies)
            .unwrap_or_default();

        let query_lower = query.to_lowercase();
        let mentioned = symptoms
            .iter()
            .filter(|s| query_lower.contains(s.as_str()))
            .count();
        let mut relevance = 0.2 * mentioned as f64;

        let age_days = (Utc::now() - conversations[0].created_at).num_days();
        if age_days < 7 {
            relevance += 0.3;
        } else if age_days < 30 {
            relevance += 0.1;
        }
        if conversations.len() > 5 {
            relevance += 0.2;
        }

        let recent_symptoms: Vec<String> =
            symptoms.into_iter().take(SYMPTOMS_IN_SUMMARY).collect();
        let topics: Vec<String> = conversations
            .iter()
            .take(RECENT_CONVERSATIONS)
            .map(|c| c.topic.clone())
            .collect();

        let mut summary = format!("{} previous conversations", conversations.len());
        if !recent_symptoms.is_empty() {
            summary.push_str(&format!(". Recent symptoms: {}", recent_symptoms.join(", ")));
        }
        if !allergies.is_empty() {
            summary.push_str(&format!(". Allergies: {}", allergies.join(", ")));
        }

        Ok(ContextRecord::new(NAME, summary, relevance.min(1.0))
            .with("total_conversations", conversations.len())
            .with("total_messages", messages.len())
            .with("recent_topics", topics)
            .with("recent_symptoms", recent_symptoms)
            .with("allergy_alerts", allergies))
    }
}
