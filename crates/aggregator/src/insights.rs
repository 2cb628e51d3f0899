//! Per-patient summary for clinicians and diagnostics.

use medctx_contributors::entities;
use medctx_core::clinical::ClinicalStore;
use medctx_core::error::StoreError;
use serde::Serialize;
use std::collections::HashMap;

const CONVERSATION_SCAN: usize = 1000;
const MESSAGE_SCAN: usize = 500;
const RECENT_TOPICS: usize = 5;
const TOP_SYMPTOMS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomCount {
    pub symptom: String,
    pub count: usize,
}

/// What we know about one patient, in aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientInsights {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub total_conversations: usize,
    pub total_messages: usize,
    pub recent_topics: Vec<String>,
    pub allergies: Vec<String>,
    /// Messages mentioning each symptom, most frequent first.
    pub symptom_frequency: Vec<SymptomCount>,
}

pub(crate) async fn summarize(
    store: &dyn ClinicalStore,
    subject_id: &str,
) -> Result<PatientInsights, StoreError> {
    let conversations = store.recent_conversations(subject_id, CONVERSATION_SCAN).await?;
    let ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();
    let messages = store.messages_in(&ids, MESSAGE_SCAN).await?;
    let profile = store.patient_profile(subject_id).await?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for message in &messages {
        for symptom in entities::symptoms(&message.content) {
            *counts.entry(symptom).or_default() += 1;
        }
    }
    let mut symptom_frequency: Vec<SymptomCount> = counts
        .into_iter()
        .map(|(symptom, count)| SymptomCount { symptom, count })
        .collect();
    symptom_frequency.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.symptom.cmp(&b.symptom)));
    symptom_frequency.truncate(TOP_SYMPTOMS);

    let (name, allergies) = match profile {
        Some(p) => ((!p.name.is_empty()).then_some(p.name), p.allergies),
        None => (None, Vec::new()),
    };

    Ok(PatientInsights {
        subject_id: subject_id.to_string(),
        name,
        total_conversations: conversations.len(),
        total_messages: messages.len(),
        recent_topics: conversations
            .iter()
            .take(RECENT_TOPICS)
            .map(|c| c.topic.clone())
            .collect(),
        allergies,
        symptom_frequency,
    })
}
