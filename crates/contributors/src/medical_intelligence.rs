//! Medical intelligence contributor: anonymized cross-patient patterns.
//!
//! Only aggregate counts leave this module. Message content from other
//! patients is scanned for co-occurring symptoms but never copied into the
//! record. Treatment advice is reduced to `treatment_mentions`, the number of
//! assistant replies pairing a symptom with treatment language; the advice
//! text itself is not listed.
//!
//! Body parts and time references found in the query are echoed back so a
//! consumer can see what the symptom search was anchored on.

use async_trait::async_trait;
use chrono::Utc;
use medctx_core::clinical::{ClinicalStore, MessageRole};
use medctx_core::context::ContextRecord;
use medctx_core::contributor::Contributor;
use medctx_core::error::ContributorError;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities;

pub const NAME: &str = "medical_intelligence";

const CASES_PER_SYMPTOM: usize = 50;
const TREATMENT_SCAN_LIMIT: usize = 20;
const RELATED_PER_SYMPTOM: usize = 3;
const CASES_FOR_FULL_RELEVANCE: f64 = 10.0;

const TREATMENT_KEYWORDS: &[&str] = &[
    "prescribe", "medication", "treatment", "therapy", "recommend", "advise", "suggest", "take",
    "medicine", "drug",
];

/// A primary symptom and the symptoms most often mentioned alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SymptomCluster {
    pub primary: String,
    pub related: Vec<String>,
}

impl SymptomCluster {
    fn render(&self) -> String {
        format!("{} with {}", self.primary, self.related.join(", "))
    }
}

pub struct MedicalIntelligenceContributor {
    store: Arc<dyn ClinicalStore>,
    lookback: chrono::Duration,
}

impl MedicalIntelligenceContributor {
    pub fn new(store: Arc<dyn ClinicalStore>, lookback_days: u32) -> Self {
        Self {
            store,
            lookback: chrono::Duration::days(i64::from(lookback_days)),
        }
    }

    async fn similar_cases(&self, symptoms: &[String]) -> Result<usize, ContributorError> {
        let since = Utc::now() - self.lookback;
        let mut cases = 0;
        for symptom in symptoms {
            cases += self
                .store
                .messages_mentioning(symptom, Some(since), None, CASES_PER_SYMPTOM)
                .await
                .map_err(|e| ContributorError::unavailable(NAME, e))?
                .len();
        }
        Ok(cases)
    }

    async fn clusters(&self, symptoms: &[String]) -> Result<Vec<SymptomCluster>, ContributorError> {
        let mut clusters = Vec::new();
        for symptom in symptoms {
            let messages = self
                .store
                .messages_mentioning(symptom, None, None, CASES_PER_SYMPTOM)
                .await
                .map_err(|e| ContributorError::unavailable(NAME, e))?;

            let mut counts: HashMap<String, usize> = HashMap::new();
            for message in &messages {
                for other in entities::symptoms(&message.content) {
                    if &other != symptom {
                        *counts.entry(other).or_default() += 1;
                    }
                }
            }
            if counts.is_empty() {
                continue;
            }
            let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            clusters.push(SymptomCluster {
                primary: symptom.clone(),
                related: ranked
                    .into_iter()
                    .take(RELATED_PER_SYMPTOM)
                    .map(|(s, _)| s)
                    .collect(),
            });
        }
        Ok(clusters)
    }

    /// Assistant replies that mention a symptom together with treatment language.
    async fn treatment_mentions(&self, symptoms: &[String]) -> Result<usize, ContributorError> {
        let mut mentions = 0;
        for symptom in symptoms {
            let replies = self
                .store
                .messages_mentioning(symptom, None, Some(MessageRole::Assistant), TREATMENT_SCAN_LIMIT)
                .await
                .map_err(|e| ContributorError::unavailable(NAME, e))?;
            mentions += replies
                .iter()
                .filter(|m| {
                    let lower = m.content.to_lowercase();
                    TREATMENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
                })
                .count();
        }
        Ok(mentions)
    }
}

#[async_trait]
impl Contributor for MedicalIntelligenceContributor {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(
        &self,
        _subject_id: &str,
        query: &str,
        _conversation_id: Option<&str>,
    ) -> Result<ContextRecord, ContributorError> {
        let entities::MedicalEntities {
            symptoms,
            time_references,
            body_parts,
        } = entities::extract(query);
        if symptoms.is_empty() {
            return Ok(ContextRecord::empty(NAME));
        }

        let cases = self.similar_cases(&symptoms).await?;
        let clusters = self.clusters(&symptoms).await?;
        if cases == 0 && clusters.is_empty() {
            return Ok(ContextRecord::empty(NAME));
        }
        let treatments = self.treatment_mentions(&symptoms).await?;

        let mut summary = format!(
            "{cases} similar anonymized cases for {}",
            symptoms.join(", ")
        );
        let rendered: Vec<String> = clusters.iter().map(SymptomCluster::render).collect();
        if !rendered.is_empty() {
            summary.push_str(&format!(". Often reported: {}", rendered.join("; ")));
        }

        let relevance = (cases as f64 / CASES_FOR_FULL_RELEVANCE).min(1.0);
        let mut record = ContextRecord::new(NAME, summary, relevance)
            .with("detected_symptoms", symptoms)
            .with("similar_cases", cases)
            .with("symptom_clusters", rendered)
            .with("treatment_mentions", treatments);
        if !body_parts.is_empty() {
            record = record.with("body_parts", body_parts);
        }
        if !time_references.is_empty() {
            record = record.with("time_references", time_references);
        }
        Ok(record)
    }
}
