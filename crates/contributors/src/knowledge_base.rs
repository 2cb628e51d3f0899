//! Knowledge base contributor: clinician-curated entries for the query's
//! specialty.
//!
//! Specialty detection is keyword based and falls back to
//! "General Medicine". Entries for a specialty (plus general entries) are
//! cached per specialty so repeated queries don't hit the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medctx_core::clinical::{ClinicalStore, KnowledgeEntry};
use medctx_core::context::ContextRecord;
use medctx_core::contributor::Contributor;
use medctx_core::error::ContributorError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const NAME: &str = "knowledge_base";

pub const GENERAL_MEDICINE: &str = "General Medicine";

const ENTRY_LIMIT: usize = 100;
const TOP_ENTRIES: usize = 5;

const SPECIALTY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Cardiology", &["heart", "cardiac", "blood pressure", "chest pain", "arrhythmia"]),
    ("Dermatology", &["skin", "rash", "acne", "eczema", "psoriasis"]),
    ("Orthopedics", &["bone", "joint", "fracture", "sprain", "arthritis"]),
    ("Neurology", &["headache", "migraine", "seizure", "brain", "nerve"]),
    ("Gastroenterology", &["stomach", "digestion", "nausea", "diarrhea", "gut"]),
    ("Respiratory", &["cough", "breathing", "asthma", "lung", "bronchitis"]),
    ("Pediatrics", &["child", "baby", "infant", "kid", "pediatric"]),
    ("Gynecology", &["pregnancy", "menstrual", "gynecological", "women"]),
    ("Psychiatry", &["mental", "depression", "anxiety", "stress", "psychiatric"]),
];

/// First specialty whose keywords appear in the query.
pub fn detect_specialty(query: &str) -> &'static str {
    let lower = query.to_lowercase();
    SPECIALTY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(specialty, _)| *specialty)
        .unwrap_or(GENERAL_MEDICINE)
}

struct CachedEntries {
    fetched_at: Instant,
    entries: Arc<Vec<KnowledgeEntry>>,
}

pub struct KnowledgeBaseContributor {
    store: Arc<dyn ClinicalStore>,
    cache: Mutex<HashMap<&'static str, CachedEntries>>,
    cache_ttl: Duration,
    min_relevance: f64,
}

impl KnowledgeBaseContributor {
    pub fn new(store: Arc<dyn ClinicalStore>, cache_ttl: Duration, min_relevance: f64) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
            min_relevance,
        }
    }

    async fn entries_for(
        &self,
        specialty: &'static str,
    ) -> Result<Arc<Vec<KnowledgeEntry>>, ContributorError> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(specialty)
                && cached.fetched_at.elapsed() < self.cache_ttl
            {
                return Ok(Arc::clone(&cached.entries));
            }
        }

        let specialties: Vec<&str> = if specialty == GENERAL_MEDICINE {
            vec![GENERAL_MEDICINE]
        } else {
            vec![specialty, GENERAL_MEDICINE]
        };
        let entries = Arc::new(
            self.store
                .knowledge_for(&specialties, ENTRY_LIMIT)
                .await
                .map_err(|e| ContributorError::unavailable(NAME, e))?,
        );
        debug!(specialty, count = entries.len(), "Knowledge entries loaded");

        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(
            specialty,
            CachedEntries {
                fetched_at: Instant::now(),
                entries: Arc::clone(&entries),
            },
        );
        Ok(entries)
    }
}

/// Words of `text`, lowercased, split on anything that isn't alphanumeric.
fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// 0.1 per query word shared with the entry content, plus a recency boost.
/// Titles and tags are display metadata and do not score.
fn score_entry(entry: &KnowledgeEntry, query_words: &HashSet<String>, now: DateTime<Utc>) -> f64 {
    let shared = query_words.intersection(&words(&entry.content)).count();
    let mut score = 0.1 * shared as f64;

    let age = now - entry.created_at;
    if age < chrono::Duration::hours(24) {
        score += 0.3;
    } else if age < chrono::Duration::days(7) {
        score += 0.1;
    }
    score.min(1.0)
}

#[async_trait]
impl Contributor for KnowledgeBaseContributor {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(
        &self,
        _subject_id: &str,
        query: &str,
        _conversation_id: Option<&str>,
    ) -> Result<ContextRecord, ContributorError> {
        let specialty = detect_specialty(query);
        let entries = self.entries_for(specialty).await?;

        let query_words = words(query);
        let now = Utc::now();
        let mut relevant: Vec<(&KnowledgeEntry, f64)> = entries
            .iter()
            .map(|e| (e, score_entry(e, &query_words, now)))
            .filter(|(_, score)| *score > self.min_relevance)
            .collect();

        if relevant.is_empty() {
            return Ok(ContextRecord::empty(NAME));
        }

        relevant.sort_by(|a, b| b.1.total_cmp(&a.1));
        let top: Vec<&(&KnowledgeEntry, f64)> = relevant.iter().take(TOP_ENTRIES).collect();
        let overall = top.iter().map(|(_, s)| s).sum::<f64>() / TOP_ENTRIES as f64;

        let titles: Vec<String> = top.iter().map(|(e, _)| e.title.clone()).collect();
        let ids: Vec<String> = top.iter().map(|(e, _)| e.id.clone()).collect();
        let summary = format!(
            "{} relevant entries from {}: {}",
            relevant.len(),
            specialty,
            titles.join("; ")
        );

        Ok(ContextRecord::new(NAME, summary, overall)
            .with("specialty", specialty)
            .with("total_entries", entries.len())
            .with("matched_entries", relevant.len())
            .with("entry_titles", titles)
            .with("entry_ids", ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use medctx_core::clinical::{ChatMessage, ConversationRecord, MessageRole, PatientProfile};
    use medctx_core::error::StoreError;
    use medctx_store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(id: &str, title: &str, content: &str, specialty: &str, age_days: i64) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            specialty: specialty.into(),
            tags: vec![],
            created_at: Utc::now() - ChronoDuration::days(age_days),
        }
    }

    /// Counts knowledge lookups and delegates to an in-memory store.
    struct CountingStore {
        inner: InMemoryStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl ClinicalStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }
        async fn recent_conversations(
            &self,
            s: &str,
            l: usize,
        ) -> Result<Vec<ConversationRecord>, StoreError> {
            self.inner.recent_conversations(s, l).await
        }
        async fn messages_in(&self, ids: &[String], l: usize) -> Result<Vec<ChatMessage>, StoreError> {
            self.inner.messages_in(ids, l).await
        }
        async fn patient_profile(&self, s: &str) -> Result<Option<PatientProfile>, StoreError> {
            self.inner.patient_profile(s).await
        }
        async fn knowledge_for(
            &self,
            specialties: &[&str],
            l: usize,
        ) -> Result<Vec<KnowledgeEntry>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.knowledge_for(specialties, l).await
        }
        async fn messages_mentioning(
            &self,
            t: &str,
            since: Option<DateTime<Utc>>,
            role: Option<MessageRole>,
            l: usize,
        ) -> Result<Vec<ChatMessage>, StoreError> {
            self.inner.messages_mentioning(t, since, role, l).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn specialty_detection() {
        assert_eq!(detect_specialty("My CHEST PAIN is worse"), "Cardiology");
        assert_eq!(detect_specialty("itchy rash on my arm"), "Dermatology");
        assert_eq!(detect_specialty("feeling a lot of stress"), "Psychiatry");
        assert_eq!(detect_specialty("general check"), GENERAL_MEDICINE);
    }

    #[test]
    fn entry_score_counts_shared_words_and_recency() {
        let query = words("chest pain after exercise");
        let fresh = entry("k1", "Angina", "Chest pain during exercise-induced angina", "Cardiology", 0);
        // chest, pain, exercise shared (0.3) + fresh (0.3)
        assert!((score_entry(&fresh, &query, Utc::now()) - 0.6).abs() < 1e-9);
        let old = entry("k2", "Angina", "Chest pain", "Cardiology", 30);
        assert!((score_entry(&old, &query, Utc::now()) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn title_and_tags_do_not_score() {
        let query = words("chest pain");
        let mut tagged = entry("k1", "Chest pain", "angina overview", "Cardiology", 30);
        tagged.tags = vec!["chest".into(), "pain".into()];
        assert_eq!(score_entry(&tagged, &query, Utc::now()), 0.0);

        // Punctuation does not hide a word.
        let punctuated = entry("k2", "Angina", "Pain, chest-wall.", "Cardiology", 30);
        assert!((score_entry(&punctuated, &query, Utc::now()) - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn matches_specialty_and_general_entries() {
        let store = InMemoryStore::new();
        store
            .add_knowledge(entry("k1", "Chest pain triage", "assess chest pain risk", "Cardiology", 0))
            .await;
        store
            .add_knowledge(entry("k2", "Pain management", "chest pain management basics", GENERAL_MEDICINE, 3))
            .await;
        store
            .add_knowledge(entry("k3", "Rash care", "chest pain unrelated", "Dermatology", 0))
            .await;
        let contributor = KnowledgeBaseContributor::new(Arc::new(store), Duration::from_secs(3600), 0.3);

        let record = contributor
            .fetch("p1", "chest pain management", None)
            .await
            .unwrap();
        assert_eq!(
            record.summary(),
            "2 relevant entries from Cardiology: Chest pain triage; Pain management"
        );
        // (0.5 + 0.4) / 5
        assert!((record.relevance() - 0.18).abs() < 1e-9);
    }

    #[tokio::test]
    async fn nothing_relevant_is_empty() {
        let store = InMemoryStore::new();
        store
            .add_knowledge(entry("k1", "Old note", "nothing shared", GENERAL_MEDICINE, 90))
            .await;
        let contributor = KnowledgeBaseContributor::new(Arc::new(store), Duration::from_secs(3600), 0.3);
        let record = contributor.fetch("p1", "chest pain", None).await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn specialty_entries_are_cached_until_ttl() {
        let store = Arc::new(CountingStore {
            inner: InMemoryStore::new(),
            lookups: AtomicUsize::new(0),
        });
        let contributor =
            KnowledgeBaseContributor::new(store.clone(), Duration::from_secs(3600), 0.3);

        contributor.fetch("p1", "heart", None).await.unwrap();
        contributor.fetch("p2", "cardiac", None).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);

        contributor.fetch("p1", "skin", None).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(3601)).await;
        contributor.fetch("p1", "heart", None).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 3);
    }
}
