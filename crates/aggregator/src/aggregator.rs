//! The aggregator: concurrent fan-out to contributors, relevance merge,
//! token budgeting, and caching.
//!
//! # Flow
//!
//! 1. Validate the request (empty subject or query is the only error).
//! 2. Consult the cache for unfiltered, default-budget requests.
//! 3. Spawn one task per selected contributor, each wrapped in a timeout,
//!    and wait for all of them.
//! 4. Sort successful records by relevance (stable, so ties keep
//!    declaration order) and fit the longest prefix into the budget.
//! 5. Store the result and return it.
//!
//! Contributor failures never fail the call; they are logged and attached
//! to [`AggregatedContext::failures`].

use chrono::Utc;
use futures::future::join_all;
use medctx_config::{AppConfig, ContextConfig};
use medctx_contributors::{Classification, ClassifierStats, ServiceClassifier};
use medctx_core::clinical::ClinicalStore;
use medctx_core::context::{AggregatedContext, ContextRecord, ContributorFailure};
use medctx_core::contributor::{Contributor, ContributorSet};
use medctx_core::error::{ContributorError, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::budget;
use crate::cache::{CacheKey, CacheStats, ContextCache, InMemoryContextCache};
use crate::insights::{self, PatientInsights};

// ── Types ─────────────────────────────────────────────────────────────────

/// One aggregation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub subject_id: String,
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Restrict fan-out to these contributor names.
    #[serde(default, alias = "contributors")]
    pub contributor_filter: Option<BTreeSet<String>>,
    /// Override the configured token budget.
    #[serde(default)]
    pub token_budget: Option<usize>,
}

impl FetchRequest {
    pub fn new(subject_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contributor_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = Some(token_budget);
        self
    }
}

/// Aggregation limits, usually taken from `[context]` in config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorSettings {
    pub token_budget: usize,
    pub contributor_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for AggregatorSettings {
    fn from(config: &ContextConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            contributor_timeout: config.contributor_timeout(),
            cache_ttl: config.cache_ttl(),
        }
    }
}

/// Runtime statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatorStats {
    pub contributors: Vec<String>,
    pub token_budget: usize,
    pub contributor_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache: CacheStats,
    pub classifier: ClassifierStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub contributors: usize,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ── Aggregator ────────────────────────────────────────────────────────────

/// Built once at startup and shared behind an `Arc`.
pub struct Aggregator {
    contributors: ContributorSet,
    store: Arc<dyn ClinicalStore>,
    classifier: Arc<ServiceClassifier>,
    cache: Arc<dyn ContextCache>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(
        contributors: ContributorSet,
        store: Arc<dyn ClinicalStore>,
        classifier: Arc<ServiceClassifier>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            contributors,
            store,
            classifier,
            cache: Arc::new(InMemoryContextCache::new()),
            settings,
        }
    }

    /// Wire up the built-in contributors over `store` from config.
    pub fn from_config(config: &AppConfig, store: Arc<dyn ClinicalStore>) -> Self {
        let classifier = medctx_contributors::build_classifier(config);
        let contributors = medctx_contributors::default_contributors(
            Arc::clone(&store),
            Arc::clone(&classifier),
            config,
        );
        Self::new(
            contributors,
            store,
            classifier,
            AggregatorSettings::from(&config.context),
        )
    }

    /// Replace the cache backend.
    pub fn with_cache(mut self, cache: Arc<dyn ContextCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> AggregatorSettings {
        self.settings
    }

    pub fn contributors(&self) -> &ContributorSet {
        &self.contributors
    }

    /// Aggregate context for one request.
    ///
    /// Only [`Error::InvalidArgument`] is ever returned.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Arc<AggregatedContext>> {
        let subject_id = non_empty("subject_id", &request.subject_id)?;
        let query = non_empty("query", &request.query)?;
        let conversation_id = conversation(request.conversation_id.as_deref());
        let budget = request.token_budget.unwrap_or(self.settings.token_budget);

        let cacheable =
            request.contributor_filter.is_none() && budget == self.settings.token_budget;
        let key = CacheKey::new(subject_id, query, conversation_id);

        if cacheable {
            match self.cache.get(&key).await {
                Ok(Some(hit)) => {
                    debug!(subject_id, "Context cache hit");
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Context cache read failed, treating as miss"),
            }
        }

        let started = tokio::time::Instant::now();
        let selected = self.contributors.select(request.contributor_filter.as_ref());
        let (mut records, failures) = self
            .fan_out(selected, subject_id, query, conversation_id)
            .await;

        // Stable sort: equal relevance keeps declaration order.
        records.sort_by(|a, b| b.relevance().total_cmp(&a.relevance()));
        let selection = budget::select_within_budget(records, budget);
        let total_relevance = selection
            .records
            .iter()
            .fold(0.0, |acc, r| acc + r.relevance());

        let context = Arc::new(AggregatedContext {
            generated_at: Utc::now(),
            subject_id: subject_id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            records: selection.records,
            total_relevance,
            summary_text: selection.text,
            token_budget: budget,
            estimated_tokens: selection.estimated_tokens,
            failures,
        });

        info!(
            subject_id,
            records = context.records.len(),
            dropped = selection.dropped,
            failures = context.failures.len(),
            tokens = context.estimated_tokens,
            budget,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Context aggregated"
        );

        if cacheable
            && let Err(e) = self
                .cache
                .put(key, Arc::clone(&context), self.settings.cache_ttl)
                .await
        {
            warn!(error = %e, "Context cache write failed, result not cached");
        }

        Ok(context)
    }

    /// Run every selected contributor on its own task and wait for all.
    ///
    /// Results come back in declaration order. A task that panics is
    /// reported as unavailable.
    async fn fan_out(
        &self,
        selected: Vec<Arc<dyn Contributor>>,
        subject_id: &str,
        query: &str,
        conversation_id: Option<&str>,
    ) -> (Vec<ContextRecord>, Vec<ContributorFailure>) {
        let timeout = self.settings.contributor_timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        let (names, handles): (Vec<String>, Vec<_>) = selected
            .into_iter()
            .map(|contributor| {
                let name = contributor.name().to_string();
                let task_name = name.clone();
                let subject_id = subject_id.to_string();
                let query = query.to_string();
                let conversation_id = conversation_id.map(str::to_string);
                let handle = tokio::spawn(async move {
                    let call =
                        contributor.fetch(&subject_id, &query, conversation_id.as_deref());
                    match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(ContributorError::Timeout {
                            contributor: task_name,
                            timeout_ms,
                        }),
                    }
                });
                (name, handle)
            })
            .unzip();

        let mut records = Vec::with_capacity(names.len());
        let mut failures = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            let outcome = joined.unwrap_or_else(|join_err| {
                Err(ContributorError::unavailable(
                    &name,
                    format!("task failed: {join_err}"),
                ))
            });
            match outcome {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(contributor = %name, error = %err, "Contributor failed, continuing without it");
                    failures.push(ContributorFailure::from(&err));
                }
            }
        }
        (records, failures)
    }

    /// Classify a query without aggregating.
    pub fn classify(&self, query: &str) -> Result<Classification> {
        let query = non_empty("query", query)?;
        Ok(self.classifier.classify(query))
    }

    /// Aggregate history summary for one patient.
    pub async fn insights(&self, subject_id: &str) -> Result<PatientInsights> {
        let subject_id = non_empty("subject_id", subject_id)?;
        Ok(insights::summarize(self.store.as_ref(), subject_id).await?)
    }

    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            contributors: self
                .contributors
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            token_budget: self.settings.token_budget,
            contributor_timeout_ms: u64::try_from(self.settings.contributor_timeout.as_millis())
                .unwrap_or(u64::MAX),
            cache_ttl_secs: self.settings.cache_ttl.as_secs(),
            cache: self.cache.stats(),
            classifier: self.classifier.stats(),
        }
    }

    /// Healthy when at least one contributor is registered and the store
    /// answers a ping.
    pub async fn health(&self) -> HealthReport {
        let store_check = self.store.ping().await;
        let (status, detail) = match (&store_check, self.contributors.is_empty()) {
            (Ok(()), false) => (HealthStatus::Healthy, None),
            (Ok(()), true) => (
                HealthStatus::Degraded,
                Some("no contributors registered".to_string()),
            ),
            (Err(e), _) => (HealthStatus::Degraded, Some(format!("store: {e}"))),
        };
        HealthReport {
            status,
            contributors: self.contributors.len(),
            store: self.store.name().to_string(),
            detail,
        }
    }

    /// Drop every cached aggregate.
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear().await?;
        info!("Context cache cleared");
        Ok(())
    }

    /// Drop the cached aggregate for one `(subject, query, conversation)`.
    pub async fn invalidate(
        &self,
        subject_id: &str,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<bool> {
        let key = CacheKey::new(subject_id.trim(), query.trim(), conversation(conversation_id));
        Ok(self.cache.invalidate(&key).await?)
    }
}

/// Blank conversation ids mean "no conversation".
fn conversation(conversation_id: Option<&str>) -> Option<&str> {
    conversation_id.map(str::trim).filter(|c| !c.is_empty())
}

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::InvalidArgument(format!("{field} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medctx_core::context::FailureKind;
    use medctx_core::error::CacheError;
    use medctx_store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Record(String, f64),
        Slow(Duration, f64),
        Hang,
        Fail,
        Panic,
    }

    struct Scripted {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn record(name: &'static str, summary: &str, relevance: f64) -> Arc<Self> {
            Self::with(name, Behavior::Record(summary.to_string(), relevance))
        }

        fn with(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Contributor for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(
            &self,
            _subject_id: &str,
            _query: &str,
            _conversation_id: Option<&str>,
        ) -> std::result::Result<ContextRecord, ContributorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Record(summary, relevance) => {
                    Ok(ContextRecord::new(self.name, summary.clone(), *relevance))
                }
                Behavior::Slow(delay, relevance) => {
                    tokio::time::sleep(*delay).await;
                    Ok(ContextRecord::new(self.name, "slow but fine", *relevance))
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(ContextRecord::empty(self.name))
                }
                Behavior::Fail => Err(ContributorError::unavailable(self.name, "store down")),
                Behavior::Panic => panic!("contributor bug"),
            }
        }
    }

    struct FailingCache;

    #[async_trait]
    impl ContextCache for FailingCache {
        async fn get(
            &self,
            _key: &CacheKey,
        ) -> std::result::Result<Option<Arc<AggregatedContext>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn put(
            &self,
            _key: CacheKey,
            _value: Arc<AggregatedContext>,
            _ttl: Duration,
        ) -> std::result::Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn invalidate(&self, _key: &CacheKey) -> std::result::Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn clear(&self) -> std::result::Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn stats(&self) -> CacheStats {
            CacheStats::default()
        }
    }

    fn aggregator(contributors: Vec<Arc<Scripted>>) -> Aggregator {
        let mut set = ContributorSet::new();
        for c in contributors {
            set.register(c);
        }
        Aggregator::new(
            set,
            Arc::new(InMemoryStore::new()),
            Arc::new(ServiceClassifier::new()),
            AggregatorSettings::default(),
        )
    }

    /// A summary whose rendered line (`"<name>: <summary>"`) is `tokens * 4` chars.
    fn summary_of(name: &str, tokens: usize) -> String {
        "x".repeat(tokens * 4 - name.len() - 2)
    }

    fn sum(records: &[ContextRecord]) -> f64 {
        records.iter().fold(0.0, |acc, r| acc + r.relevance())
    }

    #[tokio::test]
    async fn empty_subject_or_query_rejected() {
        let agg = aggregator(vec![Scripted::record("a", "x", 0.5)]);
        let err = agg.fetch(FetchRequest::new("  ", "query")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = agg.fetch(FetchRequest::new("p1", "\t\n")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn worked_example_stops_at_first_overflow() {
        let a = Scripted::record("a", &summary_of("a", 500), 0.9);
        let b = Scripted::record("b", &summary_of("b", 800), 0.6);
        let c = Scripted::record("c", &summary_of("c", 100), 0.2);
        let agg = aggregator(vec![c, b, a]);

        let ctx = agg
            .fetch(FetchRequest::new("p1", "q").with_budget(1200))
            .await
            .unwrap();
        assert_eq!(ctx.records.len(), 1);
        assert_eq!(ctx.records[0].source(), "a");
        assert_eq!(ctx.total_relevance, 0.9);
        assert_eq!(ctx.estimated_tokens, 500);
        assert_eq!(ctx.token_budget, 1200);
    }

    #[tokio::test]
    async fn records_sorted_with_ties_in_declaration_order() {
        let agg = aggregator(vec![
            Scripted::record("x", "first tie", 0.5),
            Scripted::record("y", "highest", 0.8),
            Scripted::record("z", "second tie", 0.5),
            Scripted::record("w", "lowest", 0.1),
        ]);
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        let order: Vec<&str> = ctx.records.iter().map(|r| r.source()).collect();
        assert_eq!(order, vec!["y", "x", "z", "w"]);
        assert_eq!(
            ctx.summary_text,
            "y: highest\nx: first tie\nz: second tie\nw: lowest"
        );
        assert!(ctx.estimated_tokens <= ctx.token_budget);
    }

    #[tokio::test]
    async fn total_relevance_is_exact_sum() {
        let agg = aggregator(vec![
            Scripted::record("a", "one", 0.1),
            Scripted::record("b", "two", 0.2),
            Scripted::record("c", "three", 0.7),
        ]);
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(ctx.total_relevance, sum(&ctx.records));
        assert_eq!(ctx.by_source().len(), 3);
    }

    #[tokio::test]
    async fn identical_calls_hit_cache() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]);

        let first = agg.fetch(FetchRequest::new("p1", "Chest pain")).await.unwrap();
        let second = agg
            .fetch(FetchRequest::new("p1", "  chest   PAIN "))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(a.calls(), 1);
        assert_eq!(agg.stats().cache.hits, 1);

        let other = agg
            .fetch(FetchRequest::new("p1", "Chest pain").with_conversation("c9"))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_expires_after_ttl() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]);
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn filtered_or_custom_budget_requests_bypass_cache() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]);
        for _ in 0..2 {
            agg.fetch(FetchRequest::new("p1", "q").only(["a"])).await.unwrap();
        }
        assert_eq!(a.calls(), 2);
        for _ in 0..2 {
            agg.fetch(FetchRequest::new("p1", "q").with_budget(50)).await.unwrap();
        }
        assert_eq!(a.calls(), 4);
        assert_eq!(agg.stats().cache.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_contributor_bounded_by_timeout() {
        let agg = aggregator(vec![
            Scripted::with("slow", Behavior::Hang),
            Scripted::record("fast", "done", 0.4),
        ]);
        let started = tokio::time::Instant::now();
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed <= Duration::from_millis(2000) + Duration::from_millis(50));
        assert_eq!(ctx.records.len(), 1);
        assert_eq!(ctx.records[0].source(), "fast");
        assert_eq!(ctx.failures.len(), 1);
        assert_eq!(ctx.failures[0].contributor, "slow");
        assert_eq!(ctx.failures[0].kind, FailureKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn contributors_run_concurrently() {
        let delay = Duration::from_millis(1500);
        let agg = aggregator(vec![
            Scripted::with("a", Behavior::Slow(delay, 0.7)),
            Scripted::with("b", Behavior::Slow(delay, 0.5)),
            Scripted::with("c", Behavior::Slow(delay, 0.3)),
        ]);
        let started = tokio::time::Instant::now();
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(2000), "took {elapsed:?}");
        assert!(ctx.failures.is_empty());
        let order: Vec<&str> = ctx.records.iter().map(|r| r.source()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unavailable_and_panicking_contributors_are_tolerated() {
        let agg = aggregator(vec![
            Scripted::with("broken", Behavior::Fail),
            Scripted::with("buggy", Behavior::Panic),
            Scripted::record("ok", "fine", 0.3),
        ]);
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(ctx.records.len(), 1);
        let kinds: Vec<(&str, FailureKind)> = ctx
            .failures
            .iter()
            .map(|f| (f.contributor.as_str(), f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("broken", FailureKind::Unavailable),
                ("buggy", FailureKind::Unavailable)
            ]
        );
    }

    #[tokio::test]
    async fn unknown_filter_yields_empty_context() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]);
        let ctx = agg
            .fetch(FetchRequest::new("p1", "q").only(["nope"]))
            .await
            .unwrap();
        assert!(ctx.records.is_empty());
        assert!(ctx.summary_text.is_empty());
        assert_eq!(ctx.total_relevance, 0.0);
        assert!(ctx.failures.is_empty());
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn oversized_single_summary_yields_nothing() {
        let agg = aggregator(vec![Scripted::record("a", &summary_of("a", 3000), 0.9)]);
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert!(ctx.records.is_empty());
        assert_eq!(ctx.estimated_tokens, 0);
        assert_eq!(ctx.total_relevance, 0.0);
    }

    #[tokio::test]
    async fn empty_summaries_kept_without_a_line() {
        let agg = aggregator(vec![
            Scripted::record("a", "", 0.0),
            Scripted::record("b", "something", 0.2),
        ]);
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(ctx.records.len(), 2);
        assert_eq!(ctx.summary_text, "b: something");
    }

    #[tokio::test]
    async fn failing_cache_never_fails_aggregation() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]).with_cache(Arc::new(FailingCache));
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        let ctx = agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(ctx.records.len(), 1);
        assert_eq!(a.calls(), 2);
        assert!(agg.clear_cache().await.is_err());
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]);
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert!(agg.invalidate("p1", "Q", None).await.unwrap());
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(a.calls(), 2);

        agg.clear_cache().await.unwrap();
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test]
    async fn blank_conversation_is_the_same_entry_as_none() {
        let a = Scripted::record("a", "one", 0.5);
        let agg = aggregator(vec![a.clone()]);
        agg.fetch(FetchRequest::new("p1", "q").with_conversation("  "))
            .await
            .unwrap();
        agg.fetch(FetchRequest::new("p1", "q")).await.unwrap();
        assert_eq!(a.calls(), 1);

        assert!(agg.invalidate("p1", "q", Some("")).await.unwrap());
        assert!(!agg.invalidate("p1", "q", None).await.unwrap());
    }

    #[tokio::test]
    async fn health_reflects_contributors() {
        let healthy = aggregator(vec![Scripted::record("a", "one", 0.5)]).health().await;
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.store, "memory");

        let degraded = aggregator(vec![]).health().await;
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert!(degraded.detail.is_some());
    }

    #[tokio::test]
    async fn classify_and_insights_validate_input() {
        let agg = aggregator(vec![]);
        assert!(matches!(agg.classify(" "), Err(Error::InvalidArgument(_))));
        assert_eq!(
            agg.classify("I want to book an appointment ASAP").unwrap().service_type,
            "Appointment Booking"
        );
        assert!(matches!(agg.insights("").await, Err(Error::InvalidArgument(_))));
        assert_eq!(agg.insights("p1").await.unwrap().total_conversations, 0);
    }

    #[tokio::test]
    async fn builtin_pipeline_over_seeded_store() {
        use medctx_core::clinical::{ChatMessage, ConversationRecord, MessageRole};

        let store = InMemoryStore::new();
        store
            .add_conversation(ConversationRecord {
                id: "c1".into(),
                subject_id: "p1".into(),
                topic: "Chest pain".into(),
                created_at: Utc::now(),
                message_count: 1,
            })
            .await;
        store
            .add_message(ChatMessage {
                id: "m1".into(),
                conversation_id: "c1".into(),
                role: MessageRole::User,
                content: "chest pain and fever".into(),
                timestamp: Utc::now(),
            })
            .await;

        let agg = Aggregator::from_config(&AppConfig::default(), Arc::new(store));
        let ctx = agg
            .fetch(FetchRequest::new("p1", "I have chest pain again"))
            .await
            .unwrap();
        assert!(ctx.record("patient_history").is_some());
        assert!(ctx.record("service_classification").is_some());
        assert!(ctx.failures.is_empty());
        assert!(ctx.estimated_tokens <= 2000);
        assert_eq!(ctx.total_relevance, sum(&ctx.records));
        let relevances: Vec<f64> = ctx.records.iter().map(|r| r.relevance()).collect();
        assert!(relevances.windows(2).all(|w| w[0] >= w[1]));
    }
}
