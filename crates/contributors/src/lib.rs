//! Built-in context contributors for medctx.
//!
//! Four independent sources of context, each reading the clinical store:
//! patient history, service classification, the curated knowledge base,
//! and anonymized cross-patient intelligence.

pub mod classifier;
pub mod entities;
pub mod knowledge_base;
pub mod medical_intelligence;
pub mod patient_history;
pub mod service_classification;

use medctx_config::AppConfig;
use medctx_core::clinical::ClinicalStore;
use medctx_core::contributor::{Contributor, ContributorSet};
use std::sync::Arc;
use std::time::Duration;

pub use classifier::{Classification, ClassifierStats, ServiceClassifier};
pub use knowledge_base::KnowledgeBaseContributor;
pub use medical_intelligence::MedicalIntelligenceContributor;
pub use patient_history::PatientHistoryContributor;
pub use service_classification::ServiceClassificationContributor;

/// Names of every built-in contributor, in declaration order.
pub const BUILTIN: [&str; 4] = [
    patient_history::NAME,
    service_classification::NAME,
    knowledge_base::NAME,
    medical_intelligence::NAME,
];

/// Build the classifier with accuracy overrides from config.
pub fn build_classifier(config: &AppConfig) -> Arc<ServiceClassifier> {
    Arc::new(ServiceClassifier::with_accuracy(&config.classifier.accuracy))
}

/// Create the default contributor set.
///
/// `context.enabled_contributors` restricts which built-ins are registered;
/// an empty list registers all of them. Declaration order is fixed
/// regardless of the order names appear in config.
pub fn default_contributors(
    store: Arc<dyn ClinicalStore>,
    classifier: Arc<ServiceClassifier>,
    config: &AppConfig,
) -> ContributorSet {
    let enabled = &config.context.enabled_contributors;
    let wanted = |name: &str| enabled.is_empty() || enabled.iter().any(|e| e == name);

    let candidates: [Arc<dyn Contributor>; 4] = [
        Arc::new(PatientHistoryContributor::new(Arc::clone(&store))),
        Arc::new(ServiceClassificationContributor::new(classifier)),
        Arc::new(KnowledgeBaseContributor::new(
            Arc::clone(&store),
            Duration::from_secs(config.knowledge.specialty_cache_ttl_secs),
            config.knowledge.min_entry_relevance,
        )),
        Arc::new(MedicalIntelligenceContributor::new(
            store,
            config.intelligence.lookback_days,
        )),
    ];

    let mut set = ContributorSet::new();
    for contributor in candidates {
        if wanted(contributor.name()) {
            set.register(contributor);
        }
    }
    for name in enabled {
        if !BUILTIN.contains(&name.as_str()) {
            tracing::warn!(contributor = %name, "Unknown contributor in config, ignoring");
        }
    }
    tracing::debug!(contributors = ?set.names(), "Contributor set built");
    set
}
