//! Service classification contributor: which kind of request this is.

use async_trait::async_trait;
use medctx_core::context::ContextRecord;
use medctx_core::contributor::Contributor;
use medctx_core::error::ContributorError;
use std::sync::Arc;

use crate::classifier::ServiceClassifier;

pub const NAME: &str = "service_classification";

pub struct ServiceClassificationContributor {
    classifier: Arc<ServiceClassifier>,
}

impl ServiceClassificationContributor {
    pub fn new(classifier: Arc<ServiceClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Contributor for ServiceClassificationContributor {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(
        &self,
        _subject_id: &str,
        query: &str,
        _conversation_id: Option<&str>,
    ) -> Result<ContextRecord, ContributorError> {
        let c = self.classifier.classify(query);
        let summary = format!(
            "Likely service: {} (confidence: {:.1}%)",
            c.service_type,
            c.confidence * 100.0
        );
        let alternatives: Vec<String> = c
            .alternatives
            .iter()
            .map(|a| format!("{} ({:.2})", a.service_type, a.confidence))
            .collect();

        Ok(ContextRecord::new(NAME, summary, c.confidence)
            .with("service_type", c.service_type)
            .with("confidence", c.confidence)
            .with("sub_services", c.sub_services)
            .with("alternatives", alternatives)
            .with("classification_accuracy", c.accuracy))
    }
}
