//! Keyword + pattern service classifier.
//!
//! Each service type carries a keyword list and a handful of regex patterns.
//! A query's score for a type is
//! `0.6 * min(keyword_hits / 3, 1) + 0.4 * min(pattern_hits / 2, 1)`.
//! The highest score wins; ties go to the type declared first.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fallback service type when nothing scores.
pub const GENERAL_QUERY: &str = "General Query";
const GENERAL_QUERY_CONFIDENCE: f64 = 0.3;
const FALLBACK_ACCURACY: f64 = 0.76;
const ALTERNATIVE_THRESHOLD: f64 = 0.3;
const MAX_ALTERNATIVES: usize = 3;

struct ServiceDef {
    name: &'static str,
    keywords: &'static [&'static str],
    patterns: &'static [&'static str],
    accuracy: f64,
}

const SERVICES: &[ServiceDef] = &[
    ServiceDef {
        name: "Health Query",
        keywords: &[
            "pain", "symptom", "sick", "fever", "cough", "headache", "dizzy", "nausea", "ache",
            "hurt", "feel", "doctor", "diagnosis", "treatment", "prescription", "medication",
            "allergy", "condition", "disease", "injury", "bleeding",
        ],
        patterns: &[
            r"\b(how|what|why|when).*(feel|symptom|pain|sick)\b",
            r"\b(i have|experiencing|suffering from)\b",
            r"\b(can you (help|tell|explain))\b",
        ],
        accuracy: 0.95,
    },
    ServiceDef {
        name: "Appointment Booking",
        keywords: &[
            "appointment", "schedule", "book", "meeting", "visit", "available", "slot", "time",
            "date", "cancel", "reschedule", "see doctor", "consultation", "check-up",
        ],
        patterns: &[
            r"\b(book|schedule|make|need|want).*(appointment|visit|meeting)\b",
            r"\b(available|when can|what time)\b",
            r"\b(cancel|reschedule|change)\b.*\bappointment\b",
        ],
        accuracy: 0.97,
    },
    ServiceDef {
        name: "Phlebotomy",
        keywords: &[
            "blood test", "lab test", "blood work", "sample", "phlebotomy", "draw blood",
            "blood collection", "test results", "lab results",
        ],
        patterns: &[r"\b(blood|lab).*(test|work|sample|result)\b", r"\bphlebotomy\b"],
        accuracy: 1.0,
    },
    ServiceDef {
        name: "Insurance Query",
        keywords: &[
            "insurance", "coverage", "claim", "copay", "deductible", "premium", "benefits",
            "policy", "billing", "cost", "payment", "covered", "provider network",
        ],
        patterns: &[
            r"\b(insurance|coverage).*(question|query|covered|cost)\b",
            r"\b(copay|deductible|premium|claim)\b",
        ],
        accuracy: 1.0,
    },
    ServiceDef {
        name: "Tech Support",
        keywords: &[
            "app", "website", "login", "password", "error", "bug", "not working", "problem",
            "issue", "technical", "access", "account", "sign in", "reset", "portal",
        ],
        patterns: &[
            r"\b(app|website|portal).*(not working|error|problem|issue)\b",
            r"\b(can't|cannot).*(login|access|sign in)\b",
            r"\b(password|account).*(reset|forgot|recover)\b",
        ],
        accuracy: 1.0,
    },
    ServiceDef {
        name: "Attachment Shared",
        keywords: &[
            "attachment", "file", "document", "report", "image", "upload", "send", "share",
            "photo", "scan", "pdf",
        ],
        patterns: &[
            r"\b(attach|upload|send|share).*(file|document|report|image)\b",
            r"\b(see|view|check).*(attachment|report|document)\b",
        ],
        accuracy: 1.0,
    },
    ServiceDef {
        name: "Customer Experience",
        keywords: &[
            "feedback", "complaint", "suggestion", "review", "rating", "experience", "service",
            "satisfied", "unhappy", "issue",
        ],
        patterns: &[
            r"\b(feedback|complaint|suggestion)\b",
            r"\b(rate|review).*(service|experience)\b",
        ],
        accuracy: 0.85,
    },
];

const HEALTH_SPECIALTIES: &[(&str, &[&str])] = &[
    ("cardiology", &["heart", "cardiac", "chest pain", "blood pressure"]),
    ("dermatology", &["skin", "rash", "acne", "itch"]),
    ("orthopedics", &["bone", "joint", "fracture", "sprain"]),
    ("neurology", &["headache", "migraine", "seizure", "brain"]),
    ("gastro", &["stomach", "digestion", "nausea", "diarrhea"]),
    ("respiratory", &["cough", "breathing", "asthma", "lung"]),
];

struct ServiceType {
    name: &'static str,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
    accuracy: f64,
}

/// A runner-up service type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub service_type: String,
    pub confidence: f64,
}

/// The classifier's verdict for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub service_type: String,
    pub confidence: f64,
    pub sub_services: Vec<String>,
    pub alternatives: Vec<Alternative>,
    /// Historical accuracy of the winning type.
    pub accuracy: f64,
}

/// Classifier summary for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierStats {
    pub service_types: Vec<String>,
    pub accuracy_by_service: BTreeMap<String, f64>,
    pub overall_accuracy: f64,
}

/// Scores queries against the built-in service types.
pub struct ServiceClassifier {
    services: Vec<ServiceType>,
}

impl Default for ServiceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceClassifier {
    pub fn new() -> Self {
        Self::with_accuracy(&HashMap::new())
    }

    /// Build with per-type accuracy overrides (unknown names are ignored).
    pub fn with_accuracy(overrides: &HashMap<String, f64>) -> Self {
        let services = SERVICES
            .iter()
            .map(|def| ServiceType {
                name: def.name,
                keywords: def.keywords,
                patterns: def
                    .patterns
                    .iter()
                    .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
                    .collect(),
                accuracy: overrides.get(def.name).copied().unwrap_or(def.accuracy),
            })
            .collect();
        Self { services }
    }

    /// Classify one query.
    pub fn classify(&self, query: &str) -> Classification {
        let lower = query.to_lowercase();

        let mut scored: Vec<(&ServiceType, f64)> = self
            .services
            .iter()
            .map(|svc| (svc, score(svc, &lower)))
            .collect();

        if scored.iter().all(|(_, s)| *s == 0.0) {
            return Classification {
                service_type: GENERAL_QUERY.into(),
                confidence: GENERAL_QUERY_CONFIDENCE,
                sub_services: vec![],
                alternatives: vec![],
                accuracy: FALLBACK_ACCURACY,
            };
        }

        // Stable: equal scores keep declaration order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let (top, confidence) = scored[0];

        let alternatives = scored[1..]
            .iter()
            .take(MAX_ALTERNATIVES)
            .filter(|(_, s)| *s > ALTERNATIVE_THRESHOLD)
            .map(|(svc, s)| Alternative {
                service_type: svc.name.to_string(),
                confidence: *s,
            })
            .collect();

        Classification {
            service_type: top.name.to_string(),
            confidence,
            sub_services: sub_services(top.name, &lower),
            alternatives,
            accuracy: top.accuracy,
        }
    }

    /// Historical accuracy for a service type.
    pub fn accuracy_of(&self, service_type: &str) -> f64 {
        self.services
            .iter()
            .find(|s| s.name == service_type)
            .map(|s| s.accuracy)
            .unwrap_or(FALLBACK_ACCURACY)
    }

    pub fn stats(&self) -> ClassifierStats {
        let accuracy_by_service: BTreeMap<String, f64> = self
            .services
            .iter()
            .map(|s| (s.name.to_string(), s.accuracy))
            .collect();
        let overall_accuracy = if self.services.is_empty() {
            FALLBACK_ACCURACY
        } else {
            self.services.iter().map(|s| s.accuracy).sum::<f64>() / self.services.len() as f64
        };
        ClassifierStats {
            service_types: self.services.iter().map(|s| s.name.to_string()).collect(),
            accuracy_by_service,
            overall_accuracy,
        }
    }
}

fn score(svc: &ServiceType, lower: &str) -> f64 {
    let keyword_hits = svc.keywords.iter().filter(|kw| lower.contains(*kw)).count();
    let pattern_hits = svc.patterns.iter().filter(|re| re.is_match(lower)).count();
    let keyword_score = (keyword_hits as f64 / 3.0).min(1.0);
    let pattern_score = (pattern_hits as f64 / 2.0).min(1.0);
    keyword_score * 0.6 + pattern_score * 0.4
}

fn sub_services(service_type: &str, lower: &str) -> Vec<String> {
    let mut subs = Vec::new();
    match service_type {
        "Health Query" => {
            for (specialty, keywords) in HEALTH_SPECIALTIES {
                if keywords.iter().any(|kw| lower.contains(kw)) {
                    subs.push((*specialty).to_string());
                }
            }
        }
        "Appointment Booking" => {
            if lower.contains("cancel") || lower.contains("reschedule") {
                subs.push("modification".to_string());
            } else if lower.contains("book") || lower.contains("schedule") {
                subs.push("new_booking".to_string());
            }
            if ["urgent", "asap", "emergency"].iter().any(|w| lower.contains(w)) {
                subs.push("urgent".to_string());
            }
        }
        _ => {}
    }
    subs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles() {
        let classifier = ServiceClassifier::new();
        for (svc, def) in classifier.services.iter().zip(SERVICES) {
            assert_eq!(svc.patterns.len(), def.patterns.len(), "{}", def.name);
        }
    }

    #[test]
    fn health_query_with_specialty() {
        let c = ServiceClassifier::new().classify("I have chest pain and a fever since yesterday");
        assert_eq!(c.service_type, "Health Query");
        // "pain" + "fever" keywords, "i have" pattern: 0.4 + 0.2
        assert!((c.confidence - 0.6).abs() < 1e-9);
        assert!(c.sub_services.contains(&"cardiology".to_string()));
        assert_eq!(c.accuracy, 0.95);
    }

    #[test]
    fn appointment_booking_new_and_urgent() {
        let c = ServiceClassifier::new().classify("I want to book an appointment ASAP");
        assert_eq!(c.service_type, "Appointment Booking");
        assert_eq!(c.sub_services, vec!["new_booking", "urgent"]);
    }

    #[test]
    fn appointment_modification() {
        let c = ServiceClassifier::new().classify("Please cancel my appointment for Friday");
        assert_eq!(c.service_type, "Appointment Booking");
        assert_eq!(c.sub_services, vec!["modification"]);
    }

    #[test]
    fn nothing_matches_falls_back_to_general() {
        let c = ServiceClassifier::new().classify("zzz qqq");
        assert_eq!(c.service_type, GENERAL_QUERY);
        assert_eq!(c.confidence, 0.3);
        assert!(c.alternatives.is_empty());
        assert!(c.sub_services.is_empty());
    }

    #[test]
    fn score_formula() {
        let classifier = ServiceClassifier::new();
        let phlebotomy = &classifier.services[2];
        // Three keywords saturate at 0.6, two patterns at 0.4.
        let s = score(phlebotomy, "phlebotomy for my blood test and lab results");
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn alternatives_above_threshold_only() {
        let c = ServiceClassifier::new()
            .classify("my insurance claim for the blood test was denied, what does my copay cover");
        assert_eq!(c.service_type, "Insurance Query");
        assert!(c.alternatives.len() <= 3);
        assert!(c.alternatives.iter().all(|a| a.confidence > 0.3));
        assert!(c.alternatives.iter().all(|a| a.service_type != "Insurance Query"));
    }

    #[test]
    fn accuracy_overrides_and_stats() {
        let overrides: HashMap<String, f64> = [("Health Query".to_string(), 0.5)].into();
        let classifier = ServiceClassifier::with_accuracy(&overrides);
        assert_eq!(classifier.accuracy_of("Health Query"), 0.5);
        assert_eq!(classifier.accuracy_of("Unknown"), 0.76);

        let stats = classifier.stats();
        assert_eq!(stats.service_types.len(), 7);
        assert_eq!(stats.service_types[0], "Health Query");
        let expected = (0.5 + 0.97 + 1.0 + 1.0 + 1.0 + 1.0 + 0.85) / 7.0;
        assert!((stats.overall_accuracy - expected).abs() < 1e-9);
    }
}
