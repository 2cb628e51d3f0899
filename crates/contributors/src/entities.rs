//! Regex-based medical entity extraction.
//!
//! Pulls symptom words, time references, and body parts out of free text.
//! Results are lowercased, deduplicated, and sorted so downstream scoring
//! and summaries are deterministic.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static SYMPTOM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(pain|ache|fever|cough|nausea|vomiting|dizziness|fatigue|headache)\b",
        r"\b(swelling|rash|itching|bleeding|burning|numbness)\b",
    ])
});

static TIME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b\d+\s*(?:day|week|month|year)s?\s*ago\b",
        r"\b(?:today|yesterday|last\s+\w+|this\s+\w+)\b",
    ])
});

static BODY_PART_PATTERN: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(head|chest|stomach|abdomen|back|leg|arm|hand|foot|eye|ear|throat|heart|lung)s?\b",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

/// Entities found in one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicalEntities {
    pub symptoms: Vec<String>,
    pub time_references: Vec<String>,
    pub body_parts: Vec<String>,
}

/// Extract every entity kind from `text`.
pub fn extract(text: &str) -> MedicalEntities {
    let lower = text.to_lowercase();
    MedicalEntities {
        symptoms: first_groups(&SYMPTOM_PATTERNS, &lower),
        time_references: whole_matches(&TIME_PATTERNS, &lower),
        body_parts: first_groups(&BODY_PART_PATTERN, &lower),
    }
}

/// Only the symptom words of `text`.
pub fn symptoms(text: &str) -> Vec<String> {
    first_groups(&SYMPTOM_PATTERNS, &text.to_lowercase())
}

fn first_groups(patterns: &[Regex], text: &str) -> Vec<String> {
    let found: BTreeSet<String> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();
    found.into_iter().collect()
}

fn whole_matches(patterns: &[Regex], text: &str) -> Vec<String> {
    let found: BTreeSet<String> = patterns
        .iter()
        .flat_map(|re| re.find_iter(text))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(SYMPTOM_PATTERNS.len(), 2);
        assert_eq!(TIME_PATTERNS.len(), 2);
        assert_eq!(BODY_PART_PATTERN.len(), 1);
    }

    #[test]
    fn symptoms_are_deduplicated_and_sorted() {
        let found = symptoms("Fever since Monday, then a COUGH, and the fever is back");
        assert_eq!(found, vec!["cough", "fever"]);
    }

    #[test]
    fn whole_words_only() {
        assert!(symptoms("painting the fence").is_empty());
        assert_eq!(symptoms("headache"), vec!["headache"]);
    }

    #[test]
    fn time_references_and_body_parts() {
        let entities = extract("Chest pain started 3 days ago, worse since yesterday; my arms feel numb");
        assert_eq!(entities.time_references, vec!["3 days ago", "yesterday"]);
        assert_eq!(entities.body_parts, vec!["arm", "chest"]);
        assert_eq!(entities.symptoms, vec!["pain"]);
    }

    #[test]
    fn nothing_in_small_talk() {
        assert_eq!(extract("hello there"), MedicalEntities::default());
    }
}
