//! Keyword-based topic detection.
//!
//! A [`TopicTable`] is an ordered list of rules. Each rule names a topic, a
//! human-readable label for context summaries, the lowercase keywords that
//! signal it, and optionally the canned paragraph served when the provider
//! is unavailable and the message mentions the topic.

use crate::error::{Result, TutorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRule {
    pub topic: String,
    pub label: String,
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl TopicRule {
    pub fn new(topic: &str, label: &str, keywords: &[&str]) -> Self {
        Self {
            topic: topic.to_string(),
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Substring match against already-lowercased text.
    fn matches_lowercase(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|kw| lowered.contains(kw.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicTable(pub Vec<TopicRule>);

impl TopicTable {
    pub fn new(rules: Vec<TopicRule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[TopicRule] {
        &self.0
    }

    pub fn label_of(&self, topic: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|r| r.topic == topic)
            .map(|r| r.label.as_str())
    }

    /// First rule, in table order, that mentions `text` and carries a fallback.
    pub fn fallback_for(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.0
            .iter()
            .filter(|r| r.fallback.is_some())
            .find(|r| r.matches_lowercase(&lowered))
            .and_then(|r| r.fallback.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for rule in &self.0 {
            if rule.topic.trim().is_empty() {
                return Err(TutorError::Config("topic name must not be empty".into()));
            }
            if !seen.insert(rule.topic.as_str()) {
                return Err(TutorError::Config(format!(
                    "duplicate topic '{}'",
                    rule.topic
                )));
            }
            if rule.keywords.iter().any(|k| k.is_empty() || *k != k.to_lowercase()) {
                return Err(TutorError::Config(format!(
                    "topic '{}': keywords must be non-empty and lowercase",
                    rule.topic
                )));
            }
        }
        Ok(())
    }
}

/// Every topic whose keyword list has a case-insensitive substring match in `text`.
pub fn classify(text: &str, table: &TopicTable) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    table
        .0
        .iter()
        .filter(|r| r.matches_lowercase(&lowered))
        .map(|r| r.topic.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TopicTable {
        TopicTable::new(vec![
            TopicRule::new("python", "Python", &["python", "питон"]).with_fallback("py"),
            TopicRule::new("web", "веб-разработка", &["html", "css"]),
            TopicRule::new("database", "базы данных", &["sql", "база данных"]).with_fallback("db"),
        ])
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let topics = classify("Как подключить SQL из PYTHON?", &table());
        assert_eq!(
            topics.into_iter().collect::<Vec<_>>(),
            vec!["database".to_string(), "python".to_string()]
        );
    }

    #[test]
    fn test_classify_no_match() {
        assert!(classify("расскажи анекдот", &table()).is_empty());
    }

    #[test]
    fn test_fallback_follows_table_order() {
        let t = table();
        assert_eq!(t.fallback_for("Питон и SQL"), Some("py"));
        assert_eq!(t.fallback_for("только SQL"), Some("db"));
        // web has no fallback
        assert_eq!(t.fallback_for("html вёрстка"), None);
    }

    #[test]
    fn test_validate_rejects_uppercase_keyword() {
        let t = TopicTable::new(vec![TopicRule::new("api", "API", &["REST"])]);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_topics() {
        let t = TopicTable::new(vec![
            TopicRule::new("api", "API", &["rest"]),
            TopicRule::new("api", "API", &["endpoint"]),
        ]);
        assert!(t.validate().is_err());
    }
}
