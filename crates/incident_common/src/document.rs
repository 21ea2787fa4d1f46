//! Documents held by the retrieval store and the filters used to query them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to a document (flat JSON object)
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key carrying the corpus tag
pub const TYPE_KEY: &str = "type";

/// Metadata key carrying the (lower-cased) incident identifier
pub const INCIDENT_NUMBER_KEY: &str = "incident_number";

/// Corpus tag for incident ticket documents
pub const DOC_TYPE: &str = "doc";

/// Corpus tag for archived user feedback
pub const FEEDBACK_TYPE: &str = "feedback";

/// A retrievable unit of text plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata insertion
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Corpus tag, if any
    pub fn doc_type(&self) -> Option<&str> {
        self.metadata.get(TYPE_KEY).and_then(|v| v.as_str())
    }
}

/// Conjunction of equality predicates over document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    predicates: Vec<(String, Value)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key == value` to the conjunction
    pub fn eq(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.predicates.push((key.to_string(), value.into()));
        self
    }

    /// Filter for a single corpus
    pub fn corpus(doc_type: &str) -> Self {
        Self::new().eq(TYPE_KEY, doc_type)
    }

    pub fn predicates(&self) -> &[(String, Value)] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Value required for `key`, if the filter constrains it
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.predicates
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// True when every predicate holds for the metadata. An empty filter
    /// matches everything.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.predicates
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Canonical form of an incident identifier as stored in metadata
pub fn normalize_incident_number(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_conjunction() {
        let doc = Document::new("x")
            .with_meta(TYPE_KEY, DOC_TYPE)
            .with_meta(INCIDENT_NUMBER_KEY, "inc456");

        assert!(MetadataFilter::corpus(DOC_TYPE).matches(&doc.metadata));
        assert!(MetadataFilter::corpus(DOC_TYPE)
            .eq(INCIDENT_NUMBER_KEY, "inc456")
            .matches(&doc.metadata));
        assert!(!MetadataFilter::corpus(DOC_TYPE)
            .eq(INCIDENT_NUMBER_KEY, "inc457")
            .matches(&doc.metadata));
        assert!(!MetadataFilter::corpus(FEEDBACK_TYPE).matches(&doc.metadata));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(MetadataFilter::new().matches(&Metadata::new()));
    }

    #[test]
    fn test_missing_key_does_not_match() {
        let doc = Document::new("x").with_meta(TYPE_KEY, DOC_TYPE);
        let filter = MetadataFilter::corpus(DOC_TYPE).eq(INCIDENT_NUMBER_KEY, "inc1");
        assert!(!filter.matches(&doc.metadata));
    }

    #[test]
    fn test_normalize_incident_number() {
        assert_eq!(normalize_incident_number("  INC456 "), "inc456");
    }
}
