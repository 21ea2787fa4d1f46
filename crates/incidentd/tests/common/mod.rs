//! Shared fakes for the incidentd integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use incident_common::{
    Document, LlmClient, LlmError, LlmRequest, MetadataFilter, RetrievalStore, StoreError,
    DOC_TYPE, FEEDBACK_TYPE, INCIDENT_NUMBER_KEY, TYPE_KEY,
};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub query: String,
    pub k: usize,
    pub filter: MetadataFilter,
}

/// In-memory store that records every lookup and returns the first `k`
/// documents passing the filter, in insertion order
#[derive(Default)]
pub struct RecordingStore {
    docs: Mutex<Vec<Document>>,
    calls: Mutex<Vec<SearchCall>>,
}

impl RecordingStore {
    pub fn with_documents(docs: Vec<Document>) -> Self {
        Self {
            docs: Mutex::new(docs),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.docs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalStore for RecordingStore {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<Document>, StoreError> {
        self.calls.lock().unwrap().push(SearchCall {
            query: query.to_string(),
            k,
            filter: filter.clone(),
        });
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| filter.matches(&d.metadata))
            .take(k)
            .cloned()
            .collect())
    }

    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError> {
        let mut docs = self.docs.lock().unwrap();
        let ids = (docs.len()..docs.len() + documents.len())
            .map(|i| format!("doc-{}", i))
            .collect();
        docs.extend(documents);
        Ok(ids)
    }
}

/// Incident ticket document as ingestion produces it
pub fn incident_doc(number: &str, line: &str) -> Document {
    Document::new(format!("INCIDENT_NUMBER: {}\n{}", number, line))
        .with_meta(TYPE_KEY, DOC_TYPE)
        .with_meta(INCIDENT_NUMBER_KEY, number)
}

pub fn feedback_doc(text: &str) -> Document {
    Document::new(text).with_meta(TYPE_KEY, FEEDBACK_TYPE)
}

pub fn classification_json(query_type: &str, phrases: &[&str], incidents: &[&str]) -> String {
    serde_json::json!({
        "query_type": query_type,
        "search_queries": phrases,
        "list_of_incident_numbers": incidents,
    })
    .to_string()
}

pub fn verdict_json(is_sufficient: bool, reflection: &str) -> String {
    serde_json::json!({ "is_sufficient": is_sufficient, "reflection": reflection }).to_string()
}

/// Order-independent LLM fake: answers by recognising the prompt. Every
/// query is casual, every follow-up check says NO.
pub struct CasualLlm {
    pub delay: Duration,
}

#[async_trait]
impl LlmClient for CasualLlm {
    async fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = request.text();
        if text.contains("expert query analyst") {
            Ok(classification_json("casual", &[], &[]))
        } else if text.contains("single word YES or NO") {
            Ok("NO".to_string())
        } else {
            Ok("You're welcome!".to_string())
        }
    }
}
