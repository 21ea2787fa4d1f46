//! Retrieval aggregator: fans lookups out to the store and merges them.
//!
//! Incident identifiers and free-text phrases are looked up independently
//! with different filters and result counts. Feedback lookups run alongside
//! and only ever feed the evidence string, never the returned metadata.

use futures::future::join_all;
use incident_common::{
    Document, Metadata, MetadataFilter, RetrievalStore, DOC_TYPE, FEEDBACK_TYPE,
    INCIDENT_NUMBER_KEY,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Merged retrieval results for one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalBundle {
    /// Primary-corpus documents in lookup order
    pub documents: Vec<Document>,
    /// Feedback-corpus documents in lookup order
    pub feedback: Vec<Document>,
}

impl RetrievalBundle {
    /// No primary documents were found; feedback alone does not ground an answer
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Metadata of the primary documents, one entry per document
    pub fn metadata(&self) -> Vec<Metadata> {
        self.documents.iter().map(|d| d.metadata.clone()).collect()
    }

    /// Evidence string for the synthesizer. Primary documents are numbered
    /// `[1]..[n]` so `[i]` cites `metadata()[i - 1]`; feedback follows.
    pub fn evidence(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut lines: Vec<String> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, d)| format!("[{}] {}", i + 1, d.content.trim_end()))
            .collect();
        lines.extend(
            self.feedback
                .iter()
                .map(|d| format!("[feedback] {}", d.content.trim_end())),
        );
        lines.join("\n")
    }
}

/// One store lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub query: String,
    pub k: usize,
    pub filter: MetadataFilter,
}

impl Lookup {
    pub fn incident(id: &str, k: usize) -> Self {
        Self {
            query: id.to_string(),
            k,
            filter: MetadataFilter::corpus(DOC_TYPE).eq(INCIDENT_NUMBER_KEY, id),
        }
    }

    pub fn phrase(phrase: &str, k: usize) -> Self {
        Self {
            query: phrase.to_string(),
            k,
            filter: MetadataFilter::corpus(DOC_TYPE),
        }
    }

    pub fn feedback(phrase: &str, k: usize) -> Self {
        Self {
            query: phrase.to_string(),
            k,
            filter: MetadataFilter::corpus(FEEDBACK_TYPE),
        }
    }
}

pub struct RetrievalAggregator {
    store: Arc<dyn RetrievalStore>,
    incident_k: usize,
    query_k: usize,
    feedback_k: usize,
}

impl RetrievalAggregator {
    pub fn new(
        store: Arc<dyn RetrievalStore>,
        incident_k: usize,
        query_k: usize,
        feedback_k: usize,
    ) -> Self {
        Self {
            store,
            incident_k,
            query_k,
            feedback_k,
        }
    }

    /// Primary-corpus lookups: incident identifiers first, then phrases
    pub fn plan(&self, search_queries: &[String], incident_numbers: &[String]) -> Vec<Lookup> {
        incident_numbers
            .iter()
            .map(|id| Lookup::incident(id, self.incident_k))
            .chain(
                search_queries
                    .iter()
                    .map(|q| Lookup::phrase(q, self.query_k)),
            )
            .collect()
    }

    /// Run all lookups concurrently and merge them in plan order
    pub async fn retrieve(
        &self,
        search_queries: &[String],
        incident_numbers: &[String],
    ) -> RetrievalBundle {
        let primary = self.plan(search_queries, incident_numbers);
        let feedback: Vec<Lookup> = search_queries
            .iter()
            .map(|q| Lookup::feedback(q, self.feedback_k))
            .collect();

        if primary.is_empty() {
            debug!("Nothing to look up, returning empty bundle");
            return RetrievalBundle::default();
        }

        info!(
            "Retrieving: {} primary lookups, {} feedback lookups",
            primary.len(),
            feedback.len()
        );

        let (primary_results, feedback_results) = tokio::join!(
            join_all(primary.iter().map(|l| self.run(l))),
            join_all(feedback.iter().map(|l| self.run(l))),
        );

        let bundle = RetrievalBundle {
            documents: primary_results.into_iter().flatten().collect(),
            feedback: feedback_results.into_iter().flatten().collect(),
        };
        info!(
            "Retrieved {} documents and {} feedback entries",
            bundle.documents.len(),
            bundle.feedback.len()
        );
        bundle
    }

    /// A failed lookup degrades to no results
    async fn run(&self, lookup: &Lookup) -> Vec<Document> {
        match self
            .store
            .similarity_search(&lookup.query, lookup.k, &lookup.filter)
            .await
        {
            Ok(docs) => {
                debug!("Lookup {:?} (k={}) -> {} docs", lookup.query, lookup.k, docs.len());
                docs
            }
            Err(e) => {
                warn!("Lookup {:?} failed, treating as empty: {}", lookup.query, e);
                Vec::new()
            }
        }
    }
}
