//! Intent classifier: follow-up detection and query-type classification.

use crate::error::{Stage, WorkflowError};
use crate::json_output::parse_json;
use crate::prompts;
use incident_common::{normalize_incident_number, ChatMessage, LlmClient, LlmRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolution strategy for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Casual,
    Historic,
    NeedsSearch,
}

impl QueryType {
    /// Parse the model's label; accepts `historical` and any casing
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "casual" => Some(Self::Casual),
            "historic" | "historical" => Some(Self::Historic),
            "needs_search" => Some(Self::NeedsSearch),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Casual => "casual",
            Self::Historic => "historic",
            Self::NeedsSearch => "needs_search",
        };
        write!(f, "{}", s)
    }
}

/// Classification of one pass; never merged across passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub query_type: QueryType,
    pub search_queries: Vec<String>,
    pub incident_numbers: Vec<String>,
}

/// Raw classifier output as the model emits it
#[derive(Debug, Deserialize)]
struct RawClassification {
    query_type: String,
    #[serde(default)]
    search_queries: Vec<String>,
    #[serde(default, alias = "incident_numbers")]
    list_of_incident_numbers: Vec<String>,
}

/// Map a YES/NO reply to a boolean
pub fn parse_yes_no(reply: &str) -> Result<bool, WorkflowError> {
    let upper = reply.to_ascii_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();
    let yes = words.iter().any(|w| *w == "YES");
    let no = words.iter().any(|w| *w == "NO");
    match (yes, no) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        _ => Err(WorkflowError::schema(
            Stage::FollowUp,
            format!("expected YES or NO, got {:?}", reply.trim()),
        )),
    }
}

/// Validate raw output into a `Classification`
fn validate(
    raw: RawClassification,
    max_search_queries: usize,
    is_reflection: bool,
) -> Result<Classification, WorkflowError> {
    let mut query_type = QueryType::from_label(&raw.query_type).ok_or_else(|| {
        WorkflowError::schema(
            Stage::Classify,
            format!("unknown query_type {:?}", raw.query_type),
        )
    })?;

    if is_reflection && query_type != QueryType::NeedsSearch {
        warn!(
            "Reflection query classified as {}, forcing needs_search",
            query_type
        );
        query_type = QueryType::NeedsSearch;
    }

    let mut search_queries: Vec<String> = raw
        .search_queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if search_queries.len() > max_search_queries {
        warn!(
            "Classifier returned {} search phrases, keeping first {}",
            search_queries.len(),
            max_search_queries
        );
        search_queries.truncate(max_search_queries);
    }

    let mut incident_numbers: Vec<String> = Vec::new();
    for raw_id in raw.list_of_incident_numbers {
        let id = normalize_incident_number(&raw_id);
        if !id.is_empty() && !incident_numbers.contains(&id) {
            incident_numbers.push(id);
        }
    }

    Ok(Classification {
        query_type,
        search_queries,
        incident_numbers,
    })
}

/// Model-backed classifier
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    max_search_queries: usize,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, max_search_queries: usize) -> Self {
        Self {
            llm,
            max_search_queries,
        }
    }

    /// Whether `query` builds on the last exchange of `prior`.
    /// Empty history is never a follow-up and costs no model call.
    pub async fn detect_follow_up(
        &self,
        prior: &[ChatMessage],
        query: &str,
    ) -> Result<bool, WorkflowError> {
        if prior.is_empty() {
            debug!("No prior history, not a follow-up");
            return Ok(false);
        }
        let request = LlmRequest::prompt(prompts::follow_up_prompt(prior, query));
        let reply = self
            .llm
            .generate(&request)
            .await
            .map_err(WorkflowError::llm(Stage::FollowUp))?;
        let is_follow_up = parse_yes_no(&reply)?;
        info!("Follow-up check: {}", is_follow_up);
        Ok(is_follow_up)
    }

    /// Classify the current query. Parse failures are not retried.
    pub async fn classify(
        &self,
        history: &[ChatMessage],
        query: &str,
        is_follow_up: bool,
        is_reflection: bool,
    ) -> Result<Classification, WorkflowError> {
        let prompt = prompts::classify_prompt(history, query, is_follow_up, is_reflection);
        let reply = self
            .llm
            .generate(&LlmRequest::prompt(prompt).json())
            .await
            .map_err(WorkflowError::llm(Stage::Classify))?;

        let raw: RawClassification =
            parse_json(&reply).map_err(|e| WorkflowError::schema(Stage::Classify, e))?;
        let classification = validate(raw, self.max_search_queries, is_reflection)?;

        info!(
            "Classified as {} (search_queries={:?}, incident_numbers={:?})",
            classification.query_type,
            classification.search_queries,
            classification.incident_numbers
        );
        Ok(classification)
    }
}
