//! Answer synthesizer: casual, history-only and evidence-grounded replies.

use crate::aggregator::RetrievalBundle;
use crate::error::{Stage, WorkflowError};
use crate::prompts;
use incident_common::{ChatMessage, LlmClient, LlmRequest};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Short conversational reply; no evidence, no citations
    pub async fn casual(
        &self,
        history: &[ChatMessage],
        query: &str,
    ) -> Result<String, WorkflowError> {
        let request = LlmRequest::prompt(prompts::casual_prompt(history, query));
        self.call(Stage::CasualReply, &request).await
    }

    /// Reply derived from the conversation alone
    pub async fn historic(
        &self,
        history: &[ChatMessage],
        query: &str,
    ) -> Result<String, WorkflowError> {
        let request = LlmRequest::chat(prompts::historic_messages(history, query));
        self.call(Stage::HistoricReply, &request).await
    }

    /// Cited reply grounded in retrieved evidence. An empty bundle still
    /// produces an answer, one that reports the miss.
    pub async fn grounded(
        &self,
        history: &[ChatMessage],
        original_query: &str,
        current_query: &str,
        bundle: &RetrievalBundle,
    ) -> Result<String, WorkflowError> {
        if bundle.is_empty() {
            warn!("No evidence retrieved, synthesizing without research context");
        }
        let prompt =
            prompts::grounded_prompt(history, original_query, current_query, &bundle.evidence());
        self.call(Stage::GroundedReply, &LlmRequest::prompt(prompt))
            .await
    }

    async fn call(&self, stage: Stage, request: &LlmRequest) -> Result<String, WorkflowError> {
        let answer = self
            .llm
            .generate(request)
            .await
            .map_err(WorkflowError::llm(stage))?;
        info!("{} produced {} chars", stage, answer.len());
        Ok(answer.trim().to_string())
    }
}
