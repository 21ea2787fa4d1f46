//! Workflow error taxonomy.
//!
//! Classifier and verifier parse failures are fatal to the current turn.
//! Retrieval misses never show up here: they fold into an empty bundle.

use incident_common::LlmError;
use serde::Serialize;

/// Workflow step that talked to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FollowUp,
    Classify,
    CasualReply,
    HistoricReply,
    GroundedReply,
    Verify,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FollowUp => "follow_up",
            Self::Classify => "classify",
            Self::CasualReply => "casual_reply",
            Self::HistoricReply => "historic_reply",
            Self::GroundedReply => "grounded_reply",
            Self::Verify => "verify",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Model output could not be parsed into the expected structure
    #[error("{stage}: model output violated the expected schema: {detail}")]
    SchemaViolation { stage: Stage, detail: String },

    #[error("{stage}: language model call failed: {source}")]
    Llm {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("turn did not complete within {0} seconds")]
    Timeout(u64),
}

impl WorkflowError {
    pub fn schema(stage: Stage, detail: impl Into<String>) -> Self {
        Self::SchemaViolation {
            stage,
            detail: detail.into(),
        }
    }

    pub fn llm(stage: Stage) -> impl FnOnce(LlmError) -> Self {
        move |source| Self::Llm { stage, source }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::SchemaViolation { stage, .. } | Self::Llm { stage, .. } => Some(*stage),
            Self::Timeout(_) => None,
        }
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::SchemaViolation { .. })
    }
}
