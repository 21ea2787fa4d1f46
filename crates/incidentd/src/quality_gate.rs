//! Quality gate: judges whether an answer minimally resolves a query.

use crate::error::{Stage, WorkflowError};
use crate::json_output::parse_json;
use crate::prompts;
use incident_common::{LlmClient, LlmRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Sufficiency verdict; `reflection` is non-empty only when insufficient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationVerdict {
    pub is_sufficient: bool,
    pub reflection: String,
}

impl VerificationVerdict {
    pub fn sufficient() -> Self {
        Self {
            is_sufficient: true,
            reflection: String::new(),
        }
    }

    pub fn insufficient(reflection: impl Into<String>) -> Self {
        Self {
            is_sufficient: false,
            reflection: reflection.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    is_sufficient: Option<Value>,
    #[serde(default)]
    reflection: Option<String>,
}

/// Validate raw verifier output
pub fn parse_verdict(reply: &str) -> Result<VerificationVerdict, WorkflowError> {
    let raw: RawVerdict =
        parse_json(reply).map_err(|e| WorkflowError::schema(Stage::Verify, e))?;

    let is_sufficient = match &raw.is_sufficient {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        Some(other) => {
            return Err(WorkflowError::schema(
                Stage::Verify,
                format!("is_sufficient must be a boolean, got {}", other),
            ))
        }
        None => return Err(WorkflowError::schema(Stage::Verify, "missing is_sufficient")),
    };

    if is_sufficient {
        return Ok(VerificationVerdict::sufficient());
    }

    let reflection = raw.reflection.unwrap_or_default().trim().to_string();
    if reflection.is_empty() {
        return Err(WorkflowError::schema(
            Stage::Verify,
            "insufficient verdict without a reflection",
        ));
    }
    Ok(VerificationVerdict::insufficient(reflection))
}

pub struct QualityGate {
    llm: Arc<dyn LlmClient>,
}

impl QualityGate {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn verify(
        &self,
        query: &str,
        answer: &str,
    ) -> Result<VerificationVerdict, WorkflowError> {
        let request = LlmRequest::prompt(prompts::verify_prompt(query, answer)).json();
        let reply = self
            .llm
            .generate(&request)
            .await
            .map_err(WorkflowError::llm(Stage::Verify))?;
        let verdict = parse_verdict(&reply)?;
        if verdict.is_sufficient {
            info!("Quality gate: answer is sufficient");
        } else {
            info!("Quality gate: insufficient, reflection={:?}", verdict.reflection);
        }
        Ok(verdict)
    }
}
