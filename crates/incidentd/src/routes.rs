//! API routes for incidentd
//!
//! Every group is mounted under the configured route prefix
//! (`/rag-api` by default).

use crate::error::WorkflowError;
use crate::feedback::archive_feedback;
use crate::server::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use incident_common::{FeedbackRecord, Metadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

type AppStateArc = Arc<AppState>;

/// Message returned when feedback archiving fails for an unexpected reason
pub const FEEDBACK_INTERNAL_ERROR: &str =
    "An internal error occurred while archiving the feedback.";

/// Message returned when the feedback store has not been created
pub const STORE_UNAVAILABLE: &str =
    "Could not load the vector database. Ensure it has been created.";

/// Error body: `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let status = match &e {
            WorkflowError::SchemaViolation { .. } | WorkflowError::Llm { .. } => {
                StatusCode::BAD_GATEWAY
            }
            WorkflowError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        Self::new(status, e.to_string())
    }
}

// ============================================================================
// Search Routes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub result: String,
    pub documents: Vec<Metadata>,
    pub session_id: String,
}

pub fn search_routes() -> Router<AppStateArc> {
    Router::new().route("/search_vector_documents", post(search_vector_documents))
}

async fn search_vector_documents(
    State(state): State<AppStateArc>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    info!("[Q]  Processing: {}", query);

    let timeout = state.request_timeout;
    let turn = state
        .workflow
        .run_turn(&state.sessions, req.session_id.as_deref(), query);
    let outcome = match tokio::time::timeout(timeout, turn).await {
        Ok(result) => result.map_err(|e| {
            error!("  Turn failed: {}", e);
            ApiError::from(e)
        })?,
        Err(_) => {
            warn!("  Turn exceeded {}s", timeout.as_secs());
            return Err(WorkflowError::Timeout(timeout.as_secs()).into());
        }
    };

    if outcome.revisions_exhausted {
        warn!(
            "  Returning best-effort answer after {} revisions",
            outcome.revisions
        );
    }

    Ok(Json(SearchResponse {
        result: outcome.answer,
        documents: outcome.metadata,
        session_id: outcome.session_id,
    }))
}

// ============================================================================
// Feedback Routes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub status: String,
    pub message: String,
}

pub fn feedback_routes() -> Router<AppStateArc> {
    Router::new().route("/incident_feedback", post(submit_incident_feedback))
}

async fn submit_incident_feedback(
    State(state): State<AppStateArc>,
    Json(req): Json<FeedbackRecord>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    match archive_feedback(state.store.as_ref(), &req).await {
        Ok(_) => Ok(Json(FeedbackResponse {
            status: "success".to_string(),
            message: "Incident feedback has been successfully archived. Thank you!".to_string(),
        })),
        Err(e) if e.is_unavailable() => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            STORE_UNAVAILABLE,
        )),
        Err(e) => {
            error!("  Failed to process incident feedback: {}", e);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                FEEDBACK_INTERNAL_ERROR,
            ))
        }
    }
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: usize,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        sessions: state.sessions.count().await,
    })
}
