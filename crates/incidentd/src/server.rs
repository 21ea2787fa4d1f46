//! HTTP server for incidentd

use crate::routes;
use crate::session::ConversationStore;
use crate::workflow::Workflow;
use anyhow::Result;
use axum::Router;
use incident_common::RetrievalStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub sessions: Arc<ConversationStore>,
    /// Write side of the retrieval store, used for feedback archiving
    pub store: Arc<dyn RetrievalStore>,
    /// Upper bound on one conversational turn
    pub request_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        workflow: Arc<Workflow>,
        store: Arc<dyn RetrievalStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            workflow,
            sessions: Arc::new(ConversationStore::new()),
            store,
            request_timeout,
            start_time: Instant::now(),
        }
    }
}

/// Build the router with every route group mounted under `prefix`
pub fn build_router(state: Arc<AppState>, prefix: &str) -> Router {
    let api = Router::new()
        .merge(routes::search_routes())
        .merge(routes::feedback_routes())
        .merge(routes::health_routes());

    let prefix = prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else if prefix.starts_with('/') {
        Router::new().nest(prefix, api)
    } else {
        Router::new().nest(&format!("/{}", prefix), api)
    };

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server
pub async fn run(state: AppState, bind: &str, prefix: &str) -> Result<()> {
    let app = build_router(Arc::new(state), prefix);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("  Listening on http://{}{}", bind, prefix.trim_end_matches('/'));

    axum::serve(listener, app).await?;
    Ok(())
}
