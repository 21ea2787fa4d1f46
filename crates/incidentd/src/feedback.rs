//! Feedback archiving into the retrieval store.

use chrono::Utc;
use incident_common::{feedback_document, FeedbackRecord, RetrievalStore, StoreError};
use tracing::{error, info};

/// Archive one feedback record as a `type = feedback` document. The store
/// must already exist; this never creates it.
pub async fn archive_feedback(
    store: &dyn RetrievalStore,
    record: &FeedbackRecord,
) -> Result<String, StoreError> {
    let document = feedback_document(record, Utc::now());
    info!("Adding incident feedback document");

    let ids = store.add_documents(vec![document]).await.map_err(|e| {
        error!("Failed to archive incident feedback: {}", e);
        e
    })?;
    let id = ids.into_iter().next().unwrap_or_default();
    info!("Incident feedback stored as {}", id);
    Ok(id)
}
