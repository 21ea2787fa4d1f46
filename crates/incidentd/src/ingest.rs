//! Incident ingestion: JSON records -> documents -> retrieval store.

use anyhow::{Context, Result};
use incident_common::{Document, IncidentRecord, RetrievalStore};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

/// Summary of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records: usize,
    pub skipped: usize,
    pub documents: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Read incident records from a JSON array file
pub fn load_records(path: &Path) -> Result<Vec<IncidentRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read incident file {}", path.display()))?;
    let records: Vec<IncidentRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse incident file {}", path.display()))?;
    Ok(records)
}

/// Convert records into documents, skipping any without an incident number
pub fn to_documents(records: &[IncidentRecord]) -> (Vec<Document>, usize) {
    let mut skipped = 0;
    let documents = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            if record.incident_number.trim().is_empty() {
                warn!("Skipping record {} without incident_number", index);
                skipped += 1;
                None
            } else {
                Some(record.to_document(index))
            }
        })
        .collect();
    (documents, skipped)
}

/// Add records to the store in batches. A failed batch is logged and
/// skipped; the remaining batches still run.
pub async fn ingest_records(
    records: &[IncidentRecord],
    store: &dyn RetrievalStore,
    batch_size: usize,
) -> IngestReport {
    let (documents, skipped) = to_documents(records);
    let mut report = IngestReport {
        records: records.len(),
        skipped,
        ..Default::default()
    };

    let batch_size = batch_size.max(1);
    for (i, batch) in documents.chunks(batch_size).enumerate() {
        report.batches += 1;
        match store.add_documents(batch.to_vec()).await {
            Ok(ids) => {
                report.documents += ids.len();
                info!("Batch {} stored {} documents", i + 1, ids.len());
            }
            Err(e) => {
                report.failed_batches += 1;
                error!("Batch {} failed: {}", i + 1, e);
            }
        }
    }

    info!(
        "Ingestion finished: {} documents from {} records ({} skipped, {} failed batches)",
        report.documents, report.records, report.skipped, report.failed_batches
    );
    report
}
