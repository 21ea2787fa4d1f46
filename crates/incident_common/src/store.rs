//! Retrieval store contract and a JSON-persisted vector store.
//!
//! The store keeps every document with its embedding in
//! `<dir>/store.json` and answers similarity queries by brute-force cosine
//! scoring over the documents that pass the metadata filter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{Document, MetadataFilter};
use crate::embeddings::{cosine_similarity, Embedder, EmbeddingError};

const STORE_FILE: &str = "store.json";
const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Could not load the vector database at {path}. Ensure it has been created.")]
    Unavailable { path: String },

    #[error("Store IO error: {0}")]
    Io(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Similarity search over tagged documents
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Up to `k` documents matching `filter`, most similar to `query` first
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<Document>, StoreError>;

    /// Append documents; returns the ids assigned to them
    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    document: Document,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<StoredEntry>,
}

/// Vector store persisted as a single JSON file.
///
/// Several handles (the server and the ingest CLI) may share one directory.
/// Reads reload the cache whenever the file changed on disk, and writes
/// always merge into what is on disk at that moment.
pub struct JsonVectorStore {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Option<Snapshot>>,
}

/// Modification time and size of `store.json`
type Fingerprint = (Option<SystemTime>, u64);

/// Cached file contents and the fingerprint they were read at
struct Snapshot {
    entries: Vec<StoredEntry>,
    fingerprint: Fingerprint,
}

impl JsonVectorStore {
    /// Handle on an existing store. Nothing is read until first use; a
    /// missing store surfaces as `StoreError::Unavailable` at that point.
    pub fn open(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            entries: RwLock::new(None),
        }
    }

    /// Open the store, creating an empty one on disk if absent
    pub async fn create(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        let store = Self::open(dir, embedder);
        if !store.file_path().exists() {
            tokio::fs::create_dir_all(&store.dir)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            write_entries(&store.file_path(), &[]).await?;
            info!("Created empty vector store at {}", store.dir.display());
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable {
            path: self.dir.display().to_string(),
        }
    }

    /// Number of stored documents
    pub async fn len(&self) -> Result<usize, StoreError> {
        self.ensure_loaded().await?;
        Ok(self.entries.read().await.as_ref().map_or(0, |s| s.entries.len()))
    }

    async fn fingerprint(&self) -> Result<Fingerprint, StoreError> {
        match tokio::fs::metadata(self.file_path()).await {
            Ok(meta) => Ok((meta.modified().ok(), meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.unavailable()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    /// Read the file as it is now. The fingerprint is taken before the
    /// contents so a concurrent write can only cause an extra reload later.
    async fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        let fingerprint = self.fingerprint().await?;
        let raw = match tokio::fs::read_to_string(self.file_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(self.unavailable()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        let file: StoreFile =
            serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Snapshot {
            entries: file.entries,
            fingerprint,
        })
    }

    async fn ensure_loaded(&self) -> Result<(), StoreError> {
        let on_disk = self.fingerprint().await?;
        if let Some(snapshot) = self.entries.read().await.as_ref() {
            if snapshot.fingerprint == on_disk {
                return Ok(());
            }
        }

        let mut guard = self.entries.write().await;
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.fingerprint == on_disk {
                return Ok(());
            }
        }

        let snapshot = self.read_snapshot().await?;
        info!(
            "Vector store loaded from {} ({} documents)",
            self.file_path().display(),
            snapshot.entries.len()
        );
        *guard = Some(snapshot);
        Ok(())
    }
}

#[async_trait]
impl RetrievalStore for JsonVectorStore {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<Document>, StoreError> {
        self.ensure_loaded().await?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;
        let guard = self.entries.read().await;
        let entries = guard.as_ref().map_or(&[][..], |s| s.entries.as_slice());

        let mut scored: Vec<(f32, &StoredEntry)> = entries
            .iter()
            .filter(|e| filter.matches(&e.document.metadata))
            .map(|e| (cosine_similarity(&query_vec, &e.embedding), e))
            .collect();
        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let hits: Vec<Document> = scored
            .into_iter()
            .take(k)
            .map(|(_, e)| e.document.clone())
            .collect();
        debug!(query, k, hits = hits.len(), "similarity search");
        Ok(hits)
    }

    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError> {
        self.fingerprint().await?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let new_entries: Vec<StoredEntry> = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, embedding)| StoredEntry {
                id: Uuid::new_v4().to_string(),
                document,
                embedding,
            })
            .collect();
        let ids = new_entries.iter().map(|e| e.id.clone()).collect();

        // Merge into the current file contents
        let mut guard = self.entries.write().await;
        let mut snapshot = self.read_snapshot().await?;
        snapshot.entries.extend(new_entries);
        write_entries(&self.file_path(), &snapshot.entries).await?;

        snapshot.fingerprint = self.fingerprint().await.unwrap_or((None, 0));
        debug!(total = snapshot.entries.len(), "vector store written");
        *guard = Some(snapshot);
        Ok(ids)
    }
}

/// Persist atomically: write a sibling temp file then rename over the target
async fn write_entries(path: &Path, entries: &[StoredEntry]) -> Result<(), StoreError> {
    let file = StoreFile {
        version: STORE_FORMAT_VERSION,
        entries: entries.to_vec(),
    };
    let json =
        serde_json::to_string(&file).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?;
    Ok(())
}
