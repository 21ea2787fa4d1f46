//! Incident Common - shared types and collaborator contracts for incidentd.
//!
//! The orchestration core only talks to the outside world through the
//! traits defined here: `LlmClient` for inference, `Embedder` for vectors
//! and `RetrievalStore` for similarity search over incident documents.

pub mod document;
pub mod embeddings;
pub mod incident;
pub mod llm_client;
pub mod message;
pub mod store;

pub use document::*;
pub use embeddings::{
    cosine_similarity, Embedder, EmbeddingConfig, EmbeddingError, HashingEmbedder, OllamaEmbedder,
};
pub use incident::{feedback_document, FeedbackRecord, IncidentRecord};
pub use llm_client::{
    FakeLlmClient, LlmClient, LlmConfig, LlmError, LlmRequest, OllamaClient, OutputFormat,
};
pub use message::{render_transcript, ChatMessage, Role};
pub use store::{JsonVectorStore, RetrievalStore, StoreError};
