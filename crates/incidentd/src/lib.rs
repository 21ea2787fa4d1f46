//! incidentd - conversational question answering over incident tickets.
//!
//! Each turn runs a small state machine: follow-up detection and intent
//! classification pick one of three answer strategies, search answers are
//! grounded in retrieved incident records, and a quality gate either
//! accepts the answer or turns its critique into the next query.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod feedback;
pub mod ingest;
pub mod json_output;
pub mod prompts;
pub mod quality_gate;
pub mod routes;
pub mod server;
pub mod session;
pub mod synthesizer;
pub mod workflow;

pub use error::{Stage, WorkflowError};
pub use session::{ConversationStore, HISTORY_WINDOW};
pub use workflow::{TurnOutcome, Workflow};
