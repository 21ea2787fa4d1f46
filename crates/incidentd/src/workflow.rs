//! Workflow controller: the state machine behind one conversational turn.
//!
//! ```text
//! follow_up_check -> classify -> casual    -> synthesize_casual -> END
//!                             -> historic  -> synthesize_historic -> verify
//!                             -> needs_search -> retrieve -> synthesize_search -> verify
//! verify -> sufficient -> END
//!        -> insufficient -> follow_up_check (reflection becomes the query)
//! ```
//!
//! Every step returns a `StateUpdate` that is folded into an owned
//! `TurnState`; nodes never mutate shared state. The revision cycle is
//! bounded by `max_revisions`.

use crate::aggregator::{RetrievalAggregator, RetrievalBundle};
use crate::classifier::{Classification, IntentClassifier, QueryType};
use crate::config::Config;
use crate::error::WorkflowError;
use crate::quality_gate::{QualityGate, VerificationVerdict};
use crate::session::{trim_history, ConversationStore};
use crate::synthesizer::AnswerSynthesizer;
use incident_common::{ChatMessage, LlmClient, Metadata, RetrievalStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Controller nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    FollowUpCheck,
    Classify,
    SynthesizeCasual,
    SynthesizeHistoric,
    Retrieve,
    SynthesizeSearch,
    Verify,
    End,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FollowUpCheck => "follow_up_check",
            Self::Classify => "classify",
            Self::SynthesizeCasual => "synthesize_casual",
            Self::SynthesizeHistoric => "synthesize_historic",
            Self::Retrieve => "retrieve",
            Self::SynthesizeSearch => "synthesize_search",
            Self::Verify => "verify",
            Self::End => "end",
        };
        write!(f, "{}", s)
    }
}

/// Branch taken after classification; depends on nothing but the type
pub fn route_after_classify(query_type: QueryType) -> Node {
    match query_type {
        QueryType::Casual => Node::SynthesizeCasual,
        QueryType::Historic => Node::SynthesizeHistoric,
        QueryType::NeedsSearch => Node::Retrieve,
    }
}

/// Branch taken after verification. An insufficient verdict loops back
/// until `revisions` reaches `max_revisions`.
pub fn route_after_verify(verdict: &VerificationVerdict, revisions: u32, max_revisions: u32) -> Node {
    if verdict.is_sufficient || revisions >= max_revisions {
        Node::End
    } else {
        Node::FollowUpCheck
    }
}

/// Output of one node
#[derive(Debug, Clone)]
pub enum StateUpdate {
    FollowUp(bool),
    Classified(Classification),
    Retrieved(RetrievalBundle),
    Answered {
        answer: String,
        metadata: Vec<Metadata>,
    },
    Verified(VerificationVerdict),
}

/// Per-turn scratch state.
///
/// Until an answer is appended, `history` ends with the user turn holding
/// the current `query`.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub original_query: String,
    pub query: String,
    pub is_reflection: bool,
    pub is_follow_up: bool,
    pub history: Vec<ChatMessage>,
    pub classification: Option<Classification>,
    pub bundle: Option<RetrievalBundle>,
    pub answer: Option<String>,
    pub metadata: Vec<Metadata>,
    pub verdict: Option<VerificationVerdict>,
    pub revisions: u32,
}

impl TurnState {
    /// Start a turn: the user's query is appended to the stored history
    pub fn new(history: Vec<ChatMessage>, query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            query: query.to_string(),
            is_reflection: false,
            is_follow_up: false,
            history: trim_history(history, [ChatMessage::user(query)]),
            classification: None,
            bundle: None,
            answer: None,
            metadata: Vec::new(),
            verdict: None,
            revisions: 0,
        }
    }

    /// History before the current query
    pub fn prior_history(&self) -> &[ChatMessage] {
        let end = self.history.len().saturating_sub(1);
        &self.history[..end]
    }

    /// Fold a node's output into the state
    pub fn apply(mut self, update: StateUpdate) -> Self {
        match update {
            StateUpdate::FollowUp(is_follow_up) => self.is_follow_up = is_follow_up,
            StateUpdate::Classified(classification) => {
                self.classification = Some(classification)
            }
            StateUpdate::Retrieved(bundle) => self.bundle = Some(bundle),
            StateUpdate::Answered { answer, metadata } => {
                self.history = trim_history(self.history, [ChatMessage::assistant(answer.clone())]);
                self.answer = Some(answer);
                self.metadata = metadata;
            }
            StateUpdate::Verified(verdict) => {
                if !verdict.is_sufficient {
                    self.query = verdict.reflection.clone();
                    self.is_reflection = true;
                    self.history =
                        trim_history(self.history, [ChatMessage::user(verdict.reflection.clone())]);
                    self.revisions += 1;
                    self.classification = None;
                    self.bundle = None;
                }
                self.verdict = Some(verdict);
            }
        }
        self
    }
}

/// Result of one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub answer: String,
    pub metadata: Vec<Metadata>,
    /// Revision passes taken after the first answer
    pub revisions: u32,
    /// The bound was hit with the answer still judged insufficient
    pub revisions_exhausted: bool,
    /// Nodes visited, in order
    pub path: Vec<Node>,
}

/// Compiled workflow; built once and shared across sessions
pub struct Workflow {
    classifier: IntentClassifier,
    aggregator: RetrievalAggregator,
    synthesizer: AnswerSynthesizer,
    gate: QualityGate,
    max_revisions: u32,
}

impl Workflow {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn RetrievalStore>, config: &Config) -> Self {
        let retrieval = &config.retrieval;
        Self {
            classifier: IntentClassifier::new(llm.clone(), retrieval.max_search_queries),
            aggregator: RetrievalAggregator::new(
                store,
                retrieval.incident_k,
                retrieval.query_k,
                retrieval.feedback_k,
            ),
            synthesizer: AnswerSynthesizer::new(llm.clone()),
            gate: QualityGate::new(llm),
            max_revisions: config.workflow.max_revisions,
        }
    }

    /// Run one turn for a session. The session stays locked for the whole
    /// turn and its history is only written back when the turn succeeds.
    pub async fn run_turn(
        &self,
        sessions: &ConversationStore,
        session_key: Option<&str>,
        query: &str,
    ) -> Result<TurnOutcome, WorkflowError> {
        let (session_id, handle) = sessions.get_or_create(session_key).await;
        let mut session = handle.lock().await;

        let state = TurnState::new(session.history().to_vec(), query);
        let (state, path, revisions_exhausted) = self.drive(state).await?;

        info!(
            "Turn complete: session={}, nodes={}, revisions={}, exhausted={}",
            session_id,
            path.len(),
            state.revisions,
            revisions_exhausted
        );

        session.commit_turn(state.history);
        Ok(TurnOutcome {
            session_id,
            answer: state.answer.unwrap_or_default(),
            metadata: state.metadata,
            revisions: state.revisions,
            revisions_exhausted,
            path,
        })
    }

    /// Walk the graph from `follow_up_check` until `End`
    async fn drive(
        &self,
        mut state: TurnState,
    ) -> Result<(TurnState, Vec<Node>, bool), WorkflowError> {
        let mut node = Node::FollowUpCheck;
        let mut path = Vec::new();
        let mut exhausted = false;

        while node != Node::End {
            path.push(node);
            debug!("Entering {}", node);

            let next = match node {
                Node::FollowUpCheck => {
                    let is_follow_up = self
                        .classifier
                        .detect_follow_up(state.prior_history(), &state.query)
                        .await?;
                    state = state.apply(StateUpdate::FollowUp(is_follow_up));
                    Node::Classify
                }
                Node::Classify => {
                    let classification = self
                        .classifier
                        .classify(
                            state.prior_history(),
                            &state.query,
                            state.is_follow_up,
                            state.is_reflection,
                        )
                        .await?;
                    let next = route_after_classify(classification.query_type);
                    info!("Branch: {} -> {}", classification.query_type, next);
                    state = state.apply(StateUpdate::Classified(classification));
                    next
                }
                Node::SynthesizeCasual => {
                    let answer = self
                        .synthesizer
                        .casual(state.prior_history(), &state.query)
                        .await?;
                    state = state.apply(StateUpdate::Answered {
                        answer,
                        metadata: Vec::new(),
                    });
                    Node::End
                }
                Node::SynthesizeHistoric => {
                    let answer = self
                        .synthesizer
                        .historic(state.prior_history(), &state.query)
                        .await?;
                    state = state.apply(StateUpdate::Answered {
                        answer,
                        metadata: Vec::new(),
                    });
                    Node::Verify
                }
                Node::Retrieve => {
                    let bundle = match &state.classification {
                        Some(c) => {
                            self.aggregator
                                .retrieve(&c.search_queries, &c.incident_numbers)
                                .await
                        }
                        None => RetrievalBundle::default(),
                    };
                    state = state.apply(StateUpdate::Retrieved(bundle));
                    Node::SynthesizeSearch
                }
                Node::SynthesizeSearch => {
                    let bundle = state.bundle.clone().unwrap_or_default();
                    let answer = self
                        .synthesizer
                        .grounded(
                            state.prior_history(),
                            &state.original_query,
                            &state.query,
                            &bundle,
                        )
                        .await?;
                    state = state.apply(StateUpdate::Answered {
                        answer,
                        metadata: bundle.metadata(),
                    });
                    Node::Verify
                }
                Node::Verify => {
                    let answer = state.answer.clone().unwrap_or_default();
                    let verdict = self.gate.verify(&state.query, &answer).await?;
                    let next = route_after_verify(&verdict, state.revisions, self.max_revisions);
                    if next == Node::End && !verdict.is_sufficient {
                        warn!(
                            "Revision limit ({}) reached, returning best-effort answer",
                            self.max_revisions
                        );
                        exhausted = true;
                        state.verdict = Some(verdict);
                    } else {
                        state = state.apply(StateUpdate::Verified(verdict));
                        if next == Node::FollowUpCheck {
                            info!("Revision {} with query {:?}", state.revisions, state.query);
                        }
                    }
                    next
                }
                Node::End => Node::End,
            };
            node = next;
        }

        Ok((state, path, exhausted))
    }
}
