//! Workflow Controller Tests
//!
//! Drive whole turns through the state machine with scripted model replies
//! and an in-memory store. No network access.

mod common;

use common::*;
use incident_common::{
    ChatMessage, FakeLlmClient, MetadataFilter, Role, DOC_TYPE, FEEDBACK_TYPE,
    INCIDENT_NUMBER_KEY,
};
use incidentd::config::Config;
use incidentd::workflow::Node;
use incidentd::{ConversationStore, Workflow, WorkflowError, HISTORY_WINDOW};
use std::sync::Arc;
use std::time::Duration;

fn workflow(llm: &Arc<FakeLlmClient>, store: &Arc<RecordingStore>) -> Workflow {
    Workflow::new(llm.clone(), store.clone(), &Config::default())
}

fn incident_store() -> Arc<RecordingStore> {
    Arc::new(RecordingStore::with_documents(vec![
        incident_doc("inc456", "HAS_STATE: For incident number:inc456 -> State: Resolved"),
        incident_doc("inc456", "HAS_ASSIGNED_TO: For incident number:inc456 -> Assigned To: Dana"),
        incident_doc("inc789", "HAS_TITLE: For incident number:inc789 -> Title: Printer jam"),
        feedback_doc("A user provided feedback on an incident query."),
    ]))
}

// ============================================================================
// Search Scenarios
// ============================================================================

/// An exact incident number yields one wide incident lookup and nothing else
#[tokio::test]
async fn test_incident_status_uses_single_incident_lookup() {
    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("needs_search", &[], &["INC456"]),
        "INC456 is resolved [1] and assigned to Dana [2].".to_string(),
        verdict_json(true, ""),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let outcome = workflow(&llm, &store)
        .run_turn(&sessions, None, "What is the status of INC456?")
        .await
        .unwrap();

    // Empty history: follow-up check costs no model call
    assert_eq!(llm.call_count(), 3);

    let calls = store.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].k, 8);
    assert_eq!(calls[0].query, "inc456");
    assert_eq!(
        calls[0].filter,
        MetadataFilter::corpus(DOC_TYPE).eq(INCIDENT_NUMBER_KEY, "inc456")
    );
    assert!(calls.iter().all(|c| c.k != 2));

    assert_eq!(outcome.metadata.len(), 2);
    assert_eq!(
        outcome.path,
        vec![
            Node::FollowUpCheck,
            Node::Classify,
            Node::Retrieve,
            Node::SynthesizeSearch,
            Node::Verify
        ]
    );
    assert!(outcome.answer.contains("[1]"));
    assert!(!outcome.session_id.is_empty());
}

/// Phrase lookups and incident lookups are separate calls with separate k
#[tokio::test]
async fn test_phrase_and_incident_lookups_are_independent() {
    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("needs_search", &["printer jam"], &["inc789"]),
        "Printer jam [1].".to_string(),
        verdict_json(true, ""),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let outcome = workflow(&llm, &store)
        .run_turn(&sessions, None, "Tell me about INC789, the printer jam")
        .await
        .unwrap();

    let calls = store.calls();
    assert_eq!(calls.len(), 3);
    let incident: Vec<_> = calls
        .iter()
        .filter(|c| c.filter.get(INCIDENT_NUMBER_KEY).is_some())
        .collect();
    let phrase: Vec<_> = calls
        .iter()
        .filter(|c| c.filter == MetadataFilter::corpus(DOC_TYPE))
        .collect();
    let feedback: Vec<_> = calls
        .iter()
        .filter(|c| c.filter == MetadataFilter::corpus(FEEDBACK_TYPE))
        .collect();
    assert_eq!((incident.len(), phrase.len(), feedback.len()), (1, 1, 1));
    assert!(incident[0].k > phrase[0].k);

    // inc789 lookup (1 doc) + phrase lookup (first 2 docs); feedback excluded
    assert_eq!(outcome.metadata.len(), 3);

    let grounded_prompt = llm.requests()[1].text();
    assert!(grounded_prompt.contains("[1] INCIDENT_NUMBER: inc789"));
    assert!(grounded_prompt.contains("[feedback] A user provided feedback"));
}

/// No documents found still yields an answer, without research context
#[tokio::test]
async fn test_empty_evidence_still_synthesizes() {
    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("needs_search", &[], &["inc000"]),
        "No matching incident records were found.".to_string(),
        verdict_json(true, ""),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let outcome = workflow(&llm, &store)
        .run_turn(&sessions, None, "Status of INC000?")
        .await
        .unwrap();
    assert!(outcome.metadata.is_empty());
    assert!(!llm.requests()[1].text().contains("RESEARCH CONTEXT"));
}

// ============================================================================
// Historic and Casual Scenarios
// ============================================================================

/// A follow-up answered from history issues no retrieval call
#[tokio::test]
async fn test_historic_follow_up_skips_retrieval() {
    let llm = Arc::new(FakeLlmClient::scripted([
        "YES".to_string(),
        classification_json("historic", &[], &[]),
        "INC456 was a VPN outage affecting the Berlin office.".to_string(),
        verdict_json(true, ""),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();
    let (key, _) = sessions.get_or_create(None).await;
    sessions
        .append(
            &key,
            vec![
                ChatMessage::user("What is INC456?"),
                ChatMessage::assistant("INC456 is a VPN outage."),
            ],
        )
        .await;

    let outcome = workflow(&llm, &store)
        .run_turn(&sessions, Some(&key), "Can you explain that in more detail?")
        .await
        .unwrap();

    assert!(store.calls().is_empty());
    assert!(outcome.metadata.is_empty());
    assert_eq!(outcome.session_id, key);
    assert_eq!(
        outcome.path,
        vec![
            Node::FollowUpCheck,
            Node::Classify,
            Node::SynthesizeHistoric,
            Node::Verify
        ]
    );

    // Historic reply is chat-shaped: system, prior turns, query
    let historic_request = &llm.requests()[2];
    assert_eq!(historic_request.messages.len(), 4);
    assert_eq!(historic_request.messages[1].content, "What is INC456?");

    let history = sessions.get_history(&key).await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].role, Role::Assistant);
}

/// Casual queries end right after the reply, with empty metadata
#[tokio::test]
async fn test_casual_terminates_immediately() {
    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("casual", &[], &[]),
        "You're welcome!".to_string(),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let outcome = workflow(&llm, &store)
        .run_turn(&sessions, None, "Thanks!")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "You're welcome!");
    assert!(outcome.metadata.is_empty());
    assert_eq!(outcome.path.last(), Some(&Node::SynthesizeCasual));
    assert!(!outcome.path.contains(&Node::Verify));
    assert_eq!(llm.call_count(), 2);
    assert!(store.calls().is_empty());

    let history = sessions.get_history(&outcome.session_id).await;
    assert_eq!(
        history,
        vec![ChatMessage::user("Thanks!"), ChatMessage::assistant("You're welcome!")]
    );
}

// ============================================================================
// Revision Loop
// ============================================================================

/// An insufficient verdict re-enters the graph with the reflection as query
#[tokio::test]
async fn test_reflection_replaces_query_and_reenters() {
    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("needs_search", &[], &["inc456"]),
        "INC456 is resolved [1].".to_string(),
        verdict_json(false, "missing resolution date"),
        "NO".to_string(),
        classification_json("needs_search", &["inc456 resolution date"], &["inc456"]),
        "INC456 was resolved on 2024-03-02 [1].".to_string(),
        verdict_json(true, ""),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let outcome = workflow(&llm, &store)
        .run_turn(&sessions, None, "When was INC456 resolved?")
        .await
        .unwrap();

    assert_eq!(outcome.revisions, 1);
    assert!(!outcome.revisions_exhausted);
    assert_eq!(outcome.answer, "INC456 was resolved on 2024-03-02 [1].");
    assert_eq!(
        outcome.path.iter().filter(|n| **n == Node::FollowUpCheck).count(),
        2
    );

    let requests = llm.requests();
    // Second pass: follow-up check and classification see the reflection
    assert!(requests[3].text().contains("missing resolution date"));
    let second_classify = requests[4].text();
    assert!(second_classify.contains("Current Query:\nmissing resolution date"));
    assert!(second_classify.contains("Query origin: system-generated reflection"));
    assert!(!second_classify.contains("Current Query:\nWhen was INC456 resolved?"));

    // Each verification judges the query that pass answered
    assert!(requests[2].text().contains("User Query:\nWhen was INC456 resolved?"));
    assert!(requests[6].text().contains("User Query:\nmissing resolution date"));

    let history = sessions.get_history(&outcome.session_id).await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(history[2].content, "missing resolution date");
}

/// A verifier that is never satisfied stops at the revision bound
#[tokio::test]
async fn test_revision_loop_is_bounded() {
    let mut config = Config::default();
    config.workflow.max_revisions = 2;

    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("needs_search", &["vpn"], &[]),
        "answer 1".to_string(),
        verdict_json(false, "needs more detail"),
        "NO".to_string(),
        classification_json("needs_search", &["vpn detail"], &[]),
        "answer 2".to_string(),
        verdict_json(false, "still missing detail"),
        "NO".to_string(),
        classification_json("needs_search", &["vpn detail"], &[]),
        "answer 3".to_string(),
        verdict_json(false, "still vague"),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let outcome = Workflow::new(llm.clone(), store.clone(), &config)
        .run_turn(&sessions, None, "Why did the VPN fail?")
        .await
        .unwrap();

    assert_eq!(outcome.revisions, 2);
    assert!(outcome.revisions_exhausted);
    assert_eq!(outcome.answer, "answer 3");
    assert_eq!(llm.call_count(), 11);
    assert_eq!(outcome.path.iter().filter(|n| **n == Node::Verify).count(), 3);
}

// ============================================================================
// Failures and Session State
// ============================================================================

/// Unparseable classifier output aborts the turn and leaves history alone
#[tokio::test]
async fn test_schema_violation_aborts_without_history_change() {
    let llm = Arc::new(FakeLlmClient::always("I'd search for it."));
    let store = incident_store();
    let sessions = ConversationStore::new();
    let (key, _) = sessions.get_or_create(None).await;

    let err = workflow(&llm, &store)
        .run_turn(&sessions, Some(&key), "What is INC456?")
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::SchemaViolation { .. }));
    assert_eq!(llm.call_count(), 1);
    assert!(sessions.get_history(&key).await.is_empty());
}

/// Malformed verifier output is fatal too
#[tokio::test]
async fn test_verifier_schema_violation() {
    let llm = Arc::new(FakeLlmClient::scripted([
        classification_json("needs_search", &["vpn"], &[]),
        "answer".to_string(),
        r#"{"is_sufficient": false}"#.to_string(),
    ]));
    let store = incident_store();
    let sessions = ConversationStore::new();

    let err = workflow(&llm, &store)
        .run_turn(&sessions, None, "Why did the VPN fail?")
        .await
        .unwrap_err();
    assert!(err.is_schema_violation());
}

/// History never exceeds the window, whatever the number of turns
#[tokio::test]
async fn test_history_window_across_turns() {
    let llm = Arc::new(CasualLlm {
        delay: Duration::ZERO,
    });
    let store = incident_store();
    let sessions = ConversationStore::new();
    let workflow = Workflow::new(llm, store, &Config::default());

    let (key, _) = sessions.get_or_create(None).await;
    for i in 0..8 {
        workflow
            .run_turn(&sessions, Some(&key), &format!("thanks {}", i))
            .await
            .unwrap();
        let len = sessions.get_history(&key).await.len();
        assert_eq!(len, (2 * (i + 1)).min(HISTORY_WINDOW));
    }

    let history = sessions.get_history(&key).await;
    assert_eq!(history[0].content, "thanks 3");
    assert_eq!(history[8].content, "thanks 7");
}

/// Concurrent turns on one session queue up instead of interleaving
#[tokio::test]
async fn test_concurrent_turns_same_session_do_not_interleave() {
    let llm = Arc::new(CasualLlm {
        delay: Duration::from_millis(5),
    });
    let store = incident_store();
    let sessions = Arc::new(ConversationStore::new());
    let workflow = Arc::new(Workflow::new(llm, store, &Config::default()));
    let (key, _) = sessions.get_or_create(None).await;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let workflow = workflow.clone();
        let sessions = sessions.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            workflow
                .run_turn(&sessions, Some(&key), &format!("thanks {}", i))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let history = sessions.get_history(&key).await;
    assert_eq!(history.len(), 8);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

/// Different sessions keep separate histories
#[tokio::test]
async fn test_sessions_are_isolated() {
    let llm = Arc::new(CasualLlm {
        delay: Duration::ZERO,
    });
    let store = incident_store();
    let sessions = ConversationStore::new();
    let workflow = Workflow::new(llm, store, &Config::default());

    let a = workflow.run_turn(&sessions, None, "hi").await.unwrap();
    let b = workflow.run_turn(&sessions, None, "hello").await.unwrap();
    assert_ne!(a.session_id, b.session_id);
    assert_eq!(sessions.count().await, 2);
    assert_eq!(sessions.get_history(&a.session_id).await[0].content, "hi");
    assert_eq!(sessions.get_history(&b.session_id).await[0].content, "hello");
}
