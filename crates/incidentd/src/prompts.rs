//! Prompt templates for every model-facing workflow step.
//!
//! Builders return plain strings (or chat message lists); the caller picks
//! the output format on the request. Each prompt is built in a single
//! `format!` pass, so user text is never re-scanned for placeholders.

use incident_common::{render_transcript, ChatMessage};

/// System prompt for replies derived purely from the conversation
pub const HISTORIC_SYSTEM_PROMPT: &str = "You are an expert assistant. Answer the user's question from the conversation history alone. Read the whole history to understand the context and give a detailed answer. If the answer is not in the history, say so clearly.";

pub fn follow_up_prompt(history: &[ChatMessage], query: &str) -> String {
    format!(
        r#"You are an expert in conversation analysis. Your single task is to decide whether the User Query is a follow-up to the Previous Chat History.

=== ANALYSIS RULES ===
1. Focus on the last exchange. The strongest clue is how the User Query relates to the very last message of the history.
2. A follow-up asks for the same information in a different way, or for clarification, more detail or elaboration of the immediately preceding topic.
3. If the answer to the User Query can already be found in the history, it is a follow-up.
4. A new question changes the subject, introduces a new incident number, or asks about something not discussed in the last exchange.
5. If the history is empty or holds nothing relevant, it is a new question.

You MUST respond with only the single word YES or NO. Do not add any other text.

=== PREVIOUS CHAT HISTORY ===
{history}

=== USER QUERY ===
{query}"#,
        history = render_transcript(history),
        query = query,
    )
}

pub fn classify_prompt(
    history: &[ChatMessage],
    query: &str,
    is_follow_up: bool,
    is_reflection: bool,
) -> String {
    let origin = if is_reflection {
        "system-generated reflection"
    } else {
        "direct user question"
    };
    format!(
        r#"You are an expert query analyst. Decide the most efficient path to resolve the Current Query, using the Previous Chat History for context.

First decide whether the Current Query is a direct user question or a system-generated reflection asking to improve a previous answer.

=== CATEGORIES ===
needs_search
  - The default.
  - Every system-generated reflection, since improving an answer always needs a fresh search.
  - Any direct user question that introduces a new topic or incident number, or cannot be answered from the history.
  - Example reflection: "The answer is missing the resolution date for incident INC123."
  - Example user question: "What is the status of ticket INC456?"
historic
  - A direct user question asking for clarification, elaboration or more detail about the topic of the last turn.
  - Example: "Can you explain that in more detail?" after an incident summary.
casual
  - A direct user question that is a greeting, a thank-you or conversational filler.
  - Example: "Thanks for the help!"

=== INPUTS ===
Is follow-up: {is_follow_up}
Query origin: {origin}

Current Query:
{query}

Previous Chat History:
{history}

=== OUTPUT ===
Respond with a single JSON object and nothing else:
{{
  "query_type": "casual" | "historic" | "needs_search",
  "search_queries": ["1-2 short search phrases; empty for casual or historic"],
  "list_of_incident_numbers": ["exact incident numbers from the query, e.g. INC12345; empty if none"]
}}"#,
        is_follow_up = if is_follow_up { "yes" } else { "no" },
        origin = origin,
        query = query,
        history = render_transcript(history),
    )
}

pub fn casual_prompt(history: &[ChatMessage], query: &str) -> String {
    format!(
        r#"You are a friendly and helpful assistant. Give a short, conversational reply to the user's query. Do not add reflection steps or comments. Return only the reply.

Chat History:
{history}

Query:
{query}"#,
        history = render_transcript(history),
        query = query,
    )
}

/// Chat messages for a history-only reply: system prompt, prior turns, query
pub fn historic_messages(history: &[ChatMessage], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(HISTORIC_SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query));
    messages
}

/// Evidence-grounded prompt. With no evidence the research section is
/// dropped and the model is told to report the miss.
pub fn grounded_prompt(
    history: &[ChatMessage],
    original_query: &str,
    current_query: &str,
    evidence: &str,
) -> String {
    let revision = if current_query != original_query {
        format!("\n=== REVISION FOCUS ===\n{}\n", current_query)
    } else {
        String::new()
    };
    let history = render_transcript(history);

    if evidence.trim().is_empty() {
        return format!(
            r#"You are an expert Incident Resolver. A search of the incident records found nothing relevant to the user's query.

=== INSTRUCTIONS ===
1. State plainly that no matching incident records were found.
2. Use the Chat History only if it already answers the query.
3. Do not invent incident details, dates or owners.

=== USER'S QUERY ===
{query}
{revision}
=== CHAT HISTORY ===
{history}"#,
            query = original_query,
            revision = revision,
            history = history,
        );
    }

    format!(
        r#"You are an expert Incident Resolver. Combine the conversation history with new research to give a final, comprehensive answer to the user's query.

=== INSTRUCTIONS ===
1. Review the Chat History to understand the previous questions and answers.
2. Answer the User's Query directly.
3. Base your answer on the Research Context. Do not invent facts that are not in it.
4. Cite sources by their reference number wherever you use them, e.g. "The ticket was resolved on Tuesday [1]."

=== USER'S QUERY ===
{query}
{revision}
=== CHAT HISTORY ===
{history}

=== RESEARCH CONTEXT ===
{evidence}
=== END CONTEXT ===

Based on the conversation and the research, give a final, detailed answer."#,
        query = original_query,
        revision = revision,
        history = history,
        evidence = evidence,
    )
}

pub fn verify_prompt(query: &str, answer: &str) -> String {
    format!(
        r#"You are a meticulous quality assurance expert. Verify whether the Generated Answer addresses the User Query.

- If the answer contains the bare minimum information the query needs, set "is_sufficient" to true and "reflection" to "".
- Otherwise set "is_sufficient" to false and write a "reflection": a direct instruction describing what is missing. It will be used as the next search query.

User Query:
{query}

Generated Answer:
{answer}

Respond with a single JSON object and nothing else:
{{"is_sufficient": true | false, "reflection": "string"}}"#,
        query = query,
        answer = answer,
    )
}
