//! Turn execution loop — the orchestrator that streams LLM responses,
//! reassembles fragmented tool calls, dispatches them, and re-enters
//! the model until a completion finishes without tool calls.
//!
//! Entry point: [`run_turn`] spawns the async loop and returns a
//! channel of [`TurnEvent`]s. A consumer dropping the receiver is the
//! cancellation signal: the loop notices at its next send, lets the
//! in-flight tool finish, skips the rest, and leaves the session
//! persisted at a message boundary.

use std::collections::BTreeMap;

use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;

use wp_domain::chat::{Message, ToolCall};
use wp_domain::stream::{StreamEvent, Usage};
use wp_domain::ErrorKind;
use wp_itinerary::summary;
use wp_knowledge::{RetrievalContext, RELEVANCE_FLOOR};
use wp_providers::ChatRequest;
use wp_tools::{essential_catalog, full_catalog, ToolExecutor};

use crate::prompts;
use crate::runtime::{compact, estimate};
use crate::state::AppState;

/// Persisted tool results are clipped to this many characters; the live
/// round still sees the full value.
pub const TOOL_RESULT_PERSIST_LIMIT: usize = 2_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent — the SSE event type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single agent turn, in causal order: all
/// `text` of a round precede its `tool_call`s, each `tool_call`
/// precedes its paired `tool_result`, and `done` (or `error`) is last.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Partial assistant text.
    Text { content: String },

    /// A completed tool-call decision, after full argument assembly.
    ToolCall {
        id: String,
        name: String,
        args: Value,
    },

    /// Executor outcome for one call.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Exactly once, last, on every non-fatal turn.
    #[serde(rename_all = "camelCase")]
    Done {
        itinerary_updated: bool,
        segments_modified: Vec<String>,
        tokens_used: u64,
        #[serde(rename = "costUSD")]
        cost_usd: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },

    /// Terminal on fatal conditions.
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}

/// Input to a single turn.
pub struct TurnInput {
    pub session_id: String,
    pub user_message: String,
}

/// Accumulator for one tool call's fragments, keyed by stream index.
/// Every piece is concatenated in arrival order; nothing is assumed
/// complete before the stream finishes.
#[derive(Default)]
struct ToolCallBuffer {
    id: String,
    name: String,
    arguments: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn — spawn the producer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one agent turn. The caller must already hold the session's run
/// permit; it is released when the turn finishes, not when the consumer
/// stops reading.
pub fn run_turn(
    state: AppState,
    input: TurnInput,
    permit: OwnedSemaphorePermit,
) -> mpsc::Receiver<TurnEvent> {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);

    let span = tracing::info_span!("turn", session_id = %input.session_id);
    tokio::spawn(tracing::Instrument::instrument(
        async move {
            let _permit = permit;
            if let Err((kind, message)) = run_turn_inner(&state, &input, &tx).await {
                tracing::warn!(?kind, %message, "turn aborted");
                let _ = tx
                    .send(TurnEvent::Error {
                        kind,
                        message,
                        retryable: kind.retryable(),
                    })
                    .await;
            }
        },
        span,
    ));

    rx
}

type TurnError = (ErrorKind, String);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn_inner — the round loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    input: &TurnInput,
    tx: &mpsc::Sender<TurnEvent>,
) -> Result<(), TurnError> {
    let config = &state.config;

    // ── Pre-flight ──────────────────────────────────────────────────
    let session = state
        .sessions
        .get(&input.session_id)
        .ok_or_else(|| (ErrorKind::SessionNotFound, format!("no session {}", input.session_id)))?;

    if let Some(limit) = config.agent.session_cost_limit {
        if session.metadata.cost_usd >= limit {
            return Err((
                ErrorKind::CostLimitExceeded,
                format!(
                    "session cost {:.4} USD has reached the {:.4} USD limit",
                    session.metadata.cost_usd, limit
                ),
            ));
        }
    }

    let executor = ToolExecutor::new(
        state.itineraries.clone(),
        state.knowledge.clone(),
        session.itinerary_id.clone(),
    );
    let itinerary = executor
        .current_itinerary()
        .map_err(|e| (ErrorKind::ItineraryNotFound, e.to_string()))?;

    // ── Append the user turn (persisted before anything streams) ────
    let mut session = state
        .sessions
        .append_message(&input.session_id, Message::user(&input.user_message))
        .map_err(|e| (ErrorKind::SessionNotFound, e.to_string()))?;

    // Phase 1 iff this is the very first user turn on an untouched
    // itinerary: minimal prompt, essential catalog, no RAG.
    let phase1 = session.user_message_count() == 1 && itinerary.is_blank();

    let knowledge_block = if phase1 {
        None
    } else {
        retrieve_knowledge(state, &itinerary, &input.user_message).await
    };

    let system_prompt = prompts::build_system_prompt(
        phase1,
        &summary::summarize_itinerary(&itinerary),
        knowledge_block.as_deref(),
    );
    let tools = if phase1 {
        essential_catalog()
    } else {
        full_catalog()
    };

    let mut warning: Option<String> = None;

    // ── Compaction gate ─────────────────────────────────────────────
    let ceiling = (config.agent.compaction_threshold * config.llm.context_limit as f64) as u64;
    let estimated = estimate::estimate_tokens(&session.messages, !phase1);
    if compact::should_compact(
        estimated,
        config.llm.context_limit,
        session.messages.len(),
        session.metadata.last_compacted_at,
        &config.agent,
        Utc::now(),
    ) {
        match compact::run_compaction(state.llm.as_ref(), &session, &itinerary).await {
            Ok(result) => {
                session = state
                    .sessions
                    .update(&input.session_id, |s| {
                        s.messages = result.messages.clone();
                        if let Some(profile) = result.trip_profile.clone() {
                            s.trip_profile = Some(profile);
                        }
                        s.metadata.last_compacted_at = Some(Utc::now());
                    })
                    .map_err(|e| (ErrorKind::SessionNotFound, e.to_string()))?;

                let after = estimate::estimate_tokens(&session.messages, !phase1);
                if after > ceiling {
                    return Err((
                        ErrorKind::ContextLimitExceeded,
                        format!("still {after} estimated tokens after compaction (ceiling {ceiling})"),
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "compaction failed, continuing with full history");
                warning = Some(format!("compaction failed: {e}"));
            }
        }
    }

    // ── Round loop ──────────────────────────────────────────────────
    // `live` carries the full tool-result payloads for re-entry; the
    // session store holds the truncated versions.
    let mut live: Vec<Message> = Vec::with_capacity(session.messages.len() + 1);
    live.push(Message::system(&system_prompt));
    live.extend(session.messages.iter().cloned());

    let mut turn_usage = Usage::zero();
    let mut itinerary_updated = false;
    let mut segments_modified: Vec<String> = Vec::new();
    let mut produced_output = false;

    for round in 1..=config.agent.max_tool_rounds {
        tracing::debug!(round, "opening completion");
        let req = ChatRequest {
            messages: live.clone(),
            tools: tools.clone(),
            temperature: Some(config.llm.temperature),
            max_tokens: Some(config.llm.max_tokens),
            json_mode: false,
            model: None,
        };

        let mut stream = match state.llm.chat_stream(&req).await {
            Ok(s) => s,
            Err(e) if produced_output => {
                warning = Some(format!("model stream failed mid-turn: {e}"));
                return finalize_turn(
                    state, input, tx, &turn_usage, &live, itinerary_updated,
                    segments_modified, warning, !phase1,
                )
                .await;
            }
            Err(e) => return Err((ErrorKind::LlmApiError, e.to_string())),
        };

        let mut content = String::new();
        let mut tool_bufs: BTreeMap<u32, ToolCallBuffer> = BTreeMap::new();
        let mut finish_reason: Option<String> = None;
        let mut stream_failed = false;
        let mut cancelled = false;

        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::Token { text }) => {
                    content.push_str(&text);
                    produced_output = true;
                    if tx.send(TurnEvent::Text { content: text }).await.is_err() {
                        cancelled = true;
                        break;
                    }
                }
                Ok(StreamEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                }) => {
                    let buf = tool_bufs.entry(index).or_default();
                    if let Some(id) = id {
                        buf.id.push_str(&id);
                    }
                    if let Some(name) = name {
                        buf.name.push_str(&name);
                    }
                    buf.arguments.push_str(&arguments);
                    produced_output = true;
                }
                Ok(StreamEvent::Done {
                    usage,
                    finish_reason: fr,
                }) => {
                    if let Some(usage) = usage {
                        turn_usage.add(&usage);
                    }
                    if fr.is_some() {
                        finish_reason = fr;
                    }
                }
                Err(e) if produced_output => {
                    tracing::warn!(error = %e, "stream failed after output; salvaging");
                    warning = Some(format!("model stream failed mid-round: {e}"));
                    stream_failed = true;
                    break;
                }
                Err(e) => return Err((ErrorKind::LlmApiError, e.to_string())),
            }
        }

        if cancelled {
            // Mid-stream disconnect: this round's partial output is
            // dropped whole (assistant messages persist fully or not
            // at all). The user message and prior rounds are already
            // safe in the store.
            persist_counters(state, input, &turn_usage, !phase1);
            return Ok(());
        }

        // ── Finalize tool calls in stream-index order ──────────────
        let mut tool_calls: Vec<ToolCall> = tool_bufs
            .into_values()
            .map(|buf| ToolCall {
                id: buf.id,
                name: buf.name,
                arguments: buf.arguments,
            })
            .collect();

        // A salvaged round only runs calls whose arguments fully
        // assembled into valid JSON.
        if stream_failed {
            tool_calls.retain(|tc| serde_json::from_str::<Value>(&tc.arguments).is_ok());
        }
        tracing::debug!(
            round,
            tool_calls = tool_calls.len(),
            finish_reason = finish_reason.as_deref().unwrap_or("none"),
            "round complete"
        );

        if tool_calls.is_empty() {
            // Terminal completion: persist the final assistant message
            // and close the turn.
            state
                .sessions
                .append_message(&input.session_id, Message::assistant(&content))
                .map_err(|e| (ErrorKind::SessionNotFound, e.to_string()))?;
            live.push(Message::assistant(&content));
            return finalize_turn(
                state, input, tx, &turn_usage, &live, itinerary_updated,
                segments_modified, warning, !phase1,
            )
            .await;
        }

        // ── Tool dispatch (sequential: each call sees the snapshot
        //    refreshed by the one before it) ────────────────────────
        let assistant = Message::assistant_with_tools(&content, tool_calls.clone());
        state
            .sessions
            .append_message(&input.session_id, assistant.clone())
            .map_err(|e| (ErrorKind::SessionNotFound, e.to_string()))?;
        live.push(assistant);

        for tc in &tool_calls {
            let args = serde_json::from_str::<Value>(&tc.arguments).unwrap_or(Value::Null);
            if tx
                .send(TurnEvent::ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    args,
                })
                .await
                .is_err()
            {
                // Consumer gone between executor calls: skip the rest.
                persist_counters(state, input, &turn_usage, !phase1);
                return Ok(());
            }

            let outcome = executor.execute(tc).await;
            itinerary_updated |= outcome.itinerary_changed;
            for id in &outcome.segments_modified {
                if !segments_modified.contains(id) {
                    segments_modified.push(id.clone());
                }
            }

            let payload = outcome.payload();
            live.push(Message::tool_result(&tc.id, &payload));
            state
                .sessions
                .append_message(
                    &input.session_id,
                    Message::tool_result(&tc.id, truncate_for_history(&payload)),
                )
                .map_err(|e| (ErrorKind::SessionNotFound, e.to_string()))?;

            let delivered = tx
                .send(TurnEvent::ToolResult {
                    tool_call_id: outcome.tool_call_id.clone(),
                    success: outcome.success,
                    result: outcome.result.clone(),
                    error: outcome.error.clone(),
                })
                .await
                .is_ok();
            if !delivered {
                persist_counters(state, input, &turn_usage, !phase1);
                return Ok(());
            }
        }

        if stream_failed {
            // Salvaged: no further rounds, close out with a warning.
            return finalize_turn(
                state, input, tx, &turn_usage, &live, itinerary_updated,
                segments_modified, warning, !phase1,
            )
            .await;
        }

        // Next round re-enters the model with the EXACT same catalog;
        // dropping the tools here makes providers return empty content.
        if round == config.agent.max_tool_rounds {
            warning = Some(format!(
                "tool round limit reached ({} rounds)",
                config.agent.max_tool_rounds
            ));
            return finalize_turn(
                state, input, tx, &turn_usage, &live, itinerary_updated,
                segments_modified, warning, !phase1,
            )
            .await;
        }
    }

    unreachable!("round loop always returns");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Finalization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[allow(clippy::too_many_arguments)]
async fn finalize_turn(
    state: &AppState,
    input: &TurnInput,
    tx: &mpsc::Sender<TurnEvent>,
    turn_usage: &Usage,
    live: &[Message],
    itinerary_updated: bool,
    segments_modified: Vec<String>,
    warning: Option<String>,
    full_tools: bool,
) -> Result<(), TurnError> {
    let tokens_used = if turn_usage.total_tokens > 0 {
        turn_usage.total_tokens as u64
    } else {
        estimate::estimate_tokens(&live[1..], full_tools)
    };
    let cost_usd = state
        .config
        .llm
        .pricing
        .estimate_cost(turn_usage.prompt_tokens, turn_usage.completion_tokens);

    let _ = state.sessions.update(&input.session_id, |s| {
        s.metadata.total_tokens = estimate::estimate_tokens(&s.messages, full_tools);
        s.metadata.cost_usd += cost_usd;
    });

    let _ = tx
        .send(TurnEvent::Done {
            itinerary_updated,
            segments_modified,
            tokens_used,
            cost_usd,
            warning,
        })
        .await;
    Ok(())
}

/// Best-effort counter update on cancellation paths.
fn persist_counters(state: &AppState, input: &TurnInput, turn_usage: &Usage, full_tools: bool) {
    let cost_usd = state
        .config
        .llm
        .pricing
        .estimate_cost(turn_usage.prompt_tokens, turn_usage.completion_tokens);
    if let Err(e) = state.sessions.update(&input.session_id, |s| {
        s.metadata.total_tokens = estimate::estimate_tokens(&s.messages, full_tools);
        s.metadata.cost_usd += cost_usd;
    }) {
        tracing::warn!(error = %e, "failed to persist counters after cancellation");
    }
}

/// Clip a tool payload for session history, marking the cut.
fn truncate_for_history(payload: &str) -> String {
    if payload.len() <= TOOL_RESULT_PERSIST_LIMIT {
        return payload.to_string();
    }
    let mut end = TOOL_RESULT_PERSIST_LIMIT;
    while end > 0 && !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &payload[..end])
}

/// KB lookup for the turn's system prompt. Only confident hits are
/// injected; anything weaker stays out of the prompt entirely.
async fn retrieve_knowledge(
    state: &AppState,
    itinerary: &wp_itinerary::Itinerary,
    query: &str,
) -> Option<String> {
    let ctx = RetrievalContext {
        destinations: itinerary
            .effective_destinations()
            .iter()
            .map(|d| d.display_name().to_string())
            .collect(),
        start_date: itinerary.start_date,
        end_date: itinerary.end_date,
    };
    let hits = state.knowledge.search(query, &ctx).await;
    let confident: Vec<String> = hits
        .into_iter()
        .filter(|h| h.relevance >= RELEVANCE_FLOOR)
        .map(|h| format!("- {}", h.content))
        .collect();
    if confident.is_empty() {
        None
    } else {
        Some(confident.join("\n"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests — scripted-provider scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
