//! Session endpoints — the primary interface for running agent turns.
//!
//! - `POST /sessions`                      — create a session bound to an itinerary
//! - `GET /sessions/:id`                   — read the session (messages, profile, metadata)
//! - `DELETE /sessions/:id`                — delete, idempotent
//! - `POST /sessions/:id/messages/stream`  — SSE stream of one agent turn

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_core::Stream;
use serde::Deserialize;

use crate::runtime::session_lock::SessionBusy;
use crate::runtime::{run_turn, TurnEvent, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Create / read / delete
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub itinerary_id: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let Some(itinerary) = state.itineraries.get(&body.itinerary_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "itinerary_not_found" })),
        )
            .into_response();
    };

    // Per-user scope check: an owned itinerary only accepts sessions
    // from its owner.
    if let Some(owner) = &itinerary.owner {
        let caller = headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if caller != owner {
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "not_owner" })),
            )
                .into_response();
        }
    }

    match state.sessions.create_session(&body.itinerary_id) {
        Ok(session) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "sessionId": session.id })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.get(&id) {
        Some(session) => Json(serde_json::json!(session)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session_not_found" })),
        )
            .into_response(),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.sessions.delete(&id);
    StatusCode::NO_CONTENT
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /sessions/:id/messages/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StreamMessageRequest {
    pub message: String,
}

pub async fn stream_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StreamMessageRequest>,
) -> impl IntoResponse {
    if state.sessions.get(&id).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session_not_found" })),
        )
            .into_response();
    }

    // One turn per session at a time; a second stream fails fast with
    // an in-band retryable error.
    let permit = match state.session_locks.try_acquire(&id) {
        Ok(p) => p,
        Err(SessionBusy) => {
            let stream = futures_util::stream::once(async {
                Ok::<_, std::convert::Infallible>(
                    Event::default().event("error").data(
                        serde_json::json!({
                            "kind": "session_busy",
                            "message": "a turn is already in progress on this session",
                            "retryable": true,
                        })
                        .to_string(),
                    ),
                )
            });
            return Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response();
        }
    };

    let rx = run_turn(
        state.clone(),
        TurnInput {
            session_id: id,
            user_message: body.message,
        },
        permit,
    );

    Sse::new(make_sse_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn make_sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<TurnEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let event_type = match &event {
                TurnEvent::Text { .. } => "text",
                TurnEvent::ToolCall { .. } => "tool_call",
                TurnEvent::ToolResult { .. } => "tool_result",
                TurnEvent::Done { .. } => "done",
                TurnEvent::Error { .. } => "error",
            };
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event_type).data(data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_events_serialize_to_the_wire_contract() {
        let done = TurnEvent::Done {
            itinerary_updated: true,
            segments_modified: vec!["seg-1".into()],
            tokens_used: 120,
            cost_usd: 0.0023,
            warning: None,
        };
        let v = serde_json::to_value(&done).unwrap();
        assert_eq!(v["type"], "done");
        assert_eq!(v["itineraryUpdated"], true);
        assert_eq!(v["segmentsModified"][0], "seg-1");
        assert_eq!(v["tokensUsed"], 120);
        assert!(v.get("costUSD").is_some());
        assert!(v.get("warning").is_none());

        let result = TurnEvent::ToolResult {
            tool_call_id: "c1".into(),
            success: false,
            result: None,
            error: Some("invalid_arguments: boom".into()),
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["type"], "tool_result");
        assert_eq!(v["toolCallId"], "c1");
        assert_eq!(v["success"], false);
        assert!(v.get("result").is_none());
    }
}
