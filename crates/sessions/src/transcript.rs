//! Transcript validity checks.
//!
//! A well-formed transcript has no orphan tool messages: every tool
//! message answers a call id carried on the nearest preceding assistant
//! message, and an assistant message that requested tools is fully
//! answered before the next assistant message appears.

use wp_domain::chat::{Message, Role};

/// Validate the transcript invariants. Returns a human-readable
/// description of the first violation, if any.
pub fn validate_transcript(messages: &[Message]) -> std::result::Result<(), String> {
    let mut pending_call_ids: Vec<String> = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::Assistant => {
                if !pending_call_ids.is_empty() {
                    return Err(format!(
                        "assistant message at index {i} arrived while tool calls {pending_call_ids:?} were unanswered"
                    ));
                }
                pending_call_ids = msg.tool_calls.iter().map(|tc| tc.id.clone()).collect();
            }
            Role::Tool => {
                let Some(call_id) = msg.tool_call_id.as_deref() else {
                    return Err(format!("tool message at index {i} has no tool_call_id"));
                };
                let Some(pos) = pending_call_ids.iter().position(|id| id == call_id) else {
                    return Err(format!(
                        "tool message at index {i} answers unknown call id {call_id}"
                    ));
                };
                pending_call_ids.remove(pos);
            }
            Role::User | Role::System => {}
        }
    }

    if pending_call_ids.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "transcript ends with unanswered tool calls {pending_call_ids:?}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_domain::chat::ToolCall;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "get_itinerary".into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn plain_conversation_is_valid() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("more"),
            Message::assistant("sure"),
        ];
        assert!(validate_transcript(&messages).is_ok());
    }

    #[test]
    fn answered_tool_round_is_valid() {
        let messages = vec![
            Message::user("plan"),
            Message::assistant_with_tools("", vec![call("c1"), call("c2")]),
            Message::tool_result("c1", "ok"),
            Message::tool_result("c2", "ok"),
            Message::assistant("done"),
        ];
        assert!(validate_transcript(&messages).is_ok());
    }

    #[test]
    fn orphan_tool_message_is_invalid() {
        let messages = vec![Message::user("plan"), Message::tool_result("cX", "ok")];
        assert!(validate_transcript(&messages).is_err());
    }

    #[test]
    fn unanswered_calls_block_next_assistant() {
        let messages = vec![
            Message::user("plan"),
            Message::assistant_with_tools("", vec![call("c1")]),
            Message::assistant("skipped the tool"),
        ];
        assert!(validate_transcript(&messages).is_err());
    }

    #[test]
    fn trailing_unanswered_calls_are_invalid() {
        let messages = vec![
            Message::user("plan"),
            Message::assistant_with_tools("", vec![call("c1")]),
        ];
        assert!(validate_transcript(&messages).is_err());
    }
}
