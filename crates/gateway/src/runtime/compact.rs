//! Session compaction — collapses older messages into one synthesized
//! assistant message so the context stays under the model's window.
//!
//! The last [`KEEP_LAST_MESSAGES`] messages survive verbatim; everything
//! before them is summarized by a non-streaming JSON completion and
//! replaced in place. Compaction failing is never fatal: the turn
//! proceeds on full history and the next `done` carries a warning.

use chrono::{DateTime, Utc};

use wp_domain::chat::Message;
use wp_domain::config::AgentConfig;
use wp_domain::error::Result;
use wp_itinerary::{summary, Itinerary};
use wp_providers::{ChatRequest, LlmProvider};
use wp_sessions::{Session, TripProfile};

use crate::prompts::COMPACTION_PROMPT;

/// Messages kept verbatim at the tail of the transcript.
pub const KEEP_LAST_MESSAGES: usize = 10;

/// Per-line cap when flattening history into the summary prompt.
const MAX_LINE_CHARS: usize = 2_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trigger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether compaction should run: estimated tokens over the threshold
/// share of the context window, cooldown elapsed, and enough history to
/// compact.
pub fn should_compact(
    estimated_tokens: u64,
    context_limit: u32,
    message_count: usize,
    last_compacted_at: Option<DateTime<Utc>>,
    config: &AgentConfig,
    now: DateTime<Utc>,
) -> bool {
    if message_count <= KEEP_LAST_MESSAGES {
        return false;
    }
    let ceiling = (config.compaction_threshold * context_limit as f64) as u64;
    if estimated_tokens <= ceiling {
        return false;
    }
    match last_compacted_at {
        Some(at) => {
            (now - at).num_seconds() >= config.compaction_cooldown_seconds as i64
        }
        None => true,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The replacement transcript plus the trip profile extracted from the
/// summary.
pub struct CompactionResult {
    pub messages: Vec<Message>,
    pub trip_profile: Option<TripProfile>,
}

/// Summarize everything before the kept tail into one synthesized
/// assistant message and return the new transcript.
pub async fn run_compaction(
    provider: &dyn LlmProvider,
    session: &Session,
    itinerary: &Itinerary,
) -> Result<CompactionResult> {
    let split = session.messages.len().saturating_sub(KEEP_LAST_MESSAGES);
    let (older, kept) = session.messages.split_at(split);
    if older.is_empty() {
        return Ok(CompactionResult {
            messages: session.messages.clone(),
            trip_profile: session.trip_profile.clone(),
        });
    }

    let prompt = format!(
        "{COMPACTION_PROMPT}\nTRIP: {}\n\nCONVERSATION:\n{}",
        summary::summarize_itinerary_minimal(itinerary),
        flatten_history(older),
    );

    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        tools: Vec::new(),
        temperature: Some(0.1),
        max_tokens: Some(2_000),
        json_mode: true,
        model: None,
    };
    let resp = provider.chat(&req).await?;

    let parsed: serde_json::Value = serde_json::from_str(resp.content.trim())?;
    let trip_profile = parsed.get("tripProfile").map(|profile| TripProfile {
        confidence: profile
            .get("confidence")
            .and_then(|c| c.as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
        profile: profile.clone(),
    });

    let turns_compacted = older.len();
    let synthesized = Message::assistant(format!(
        "[Conversation summary: {turns_compacted} earlier messages compacted]\n{parsed}"
    ));

    let mut messages = Vec::with_capacity(kept.len() + 1);
    messages.push(synthesized);
    messages.extend_from_slice(kept);

    tracing::info!(
        session_id = %session.id,
        compacted = turns_compacted,
        kept = kept.len(),
        "session compacted"
    );

    Ok(CompactionResult {
        messages,
        trip_profile,
    })
}

/// Flatten messages into role-labeled lines, truncating the middle of
/// very long tool payloads to keep the summary prompt manageable.
fn flatten_history(messages: &[Message]) -> String {
    let mut buf = String::new();
    for msg in messages {
        let role = match msg.role {
            wp_domain::chat::Role::User => "User",
            wp_domain::chat::Role::Assistant => "Assistant",
            wp_domain::chat::Role::Tool => "Tool",
            wp_domain::chat::Role::System => "System",
        };
        buf.push_str(role);
        buf.push_str(": ");
        if msg.content.len() > MAX_LINE_CHARS {
            let head = truncate_boundary(&msg.content, 1_000);
            let tail_start = msg.content.len() - 500;
            let tail = &msg.content[ceil_boundary(&msg.content, tail_start)..];
            buf.push_str(head);
            buf.push_str(" [...] ");
            buf.push_str(tail);
        } else {
            buf.push_str(&msg.content);
        }
        if !msg.tool_calls.is_empty() {
            let names: Vec<&str> = msg.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
            buf.push_str(&format!(" [called: {}]", names.join(", ")));
        }
        buf.push('\n');
    }
    buf
}

fn truncate_boundary(s: &str, mut end: usize) -> &str {
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn ceil_boundary(s: &str, mut start: usize) -> usize {
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_config() -> AgentConfig {
        AgentConfig::default()
    }

    #[test]
    fn under_threshold_does_not_compact() {
        assert!(!should_compact(
            1_000,
            128_000,
            50,
            None,
            &agent_config(),
            Utc::now()
        ));
    }

    #[test]
    fn over_threshold_compacts() {
        assert!(should_compact(
            120_000,
            128_000,
            50,
            None,
            &agent_config(),
            Utc::now()
        ));
    }

    #[test]
    fn cooldown_suppresses_back_to_back_compaction() {
        let now = Utc::now();
        let config = agent_config();
        assert!(!should_compact(
            120_000,
            128_000,
            50,
            Some(now - chrono::Duration::seconds(60)),
            &config,
            now
        ));
        assert!(should_compact(
            120_000,
            128_000,
            50,
            Some(now - chrono::Duration::seconds(301)),
            &config,
            now
        ));
    }

    #[test]
    fn short_transcripts_never_compact() {
        assert!(!should_compact(
            120_000,
            128_000,
            KEEP_LAST_MESSAGES,
            None,
            &agent_config(),
            Utc::now()
        ));
    }

    #[test]
    fn flatten_truncates_long_payloads() {
        let messages = vec![Message::tool_result("c1", "z".repeat(5_000))];
        let flat = flatten_history(&messages);
        assert!(flat.contains(" [...] "));
        assert!(flat.len() < 2_000);
    }

    #[test]
    fn flatten_labels_tool_calls() {
        let messages = vec![Message::assistant_with_tools(
            "checking",
            vec![wp_domain::chat::ToolCall {
                id: "c1".into(),
                name: "search_hotels".into(),
                arguments: "{}".into(),
            }],
        )];
        let flat = flatten_history(&messages);
        assert!(flat.contains("Assistant: checking [called: search_hotels]"));
    }
}
