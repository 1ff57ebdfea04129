//! Token estimation for the compaction trigger.
//!
//! The model is deliberately coarse: characters divided by four, a flat
//! overhead for the system prompt plus tool schemas (much larger for
//! the full catalog), and the full character length of embedded
//! tool-result payloads, which dominate long sessions.

use wp_domain::chat::{Message, Role};

/// Flat prompt + tool-schema overhead for a full-catalog round.
pub const FULL_PROMPT_OVERHEAD_TOKENS: u64 = 7_000;
/// Flat overhead for the essential-catalog round.
pub const ESSENTIAL_PROMPT_OVERHEAD_TOKENS: u64 = 1_000;

/// Estimate the tokens a completion over `messages` will consume.
pub fn estimate_tokens(messages: &[Message], full_tools: bool) -> u64 {
    let mut chars: u64 = 0;
    let mut tool_payload_chars: u64 = 0;

    for msg in messages {
        chars += msg.content.len() as u64;
        for tc in &msg.tool_calls {
            chars += (tc.name.len() + tc.arguments.len()) as u64;
        }
        if msg.role == Role::Tool {
            tool_payload_chars += msg.content.len() as u64;
        }
    }

    let overhead = if full_tools {
        FULL_PROMPT_OVERHEAD_TOKENS
    } else {
        ESSENTIAL_PROMPT_OVERHEAD_TOKENS
    };

    chars / 4 + overhead + tool_payload_chars
}
