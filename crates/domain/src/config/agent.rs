use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Knobs for the streaming agent loop: cost ceiling, compaction trigger,
/// and the tool-round ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Cumulative per-session USD cap. `None` disables the gate.
    #[serde(default)]
    pub session_cost_limit: Option<f64>,
    /// Compaction triggers when estimated tokens exceed
    /// `compaction_threshold * llm.context_limit`. Must be in (0, 1].
    #[serde(default = "d_threshold")]
    pub compaction_threshold: f64,
    /// Minimum seconds between two compactions of the same session.
    #[serde(default = "d_cooldown")]
    pub compaction_cooldown_seconds: u64,
    /// Maximum tool-call rounds within a single turn.
    #[serde(default = "d_rounds")]
    pub max_tool_rounds: u32,
    /// Idle timeout wrapped around individual LLM stream reads.
    #[serde(default = "d_idle")]
    pub idle_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            session_cost_limit: None,
            compaction_threshold: d_threshold(),
            compaction_cooldown_seconds: d_cooldown(),
            max_tool_rounds: d_rounds(),
            idle_timeout_seconds: d_idle(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_threshold() -> f64 {
    0.8
}
fn d_cooldown() -> u64 {
    300
}
fn d_rounds() -> u32 {
    8
}
fn d_idle() -> u64 {
    120
}
