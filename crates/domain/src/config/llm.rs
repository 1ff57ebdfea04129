use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings for the OpenAI-compatible chat completion endpoint that
/// drives the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Model context window in tokens; compaction triggers against this.
    #[serde(default = "d_context_limit")]
    pub context_limit: u32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Per-token pricing used for `costUSD` accounting.
    #[serde(default)]
    pub pricing: ModelPricing,
    /// API key. Never read from the config file; set via
    /// `WAYPOINT_LLM_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            context_limit: d_context_limit(),
            max_tokens: d_max_tokens(),
            temperature: d_temperature(),
            pricing: ModelPricing::default(),
            api_key: None,
        }
    }
}

/// USD per million tokens, split by direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default = "d_input_price")]
    pub input_per_mtok: f64,
    #[serde(default = "d_output_price")]
    pub output_per_mtok: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_mtok: d_input_price(),
            output_per_mtok: d_output_price(),
        }
    }
}

impl ModelPricing {
    /// Estimated cost in USD for one completion.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_mtok + output_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_context_limit() -> u32 {
    128_000
}
fn d_max_tokens() -> u32 {
    4_096
}
fn d_temperature() -> f32 {
    0.7
}
fn d_input_price() -> f64 {
    2.50
}
fn d_output_price() -> f64 {
    10.00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_estimate_scales_by_direction() {
        let pricing = ModelPricing {
            input_per_mtok: 1.0,
            output_per_mtok: 10.0,
        };
        let cost = pricing.estimate_cost(1_000_000, 100_000);
        assert!((cost - 2.0).abs() < 1e-9);
    }
}
