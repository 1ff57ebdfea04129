//! Configuration tree for the waypoint gateway.
//!
//! Deserialized from TOML; every field has a serde default so a partial
//! (or absent) config file still yields a runnable configuration.
//! Secrets are never read from the file: they come from environment
//! variables applied in [`Config::apply_env`].

mod agent;
mod knowledge;
mod llm;
mod server;

pub use agent::AgentConfig;
pub use knowledge::{KnowledgeBackend, KnowledgeConfig};
pub use llm::{LlmConfig, ModelPricing};
pub use server::{CorsConfig, ServerConfig};

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Root config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Directory for persisted itineraries and sessions.
    #[serde(default = "d_state_path")]
    pub state_path: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            knowledge: KnowledgeConfig::default(),
            search: SearchConfig::default(),
            state_path: d_state_path(),
        }
    }
}

/// Search provider credentials. The core never performs web searches
/// itself (search tools signal `web_search_needed` to the caller), but
/// the key is recognized here so operators configure it in one place.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Config {
    /// Apply the recognized environment-variable overrides:
    /// `WAYPOINT_LLM_API_KEY`, `WAYPOINT_KB_URL`, `WAYPOINT_KB_TOKEN`,
    /// `WAYPOINT_SEARCH_API_KEY`.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("WAYPOINT_LLM_API_KEY") {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("WAYPOINT_KB_URL") {
            if !url.is_empty() {
                self.knowledge.base_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("WAYPOINT_KB_TOKEN") {
            if !token.is_empty() {
                self.knowledge.token = Some(token);
            }
        }
        if let Ok(key) = std::env::var("WAYPOINT_SEARCH_API_KEY") {
            if !key.is_empty() {
                self.search.api_key = Some(key);
            }
        }
    }

    /// Validate the configuration, returning issues with severities.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.llm.api_key.is_none() {
            issues.push(ConfigIssue::warning(
                "llm: no API key set (WAYPOINT_LLM_API_KEY); requests will be unauthenticated",
            ));
        }
        if !(0.0 < self.agent.compaction_threshold && self.agent.compaction_threshold <= 1.0) {
            issues.push(ConfigIssue::error(format!(
                "agent.compaction_threshold must be in (0, 1], got {}",
                self.agent.compaction_threshold
            )));
        }
        if self.agent.max_tool_rounds == 0 {
            issues.push(ConfigIssue::error("agent.max_tool_rounds must be at least 1"));
        }
        if self.llm.context_limit == 0 {
            issues.push(ConfigIssue::error("llm.context_limit must be positive"));
        }
        if self.knowledge.backend == KnowledgeBackend::Vector && self.knowledge.base_url.is_none() {
            issues.push(ConfigIssue::error(
                "knowledge.backend = \"vector\" requires a base_url (WAYPOINT_KB_URL)",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            message: message.into(),
        }
    }
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_path() -> std::path::PathBuf {
    std::path::PathBuf::from("./data")
}
