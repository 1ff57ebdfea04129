use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Knowledge base
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBackend {
    /// KB disabled; search tools always signal `web_search_needed`.
    #[default]
    None,
    /// HTTP vector store.
    Vector,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub backend: KnowledgeBackend,
    /// Vector backend endpoint. Overridable via `WAYPOINT_KB_URL`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bearer token. Never read from the file; set via `WAYPOINT_KB_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,
}
