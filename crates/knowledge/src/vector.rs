//! HTTP client for the vector knowledge backend.
//!
//! Wire contract: `POST {base}/search` with `{query, filters, limit}`
//! returning `{results: [{content, relevance, metadata}]}`, and
//! `POST {base}/documents` with the entry body. Any transport or shape
//! problem degrades to no hits; the executor then signals
//! `web_search_needed`.

use serde_json::Value;

use wp_domain::config::KnowledgeConfig;

use crate::{KnowledgeEntry, KnowledgeHit, KnowledgeRetriever, RetrievalContext};

const SEARCH_LIMIT: usize = 5;

pub struct VectorKnowledge {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl VectorKnowledge {
    pub fn new(cfg: &KnowledgeConfig) -> Option<Self> {
        let base_url = cfg.base_url.clone()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            client,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait::async_trait]
impl KnowledgeRetriever for VectorKnowledge {
    async fn search(&self, query: &str, ctx: &RetrievalContext) -> Vec<KnowledgeHit> {
        let body = serde_json::json!({
            "query": query,
            "filters": ctx,
            "limit": SEARCH_LIMIT,
        });

        let resp = match self.post("/search").json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge search failed");
                return Vec::new();
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "knowledge search rejected");
            return Vec::new();
        }

        let parsed: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge search returned malformed JSON");
                return Vec::new();
            }
        };

        let mut hits: Vec<KnowledgeHit> = parsed
            .get("results")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a: &KnowledgeHit, b: &KnowledgeHit| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    async fn store(&self, entry: KnowledgeEntry) -> bool {
        match self.post("/documents").json(&entry).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "knowledge store rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "knowledge store failed");
                false
            }
        }
    }
}
