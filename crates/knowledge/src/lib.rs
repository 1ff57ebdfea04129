//! Knowledge-base retrieval layer.
//!
//! The tool executor consults the KB before falling back to web search:
//! a hit at or above [`RELEVANCE_FLOOR`] short-circuits, anything less
//! makes the search tool signal `web_search_needed` to the caller. The
//! retriever must never block a turn: backend failures degrade to
//! "no hits".

pub mod vector;

use serde::{Deserialize, Serialize};

pub use vector::VectorKnowledge;

/// Minimum relevance for a KB hit to satisfy a search tool.
pub const RELEVANCE_FLOOR: f64 = 0.7;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Filter context derived from the itinerary being discussed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalContext {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeHit {
    pub content: String,
    /// In [0, 1]; higher is better.
    pub relevance: f64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// How long a piece of travel intelligence stays true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalType {
    /// Tied to a recurring event ("annual regatta in March").
    Event,
    /// True for a season ("rainy season runs June-November").
    Seasonal,
    /// Always true ("the airport taxi rank is cash-only").
    Evergreen,
}

/// An entry to store: free text plus destination and temporal tags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub temporal_type: TemporalType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Temporal classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SEASON_WORDS: &[&str] = &[
    "winter", "spring", "summer", "fall", "autumn", "monsoon", "rainy", "dry season",
    "high season", "low season", "shoulder season",
];

/// Classify a free-text `dates` annotation: "annual" marks an event,
/// season words mark seasonal knowledge, everything else is evergreen.
pub fn classify_temporal(dates: Option<&str>) -> TemporalType {
    let Some(dates) = dates else {
        return TemporalType::Evergreen;
    };
    let lower = dates.to_lowercase();
    if lower.contains("annual") {
        return TemporalType::Event;
    }
    if SEASON_WORDS.iter().any(|w| lower.contains(w)) {
        return TemporalType::Seasonal;
    }
    TemporalType::Evergreen
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retriever trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Search the KB with itinerary-derived filters. Implementations
    /// return hits sorted by relevance, best first, and degrade to an
    /// empty list on backend failure.
    async fn search(&self, query: &str, ctx: &RetrievalContext) -> Vec<KnowledgeHit>;

    /// Store a piece of travel intelligence. Failures are logged, not
    /// surfaced: storing knowledge must never fail a turn.
    async fn store(&self, entry: KnowledgeEntry) -> bool;
}

/// The `backend = "none"` retriever: no hits, stores vanish.
pub struct NoopKnowledge;

#[async_trait::async_trait]
impl KnowledgeRetriever for NoopKnowledge {
    async fn search(&self, _query: &str, _ctx: &RetrievalContext) -> Vec<KnowledgeHit> {
        Vec::new()
    }

    async fn store(&self, _entry: KnowledgeEntry) -> bool {
        false
    }
}
