use std::sync::Arc;

use wp_domain::config::Config;
use wp_itinerary::ItineraryStore;
use wp_knowledge::KnowledgeRetriever;
use wp_providers::LlmProvider;
use wp_sessions::SessionStore;

use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmProvider>,
    pub knowledge: Arc<dyn KnowledgeRetriever>,
    pub itineraries: Arc<ItineraryStore>,
    pub sessions: Arc<SessionStore>,
    pub session_locks: Arc<SessionLockMap>,
}
