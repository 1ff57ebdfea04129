//! HTTP surface: session lifecycle + streaming, and the small
//! itinerary CRUD callers need.

pub mod itineraries;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        // ── Sessions ──────────────────────────────────────────────
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/sessions/:id/messages/stream",
            post(sessions::stream_message),
        )
        // ── Itineraries ───────────────────────────────────────────
        .route(
            "/itineraries",
            post(itineraries::create_itinerary).get(itineraries::list_itineraries),
        )
        .route(
            "/itineraries/:id",
            get(itineraries::get_itinerary)
                .put(itineraries::update_itinerary)
                .delete(itineraries::delete_itinerary),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
