//! Itinerary CRUD — the small surface callers use around the chat
//! loop. Dates are ISO-8601; `destinations` may be empty on read.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use wp_itinerary::model::Location;
use wp_itinerary::Itinerary;

use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub destinations: Option<Vec<Location>>,
}

impl ItineraryPatch {
    fn apply(&self, it: &mut Itinerary) {
        if let Some(title) = &self.title {
            it.title = title.clone();
        }
        if let Some(description) = &self.description {
            it.description = Some(description.clone());
        }
        if self.start_date.is_some() {
            it.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            it.end_date = self.end_date;
        }
        if let Some(destinations) = &self.destinations {
            it.destinations = destinations.clone();
        }
    }
}

pub async fn create_itinerary(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ItineraryPatch>>,
) -> impl IntoResponse {
    let mut itinerary = Itinerary::new();
    if let Some(Json(patch)) = body {
        patch.apply(&mut itinerary);
    }
    itinerary.owner = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    match state.itineraries.create(itinerary) {
        Ok(it) => (StatusCode::CREATED, Json(serde_json::json!(it))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn list_itineraries(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!(state.itineraries.list()))
}

pub async fn get_itinerary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.itineraries.get(&id) {
        Some(it) => Json(serde_json::json!(it)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "itinerary_not_found" })),
        )
            .into_response(),
    }
}

pub async fn update_itinerary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ItineraryPatch>,
) -> impl IntoResponse {
    let Some(mut it) = state.itineraries.get(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "itinerary_not_found" })),
        )
            .into_response();
    };

    patch.apply(&mut it);
    match state.itineraries.update(it) {
        Ok(committed) => Json(serde_json::json!(committed)).into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn delete_itinerary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.itineraries.delete(&id);
    StatusCode::NO_CONTENT
}
