//! Tool catalog — the declarations exposed to the LLM.
//!
//! Two sub-catalogs share one namespace: the essential set is sent on
//! the very first turn of a brand-new itinerary to keep prompt tokens
//! down; every other turn gets the full set. Tool names are stable
//! across both, so a phase-one transcript stays valid later.

use serde_json::json;

use wp_domain::chat::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared schema fragments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn location_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Place name" },
            "code": { "type": "string", "description": "IATA or similar code" },
            "city": { "type": "string" },
            "country": { "type": "string" }
        },
        "required": ["name"]
    })
}

fn datetime_prop(desc: &str) -> serde_json::Value {
    json!({ "type": "string", "format": "date-time", "description": desc })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalogs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The minimal catalog for the first turn on an empty itinerary:
/// exactly get_itinerary, update_itinerary, update_preferences,
/// search_web.
pub fn essential_catalog() -> Vec<ToolDefinition> {
    let mut defs = Vec::new();

    defs.push(ToolDefinition {
        name: "get_itinerary".into(),
        description: "Read the current itinerary as a compact summary.".into(),
        parameters: json!({
            "type": "object",
            "properties": {}
        }),
    });

    defs.push(ToolDefinition {
        name: "update_itinerary".into(),
        description: "Update itinerary metadata: title, description, dates, destinations, budget.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "description": { "type": "string" },
                "startDate": { "type": "string", "format": "date" },
                "endDate": { "type": "string", "format": "date" },
                "destinations": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Destination names, in visit order"
                },
                "budgetTotal": { "type": "number" },
                "budgetCurrency": { "type": "string" }
            }
        }),
    });

    defs.push(ToolDefinition {
        name: "update_preferences".into(),
        description: "Merge traveler preferences. Omitted fields keep their value; null clears.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "travelStyle": { "type": "string", "enum": ["luxury", "moderate", "budget", "backpacker"] },
                "pace": { "type": "string", "enum": ["packed", "balanced", "leisurely"] },
                "interests": { "type": "array", "items": { "type": "string" } },
                "budgetFlexibility": { "type": "integer", "minimum": 1, "maximum": 5 },
                "dietaryRestrictions": { "type": "string" },
                "mobilityRestrictions": { "type": "string" },
                "origin": { "type": "string" },
                "accommodationPreference": { "type": "string" },
                "activityPreferences": { "type": "array", "items": { "type": "string" } },
                "avoidances": { "type": "array", "items": { "type": "string" } }
            }
        }),
    });

    defs.push(ToolDefinition {
        name: "search_web".into(),
        description: "Search for travel information. Checks the knowledge base first; may signal that a web search is needed.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        }),
    });

    defs
}

/// The full catalog: the essential set plus segment manipulation,
/// travel search, and knowledge tools.
pub fn full_catalog() -> Vec<ToolDefinition> {
    let mut defs = essential_catalog();

    // ── Queries ───────────────────────────────────────────────────
    defs.push(ToolDefinition {
        name: "get_segment".into(),
        description: "Read one segment by id.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "segmentId": { "type": "string" }
            },
            "required": ["segmentId"]
        }),
    });

    // ── Segment creation ──────────────────────────────────────────
    defs.push(ToolDefinition {
        name: "add_flight".into(),
        description: "Add a flight segment.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "airline": { "type": "string" },
                "flightNumber": { "type": "string" },
                "origin": location_schema(),
                "destination": location_schema(),
                "startDatetime": datetime_prop("Departure, ISO-8601 UTC"),
                "endDatetime": datetime_prop("Arrival, ISO-8601 UTC"),
                "travelerIds": { "type": "array", "items": { "type": "string" } },
                "notes": { "type": "string" }
            },
            "required": ["airline", "flightNumber", "origin", "destination", "startDatetime", "endDatetime"]
        }),
    });

    defs.push(ToolDefinition {
        name: "add_hotel".into(),
        description: "Add a hotel stay.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "property": { "type": "string", "description": "Hotel name" },
                "location": location_schema(),
                "checkIn": datetime_prop("Check-in, ISO-8601 UTC"),
                "checkOut": datetime_prop("Check-out, ISO-8601 UTC"),
                "travelerIds": { "type": "array", "items": { "type": "string" } },
                "notes": { "type": "string" }
            },
            "required": ["property", "location", "checkIn", "checkOut"]
        }),
    });

    defs.push(ToolDefinition {
        name: "add_activity".into(),
        description: "Add an activity segment.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "location": location_schema(),
                "startDatetime": datetime_prop("Start, ISO-8601 UTC"),
                "endDatetime": datetime_prop("End, ISO-8601 UTC"),
                "travelerIds": { "type": "array", "items": { "type": "string" } },
                "notes": { "type": "string" }
            },
            "required": ["name", "startDatetime", "endDatetime"]
        }),
    });

    defs.push(ToolDefinition {
        name: "add_transfer".into(),
        description: "Add a ground transfer between two locations.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "transferType": { "type": "string", "description": "e.g. taxi, shuttle, private car" },
                "pickupLocation": location_schema(),
                "dropoffLocation": location_schema(),
                "startDatetime": datetime_prop("Pickup, ISO-8601 UTC"),
                "endDatetime": datetime_prop("Dropoff, ISO-8601 UTC"),
                "travelerIds": { "type": "array", "items": { "type": "string" } },
                "notes": { "type": "string" }
            },
            "required": ["transferType", "pickupLocation", "dropoffLocation", "startDatetime", "endDatetime"]
        }),
    });

    defs.push(ToolDefinition {
        name: "add_meeting".into(),
        description: "Add a meeting or appointment.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "location": location_schema(),
                "startDatetime": datetime_prop("Start, ISO-8601 UTC"),
                "endDatetime": datetime_prop("End, ISO-8601 UTC"),
                "travelerIds": { "type": "array", "items": { "type": "string" } },
                "notes": { "type": "string" }
            },
            "required": ["name", "startDatetime", "endDatetime"]
        }),
    });

    // ── Segment mutation ──────────────────────────────────────────
    defs.push(ToolDefinition {
        name: "update_segment".into(),
        description: "Patch fields on a segment (status, times, notes, kind-specific fields). The segment type cannot change.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "segmentId": { "type": "string" },
                "status": { "type": "string", "enum": ["TENTATIVE", "CONFIRMED", "CANCELLED"] },
                "startDatetime": datetime_prop("New start, ISO-8601 UTC"),
                "endDatetime": datetime_prop("New end, ISO-8601 UTC"),
                "notes": { "type": "string" }
            },
            "required": ["segmentId"],
            "additionalProperties": true
        }),
    });

    defs.push(ToolDefinition {
        name: "delete_segment".into(),
        description: "Remove a segment from the itinerary.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "segmentId": { "type": "string" }
            },
            "required": ["segmentId"]
        }),
    });

    defs.push(ToolDefinition {
        name: "move_segment".into(),
        description: "Shift a segment to a new start time, preserving its duration. By default every later segment for the same traveler shifts by the same amount.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "segmentId": { "type": "string" },
                "newStartDatetime": datetime_prop("New start, ISO-8601 UTC"),
                "cascade": { "type": "boolean", "description": "Shift later same-traveler segments too (default true)" }
            },
            "required": ["segmentId", "newStartDatetime"]
        }),
    });

    defs.push(ToolDefinition {
        name: "reorder_segments".into(),
        description: "Reorder segments. The order must list every segment id and stay chronological.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "segmentIds": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "All segment ids in the desired order"
                }
            },
            "required": ["segmentIds"]
        }),
    });

    // ── Travel search ─────────────────────────────────────────────
    defs.push(ToolDefinition {
        name: "search_flights".into(),
        description: "Search flight options. Checks the knowledge base first; may signal that a web search is needed.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "origin": { "type": "string" },
                "destination": { "type": "string" },
                "date": { "type": "string", "format": "date" }
            },
            "required": ["origin", "destination"]
        }),
    });

    defs.push(ToolDefinition {
        name: "search_hotels".into(),
        description: "Search hotel options. Checks the knowledge base first; may signal that a web search is needed.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "destination": { "type": "string" },
                "checkIn": { "type": "string", "format": "date" },
                "checkOut": { "type": "string", "format": "date" }
            },
            "required": ["destination"]
        }),
    });

    defs.push(ToolDefinition {
        name: "search_transfers".into(),
        description: "Search ground transfer options. Checks the knowledge base first; may signal that a web search is needed.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "pickup": { "type": "string" },
                "dropoff": { "type": "string" },
                "date": { "type": "string", "format": "date" }
            },
            "required": ["pickup", "dropoff"]
        }),
    });

    // ── Travel intelligence ───────────────────────────────────────
    defs.push(ToolDefinition {
        name: "store_travel_intelligence".into(),
        description: "Store a reusable piece of travel knowledge (tip, seasonal fact, recurring event).".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "destination": { "type": "string" },
                "dates": { "type": "string", "description": "When this applies, e.g. 'annual, late April' or 'rainy season'" }
            },
            "required": ["content"]
        }),
    });

    defs.push(ToolDefinition {
        name: "retrieve_travel_intelligence".into(),
        description: "Retrieve stored travel knowledge for a destination or topic.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "destination": { "type": "string" }
            },
            "required": ["query"]
        }),
    });

    defs
}
