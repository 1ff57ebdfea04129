//! Summarizer — projects an itinerary into the three context shapes the
//! agent loop needs: a full markdown block for the system prompt, a
//! one-liner for compaction, and a compact object for tool results.
//!
//! All three are pure functions of the itinerary; equal inputs produce
//! byte-equal output.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::mismatch::detect_title_destination_mismatch;
use crate::model::{Itinerary, Segment, SegmentDetails, SegmentKind, TripPreferences};

/// Detail lines rendered after the aggregate counts.
const MAX_SEGMENT_DETAIL_LINES: usize = 12;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Full markdown summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compact markdown context block for the system prompt. A
/// title/destination mismatch warning, when detected, leads the block
/// so the agent offers the fix in its first reply.
pub fn summarize_itinerary(itinerary: &Itinerary) -> String {
    let mut out = String::new();

    if let Some(report) = detect_title_destination_mismatch(itinerary) {
        out.push_str(&format!(
            "> **Warning:** {} Suggested title: \"{}\".\n\n",
            report.explanation, report.suggested_title
        ));
    }

    out.push_str(&format!("**Trip:** {}\n", itinerary.title));

    if let (Some(start), Some(end)) = (itinerary.start_date, itinerary.end_date) {
        let days = itinerary.day_count().unwrap_or(1);
        out.push_str(&format!(
            "**Dates:** {} - {} ({} days)\n",
            fmt_date(start),
            fmt_date(end),
            days
        ));
    }

    if !itinerary.travelers.is_empty() {
        let names: Vec<&str> = itinerary.travelers.iter().map(|t| t.name.as_str()).collect();
        if names.iter().all(|n| !n.is_empty()) {
            out.push_str(&format!("**Travelers:** {}\n", names.join(", ")));
        } else {
            out.push_str(&format!("**Travelers:** {}\n", names.len()));
        }
    }

    let destinations = itinerary.effective_destinations();
    if !destinations.is_empty() {
        let names: Vec<&str> = destinations.iter().map(|d| d.display_name()).collect();
        out.push_str(&format!("**Destinations:** {}\n", names.join(", ")));
    }

    if let Some(prefs) = &itinerary.trip_preferences {
        let lines = preference_lines(prefs);
        if !lines.is_empty() {
            out.push_str("**Preferences:**\n");
            for line in lines {
                out.push_str(&format!("- {line}\n"));
            }
        }
    }

    if let Some(budget) = &itinerary.budget {
        out.push_str(&format!("**Budget:** {} {}\n", budget.total, budget.currency));
    }

    if !itinerary.segments.is_empty() {
        out.push_str(&format!("**Segments:** {}\n", kind_counts(itinerary)));
        let sorted = itinerary.sorted_segments();
        for seg in sorted.iter().take(MAX_SEGMENT_DETAIL_LINES) {
            out.push_str(&format!("- {}\n", segment_line(seg)));
        }
        if sorted.len() > MAX_SEGMENT_DETAIL_LINES {
            out.push_str(&format!(
                "- ...and {} more\n",
                sorted.len() - MAX_SEGMENT_DETAIL_LINES
            ));
        }
    }

    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Minimal one-liner (used inside compaction)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One line preserving destination and trip shape:
/// `Title (start - end) | dest names | kind counts`.
pub fn summarize_itinerary_minimal(itinerary: &Itinerary) -> String {
    let mut parts = Vec::new();

    let title_part = match (itinerary.start_date, itinerary.end_date) {
        (Some(start), Some(end)) => format!("{} ({start} - {end})", itinerary.title),
        _ => itinerary.title.clone(),
    };
    parts.push(title_part);

    let destinations = itinerary.effective_destinations();
    if !destinations.is_empty() {
        let names: Vec<&str> = destinations.iter().map(|d| d.display_name()).collect();
        parts.push(names.join(", "));
    }

    if !itinerary.segments.is_empty() {
        parts.push(kind_counts(itinerary));
    }

    parts.join(" | ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool projection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compact structured projection served as the `get_itinerary` tool
/// result, bounding response tokens to a fraction of the full JSON.
pub fn summarize_itinerary_for_tool(itinerary: &Itinerary) -> Value {
    let dest_names: Vec<String> = itinerary
        .effective_destinations()
        .iter()
        .map(|d| d.display_name().to_string())
        .collect();

    let segments: Vec<Value> = itinerary
        .sorted_segments()
        .iter()
        .map(|seg| {
            json!({
                "id": seg.id,
                "type": seg.kind().as_str(),
                "startDatetime": seg.start_datetime,
                "name": seg.display_name(),
            })
        })
        .collect();

    json!({
        "id": itinerary.id,
        "title": itinerary.title,
        "dates": {
            "start": itinerary.start_date,
            "end": itinerary.end_date,
        },
        "destinations": dest_names,
        "segments": segments,
        "preferences": itinerary.trip_preferences,
        "travelers": itinerary
            .travelers
            .iter()
            .map(|t| t.name.clone())
            .collect::<Vec<_>>(),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fmt_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

fn fmt_day(dt: DateTime<Utc>) -> String {
    dt.format("%b %-d").to_string()
}

/// Aggregate counts in kind order: "2 flights, 1 hotel, 3 activities".
fn kind_counts(itinerary: &Itinerary) -> String {
    let mut counts: BTreeMap<SegmentKind, usize> = BTreeMap::new();
    for seg in &itinerary.segments {
        *counts.entry(seg.kind()).or_default() += 1;
    }
    counts
        .iter()
        .map(|(kind, n)| kind.plural_label(*n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One detail line per segment, minimal per-kind shape.
fn segment_line(seg: &Segment) -> String {
    let day = fmt_day(seg.start_datetime);
    match &seg.details {
        SegmentDetails::Flight {
            origin,
            destination,
            ..
        } => format!("FLIGHT: {day} ({} \u{2192} {})", origin.key(), destination.key()),
        SegmentDetails::Hotel {
            property,
            check_in,
            check_out,
            ..
        } => {
            let nights = (check_out.date_naive() - check_in.date_naive()).num_days().max(1);
            format!("HOTEL: {day} ({nights} nights, {property})")
        }
        SegmentDetails::Activity { name, .. } => format!("ACTIVITY: {day} - {name}"),
        SegmentDetails::Transfer {
            transfer_type,
            pickup_location,
            dropoff_location,
        } => format!(
            "TRANSFER: {day} - {transfer_type} ({} \u{2192} {})",
            pickup_location.display_name(),
            dropoff_location.display_name()
        ),
        SegmentDetails::Meeting { name, .. } => format!("MEETING: {day} - {name}"),
        SegmentDetails::Meal { name, .. } => format!("MEAL: {day} - {name}"),
        SegmentDetails::Restaurant { name, .. } => format!("RESTAURANT: {day} - {name}"),
        SegmentDetails::Other { name } => format!(
            "OTHER: {day} - {}",
            name.as_deref().unwrap_or("unspecified")
        ),
    }
}

/// Human-labeled lines for the populated preference fields only.
fn preference_lines(prefs: &TripPreferences) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(style) = &prefs.travel_style {
        lines.push(format!("Travel style: {style}"));
    }
    if let Some(pace) = &prefs.pace {
        lines.push(format!("Pace: {pace}"));
    }
    if !prefs.interests.is_empty() {
        lines.push(format!("Interests: {}", prefs.interests.join(", ")));
    }
    if let Some(flex) = prefs.budget_flexibility {
        lines.push(format!("Budget flexibility: {}", flexibility_label(flex)));
    }
    if let Some(diet) = &prefs.dietary_restrictions {
        lines.push(format!("Dietary restrictions: {diet}"));
    }
    if let Some(mobility) = &prefs.mobility_restrictions {
        lines.push(format!("Mobility restrictions: {mobility}"));
    }
    if let Some(origin) = &prefs.origin {
        lines.push(format!("Origin: {origin}"));
    }
    if let Some(accommodation) = &prefs.accommodation_preference {
        lines.push(format!("Accommodation: {accommodation}"));
    }
    if !prefs.activity_preferences.is_empty() {
        lines.push(format!(
            "Activity preferences: {}",
            prefs.activity_preferences.join(", ")
        ));
    }
    if !prefs.avoidances.is_empty() {
        lines.push(format!("Avoid: {}", prefs.avoidances.join(", ")));
    }
    lines
}

fn flexibility_label(flex: u8) -> &'static str {
    match flex {
        1 => "very strict",
        2 => "strict",
        3 => "moderate",
        4 => "flexible",
        _ => "very flexible",
    }
}
