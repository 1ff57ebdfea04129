//! Title/destination consistency checker.
//!
//! Scans FLIGHT segments to derive where the trip actually goes, then
//! checks whether the title still names the origin instead (a common
//! leftover when an itinerary is cloned or imported). The summarizer
//! surfaces a warning block so the agent offers the fix on first reply.

use serde::Serialize;

use crate::model::{Itinerary, Location, SegmentDetails};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Airport code table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Common IATA codes and the city names travelers use for them.
/// Locations carrying an explicit `city` take precedence over this.
const AIRPORT_CITIES: &[(&str, &str)] = &[
    ("AMS", "Amsterdam"),
    ("ATL", "Atlanta"),
    ("AUS", "Austin"),
    ("BCN", "Barcelona"),
    ("BKK", "Bangkok"),
    ("BOS", "Boston"),
    ("CDG", "Paris"),
    ("CUN", "Cancun"),
    ("DEN", "Denver"),
    ("DFW", "Dallas"),
    ("DXB", "Dubai"),
    ("EWR", "New York"),
    ("FCO", "Rome"),
    ("FLL", "Fort Lauderdale"),
    ("GIG", "Rio de Janeiro"),
    ("HND", "Tokyo"),
    ("HNL", "Honolulu"),
    ("IST", "Istanbul"),
    ("JFK", "New York"),
    ("LAS", "Las Vegas"),
    ("LAX", "Los Angeles"),
    ("LGA", "New York"),
    ("LHR", "London"),
    ("LIS", "Lisbon"),
    ("MAD", "Madrid"),
    ("MCO", "Orlando"),
    ("MEX", "Mexico City"),
    ("MIA", "Miami"),
    ("MXP", "Milan"),
    ("NRT", "Tokyo"),
    ("ORD", "Chicago"),
    ("PHX", "Phoenix"),
    ("SAN", "San Diego"),
    ("SEA", "Seattle"),
    ("SFO", "San Francisco"),
    ("SIN", "Singapore"),
    ("SJU", "San Juan"),
    ("SXM", "St. Maarten"),
    ("SYD", "Sydney"),
    ("YVR", "Vancouver"),
    ("YYZ", "Toronto"),
];

/// City name for an airport code, when the table knows it.
pub fn city_for_code(code: &str) -> Option<&'static str> {
    let code = code.to_ascii_uppercase();
    AIRPORT_CITIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, city)| *city)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MismatchReport {
    pub has_mismatch: bool,
    /// The origin the title names (canonical casing).
    pub title_mentions: String,
    /// Where the flights actually arrive.
    pub actual_destination: String,
    /// The title with the origin token swapped for the destination,
    /// all other words preserved.
    pub suggested_title: String,
    pub explanation: String,
}

/// Detect a title that names the trip's origin rather than its
/// destination. Returns `None` when there are no flights, when the
/// destination cannot be derived unambiguously, or when the title is
/// consistent.
pub fn detect_title_destination_mismatch(itinerary: &Itinerary) -> Option<MismatchReport> {
    if itinerary.title.trim().is_empty() {
        return None;
    }

    // Only flights define where the trip goes; every other kind is
    // spelled out so a new segment kind forces a decision here.
    let flights: Vec<(&Location, &Location)> = itinerary
        .sorted_segments()
        .into_iter()
        .filter_map(|s| match &s.details {
            SegmentDetails::Flight {
                origin,
                destination,
                ..
            } => Some((origin, destination)),
            SegmentDetails::Hotel { .. }
            | SegmentDetails::Activity { .. }
            | SegmentDetails::Transfer { .. }
            | SegmentDetails::Meeting { .. }
            | SegmentDetails::Meal { .. }
            | SegmentDetails::Restaurant { .. }
            | SegmentDetails::Other { .. } => None,
        })
        .collect();
    let (first_origin, _) = *flights.first()?;
    let (_, last_destination) = *flights.last()?;

    // Round trip A→B, …, B→A lands back at the origin; the trip's
    // destination is then the first leg's arrival. Otherwise the last
    // terminal wins.
    let destination = if flights.len() >= 2 && last_destination.key() == first_origin.key() {
        flights[0].1
    } else {
        last_destination
    };
    if destination.key() == first_origin.key() {
        return None;
    }

    let searchable = match &itinerary.description {
        Some(desc) => format!("{} {desc}", itinerary.title),
        None => itinerary.title.clone(),
    };

    // A consistent title already names the destination somewhere.
    if location_tokens(destination)
        .iter()
        .any(|t| contains_token(&searchable, t))
    {
        return None;
    }

    // The mismatch needs the origin named in the title itself, so the
    // suggestion has a token to substitute.
    let origin_token = location_tokens(first_origin)
        .into_iter()
        .find(|t| contains_token(&itinerary.title, t))?;

    let destination_name = location_display(destination);
    let suggested_title = replace_token(&itinerary.title, &origin_token, &destination_name);

    Some(MismatchReport {
        has_mismatch: true,
        title_mentions: origin_token.clone(),
        actual_destination: destination_name.clone(),
        explanation: format!(
            "The title mentions \"{origin_token}\" but the flights arrive in {destination_name}."
        ),
        suggested_title,
    })
}

// ── Token helpers ───────────────────────────────────────────────────

/// Candidate tokens for a location, most human-readable first.
fn location_tokens(loc: &Location) -> Vec<String> {
    let mut tokens = Vec::new();
    if let Some(code) = &loc.code {
        if let Some(city) = city_for_code(code) {
            tokens.push(city.to_string());
        }
    }
    if let Some(city) = &loc.city {
        tokens.push(city.clone());
    }
    tokens.push(loc.name.clone());
    if let Some(code) = &loc.code {
        tokens.push(code.clone());
    }
    tokens.retain(|t| !t.trim().is_empty());
    tokens.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    tokens
}

/// Display name for a location: the table's city for its code, else
/// its own city, else its name.
fn location_display(loc: &Location) -> String {
    if let Some(code) = &loc.code {
        if let Some(city) = city_for_code(code) {
            return city.to_string();
        }
    }
    loc.display_name().to_string()
}

fn token_regex(token: &str) -> Option<regex::Regex> {
    regex::RegexBuilder::new(&format!(r"\b{}\b", regex::escape(token)))
        .case_insensitive(true)
        .build()
        .ok()
}

fn contains_token(text: &str, token: &str) -> bool {
    token_regex(token).is_some_and(|re| re.is_match(text))
}

/// Replace the first occurrence of `token` (case-insensitive, word
/// bounded) with `replacement`, leaving the rest of the string intact.
fn replace_token(text: &str, token: &str, replacement: &str) -> String {
    match token_regex(token) {
        Some(re) => re.replace(text, replacement).into_owned(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::flight;
    use chrono::TimeZone;

    fn dt(d: u32) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2026, 1, d, 9, 0, 0).unwrap()
    }

    fn round_trip_itinerary(title: &str) -> Itinerary {
        let mut it = Itinerary::new();
        it.title = title.into();
        it.segments
            .push(flight("f1", ("John F. Kennedy Intl", "JFK"), ("Princess Juliana Intl", "SXM"), dt(8)));
        it.segments
            .push(flight("f2", ("Princess Juliana Intl", "SXM"), ("John F. Kennedy Intl", "JFK"), dt(15)));
        it
    }

    #[test]
    fn round_trip_origin_title_is_flagged() {
        let it = round_trip_itinerary("New York Winter Getaway");
        let report = detect_title_destination_mismatch(&it).unwrap();
        assert!(report.has_mismatch);
        assert_eq!(report.title_mentions, "New York");
        assert_eq!(report.actual_destination, "St. Maarten");
        assert_eq!(report.suggested_title, "St. Maarten Winter Getaway");
    }

    #[test]
    fn suggested_title_passes_detection() {
        let it = round_trip_itinerary("New York Winter Getaway");
        let report = detect_title_destination_mismatch(&it).unwrap();

        let mut fixed = it.clone();
        fixed.title = report.suggested_title;
        assert_eq!(detect_title_destination_mismatch(&fixed), None);
    }

    #[test]
    fn consistent_title_is_not_flagged() {
        let it = round_trip_itinerary("St. Maarten Winter Getaway");
        assert_eq!(detect_title_destination_mismatch(&it), None);
    }

    #[test]
    fn destination_in_description_counts_as_consistent() {
        let mut it = round_trip_itinerary("Winter escape from New York");
        it.description = Some("A week in St. Maarten".into());
        assert_eq!(detect_title_destination_mismatch(&it), None);
    }

    #[test]
    fn one_way_uses_last_terminal() {
        let mut it = Itinerary::new();
        it.title = "Chicago Adventure".into();
        it.segments
            .push(flight("f1", ("Chicago O'Hare", "ORD"), ("Tokyo Narita", "NRT"), dt(3)));
        it.segments
            .push(flight("f2", ("Tokyo Narita", "NRT"), ("Bangkok", "BKK"), dt(8)));
        let report = detect_title_destination_mismatch(&it).unwrap();
        assert_eq!(report.actual_destination, "Bangkok");
        assert_eq!(report.suggested_title, "Bangkok Adventure");
    }

    #[test]
    fn no_flights_returns_none() {
        let mut it = Itinerary::new();
        it.title = "New York Winter Getaway".into();
        assert_eq!(detect_title_destination_mismatch(&it), None);
    }

    #[test]
    fn title_without_origin_returns_none() {
        let it = round_trip_itinerary("Beach Week");
        assert_eq!(detect_title_destination_mismatch(&it), None);
    }

    #[test]
    fn airport_code_in_title_matches() {
        let it = round_trip_itinerary("JFK departure test trip");
        let report = detect_title_destination_mismatch(&it).unwrap();
        assert_eq!(report.title_mentions, "JFK");
        assert_eq!(
            report.suggested_title,
            "St. Maarten departure test trip"
        );
    }
}
