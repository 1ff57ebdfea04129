use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Location
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    /// IATA or similar short code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_code(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: Some(code.into()),
            ..Default::default()
        }
    }

    /// Deduplication key: code when present, else the name.
    pub fn key(&self) -> String {
        self.code
            .as_deref()
            .unwrap_or(&self.name)
            .to_ascii_uppercase()
    }

    /// Human display name: city when present, else the name.
    pub fn display_name(&self) -> &str {
        self.city.as_deref().unwrap_or(&self.name)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Segment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentStatus {
    #[default]
    Tentative,
    Confirmed,
    Cancelled,
}

/// Closed sum over the segment kinds. The tag doubles as the wire
/// `type` field on a [`Segment`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum SegmentDetails {
    Flight {
        airline: String,
        flight_number: String,
        origin: Location,
        destination: Location,
    },
    Hotel {
        property: String,
        location: Location,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    },
    Activity {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Transfer {
        transfer_type: String,
        pickup_location: Location,
        dropoff_location: Location,
    },
    Meeting {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Meal {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Restaurant {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Other {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// Discriminant of [`SegmentDetails`], usable without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKind {
    Flight,
    Hotel,
    Activity,
    Transfer,
    Meeting,
    Meal,
    Restaurant,
    Other,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flight => "FLIGHT",
            Self::Hotel => "HOTEL",
            Self::Activity => "ACTIVITY",
            Self::Transfer => "TRANSFER",
            Self::Meeting => "MEETING",
            Self::Meal => "MEAL",
            Self::Restaurant => "RESTAURANT",
            Self::Other => "OTHER",
        }
    }

    /// Lower-case label used in aggregate count lines ("2 flights").
    pub fn plural_label(self, n: usize) -> String {
        let base = match self {
            Self::Flight => "flight",
            Self::Hotel => "hotel",
            Self::Activity => "activity",
            Self::Transfer => "transfer",
            Self::Meeting => "meeting",
            Self::Meal => "meal",
            Self::Restaurant => "restaurant",
            Self::Other => "other segment",
        };
        if n == 1 {
            format!("1 {base}")
        } else if self == Self::Activity {
            format!("{n} activities")
        } else {
            format!("{n} {base}s")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    #[serde(flatten)]
    pub details: SegmentDetails,
    #[serde(default)]
    pub status: SegmentStatus,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    #[serde(default)]
    pub traveler_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set on placeholders synthesized rather than user-confirmed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inferred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred_reason: Option<String>,
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        match self.details {
            SegmentDetails::Flight { .. } => SegmentKind::Flight,
            SegmentDetails::Hotel { .. } => SegmentKind::Hotel,
            SegmentDetails::Activity { .. } => SegmentKind::Activity,
            SegmentDetails::Transfer { .. } => SegmentKind::Transfer,
            SegmentDetails::Meeting { .. } => SegmentKind::Meeting,
            SegmentDetails::Meal { .. } => SegmentKind::Meal,
            SegmentDetails::Restaurant { .. } => SegmentKind::Restaurant,
            SegmentDetails::Other { .. } => SegmentKind::Other,
        }
    }

    /// Minimal display name for summaries and tool projections.
    pub fn display_name(&self) -> String {
        match &self.details {
            SegmentDetails::Flight {
                airline,
                flight_number,
                origin,
                destination,
            } => format!(
                "{airline} {flight_number} ({} \u{2192} {})",
                origin.key(),
                destination.key()
            ),
            SegmentDetails::Hotel { property, .. } => property.clone(),
            SegmentDetails::Activity { name, .. }
            | SegmentDetails::Meeting { name, .. }
            | SegmentDetails::Meal { name, .. }
            | SegmentDetails::Restaurant { name, .. } => name.clone(),
            SegmentDetails::Transfer {
                transfer_type,
                pickup_location,
                dropoff_location,
            } => format!(
                "{transfer_type} ({} \u{2192} {})",
                pickup_location.display_name(),
                dropoff_location.display_name()
            ),
            SegmentDetails::Other { name } => {
                name.clone().unwrap_or_else(|| "other".into())
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Travelers & preferences
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Traveler {
    pub id: String,
    pub name: String,
}

/// Sparse preference record. All fields optional; updates merge
/// field-wise through [`TripPreferences::apply_patch`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    /// 1 = very strict, 5 = very flexible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_flexibility: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobility_restrictions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation_preference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity_preferences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub avoidances: Vec<String>,
}

impl TripPreferences {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge a JSON patch field-wise: absent keys leave the prior value,
    /// explicit `null` clears, anything else replaces. Returns the names
    /// of the fields that were touched.
    pub fn apply_patch(&mut self, patch: &serde_json::Value) -> Vec<String> {
        let Some(obj) = patch.as_object() else {
            return Vec::new();
        };
        let mut updated = Vec::new();

        for (key, value) in obj {
            let touched = match key.as_str() {
                "travelStyle" => patch_string(&mut self.travel_style, value),
                "pace" => patch_string(&mut self.pace, value),
                "interests" => patch_string_list(&mut self.interests, value),
                "budgetFlexibility" => {
                    if value.is_null() {
                        self.budget_flexibility = None;
                        true
                    } else if let Some(n) = value.as_u64() {
                        self.budget_flexibility = Some((n.clamp(1, 5)) as u8);
                        true
                    } else {
                        false
                    }
                }
                "dietaryRestrictions" => patch_string(&mut self.dietary_restrictions, value),
                "mobilityRestrictions" => patch_string(&mut self.mobility_restrictions, value),
                "origin" => patch_string(&mut self.origin, value),
                "accommodationPreference" => {
                    patch_string(&mut self.accommodation_preference, value)
                }
                "activityPreferences" => patch_string_list(&mut self.activity_preferences, value),
                "avoidances" => patch_string_list(&mut self.avoidances, value),
                _ => false,
            };
            if touched {
                updated.push(key.clone());
            }
        }

        updated
    }
}

fn patch_string(slot: &mut Option<String>, value: &serde_json::Value) -> bool {
    if value.is_null() {
        *slot = None;
        true
    } else if let Some(s) = value.as_str() {
        *slot = Some(s.to_string());
        true
    } else {
        false
    }
}

fn patch_string_list(slot: &mut Vec<String>, value: &serde_json::Value) -> bool {
    if value.is_null() {
        slot.clear();
        true
    } else if let Some(arr) = value.as_array() {
        *slot = arr
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        true
    } else {
        false
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Itinerary aggregate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub total: f64,
    #[serde(default = "d_currency")]
    pub currency: String,
}

fn d_currency() -> String {
    "USD".into()
}

pub const FRESH_TITLE: &str = "New Itinerary";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub id: String,
    /// Monotonically increasing; bumped by the store on every write.
    pub version: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub destinations: Vec<Location>,
    #[serde(default)]
    pub travelers: Vec<Traveler>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_preferences: Option<TripPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Itinerary {
    /// A fresh itinerary: default title, no segments, no destinations.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            version: 1,
            title: FRESH_TITLE.into(),
            description: None,
            start_date: None,
            end_date: None,
            destinations: Vec::new(),
            travelers: Vec::new(),
            segments: Vec::new(),
            trip_preferences: None,
            budget: None,
            owner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when nothing has been planned yet. Gates the essential tool
    /// catalog on the first turn of a session.
    pub fn is_blank(&self) -> bool {
        self.segments.is_empty()
            && self.title == FRESH_TITLE
            && self.destinations.is_empty()
            && self
                .trip_preferences
                .as_ref()
                .map_or(true, TripPreferences::is_empty)
    }

    /// Segments in chronological order.
    pub fn sorted_segments(&self) -> Vec<&Segment> {
        let mut segs: Vec<&Segment> = self.segments.iter().collect();
        segs.sort_by_key(|s| s.start_datetime);
        segs
    }

    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn segment_mut(&mut self, id: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.id == id)
    }

    /// Destinations to show: the explicit list, or the fallback derived
    /// from FLIGHT destinations and HOTEL locations in segment order,
    /// deduplicated by code-or-name.
    pub fn effective_destinations(&self) -> Vec<Location> {
        if !self.destinations.is_empty() {
            return self.destinations.clone();
        }
        self.derived_destinations()
    }

    /// The fingerprint fallback: scan segments chronologically for
    /// FLIGHT destinations and HOTEL locations.
    pub fn derived_destinations(&self) -> Vec<Location> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for seg in self.sorted_segments() {
            let loc = match &seg.details {
                SegmentDetails::Flight { destination, .. } => Some(destination),
                SegmentDetails::Hotel { location, .. } => Some(location),
                SegmentDetails::Activity { .. }
                | SegmentDetails::Transfer { .. }
                | SegmentDetails::Meeting { .. }
                | SegmentDetails::Meal { .. }
                | SegmentDetails::Restaurant { .. }
                | SegmentDetails::Other { .. } => None,
            };
            if let Some(loc) = loc {
                if seen.insert(loc.key()) {
                    out.push(loc.clone());
                }
            }
        }
        out
    }

    /// Inclusive day count when both dates are present.
    pub fn day_count(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_days() + 1),
            _ => None,
        }
    }
}

impl Default for Itinerary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    pub(crate) fn flight(
        id: &str,
        origin: (&str, &str),
        dest: (&str, &str),
        start: DateTime<Utc>,
    ) -> Segment {
        Segment {
            id: id.into(),
            details: SegmentDetails::Flight {
                airline: "DL".into(),
                flight_number: "100".into(),
                origin: Location::with_code(origin.0, origin.1),
                destination: Location::with_code(dest.0, dest.1),
            },
            status: SegmentStatus::Confirmed,
            start_datetime: start,
            end_datetime: start + chrono::Duration::hours(4),
            traveler_ids: vec![],
            notes: None,
            inferred: false,
            inferred_reason: None,
        }
    }

    #[test]
    fn fresh_itinerary_is_blank() {
        let it = Itinerary::new();
        assert_eq!(it.title, "New Itinerary");
        assert!(it.is_blank());
    }

    #[test]
    fn renamed_itinerary_is_not_blank() {
        let mut it = Itinerary::new();
        it.title = "Tokyo Trip".into();
        assert!(!it.is_blank());
    }

    #[test]
    fn empty_preferences_keep_it_blank() {
        let mut it = Itinerary::new();
        it.trip_preferences = Some(TripPreferences::default());
        assert!(it.is_blank());
        it.trip_preferences.as_mut().unwrap().pace = Some("leisurely".into());
        assert!(!it.is_blank());
    }

    #[test]
    fn derived_destinations_from_flights_and_hotels() {
        let mut it = Itinerary::new();
        it.segments.push(flight(
            "f1",
            ("New York", "JFK"),
            ("St. Maarten", "SXM"),
            dt(2026, 1, 8, 9),
        ));
        it.segments.push(Segment {
            id: "h1".into(),
            details: SegmentDetails::Hotel {
                property: "Belmond La Samanna".into(),
                location: Location::with_code("St. Maarten", "SXM"),
                check_in: dt(2026, 1, 8, 15),
                check_out: dt(2026, 1, 15, 11),
            },
            status: SegmentStatus::Confirmed,
            start_datetime: dt(2026, 1, 8, 15),
            end_datetime: dt(2026, 1, 15, 11),
            traveler_ids: vec![],
            notes: None,
            inferred: false,
            inferred_reason: None,
        });

        let derived = it.derived_destinations();
        // Same key (SXM) deduplicates the hotel location.
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].key(), "SXM");
    }

    #[test]
    fn segment_serde_tags_kind_upper_case() {
        let seg = flight("f1", ("New York", "JFK"), ("Paris", "CDG"), dt(2026, 3, 1, 8));
        let v = serde_json::to_value(&seg).unwrap();
        assert_eq!(v["type"], "FLIGHT");
        assert_eq!(v["status"], "CONFIRMED");
        let back: Segment = serde_json::from_value(v).unwrap();
        assert_eq!(back.kind(), SegmentKind::Flight);
    }

    #[test]
    fn preferences_patch_merges_field_wise() {
        let mut prefs = TripPreferences {
            travel_style: Some("luxury".into()),
            pace: Some("packed".into()),
            ..Default::default()
        };
        let updated = prefs.apply_patch(&serde_json::json!({
            "pace": "leisurely",
            "budgetFlexibility": 4,
            "interests": ["food", "diving"],
        }));
        assert_eq!(updated.len(), 3);
        // Untouched field survives.
        assert_eq!(prefs.travel_style.as_deref(), Some("luxury"));
        assert_eq!(prefs.pace.as_deref(), Some("leisurely"));
        assert_eq!(prefs.budget_flexibility, Some(4));
    }

    #[test]
    fn preferences_patch_null_clears() {
        let mut prefs = TripPreferences {
            dietary_restrictions: Some("vegetarian".into()),
            ..Default::default()
        };
        prefs.apply_patch(&serde_json::json!({ "dietaryRestrictions": null }));
        assert_eq!(prefs.dietary_restrictions, None);
    }

    #[test]
    fn day_count_is_inclusive() {
        let mut it = Itinerary::new();
        it.start_date = NaiveDate::from_ymd_opt(2026, 1, 8);
        it.end_date = NaiveDate::from_ymd_opt(2026, 1, 15);
        assert_eq!(it.day_count(), Some(8));
    }
}
