//! Segment mutation service: add/update/delete, time-shift moves with
//! cascade, reorder validation, and same-traveler overlap warnings.
//!
//! Overlaps warn, they never reject. A segment with no traveler ids is
//! treated as applying to the whole party, both for cascade moves and
//! for overlap detection.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use wp_domain::{Error, Result};

use crate::model::{Itinerary, Segment, SegmentDetails, SegmentStatus};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Add / update / delete
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append a segment; returns overlap warnings for the new state.
pub fn add_segment(itinerary: &mut Itinerary, segment: Segment) -> Result<Vec<String>> {
    if segment.end_datetime < segment.start_datetime {
        return Err(Error::Other(format!(
            "segment {} ends before it starts",
            segment.id
        )));
    }
    itinerary.segments.push(segment);
    Ok(overlap_warnings(itinerary))
}

/// Merge a shallow JSON patch into a segment. Keys follow the wire
/// shape (`startDatetime`, `notes`, kind-specific fields). `null`
/// clears optional fields; the `type` tag cannot be changed in place.
/// Returns the patch keys that were applied.
pub fn update_segment(
    itinerary: &mut Itinerary,
    segment_id: &str,
    patch: &Value,
) -> Result<Vec<String>> {
    let Some(obj) = patch.as_object() else {
        return Err(Error::Other("segment patch must be a JSON object".into()));
    };
    if obj.contains_key("type") {
        return Err(Error::Other(
            "segment type cannot be changed; delete and re-add instead".into(),
        ));
    }

    let seg_index = itinerary
        .segments
        .iter()
        .position(|s| s.id == segment_id)
        .ok_or_else(|| Error::not_found("segment", segment_id))?;

    let mut raw = serde_json::to_value(&itinerary.segments[seg_index])?;
    let Some(map) = raw.as_object_mut() else {
        return Err(Error::Other("segment did not serialize to an object".into()));
    };
    let mut updated = Vec::new();
    for (key, value) in obj {
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(key.clone(), value.clone());
        }
        updated.push(key.clone());
    }

    let patched: Segment = serde_json::from_value(raw)
        .map_err(|e| Error::Other(format!("invalid segment patch: {e}")))?;
    if patched.end_datetime < patched.start_datetime {
        return Err(Error::Other(format!(
            "segment {segment_id} would end before it starts"
        )));
    }

    itinerary.segments[seg_index] = patched;
    Ok(updated)
}

pub fn delete_segment(itinerary: &mut Itinerary, segment_id: &str) -> Result<()> {
    let before = itinerary.segments.len();
    itinerary.segments.retain(|s| s.id != segment_id);
    if itinerary.segments.len() == before {
        return Err(Error::not_found("segment", segment_id));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Move (with cascade)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shift a segment so it starts at `new_start`, preserving duration.
/// With `cascade` (the default at the tool layer), every later segment
/// for the same traveler shifts by the same delta. Returns the ids of
/// all segments that moved.
pub fn move_segment(
    itinerary: &mut Itinerary,
    segment_id: &str,
    new_start: DateTime<Utc>,
    cascade: bool,
) -> Result<Vec<String>> {
    let (old_start, traveler_ids) = {
        let seg = itinerary
            .segment(segment_id)
            .ok_or_else(|| Error::not_found("segment", segment_id))?;
        (seg.start_datetime, seg.traveler_ids.clone())
    };
    let delta = new_start - old_start;
    if delta.is_zero() {
        return Ok(Vec::new());
    }

    let mut moved = Vec::new();
    for seg in itinerary.segments.iter_mut() {
        let applies = if seg.id == segment_id {
            true
        } else {
            cascade && seg.start_datetime > old_start && shares_travelers(&traveler_ids, &seg.traveler_ids)
        };
        if applies {
            shift_segment(seg, delta);
            moved.push(seg.id.clone());
        }
    }
    Ok(moved)
}

/// Whether two traveler-id sets intersect. Empty means "the whole
/// party", which intersects everything.
fn shares_travelers(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter().any(|id| b.contains(id))
}

/// Shift every datetime a segment carries, including the kind-specific
/// ones (hotel check-in/out move with the stay).
fn shift_segment(seg: &mut Segment, delta: Duration) {
    seg.start_datetime += delta;
    seg.end_datetime += delta;
    match &mut seg.details {
        SegmentDetails::Hotel {
            check_in,
            check_out,
            ..
        } => {
            *check_in += delta;
            *check_out += delta;
        }
        SegmentDetails::Flight { .. }
        | SegmentDetails::Activity { .. }
        | SegmentDetails::Transfer { .. }
        | SegmentDetails::Meeting { .. }
        | SegmentDetails::Meal { .. }
        | SegmentDetails::Restaurant { .. }
        | SegmentDetails::Other { .. } => {}
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reorder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reorder segments to the given id sequence. The sequence must cover
/// exactly the existing segments and be chronologically coherent
/// (start datetimes non-decreasing in the proposed order).
pub fn reorder_segments(itinerary: &mut Itinerary, ordered_ids: &[String]) -> Result<()> {
    if ordered_ids.len() != itinerary.segments.len() {
        return Err(Error::Other(format!(
            "reorder must list all {} segments, got {}",
            itinerary.segments.len(),
            ordered_ids.len()
        )));
    }

    let mut reordered = Vec::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        let seg = itinerary
            .segment(id)
            .ok_or_else(|| Error::not_found("segment", id))?
            .clone();
        reordered.push(seg);
    }

    for pair in reordered.windows(2) {
        if pair[1].start_datetime < pair[0].start_datetime {
            return Err(Error::Other(format!(
                "reorder is not chronological: {} starts before {}",
                pair[1].id, pair[0].id
            )));
        }
    }

    itinerary.segments = reordered;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Overlap warnings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Same-traveler overlapping segments, as human-readable warnings.
/// Cancelled segments are ignored.
pub fn overlap_warnings(itinerary: &Itinerary) -> Vec<String> {
    let active: Vec<&Segment> = itinerary
        .sorted_segments()
        .into_iter()
        .filter(|s| s.status != SegmentStatus::Cancelled)
        .collect();

    let mut warnings = Vec::new();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            if b.start_datetime >= a.end_datetime {
                break;
            }
            if shares_travelers(&a.traveler_ids, &b.traveler_ids) {
                warnings.push(format!(
                    "segments {} and {} overlap for the same traveler",
                    a.id, b.id
                ));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, SegmentStatus};
    use chrono::TimeZone;

    fn dt(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, h, 0, 0).unwrap()
    }

    fn activity(id: &str, start: DateTime<Utc>, hours: i64, travelers: &[&str]) -> Segment {
        Segment {
            id: id.into(),
            details: SegmentDetails::Activity {
                name: format!("activity {id}"),
                location: None,
            },
            status: SegmentStatus::Tentative,
            start_datetime: start,
            end_datetime: start + Duration::hours(hours),
            traveler_ids: travelers.iter().map(|s| s.to_string()).collect(),
            notes: None,
            inferred: false,
            inferred_reason: None,
        }
    }

    fn hotel(id: &str, start: DateTime<Utc>, nights: i64) -> Segment {
        Segment {
            id: id.into(),
            details: SegmentDetails::Hotel {
                property: "Hotel X".into(),
                location: Location::named("Paris"),
                check_in: start,
                check_out: start + Duration::days(nights),
            },
            status: SegmentStatus::Confirmed,
            start_datetime: start,
            end_datetime: start + Duration::days(nights),
            traveler_ids: vec![],
            notes: None,
            inferred: false,
            inferred_reason: None,
        }
    }

    #[test]
    fn move_without_cascade_shifts_only_target() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &["t1"]));
        it.segments.push(activity("a2", dt(10, 10), 2, &["t1"]));

        let moved = move_segment(&mut it, "a1", dt(9, 14), false).unwrap();
        assert_eq!(moved, vec!["a1"]);
        assert_eq!(it.segment("a1").unwrap().start_datetime, dt(9, 14));
        assert_eq!(it.segment("a2").unwrap().start_datetime, dt(10, 10));
    }

    #[test]
    fn move_cascade_shifts_later_same_traveler_segments() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &["t1"]));
        it.segments.push(activity("a2", dt(10, 10), 2, &["t1"]));
        it.segments.push(activity("other", dt(10, 12), 2, &["t2"]));
        it.segments.push(activity("earlier", dt(8, 10), 2, &["t1"]));

        let moved = move_segment(&mut it, "a1", dt(10, 10), true).unwrap();
        assert!(moved.contains(&"a1".to_string()));
        assert!(moved.contains(&"a2".to_string()));
        assert!(!moved.contains(&"other".to_string()));
        assert!(!moved.contains(&"earlier".to_string()));
        // a2 shifted by the same +1 day delta.
        assert_eq!(it.segment("a2").unwrap().start_datetime, dt(11, 10));
    }

    #[test]
    fn move_cascade_shifts_hotel_checkin() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(8, 8), 1, &[]));
        it.segments.push(hotel("h1", dt(8, 15), 7));

        move_segment(&mut it, "a1", dt(9, 8), true).unwrap();
        match &it.segment("h1").unwrap().details {
            SegmentDetails::Hotel { check_in, .. } => assert_eq!(*check_in, dt(9, 15)),
            other => panic!("expected hotel, got {other:?}"),
        }
    }

    #[test]
    fn zero_delta_move_is_a_noop() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &["t1"]));
        let moved = move_segment(&mut it, "a1", dt(9, 10), true).unwrap();
        assert!(moved.is_empty());
    }

    #[test]
    fn update_segment_patches_and_validates() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &[]));

        let updated = update_segment(
            &mut it,
            "a1",
            &serde_json::json!({ "notes": "bring sunscreen", "status": "CONFIRMED" }),
        )
        .unwrap();
        assert_eq!(updated.len(), 2);
        let seg = it.segment("a1").unwrap();
        assert_eq!(seg.notes.as_deref(), Some("bring sunscreen"));
        assert_eq!(seg.status, SegmentStatus::Confirmed);
    }

    #[test]
    fn update_segment_rejects_inverted_times() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &[]));
        let err = update_segment(
            &mut it,
            "a1",
            &serde_json::json!({ "endDatetime": "2026-01-01T00:00:00Z" }),
        );
        assert!(err.is_err());
    }

    #[test]
    fn update_segment_rejects_type_change() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &[]));
        assert!(update_segment(&mut it, "a1", &serde_json::json!({ "type": "HOTEL" })).is_err());
    }

    #[test]
    fn reorder_rejects_non_chronological() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a1", dt(9, 10), 2, &[]));
        it.segments.push(activity("a2", dt(10, 10), 2, &[]));
        let err = reorder_segments(&mut it, &["a2".into(), "a1".into()]);
        assert!(err.is_err());
    }

    #[test]
    fn reorder_accepts_chronological_order() {
        let mut it = Itinerary::new();
        it.segments.push(activity("a2", dt(10, 10), 2, &[]));
        it.segments.push(activity("a1", dt(9, 10), 2, &[]));
        reorder_segments(&mut it, &["a1".into(), "a2".into()]).unwrap();
        assert_eq!(it.segments[0].id, "a1");
    }

    #[test]
    fn overlap_warns_but_never_rejects() {
        let mut it = Itinerary::new();
        add_segment(&mut it, activity("a1", dt(9, 10), 4, &["t1"])).unwrap();
        let warnings = add_segment(&mut it, activity("a2", dt(9, 12), 2, &["t1"])).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("a1"));
        assert_eq!(it.segments.len(), 2);
    }

    #[test]
    fn disjoint_travelers_do_not_warn() {
        let mut it = Itinerary::new();
        add_segment(&mut it, activity("a1", dt(9, 10), 4, &["t1"])).unwrap();
        let warnings = add_segment(&mut it, activity("a2", dt(9, 12), 2, &["t2"])).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn cancelled_segments_do_not_warn() {
        let mut it = Itinerary::new();
        let mut cancelled = activity("a1", dt(9, 10), 4, &["t1"]);
        cancelled.status = SegmentStatus::Cancelled;
        add_segment(&mut it, cancelled).unwrap();
        let warnings = add_segment(&mut it, activity("a2", dt(9, 12), 2, &["t1"])).unwrap();
        assert!(warnings.is_empty());
    }
}
