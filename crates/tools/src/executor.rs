//! Tool executor — runs one tool call against the itinerary and
//! knowledge collaborators.
//!
//! The executor is per-turn: it loads the session's itinerary once and
//! serves every query from that snapshot, refreshing it after each
//! successful write. It never panics and never returns an `Err`; every
//! failure becomes a failed [`ToolOutcome`] the LLM can read and
//! recover from in the next round.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use wp_domain::chat::ToolCall;
use wp_domain::{Error, Result};
use wp_itinerary::model::{Budget, Location, Segment, SegmentDetails, SegmentStatus};
use wp_itinerary::{segments, summary, Itinerary, ItineraryStore, TripPreferences};
use wp_knowledge::{
    classify_temporal, KnowledgeEntry, KnowledgeRetriever, RetrievalContext, RELEVANCE_FLOOR,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The result of one tool call. `error` is always a human-readable
/// string, never a wrapped exception.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub itinerary_changed: bool,
    pub segments_modified: Vec<String>,
}

impl ToolOutcome {
    fn ok(tool_call_id: &str, result: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            success: true,
            result: Some(result),
            error: None,
            itinerary_changed: false,
            segments_modified: Vec::new(),
        }
    }

    fn mutation(tool_call_id: &str, result: Value, segments_modified: Vec<String>) -> Self {
        Self {
            itinerary_changed: true,
            segments_modified,
            ..Self::ok(tool_call_id, result)
        }
    }

    fn fail(tool_call_id: &str, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            success: false,
            result: None,
            error: Some(message.into()),
            itinerary_changed: false,
            segments_modified: Vec::new(),
        }
    }

    /// The string fed back to the LLM as the tool message content.
    pub fn payload(&self) -> String {
        match (&self.result, &self.error) {
            (Some(result), _) => result.to_string(),
            (None, Some(error)) => json!({ "success": false, "error": error }).to_string(),
            (None, None) => json!({ "success": self.success }).to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A location argument: either a bare name or a full object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocationInput {
    Full(Location),
    Name(String),
}

impl From<LocationInput> for Location {
    fn from(input: LocationInput) -> Self {
        match input {
            LocationInput::Full(loc) => loc,
            LocationInput::Name(name) => Location::named(name),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlightInput {
    airline: String,
    flight_number: String,
    origin: LocationInput,
    destination: LocationInput,
    start_datetime: DateTime<Utc>,
    end_datetime: DateTime<Utc>,
    #[serde(default)]
    traveler_ids: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotelInput {
    property: String,
    location: LocationInput,
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    #[serde(default)]
    traveler_ids: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedSegmentInput {
    name: String,
    #[serde(default)]
    location: Option<LocationInput>,
    start_datetime: DateTime<Utc>,
    end_datetime: DateTime<Utc>,
    #[serde(default)]
    traveler_ids: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferInput {
    transfer_type: String,
    pickup_location: LocationInput,
    dropoff_location: LocationInput,
    start_datetime: DateTime<Utc>,
    end_datetime: DateTime<Utc>,
    #[serde(default)]
    traveler_ids: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateItineraryInput {
    title: Option<String>,
    description: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    destinations: Option<Vec<LocationInput>>,
    budget_total: Option<f64>,
    budget_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentIdInput {
    segment_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveSegmentInput {
    segment_id: String,
    new_start_datetime: DateTime<Utc>,
    #[serde(default = "d_true")]
    cascade: bool,
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderInput {
    segment_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInput {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    pickup: Option<String>,
    #[serde(default)]
    dropoff: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    check_in: Option<String>,
    #[serde(default)]
    check_out: Option<String>,
}

impl SearchInput {
    /// Collapse the structured fields into one retrieval query.
    fn query_text(&self, kind: &str) -> String {
        if let Some(q) = &self.query {
            return q.clone();
        }
        let mut parts = vec![kind.to_string()];
        for field in [
            &self.origin,
            &self.destination,
            &self.pickup,
            &self.dropoff,
            &self.date,
            &self.check_in,
            &self.check_out,
        ]
        .into_iter()
        .flatten()
        {
            parts.push(field.clone());
        }
        parts.join(" ")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreIntelligenceInput {
    content: String,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    dates: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveIntelligenceInput {
    query: String,
    #[serde(default)]
    destination: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolExecutor {
    itineraries: Arc<ItineraryStore>,
    knowledge: Arc<dyn KnowledgeRetriever>,
    itinerary_id: String,
    /// Per-turn cache: loaded once, refreshed after successful writes.
    snapshot: Mutex<Option<Itinerary>>,
}

impl ToolExecutor {
    pub fn new(
        itineraries: Arc<ItineraryStore>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        itinerary_id: impl Into<String>,
    ) -> Self {
        Self {
            itineraries,
            knowledge,
            itinerary_id: itinerary_id.into(),
            snapshot: Mutex::new(None),
        }
    }

    /// The itinerary as this turn sees it.
    pub fn current_itinerary(&self) -> Result<Itinerary> {
        let mut cache = self.snapshot.lock();
        if let Some(it) = cache.as_ref() {
            return Ok(it.clone());
        }
        let it = self
            .itineraries
            .get(&self.itinerary_id)
            .ok_or_else(|| Error::not_found("itinerary", &self.itinerary_id))?;
        *cache = Some(it.clone());
        Ok(it)
    }

    /// Execute one call. Never throws: parse and execution failures
    /// come back as failed outcomes.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        if call.arguments.trim().is_empty() {
            return ToolOutcome::fail(
                &call.id,
                format!("invalid_arguments: {} called with empty arguments", call.name),
            );
        }
        let args: Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                return ToolOutcome::fail(&call.id, format!("invalid_arguments: {e}"));
            }
        };

        match self.dispatch(&call.name, &args, &call.id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolOutcome::fail(&call.id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &Value, call_id: &str) -> Result<ToolOutcome> {
        match name {
            // ── Queries ───────────────────────────────────────────
            "get_itinerary" => {
                let it = self.current_itinerary()?;
                Ok(ToolOutcome::ok(call_id, summary::summarize_itinerary_for_tool(&it)))
            }
            "get_segment" => {
                let input: SegmentIdInput = parse_args(args)?;
                let it = self.current_itinerary()?;
                let seg = it
                    .segment(&input.segment_id)
                    .ok_or_else(|| Error::not_found("segment", &input.segment_id))?;
                Ok(ToolOutcome::ok(call_id, segment_projection(seg)))
            }

            // ── Itinerary metadata ────────────────────────────────
            "update_itinerary" => self.update_itinerary(args, call_id),
            "update_preferences" => self.update_preferences(args, call_id),

            // ── Segment creation ──────────────────────────────────
            "add_flight" => {
                let input: FlightInput = parse_args(args)?;
                let seg = Segment {
                    id: new_segment_id(),
                    details: SegmentDetails::Flight {
                        airline: input.airline,
                        flight_number: input.flight_number,
                        origin: input.origin.into(),
                        destination: input.destination.into(),
                    },
                    status: SegmentStatus::Tentative,
                    start_datetime: input.start_datetime,
                    end_datetime: input.end_datetime,
                    traveler_ids: input.traveler_ids,
                    notes: input.notes,
                    inferred: false,
                    inferred_reason: None,
                };
                self.add_segment(seg, call_id)
            }
            "add_hotel" => {
                let input: HotelInput = parse_args(args)?;
                let seg = Segment {
                    id: new_segment_id(),
                    details: SegmentDetails::Hotel {
                        property: input.property,
                        location: input.location.into(),
                        check_in: input.check_in,
                        check_out: input.check_out,
                    },
                    status: SegmentStatus::Tentative,
                    start_datetime: input.check_in,
                    end_datetime: input.check_out,
                    traveler_ids: input.traveler_ids,
                    notes: input.notes,
                    inferred: false,
                    inferred_reason: None,
                };
                self.add_segment(seg, call_id)
            }
            "add_activity" => {
                let input: NamedSegmentInput = parse_args(args)?;
                let seg = named_segment(input, |name, location| SegmentDetails::Activity {
                    name,
                    location,
                });
                self.add_segment(seg, call_id)
            }
            "add_meeting" => {
                let input: NamedSegmentInput = parse_args(args)?;
                let seg = named_segment(input, |name, location| SegmentDetails::Meeting {
                    name,
                    location,
                });
                self.add_segment(seg, call_id)
            }
            "add_transfer" => {
                let input: TransferInput = parse_args(args)?;
                let seg = Segment {
                    id: new_segment_id(),
                    details: SegmentDetails::Transfer {
                        transfer_type: input.transfer_type,
                        pickup_location: input.pickup_location.into(),
                        dropoff_location: input.dropoff_location.into(),
                    },
                    status: SegmentStatus::Tentative,
                    start_datetime: input.start_datetime,
                    end_datetime: input.end_datetime,
                    traveler_ids: input.traveler_ids,
                    notes: input.notes,
                    inferred: false,
                    inferred_reason: None,
                };
                self.add_segment(seg, call_id)
            }

            // ── Segment mutation ──────────────────────────────────
            "update_segment" => {
                let input: SegmentIdInput = parse_args(args)?;
                let mut patch = args.clone();
                if let Some(obj) = patch.as_object_mut() {
                    obj.remove("segmentId");
                }
                let segment_id = input.segment_id.clone();
                let (it, updated) = self.commit(|it| {
                    segments::update_segment(it, &segment_id, &patch)
                })?;
                Ok(ToolOutcome::mutation(
                    call_id,
                    mutation_result(&updated, &[input.segment_id.clone()], &it),
                    vec![input.segment_id],
                ))
            }
            "delete_segment" => {
                let input: SegmentIdInput = parse_args(args)?;
                let segment_id = input.segment_id.clone();
                let (it, ()) = self.commit(|it| segments::delete_segment(it, &segment_id))?;
                Ok(ToolOutcome::mutation(
                    call_id,
                    mutation_result(&["segments".into()], &[input.segment_id.clone()], &it),
                    vec![input.segment_id],
                ))
            }
            "move_segment" => {
                let input: MoveSegmentInput = parse_args(args)?;
                let segment_id = input.segment_id.clone();
                let (it, moved) = self.commit(|it| {
                    segments::move_segment(it, &segment_id, input.new_start_datetime, input.cascade)
                })?;
                Ok(ToolOutcome::mutation(
                    call_id,
                    mutation_result(&["segments".into()], &moved, &it),
                    moved,
                ))
            }
            "reorder_segments" => {
                let input: ReorderInput = parse_args(args)?;
                let ids = input.segment_ids.clone();
                let (it, ()) = self.commit(|it| segments::reorder_segments(it, &ids))?;
                Ok(ToolOutcome::mutation(
                    call_id,
                    mutation_result(&["segments".into()], &input.segment_ids, &it),
                    input.segment_ids,
                ))
            }

            // ── Search (KB-first) ─────────────────────────────────
            "search_web" => {
                let input: SearchInput = parse_args(args)?;
                Ok(ToolOutcome::ok(call_id, self.kb_first(&input.query_text("travel")).await))
            }
            "search_flights" => {
                let input: SearchInput = parse_args(args)?;
                Ok(ToolOutcome::ok(call_id, self.kb_first(&input.query_text("flights")).await))
            }
            "search_hotels" => {
                let input: SearchInput = parse_args(args)?;
                Ok(ToolOutcome::ok(call_id, self.kb_first(&input.query_text("hotels")).await))
            }
            "search_transfers" => {
                let input: SearchInput = parse_args(args)?;
                Ok(ToolOutcome::ok(call_id, self.kb_first(&input.query_text("transfers")).await))
            }

            // ── Travel intelligence ───────────────────────────────
            "store_travel_intelligence" => {
                let input: StoreIntelligenceInput = parse_args(args)?;
                let entry = KnowledgeEntry {
                    content: input.content,
                    destination: input.destination,
                    temporal_type: classify_temporal(input.dates.as_deref()),
                    dates: input.dates,
                };
                let stored = self.knowledge.store(entry).await;
                Ok(ToolOutcome::ok(call_id, json!({ "stored": stored })))
            }
            "retrieve_travel_intelligence" => {
                let input: RetrieveIntelligenceInput = parse_args(args)?;
                let mut ctx = self.retrieval_context();
                if let Some(dest) = input.destination {
                    ctx.destinations = vec![dest];
                }
                let hits = self.knowledge.search(&input.query, &ctx).await;
                Ok(ToolOutcome::ok(call_id, json!({ "results": hits })))
            }

            other => Err(Error::Other(format!("unknown tool: {other}"))),
        }
    }

    // ── Metadata handlers ──────────────────────────────────────────

    fn update_itinerary(&self, args: &Value, call_id: &str) -> Result<ToolOutcome> {
        let input: UpdateItineraryInput = parse_args(args)?;
        let mut updated_fields = Vec::new();

        let (it, ()) = self.commit(|it| {
            let mut touched = Vec::new();
            if let Some(title) = &input.title {
                it.title = title.clone();
                touched.push("title".to_string());
            }
            if let Some(description) = &input.description {
                it.description = Some(description.clone());
                touched.push("description".to_string());
            }
            if let Some(start) = input.start_date {
                it.start_date = Some(start);
                touched.push("startDate".to_string());
            }
            if let Some(end) = input.end_date {
                it.end_date = Some(end);
                touched.push("endDate".to_string());
            }
            if let (Some(start), Some(end)) = (it.start_date, it.end_date) {
                if end < start {
                    return Err(Error::Other(format!(
                        "endDate {end} is before startDate {start}"
                    )));
                }
            }
            if let Some(destinations) = &input.destinations {
                it.destinations = destinations
                    .iter()
                    .map(|d| match d {
                        LocationInput::Full(loc) => loc.clone(),
                        LocationInput::Name(name) => Location::named(name.clone()),
                    })
                    .collect();
                touched.push("destinations".to_string());
            }
            if let Some(total) = input.budget_total {
                let currency = input
                    .budget_currency
                    .clone()
                    .or_else(|| it.budget.as_ref().map(|b| b.currency.clone()))
                    .unwrap_or_else(|| "USD".into());
                it.budget = Some(Budget { total, currency });
                touched.push("budget".to_string());
            }
            if touched.is_empty() {
                return Err(Error::Other(
                    "update_itinerary called with nothing to update".into(),
                ));
            }
            updated_fields = touched;
            Ok(())
        })?;

        // A metadata-only edit still counts as an itinerary change.
        Ok(ToolOutcome::mutation(
            call_id,
            mutation_result(&updated_fields, &[], &it),
            Vec::new(),
        ))
    }

    fn update_preferences(&self, args: &Value, call_id: &str) -> Result<ToolOutcome> {
        let patch = args.clone();
        let mut updated_fields = Vec::new();
        let (it, ()) = self.commit(|it| {
            let prefs = it
                .trip_preferences
                .get_or_insert_with(TripPreferences::default);
            let touched = prefs.apply_patch(&patch);
            if touched.is_empty() {
                return Err(Error::Other(
                    "update_preferences called with no recognized fields".into(),
                ));
            }
            updated_fields = touched;
            Ok(())
        })?;
        Ok(ToolOutcome::mutation(
            call_id,
            mutation_result(&updated_fields, &[], &it),
            Vec::new(),
        ))
    }

    fn add_segment(&self, segment: Segment, call_id: &str) -> Result<ToolOutcome> {
        let id = segment.id.clone();
        let (it, warnings) = self.commit(|it| segments::add_segment(it, segment.clone()))?;
        let mut result = mutation_result(&["segments".into()], &[id.clone()], &it);
        if !warnings.is_empty() {
            result["warnings"] = json!(warnings);
        }
        result["segmentId"] = json!(id);
        Ok(ToolOutcome::mutation(call_id, result, vec![id]))
    }

    // ── Commit with one optimistic retry ───────────────────────────

    /// Apply a mutation to a copy of the snapshot and commit it through
    /// the store. A version conflict (another writer got there first)
    /// reloads and retries exactly once; the retry failing surfaces as
    /// a failed tool result.
    fn commit<T, F>(&self, mut f: F) -> Result<(Itinerary, T)>
    where
        F: FnMut(&mut Itinerary) -> Result<T>,
    {
        let mut working = self.current_itinerary()?;
        let out = f(&mut working)?;

        match self.itineraries.update(working) {
            Ok(committed) => {
                *self.snapshot.lock() = Some(committed.clone());
                Ok((committed, out))
            }
            Err(Error::VersionConflict { .. }) => {
                let mut fresh = self
                    .itineraries
                    .get(&self.itinerary_id)
                    .ok_or_else(|| Error::not_found("itinerary", &self.itinerary_id))?;
                let out = f(&mut fresh)?;
                let committed = self.itineraries.update(fresh)?;
                *self.snapshot.lock() = Some(committed.clone());
                Ok((committed, out))
            }
            Err(e) => Err(e),
        }
    }

    // ── Knowledge helpers ──────────────────────────────────────────

    fn retrieval_context(&self) -> RetrievalContext {
        match self.current_itinerary() {
            Ok(it) => RetrievalContext {
                destinations: it
                    .effective_destinations()
                    .iter()
                    .map(|d| d.display_name().to_string())
                    .collect(),
                start_date: it.start_date,
                end_date: it.end_date,
            },
            Err(_) => RetrievalContext::default(),
        }
    }

    /// KB-first search: a confident hit short-circuits, anything else
    /// tells the caller's LLM layer to do its own retrieval.
    async fn kb_first(&self, query: &str) -> Value {
        let ctx = self.retrieval_context();
        let hits = self.knowledge.search(query, &ctx).await;
        let confident = hits
            .first()
            .map(|h| h.relevance >= RELEVANCE_FLOOR)
            .unwrap_or(false);
        if confident {
            json!({ "source": "knowledge_base", "results": hits })
        } else {
            json!({ "source": "web_search_needed" })
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| Error::Other(format!("invalid_arguments: {e}")))
}

fn new_segment_id() -> String {
    format!("seg-{}", uuid::Uuid::new_v4())
}

fn named_segment<F>(input: NamedSegmentInput, details: F) -> Segment
where
    F: FnOnce(String, Option<Location>) -> SegmentDetails,
{
    Segment {
        id: new_segment_id(),
        details: details(input.name, input.location.map(Into::into)),
        status: SegmentStatus::Tentative,
        start_datetime: input.start_datetime,
        end_datetime: input.end_datetime,
        traveler_ids: input.traveler_ids,
        notes: input.notes,
        inferred: false,
        inferred_reason: None,
    }
}

fn mutation_result(updated: &[String], segments_modified: &[String], it: &Itinerary) -> Value {
    json!({
        "success": true,
        "updated": updated,
        "itineraryChanged": true,
        "segmentsModified": segments_modified,
        "version": it.version,
    })
}

fn segment_projection(seg: &Segment) -> Value {
    json!({
        "id": seg.id,
        "type": seg.kind().as_str(),
        "status": seg.status,
        "startDatetime": seg.start_datetime,
        "endDatetime": seg.end_datetime,
        "name": seg.display_name(),
        "notes": seg.notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_knowledge::{KnowledgeHit, NoopKnowledge};

    struct FixedKnowledge {
        relevance: f64,
    }

    #[async_trait::async_trait]
    impl KnowledgeRetriever for FixedKnowledge {
        async fn search(&self, query: &str, _ctx: &RetrievalContext) -> Vec<KnowledgeHit> {
            vec![KnowledgeHit {
                content: format!("stored answer for {query}"),
                relevance: self.relevance,
                metadata: Value::Null,
            }]
        }

        async fn store(&self, _entry: KnowledgeEntry) -> bool {
            true
        }
    }

    fn setup(kb: Arc<dyn KnowledgeRetriever>) -> (tempfile::TempDir, Arc<ItineraryStore>, ToolExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ItineraryStore::new(dir.path()).unwrap());
        let it = store.create(Itinerary::new()).unwrap();
        let executor = ToolExecutor::new(store.clone(), kb, it.id);
        (dir, store, executor)
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: format!("call-{name}"),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[tokio::test]
    async fn empty_arguments_fail_soft() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor.execute(&call("get_itinerary", "   ")).await;
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("invalid_arguments"));
        assert!(error.contains("get_itinerary"));
    }

    #[tokio::test]
    async fn malformed_json_fails_soft() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor.execute(&call("get_itinerary", "{not json")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid_arguments"));
    }

    #[tokio::test]
    async fn unknown_tool_fails_soft() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor.execute(&call("fly_to_the_moon", "{}")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn get_itinerary_returns_projection_not_raw() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor.execute(&call("get_itinerary", "{}")).await;
        assert!(outcome.success);
        let result = outcome.result.unwrap();
        assert_eq!(result["title"], "New Itinerary");
        // Projection, not the aggregate: no version/owner fields.
        assert!(result.get("version").is_none());
    }

    #[tokio::test]
    async fn metadata_only_update_flags_itinerary_changed() {
        let (_dir, store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor
            .execute(&call(
                "update_itinerary",
                r#"{"destinations":["Barcelona"],"title":"Barcelona Trip"}"#,
            ))
            .await;
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert!(outcome.itinerary_changed);
        assert!(outcome.segments_modified.is_empty());

        let it = store.list().pop().unwrap();
        assert_eq!(it.title, "Barcelona Trip");
        assert_eq!(it.destinations[0].name, "Barcelona");
    }

    #[tokio::test]
    async fn update_preferences_merges() {
        let (_dir, store, executor) = setup(Arc::new(NoopKnowledge));
        let first = executor
            .execute(&call("update_preferences", r#"{"travelStyle":"luxury"}"#))
            .await;
        assert!(first.success);
        let second = executor
            .execute(&call("update_preferences", r#"{"pace":"leisurely"}"#))
            .await;
        assert!(second.success);

        let prefs = store.list().pop().unwrap().trip_preferences.unwrap();
        assert_eq!(prefs.travel_style.as_deref(), Some("luxury"));
        assert_eq!(prefs.pace.as_deref(), Some("leisurely"));
    }

    #[tokio::test]
    async fn add_flight_then_get_segment() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor
            .execute(&call(
                "add_flight",
                r#"{
                    "airline": "Delta",
                    "flightNumber": "DL123",
                    "origin": {"name": "John F. Kennedy Intl", "code": "JFK"},
                    "destination": "St. Maarten",
                    "startDatetime": "2026-01-08T09:00:00Z",
                    "endDatetime": "2026-01-08T13:00:00Z"
                }"#,
            ))
            .await;
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.segments_modified.len(), 1);
        let seg_id = outcome.segments_modified[0].clone();

        let seg = executor
            .execute(&call(
                "get_segment",
                &format!(r#"{{"segmentId":"{seg_id}"}}"#),
            ))
            .await;
        assert!(seg.success);
        assert_eq!(seg.result.unwrap()["type"], "FLIGHT");
    }

    #[tokio::test]
    async fn move_segment_cascades_by_default() {
        let (_dir, store, executor) = setup(Arc::new(NoopKnowledge));
        let a1 = executor
            .execute(&call(
                "add_activity",
                r#"{"name":"Snorkeling","startDatetime":"2026-01-09T10:00:00Z","endDatetime":"2026-01-09T12:00:00Z"}"#,
            ))
            .await;
        let a2 = executor
            .execute(&call(
                "add_activity",
                r#"{"name":"Dinner","startDatetime":"2026-01-10T19:00:00Z","endDatetime":"2026-01-10T21:00:00Z"}"#,
            ))
            .await;
        let first_id = a1.segments_modified[0].clone();
        let second_id = a2.segments_modified[0].clone();

        let moved = executor
            .execute(&call(
                "move_segment",
                &format!(
                    r#"{{"segmentId":"{first_id}","newStartDatetime":"2026-01-10T10:00:00Z"}}"#
                ),
            ))
            .await;
        assert!(moved.success, "error: {:?}", moved.error);
        assert!(moved.segments_modified.contains(&first_id));
        assert!(moved.segments_modified.contains(&second_id));

        let it = store.list().pop().unwrap();
        let dinner = it.segment(&second_id).unwrap();
        assert_eq!(
            dinner.start_datetime.to_rfc3339(),
            "2026-01-11T19:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn search_signals_web_search_when_kb_is_cold() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        let outcome = executor
            .execute(&call("search_web", r#"{"query":"best beaches in SXM"}"#))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap()["source"], "web_search_needed");
        assert!(!outcome.itinerary_changed);
    }

    #[tokio::test]
    async fn search_short_circuits_on_confident_kb_hit() {
        let (_dir, _store, executor) = setup(Arc::new(FixedKnowledge { relevance: 0.9 }));
        let outcome = executor
            .execute(&call("search_hotels", r#"{"destination":"St. Maarten"}"#))
            .await;
        let result = outcome.result.unwrap();
        assert_eq!(result["source"], "knowledge_base");
        assert_eq!(result["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_falls_back_below_relevance_floor() {
        let (_dir, _store, executor) = setup(Arc::new(FixedKnowledge { relevance: 0.5 }));
        let outcome = executor
            .execute(&call("search_flights", r#"{"origin":"JFK","destination":"SXM"}"#))
            .await;
        assert_eq!(outcome.result.unwrap()["source"], "web_search_needed");
    }

    #[tokio::test]
    async fn store_intelligence_classifies_temporal_type() {
        let (_dir, _store, executor) = setup(Arc::new(FixedKnowledge { relevance: 0.9 }));
        let outcome = executor
            .execute(&call(
                "store_travel_intelligence",
                r#"{"content":"Carnival closes roads","destination":"St. Maarten","dates":"annual, late April"}"#,
            ))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap()["stored"], true);
    }

    #[tokio::test]
    async fn stale_snapshot_retries_once_and_succeeds() {
        let (_dir, store, executor) = setup(Arc::new(NoopKnowledge));
        // Prime the per-turn cache.
        executor.execute(&call("get_itinerary", "{}")).await;

        // An out-of-band writer bumps the version behind the cache.
        let mut fresh = store.list().pop().unwrap();
        fresh.description = Some("edited elsewhere".into());
        store.update(fresh).unwrap();

        let outcome = executor
            .execute(&call("update_itinerary", r#"{"title":"Still Works"}"#))
            .await;
        assert!(outcome.success, "error: {:?}", outcome.error);

        let it = store.list().pop().unwrap();
        assert_eq!(it.title, "Still Works");
        // The retry preserved the concurrent edit.
        assert_eq!(it.description.as_deref(), Some("edited elsewhere"));
    }

    #[tokio::test]
    async fn missing_itinerary_fails_soft() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ItineraryStore::new(dir.path()).unwrap());
        let executor = ToolExecutor::new(store, Arc::new(NoopKnowledge), "ghost");
        let outcome = executor.execute(&call("get_itinerary", "{}")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn overlap_warning_surfaces_in_result() {
        let (_dir, _store, executor) = setup(Arc::new(NoopKnowledge));
        executor
            .execute(&call(
                "add_activity",
                r#"{"name":"Tour","startDatetime":"2026-01-09T10:00:00Z","endDatetime":"2026-01-09T14:00:00Z"}"#,
            ))
            .await;
        let second = executor
            .execute(&call(
                "add_activity",
                r#"{"name":"Lunch","startDatetime":"2026-01-09T12:00:00Z","endDatetime":"2026-01-09T13:00:00Z"}"#,
            ))
            .await;
        assert!(second.success);
        let result = second.result.unwrap();
        assert!(result["warnings"].as_array().is_some_and(|w| !w.is_empty()));
    }
}
