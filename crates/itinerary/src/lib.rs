//! Itinerary aggregate: model, persistent store with optimistic
//! versioning, segment mutation service, summarizer projections, and the
//! title/destination mismatch detector.

pub mod mismatch;
pub mod model;
pub mod segments;
pub mod store;
pub mod summary;

pub use model::{
    Budget, Itinerary, Location, Segment, SegmentDetails, SegmentKind, SegmentStatus, Traveler,
    TripPreferences,
};
pub use store::ItineraryStore;
