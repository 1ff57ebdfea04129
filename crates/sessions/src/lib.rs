//! Session persistence: one conversational context per itinerary
//! binding, with transcript messages, token/cost counters, and an idle
//! sweep.

pub mod store;
pub mod transcript;

pub use store::{Session, SessionMetadata, SessionStore, TripProfile};
pub use transcript::validate_transcript;
