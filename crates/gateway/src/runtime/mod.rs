//! Core runtime — ties sessions, prompt building, LLM streaming, tool
//! dispatch, and persistence into one deterministic loop.
//!
//! Entry point: [`run_turn`] takes a session + user message and returns
//! a stream of [`TurnEvent`]s suitable for SSE.

pub mod compact;
pub mod estimate;
pub mod session_lock;
pub mod turn;

pub use turn::{run_turn, TurnEvent, TurnInput};
