//! Shared domain types for the waypoint trip-designer engine.
//!
//! Everything that crosses a crate boundary lives here: the error type,
//! the chat message / tool-call shapes, provider stream events, and the
//! configuration tree.

pub mod chat;
pub mod config;
pub mod error;
pub mod stream;

pub use error::{Error, ErrorKind, Result};
