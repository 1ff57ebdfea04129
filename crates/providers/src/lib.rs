//! LLM provider adapters.
//!
//! The agent loop speaks [`LlmProvider`]; the only shipped adapter is
//! [`OpenAiCompatProvider`], which covers OpenAI, Azure-style gateways,
//! Ollama, vLLM, and any other endpoint following the OpenAI chat
//! completions contract.

pub mod openai;
pub mod traits;
pub mod util;

pub use openai::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
