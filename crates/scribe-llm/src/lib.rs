//! Request dispatch for Scribe
//!
//! Given a logical task and an optional explicit model override, this
//! crate resolves the concrete (model, credential, prompt, parameters)
//! tuple, issues the completion or embedding call, detects `<think>`
//! reasoning traces in streamed output, and retries once on a
//! routing-configured fallback model when the primary call fails.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod router;
pub mod think;

pub use client::{ChatRequest, ChatResponse, ChatUsage, CompletionClient, EmbeddingRequest, HttpCompletionClient};
pub use error::DispatchError;
pub use router::{ChatOutcome, LlmRouter, TaskCall};
pub use think::{StreamEvent, ThinkDetector};
