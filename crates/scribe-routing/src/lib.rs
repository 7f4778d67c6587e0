//! Task-to-model routing for Scribe
//!
//! Resolves a logical task (e.g. "summary") and an optional caller into
//! the concrete model, credential, and generation parameters to use,
//! reading a per-user routing table with system-wide defaults.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod router;
pub mod update;

pub use error::RoutingError;
pub use router::{ModelRouter, TaskRoute, TaskTypeInfo};
pub use update::{FieldUpdate, RoutingUpdate};
