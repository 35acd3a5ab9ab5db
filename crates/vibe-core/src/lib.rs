//! Shared data model for the vibe routing engine
//!
//! Every downstream crate consumes these types: requirement sets produced
//! by ingestion, user context owned by the session store, and the
//! optimization plans produced (or cached) per request.

#![allow(clippy::must_use_candidate)]

pub mod size;
pub mod types;

pub use size::{BYTES_PER_TOKEN, estimate_json_size, estimate_size};
pub use types::*;
