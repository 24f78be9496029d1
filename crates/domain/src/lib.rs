//! Shared domain types for Wayfarer: configuration, errors, itinerary and
//! POI schemas, the plan contract, dialogue and task records, and the plan
//! validator. This crate performs no I/O.

pub mod chat;
pub mod config;
pub mod error;
pub mod memory;
pub mod plan;
pub mod poi;
pub mod prompt;
pub mod task;
pub mod trace;
pub mod trip;
pub mod validator;

pub use error::{Error, LlmErrorKind, Result};
