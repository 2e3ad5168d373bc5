//! # Trialmatch Common Library
//!
//! Shared code for the trial matching and review services:
//! - Error and result types
//! - TOML configuration and root folder resolution
//! - SQLite pool initialization and schema
//! - Engine events (EventBus) and SSE helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus};
