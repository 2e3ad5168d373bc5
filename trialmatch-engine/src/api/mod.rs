//! HTTP API handlers
//!
//! Thin axum layer over the resolver, similarity engine and review
//! coordinator. Handlers validate and translate; the services own the rules.

pub mod events;
pub mod health;
pub mod matching;
pub mod review;
pub mod similarity;

pub use events::event_stream;
pub use health::health_routes;
pub use matching::matching_routes;
pub use review::review_routes;
pub use similarity::similarity_routes;
