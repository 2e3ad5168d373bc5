//! Matching, similarity and review services

pub mod embedding_client;
pub mod hash_deduplicator;
pub mod identity_resolver;
pub mod processor_selector;
pub mod review_coordinator;
pub mod review_queue;
pub mod similarity_engine;
pub mod string_similarity;

pub use embedding_client::{EmbeddingError, EmbeddingProvider, HttpEmbeddingClient};
pub use hash_deduplicator::{HashDeduplicator, HashResult};
pub use identity_resolver::{ClassificationPolicy, IdentityResolver, ResolveError};
pub use processor_selector::{select_processor, ProcessorKind};
pub use review_coordinator::{ReviewCoordinator, ReviewError};
pub use review_queue::ReviewQueue;
pub use similarity_engine::{SimilarityEngine, SimilarityError};
