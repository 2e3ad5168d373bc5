//! Database initialization and schema
//!
//! One SQLite database holds the catalog mirror, match results, embeddings,
//! threshold corrections, review items and the audit log.

pub mod init;

pub use init::{create_schema, init_database, init_in_memory_database};
