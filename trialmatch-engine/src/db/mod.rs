//! Persistence for matches, reviews, embeddings and the catalog mirror
//!
//! Rows store ids as hyphenated UUID text, timestamps as RFC 3339 and
//! structured values as JSON text.

pub mod audit;
pub mod catalog;
pub mod corrections;
pub mod embeddings;
pub mod jobs;
pub mod matches;
pub mod reviews;
pub mod settings;

use chrono::{DateTime, Utc};
use trialmatch_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in {}: {}", column, e)))
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in {}: {}", column, e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(&v, column)).transpose()
}

pub(crate) fn parse_enum<T>(value: &str, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Internal(format!("{} ({})", e, column)))
}
