//! Storage queries for tags, votes, reputation and the entity directory
//!
//! Every function takes a `&mut SqliteConnection` so the engine can compose
//! several of them inside one transaction (`&mut *tx`).

pub mod entities;
pub mod reputation;
pub mod tags;
pub mod votes;

use tagtrust_common::{Error, Result};
use uuid::Uuid;

/// Parse a UUID stored as TEXT
pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Corrupt UUID '{}': {}", raw, e)))
}
