//! # TagTrust Common Library
//!
//! Shared code for the TagTrust tagging and moderation engine:
//! - Domain models (tags, votes, reputation records and events, entities)
//! - Pure scoring: tag confidence, reputation score, trust classification
//! - The reputation fold shared by live updates and replay
//! - Entity-name normalization and input validation
//! - Configuration loading
//! - Database schema and lock-retry helpers
//! - Event types and the EventBus

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod scoring;

pub use error::{Error, Result};
pub use models::{
    Entity, EntityRef, ReputationEvent, ReputationEventType, ReputationRecord, Tag, TagStatus,
    Vote, VoteDirection,
};
pub use scoring::TrustLevel;
