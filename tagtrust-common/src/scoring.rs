//! Pure scoring functions: tag confidence, reputation score, trust classification
//!
//! Everything here is deterministic and side-effect free so that the live
//! reputation update and the event-log replay produce identical bits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Weight of the approval rate in the base reputation score
pub const APPROVAL_WEIGHT: f64 = 0.7;

/// Weight of the vote ratio in the base reputation score
pub const VOTE_WEIGHT: f64 = 0.3;

/// Score of a user (or a ratio) with no evidence yet
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// Smoothed confidence that a tag is correct.
///
/// `(up + 1) / (up + down + 2)`, so zero votes gives 0.5 and no finite vote
/// count reaches 0 or 1.
pub fn confidence(upvotes: i64, downvotes: i64) -> f64 {
    let up = upvotes.max(0) as f64;
    let down = downvotes.max(0) as f64;
    (up + 1.0) / (up + down + 2.0)
}

/// Volume bonus by number of decided (approved + rejected) tags
pub fn volume_bonus(decided: i64) -> f64 {
    if decided >= 50 {
        0.10
    } else if decided >= 20 {
        0.05
    } else {
        0.0
    }
}

/// Reputation score in `[0, 1]` from a user's outcome counters.
///
/// With no decided tags the approval rate is the neutral prior, and with no
/// votes the vote ratio is the neutral prior, so a newcomer scores 0.5.
pub fn reputation_score(approved: i64, rejected: i64, upvotes: i64, downvotes: i64) -> f64 {
    let approved = approved.max(0);
    let rejected = rejected.max(0);
    let upvotes = upvotes.max(0);
    let downvotes = downvotes.max(0);

    let decided = approved + rejected;
    if decided == 0 {
        return NEUTRAL_PRIOR;
    }

    let approval_rate = approved as f64 / decided.max(1) as f64;
    let votes = upvotes + downvotes;
    let vote_ratio = if votes == 0 {
        NEUTRAL_PRIOR
    } else {
        upvotes as f64 / votes as f64
    };

    let base = APPROVAL_WEIGHT * approval_rate + VOTE_WEIGHT * vote_ratio;
    (base + volume_bonus(decided)).clamp(0.0, 1.0)
}

/// Discrete trust tier derived from reputation score and decided-tag volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    New,
    Learning,
    Trusted,
    Expert,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::New => "new",
            TrustLevel::Learning => "learning",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Expert => "expert",
        }
    }

    /// Whether tags from users at this level bypass the moderation queue
    pub fn auto_approves(&self) -> bool {
        matches!(self, TrustLevel::Trusted | TrustLevel::Expert)
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TrustLevel::New),
            "learning" => Ok(TrustLevel::Learning),
            "trusted" => Ok(TrustLevel::Trusted),
            "expert" => Ok(TrustLevel::Expert),
            other => Err(Error::Validation(format!("Unknown trust level: {}", other))),
        }
    }
}

/// Tier thresholds in decreasing precedence: (level, min score, min decided)
const TIERS: [(TrustLevel, f64, i64); 3] = [
    (TrustLevel::Expert, 0.90, 50),
    (TrustLevel::Trusted, 0.80, 10),
    (TrustLevel::Learning, 0.60, 3),
];

/// Classify a user. Tiers are checked highest first; a user failing one
/// tier's volume requirement falls through to the next tier, never straight
/// to `New`.
pub fn classify(score: f64, decided: i64) -> TrustLevel {
    TIERS
        .iter()
        .find(|(_, min_score, min_decided)| score >= *min_score && decided >= *min_decided)
        .map(|(level, _, _)| *level)
        .unwrap_or(TrustLevel::New)
}
