//! Engine error taxonomy.
//!
//! Conflicts (quota hit, already completed, insufficient funds, ...) are
//! expected, user-recoverable conditions and carry a machine-readable reason
//! so the UI can say exactly why an action was rejected. Persistence failures
//! are internal errors; collaborator failures never reach this type at all.

use serde::{Deserialize, Serialize};

pub type EngineResult<T> = Result<T, EngineError>;

/// Why a state-conflict rejection happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    AlreadyCompleted,
    DailyLimitReached,
    BossLimitReached,
    InsufficientFunds,
    NotOwner,
    ListingInactive,
    IncorrectAnswer,
    RewardNotReady,
}

impl ConflictReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyCompleted => "already completed",
            Self::DailyLimitReached => "daily completion limit reached",
            Self::BossLimitReached => "boss battle already completed today",
            Self::InsufficientFunds => "not enough dreamcoins",
            Self::NotOwner => "not the owner",
            Self::ListingInactive => "listing is no longer active",
            Self::IncorrectAnswer => "incorrect answer",
            Self::RewardNotReady => "daily reward already claimed today",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad input; nothing was mutated.
    #[error("{0}")]
    Validation(String),

    /// Referenced row does not exist; nothing was mutated.
    #[error("{0} not found")]
    NotFound(String),

    /// Expected, user-recoverable state conflict; nothing was mutated.
    #[error("{}", .0.message())]
    Conflict(ConflictReason),

    /// Store-level failure; the surrounding transaction rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The machine-readable conflict reason, when this is a conflict.
    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }
}
