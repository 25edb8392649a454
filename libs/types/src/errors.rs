//! Error types for the match lifecycle engine
//!
//! Everything except `StoreUnavailable` is an expected, user-facing outcome
//! that callers must distinguish and must not retry.

use thiserror::Error;

use crate::ids::{MatchId, UserId};

/// Fault raised by a storage collaborator (match store, interest ledger,
/// check-in directory, counter store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{component} unavailable: {reason}")]
    Unavailable {
        component: &'static str,
        reason: String,
    },
}

impl StoreError {
    pub fn unavailable(component: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            component,
            reason: reason.into(),
        }
    }
}

/// Rate-limited action classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Like,
    Message,
    Reconnect,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Like => "like",
            Action::Message => "message",
            Action::Reconnect => "reconnect",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("match {match_id} has expired")]
    Expired { match_id: MatchId },

    #[error("user {user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: MatchId, user_id: UserId },

    #[error("message quota of {limit} exhausted for user {user_id} in match {match_id}")]
    QuotaExceeded {
        match_id: MatchId,
        user_id: UserId,
        limit: u32,
    },

    #[error("reconnect for match {match_id} requires both participants at the same venue")]
    CoLocationRequired { match_id: MatchId },

    #[error("match {match_id} is still active")]
    MatchActive { match_id: MatchId },

    #[error("rate limit exceeded for {user_id}:{action}")]
    RateLimited { user_id: UserId, action: Action },

    #[error("user {user_id} cannot express interest in themselves")]
    SelfInterest { user_id: UserId },

    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl EngineError {
    pub fn match_not_found(match_id: &MatchId) -> Self {
        EngineError::NotFound {
            entity: "match",
            id: match_id.to_string(),
        }
    }

    /// Only infrastructure faults are eligible for transparent retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }

    /// Copy suitable for showing to the person who triggered the action.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "This match no longer exists.",
            EngineError::Expired { .. } => "This conversation has ended.",
            EngineError::NotParticipant { .. } => "You are not part of this match.",
            EngineError::QuotaExceeded { .. } => {
                "You've used all your messages with this match."
            }
            EngineError::CoLocationRequired { .. } => {
                "You both need to be checked in at the same venue to reconnect."
            }
            EngineError::MatchActive { .. } => {
                "This conversation is still open, so there is nothing to reconnect yet."
            }
            EngineError::RateLimited { .. } => "You're doing that too often. Try again shortly.",
            EngineError::SelfInterest { .. } => "You can't match with yourself.",
            EngineError::InvalidMessage { .. } => "That message can't be sent.",
            EngineError::StoreUnavailable(_) => "Something went wrong. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::unavailable("interest ledger", "connection reset");
        assert_eq!(err.to_string(), "interest ledger unavailable: connection reset");
    }

    #[test]
    fn test_engine_error_from_store_error() {
        let err: EngineError = StoreError::unavailable("match store", "timeout").into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_facing_errors_are_not_retryable() {
        let match_id = MatchId::new();
        let errs = vec![
            EngineError::match_not_found(&match_id),
            EngineError::Expired { match_id },
            EngineError::CoLocationRequired { match_id },
            EngineError::QuotaExceeded {
                match_id,
                user_id: UserId::new("alice"),
                limit: 3,
            },
        ];
        assert!(errs.iter().all(|e| !e.is_retryable()));
    }

    #[test]
    fn test_user_message_copy() {
        let match_id = MatchId::new();
        let quota = EngineError::QuotaExceeded {
            match_id,
            user_id: UserId::new("alice"),
            limit: 3,
        };
        assert!(quota.user_message().contains("used all your messages"));

        let colo = EngineError::CoLocationRequired { match_id };
        assert!(colo.user_message().contains("same venue"));
    }
}
