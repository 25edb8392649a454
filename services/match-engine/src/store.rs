//! Match Store
//!
//! Owns creation, quota-checked append, contact sharing and expiry flagging
//! of `matches/{id}` documents. Two operations are serialization points:
//! - `create_match`: conditional create on the canonical pair key, so two
//!   racing creators observe the same match id
//! - `send_message`: increment-and-append runs as one atomic `modify`, so
//!   concurrent sends from one sender can never overshoot the quota
//!
//! Every write re-derives expiry from `created_at` instead of trusting the
//! stored flag, which may lag the sweep.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::clock::Clock;
use types::errors::EngineError;
use types::ids::{MatchId, UserId, VenueRef};
use types::matches::{Match, Message, ParticipantField, SharedContact};
use types::policy::MatchPolicy;

use crate::repository::MatchRepository;
use crate::retry::RetryPolicy;

/// Result of an idempotent create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub match_id: MatchId,
    /// False when an existing live match for the pair was returned
    pub created: bool,
}

pub struct MatchStore<R> {
    repo: R,
    clock: Arc<dyn Clock>,
    policy: MatchPolicy,
    retry: RetryPolicy,
}

impl<R: MatchRepository> MatchStore<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>, policy: MatchPolicy) -> Self {
        Self {
            repo,
            clock,
            policy,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Create a match for the pair, or return the live one that already
    /// exists. `created_at` always comes from the store clock.
    pub fn create_match(
        &self,
        u1: &UserId,
        u2: &UserId,
        venue: &VenueRef,
    ) -> Result<CreateOutcome, EngineError> {
        if u1 == u2 {
            return Err(EngineError::SelfInterest {
                user_id: u1.clone(),
            });
        }

        let window_ms = self.policy.window_ms;
        let insertion = self.retry.run("create_match", || {
            let now = self.clock.now_ms();
            let candidate = Match::new(u1.clone(), u2.clone(), venue.clone(), now);
            self.repo
                .insert_unique(candidate, |existing| !existing.is_expired_at(now, window_ms))
                .map_err(EngineError::from)
        })?;

        if let Some(previous) = insertion.superseded {
            // the previous holder is dead by clock; make the flag agree
            if let Err(err) = self.flag_expired(&previous) {
                warn!(match_id = %previous, error = %err, "failed to flag superseded match");
            }
        }

        let outcome = CreateOutcome {
            match_id: insertion.record.id,
            created: insertion.created,
        };
        if outcome.created {
            info!(
                match_id = %outcome.match_id,
                venue_id = %venue.id,
                created_at = insertion.record.created_at,
                "match created"
            );
        } else {
            debug!(match_id = %outcome.match_id, "live match already exists for pair");
        }
        Ok(outcome)
    }

    /// Fetch a match, lazily flagging it when its window has lapsed.
    pub fn get_match(&self, match_id: &MatchId) -> Result<Match, EngineError> {
        let record = self
            .repo
            .get(match_id)?
            .ok_or_else(|| EngineError::match_not_found(match_id))?;

        let now = self.clock.now_ms();
        if !record.expired && record.window_elapsed(now, self.policy.window_ms) {
            self.flag_expired(match_id)?;
            return self
                .repo
                .get(match_id)?
                .ok_or_else(|| EngineError::match_not_found(match_id));
        }
        Ok(record)
    }

    /// Equality query on one ownership field.
    pub fn matches_by(
        &self,
        field: ParticipantField,
        user: &UserId,
    ) -> Result<Vec<Match>, EngineError> {
        Ok(self.repo.find_by_participant(field, user)?)
    }

    /// Append a message if the match is open and the sender has quota left.
    ///
    /// Preconditions are checked in order: exists, not expired, participant,
    /// text (trimmed, non-empty, bounded), quota. Never retried transparently.
    pub fn send_message(
        &self,
        match_id: &MatchId,
        sender: &UserId,
        text: &str,
    ) -> Result<Message, EngineError> {
        let now = self.clock.now_ms();

        let result = self
            .repo
            .modify(match_id, |record| {
                record.try_append(sender, text, now, &self.policy)
            })?
            .ok_or_else(|| EngineError::match_not_found(match_id))?;

        match &result {
            Ok(message) => debug!(
                match_id = %match_id,
                message_id = %message.id,
                sender = %sender,
                "message appended"
            ),
            Err(err) => debug!(match_id = %match_id, sender = %sender, error = %err, "message rejected"),
        }
        result
    }

    /// Share (or overwrite) contact details on an active match.
    pub fn share_contact(
        &self,
        match_id: &MatchId,
        requester: &UserId,
        payload: &str,
    ) -> Result<SharedContact, EngineError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(EngineError::InvalidMessage {
                reason: "contact payload is empty".to_string(),
            });
        }
        let now = self.clock.now_ms();
        let window_ms = self.policy.window_ms;

        let contact = self
            .repo
            .modify(match_id, |record| {
                record.share_contact(requester, payload.to_string(), now, window_ms)
            })?
            .ok_or_else(|| EngineError::match_not_found(match_id))??;

        info!(match_id = %match_id, shared_by = %requester, "contact shared");
        Ok(contact)
    }

    /// Set `expired` if the window has lapsed. Idempotent; returns whether
    /// this call performed the transition.
    pub fn flag_expired(&self, match_id: &MatchId) -> Result<bool, EngineError> {
        self.flag_expired_at(match_id, self.clock.now_ms())
    }

    pub(crate) fn flag_expired_at(&self, match_id: &MatchId, now: i64) -> Result<bool, EngineError> {
        let window_ms = self.policy.window_ms;
        let flipped = self.retry.run("flag_expired", || {
            self.repo
                .modify(match_id, |record| record.mark_expired(now, window_ms))?
                .ok_or_else(|| EngineError::match_not_found(match_id))
        })?;

        if flipped {
            info!(match_id = %match_id, "match expired");
        } else {
            debug!(match_id = %match_id, "flag_expired no-op");
        }
        Ok(flipped)
    }

    /// Drop message history on an expired match. Counters survive.
    pub(crate) fn purge_messages_at(&self, match_id: &MatchId, now: i64) -> Result<usize, EngineError> {
        let removed = self
            .repo
            .modify(match_id, |record| {
                if record.expired {
                    record.purge_messages(now)
                } else {
                    0
                }
            })?
            .ok_or_else(|| EngineError::match_not_found(match_id))?;
        debug!(match_id = %match_id, removed, "message history purged");
        Ok(removed)
    }
}
