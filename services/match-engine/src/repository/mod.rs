//! Storage seams
//!
//! The engine owns no long-lived state; every record lives in a
//! collaborator-owned store reached through these traits. Each method is a
//! single round-trip. Implementations must make `insert_unique` and `modify`
//! atomic per key, since they are the two serialization points of the engine.

pub mod memory;

use types::errors::StoreError;
use types::ids::{MatchId, UserId, VenueRef};
use types::interest::{Interest, InterestKey};
use types::matches::{Match, ParticipantField};

pub use memory::{
    InMemoryCheckIns, InMemoryCounterStore, InMemoryInterestRepository, InMemoryMatchRepository,
};

/// Result of a conditional create on the canonical pair key
#[derive(Debug, Clone)]
pub struct Insertion {
    /// The match now owning the pair: the candidate, or the live winner
    pub record: Match,
    /// Whether the candidate was written
    pub created: bool,
    /// Previous holder of the pair key that was no longer live
    pub superseded: Option<MatchId>,
}

/// `matches/{id}` documents
pub trait MatchRepository: Send + Sync {
    fn get(&self, id: &MatchId) -> Result<Option<Match>, StoreError>;

    /// Insert `candidate` unless the pair already has a match for which
    /// `is_live` holds. Concurrent calls on the same pair produce exactly
    /// one winner; losers get the winner back.
    fn insert_unique<F>(&self, candidate: Match, is_live: F) -> Result<Insertion, StoreError>
    where
        F: Fn(&Match) -> bool;

    /// Run `f` against the stored record with exclusive access, persisting
    /// whatever it leaves behind. `Ok(None)` if the record does not exist.
    fn modify<T, F>(&self, id: &MatchId, f: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&mut Match) -> T;

    /// Equality query on one ownership field.
    fn find_by_participant(
        &self,
        field: ParticipantField,
        user: &UserId,
    ) -> Result<Vec<Match>, StoreError>;

    /// Ids of matches with `expired == false` and `created_at <= cutoff_ms`.
    fn find_stale(&self, cutoff_ms: i64) -> Result<Vec<MatchId>, StoreError>;

    /// Ids of expired matches with `created_at <= cutoff_ms` whose history
    /// has not been purged yet.
    fn find_purgeable(&self, cutoff_ms: i64) -> Result<Vec<MatchId>, StoreError>;
}

/// Interest facts keyed by `(from, to, venue)`
pub trait InterestRepository: Send + Sync {
    /// Write the fact if absent. Returns true when it was newly written.
    fn put_if_absent(&self, interest: Interest) -> Result<bool, StoreError>;

    fn contains(&self, key: &InterestKey) -> Result<bool, StoreError>;

    /// Delete the fact once it has produced a match. Returns false if it was
    /// already gone, so repeating the call is harmless.
    fn consume(&self, key: &InterestKey) -> Result<bool, StoreError>;
}

/// Venue membership owned by the check-in subsystem
pub trait CheckInDirectory: Send + Sync {
    /// The venue `user` is currently checked into, if any.
    fn current_venue(&self, user: &UserId) -> Result<Option<VenueRef>, StoreError>;
}

/// Counters with a TTL-reset window, e.g. Redis `INCR` + `PEXPIRE`
pub trait CounterStore: Send + Sync {
    /// Increment the counter at `key` and return its value within the current
    /// window. A window older than `window_ms` is reset first.
    fn increment(&self, key: &str, now_ms: i64, window_ms: i64) -> Result<u32, StoreError>;
}

impl<T: MatchRepository> MatchRepository for std::sync::Arc<T> {
    fn get(&self, id: &MatchId) -> Result<Option<Match>, StoreError> {
        (**self).get(id)
    }

    fn insert_unique<F>(&self, candidate: Match, is_live: F) -> Result<Insertion, StoreError>
    where
        F: Fn(&Match) -> bool,
    {
        (**self).insert_unique(candidate, is_live)
    }

    fn modify<R, F>(&self, id: &MatchId, f: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut Match) -> R,
    {
        (**self).modify(id, f)
    }

    fn find_by_participant(
        &self,
        field: ParticipantField,
        user: &UserId,
    ) -> Result<Vec<Match>, StoreError> {
        (**self).find_by_participant(field, user)
    }

    fn find_stale(&self, cutoff_ms: i64) -> Result<Vec<MatchId>, StoreError> {
        (**self).find_stale(cutoff_ms)
    }

    fn find_purgeable(&self, cutoff_ms: i64) -> Result<Vec<MatchId>, StoreError> {
        (**self).find_purgeable(cutoff_ms)
    }
}

impl<T: CheckInDirectory> CheckInDirectory for std::sync::Arc<T> {
    fn current_venue(&self, user: &UserId) -> Result<Option<VenueRef>, StoreError> {
        (**self).current_venue(user)
    }
}
