//! Reconnect Coordinator
//!
//! Mutual, co-location-gated requests to start over with a previously
//! matched pair. The expired match is only the reference: a completed
//! reconnect mints a brand-new match (new id, new window) and stamps
//! `reconnected_at` / `successor` on the old one exactly once.
//!
//! ```text
//! NoRequest -> OneRequested -> BothRequested --(co-located)--> Reconnected
//!                                   |
//!                                   +--(not co-located)--> held until a
//!                                      check-in resolves it or requests age out
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::errors::EngineError;
use types::ids::{MatchId, UserId, VenueRef};
use types::matches::{Match, ParticipantField, ReconnectPhase};

use crate::repository::{CheckInDirectory, MatchRepository};
use crate::store::MatchStore;

/// What a reconnect call achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ReconnectOutcome {
    /// Only one participant has asked so far
    AwaitingPartner,
    /// Both asked, but they are not at the same venue; request held
    AwaitingCoLocation,
    /// A successor match exists; `created` is false when an earlier call
    /// already minted it
    Reconnected { match_id: MatchId, created: bool },
}

/// Result of the locked part of a request
enum Step {
    AlreadyReconnected(MatchId),
    Evaluate(Box<Match>),
}

pub struct ReconnectCoordinator<R, D> {
    store: Arc<MatchStore<R>>,
    check_ins: D,
}

impl<R: MatchRepository, D: CheckInDirectory> ReconnectCoordinator<R, D> {
    pub fn new(store: Arc<MatchStore<R>>, check_ins: D) -> Self {
        Self { store, check_ins }
    }

    /// File a reconnect request against an expired match.
    ///
    /// The second distinct requester triggers the co-location check; on
    /// failure the pair is held pending rather than rejected.
    pub fn request_reconnect(
        &self,
        match_id: &MatchId,
        requester: &UserId,
    ) -> Result<ReconnectOutcome, EngineError> {
        let now = self.store.now_ms();
        let window_ms = self.store.policy().window_ms;
        let ttl_ms = self.store.policy().reconnect_request_ttl_ms;

        let step = self
            .store
            .repository()
            .modify(match_id, |record| -> Result<Step, EngineError> {
                if !record.is_participant(requester) {
                    return Err(EngineError::NotParticipant {
                        match_id: record.id,
                        user_id: requester.clone(),
                    });
                }
                if !record.is_expired_at(now, window_ms) {
                    return Err(EngineError::MatchActive {
                        match_id: record.id,
                    });
                }
                record.mark_expired(now, window_ms);
                if let Some(successor) = record.reconnect.successor {
                    return Ok(Step::AlreadyReconnected(successor));
                }
                record.reconnect.prune(now, ttl_ms);
                record.reconnect.requested_by.insert(requester.clone(), now);
                Ok(Step::Evaluate(Box::new(record.clone())))
            })?
            .ok_or_else(|| EngineError::match_not_found(match_id))??;

        match step {
            Step::AlreadyReconnected(successor) => Ok(ReconnectOutcome::Reconnected {
                match_id: successor,
                created: false,
            }),
            Step::Evaluate(record) => {
                info!(match_id = %match_id, requester = %requester, "reconnect requested");
                self.evaluate(&record, now, false)
            }
        }
    }

    /// Re-attempt a held reconnect. Unlike `request_reconnect`, a failed
    /// co-location check is reported as `CoLocationRequired`.
    pub fn retry_reconnect(
        &self,
        match_id: &MatchId,
        requester: &UserId,
    ) -> Result<ReconnectOutcome, EngineError> {
        let now = self.store.now_ms();
        let record = self.refreshed(match_id, requester, now)?;
        if let Some(successor) = record.reconnect.successor {
            return Ok(ReconnectOutcome::Reconnected {
                match_id: successor,
                created: false,
            });
        }
        self.evaluate(&record, now, true)
    }

    /// Withdraw a request. Returns whether one was pending.
    pub fn cancel_reconnect_request(
        &self,
        match_id: &MatchId,
        requester: &UserId,
    ) -> Result<bool, EngineError> {
        let removed = self
            .store
            .repository()
            .modify(match_id, |record| -> Result<bool, EngineError> {
                if !record.is_participant(requester) {
                    return Err(EngineError::NotParticipant {
                        match_id: record.id,
                        user_id: requester.clone(),
                    });
                }
                Ok(record.reconnect.requested_by.remove(requester).is_some())
            })?
            .ok_or_else(|| EngineError::match_not_found(match_id))??;

        if removed {
            info!(match_id = %match_id, requester = %requester, "reconnect request cancelled");
        }
        Ok(removed)
    }

    /// Current handshake phase, ignoring requests that have aged out.
    pub fn phase(&self, match_id: &MatchId) -> Result<ReconnectPhase, EngineError> {
        let mut record = self.store.get_match(match_id)?;
        record
            .reconnect
            .prune(self.store.now_ms(), self.store.policy().reconnect_request_ttl_ms);
        Ok(record.reconnect.phase())
    }

    /// Complete any held reconnects involving `user`, typically after a
    /// check-in. Returns the ids of matches minted by this call.
    pub fn resolve_pending_for(&self, user: &UserId) -> Result<Vec<MatchId>, EngineError> {
        let now = self.store.now_ms();
        let ttl_ms = self.store.policy().reconnect_request_ttl_ms;
        let window_ms = self.store.policy().window_ms;

        let mut minted = Vec::new();
        for field in ParticipantField::both() {
            for mut record in self.store.matches_by(field, user)? {
                if !record.is_expired_at(now, window_ms) || record.reconnect.successor.is_some() {
                    continue;
                }
                record.reconnect.prune(now, ttl_ms);
                if record.reconnect.phase() != ReconnectPhase::BothRequested {
                    continue;
                }
                if let ReconnectOutcome::Reconnected {
                    match_id,
                    created: true,
                } = self.evaluate(&record, now, false)?
                {
                    minted.push(match_id);
                }
            }
        }
        Ok(minted)
    }

    /// Prune stale requests and return the refreshed record.
    fn refreshed(&self, match_id: &MatchId, requester: &UserId, now: i64) -> Result<Match, EngineError> {
        let window_ms = self.store.policy().window_ms;
        let ttl_ms = self.store.policy().reconnect_request_ttl_ms;
        self.store
            .repository()
            .modify(match_id, |record| -> Result<Match, EngineError> {
                if !record.is_participant(requester) {
                    return Err(EngineError::NotParticipant {
                        match_id: record.id,
                        user_id: requester.clone(),
                    });
                }
                if !record.is_expired_at(now, window_ms) {
                    return Err(EngineError::MatchActive {
                        match_id: record.id,
                    });
                }
                record.mark_expired(now, window_ms);
                record.reconnect.prune(now, ttl_ms);
                Ok(record.clone())
            })?
            .ok_or_else(|| EngineError::match_not_found(match_id))?
    }

    fn evaluate(&self, record: &Match, now: i64, strict: bool) -> Result<ReconnectOutcome, EngineError> {
        if record.reconnect.phase() != ReconnectPhase::BothRequested {
            return Ok(ReconnectOutcome::AwaitingPartner);
        }

        let venue = match self.shared_venue(record)? {
            Some(venue) => venue,
            None if !self.store.policy().require_co_location => record.venue(),
            None if strict => {
                return Err(EngineError::CoLocationRequired {
                    match_id: record.id,
                })
            }
            None => {
                info!(match_id = %record.id, "reconnect held until both participants share a venue");
                return Ok(ReconnectOutcome::AwaitingCoLocation);
            }
        };

        let outcome = self
            .store
            .create_match(&record.participant_a, &record.participant_b, &venue)?;

        let recorded = self
            .store
            .repository()
            .modify(&record.id, |old| old.record_reconnect(outcome.match_id, now))?
            .unwrap_or(false);
        if recorded {
            info!(
                match_id = %record.id,
                successor = %outcome.match_id,
                venue_id = %venue.id,
                "pair reconnected"
            );
        } else {
            debug!(match_id = %record.id, "reconnect already recorded by a concurrent request");
        }

        Ok(ReconnectOutcome::Reconnected {
            match_id: outcome.match_id,
            created: outcome.created,
        })
    }

    /// The venue both participants are checked into right now, if any.
    fn shared_venue(&self, record: &Match) -> Result<Option<VenueRef>, EngineError> {
        let a = self.check_ins.current_venue(&record.participant_a)?;
        let b = self.check_ins.current_venue(&record.participant_b)?;
        Ok(match (a, b) {
            (Some(a), Some(b)) if a.id == b.id => Some(a),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryCheckIns, InMemoryMatchRepository};
    use types::clock::ManualClock;
    use types::policy::{MatchPolicy, HOUR_MS};

    const T0: i64 = 1_708_123_456_789;

    struct Fixture {
        store: Arc<MatchStore<InMemoryMatchRepository>>,
        check_ins: Arc<InMemoryCheckIns>,
        clock: Arc<ManualClock>,
        coordinator: ReconnectCoordinator<InMemoryMatchRepository, Arc<InMemoryCheckIns>>,
        original: MatchId,
    }

    fn fixture(policy: MatchPolicy) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MatchStore::new(
            InMemoryMatchRepository::new(),
            clock.clone(),
            policy,
        ));
        let check_ins = Arc::new(InMemoryCheckIns::new());
        let coordinator = ReconnectCoordinator::new(store.clone(), check_ins.clone());
        let original = store
            .create_match(&alice(), &bob(), &v1())
            .unwrap()
            .match_id;
        Fixture {
            store,
            check_ins,
            clock,
            coordinator,
            original,
        }
    }

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    fn v1() -> VenueRef {
        VenueRef::new("v1", "The Anchor")
    }

    fn v2() -> VenueRef {
        VenueRef::new("v2", "The Crown")
    }

    #[test]
    fn test_reconnect_requires_expired_match() {
        let fx = fixture(MatchPolicy::default());
        let err = fx
            .coordinator
            .request_reconnect(&fx.original, &alice())
            .unwrap_err();
        assert_eq!(err, EngineError::MatchActive { match_id: fx.original });
    }

    #[test]
    fn test_reconnect_requires_participant() {
        let fx = fixture(MatchPolicy::default());
        fx.clock.advance(3 * HOUR_MS + 1);
        let err = fx
            .coordinator
            .request_reconnect(&fx.original, &UserId::new("mallory"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotParticipant { .. }));

        let missing = fx
            .coordinator
            .request_reconnect(&MatchId::new(), &alice())
            .unwrap_err();
        assert!(matches!(missing, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_mutual_co_located_reconnect_mints_new_match() {
        let fx = fixture(MatchPolicy::default());
        fx.check_ins.check_in(alice(), v1());
        fx.check_ins.check_in(bob(), v1());
        fx.clock.advance(3 * HOUR_MS + 1);

        let first = fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();
        assert_eq!(first, ReconnectOutcome::AwaitingPartner);
        assert_eq!(
            fx.coordinator.phase(&fx.original).unwrap(),
            ReconnectPhase::OneRequested
        );

        let second = fx.coordinator.request_reconnect(&fx.original, &bob()).unwrap();
        let successor = match second {
            ReconnectOutcome::Reconnected { match_id, created } => {
                assert!(created);
                match_id
            }
            other => panic!("Expected Reconnected, got {:?}", other),
        };
        assert_ne!(successor, fx.original);

        let old = fx.store.get_match(&fx.original).unwrap();
        assert!(old.expired);
        assert_eq!(old.reconnect.reconnected_at, Some(T0 + 3 * HOUR_MS + 1));
        assert_eq!(old.reconnect.successor, Some(successor));

        let new = fx.store.get_match(&successor).unwrap();
        assert_eq!(new.created_at, T0 + 3 * HOUR_MS + 1);
        assert!(!new.expired);
        assert_eq!(new.messages_sent_by(&alice()), 0);
    }

    #[test]
    fn test_repeat_request_after_reconnect_returns_successor() {
        let fx = fixture(MatchPolicy::default());
        fx.check_ins.check_in(alice(), v1());
        fx.check_ins.check_in(bob(), v1());
        fx.clock.advance(3 * HOUR_MS + 1);

        fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();
        let done = fx.coordinator.request_reconnect(&fx.original, &bob()).unwrap();
        let again = fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();

        let ReconnectOutcome::Reconnected { match_id, .. } = done else {
            panic!("Expected Reconnected");
        };
        assert_eq!(
            again,
            ReconnectOutcome::Reconnected {
                match_id,
                created: false
            }
        );
        let reconnected_at = fx.store.get_match(&fx.original).unwrap().reconnect.reconnected_at;
        assert_eq!(reconnected_at, Some(T0 + 3 * HOUR_MS + 1));
    }

    #[test]
    fn test_not_co_located_is_held_then_resolved_by_check_in() {
        let fx = fixture(MatchPolicy::default());
        fx.check_ins.check_in(alice(), v1());
        fx.check_ins.check_in(bob(), v2());
        fx.clock.advance(3 * HOUR_MS + 1);

        fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();
        let held = fx.coordinator.request_reconnect(&fx.original, &bob()).unwrap();
        assert_eq!(held, ReconnectOutcome::AwaitingCoLocation);
        assert_eq!(
            fx.coordinator.phase(&fx.original).unwrap(),
            ReconnectPhase::BothRequested
        );
        assert_eq!(fx.store.repository().len(), 1);

        let strict = fx.coordinator.retry_reconnect(&fx.original, &alice()).unwrap_err();
        assert_eq!(strict, EngineError::CoLocationRequired { match_id: fx.original });

        fx.check_ins.check_in(bob(), v1());
        let minted = fx.coordinator.resolve_pending_for(&bob()).unwrap();
        assert_eq!(minted.len(), 1);

        let new = fx.store.get_match(&minted[0]).unwrap();
        assert_eq!(new.venue_id, v1().id);
        assert_eq!(
            fx.coordinator.phase(&fx.original).unwrap(),
            ReconnectPhase::Reconnected
        );
    }

    #[test]
    fn test_stale_requests_are_discarded() {
        let fx = fixture(MatchPolicy::default());
        fx.check_ins.check_in(alice(), v1());
        fx.check_ins.check_in(bob(), v1());
        fx.clock.advance(3 * HOUR_MS + 1);

        fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();
        fx.clock.advance(24 * HOUR_MS + 1);
        assert_eq!(
            fx.coordinator.phase(&fx.original).unwrap(),
            ReconnectPhase::NoRequest
        );

        let outcome = fx.coordinator.request_reconnect(&fx.original, &bob()).unwrap();
        assert_eq!(outcome, ReconnectOutcome::AwaitingPartner);
    }

    #[test]
    fn test_cancel_request() {
        let fx = fixture(MatchPolicy::default());
        fx.clock.advance(3 * HOUR_MS + 1);

        fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();
        assert!(fx.coordinator.cancel_reconnect_request(&fx.original, &alice()).unwrap());
        assert!(!fx.coordinator.cancel_reconnect_request(&fx.original, &alice()).unwrap());
        assert_eq!(
            fx.coordinator.phase(&fx.original).unwrap(),
            ReconnectPhase::NoRequest
        );

        let err = fx
            .coordinator
            .cancel_reconnect_request(&fx.original, &UserId::new("mallory"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotParticipant { .. }));
    }

    #[test]
    fn test_remote_reconnect_override() {
        let policy = MatchPolicy {
            require_co_location: false,
            ..MatchPolicy::default()
        };
        let fx = fixture(policy);
        fx.clock.advance(3 * HOUR_MS + 1);

        fx.coordinator.request_reconnect(&fx.original, &alice()).unwrap();
        let outcome = fx.coordinator.request_reconnect(&fx.original, &bob()).unwrap();
        let ReconnectOutcome::Reconnected { match_id, created } = outcome else {
            panic!("Expected Reconnected, got {:?}", outcome);
        };
        assert!(created);
        // nobody is checked in anywhere, so the original venue is reused
        assert_eq!(fx.store.get_match(&match_id).unwrap().venue_id, v1().id);
    }
}
