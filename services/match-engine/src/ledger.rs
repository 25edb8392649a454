//! Interest Ledger
//!
//! Records one-directional interest facts and turns a mirrored pair into a
//! match. Both halves of a near-simultaneous mutual like may observe the
//! mirror and call `create_match`; the store's conditional create picks the
//! single winner and hands the loser the same match id.
//!
//! Both facts are consumed once the match exists. A later match for the same
//! pair needs two fresh likes, or goes through the reconnect handshake.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::errors::EngineError;
use types::ids::{MatchId, UserId, VenueRef};
use types::interest::Interest;

use crate::repository::{InterestRepository, MatchRepository};
use crate::store::MatchStore;

/// What `record_interest` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InterestOutcome {
    /// Fact stored; the other side has not reciprocated yet
    Pending,
    /// Mirror found; `created` tells whether this call minted the match
    Matched { match_id: MatchId, created: bool },
}

impl InterestOutcome {
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            InterestOutcome::Pending => None,
            InterestOutcome::Matched { match_id, .. } => Some(*match_id),
        }
    }
}

pub struct InterestLedger<I, R> {
    interests: I,
    store: Arc<MatchStore<R>>,
}

impl<I: InterestRepository, R: MatchRepository> InterestLedger<I, R> {
    pub fn new(interests: I, store: Arc<MatchStore<R>>) -> Self {
        Self { interests, store }
    }

    pub fn interests(&self) -> &I {
        &self.interests
    }

    /// Record `from -> to` at `venue` and create the match if `to -> from`
    /// already exists. Re-recording a fact that is still pending is a no-op.
    ///
    /// The caller is expected to have passed the rate-limit gate already.
    pub fn record_interest(
        &self,
        from: &UserId,
        to: &UserId,
        venue: &VenueRef,
    ) -> Result<InterestOutcome, EngineError> {
        if from == to {
            return Err(EngineError::SelfInterest {
                user_id: from.clone(),
            });
        }

        let interest = Interest::new(
            from.clone(),
            to.clone(),
            venue.id.clone(),
            self.store.now_ms(),
        );
        let mirror = interest.key().mirror();
        let retry = self.store.retry_policy();

        let written = retry.run("record_interest", || {
            Ok(self.interests.put_if_absent(interest.clone())?)
        })?;
        if !written {
            debug!(from = %from, to = %to, venue_id = %venue.id, "interest already recorded");
        }

        let reciprocated = retry.run("check_mirror", || Ok(self.interests.contains(&mirror)?))?;
        if !reciprocated {
            return Ok(InterestOutcome::Pending);
        }

        // the earlier liker goes in participant_a
        let outcome = self.store.create_match(to, from, venue)?;

        for key in [interest.key(), mirror] {
            let removed = retry.run("consume_interest", || Ok(self.interests.consume(&key)?))?;
            if !removed {
                debug!(match_id = %outcome.match_id, from = %key.from, to = %key.to, "interest already consumed");
            }
        }
        if outcome.created {
            info!(
                match_id = %outcome.match_id,
                from = %from,
                to = %to,
                "mutual interest matched"
            );
        }
        Ok(InterestOutcome::Matched {
            match_id: outcome.match_id,
            created: outcome.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryInterestRepository, InMemoryMatchRepository};
    use types::clock::ManualClock;
    use types::errors::StoreError;
    use types::interest::InterestKey;
    use types::policy::MatchPolicy;

    const T0: i64 = 1_708_123_456_789;

    fn store() -> Arc<MatchStore<InMemoryMatchRepository>> {
        Arc::new(MatchStore::new(
            InMemoryMatchRepository::new(),
            Arc::new(ManualClock::new(T0)),
            MatchPolicy::default(),
        ))
    }

    fn venue() -> VenueRef {
        VenueRef::new("v1", "The Anchor")
    }

    #[test]
    fn test_one_sided_interest_is_pending() {
        let ledger = InterestLedger::new(InMemoryInterestRepository::new(), store());
        let outcome = ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();
        assert_eq!(outcome, InterestOutcome::Pending);
        assert_eq!(ledger.interests().len(), 1);
    }

    #[test]
    fn test_mutual_interest_creates_match() {
        let store = store();
        let ledger = InterestLedger::new(InMemoryInterestRepository::new(), store.clone());
        ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();
        let outcome = ledger
            .record_interest(&"bob".into(), &"alice".into(), &venue())
            .unwrap();

        let match_id = outcome.match_id().unwrap();
        assert_eq!(outcome, InterestOutcome::Matched { match_id, created: true });

        let record = store.get_match(&match_id).unwrap();
        assert_eq!(record.participant_a, UserId::new("alice"));
        assert_eq!(record.participant_b, UserId::new("bob"));
        assert_eq!(record.venue_name, "The Anchor");
        assert!(ledger.interests().is_empty(), "both facts are consumed");
    }

    #[test]
    fn test_rerecording_after_match_starts_fresh() {
        let ledger = InterestLedger::new(InMemoryInterestRepository::new(), store());
        ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();
        ledger
            .record_interest(&"bob".into(), &"alice".into(), &venue())
            .unwrap();
        let again = ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();

        assert_eq!(again, InterestOutcome::Pending);
        assert_eq!(ledger.interests().len(), 1);
    }

    #[test]
    fn test_one_sided_like_after_expiry_does_not_rematch() {
        let clock = Arc::new(ManualClock::new(T0));
        let policy = MatchPolicy::default();
        let store = Arc::new(MatchStore::new(
            InMemoryMatchRepository::new(),
            clock.clone(),
            policy.clone(),
        ));
        let ledger = InterestLedger::new(InMemoryInterestRepository::new(), store.clone());
        ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();
        let first = ledger
            .record_interest(&"bob".into(), &"alice".into(), &venue())
            .unwrap();
        let first_id = first.match_id().unwrap();

        clock.advance(policy.window_ms + 1);
        assert!(store.get_match(&first_id).unwrap().expired);

        let relike = ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();
        assert_eq!(relike, InterestOutcome::Pending);
        assert_eq!(store.repository().len(), 1, "no match without bob's consent");

        // bob liking again is fresh mutual consent
        let rematch = ledger
            .record_interest(&"bob".into(), &"alice".into(), &venue())
            .unwrap();
        assert!(matches!(rematch, InterestOutcome::Matched { created: true, .. }));
        assert_ne!(rematch.match_id(), Some(first_id));
        assert_eq!(store.repository().len(), 2);
    }

    #[test]
    fn test_interest_at_other_venue_does_not_match() {
        let ledger = InterestLedger::new(InMemoryInterestRepository::new(), store());
        ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap();
        let outcome = ledger
            .record_interest(&"bob".into(), &"alice".into(), &VenueRef::new("v2", "Elsewhere"))
            .unwrap();
        assert_eq!(outcome, InterestOutcome::Pending);
    }

    #[test]
    fn test_self_interest_rejected() {
        let ledger = InterestLedger::new(InMemoryInterestRepository::new(), store());
        let err = ledger
            .record_interest(&"alice".into(), &"alice".into(), &venue())
            .unwrap_err();
        assert!(matches!(err, EngineError::SelfInterest { .. }));
    }

    struct DownLedger;

    impl InterestRepository for DownLedger {
        fn put_if_absent(&self, _interest: Interest) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("interest ledger", "connection refused"))
        }

        fn contains(&self, _key: &InterestKey) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("interest ledger", "connection refused"))
        }

        fn consume(&self, _key: &InterestKey) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("interest ledger", "connection refused"))
        }
    }

    #[test]
    fn test_ledger_fault_propagates() {
        let store = Arc::new(
            MatchStore::new(
                InMemoryMatchRepository::new(),
                Arc::new(ManualClock::new(T0)),
                MatchPolicy::default(),
            )
            .with_retry(crate::retry::RetryPolicy::none()),
        );
        let ledger = InterestLedger::new(DownLedger, store);
        let err = ledger
            .record_interest(&"alice".into(), &"bob".into(), &venue())
            .unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
    }
}
