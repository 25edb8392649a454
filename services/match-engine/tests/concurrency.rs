//! Concurrency test
//!
//! Races the two serialization points of the engine from plain threads:
//! mirrored likes must converge on one match, and concurrent sends from one
//! sender must never overshoot the quota.

use std::sync::{Arc, Barrier};
use std::thread;

use match_engine::repository::{InMemoryInterestRepository, InMemoryMatchRepository};
use match_engine::{InterestLedger, MatchStore};
use proptest::prelude::*;
use types::clock::ManualClock;
use types::errors::EngineError;
use types::ids::{UserId, VenueRef};
use types::policy::MatchPolicy;

const T0: i64 = 1_708_123_456_789;

fn store(policy: MatchPolicy) -> Arc<MatchStore<InMemoryMatchRepository>> {
    Arc::new(MatchStore::new(
        InMemoryMatchRepository::new(),
        Arc::new(ManualClock::new(T0)),
        policy,
    ))
}

fn venue() -> VenueRef {
    VenueRef::new("v1", "The Anchor")
}

#[test]
fn test_simultaneous_mutual_likes_create_one_match() {
    for _ in 0..50 {
        let store = store(MatchPolicy::default());
        let ledger = Arc::new(InterestLedger::new(
            InMemoryInterestRepository::new(),
            store.clone(),
        ));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [("alice", "bob"), ("bob", "alice")]
            .into_iter()
            .map(|(from, to)| {
                let ledger = ledger.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    ledger
                        .record_interest(&UserId::new(from), &UserId::new(to), &venue())
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ids: Vec<_> = outcomes.iter().filter_map(|o| o.match_id()).collect();

        // at least one side always sees the mirror
        assert!(!ids.is_empty());
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.repository().len(), 1);
        assert!(ledger.interests().is_empty());
    }
}

#[test]
fn test_concurrent_creates_converge() {
    let store = store(MatchPolicy::default());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (u1, u2) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
                barrier.wait();
                store
                    .create_match(&UserId::new(u1), &UserId::new(u2), &venue())
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
    assert!(outcomes.iter().all(|o| o.match_id == outcomes[0].match_id));
}

#[test]
fn test_concurrent_sends_never_exceed_quota() {
    let store = store(MatchPolicy::default());
    let match_id = store
        .create_match(&UserId::new("alice"), &UserId::new("bob"), &venue())
        .unwrap()
        .match_id;
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.send_message(&match_id, &UserId::new("alice"), &format!("msg {}", i))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::QuotaExceeded { .. })))
        .count();

    assert_eq!(accepted, 3);
    assert_eq!(rejected, 13);
    let record = store.get_match(&match_id).unwrap();
    assert_eq!(record.messages.len(), 3);
    assert_eq!(record.messages_sent_by(&UserId::new("alice")), 3);
}

proptest! {
    #[test]
    fn quota_is_exact_for_any_send_sequence(
        quota in 1u32..8,
        senders in prop::collection::vec(any::<bool>(), 0..40),
    ) {
        let store = store(MatchPolicy { message_quota: quota, ..MatchPolicy::default() });
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let match_id = store.create_match(&alice, &bob, &venue()).unwrap().match_id;

        for (i, is_alice) in senders.iter().enumerate() {
            let sender = if *is_alice { &alice } else { &bob };
            let before = store.get_match(&match_id).unwrap();
            let result = store.send_message(&match_id, sender, &format!("m{}", i));

            if before.messages_sent_by(sender) < quota {
                prop_assert!(result.is_ok());
            } else {
                let rejected = matches!(result, Err(EngineError::QuotaExceeded { .. }));
                prop_assert!(rejected);
                let after = store.get_match(&match_id).unwrap();
                prop_assert_eq!(after.messages.len(), before.messages.len());
            }
        }

        let record = store.get_match(&match_id).unwrap();
        prop_assert!(record.messages_sent_by(&alice) <= quota);
        prop_assert!(record.messages_sent_by(&bob) <= quota);
    }
}
