//! In-memory adapters
//!
//! `DashMap` entry guards are the per-key critical sections: a shard write
//! lock is held for the duration of `insert_unique` / `modify`, which gives
//! the same guarantees a transactional document store would.
//! Lock order is always `live_by_pair` before `matches`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use types::errors::StoreError;
use types::ids::{MatchId, PairKey, UserId, VenueRef};
use types::interest::{Interest, InterestKey};
use types::matches::{Match, ParticipantField};

use super::{CheckInDirectory, CounterStore, Insertion, InterestRepository, MatchRepository};

#[derive(Debug, Default)]
pub struct InMemoryMatchRepository {
    matches: DashMap<MatchId, Match>,
    /// Most recent match per pair; the unique-constraint index
    live_by_pair: DashMap<PairKey, MatchId>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Every match for a pair, oldest first. History is never deleted.
    pub fn history(&self, pair: &PairKey) -> Vec<Match> {
        let mut found: Vec<Match> = self
            .matches
            .iter()
            .filter(|entry| &entry.value().pair_key() == pair)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|m| (m.created_at, m.id));
        found
    }

    fn collect_ids<P>(&self, predicate: P) -> Vec<MatchId>
    where
        P: Fn(&Match) -> bool,
    {
        let mut ids: Vec<MatchId> = self
            .matches
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }
}

impl MatchRepository for InMemoryMatchRepository {
    fn get(&self, id: &MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.matches.get(id).map(|entry| entry.value().clone()))
    }

    fn insert_unique<F>(&self, candidate: Match, is_live: F) -> Result<Insertion, StoreError>
    where
        F: Fn(&Match) -> bool,
    {
        match self.live_by_pair.entry(candidate.pair_key()) {
            Entry::Occupied(mut slot) => {
                let current_id = *slot.get();
                let current = self.matches.get(&current_id).map(|m| m.value().clone());
                if let Some(current) = current.as_ref() {
                    if is_live(current) {
                        return Ok(Insertion {
                            record: current.clone(),
                            created: false,
                            superseded: None,
                        });
                    }
                }

                self.matches.insert(candidate.id, candidate.clone());
                slot.insert(candidate.id);
                Ok(Insertion {
                    record: candidate,
                    created: true,
                    superseded: current.map(|_| current_id),
                })
            }
            Entry::Vacant(slot) => {
                self.matches.insert(candidate.id, candidate.clone());
                slot.insert(candidate.id);
                Ok(Insertion {
                    record: candidate,
                    created: true,
                    superseded: None,
                })
            }
        }
    }

    fn modify<T, F>(&self, id: &MatchId, f: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&mut Match) -> T,
    {
        Ok(self
            .matches
            .get_mut(id)
            .map(|mut entry| f(entry.value_mut())))
    }

    fn find_by_participant(
        &self,
        field: ParticipantField,
        user: &UserId,
    ) -> Result<Vec<Match>, StoreError> {
        let mut found: Vec<Match> = self
            .matches
            .iter()
            .filter(|entry| entry.value().participant(field) == user)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|m| (m.created_at, m.id));
        Ok(found)
    }

    fn find_stale(&self, cutoff_ms: i64) -> Result<Vec<MatchId>, StoreError> {
        Ok(self.collect_ids(|m| !m.expired && m.created_at <= cutoff_ms))
    }

    fn find_purgeable(&self, cutoff_ms: i64) -> Result<Vec<MatchId>, StoreError> {
        Ok(self.collect_ids(|m| {
            m.expired && m.created_at <= cutoff_ms && m.messages_purged_at.is_none()
        }))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryInterestRepository {
    interests: DashMap<InterestKey, Interest>,
}

impl InMemoryInterestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.interests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }
}

impl InterestRepository for InMemoryInterestRepository {
    fn put_if_absent(&self, interest: Interest) -> Result<bool, StoreError> {
        match self.interests.entry(interest.key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(interest);
                Ok(true)
            }
        }
    }

    fn contains(&self, key: &InterestKey) -> Result<bool, StoreError> {
        Ok(self.interests.contains_key(key))
    }

    fn consume(&self, key: &InterestKey) -> Result<bool, StoreError> {
        Ok(self.interests.remove(key).is_some())
    }
}

/// Venue membership mirror fed by the check-in subsystem
#[derive(Debug, Default)]
pub struct InMemoryCheckIns {
    venues: DashMap<UserId, VenueRef>,
}

impl InMemoryCheckIns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_in(&self, user: UserId, venue: VenueRef) {
        self.venues.insert(user, venue);
    }

    pub fn check_out(&self, user: &UserId) -> Option<VenueRef> {
        self.venues.remove(user).map(|(_, venue)| venue)
    }
}

impl CheckInDirectory for InMemoryCheckIns {
    fn current_venue(&self, user: &UserId) -> Result<Option<VenueRef>, StoreError> {
        Ok(self.venues.get(user).map(|entry| entry.value().clone()))
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: i64,
    window_ms: i64,
    count: u32,
}

impl Window {
    fn lapsed(&self, now_ms: i64) -> bool {
        now_ms - self.started_at >= self.window_ms
    }
}

/// Increments between passes that drop lapsed windows
const EVICT_EVERY: u64 = 256;

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, Window>,
    increments: AtomicU64,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every window that has lapsed by `now_ms`. Returns how many went.
    pub fn evict_expired(&self, now_ms: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.lapsed(now_ms));
        before.saturating_sub(self.windows.len())
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, now_ms: i64, window_ms: i64) -> Result<u32, StoreError> {
        // no entry guard may be held across retain
        if self.increments.fetch_add(1, Ordering::Relaxed) % EVICT_EVERY == EVICT_EVERY - 1 {
            self.evict_expired(now_ms);
        }

        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            started_at: now_ms,
            window_ms,
            count: 0,
        });
        if window.lapsed(now_ms) {
            window.started_at = now_ms;
            window.count = 0;
        }
        window.window_ms = window_ms;
        window.count = window.count.saturating_add(1);
        Ok(window.count)
    }
}
