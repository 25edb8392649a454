//! Realtime View Merger
//!
//! The backing store only answers equality queries on a single field, so
//! "matches involving me" is two live queries unioned locally. Each query
//! owns a result slot; any update from either side recomputes the union.
//!
//! A failing query leaves its slot empty and surfaces its error while the
//! other slot keeps rendering. `retry` tears both listeners down before
//! establishing new ones, and a generation counter makes late callbacks
//! from torn-down listeners no-ops.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};
use types::clock::Clock;
use types::ids::{MatchId, UserId};
use types::matches::{Match, ParticipantField};

// ---------------------------------------------------------------------------
// Feed seam
// ---------------------------------------------------------------------------

/// Update delivered by a live query
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full current result set of the query
    Snapshot(Vec<Match>),
    /// The query failed; the listener stays registered
    Error(String),
}

/// Callback invoked by the feed for every update
pub type FeedSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// Realtime equality queries over `matches/{id}`
pub trait MatchFeed: Send + Sync {
    /// Listen to matches where `field == user`.
    fn subscribe(&self, field: ParticipantField, user: &UserId, sink: FeedSink) -> FeedSubscription;
}

/// Handle to a registered listener. Unsubscribes on drop.
pub struct FeedSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// What the UI renders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    /// Active matches, newest first
    pub matches: Vec<Match>,
    /// Matches past their window (flagged or not), newest first
    pub expired: Vec<Match>,
    /// True until both queries have reported at least once
    pub loading: bool,
    /// Errors from failing queries, if any
    pub error: Option<String>,
}

#[derive(Default)]
enum Slot {
    #[default]
    Pending,
    Ready(Vec<Match>),
    Failed(String),
}

struct State {
    generation: u64,
    slots: [Slot; 2],
    subscriptions: Vec<FeedSubscription>,
}

struct Shared {
    state: Mutex<State>,
    view: watch::Sender<MatchView>,
    clock: Arc<dyn Clock>,
    window_ms: i64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // slot data stays consistent even if a sink panicked mid-update
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        let view = merge(&state.slots, self.clock.now_ms(), self.window_ms);
        self.view.send_replace(view);
    }
}

fn slot_index(field: ParticipantField) -> usize {
    match field {
        ParticipantField::A => 0,
        ParticipantField::B => 1,
    }
}

/// Union both slots keyed by id, then split on the staleness filter.
fn merge(slots: &[Slot; 2], now_ms: i64, window_ms: i64) -> MatchView {
    let mut union: BTreeMap<MatchId, &Match> = BTreeMap::new();
    let mut errors = Vec::new();
    let mut loading = false;

    for slot in slots {
        match slot {
            Slot::Pending => loading = true,
            Slot::Ready(records) => {
                for record in records {
                    union.insert(record.id, record);
                }
            }
            Slot::Failed(err) => errors.push(err.as_str()),
        }
    }

    let (mut expired, mut matches): (Vec<Match>, Vec<Match>) = union
        .into_values()
        .cloned()
        .partition(|record| record.is_expired_at(now_ms, window_ms));

    let newest_first = |a: &Match, b: &Match| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    };
    matches.sort_by(newest_first);
    expired.sort_by(newest_first);

    MatchView {
        matches,
        expired,
        loading,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    }
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Live "matches involving me" for one user
pub struct MatchViewMerger<F> {
    feed: F,
    user: UserId,
    shared: Arc<Shared>,
}

impl<F: MatchFeed> MatchViewMerger<F> {
    /// Subscribe both queries immediately.
    pub fn start(feed: F, user: UserId, clock: Arc<dyn Clock>, window_ms: i64) -> Self {
        let (view, _) = watch::channel(MatchView {
            loading: true,
            ..MatchView::default()
        });
        let merger = Self {
            feed,
            user,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    generation: 0,
                    slots: Default::default(),
                    subscriptions: Vec::new(),
                }),
                view,
                clock,
                window_ms,
            }),
        };
        merger.resubscribe();
        merger
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Receiver that observes every published view.
    pub fn subscribe(&self) -> watch::Receiver<MatchView> {
        self.shared.view.subscribe()
    }

    /// Latest published view.
    pub fn view(&self) -> MatchView {
        self.shared.view.borrow().clone()
    }

    /// Re-establish both subscriptions. Old listeners are removed first.
    pub fn retry(&self) {
        debug!(user = %self.user, "retrying match view subscriptions");
        self.resubscribe();
    }

    /// Re-apply the staleness filter against the current time.
    pub fn refresh(&self) {
        let state = self.shared.lock();
        self.shared.publish(&state);
    }

    /// Remove both listeners. Callbacks arriving afterwards are ignored.
    pub fn teardown(&self) {
        let stale = {
            let mut state = self.shared.lock();
            state.generation += 1;
            std::mem::take(&mut state.subscriptions)
        };
        for subscription in stale {
            subscription.unsubscribe();
        }
        debug!(user = %self.user, "match view torn down");
    }

    fn resubscribe(&self) {
        let generation = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.slots = Default::default();
            let stale = std::mem::take(&mut state.subscriptions);
            self.shared.publish(&state);
            let generation = state.generation;
            drop(state);
            for subscription in stale {
                subscription.unsubscribe();
            }
            generation
        };

        // the feed may deliver synchronously, so no lock is held here
        let fresh: Vec<FeedSubscription> = ParticipantField::both()
            .into_iter()
            .map(|field| {
                let sink = self.sink(field, generation);
                self.feed.subscribe(field, &self.user, sink)
            })
            .collect();

        let mut state = self.shared.lock();
        if state.generation == generation {
            state.subscriptions = fresh;
        } else {
            // torn down or retried while subscribing
            drop(state);
            for subscription in fresh {
                subscription.unsubscribe();
            }
        }
    }

    fn sink(&self, field: ParticipantField, generation: u64) -> FeedSink {
        let shared = Arc::downgrade(&self.shared);
        let user = self.user.clone();
        Arc::new(move |event: FeedEvent| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.lock();
            if state.generation != generation {
                return;
            }
            let slot = &mut state.slots[slot_index(field)];
            match event {
                FeedEvent::Snapshot(records) => {
                    debug!(user = %user, field = field.as_str(), count = records.len(), "match snapshot");
                    *slot = Slot::Ready(records);
                }
                FeedEvent::Error(err) => {
                    warn!(user = %user, field = field.as_str(), error = %err, "match query failed");
                    *slot = Slot::Failed(err);
                }
            }
            shared.publish(&state);
        })
    }
}

impl<F> Drop for MatchViewMerger<F> {
    fn drop(&mut self) {
        let stale = {
            let mut state = self.shared.lock();
            state.generation += 1;
            std::mem::take(&mut state.subscriptions)
        };
        drop(stale);
    }
}
