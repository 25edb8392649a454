//! Client Core: client-side read models
//!
//! Provides the realtime "matches involving me" view for a signed-in user:
//! - Two ownership-scoped subscriptions (participant A, participant B)
//! - Union keyed by match id
//! - Local staleness filter on the active window
//!
//! # Time
//! The view filters against an injected `Clock`, never the server flag
//! alone; the flag may lag the sweep.

pub mod view;

pub use view::{FeedEvent, FeedSink, FeedSubscription, MatchFeed, MatchView, MatchViewMerger};

/// Crate version constant
pub const CLIENT_CORE_VERSION: &str = "1.0.0";
