//! Types library for the match lifecycle engine
//!
//! Shared type definitions used by the engine, the HTTP gateway and the
//! client read model, so every layer agrees on ids, timestamps and the
//! error taxonomy.
//!
//! # Modules
//! - `ids`: Identifiers (MatchId, MessageId, UserId, VenueId, PairKey)
//! - `interest`: One-directional interest facts
//! - `matches`: Match record, messages, reconnect state
//! - `policy`: Window, quota and reconnect tunables
//! - `clock`: Epoch-millisecond time sources
//! - `errors`: Error taxonomy

pub mod clock;
pub mod errors;
pub mod ids;
pub mod interest;
pub mod matches;
pub mod policy;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::interest::*;
    pub use crate::matches::*;
    pub use crate::policy::*;
}
