//! Presence state for Parley.
//!
//! This crate holds everything that describes "who is around":
//!
//! 1. **Local identity**: our numeric id and names ([`IdentityManager`])
//! 2. **Peers**: the live remote participants ([`PeerRegistry`])
//! 3. **Shared state**: what we tell peers about ourselves in every
//!    heartbeat ([`GameStatePublisher`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client layer (above)  ← applies decoded signaling to these tables
//!     ↕
//! Presence layer (this crate)  ← identity, peer table, shared state
//!     ↕
//! Protocol layer (below)  ← provides PeerId, SignalMessage
//! ```
//!
//! Each table guards itself with its own lock; there is no global lock.

mod error;
mod identity;
mod publisher;
mod registry;
mod timer;

pub use error::PresenceError;
pub use identity::{IdentityManager, LocalIdentity, random_id};
pub use publisher::{DEFAULT_HEARTBEAT_INTERVAL, GameStatePublisher, SharedGameState};
pub use registry::{
    DEFAULT_PEER_TIMEOUT, PeerRecord, PeerRegistry, PeerSnapshot, UNKNOWN_PARTY_SIZE,
};
pub use timer::IntervalTimer;
