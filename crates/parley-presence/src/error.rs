//! Error types for the presence layer.

use parley_protocol::PeerId;

/// Errors that can occur while updating presence state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    /// A heartbeat named a peer that never announced itself.
    /// Presence must first be established with a signon or auth.
    #[error("no announced peer {0}")]
    UnknownPeer(PeerId),

    /// An id outside `PeerId::MIN..=PeerId::MAX` was supplied.
    #[error("peer id {0} is out of range")]
    InvalidPeerId(u32),
}
