//! Unified error type for the Parley client.

use parley_presence::PresenceError;
use parley_protocol::ProtocolError;
use parley_transport::TransportError;

use crate::ConnectionState;

/// Top-level error that wraps all crate-specific errors.
///
/// Only operations called from the owning thread return this. Failures on
/// the network worker never surface as errors; they show up as a state
/// change (`Joining`, then `Off`) or as a dropped message in the log.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A signaling grammar or envelope error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A presence table error (unknown peer, invalid id).
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// The operation is only allowed while the connection is off.
    #[error("operation requires the connection to be off (currently {0})")]
    NotIdle(ConnectionState),

    /// The configuration was rejected by validation or parsing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The client's runtime could not be started.
    #[error("failed to start network runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use parley_protocol::PeerId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: ParleyError = TransportError::LoginRejected("nick taken".into()).into();
        assert!(matches!(err, ParleyError::Transport(_)));
        assert!(err.to_string().contains("nick taken"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: ParleyError = ProtocolError::Rejected.into();
        assert!(matches!(err, ParleyError::Protocol(_)));
    }

    #[test]
    fn test_from_presence_error() {
        let err: ParleyError = PresenceError::UnknownPeer(PeerId(9)).into();
        assert!(matches!(err, ParleyError::Presence(_)));
    }

    #[test]
    fn test_not_idle_names_current_state() {
        let err = ParleyError::NotIdle(ConnectionState::Running);
        assert!(err.to_string().contains("running"));
    }
}
