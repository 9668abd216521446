/// Errors that can occur in the transport layer.
///
/// Every variant is non-fatal to the caller: the connection supervisor
/// turns any of these into a state transition and retries later.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be initialized (socket creation, options).
    #[error("transport init failed: {0}")]
    InitFailed(String),

    /// The server address could not be resolved.
    #[error("could not resolve {0}")]
    ResolveFailed(String),

    /// Connecting to the server failed.
    #[error("connect to {address}:{port} failed: {reason}")]
    ConnectFailed {
        address: String,
        port: u16,
        reason: String,
    },

    /// The server rejected the login (nick in use, banned, ...).
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// An operation needed a live connection but there is none.
    #[error("not connected")]
    NotConnected,

    /// Sending a line failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
