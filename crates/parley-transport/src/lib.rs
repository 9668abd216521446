//! Transport abstraction layer for Parley.
//!
//! Parley does not speak a chat protocol itself. It drives an existing
//! text-channel client through the [`ChatTransport`] trait: connect,
//! log in, send raw lines, and receive parsed [`ChatMessage`]s.
//!
//! # Feature Flags
//!
//! - `testing`: [`MemoryNetwork`], an in-process chat network whose
//!   transports route `JOIN`/`MODE`/`PRIVMSG` lines between members.

mod error;
#[cfg(any(test, feature = "testing"))]
mod memory;
mod message;

pub use error::TransportError;
#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryNetwork, MemoryTransport};
pub use message::{ChatMessage, Command};

use std::future::Future;

/// A client connection to a text-channel chat network.
///
/// One transport instance is reused across connection attempts: the
/// supervisor calls `init`, `connect` and `login` at the start of every
/// attempt and `disconnect` at the end.
///
/// # Cancellation
///
/// [`recv`](Self::recv) is the only long-pending call. Calling
/// [`disconnect`](Self::disconnect) from another task MUST make a pending
/// `recv` return `Ok(None)` promptly; the supervisor relies on this to
/// stop its worker.
///
/// The futures are declared `Send` so the supervisor can run them on a
/// multi-threaded runtime. Implementations may still use `async fn`.
pub trait ChatTransport: Send + Sync + 'static {
    /// Prepares the transport for a new connection attempt.
    fn init(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolves `address` and connects to it.
    fn connect(
        &self,
        address: &str,
        port: u16,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Registers with the server under `nick` / `user`.
    fn login(
        &self,
        nick: &str,
        user: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends one raw line (without the trailing CRLF).
    fn send_line(
        &self,
        line: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next inbound message.
    ///
    /// Returns `Ok(None)` once the connection is closed, either by the
    /// remote end or by [`disconnect`](Self::disconnect).
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<ChatMessage>, TransportError>> + Send;

    /// Whether the connection is currently up.
    fn is_connected(&self) -> bool;

    /// Force-closes the connection. Idempotent.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}
