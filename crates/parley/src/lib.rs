//! # Parley
//!
//! Peer presence and lightweight state sharing for application instances
//! (typically game clients) that already sit on a text-channel chat
//! network.
//!
//! Every instance joins a public *presence channel* and, optionally, a
//! secret-gated *control channel*. On the control channel instances
//! announce themselves, send periodic heartbeats carrying a small shared
//! state, and keep a table of the peers that are currently alive.
//!
//! ## Layers
//!
//! ```text
//! parley            ← ParleyClient, ConnectionSupervisor, dispatch table
//!   ↕
//! parley-presence   ← PeerRegistry, IdentityManager, GameStatePublisher
//!   ↕
//! parley-protocol   ← SignalMessage grammar, SignalCodec, EnvelopeCipher
//!   ↕
//! parley-transport  ← ChatTransport trait, ChatMessage, Command
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! parley::init_logging("info");
//! let config = ConnectionConfig::new("alice", "chat.example.net")
//!     .with_control_channel("#lobby-ctl", Some("hunter2".into()));
//! let mut client = ParleyClient::new(my_transport, PlaintextCipher, config)?;
//! client.connect();
//! loop {
//!     client.tick();
//!     // read client.peers(), update client.set_shared_state(..)
//! }
//! ```

mod client;
mod config;
mod control;
mod dispatch;
mod error;
mod logging;
mod state;
mod supervisor;

pub use client::{MessageTarget, ParleyClient};
pub use config::{ConnectionConfig, DEFAULT_SERVER_PORT, TimingConfig};
pub use dispatch::{CommandDispatchTable, DispatchReport, HandlerError, HandlerResult};
pub use error::ParleyError;
pub use logging::{DEFAULT_LOG_DIRECTIVE, init_logging};
pub use state::ConnectionState;

pub use parley_presence as presence;
pub use parley_protocol as protocol;
pub use parley_transport as transport;

/// Convenience re-exports for application code.
pub mod prelude {
    pub use crate::{
        ConnectionConfig, ConnectionState, HandlerResult, MessageTarget, ParleyClient,
        ParleyError, TimingConfig,
    };
    pub use parley_presence::{LocalIdentity, PeerRecord, PeerSnapshot, SharedGameState};
    pub use parley_protocol::{EnvelopeCipher, PeerId, PlaintextCipher, SignalMessage};
    pub use parley_transport::{ChatMessage, ChatTransport, TransportError};
}
