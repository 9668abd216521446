//! [`ParleyClient`], the application-facing surface.
//!
//! The client is owned by one application thread. Every method returns
//! immediately except [`disconnect`](ParleyClient::disconnect), which
//! waits (bounded) for the network worker to exit. Connection progress is
//! observed through [`state`](ParleyClient::state) and
//! [`peers`](ParleyClient::peers), and advanced by calling
//! [`tick`](ParleyClient::tick) often relative to the heartbeat interval.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ConnectionConfig::new("alice", "chat.example.net")
//!     .with_control_channel("#lobby-ctl", Some("hunter2".into()));
//! let mut client = ParleyClient::new(transport, PlaintextCipher, config)?;
//! client.connect();
//! loop {
//!     client.tick();
//!     for (id, peer) in client.peers() {
//!         println!("{id}: {} party={}", peer.nickname, peer.party_size);
//!     }
//!     std::thread::sleep(Duration::from_millis(250));
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use parley_presence::{LocalIdentity, PeerSnapshot, SharedGameState};
use parley_protocol::{EnvelopeCipher, PeerId, PlaintextCipher};
use parley_transport::{ChatMessage, ChatTransport, Command};
use tracing::debug;

use crate::dispatch::HandlerResult;
use crate::supervisor::{ConnectionSupervisor, Shared};
use crate::{ConnectionConfig, ConnectionState, ParleyError};

/// Where [`ParleyClient::send_message`] sends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    /// The user-visible presence channel.
    Presence,
    /// The control channel, if configured.
    Control,
}

/// A presence client on one chat network.
pub struct ParleyClient<T: ChatTransport, C: EnvelopeCipher = PlaintextCipher> {
    supervisor: ConnectionSupervisor<T, C>,
}

impl<T: ChatTransport, C: EnvelopeCipher> ParleyClient<T, C> {
    /// Creates a client in state `Off` with a fresh local identity.
    ///
    /// # Errors
    /// - [`ParleyError::InvalidConfig`] if `config` fails validation
    /// - [`ParleyError::Runtime`] if the network runtime cannot start
    pub fn new(transport: T, cipher: C, config: ConnectionConfig) -> Result<Self, ParleyError> {
        let config = config.validated()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("parley-net")
            .enable_all()
            .build()
            .map_err(ParleyError::Runtime)?;

        let shared = Shared::new(transport, cipher, config);
        debug!(id = %shared.identity.id(), "client created");
        Ok(Self {
            supervisor: ConnectionSupervisor::new(shared, runtime),
        })
    }

    // --- Lifecycle ---

    /// Starts connecting. No-op unless the state is `Off`.
    ///
    /// Also arms auto-restart: until [`disconnect`](Self::disconnect),
    /// every failed or dropped connection is retried on the next tick.
    pub fn connect(&mut self) {
        self.supervisor.connect();
    }

    /// Stops the connection and waits for the worker to exit.
    pub fn disconnect(&mut self) {
        self.supervisor.disconnect();
    }

    /// Advances timers using the current time. See [`tick_at`](Self::tick_at).
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Restarts a failed connection, emits a due heartbeat and evicts
    /// peers silent for longer than the peer timeout, all relative to
    /// `now`.
    pub fn tick_at(&mut self, now: Instant) {
        self.supervisor.tick(now);
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Whether the client wants to be connected (auto-restart armed).
    pub fn should_run(&self) -> bool {
        self.supervisor.should_run()
    }

    /// Whether the control channel was joined on the current connection.
    pub fn is_control_active(&self) -> bool {
        self.supervisor.shared().is_control_active()
    }

    // --- Configuration and identity ---

    /// A read-only view of the current configuration.
    pub fn config(&self) -> Arc<ConnectionConfig> {
        self.supervisor.shared().config()
    }

    /// Replaces the configuration and draws a new local identity.
    ///
    /// # Errors
    /// - [`ParleyError::NotIdle`] unless the state is `Off`
    /// - [`ParleyError::InvalidConfig`] if `config` fails validation
    pub fn update_config(&mut self, config: ConnectionConfig) -> Result<(), ParleyError> {
        self.require_off()?;
        let config = config.validated()?;
        let shared = self.supervisor.shared();

        shared.codec.write().set_key_tag(config.key_tag);
        shared
            .publisher
            .set_interval(config.timing.heartbeat_interval());
        shared
            .control
            .set_reauth_interval(config.timing.reauth_interval());

        let id = shared
            .identity
            .reset(&config.nickname, &config.username, config.is_bot);
        if shared.registry.contains(id) {
            shared.identity.regenerate(|id| shared.registry.contains(id));
        }
        *shared.config.write() = Arc::new(config);
        debug!(id = %shared.identity.id(), "configuration applied");
        Ok(())
    }

    /// A copy of the local identity.
    pub fn local_identity(&self) -> LocalIdentity {
        self.supervisor.shared().identity.current()
    }

    /// Uses `id` as the local id from the next connection on.
    ///
    /// Any peer record under `id` is dropped, since the registry never
    /// holds our own id.
    ///
    /// # Errors
    /// - [`ParleyError::NotIdle`] unless the state is `Off`
    /// - [`ParleyError::Presence`] if `id` is out of range
    pub fn set_local_id(&mut self, id: PeerId) -> Result<(), ParleyError> {
        self.require_off()?;
        let shared = self.supervisor.shared();
        shared.identity.assign(id)?;
        shared.registry.remove(id);
        Ok(())
    }

    // --- Presence ---

    /// A snapshot of the live peers, keyed by id.
    pub fn peers(&self) -> PeerSnapshot {
        self.supervisor.shared().registry.snapshot()
    }

    /// Replaces the state sent in our heartbeats.
    pub fn set_shared_state(&self, state: SharedGameState) {
        self.supervisor.shared().publisher.set(state);
    }

    pub fn shared_state(&self) -> SharedGameState {
        self.supervisor.shared().publisher.get()
    }

    // --- Extension and raw traffic ---

    /// Registers `handler` for every inbound message whose command is
    /// `command`.
    ///
    /// Handlers run on the network worker, before control-channel
    /// interpretation, and see every message, including sealed control
    /// traffic. Errors and panics are logged and do not affect other
    /// handlers.
    pub fn install_callback<F>(&self, command: impl Into<String>, handler: F)
    where
        F: Fn(&ChatMessage) -> HandlerResult + Send + Sync + 'static,
    {
        self.supervisor.shared().dispatch.install(command, handler);
    }

    /// Queues a raw line for sending.
    ///
    /// Returns `false` (and sends nothing) for an empty line or when the
    /// connection is not `Running`.
    pub fn send_raw(&self, line: impl Into<String>) -> bool {
        let line = line.into();
        if line.is_empty() || self.state() != ConnectionState::Running {
            return false;
        }
        let shared = Arc::clone(self.supervisor.shared());
        self.supervisor.spawn(async move {
            shared.send_raw(&line).await;
        });
        true
    }

    /// Seals `text` with the cipher and sends it to `target`.
    ///
    /// Returns `false` if nothing was queued: not `Running`, or the
    /// control channel was requested but none is configured.
    pub fn send_message(&self, text: &str, target: MessageTarget) -> bool {
        let config = self.config();
        let channel = match target {
            MessageTarget::Presence => config.presence_channel.clone(),
            MessageTarget::Control => match &config.control_channel {
                Some(channel) => channel.clone(),
                None => return false,
            },
        };
        let sealed = self.supervisor.shared().codec.read().seal_text(text);
        self.send_raw(
            Command::Privmsg {
                target: channel,
                text: sealed,
            }
            .to_string(),
        )
    }

    fn require_off(&self) -> Result<(), ParleyError> {
        match self.state() {
            ConnectionState::Off => Ok(()),
            state => Err(ParleyError::NotIdle(state)),
        }
    }
}

impl<T: ChatTransport, C: EnvelopeCipher> std::fmt::Debug for ParleyClient<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyClient")
            .field("state", &self.state())
            .field("id", &self.local_identity().id)
            .field("peers", &self.peers().len())
            .finish()
    }
}
