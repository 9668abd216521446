//! Connection configuration.
//!
//! A [`ConnectionConfig`] describes one chat network, the two channels the
//! client uses on it, and who we are. It is fixed for the lifetime of a
//! connection attempt and can only be replaced while the client is off.
//!
//! Binaries usually load it from JSON; every field has a default, so a
//! file only needs the values it changes:
//!
//! ```json
//! {
//!     "nickname": "alice",
//!     "presence_channel": "#lobby",
//!     "control_channel": "#lobby-ctl",
//!     "control_secret": "hunter2",
//!     "server_address": "chat.example.net"
//! }
//! ```

use std::time::Duration;

use parley_protocol::DEFAULT_KEY_TAG;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ParleyError;

/// The usual plaintext port of a chat server.
pub const DEFAULT_SERVER_PORT: u16 = 6667;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Timers driving the presence protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between a successful login and joining the channels.
    pub join_delay_ms: u64,
    /// How often the local shared state is broadcast.
    pub heartbeat_interval_ms: u64,
    /// A peer silent for this long is evicted.
    pub peer_timeout_secs: u64,
    /// Minimum gap between two re-announces requested by peers.
    pub reauth_interval_ms: u64,
    /// How long `disconnect()` waits for the worker before aborting it.
    pub worker_join_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            join_delay_ms: 1_000,
            heartbeat_interval_ms: 5_000,
            peer_timeout_secs: 10,
            reauth_interval_ms: 1_000,
            worker_join_timeout_ms: 2_000,
        }
    }
}

impl TimingConfig {
    /// Fixes values that would break the protocol.
    ///
    /// - `peer_timeout_secs` of 0 would evict every peer on every tick; it
    ///   is raised to 1.
    /// - `worker_join_timeout_ms` of 0 would abort every worker without
    ///   giving it a chance to exit; it is raised to 1.
    pub fn validated(mut self) -> Self {
        if self.peer_timeout_secs == 0 {
            warn!("peer_timeout_secs is 0; using 1");
            self.peer_timeout_secs = 1;
        }
        if self.worker_join_timeout_ms == 0 {
            warn!("worker_join_timeout_ms is 0; using 1");
            self.worker_join_timeout_ms = 1;
        }
        self
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn reauth_interval(&self) -> Duration {
        Duration::from_millis(self.reauth_interval_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Everything needed to bring a connection up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Display nickname. The login nick is `<nickname>-<id>`.
    pub nickname: String,
    /// Chat user name.
    pub username: String,
    /// The ordinary, user-visible channel.
    pub presence_channel: String,
    /// The secret-gated signaling channel. `None` disables control mode.
    pub control_channel: Option<String>,
    /// Key protecting the control channel.
    pub control_secret: Option<String>,
    pub server_address: String,
    pub server_port: u16,
    /// Announce ourselves as automated in `cc_auth`.
    pub is_bot: bool,
    /// Key tag handed to the cipher when sealing.
    pub key_tag: char,
    pub timing: TimingConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            nickname: "parley".into(),
            username: "parley".into(),
            presence_channel: "#parley".into(),
            control_channel: None,
            control_secret: None,
            server_address: "localhost".into(),
            server_port: DEFAULT_SERVER_PORT,
            is_bot: false,
            key_tag: DEFAULT_KEY_TAG,
            timing: TimingConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// A config for `nickname` on `server_address`, other fields default.
    pub fn new(nickname: impl Into<String>, server_address: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Self {
            username: nickname.clone(),
            nickname,
            server_address: server_address.into(),
            ..Default::default()
        }
    }

    /// Sets the presence channel.
    pub fn with_presence_channel(mut self, channel: impl Into<String>) -> Self {
        self.presence_channel = channel.into();
        self
    }

    /// Enables control mode on `channel`, optionally keyed with `secret`.
    pub fn with_control_channel(
        mut self,
        channel: impl Into<String>,
        secret: Option<String>,
    ) -> Self {
        self.control_channel = Some(channel.into());
        self.control_secret = secret;
        self
    }

    /// Parses a JSON config. The result still needs [`validated`](Self::validated).
    ///
    /// # Errors
    /// Returns [`ParleyError::InvalidConfig`] if the JSON does not parse.
    pub fn from_json(text: &str) -> Result<Self, ParleyError> {
        serde_json::from_str(text).map_err(|e| ParleyError::InvalidConfig(e.to_string()))
    }

    /// Normalizes the config and rejects values the client cannot use.
    ///
    /// Spaces in the nickname and username become `_`; an empty control channel or
    /// secret becomes `None`; timing values are fixed up by
    /// [`TimingConfig::validated`].
    ///
    /// # Errors
    /// Returns [`ParleyError::InvalidConfig`] for an empty nickname,
    /// username, presence channel or server address, a port of 0, or a
    /// channel name or secret containing whitespace.
    pub fn validated(mut self) -> Result<Self, ParleyError> {
        self.nickname = self.nickname.trim().replace(' ', "_");
        self.username = self.username.trim().replace(' ', "_");
        self.control_channel = self.control_channel.filter(|c| !c.trim().is_empty());
        self.control_secret = self.control_secret.filter(|s| !s.is_empty());

        require_non_empty("nickname", &self.nickname)?;
        require_non_empty("username", &self.username)?;
        require_non_empty("presence_channel", &self.presence_channel)?;
        require_non_empty("server_address", &self.server_address)?;
        if self.server_port == 0 {
            return Err(ParleyError::InvalidConfig("server_port must not be 0".into()));
        }

        require_single_word("nickname", &self.nickname)?;
        require_single_word("username", &self.username)?;
        require_single_word("presence_channel", &self.presence_channel)?;
        if let Some(channel) = &self.control_channel {
            require_single_word("control_channel", channel)?;
        }
        if let Some(secret) = &self.control_secret {
            require_single_word("control_secret", secret)?;
        }

        self.timing = self.timing.validated();
        Ok(self)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ParleyError> {
    if value.trim().is_empty() {
        return Err(ParleyError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Values end up inside raw command lines, so they cannot contain
/// whitespace.
fn require_single_word(field: &str, value: &str) -> Result<(), ParleyError> {
    if value.chars().any(char::is_whitespace) {
        return Err(ParleyError::InvalidConfig(format!(
            "{field} must not contain whitespace: {value:?}"
        )));
    }
    Ok(())
}
