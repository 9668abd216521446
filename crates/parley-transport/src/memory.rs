//! In-process chat network for tests and demos.
//!
//! A [`MemoryNetwork`] is a tiny fake chat server: each [`MemoryTransport`]
//! created from it becomes a member once it connects, joins channels with
//! `JOIN` lines, and receives every `PRIVMSG` other members send to those
//! channels. Channel keys set with `MODE <chan> +k <key>` gate later joins.
//!
//! The network also records every line sent through it and offers knobs
//! to simulate failures (refused connections, rejected logins, dropped
//! links).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{ChatMessage, ChatTransport, Command, TransportError};

/// Shared state behind every handle to the same network.
#[derive(Default)]
struct NetworkState {
    next_member: u64,
    members: HashMap<u64, Member>,
    /// Channel name (lowercase) → key set with `MODE +k`.
    keys: HashMap<String, String>,
    /// Channel name (lowercase) → simple mode letters (`s`, `n`, ...).
    modes: HashMap<String, BTreeSet<char>>,
    refuse_connect: bool,
    refuse_login: bool,
    /// Simulated round trip before `connect` registers the member.
    connect_delay: Duration,
    /// Simulated round trip before `login` answers.
    login_delay: Duration,
    /// Every line sent by any member, as `(nick, line)`.
    sent: Vec<(String, String)>,
}

struct Member {
    nick: String,
    channels: HashSet<String>,
    inbox: mpsc::UnboundedSender<ChatMessage>,
}

impl NetworkState {
    /// Delivers a channel message to every member of `channel` except
    /// `from_member`. Returns how many members received it.
    fn deliver(
        &self,
        channel: &str,
        sender: &str,
        text: &str,
        from_member: Option<u64>,
    ) -> usize {
        let key = channel.to_ascii_lowercase();
        let mut delivered = 0;
        for (id, member) in &self.members {
            if Some(*id) == from_member || !member.channels.contains(&key) {
                continue;
            }
            let msg = ChatMessage::privmsg(sender, channel, text);
            if member.inbox.send(msg).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn apply(&mut self, member_id: u64, command: Command) {
        match command {
            Command::Join { channel, key } => {
                let name = channel.to_ascii_lowercase();
                if let Some(expected) = self.keys.get(&name) {
                    if key.as_deref() != Some(expected.as_str()) {
                        tracing::debug!(%channel, "join refused: bad channel key");
                        return;
                    }
                }
                if let Some(member) = self.members.get_mut(&member_id) {
                    member.channels.insert(name);
                }
            }
            Command::Mode {
                channel,
                flags,
                arg,
            } => {
                let name = channel.to_ascii_lowercase();
                let joined = self
                    .members
                    .get(&member_id)
                    .is_some_and(|m| m.channels.contains(&name));
                if !joined {
                    return;
                }
                let adding = !flags.starts_with('-');
                for flag in flags.chars().filter(|c| c.is_ascii_alphabetic()) {
                    match (flag, adding, &arg) {
                        ('k', true, Some(key)) => {
                            self.keys.insert(name.clone(), key.clone());
                        }
                        ('k', false, _) => {
                            self.keys.remove(&name);
                        }
                        (other, true, _) => {
                            self.modes.entry(name.clone()).or_default().insert(other);
                        }
                        (other, false, _) => {
                            if let Some(set) = self.modes.get_mut(&name) {
                                set.remove(&other);
                            }
                        }
                    }
                }
            }
            Command::Privmsg { target, text } => {
                let Some(member) = self.members.get(&member_id) else {
                    return;
                };
                // Members may only talk in channels they joined.
                if !member.channels.contains(&target.to_ascii_lowercase()) {
                    return;
                }
                let nick = member.nick.clone();
                self.deliver(&target, &nick, &text, Some(member_id));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryNetwork
// ---------------------------------------------------------------------------

/// Handle to an in-process chat network. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport attached to this network (not yet connected).
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            state: Arc::clone(&self.state),
            member: Mutex::new(None),
            inbox: tokio::sync::Mutex::new(None),
        }
    }

    /// Makes subsequent `connect` calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connect = refuse;
    }

    /// Makes subsequent `login` calls fail.
    pub fn refuse_logins(&self, refuse: bool) {
        self.state.lock().refuse_login = refuse;
    }

    /// Makes `connect` take `delay` before the member appears on the
    /// network, like a slow server handshake.
    pub fn delay_connections(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Makes `login` take `delay` before it is answered.
    pub fn delay_logins(&self, delay: Duration) {
        self.state.lock().login_delay = delay;
    }

    /// Delivers a `PRIVMSG` from `sender` to every member of `channel`.
    ///
    /// Returns the number of members that received it.
    pub fn inject(&self, channel: &str, sender: &str, text: &str) -> usize {
        self.state.lock().deliver(channel, sender, text, None)
    }

    /// Drops every member's link, as if the server went away.
    pub fn sever_all(&self) {
        self.state.lock().members.clear();
    }

    /// Number of connected members.
    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    /// Nicknames of the members currently in `channel`, sorted.
    pub fn channel_members(&self, channel: &str) -> Vec<String> {
        let name = channel.to_ascii_lowercase();
        let state = self.state.lock();
        let mut nicks: Vec<String> = state
            .members
            .values()
            .filter(|m| m.channels.contains(&name))
            .map(|m| m.nick.clone())
            .collect();
        nicks.sort();
        nicks
    }

    /// The key currently protecting `channel`, if any.
    pub fn channel_key(&self, channel: &str) -> Option<String> {
        self.state
            .lock()
            .keys
            .get(&channel.to_ascii_lowercase())
            .cloned()
    }

    /// Mode letters set on `channel` (excluding the key), e.g. `"ns"`.
    pub fn channel_modes(&self, channel: &str) -> String {
        self.state
            .lock()
            .modes
            .get(&channel.to_ascii_lowercase())
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Every line sent through the network so far.
    pub fn sent_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Lines sent by members whose nickname is `nick`.
    pub fn lines_sent_by(&self, nick: &str) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|(from, _)| from == nick)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// A [`ChatTransport`] attached to a [`MemoryNetwork`].
pub struct MemoryTransport {
    state: Arc<Mutex<NetworkState>>,
    /// Our member id while connected.
    member: Mutex<Option<u64>>,
    inbox: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<ChatMessage>>>,
}

impl MemoryTransport {
    fn member_id(&self) -> Result<u64, TransportError> {
        let id = (*self.member.lock()).ok_or(TransportError::NotConnected)?;
        if self.state.lock().members.contains_key(&id) {
            Ok(id)
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl ChatTransport for MemoryTransport {
    async fn init(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn connect(
        &self,
        address: &str,
        port: u16,
    ) -> Result<(), TransportError> {
        // The lock is never held across the sleep.
        let delay = self.state.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            if state.refuse_connect {
                return Err(TransportError::ConnectFailed {
                    address: address.to_string(),
                    port,
                    reason: "connection refused".into(),
                });
            }
            state.next_member += 1;
            let id = state.next_member;
            state.members.insert(
                id,
                Member {
                    nick: String::new(),
                    channels: HashSet::new(),
                    inbox: tx,
                },
            );
            id
        };
        *self.member.lock() = Some(id);
        *self.inbox.lock().await = Some(rx);
        tracing::debug!(address, port, member = id, "memory transport connected");
        Ok(())
    }

    async fn login(&self, nick: &str, _user: &str) -> Result<(), TransportError> {
        let delay = self.state.lock().login_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // A disconnect during the delay leaves nothing to log in.
        let id = self.member_id()?;
        let mut state = self.state.lock();
        if state.refuse_login {
            return Err(TransportError::LoginRejected(format!(
                "{nick}: registration refused"
            )));
        }
        if let Some(member) = state.members.get_mut(&id) {
            member.nick = nick.to_string();
        }
        Ok(())
    }

    async fn send_line(&self, line: &str) -> Result<(), TransportError> {
        let id = self.member_id()?;
        let mut state = self.state.lock();
        let nick = state
            .members
            .get(&id)
            .map(|m| m.nick.clone())
            .unwrap_or_default();
        state.sent.push((nick, line.to_string()));
        if let Some(command) = Command::parse(line) {
            state.apply(id, command);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<ChatMessage>, TransportError> {
        let mut inbox = self.inbox.lock().await;
        match inbox.as_mut() {
            Some(rx) => Ok(rx.recv().await),
            None => Ok(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.member_id().is_ok()
    }

    async fn disconnect(&self) {
        // Removing the member drops the inbox sender, which ends any
        // pending `recv` with `None`.
        if let Some(id) = self.member.lock().take() {
            self.state.lock().members.remove(&id);
        }
    }
}
