//! The peer registry: every remote participant we currently consider live.
//!
//! Records are created by announces (signon, signon reply, auth), kept
//! fresh by heartbeats, and evicted once their last heartbeat is older
//! than the peer timeout.
//!
//! ```text
//! upsert_on_announce() ──→ [live] ──update_on_heartbeat()──→ [live]
//!                             │
//!                             ▼ now - last_heartbeat >= timeout
//!                       sweep_expired() ──→ removed
//! ```
//!
//! # Concurrency note
//!
//! Unlike a single-owner manager, the registry is written by the network
//! worker and read by the owning application thread, so it carries its
//! own lock. Every operation takes that lock exactly once and never calls
//! out while holding it. Readers get a [`PeerSnapshot`], an owned copy.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_protocol::PeerId;

use crate::PresenceError;

/// Party size reported before a peer (or the local side) sends one.
pub const UNKNOWN_PARTY_SIZE: i32 = -1;

/// How long a peer may go without a heartbeat before it is evicted.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// What we know about one remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// The peer's signaling id.
    pub peer_id: PeerId,
    /// Chat nickname the announce came from.
    pub nickname: String,
    /// When we last heard from the peer. Never moves backwards.
    pub last_heartbeat: Instant,
    /// Whether the peer announced itself as automated.
    pub is_bot: bool,
    /// Last reported party size, [`UNKNOWN_PARTY_SIZE`] until a heartbeat.
    pub party_size: i32,
    /// Whether the peer is in a game. Not carried by the v1 heartbeat,
    /// so remote records report `false` unless set by the caller.
    pub is_in_game: bool,
}

impl PeerRecord {
    /// A fresh record for a peer that just announced itself.
    pub fn announced(
        peer_id: PeerId,
        nickname: impl Into<String>,
        is_bot: bool,
        at: Instant,
    ) -> Self {
        Self {
            peer_id,
            nickname: nickname.into(),
            last_heartbeat: at,
            is_bot,
            party_size: UNKNOWN_PARTY_SIZE,
            is_in_game: false,
        }
    }

    /// Time since the last heartbeat, saturating at zero.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }
}

/// An owned, ordered copy of the registry.
pub type PeerSnapshot = BTreeMap<PeerId, PeerRecord>;

/// Concurrent table of live peers, keyed by id.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for `id` after an announce.
    ///
    /// If a record already exists, its `last_heartbeat` is kept when it
    /// is newer than the incoming one.
    ///
    /// Returns `true` if the peer was not known before.
    pub fn upsert_on_announce(&self, id: PeerId, mut record: PeerRecord) -> bool {
        record.peer_id = id;
        let mut peers = self.peers.lock();
        let is_new = match peers.get(&id) {
            Some(existing) => {
                record.last_heartbeat = record.last_heartbeat.max(existing.last_heartbeat);
                false
            }
            None => true,
        };
        peers.insert(id, record);
        drop(peers);

        if is_new {
            tracing::info!(peer = %id, "peer announced");
        } else {
            tracing::debug!(peer = %id, "peer re-announced");
        }
        is_new
    }

    /// Applies a heartbeat to an already-announced peer.
    ///
    /// `last_heartbeat` only ever moves forward: a heartbeat stamped
    /// earlier than the stored one updates the state fields but keeps
    /// the newer timestamp.
    ///
    /// # Errors
    /// Returns [`PresenceError::UnknownPeer`] (and changes nothing) if no
    /// record exists for `id`. A heartbeat never creates a record.
    pub fn update_on_heartbeat(
        &self,
        id: PeerId,
        party_size: i32,
        is_in_game: bool,
        at: Instant,
    ) -> Result<(), PresenceError> {
        let updated = match self.peers.lock().get_mut(&id) {
            Some(record) => {
                record.last_heartbeat = record.last_heartbeat.max(at);
                record.party_size = party_size;
                record.is_in_game = is_in_game;
                true
            }
            None => false,
        };

        if !updated {
            tracing::warn!(peer = %id, "heartbeat from unannounced peer ignored");
            return Err(PresenceError::UnknownPeer(id));
        }
        Ok(())
    }

    /// Removes **every** peer whose last heartbeat is at least `threshold`
    /// old at `now`. Returns the removed ids in ascending order.
    pub fn sweep_expired(&self, now: Instant, threshold: Duration) -> Vec<PeerId> {
        let mut expired = Vec::new();
        self.peers.lock().retain(|id, record| {
            if record.age(now) >= threshold {
                expired.push(*id);
                false
            } else {
                true
            }
        });
        expired.sort();

        for id in &expired {
            tracing::info!(peer = %id, "peer timed out");
        }
        expired
    }

    /// An owned copy of every record.
    pub fn snapshot(&self) -> PeerSnapshot {
        self.peers
            .lock()
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    /// A copy of one record.
    pub fn get(&self, id: PeerId) -> Option<PeerRecord> {
        self.peers.lock().get(&id).cloned()
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.lock().contains_key(&id)
    }

    /// Removes one record, returning it.
    pub fn remove(&self, id: PeerId) -> Option<PeerRecord> {
        self.peers.lock().remove(&id)
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Returns `true` if no peers are registered.
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}
