//! Interpretation of decoded control-channel signals.
//!
//! [`ControlHandler::handle`] applies one [`SignalMessage`] to the peer
//! registry and decides what, if anything, the worker must do next:
//!
//! | Signal | Effect | Action |
//! |---|---|---|
//! | any announce or heartbeat with our id | none | self-collision |
//! | `cc_signon$id` | upsert peer | reply `cc_signonrep` once per presence |
//! | `cc_signonrep$id` | upsert peer | none |
//! | `cc_auth$id$bot` | upsert peer with role | none |
//! | `cc_hb$id$size` (known) | refresh peer | none |
//! | `cc_hb$id$size` (unknown) | none | reply `cc_reqauth$id` |
//! | `cc_reqauth$<our id>` | none | reply `cc_auth`, at most once per interval |
//!
//! Sending is left to the caller so this module stays synchronous.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_presence::{IntervalTimer, LocalIdentity, PeerRecord, PeerRegistry};
use parley_protocol::{PeerId, SignalMessage};
use tracing::{debug, info, warn};

/// What the worker should do after a signal was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlAction {
    Nothing,
    Reply(SignalMessage),
    /// Another participant uses our id.
    SelfCollision,
}

/// Per-connection control state: reply suppression and the re-auth limit.
#[derive(Debug)]
pub(crate) struct ControlHandler {
    /// Peers whose signon was already answered.
    answered: Mutex<HashSet<PeerId>>,
    reauth: Mutex<IntervalTimer>,
}

impl ControlHandler {
    pub(crate) fn new(reauth_interval: Duration) -> Self {
        Self {
            answered: Mutex::new(HashSet::new()),
            reauth: Mutex::new(IntervalTimer::new(reauth_interval)),
        }
    }

    pub(crate) fn set_reauth_interval(&self, interval: Duration) {
        self.reauth.lock().set_interval(interval);
    }

    /// Clears per-connection state. Called whenever a new attempt starts.
    pub(crate) fn reset(&self) {
        self.answered.lock().clear();
        self.reauth.lock().reset();
    }

    /// Forgets a peer that timed out, so its next signon is answered.
    pub(crate) fn forget(&self, id: PeerId) {
        self.answered.lock().remove(&id);
    }

    pub(crate) fn handle(
        &self,
        signal: SignalMessage,
        sender: &str,
        local: &LocalIdentity,
        registry: &PeerRegistry,
        now: Instant,
    ) -> ControlAction {
        // Any announce or heartbeat with our id means two instances now
        // share it. `reqauth` is different: it names the peer it wants
        // to hear from, so our id there is a request, not a clash.
        let id = signal.id();
        let names_local = id == local.id;
        if names_local && (signal.is_announce() || matches!(signal, SignalMessage::Heartbeat { .. })) {
            warn!(%id, %sender, kind = signal.kind(), "another participant is using our id");
            return ControlAction::SelfCollision;
        }

        match signal {
            SignalMessage::Signon { id } => {
                announce(registry, id, sender, false, now);
                // `insert` returns `false` when the id was already in the
                // set, which is exactly the "already answered" case.
                if self.answered.lock().insert(id) {
                    ControlAction::Reply(SignalMessage::SignonReply { id: local.id })
                } else {
                    debug!(%id, "signon already answered");
                    ControlAction::Nothing
                }
            }
            SignalMessage::SignonReply { id } => {
                announce(registry, id, sender, false, now);
                ControlAction::Nothing
            }
            SignalMessage::Auth { id, is_bot } => {
                announce(registry, id, sender, is_bot, now);
                ControlAction::Nothing
            }
            SignalMessage::Heartbeat { id, party_size } => {
                // A heartbeat from a peer we never saw announce (we joined
                // late, or swept it) is answered by asking it to announce
                // again instead of inventing a record without a nick.
                match registry.update_on_heartbeat(id, party_size, false, now) {
                    Ok(()) => ControlAction::Nothing,
                    Err(_) => ControlAction::Reply(SignalMessage::ReauthRequest { id }),
                }
            }
            SignalMessage::ReauthRequest { id } => {
                if id != local.id {
                    return ControlAction::Nothing;
                }
                if self.reauth.lock().test_and_set(now) {
                    ControlAction::Reply(SignalMessage::Auth {
                        id: local.id,
                        is_bot: local.is_bot,
                    })
                } else {
                    debug!("re-auth request rate limited");
                    ControlAction::Nothing
                }
            }
        }
    }
}

fn announce(registry: &PeerRegistry, id: PeerId, sender: &str, is_bot: bool, now: Instant) {
    if registry.upsert_on_announce(id, PeerRecord::announced(id, sender, is_bot, now)) {
        info!(peer = %id, nick = %sender, is_bot, "peer joined");
    }
}
