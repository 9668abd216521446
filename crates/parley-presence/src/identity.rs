//! The local participant's identity.
//!
//! The numeric id is drawn uniformly from `PeerId::MIN..=PeerId::MAX`.
//! It changes when a new configuration is applied (the connection is
//! off), when another participant turns out to use the same id (a
//! *self-collision*), and when the client restarts a dropped connection
//! on its own. Nothing is persisted; a restarted process picks a fresh
//! id.
//!
//! # Why the id is in the login nick
//!
//! Two instances may share a display name, and a chat server refuses a
//! second login under a nick it already holds. Suffixing the id gives
//! every instance its own login nick, and drawing a new id before an
//! automatic restart sidesteps the server still holding the nick of the
//! connection that just died.

use parking_lot::Mutex;
use parley_protocol::PeerId;
use rand::Rng;
use serde::Serialize;

use crate::PresenceError;

/// Draws before `regenerate` stops avoiding occupied ids.
const MAX_DRAWS: usize = 64;

/// Who we are on the chat network and the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalIdentity {
    /// Signaling id announced on the control channel.
    pub id: PeerId,
    /// Display nickname (spaces already replaced).
    pub nickname: String,
    /// Chat user name.
    pub username: String,
    /// Whether this instance is automated.
    pub is_bot: bool,
}

impl LocalIdentity {
    /// The nickname used to log in: `<nickname>-<id>`.
    ///
    /// Suffixing the id keeps instances that share a display name from
    /// clashing on the chat network.
    pub fn login_nick(&self) -> String {
        format!("{}-{}", self.nickname, self.id.get())
    }
}

/// Owns the [`LocalIdentity`] and its regeneration.
#[derive(Debug)]
pub struct IdentityManager {
    identity: Mutex<LocalIdentity>,
}

impl IdentityManager {
    /// Creates an identity with a freshly drawn id.
    pub fn new(nickname: impl Into<String>, username: impl Into<String>, is_bot: bool) -> Self {
        Self {
            identity: Mutex::new(LocalIdentity {
                id: random_id(),
                nickname: nickname.into(),
                username: username.into(),
                is_bot,
            }),
        }
    }

    /// A copy of the current identity.
    pub fn current(&self) -> LocalIdentity {
        self.identity.lock().clone()
    }

    /// The current id.
    pub fn id(&self) -> PeerId {
        self.identity.lock().id
    }

    /// Replaces names and role and draws a new id. Returns the new id.
    pub fn reset(
        &self,
        nickname: impl Into<String>,
        username: impl Into<String>,
        is_bot: bool,
    ) -> PeerId {
        let id = random_id();
        let mut identity = self.identity.lock();
        identity.id = id;
        identity.nickname = nickname.into();
        identity.username = username.into();
        identity.is_bot = is_bot;
        id
    }

    /// Draws a new id after a self-collision. Returns it.
    ///
    /// The new id always differs from the current one, and avoids ids
    /// for which `taken` returns `true` (typically: already in the peer
    /// registry). `taken` is evaluated without holding the identity lock.
    pub fn regenerate(&self, taken: impl Fn(PeerId) -> bool) -> PeerId {
        let previous = self.id();
        let mut candidate = random_id();
        for _ in 0..MAX_DRAWS {
            if candidate != previous && !taken(candidate) {
                break;
            }
            candidate = random_id();
        }
        while candidate == previous {
            candidate = random_id();
        }

        self.identity.lock().id = candidate;
        tracing::info!(old = %previous, new = %candidate, "local identity regenerated");
        candidate
    }

    /// Sets a specific id.
    ///
    /// # Errors
    /// Returns [`PresenceError::InvalidPeerId`] if `id` is out of range.
    pub fn assign(&self, id: PeerId) -> Result<(), PresenceError> {
        if !id.is_valid() {
            return Err(PresenceError::InvalidPeerId(id.get()));
        }
        self.identity.lock().id = id;
        Ok(())
    }
}

/// Draws an id uniformly from the valid range.
pub fn random_id() -> PeerId {
    PeerId(rand::rng().random_range(PeerId::MIN..=PeerId::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_has_valid_id() {
        let manager = IdentityManager::new("alice", "alice", false);
        assert!(manager.id().is_valid());
        assert_eq!(manager.current().nickname, "alice");
    }

    #[test]
    fn test_random_id_stays_in_range() {
        for _ in 0..1_000 {
            assert!(random_id().is_valid());
        }
    }

    #[test]
    fn test_login_nick_appends_id() {
        let identity = LocalIdentity {
            id: PeerId(42),
            nickname: "alice".into(),
            username: "al".into(),
            is_bot: false,
        };
        assert_eq!(identity.login_nick(), "alice-42");
    }

    #[test]
    fn test_regenerate_always_changes_id() {
        let manager = IdentityManager::new("alice", "alice", false);
        manager.assign(PeerId(7)).unwrap();

        for _ in 0..100 {
            let before = manager.id();
            let after = manager.regenerate(|_| false);
            assert_ne!(before, after);
            assert!(after.is_valid());
        }
    }

    #[test]
    fn test_regenerate_avoids_taken_ids() {
        let manager = IdentityManager::new("alice", "alice", false);
        // Every even id is taken; 64 draws all landing on one is 2^-64.
        for _ in 0..20 {
            let id = manager.regenerate(|id| id.get() % 2 == 0);
            assert_eq!(id.get() % 2, 1, "{id}");
        }
    }

    #[test]
    fn test_assign_rejects_out_of_range() {
        let manager = IdentityManager::new("alice", "alice", false);
        assert_eq!(
            manager.assign(PeerId(0)),
            Err(PresenceError::InvalidPeerId(0))
        );
        manager.assign(PeerId(10_000)).unwrap();
        assert_eq!(manager.id(), PeerId(10_000));
    }

    #[test]
    fn test_reset_replaces_names_and_role() {
        let manager = IdentityManager::new("alice", "alice", false);
        let id = manager.reset("bob", "bobby", true);

        let identity = manager.current();
        assert_eq!(identity.id, id);
        assert_eq!(identity.nickname, "bob");
        assert_eq!(identity.username, "bobby");
        assert!(identity.is_bot);
    }
}
