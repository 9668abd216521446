//! Core protocol types: peer identities and signaling messages.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// PeerId
// ---------------------------------------------------------------------------

/// A participant's numeric identity on the control channel.
///
/// Valid ids lie in [`PeerId::MIN`]`..=`[`PeerId::MAX`]. Ids are drawn at
/// random, so two participants can pick the same one; that situation is
/// an *identity collision* and is resolved by the colliding side picking
/// a new id.
///
/// Serializes as the bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl PeerId {
    /// Smallest valid id.
    pub const MIN: u32 = 1;
    /// Largest valid id.
    pub const MAX: u32 = 10_000;

    /// Returns `Some` if `raw` is within the valid range.
    pub fn new(raw: u32) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&raw).then_some(Self(raw))
    }

    /// Whether this id is within the valid range.
    pub fn is_valid(self) -> bool {
        (Self::MIN..=Self::MAX).contains(&self.0)
    }

    /// Returns the underlying number.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SignalMessage
// ---------------------------------------------------------------------------

/// Wire token for [`SignalMessage::Signon`].
pub const SIGNON: &str = "cc_signon";
/// Wire token for [`SignalMessage::SignonReply`].
pub const SIGNON_REPLY: &str = "cc_signonrep";
/// Wire token for [`SignalMessage::Auth`].
pub const AUTH: &str = "cc_auth";
/// Wire token for [`SignalMessage::ReauthRequest`].
pub const REAUTH_REQUEST: &str = "cc_reqauth";
/// Wire token for [`SignalMessage::Heartbeat`].
pub const HEARTBEAT: &str = "cc_hb";
/// Field separator.
pub const DELIMITER: char = '$';

/// A control-channel signaling message (grammar v1).
///
/// Each variant renders as its kind token followed by `$`-separated
/// fields:
///
/// ```text
/// cc_signon$<id>
/// cc_signonrep$<id>
/// cc_auth$<id>$<0|1>
/// cc_reqauth$<id>
/// cc_hb$<id>$<partySize>
/// ```
///
/// Use `to_string()` to encode and `str::parse` to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    /// "I'm here": peers that hear it answer with a `SignonReply`.
    Signon { id: PeerId },

    /// "I'm here too": answer to a `Signon`; never answered itself.
    SignonReply { id: PeerId },

    /// Announce with role. `is_bot` marks automated participants.
    Auth { id: PeerId, is_bot: bool },

    /// Asks the participant holding `id` to re-announce with `Auth`.
    ReauthRequest { id: PeerId },

    /// Periodic liveness message with the sender's party size.
    Heartbeat { id: PeerId, party_size: i32 },
}

impl SignalMessage {
    /// The wire token for this message's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signon { .. } => SIGNON,
            Self::SignonReply { .. } => SIGNON_REPLY,
            Self::Auth { .. } => AUTH,
            Self::ReauthRequest { .. } => REAUTH_REQUEST,
            Self::Heartbeat { .. } => HEARTBEAT,
        }
    }

    /// The id embedded in the message.
    ///
    /// For `ReauthRequest` this is the id being asked to re-announce,
    /// not the sender's.
    pub fn id(&self) -> PeerId {
        match self {
            Self::Signon { id }
            | Self::SignonReply { id }
            | Self::Auth { id, .. }
            | Self::ReauthRequest { id }
            | Self::Heartbeat { id, .. } => *id,
        }
    }

    /// Whether this message establishes presence (signon, reply, auth).
    pub fn is_announce(&self) -> bool {
        matches!(
            self,
            Self::Signon { .. } | Self::SignonReply { .. } | Self::Auth { .. }
        )
    }
}

impl fmt::Display for SignalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        let id = self.id().0;
        match self {
            Self::Signon { .. }
            | Self::SignonReply { .. }
            | Self::ReauthRequest { .. } => write!(f, "{kind}{DELIMITER}{id}"),
            Self::Auth { is_bot, .. } => {
                write!(f, "{kind}{DELIMITER}{id}{DELIMITER}{}", u8::from(*is_bot))
            }
            Self::Heartbeat { party_size, .. } => {
                write!(f, "{kind}{DELIMITER}{id}{DELIMITER}{party_size}")
            }
        }
    }
}
