//! Signaling protocol for Parley.
//!
//! This crate defines what travels on the control channel:
//!
//! - **Types** ([`PeerId`], [`SignalMessage`]): identities and the five
//!   signaling message kinds.
//! - **Grammar**: `SignalMessage` renders with `Display` and parses with
//!   `FromStr` (`cc_<kind>$<field>...`).
//! - **Codec** ([`EnvelopeCipher`], [`SignalCodec`]): sealing messages in
//!   the opaque envelope and opening them again.
//! - **Errors** ([`ProtocolError`]): why an inbound payload was dropped.
//!
//! ```text
//! Transport (lines) → Protocol (SignalMessage) → Presence (peer table)
//! ```

mod codec;
mod error;
mod grammar;
mod types;

pub use codec::{DEFAULT_KEY_TAG, EnvelopeCipher, PlaintextCipher, SignalCodec};
pub use error::ProtocolError;
pub use types::{
    AUTH, DELIMITER, HEARTBEAT, PeerId, REAUTH_REQUEST, SIGNON, SIGNON_REPLY,
    SignalMessage,
};
