//! Envelope sealing and the signaling codec.
//!
//! Control-channel payloads travel inside an opaque envelope produced by
//! an external cipher. Parley does not implement the cipher; it only
//! needs the three operations in [`EnvelopeCipher`]. [`SignalCodec`]
//! combines a cipher with the v1 grammar:
//!
//! ```text
//! outbound: SignalMessage ─encode→ text ─encrypt→ envelope
//! inbound:  envelope ─validate→ ─decrypt→ text ─decode→ SignalMessage
//! ```
//!
//! Validation always runs first, so an envelope that fails it is never
//! decrypted or decoded.

use crate::{ProtocolError, SignalMessage};

/// The key tag used when none is configured.
pub const DEFAULT_KEY_TAG: char = 'B';

/// The encrypt/validate/decrypt primitive used to seal payloads.
///
/// Implementations must be shareable between the owning thread and the
/// network worker.
pub trait EnvelopeCipher: Send + Sync + 'static {
    /// Returns `true` if `payload` is a well-formed envelope.
    fn validate(&self, payload: &str) -> bool;

    /// Opens a validated envelope.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decrypt`] if the envelope cannot be opened.
    fn decrypt(&self, payload: &str) -> Result<String, ProtocolError>;

    /// Seals `plaintext` under the key identified by `key_tag`.
    fn encrypt(&self, plaintext: &str, key_tag: char) -> String;
}

// ---------------------------------------------------------------------------
// PlaintextCipher
// ---------------------------------------------------------------------------

/// An [`EnvelopeCipher`] that only frames the text: `~<tag><plaintext>`.
///
/// It provides **no confidentiality or integrity**. Use it for tests,
/// demos, and local development against a private network.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

const PLAINTEXT_MARKER: char = '~';

impl EnvelopeCipher for PlaintextCipher {
    fn validate(&self, payload: &str) -> bool {
        let mut chars = payload.chars();
        chars.next() == Some(PLAINTEXT_MARKER) && chars.next().is_some()
    }

    fn decrypt(&self, payload: &str) -> Result<String, ProtocolError> {
        let mut chars = payload.chars();
        match (chars.next(), chars.next()) {
            (Some(PLAINTEXT_MARKER), Some(_tag)) => Ok(chars.as_str().to_string()),
            _ => Err(ProtocolError::Decrypt("missing envelope marker".into())),
        }
    }

    fn encrypt(&self, plaintext: &str, key_tag: char) -> String {
        format!("{PLAINTEXT_MARKER}{key_tag}{plaintext}")
    }
}

// ---------------------------------------------------------------------------
// SignalCodec
// ---------------------------------------------------------------------------

/// Seals outbound signaling messages and opens inbound ones.
#[derive(Debug, Clone)]
pub struct SignalCodec<C: EnvelopeCipher> {
    cipher: C,
    key_tag: char,
}

impl<C: EnvelopeCipher> SignalCodec<C> {
    /// Creates a codec sealing with `cipher` under `key_tag`.
    pub fn new(cipher: C, key_tag: char) -> Self {
        Self { cipher, key_tag }
    }

    /// Changes the key tag used for subsequent seals.
    pub fn set_key_tag(&mut self, key_tag: char) {
        self.key_tag = key_tag;
    }

    /// Encodes and seals a signaling message.
    pub fn seal(&self, msg: &SignalMessage) -> String {
        self.seal_text(&msg.to_string())
    }

    /// Seals arbitrary text (application chat on the presence channel).
    pub fn seal_text(&self, text: &str) -> String {
        self.cipher.encrypt(text, self.key_tag)
    }

    /// Validates, decrypts and decodes an inbound payload.
    ///
    /// # Errors
    /// - [`ProtocolError::Rejected`]: validation failed; nothing else ran
    /// - [`ProtocolError::Decrypt`]: the cipher could not open it
    /// - any grammar error from decoding the plaintext
    pub fn open(&self, payload: &str) -> Result<SignalMessage, ProtocolError> {
        if !self.cipher.validate(payload) {
            return Err(ProtocolError::Rejected);
        }
        let plaintext = self.cipher.decrypt(payload)?;
        plaintext.parse()
    }
}
