//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means "this payload is not a signaling
//! message we accept". The control-channel interpreter logs it and drops
//! the payload; it never reaches application code.

/// Errors that can occur while opening or decoding a signaling payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The envelope failed the cipher's validation step.
    #[error("envelope failed validation")]
    Rejected,

    /// The envelope validated but could not be decrypted.
    #[error("decrypt failed: {0}")]
    Decrypt(String),

    /// The leading token is not one of the known message kinds.
    #[error("unknown message kind {0:?}")]
    UnknownKind(String),

    /// A required `$`-delimited field is absent.
    #[error("{kind}: missing field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A field is present but not a valid value for its position.
    #[error("{kind}: invalid `{field}` value {value:?}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },

    /// More fields than the kind defines.
    #[error("{kind}: unexpected trailing fields")]
    TrailingFields { kind: &'static str },
}
