//! Decoder for the v1 signaling grammar.
//!
//! Decoding is strict: the kind token must match exactly, every field
//! must be present and numeric, and nothing may follow the last field.
//! Superseded delimiter schemes (`-`, repeated `$`) are rejected like any
//! other malformed input.
//!
//! Only the canonical encoding is accepted. Numbers are what `Display`
//! would print for them: no `+` sign, no leading zeros, no surrounding
//! whitespace. A payload that decodes always re-encodes to the same text,
//! so two peers can never disagree about what a message said.

use std::fmt::Display;
use std::str::FromStr;

use crate::types::{AUTH, DELIMITER, HEARTBEAT, REAUTH_REQUEST, SIGNON, SIGNON_REPLY};
use crate::{PeerId, ProtocolError, SignalMessage};

impl FromStr for SignalMessage {
    type Err = ProtocolError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut fields = text.split(DELIMITER);
        let kind = fields.next().unwrap_or_default();

        let msg = match kind {
            SIGNON => Self::Signon {
                id: parse_id(SIGNON, fields.next())?,
            },
            SIGNON_REPLY => Self::SignonReply {
                id: parse_id(SIGNON_REPLY, fields.next())?,
            },
            AUTH => Self::Auth {
                id: parse_id(AUTH, fields.next())?,
                is_bot: parse_flag(AUTH, "isBot", fields.next())?,
            },
            REAUTH_REQUEST => Self::ReauthRequest {
                id: parse_id(REAUTH_REQUEST, fields.next())?,
            },
            HEARTBEAT => Self::Heartbeat {
                id: parse_id(HEARTBEAT, fields.next())?,
                party_size: parse_int(HEARTBEAT, "partySize", fields.next())?,
            },
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };

        if fields.next().is_some() {
            return Err(ProtocolError::TrailingFields { kind: msg.kind() });
        }
        Ok(msg)
    }
}

fn parse_id(kind: &'static str, field: Option<&str>) -> Result<PeerId, ProtocolError> {
    let raw: u32 = parse_int(kind, "id", field)?;
    PeerId::new(raw).ok_or_else(|| ProtocolError::InvalidField {
        kind,
        field: "id",
        value: raw.to_string(),
    })
}

fn parse_flag(
    kind: &'static str,
    name: &'static str,
    field: Option<&str>,
) -> Result<bool, ProtocolError> {
    match field {
        Some("0") => Ok(false),
        Some("1") => Ok(true),
        Some(other) => Err(ProtocolError::InvalidField {
            kind,
            field: name,
            value: other.to_string(),
        }),
        None => Err(ProtocolError::MissingField { kind, field: name }),
    }
}

fn parse_int<T: FromStr + Display>(
    kind: &'static str,
    name: &'static str,
    field: Option<&str>,
) -> Result<T, ProtocolError> {
    let value = field.ok_or(ProtocolError::MissingField { kind, field: name })?;
    // `str::parse` also takes `+7` and `007`; comparing against the
    // printed form rejects both.
    value
        .parse::<T>()
        .ok()
        .filter(|parsed| parsed.to_string() == value)
        .ok_or_else(|| ProtocolError::InvalidField {
            kind,
            field: name,
            value: value.to_string(),
        })
}
