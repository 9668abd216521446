//! Inbound messages and outbound command lines.
//!
//! The transport parses every inbound line into a [`ChatMessage`]
//! (`sender`, `command`, `params`). Outbound traffic is plain text lines;
//! [`Command`] renders the handful of commands the presence layer sends
//! so the line format lives in one place.

use std::fmt;

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A parsed inbound message, as delivered by the transport.
///
/// For a channel message the shape is:
///
/// ```text
/// sender  = "alice-42"
/// command = "PRIVMSG"
/// params  = ["#control", "<sealed payload>"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Nickname of the sender. Empty for server-originated messages.
    pub sender: String,
    /// The command word (`PRIVMSG`, `JOIN`, a numeric reply, ...).
    pub command: String,
    /// Command parameters, trailing parameter last.
    pub params: Vec<String>,
}

impl ChatMessage {
    /// Creates a message from its parts.
    pub fn new(
        sender: impl Into<String>,
        command: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            command: command.into(),
            params,
        }
    }

    /// Shorthand for a `PRIVMSG` to `target` carrying `text`.
    pub fn privmsg(
        sender: impl Into<String>,
        target: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(sender, "PRIVMSG", vec![target.into(), text.into()])
    }

    /// Returns `(target, text)` if this is a well-formed `PRIVMSG`.
    ///
    /// Messages with fewer than two parameters are not considered
    /// channel messages at all.
    pub fn as_privmsg(&self) -> Option<(&str, &str)> {
        if !self.command.eq_ignore_ascii_case("PRIVMSG") {
            return None;
        }
        match self.params.as_slice() {
            [target, text, ..] => Some((target.as_str(), text.as_str())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An outbound command, rendered to a raw line with `to_string()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `JOIN <channel> [key]`
    Join {
        channel: String,
        key: Option<String>,
    },

    /// `MODE <channel> <flags> [arg]`
    Mode {
        channel: String,
        flags: String,
        arg: Option<String>,
    },

    /// `PRIVMSG <target> :<text>`
    Privmsg { target: String, text: String },
}

impl Command {
    /// Parses a raw line produced by [`Command`]'s `Display` impl.
    ///
    /// Only the three commands above are recognized; anything else
    /// returns `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (word, rest) = line.split_once(' ')?;
        match word.to_ascii_uppercase().as_str() {
            "JOIN" => {
                let mut parts = rest.split_whitespace();
                let channel = parts.next()?.to_string();
                let key = parts.next().map(str::to_string);
                Some(Self::Join { channel, key })
            }
            "MODE" => {
                let mut parts = rest.split_whitespace();
                let channel = parts.next()?.to_string();
                let flags = parts.next()?.to_string();
                let arg = parts.next().map(str::to_string);
                Some(Self::Mode {
                    channel,
                    flags,
                    arg,
                })
            }
            "PRIVMSG" => {
                let (target, text) = rest.split_once(" :")?;
                Some(Self::Privmsg {
                    target: target.trim().to_string(),
                    text: text.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join { channel, key: None } => write!(f, "JOIN {channel}"),
            Self::Join {
                channel,
                key: Some(key),
            } => write!(f, "JOIN {channel} {key}"),
            Self::Mode {
                channel,
                flags,
                arg: None,
            } => write!(f, "MODE {channel} {flags}"),
            Self::Mode {
                channel,
                flags,
                arg: Some(arg),
            } => write!(f, "MODE {channel} {flags} {arg}"),
            Self::Privmsg { target, text } => {
                write!(f, "PRIVMSG {target} :{text}")
            }
        }
    }
}
