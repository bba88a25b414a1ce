// Relay messages and the fixed server lines.
//
// A `RelayMessage` is one unit of broadcast content. Its `Display` form is
// exactly the text subscribers receive (before the `\n` terminator added by
// `framing::encode_line`):
// - chat:   `<name>: <text>`
// - joined: `<name> has joined the chat.`
// - left:   `<name> has left the chat.`
//
// Two lines are sent outside the broadcast queue, straight to one peer: the
// welcome line a new viewer gets, and the rejection notice a refused
// messenger gets right before the relay closes it.

use std::fmt;

use crate::handshake::HandshakeRejection;

/// Prefix of the single line sent to a messenger whose name claim failed.
pub const REJECTION_PREFIX: &str = "rejected: ";

/// One broadcast line, created by a messenger's payload or by the relay on
/// join/leave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayMessage {
    Chat { name: String, text: String },
    Joined { name: String },
    Left { name: String },
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMessage::Chat { name, text } => write!(f, "{name}: {text}"),
            RelayMessage::Joined { name } => write!(f, "{name} has joined the chat."),
            RelayMessage::Left { name } => write!(f, "{name} has left the chat."),
        }
    }
}

/// Greeting sent to a viewer as soon as it is registered.
pub fn welcome_line(chat_name: &str) -> String {
    format!("Welcome to the \"{chat_name}\" Chat Server!")
}

pub fn rejection_notice(reason: &HandshakeRejection) -> String {
    format!("{REJECTION_PREFIX}{reason}")
}

/// Extract the reason from a rejection notice. Returns `None` for any other
/// line. Trailing line terminators are ignored.
pub fn parse_rejection(line: &str) -> Option<String> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix(REJECTION_PREFIX)
        .map(String::from)
}
