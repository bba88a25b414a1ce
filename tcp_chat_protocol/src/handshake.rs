// The handshake: a new connection's first payload, which fixes its role.
//
// Two claims are recognized:
// - `viewer`: exact text; the connection becomes a subscriber.
// - `name:<N>`: the connection wants to publish as `<N>`. Everything
//   after the first `:` is the name, verbatim.
// Any other payload, including invalid UTF-8, is `Unrecognized`.
//
// Parsing is purely syntactic. Whether a claimed name is free is the relay
// registry's decision, reported back as a `HandshakeRejection`.

use std::fmt;

/// Exact payload a subscriber sends to claim the viewer role.
pub const VIEWER_COMMAND: &str = "viewer";

/// Prefix of a publisher's name claim.
pub const NAME_PREFIX: &str = "name:";

/// Payload a publisher sends to leave gracefully.
pub const BYE_COMMAND: &str = "bye";

/// A parsed role claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handshake {
    Viewer,
    /// The name may be empty here; emptiness is rejected at registration.
    Messenger {
        name: String,
    },
    Unrecognized,
}

impl Handshake {
    pub fn parse(payload: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(payload) else {
            return Handshake::Unrecognized;
        };
        if text == VIEWER_COMMAND {
            Handshake::Viewer
        } else if let Some(name) = text.strip_prefix(NAME_PREFIX) {
            Handshake::Messenger { name: name.into() }
        } else {
            Handshake::Unrecognized
        }
    }

    /// Bytes a client writes to make this claim. `Unrecognized` encodes to
    /// nothing.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Handshake::Viewer => VIEWER_COMMAND.as_bytes().to_vec(),
            Handshake::Messenger { name } => format!("{NAME_PREFIX}{name}").into_bytes(),
            Handshake::Unrecognized => Vec::new(),
        }
    }
}

/// Why the relay refused a connection during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeRejection {
    /// The first read returned zero bytes (peer closed before claiming).
    NoPayload,
    /// Nothing arrived within the handshake timeout.
    TimedOut,
    Unrecognized,
    EmptyName,
    NameTaken(String),
    /// The name holds a line break or other control character.
    InvalidName(String),
}

impl HandshakeRejection {
    /// Whether the relay tells the peer why before closing. Only name claims
    /// get an answer; anything else is closed silently.
    pub fn notifies_peer(&self) -> bool {
        matches!(
            self,
            HandshakeRejection::EmptyName
                | HandshakeRejection::NameTaken(_)
                | HandshakeRejection::InvalidName(_)
        )
    }
}

impl fmt::Display for HandshakeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeRejection::NoPayload => write!(f, "no handshake received"),
            HandshakeRejection::TimedOut => write!(f, "handshake timed out"),
            HandshakeRejection::Unrecognized => write!(f, "unrecognized handshake"),
            HandshakeRejection::EmptyName => write!(f, "name must not be empty"),
            HandshakeRejection::NameTaken(name) => write!(f, "name \"{name}\" is already taken"),
            // Debug-escaped so the notice stays on one line.
            HandshakeRejection::InvalidName(name) => {
                write!(f, "name {name:?} contains control characters")
            }
        }
    }
}
