// tcp_chat_protocol — wire vocabulary shared by the chat relay and its clients.
//
// The chat protocol is plain UTF-8 text over TCP. There is no length prefix:
// a client's first write is its handshake. After that each line a messenger
// writes is one chat message (a write with no `\n` at all counts as one line),
// and every line the relay sends back is terminated by `\n`.
// This crate holds that vocabulary so the server and both clients agree on it
// without depending on each other.
//
// Module overview:
// - `handshake.rs`: The one-shot role claim (`viewer` / `name:<N>`) and the
//                   reasons a claim can be refused.
// - `message.rs`:   Relay messages (chat lines, join/leave notices), the
//                   welcome line, and rejection notices.
// - `framing.rs`:   `\n` line encoding and a `LineBuffer` that reassembles
//                   lines split across reads.
// - `packet.rs`:    Tagged binary packets of the adjacent file-transfer
//                   protocol (4-byte ASCII tag + payload). Codec only; nothing
//                   in the relay speaks it.
//
// No networking lives here. Everything operates on byte slices and strings.

pub mod framing;
pub mod handshake;
pub mod message;
pub mod packet;

pub use framing::{LineBuffer, MAX_LINE_LEN, encode_line};
pub use handshake::{BYE_COMMAND, Handshake, HandshakeRejection, NAME_PREFIX, VIEWER_COMMAND};
pub use message::{REJECTION_PREFIX, RelayMessage, parse_rejection, rejection_notice, welcome_line};
pub use packet::{FileInfo, Packet, PacketError, PacketTag};

#[cfg(test)]
mod tests {
    use super::*;

    /// A full relay conversation as the viewer sees it, from raw bytes.
    #[test]
    fn viewer_transcript_reassembles() {
        let mut wire = Vec::new();
        wire.extend(encode_line(&welcome_line("Bad IRC")));
        wire.extend(encode_line(
            &RelayMessage::Joined {
                name: "alice".into(),
            }
            .to_string(),
        ));
        wire.extend(encode_line(
            &RelayMessage::Chat {
                name: "alice".into(),
                text: "hi".into(),
            }
            .to_string(),
        ));

        // Deliver in awkward chunks to mimic TCP segmentation.
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for chunk in wire.chunks(7) {
            lines.extend(buffer.push(chunk));
        }

        assert_eq!(
            lines,
            vec![
                "Welcome to the \"Bad IRC\" Chat Server!".to_string(),
                "alice has joined the chat.".to_string(),
                "alice: hi".to_string(),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn messenger_claim_and_rejection_agree() {
        let claim = Handshake::Messenger {
            name: "alice".into(),
        };
        assert_eq!(Handshake::parse(&claim.encode()), claim);

        let notice = rejection_notice(&HandshakeRejection::NameTaken("alice".into()));
        assert_eq!(
            parse_rejection(&notice).as_deref(),
            Some("name \"alice\" is already taken")
        );
    }
}
