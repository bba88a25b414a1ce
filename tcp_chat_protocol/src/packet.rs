// Tagged binary packets of the adjacent file-transfer protocol.
//
// Wire layout: a 4-byte ASCII tag, then a payload whose meaning depends on
// the tag. Peers compare tags as a little-endian `u32` of those four bytes,
// so the literals below (including the trailing spaces in `"ACK "` and
// `"bye "`) are part of the contract.
//
// | tag    | payload                                                  |
// |--------|----------------------------------------------------------|
// | `ACK ` | UTF-8 text                                               |
// | `bye ` | empty                                                    |
// | `REQF` | UTF-8 file name                                          |
// | `REQB` | block number, `u32` LE                                   |
// | `INFO` | 16-byte checksum, file size, max block size, block count |
// |        | (three `u32` LE), 28 bytes total                         |
// | `SEND` | one data block, opaque here                              |
//
// The relay never sends these; the codec exists so tools that bridge to the
// file-transfer side encode them byte-for-byte the same way.

use thiserror::Error;

/// Size of the `INFO` payload: checksum + file size + max block size + count.
pub const FILE_INFO_LEN: usize = 16 + 4 + 4 + 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short: {0} bytes, need at least 4 for the tag")]
    TooShort(usize),
    #[error("payload for {tag} has {len} bytes, expected {expected}")]
    PayloadLength {
        tag: PacketTag,
        len: usize,
        expected: usize,
    },
    #[error("expected a {expected} packet, got {actual}")]
    WrongTag { expected: PacketTag, actual: PacketTag },
}

/// Four ASCII bytes identifying a packet's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PacketTag(pub [u8; 4]);

impl PacketTag {
    pub const ACK: Self = Self(*b"ACK ");
    pub const BYE: Self = Self(*b"bye ");
    pub const REQUEST_FILE: Self = Self(*b"REQF");
    pub const REQUEST_BLOCK: Self = Self(*b"REQB");
    pub const INFO: Self = Self(*b"INFO");
    pub const SEND: Self = Self(*b"SEND");

    const KNOWN: [Self; 6] = [
        Self::ACK,
        Self::BYE,
        Self::REQUEST_FILE,
        Self::REQUEST_BLOCK,
        Self::INFO,
        Self::SEND,
    ];

    /// The tag as peers compare it.
    pub fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    pub fn is_known(self) -> bool {
        Self::KNOWN.contains(&self)
    }
}

impl std::fmt::Display for PacketTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", String::from_utf8_lossy(&self.0))
    }
}

/// A tag plus its raw payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub tag: PacketTag,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(tag: PacketTag, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    pub fn ack(message: &str) -> Self {
        Self::new(PacketTag::ACK, message.as_bytes().to_vec())
    }

    pub fn bye() -> Self {
        Self::new(PacketTag::BYE, Vec::new())
    }

    pub fn request_file(filename: &str) -> Self {
        Self::new(PacketTag::REQUEST_FILE, filename.as_bytes().to_vec())
    }

    pub fn request_block(number: u32) -> Self {
        Self::new(PacketTag::REQUEST_BLOCK, number.to_le_bytes().to_vec())
    }

    pub fn info(info: &FileInfo) -> Self {
        Self::new(PacketTag::INFO, info.encode().to_vec())
    }

    pub fn send(block: Vec<u8>) -> Self {
        Self::new(PacketTag::SEND, block)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let Some((tag, payload)) = bytes.split_first_chunk::<4>() else {
            return Err(PacketError::TooShort(bytes.len()));
        };
        Ok(Self {
            tag: PacketTag(*tag),
            payload: payload.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.payload.len());
        bytes.extend_from_slice(&self.tag.0);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Text carried by `ACK ` / `REQF` packets.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Block number carried by a `REQB` packet.
    pub fn block_number(&self) -> Result<u32, PacketError> {
        self.expect_tag(PacketTag::REQUEST_BLOCK)?;
        let bytes: [u8; 4] =
            self.payload
                .as_slice()
                .try_into()
                .map_err(|_| PacketError::PayloadLength {
                    tag: self.tag,
                    len: self.payload.len(),
                    expected: 4,
                })?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn file_info(&self) -> Result<FileInfo, PacketError> {
        self.expect_tag(PacketTag::INFO)?;
        FileInfo::decode(&self.payload)
    }

    fn expect_tag(&self, expected: PacketTag) -> Result<(), PacketError> {
        if self.tag == expected {
            Ok(())
        } else {
            Err(PacketError::WrongTag {
                expected,
                actual: self.tag,
            })
        }
    }
}

/// Payload of an `INFO` packet describing the file about to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// MD5 of the whole file.
    pub checksum: [u8; 16],
    pub file_size: u32,
    pub max_block_size: u32,
    pub block_count: u32,
}

impl FileInfo {
    pub fn encode(&self) -> [u8; FILE_INFO_LEN] {
        let mut bytes = [0u8; FILE_INFO_LEN];
        bytes[..16].copy_from_slice(&self.checksum);
        bytes[16..20].copy_from_slice(&self.file_size.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.max_block_size.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.block_count.to_le_bytes());
        bytes
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        let bytes: &[u8; FILE_INFO_LEN] =
            payload.try_into().map_err(|_| PacketError::PayloadLength {
                tag: PacketTag::INFO,
                len: payload.len(),
                expected: FILE_INFO_LEN,
            })?;
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&bytes[..16]);
        Ok(Self {
            checksum,
            file_size: word(16),
            max_block_size: word(20),
            block_count: word(24),
        })
    }
}
