/// Message header: the fixed 10-byte prefix of every token.
///
/// ```text
/// [version: 1][role: 1][sequence: 4 BE][timestamp: 4 BE]
/// ```
///
/// The header is plaintext. It can be read without any key, and it is bound
/// into the AEAD as associated data so it cannot be altered undetected.
use serde::{Deserialize, Serialize};

/// Current token format version.
pub const FORMAT_VERSION: u8 = 0x01;
/// Serialized header size in bytes.
pub const HEADER_LEN: usize = 10;

/// Author of a chat turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    User = 0x01,
    Assistant = 0x02,
    System = 0x03,
}

impl Role {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::User),
            0x02 => Some(Self::Assistant),
            0x03 => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub version: u8,
    pub role: Role,
    pub sequence: u32,
    /// Unix seconds.
    pub timestamp: u32,
}

impl MessageHeader {
    pub fn new(role: Role, sequence: u32, timestamp: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            role,
            sequence,
            timestamp,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.version;
        buf[1] = self.role as u8;
        buf[2..6].copy_from_slice(&self.sequence.to_be_bytes());
        buf[6..10].copy_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    /// Parse a header. Returns `None` on short input, an unknown version or
    /// an unknown role tag.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let buf: &[u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        if buf[0] != FORMAT_VERSION {
            return None;
        }
        let role = Role::from_u8(buf[1])?;
        let sequence = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let timestamp = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        Some(Self {
            version: buf[0],
            role,
            sequence,
            timestamp,
        })
    }
}
