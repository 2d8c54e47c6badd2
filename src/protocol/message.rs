/// Message Codec
///
/// pack:   content ─▶ deflate ─▶ XChaCha20-Poly1305(aad = header) ─▶ token
/// unpack: token ─▶ structural checks ─▶ decrypt+verify ─▶ inflate ─▶ content
///
/// Structural validation always happens before the key is touched, and a
/// failed decryption is a single opaque error no matter the cause.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::crypto::compression::{self, CompressionError};
use crate::crypto::encryption::{self, TAG_LEN};
use crate::crypto::kdf::ConversationKey;
use crate::protocol::header::{MessageHeader, Role};
use crate::protocol::token::{MessageToken, MAX_CIPHERTEXT_LEN};

/// Hex characters in [`UnpackedMessage::content_hash`].
pub const CONTENT_HASH_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Content is empty")]
    EmptyContent,
    #[error("Content too large: {size} bytes (max {max})")]
    ContentTooLarge { size: usize, max: usize },
    #[error("Invalid sequence number: {0}")]
    InvalidSequence(i64),
    #[error("Ciphertext too large: {size} bytes (max {max})")]
    CiphertextTooLarge { size: usize, max: usize },
    #[error("Invalid token encoding")]
    InvalidEncoding,
    #[error("Token truncated: {len} bytes (min {min})")]
    Truncated { len: usize, min: usize },
    #[error("Unsupported token version: {0}")]
    UnsupportedVersion(u8),
    #[error("Unknown role tag: {0}")]
    UnknownRole(u8),
    #[error("Ciphertext length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Sequence mismatch: expected {expected}, found {found}")]
    SequenceMismatch { expected: u32, found: u32 },
    #[error("Decompression failed")]
    Decompression,
    #[error("Content is not valid UTF-8")]
    InvalidUtf8,
    #[error("Compression failed: {0}")]
    Compression(String),
    #[error("Encryption failed")]
    EncryptionFailed,
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Plaintext recovered from a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpackedMessage {
    pub content: String,
    pub role: Role,
    pub sequence: u32,
    pub timestamp: u32,
    /// Truncated SHA-256 of the content, for caller-side auditing only.
    pub content_hash: String,
}

/// Check a host-supplied sequence number and narrow it to `u32`.
pub fn validate_sequence(sequence: i64) -> Result<u32> {
    u32::try_from(sequence).map_err(|_| CodecError::InvalidSequence(sequence))
}

/// Short content fingerprint. Not a security property.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(CONTENT_HASH_LEN);
    hex
}

/// Current Unix time in seconds, clamped into the header's 32-bit field.
pub fn now_timestamp() -> u32 {
    Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Message codec bound to an [`EngineConfig`].
#[derive(Clone, Debug, Default)]
pub struct MessageCodec {
    config: EngineConfig,
}

impl MessageCodec {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pack one chat turn into a token.
    ///
    /// # Arguments
    /// * `content` - Non-empty text, at most `max_content_bytes`
    /// * `role` - Author of the turn
    /// * `sequence` - Position in the conversation, starting at 0
    /// * `key` - Conversation encryption key
    /// * `timestamp` - Unix seconds; `None` uses the current time
    pub fn pack(
        &self,
        content: &str,
        role: Role,
        sequence: u32,
        key: &ConversationKey,
        timestamp: Option<u32>,
    ) -> Result<MessageToken> {
        if content.is_empty() {
            return Err(CodecError::EmptyContent);
        }
        if content.len() > self.config.max_content_bytes {
            return Err(CodecError::ContentTooLarge {
                size: content.len(),
                max: self.config.max_content_bytes,
            });
        }

        let header = MessageHeader::new(role, sequence, timestamp.unwrap_or_else(now_timestamp));
        let header_bytes = header.to_bytes();

        let compressed = compression::compress(content.as_bytes(), self.config.compression_level)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        if compressed.len() + TAG_LEN > MAX_CIPHERTEXT_LEN {
            return Err(CodecError::CiphertextTooLarge {
                size: compressed.len() + TAG_LEN,
                max: MAX_CIPHERTEXT_LEN,
            });
        }

        let nonce = encryption::generate_nonce();
        let ciphertext = encryption::seal(&compressed, &header_bytes, key.as_bytes(), &nonce)
            .map_err(|_| CodecError::EncryptionFailed)?;

        MessageToken::assemble(&header, &ciphertext, &nonce)
    }

    /// Decrypt and verify a token.
    ///
    /// If `expected_sequence` is given and differs from the header, fails with
    /// `SequenceMismatch` before any decryption is attempted.
    pub fn unpack(
        &self,
        token: &MessageToken,
        key: &ConversationKey,
        expected_sequence: Option<u32>,
    ) -> Result<UnpackedMessage> {
        let parts = token.parts()?;

        if let Some(expected) = expected_sequence {
            if parts.header.sequence != expected {
                return Err(CodecError::SequenceMismatch {
                    expected,
                    found: parts.header.sequence,
                });
            }
        }

        let compressed = encryption::open(parts.ciphertext, parts.header_bytes, key.as_bytes(), parts.nonce)
            .map_err(|_| CodecError::DecryptionFailed)?;

        let raw = match compression::decompress(&compressed, self.config.max_content_bytes) {
            Ok(raw) => raw,
            Err(CompressionError::OutputTooLarge { limit }) => {
                return Err(CodecError::ContentTooLarge {
                    size: limit + 1,
                    max: limit,
                })
            }
            Err(_) if self.config.legacy_uncompressed_fallback => {
                log::warn!(
                    "Token seq={} failed to inflate; using legacy uncompressed payload",
                    parts.header.sequence
                );
                compressed
            }
            Err(_) => return Err(CodecError::Decompression),
        };

        let content = String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
        let content_hash = content_hash(&content);

        Ok(UnpackedMessage {
            content,
            role: parts.header.role,
            sequence: parts.header.sequence,
            timestamp: parts.header.timestamp,
            content_hash,
        })
    }
}

/// [`MessageCodec::pack`] with the default configuration.
pub fn pack(
    content: &str,
    role: Role,
    sequence: u32,
    key: &ConversationKey,
    timestamp: Option<u32>,
) -> Result<MessageToken> {
    MessageCodec::default().pack(content, role, sequence, key, timestamp)
}

/// [`MessageCodec::unpack`] with the default configuration.
pub fn unpack(
    token: &MessageToken,
    key: &ConversationKey,
    expected_sequence: Option<u32>,
) -> Result<UnpackedMessage> {
    MessageCodec::default().unpack(token, key, expected_sequence)
}

/// Read only the header. No key, no ciphertext.
pub fn peek_header(token: &MessageToken) -> Option<MessageHeader> {
    token.header()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::NONCE_LEN;
    use crate::protocol::header::HEADER_LEN;

    fn key() -> ConversationKey {
        ConversationKey::from_bytes([0x42; 32])
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let token = pack("Hello, world!", Role::User, 7, &key(), Some(1_700_000_000)).unwrap();
        let msg = unpack(&token, &key(), Some(7)).unwrap();

        assert_eq!(msg.content, "Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.sequence, 7);
        assert_eq!(msg.timestamp, 1_700_000_000);
        assert_eq!(msg.content_hash, content_hash("Hello, world!"));
        assert_eq!(msg.content_hash.len(), CONTENT_HASH_LEN);
    }

    #[test]
    fn test_roundtrip_through_storage_form() {
        let text = "multi-byte ✓ content — ünïcödé";
        let token = pack(text, Role::Assistant, 0, &key(), None).unwrap();
        let restored = MessageToken::decode(&token.encode()).unwrap();
        assert_eq!(unpack(&restored, &key(), None).unwrap().content, text);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            pack("", Role::User, 0, &key(), None),
            Err(CodecError::EmptyContent)
        ));

        let too_big = "x".repeat(100_001);
        assert!(matches!(
            pack(&too_big, Role::User, 0, &key(), None),
            Err(CodecError::ContentTooLarge { size: 100_001, max: 100_000 })
        ));

        let at_limit = "x".repeat(100_000);
        assert!(pack(&at_limit, Role::User, 0, &key(), None).is_ok());

        assert_eq!(validate_sequence(0).unwrap(), 0);
        assert_eq!(validate_sequence(u32::MAX as i64).unwrap(), u32::MAX);
        assert!(validate_sequence(-1).is_err());
        assert!(validate_sequence(u32::MAX as i64 + 1).is_err());
    }

    #[test]
    fn test_wrong_key_is_opaque_failure() {
        let token = pack("secret", Role::User, 0, &key(), None).unwrap();
        let other = ConversationKey::from_bytes([0x43; 32]);
        assert!(matches!(
            unpack(&token, &other, None),
            Err(CodecError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_any_ciphertext_byte_flip_fails() {
        let token = pack("tamper target", Role::User, 0, &key(), None).unwrap();
        let bytes = token.as_bytes().to_vec();
        let ct_start = HEADER_LEN + 2;
        let ct_end = bytes.len() - NONCE_LEN;

        for i in ct_start..ct_end {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let tampered = MessageToken::from_bytes(tampered).unwrap();
            assert!(matches!(
                unpack(&tampered, &key(), None),
                Err(CodecError::DecryptionFailed)
            ));
        }
    }

    #[test]
    fn test_header_and_nonce_tamper_fails() {
        let token = pack("tamper target", Role::User, 0, &key(), Some(100)).unwrap();

        let mut ts_flip = token.as_bytes().to_vec();
        ts_flip[9] ^= 0x01;
        let ts_flip = MessageToken::from_bytes(ts_flip).unwrap();
        assert!(matches!(unpack(&ts_flip, &key(), None), Err(CodecError::DecryptionFailed)));

        let mut role_swap = token.as_bytes().to_vec();
        role_swap[1] = Role::System as u8;
        let role_swap = MessageToken::from_bytes(role_swap).unwrap();
        assert!(matches!(unpack(&role_swap, &key(), None), Err(CodecError::DecryptionFailed)));

        let mut nonce_flip = token.as_bytes().to_vec();
        let last = nonce_flip.len() - 1;
        nonce_flip[last] ^= 0x80;
        let nonce_flip = MessageToken::from_bytes(nonce_flip).unwrap();
        assert!(matches!(unpack(&nonce_flip, &key(), None), Err(CodecError::DecryptionFailed)));
    }

    #[test]
    fn test_sequence_mismatch_is_distinct() {
        let token = pack("hi", Role::User, 3, &key(), None).unwrap();
        assert!(matches!(
            unpack(&token, &key(), Some(4)),
            Err(CodecError::SequenceMismatch { expected: 4, found: 3 })
        ));
    }

    #[test]
    fn test_fresh_nonce_per_pack() {
        let a = pack("same", Role::User, 0, &key(), Some(5)).unwrap();
        let b = pack("same", Role::User, 0, &key(), Some(5)).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            unpack(&a, &key(), None).unwrap(),
            unpack(&b, &key(), None).unwrap()
        );
    }

    #[test]
    fn test_peek_header_needs_no_key() {
        let token = pack("peek", Role::System, 12, &key(), Some(99)).unwrap();
        let header = peek_header(&token).unwrap();
        assert_eq!(header.role, Role::System);
        assert_eq!(header.sequence, 12);
        assert_eq!(header.timestamp, 99);
    }

    #[test]
    fn test_uncompressed_payload_strict_by_default() {
        let header = MessageHeader::new(Role::User, 0, 1);
        let nonce = encryption::generate_nonce();
        let sealed = encryption::seal(b"raw legacy text", &header.to_bytes(), key().as_bytes(), &nonce).unwrap();
        let token = MessageToken::assemble(&header, &sealed, &nonce).unwrap();

        assert!(matches!(unpack(&token, &key(), None), Err(CodecError::Decompression)));

        let lenient = MessageCodec::new(EngineConfig {
            legacy_uncompressed_fallback: true,
            ..EngineConfig::default()
        });
        assert_eq!(lenient.unpack(&token, &key(), None).unwrap().content, "raw legacy text");
    }

    #[test]
    fn test_highly_compressible_content_is_small() {
        let text = "a".repeat(50_000);
        let token = pack(&text, Role::User, 0, &key(), None).unwrap();
        assert!(token.len() < 1_000);
        assert_eq!(unpack(&token, &key(), None).unwrap().content, text);
    }
}
