/// Media Codec: encrypted packets for file attachments.
///
/// Packet wire format:
/// ```text
/// [magic: 4 "CVMP"][version: 1][type: 1][nonce: 24][tag: 16][checksum: 32][ciphertext: N]
/// ```
///
/// - Densely compressed containers (JPEG, PNG, MP4, ...) are encrypted as-is;
///   everything else is deflated first. The type code alone decides which.
/// - `checksum` is SHA-256 of the original plaintext. It is re-checked after
///   decryption and decompression, independently of the Poly1305 tag.
/// - magic, version, type and checksum are bound as associated data.
///
/// Keyed by the same conversation key as message tokens.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{EngineConfig, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_MEDIA_BYTES};
use crate::crypto::compression;
use crate::crypto::constant_time;
use crate::crypto::encryption::{self, NONCE_LEN, TAG_LEN};
use crate::crypto::kdf::ConversationKey;

/// Packet magic marker.
pub const MEDIA_MAGIC: [u8; 4] = *b"CVMP";
/// Current packet layout version.
pub const MEDIA_VERSION: u8 = 0x01;
/// SHA-256 checksum size.
pub const CHECKSUM_LEN: usize = 32;

const PREFIX_LEN: usize = 4 + 1 + 1;
const NONCE_OFFSET: usize = PREFIX_LEN;
const TAG_OFFSET: usize = NONCE_OFFSET + NONCE_LEN;
const CHECKSUM_OFFSET: usize = TAG_OFFSET + TAG_LEN;
/// Fixed part of every packet.
pub const MEDIA_HEADER_LEN: usize = CHECKSUM_OFFSET + CHECKSUM_LEN;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("Packet truncated: {len} bytes (min {MEDIA_HEADER_LEN})")]
    Truncated { len: usize },
    #[error("Invalid magic marker")]
    InvalidMagic,
    #[error("Unsupported packet version: {0}")]
    UnsupportedVersion(u8),
    #[error("Unknown media type code: {0:#04x}")]
    UnknownMediaType(u8),
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Compression failed: {0}")]
    Compression(String),
    #[error("Decompression failed")]
    Decompression,
    #[error("Integrity check failed")]
    IntegrityCheckFailed,
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// Stable type codes for supported mime types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MediaType {
    Jpeg = 0x01,
    Png = 0x02,
    Gif = 0x03,
    Webp = 0x04,
    Mp4 = 0x05,
    Webm = 0x06,
    Mp3 = 0x07,
    Ogg = 0x08,
    Zip = 0x09,
    PlainText = 0x20,
    Markdown = 0x21,
    Html = 0x22,
    Json = 0x23,
    Csv = 0x24,
    Xml = 0x25,
    Pdf = 0x26,
    Other = 0xFF,
}

impl MediaType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Jpeg),
            0x02 => Some(Self::Png),
            0x03 => Some(Self::Gif),
            0x04 => Some(Self::Webp),
            0x05 => Some(Self::Mp4),
            0x06 => Some(Self::Webm),
            0x07 => Some(Self::Mp3),
            0x08 => Some(Self::Ogg),
            0x09 => Some(Self::Zip),
            0x20 => Some(Self::PlainText),
            0x21 => Some(Self::Markdown),
            0x22 => Some(Self::Html),
            0x23 => Some(Self::Json),
            0x24 => Some(Self::Csv),
            0x25 => Some(Self::Xml),
            0x26 => Some(Self::Pdf),
            0xFF => Some(Self::Other),
            _ => None,
        }
    }

    /// Map a mime type (parameters ignored). Unknown types become `Other`.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/gif" => Self::Gif,
            "image/webp" => Self::Webp,
            "video/mp4" => Self::Mp4,
            "video/webm" => Self::Webm,
            "audio/mpeg" | "audio/mp3" => Self::Mp3,
            "audio/ogg" => Self::Ogg,
            "application/zip" => Self::Zip,
            "text/plain" => Self::PlainText,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/html" => Self::Html,
            "application/json" => Self::Json,
            "text/csv" => Self::Csv,
            "application/xml" | "text/xml" => Self::Xml,
            "application/pdf" => Self::Pdf,
            _ => Self::Other,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Zip => "application/zip",
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Xml => "application/xml",
            Self::Pdf => "application/pdf",
            Self::Other => "application/octet-stream",
        }
    }

    /// Already densely compressed; deflating again would only cost time.
    pub fn is_precompressed(&self) -> bool {
        matches!(
            self,
            Self::Jpeg
                | Self::Png
                | Self::Gif
                | Self::Webp
                | Self::Mp4
                | Self::Webm
                | Self::Mp3
                | Self::Ogg
                | Self::Zip
        )
    }
}

/// Output of [`MediaCodec::encrypt`].
#[derive(Clone, Debug)]
pub struct EncryptedMedia {
    pub packet: Vec<u8>,
    pub media_type: MediaType,
    pub original_size: usize,
    /// Size of the bytes that were encrypted.
    pub compressed_size: usize,
    pub compressed: bool,
    /// Hex SHA-256 of the original data.
    pub checksum: String,
}

/// Output of [`MediaCodec::decrypt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedMedia {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub media_type: MediaType,
    pub checksum: String,
}

fn associated_data(media_type: MediaType, checksum: &[u8; CHECKSUM_LEN]) -> [u8; PREFIX_LEN + CHECKSUM_LEN] {
    let mut aad = [0u8; PREFIX_LEN + CHECKSUM_LEN];
    aad[..4].copy_from_slice(&MEDIA_MAGIC);
    aad[4] = MEDIA_VERSION;
    aad[5] = media_type as u8;
    aad[PREFIX_LEN..].copy_from_slice(checksum);
    aad
}

#[derive(Clone, Debug)]
pub struct MediaCodec {
    max_bytes: usize,
    compression_level: u32,
}

impl Default for MediaCodec {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_MEDIA_BYTES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl MediaCodec {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_bytes: config.max_media_bytes,
            compression_level: config.compression_level,
        }
    }

    pub fn encrypt(&self, data: &[u8], mime_type: &str, key: &ConversationKey) -> Result<EncryptedMedia> {
        if data.len() > self.max_bytes {
            return Err(MediaError::PayloadTooLarge {
                size: data.len(),
                max: self.max_bytes,
            });
        }

        let media_type = MediaType::from_mime(mime_type);
        let checksum: [u8; CHECKSUM_LEN] = Sha256::digest(data).into();

        let compressed = !media_type.is_precompressed();
        let body = if compressed {
            compression::compress(data, self.compression_level)
                .map_err(|e| MediaError::Compression(e.to_string()))?
        } else {
            data.to_vec()
        };

        let nonce = encryption::generate_nonce();
        let aad = associated_data(media_type, &checksum);
        let (ciphertext, tag) = encryption::seal_detached(&body, &aad, key.as_bytes(), &nonce)
            .map_err(|_| MediaError::EncryptionFailed)?;

        let mut packet = Vec::with_capacity(MEDIA_HEADER_LEN + ciphertext.len());
        packet.extend_from_slice(&aad[..PREFIX_LEN]);
        packet.extend_from_slice(&nonce);
        packet.extend_from_slice(&tag);
        packet.extend_from_slice(&checksum);
        packet.extend_from_slice(&ciphertext);

        log::debug!(
            "Encrypted media type={} original={} stored={} compressed={}",
            media_type.mime(),
            data.len(),
            body.len(),
            compressed
        );

        Ok(EncryptedMedia {
            packet,
            media_type,
            original_size: data.len(),
            compressed_size: body.len(),
            compressed,
            checksum: hex::encode(checksum),
        })
    }

    pub fn decrypt(&self, packet: &[u8], key: &ConversationKey) -> Result<DecryptedMedia> {
        if packet.len() < MEDIA_HEADER_LEN {
            return Err(MediaError::Truncated { len: packet.len() });
        }
        if packet[..4] != MEDIA_MAGIC {
            return Err(MediaError::InvalidMagic);
        }
        if packet[4] != MEDIA_VERSION {
            return Err(MediaError::UnsupportedVersion(packet[4]));
        }
        let media_type = MediaType::from_u8(packet[5]).ok_or(MediaError::UnknownMediaType(packet[5]))?;

        let nonce: &[u8; NONCE_LEN] = packet[NONCE_OFFSET..TAG_OFFSET]
            .try_into()
            .map_err(|_| MediaError::Truncated { len: packet.len() })?;
        let tag: &[u8; TAG_LEN] = packet[TAG_OFFSET..CHECKSUM_OFFSET]
            .try_into()
            .map_err(|_| MediaError::Truncated { len: packet.len() })?;
        let checksum: &[u8; CHECKSUM_LEN] = packet[CHECKSUM_OFFSET..MEDIA_HEADER_LEN]
            .try_into()
            .map_err(|_| MediaError::Truncated { len: packet.len() })?;
        let ciphertext = &packet[MEDIA_HEADER_LEN..];

        let aad = associated_data(media_type, checksum);
        let body = encryption::open_detached(ciphertext, tag, &aad, key.as_bytes(), nonce)
            .map_err(|_| MediaError::DecryptionFailed)?;

        let data = if media_type.is_precompressed() {
            body
        } else {
            compression::decompress(&body, self.max_bytes).map_err(|_| MediaError::Decompression)?
        };

        let actual: [u8; CHECKSUM_LEN] = Sha256::digest(&data).into();
        if !constant_time::eq_32(&actual, checksum) {
            log::warn!("Media checksum mismatch after successful decryption");
            return Err(MediaError::IntegrityCheckFailed);
        }

        Ok(DecryptedMedia {
            data,
            mime_type: media_type.mime().to_string(),
            media_type,
            checksum: hex::encode(actual),
        })
    }
}

/// [`MediaCodec::encrypt`] with default limits.
pub fn encrypt_media(data: &[u8], mime_type: &str, key: &ConversationKey) -> Result<EncryptedMedia> {
    MediaCodec::default().encrypt(data, mime_type, key)
}

/// [`MediaCodec::decrypt`] with default limits.
pub fn decrypt_media(packet: &[u8], key: &ConversationKey) -> Result<DecryptedMedia> {
    MediaCodec::default().decrypt(packet, key)
}
