//! Engine configuration and root key material.
//!
//! Nothing in this crate reads process-wide state. The host builds an
//! [`EngineConfig`] (usually from JSON) and a [`MasterSecret`] (usually from
//! its secret store) and passes both in explicitly. The master secret lives
//! only as long as the value that owns it and is zeroed on drop.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Master secret length in bytes.
pub const MASTER_SECRET_LEN: usize = 32;
/// Shortest accepted scope salt.
pub const MIN_SALT_LEN: usize = 16;
/// Longest accepted scope salt.
pub const MAX_SALT_LEN: usize = 64;
/// Length of salts produced by [`ScopeSalt::generate`].
pub const GENERATED_SALT_LEN: usize = 32;

/// Largest content accepted by the message codec by default.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 100_000;
/// Largest media payload accepted by default (25 MiB).
pub const DEFAULT_MAX_MEDIA_BYTES: usize = 25 * 1024 * 1024;
/// DEFLATE level 9: best ratio.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid master secret length: expected {MASTER_SECRET_LEN}, got {0}")]
    InvalidSecretLength(usize),
    #[error("Invalid scope salt length: {0} (allowed {MIN_SALT_LEN}..={MAX_SALT_LEN})")]
    InvalidSaltLength(usize),
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("Invalid compression level: {0} (allowed 0..=9)")]
    InvalidCompressionLevel(u32),
    #[error("Invalid limit `{name}`: {value}")]
    InvalidLimit { name: &'static str, value: usize },
    #[error("Config parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Tunables for the message and media codecs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum plaintext size of a single chat turn, in bytes.
    pub max_content_bytes: usize,
    /// DEFLATE level used when packing (0..=9).
    pub compression_level: u32,
    /// Maximum plaintext size of a media payload, in bytes.
    pub max_media_bytes: usize,
    /// Accept tokens whose payload fails to inflate as if they were stored
    /// uncompressed. Off by default: a failed inflate is reported as an error.
    pub legacy_uncompressed_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
            legacy_uncompressed_fallback: false,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject values the codecs cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(self.compression_level));
        }
        if self.max_content_bytes == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_content_bytes",
                value: self.max_content_bytes,
            });
        }
        if self.max_media_bytes == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_media_bytes",
                value: self.max_media_bytes,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MasterSecret
// ---------------------------------------------------------------------------

/// Server-held root of the key hierarchy.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret([u8; MASTER_SECRET_LEN]);

impl MasterSecret {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; MASTER_SECRET_LEN] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidSecretLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = hex::decode(encoded.trim())
            .map_err(|e| ConfigError::InvalidEncoding(e.to_string()))?;
        let secret = Self::from_bytes(&bytes);
        bytes.zeroize();
        secret
    }

    /// Accepts standard base64 with or without padding.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let mut bytes = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(trimmed)
            .map_err(|e| ConfigError::InvalidEncoding(e.to_string()))?;
        let secret = Self::from_bytes(&bytes);
        bytes.zeroize();
        secret
    }

    pub(crate) fn expose(&self) -> &[u8; MASTER_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// ScopeSalt
// ---------------------------------------------------------------------------

/// Per-principal salt, persisted next to the principal's record.
#[derive(Clone, PartialEq, Eq)]
pub struct ScopeSalt(Vec<u8>);

impl ScopeSalt {
    /// Fresh random salt for a new principal.
    pub fn generate() -> Self {
        let mut salt = vec![0u8; GENERATED_SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&bytes.len()) {
            return Err(ConfigError::InvalidSaltLength(bytes.len()));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes =
            hex::decode(encoded.trim()).map_err(|e| ConfigError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .or_else(|_| STANDARD.decode(encoded.trim()))
            .map_err(|e| ConfigError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ScopeSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeSalt({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_content_bytes, 100_000);
        assert_eq!(config.compression_level, 9);
        assert!(!config.legacy_uncompressed_fallback);
    }

    #[test]
    fn test_config_json_partial() {
        let config = EngineConfig::from_json(r#"{"max_content_bytes": 5000}"#).unwrap();
        assert_eq!(config.max_content_bytes, 5000);
        assert_eq!(config.max_media_bytes, DEFAULT_MAX_MEDIA_BYTES);

        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_config_rejects_bad_level() {
        let result = EngineConfig::from_json(r#"{"compression_level": 12}"#);
        assert!(matches!(result, Err(ConfigError::InvalidCompressionLevel(12))));
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_master_secret_lengths() {
        assert!(MasterSecret::from_bytes(&[7u8; 32]).is_ok());
        assert!(matches!(
            MasterSecret::from_bytes(&[7u8; 31]),
            Err(ConfigError::InvalidSecretLength(31))
        ));
        let hex_secret = "11".repeat(32);
        assert_eq!(MasterSecret::from_hex(&hex_secret).unwrap().expose(), &[0x11u8; 32]);
        let b64 = STANDARD.encode([0x22u8; 32]);
        assert_eq!(MasterSecret::from_base64(&b64).unwrap().expose(), &[0x22u8; 32]);
    }

    #[test]
    fn test_master_secret_debug_redacted() {
        let secret = MasterSecret::from_bytes(&[0xAB; 32]).unwrap();
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("ab"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_scope_salt() {
        let s1 = ScopeSalt::generate();
        let s2 = ScopeSalt::generate();
        assert_eq!(s1.as_bytes().len(), GENERATED_SALT_LEN);
        assert_ne!(s1, s2);

        assert_eq!(ScopeSalt::from_hex(&s1.to_hex()).unwrap(), s1);
        assert_eq!(ScopeSalt::from_base64(&s1.to_base64()).unwrap(), s1);
        assert!(ScopeSalt::from_bytes(&[0u8; 8]).is_err());
        assert!(ScopeSalt::from_bytes(&[0u8; 65]).is_err());
    }
}
