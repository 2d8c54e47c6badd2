//! Keyed hash chain over a token collection.
//!
//! ```text
//! D_0 = HMAC(K, "")
//! D_i = HMAC(K, D_{i-1} || token_i)
//! root = D_n            (n > 0)
//! root = [0; 32]        (n = 0, sentinel)
//! ```
//!
//! The fold is order sensitive and keyed: without the integrity key nobody
//! can produce a root that verifies, even with every token in hand. The
//! empty-collection sentinel is not evidence of anything on its own.

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::constant_time;
use crate::crypto::kdf::{IntegrityKey, KEY_LEN};

type HmacSha256 = Hmac<Sha256>;

/// Digest size in bytes.
pub const ROOT_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum RootParseError {
    #[error("Invalid root encoding: {0}")]
    InvalidEncoding(String),
    #[error("Invalid root length: expected {ROOT_LEN}, got {0}")]
    InvalidLength(usize),
}

/// Digest summarising a whole token collection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrityRoot([u8; ROOT_LEN]);

impl IntegrityRoot {
    /// Root of the empty collection.
    pub const EMPTY: IntegrityRoot = IntegrityRoot([0u8; ROOT_LEN]);

    pub fn from_bytes(bytes: [u8; ROOT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_LEN] {
        &self.0
    }

    pub fn is_empty_sentinel(&self) -> bool {
        constant_time::eq_32(&self.0, &Self::EMPTY.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, RootParseError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| RootParseError::InvalidEncoding(e.to_string()))?;
        let arr: [u8; ROOT_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| RootParseError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for IntegrityRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityRoot({})", self.to_hex())
    }
}

impl fmt::Display for IntegrityRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn keyed_hash(key: &IntegrityKey, parts: &[&[u8]]) -> [u8; ROOT_LEN] {
    // A key shorter than the SHA-256 block is zero-padded to it, so this is
    // plain HMAC over the 32-byte key.
    let mut padded = Key::<HmacSha256>::default();
    padded[..KEY_LEN].copy_from_slice(key.as_bytes());
    let mut mac = <HmacSha256 as KeyInit>::new(&padded);
    padded.as_mut_slice().zeroize();
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Fold the chain over `tokens`.
pub fn compute_root<T: AsRef<[u8]>>(tokens: &[T], key: &IntegrityKey) -> IntegrityRoot {
    if tokens.is_empty() {
        return IntegrityRoot::EMPTY;
    }
    let seed = keyed_hash(key, &[]);
    let digest = tokens
        .iter()
        .fold(seed, |prev, token| keyed_hash(key, &[prev.as_slice(), token.as_ref()]));
    IntegrityRoot(digest)
}

/// Recompute the root and compare it in constant time with `stored`.
pub fn verify_root<T: AsRef<[u8]>>(tokens: &[T], stored: &IntegrityRoot, key: &IntegrityKey) -> bool {
    let computed = compute_root(tokens, key);
    constant_time::eq_32(&computed.0, &stored.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> IntegrityKey {
        IntegrityKey::from_bytes([0x17; 32])
    }

    fn tokens() -> Vec<Vec<u8>> {
        vec![b"token-0".to_vec(), b"token-1".to_vec(), b"token-2".to_vec()]
    }

    #[test]
    fn test_empty_collection_is_sentinel() {
        let empty: Vec<Vec<u8>> = Vec::new();
        let root = compute_root(&empty, &key());
        assert_eq!(root, IntegrityRoot::EMPTY);
        assert!(root.is_empty_sentinel());
        assert!(verify_root(&empty, &IntegrityRoot::EMPTY, &key()));
    }

    #[test]
    fn test_root_is_deterministic() {
        assert_eq!(compute_root(&tokens(), &key()), compute_root(&tokens(), &key()));
        assert!(!compute_root(&tokens(), &key()).is_empty_sentinel());
    }

    #[test]
    fn test_any_byte_flip_changes_root() {
        let original = compute_root(&tokens(), &key());
        for t in 0..3 {
            for b in 0..tokens()[t].len() {
                let mut tampered = tokens();
                tampered[t][b] ^= 0x01;
                assert_ne!(compute_root(&tampered, &key()), original);
                assert!(!verify_root(&tampered, &original, &key()));
            }
        }
    }

    #[test]
    fn test_reorder_insert_remove_change_root() {
        let original = compute_root(&tokens(), &key());

        let mut swapped = tokens();
        swapped.swap(0, 1);
        assert_ne!(compute_root(&swapped, &key()), original);

        let mut inserted = tokens();
        inserted.insert(1, b"extra".to_vec());
        assert_ne!(compute_root(&inserted, &key()), original);

        let mut removed = tokens();
        removed.pop();
        assert_ne!(compute_root(&removed, &key()), original);
    }

    #[test]
    fn test_root_depends_on_key() {
        let other = IntegrityKey::from_bytes([0x18; 32]);
        assert_ne!(compute_root(&tokens(), &key()), compute_root(&tokens(), &other));
        assert!(!verify_root(&tokens(), &compute_root(&tokens(), &key()), &other));
    }

    #[test]
    fn test_keyed_hash_is_standard_hmac() {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key().as_bytes()).unwrap();
        mac.update(b"token-0");
        let expected: [u8; ROOT_LEN] = mac.finalize().into_bytes().into();
        assert_eq!(keyed_hash(&key(), &[b"token-0".as_slice()]), expected);
        assert_eq!(keyed_hash(&key(), &[b"token-".as_slice(), b"0".as_slice()]), expected);
    }

    #[test]
    fn test_single_token_differs_from_unkeyed_seed() {
        let single = vec![Vec::<u8>::new()];
        assert_ne!(compute_root(&single, &key()), IntegrityRoot::EMPTY);
    }

    #[test]
    fn test_hex_roundtrip() {
        let root = compute_root(&tokens(), &key());
        assert_eq!(IntegrityRoot::from_hex(&root.to_hex()).unwrap(), root);
        assert!(matches!(
            IntegrityRoot::from_hex("abcd"),
            Err(RootParseError::InvalidLength(2))
        ));
        assert!(IntegrityRoot::from_hex("zz").is_err());
    }
}
