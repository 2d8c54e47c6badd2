/// Key Hierarchy
///
/// Every key below the master secret is re-derived on demand and never stored:
///
/// ```text
/// MasterSecret ──HKDF(salt = scope salt)──────────▶ UserKey
/// UserKey      ──HKDF(salt = conversation id)─────▶ ConversationKey  ("encryption")
/// UserKey      ──HKDF(salt = conversation id)─────▶ IntegrityKey     ("integrity")
/// ```
///
/// Each step is HKDF-SHA256 extract-then-expand with a fixed, versioned info
/// label, so sibling keys are independent even though they share a parent.
use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{MasterSecret, ScopeSalt};

/// Derived key length in bytes.
pub const KEY_LEN: usize = 32;

const USER_KEY_INFO: &[u8] = b"ChatVault-UserKey-v1";
const ENCRYPTION_KEY_INFO: &[u8] = b"ChatVault-Conversation-encryption-v1";
const INTEGRITY_KEY_INFO: &[u8] = b"ChatVault-Conversation-integrity-v1";

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Conversation id must not be empty")]
    EmptyConversationId,
    #[error("Key derivation failed")]
    DerivationFailed,
}

pub type Result<T> = std::result::Result<T, KeyError>;

macro_rules! derived_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            /// Wrap raw key bytes. Intended for tests and key-rotation tooling.
            pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
}

derived_key!(
    /// Key bound to one principal.
    UserKey
);
derived_key!(
    /// Encrypts message tokens and media packets of one conversation.
    ConversationKey
);
derived_key!(
    /// Keys the integrity chain of one conversation.
    IntegrityKey
);

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_LEN];
    hkdf.expand(info, &mut okm)
        .map_err(|_| KeyError::DerivationFailed)?;
    Ok(okm)
}

/// Derive the key for one principal from the master secret and its salt.
pub fn derive_user_key(master: &MasterSecret, salt: &ScopeSalt) -> Result<UserKey> {
    hkdf_sha256(salt.as_bytes(), master.expose(), USER_KEY_INFO).map(UserKey)
}

/// Derive the encryption key of a conversation.
pub fn derive_conversation_key(user_key: &UserKey, conversation_id: &str) -> Result<ConversationKey> {
    if conversation_id.is_empty() {
        return Err(KeyError::EmptyConversationId);
    }
    hkdf_sha256(conversation_id.as_bytes(), user_key.as_bytes(), ENCRYPTION_KEY_INFO)
        .map(ConversationKey)
}

/// Derive the integrity-chain key of a conversation.
pub fn derive_integrity_key(user_key: &UserKey, conversation_id: &str) -> Result<IntegrityKey> {
    if conversation_id.is_empty() {
        return Err(KeyError::EmptyConversationId);
    }
    hkdf_sha256(conversation_id.as_bytes(), user_key.as_bytes(), INTEGRITY_KEY_INFO)
        .map(IntegrityKey)
}

/// Both keys a conversation needs.
#[derive(Clone, Debug)]
pub struct ConversationKeys {
    pub encryption: ConversationKey,
    pub integrity: IntegrityKey,
}

/// Owns the master secret for the lifetime of a request and hands out
/// per-scope keys.
#[derive(Debug)]
pub struct KeyHierarchy {
    master: MasterSecret,
}

impl KeyHierarchy {
    pub fn new(master: MasterSecret) -> Self {
        Self { master }
    }

    pub fn user_key(&self, salt: &ScopeSalt) -> Result<UserKey> {
        derive_user_key(&self.master, salt)
    }

    pub fn conversation_keys(
        &self,
        salt: &ScopeSalt,
        conversation_id: &str,
    ) -> Result<ConversationKeys> {
        let user_key = self.user_key(salt)?;
        Ok(ConversationKeys {
            encryption: derive_conversation_key(&user_key, conversation_id)?,
            integrity: derive_integrity_key(&user_key, conversation_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const MASTER: [u8; 32] = hex!("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");
    const SALT: [u8; 16] = hex!("a0a1a2a3a4a5a6a7a8a9aaabacadaeaf");

    fn hierarchy() -> KeyHierarchy {
        KeyHierarchy::new(MasterSecret::from_bytes(&MASTER).unwrap())
    }

    fn salt() -> ScopeSalt {
        ScopeSalt::from_bytes(&SALT).unwrap()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let h = hierarchy();
        let a = h.conversation_keys(&salt(), "conv-1").unwrap();
        let b = h.conversation_keys(&salt(), "conv-1").unwrap();
        assert_eq!(a.encryption, b.encryption);
        assert_eq!(a.integrity, b.integrity);
    }

    #[test]
    fn test_conversations_are_independent() {
        let h = hierarchy();
        let a = h.conversation_keys(&salt(), "conv-1").unwrap();
        let b = h.conversation_keys(&salt(), "conv-2").unwrap();
        assert_ne!(a.encryption, b.encryption);
        assert_ne!(a.integrity, b.integrity);
    }

    #[test]
    fn test_encryption_and_integrity_keys_differ() {
        let keys = hierarchy().conversation_keys(&salt(), "conv-1").unwrap();
        assert_ne!(keys.encryption.as_bytes(), keys.integrity.as_bytes());
    }

    #[test]
    fn test_each_input_changes_output() {
        let h = hierarchy();
        let base = h.user_key(&salt()).unwrap();

        let other_salt = ScopeSalt::from_bytes(&[0x55u8; 16]).unwrap();
        assert_ne!(base, h.user_key(&other_salt).unwrap());

        let mut other_master = MASTER;
        other_master[0] ^= 1;
        let h2 = KeyHierarchy::new(MasterSecret::from_bytes(&other_master).unwrap());
        assert_ne!(base, h2.user_key(&salt()).unwrap());
    }

    #[test]
    fn test_user_key_differs_from_master() {
        let user = hierarchy().user_key(&salt()).unwrap();
        assert_ne!(user.as_bytes(), &MASTER);
    }

    #[test]
    fn test_empty_conversation_id_rejected() {
        let user = hierarchy().user_key(&salt()).unwrap();
        assert!(matches!(
            derive_conversation_key(&user, ""),
            Err(KeyError::EmptyConversationId)
        ));
        assert!(derive_integrity_key(&user, "").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let keys = hierarchy().conversation_keys(&salt(), "conv-1").unwrap();
        assert_eq!(format!("{:?}", keys.encryption), "ConversationKey(<redacted>)");
    }
}
