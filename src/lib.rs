//! # Chat Vault
//!
//! **Encrypted, tamper-evident storage format for chat history.**
//!
//! Every turn of a conversation is sealed into a self-contained message token
//! (compressed, XChaCha20-Poly1305 encrypted, header-authenticated) and the
//! ordered token collection is bound together by a keyed hash chain. A host
//! application stores the tokens and the chain root; the engine never touches
//! storage or the network.
//!
//! ## Quick Start
//!
//! ```rust
//! use chat_vault::config::{EngineConfig, MasterSecret, ScopeSalt};
//! use chat_vault::conversation::{ConversationSession, WriterLocks};
//! use chat_vault::crypto::KeyHierarchy;
//! use chat_vault::protocol::Role;
//! use chat_vault::storage::MemoryStore;
//!
//! let hierarchy = KeyHierarchy::new(MasterSecret::from_bytes(&[7u8; 32]).unwrap());
//! let salt = ScopeSalt::generate();
//! let store = MemoryStore::new();
//! let locks = WriterLocks::new();
//!
//! let session = ConversationSession::open(
//!     &hierarchy, &salt, "conversation-1", EngineConfig::default(), &store, &locks,
//! ).unwrap();
//! session.append("Hello", Role::User).unwrap();
//! assert!(session.verify().unwrap().valid);
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Engine limits, master secret and per-principal salt |
//! | [`crypto`] | Key hierarchy, AEAD, compression, constant-time compare |
//! | [`protocol`] | Message header, token wire format, message codec |
//! | [`integrity`] | Keyed hash chain over a token collection |
//! | [`conversation`] | Editor transitions, verification, viewport, writer locks, sessions |
//! | [`media`] | Encrypted attachment packets |
//! | [`storage`] | Host persistence contract and in-memory store |

#![allow(clippy::too_many_arguments, clippy::type_complexity)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Engine configuration and root key material.
pub mod config;

/// Key derivation, encryption, compression and comparison primitives.
pub mod crypto;

/// Message header, token format and the message codec.
pub mod protocol;

/// Keyed hash chain over the ordered token collection.
pub mod integrity;

/// Append, destructive edit/delete, verification and decryption of history.
pub mod conversation;

/// Encrypted media attachments.
pub mod media;

/// What the host persists and how it is loaded back.
pub mod storage;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use config::{ConfigError, EngineConfig, MasterSecret, ScopeSalt};

pub use crypto::{ConversationKey, ConversationKeys, IntegrityKey, KeyHierarchy, UserKey};

pub use protocol::{pack, peek_header, unpack, CodecError, MessageCodec, MessageToken, Role, UnpackedMessage};

pub use integrity::{compute_root, verify_root, IntegrityRoot};

pub use conversation::{
    append, destructive_delete, destructive_edit, verify_integrity, ConversationEditor,
    ConversationSession, EditorError, IntegrityIssue, IntegrityReport, ReplyBuffer, WriterLocks,
};

pub use media::{decrypt_media, encrypt_media, MediaCodec, MediaError, MediaType};

pub use storage::{ConversationSnapshot, ConversationStore, MemoryStore, StorageError};

// ── Library metadata ────────────────────────────────────────────────────────

/// Chat Vault version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string.
pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().contains('.'));
    }

    #[test]
    fn test_end_to_end_roundtrip() {
        let hierarchy = KeyHierarchy::new(MasterSecret::from_bytes(&[0x11; 32]).unwrap());
        let salt = ScopeSalt::from_bytes(&[0x22; 16]).unwrap();
        let keys = hierarchy.conversation_keys(&salt, "conv-e2e").unwrap();

        let first = append(&[], "What is 2+2?", Role::User, 0, &keys.encryption, &keys.integrity).unwrap();
        let second = append(
            &first.tokens,
            "4",
            Role::Assistant,
            1,
            &keys.encryption,
            &keys.integrity,
        )
        .unwrap();

        assert!(verify_root(&second.tokens, &second.root, &keys.integrity));
        let report = verify_integrity(&second.tokens, &second.root, &keys.encryption, &keys.integrity);
        assert!(report.valid);
        assert_eq!(report.last_valid_sequence, Some(1));

        let reply = unpack(&second.tokens[1], &keys.encryption, Some(1)).unwrap();
        assert_eq!(reply.content, "4");
        assert_eq!(reply.role, Role::Assistant);
    }

    #[test]
    fn test_media_under_conversation_key() {
        let hierarchy = KeyHierarchy::new(MasterSecret::from_bytes(&[0x33; 32]).unwrap());
        let salt = ScopeSalt::from_bytes(&[0x44; 16]).unwrap();
        let keys = hierarchy.conversation_keys(&salt, "conv-media").unwrap();

        let packet = encrypt_media(b"# notes\n- one\n- two\n", "text/markdown", &keys.encryption).unwrap();
        let out = decrypt_media(&packet.packet, &keys.encryption).unwrap();
        assert_eq!(out.media_type, MediaType::Markdown);
        assert_eq!(out.data, b"# notes\n- one\n- two\n");
    }
}
