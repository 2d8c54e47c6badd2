//! Persistence contract.
//!
//! The engine never talks to storage. The host persists, per conversation,
//! the encoded token array, the integrity root and a message count; this
//! module defines that record and the trait a host store implements. The
//! actual database (SQL, KV, document store) lives in the application.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::integrity::IntegrityRoot;
use crate::protocol::token::{decode_collection, encode_collection, MessageToken};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error("Corrupted token at index {index}")]
    CorruptToken { index: usize },
    #[error("Corrupted integrity root: {0}")]
    CorruptRoot(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What the host stores for one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Tokens in storage form, in sequence order.
    pub tokens: Vec<String>,
    /// Hex-encoded integrity root.
    pub root: String,
    pub message_count: usize,
}

impl ConversationSnapshot {
    pub fn empty() -> Self {
        Self::from_parts(&[], &IntegrityRoot::EMPTY)
    }

    pub fn from_parts(tokens: &[MessageToken], root: &IntegrityRoot) -> Self {
        Self {
            tokens: encode_collection(tokens),
            root: root.to_hex(),
            message_count: tokens.len(),
        }
    }

    /// Decode tokens and root for the engine.
    pub fn to_parts(&self) -> Result<(Vec<MessageToken>, IntegrityRoot)> {
        let tokens = decode_collection(&self.tokens)
            .map_err(|(index, _)| StorageError::CorruptToken { index })?;
        let root = IntegrityRoot::from_hex(&self.root)
            .map_err(|e| StorageError::CorruptRoot(e.to_string()))?;
        Ok((tokens, root))
    }
}

// ---------------------------------------------------------------------------
// Store contract (host implements)
// ---------------------------------------------------------------------------

/// Keyed by conversation id. Implementations replace the whole snapshot on
/// save; writers must already be serialised by the caller.
pub trait ConversationStore {
    /// `None` if the conversation has never been saved.
    fn load(&self, conversation_id: &str) -> Result<Option<ConversationSnapshot>>;

    fn save(&self, conversation_id: &str, snapshot: ConversationSnapshot) -> Result<()>;

    fn remove(&self, conversation_id: &str) -> Result<()>;
}

/// In-process store, for tests and single-node hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, ConversationSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversationStore for MemoryStore {
    fn load(&self, conversation_id: &str) -> Result<Option<ConversationSnapshot>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(conversation_id).cloned())
    }

    fn save(&self, conversation_id: &str, snapshot: ConversationSnapshot) -> Result<()> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(conversation_id.to_string(), snapshot);
        Ok(())
    }

    fn remove(&self, conversation_id: &str) -> Result<()> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(conversation_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(conversation_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::ConversationKey;
    use crate::protocol::header::Role;
    use crate::protocol::message::pack;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ConversationSnapshot::empty();
        assert_eq!(snapshot.message_count, 0);
        assert_eq!(snapshot.root, "0".repeat(64));
        let (tokens, root) = snapshot.to_parts().unwrap();
        assert!(tokens.is_empty());
        assert_eq!(root, IntegrityRoot::EMPTY);
    }

    #[test]
    fn test_snapshot_parts_roundtrip() {
        let key = ConversationKey::from_bytes([3u8; 32]);
        let tokens = vec![
            pack("one", Role::User, 0, &key, None).unwrap(),
            pack("two", Role::Assistant, 1, &key, None).unwrap(),
        ];
        let root = IntegrityRoot::from_bytes([9u8; 32]);
        let snapshot = ConversationSnapshot::from_parts(&tokens, &root);
        assert_eq!(snapshot.message_count, 2);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: ConversationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to_parts().unwrap(), (tokens, root));
    }

    #[test]
    fn test_corrupt_snapshot() {
        let mut snapshot = ConversationSnapshot::empty();
        snapshot.tokens.push("@@@".into());
        assert!(matches!(snapshot.to_parts(), Err(StorageError::CorruptToken { index: 0 })));

        let bad_root = ConversationSnapshot {
            root: "xyz".into(),
            ..ConversationSnapshot::empty()
        };
        assert!(matches!(bad_root.to_parts(), Err(StorageError::CorruptRoot(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load("c1").unwrap().is_none());

        store.save("c1", ConversationSnapshot::empty()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("c1").unwrap(), Some(ConversationSnapshot::empty()));

        store.remove("c1").unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.remove("c1"), Err(StorageError::NotFound(_))));
    }
}
