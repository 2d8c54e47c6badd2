pub mod compression;
pub mod constant_time;
pub mod encryption;
pub mod kdf;

pub use encryption::{generate_nonce, open, seal, EncryptionError, NONCE_LEN, TAG_LEN};
pub use kdf::{
    derive_conversation_key, derive_integrity_key, derive_user_key, ConversationKey,
    ConversationKeys, IntegrityKey, KeyError, KeyHierarchy, UserKey, KEY_LEN,
};
