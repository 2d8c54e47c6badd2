//! Host-side glue: derive keys, load the stored snapshot, apply one
//! transition under the conversation's writer lock, save the replacement.

use std::ops::Range;
use thiserror::Error;

use crate::config::{EngineConfig, ScopeSalt};
use crate::conversation::editor::{
    next_sequence, ConversationEditor, DeleteOutcome, EditOutcome, EditorError, IntegrityReport,
};
use crate::conversation::locks::WriterLocks;
use crate::crypto::kdf::{ConversationKeys, KeyError, KeyHierarchy};
use crate::integrity::{verify_root, IntegrityRoot};
use crate::protocol::header::Role;
use crate::protocol::message::UnpackedMessage;
use crate::protocol::token::MessageToken;
use crate::storage::{ConversationSnapshot, ConversationStore, StorageError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Key derivation: {0}")]
    Key(#[from] KeyError),
    #[error("Storage: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("Stored collection does not match its integrity root: {0}")]
    Tampered(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// One conversation of one principal, bound to a store and a lock registry.
pub struct ConversationSession<'a, S: ConversationStore> {
    conversation_id: String,
    keys: ConversationKeys,
    editor: ConversationEditor,
    store: &'a S,
    locks: &'a WriterLocks,
}

impl<'a, S: ConversationStore> ConversationSession<'a, S> {
    pub fn open(
        hierarchy: &KeyHierarchy,
        salt: &ScopeSalt,
        conversation_id: &str,
        config: EngineConfig,
        store: &'a S,
        locks: &'a WriterLocks,
    ) -> Result<Self> {
        let keys = hierarchy.conversation_keys(salt, conversation_id)?;
        Ok(Self {
            conversation_id: conversation_id.to_string(),
            keys,
            editor: ConversationEditor::new(config),
            store,
            locks,
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    fn load(&self) -> Result<(Vec<MessageToken>, IntegrityRoot)> {
        let snapshot = self
            .store
            .load(&self.conversation_id)?
            .unwrap_or_else(ConversationSnapshot::empty);
        Ok(snapshot.to_parts()?)
    }

    /// Load for a write. A collection that no longer matches its stored root
    /// is refused, so a transition never re-roots damaged history.
    fn load_for_write(&self) -> Result<Vec<MessageToken>> {
        let (tokens, root) = self.load()?;
        if !verify_root(&tokens, &root, &self.keys.integrity) {
            log::warn!(
                "Refusing write to conversation with mismatched root ({} tokens)",
                tokens.len()
            );
            return Err(SessionError::Tampered(self.conversation_id.clone()));
        }
        Ok(tokens)
    }

    fn save(&self, tokens: &[MessageToken], root: &IntegrityRoot) -> Result<()> {
        self.store
            .save(&self.conversation_id, ConversationSnapshot::from_parts(tokens, root))?;
        Ok(())
    }

    /// Append a complete turn at the next sequence number.
    pub fn append(&self, content: &str, role: Role) -> Result<u32> {
        self.locks.with_writer(&self.conversation_id, || {
            let tokens = self.load_for_write()?;
            let sequence = next_sequence(&tokens)?;
            let out = self.editor.append(
                &tokens,
                content,
                role,
                sequence,
                &self.keys.encryption,
                &self.keys.integrity,
            )?;
            self.save(&out.tokens, &out.root)?;
            Ok(out.sequence)
        })
    }

    pub fn edit(&self, target: u32, new_content: &str, regenerate: bool) -> Result<EditOutcome> {
        self.locks.with_writer(&self.conversation_id, || {
            let tokens = self.load_for_write()?;
            let out = self.editor.destructive_edit(
                &tokens,
                target,
                new_content,
                regenerate,
                &self.keys.encryption,
                &self.keys.integrity,
            )?;
            self.save(&out.tokens, &out.root)?;
            Ok(out)
        })
    }

    pub fn delete(&self, target: u32) -> Result<DeleteOutcome> {
        self.locks.with_writer(&self.conversation_id, || {
            let tokens = self.load_for_write()?;
            let out = self
                .editor
                .destructive_delete(&tokens, target, &self.keys.integrity)?;
            self.save(&out.tokens, &out.root)?;
            Ok(out)
        })
    }

    /// Verify the stored collection against the stored root.
    pub fn verify(&self) -> Result<IntegrityReport> {
        let (tokens, root) = self.load()?;
        Ok(self
            .editor
            .verify_integrity(&tokens, &root, &self.keys.encryption, &self.keys.integrity))
    }

    /// Decrypt a window of the stored history.
    pub fn viewport(&self, range: Range<usize>) -> Result<Vec<UnpackedMessage>> {
        let (tokens, _) = self.load()?;
        Ok(self
            .editor
            .decrypt_viewport(&tokens, range, &self.keys.encryption)?)
    }

    pub fn history(&self) -> Result<Vec<UnpackedMessage>> {
        self.viewport(0..usize::MAX)
    }
}
