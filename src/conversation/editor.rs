/// Conversation Editor
///
/// The only transitions defined over a token collection are the ones that
/// leave it consistent with a freshly computed root:
///
/// - `append`: grow by exactly one token at `last + 1`.
/// - `destructive_edit`: keep everything before the target, re-pack the
///   target with new content under its original sequence and role, drop the
///   rest.
/// - `destructive_delete`: keep everything before the target, drop the
///   target and the rest. Needs no encryption key.
///
/// Nothing here is reversible and nothing is retried. Callers must serialise
/// writers per conversation (see [`crate::conversation::WriterLocks`]).
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::crypto::kdf::{ConversationKey, IntegrityKey};
use crate::integrity::{compute_root, verify_root, IntegrityRoot};
use crate::protocol::header::{MessageHeader, Role};
use crate::protocol::message::{now_timestamp, CodecError, MessageCodec, UnpackedMessage};
use crate::protocol::token::MessageToken;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Target sequence not found: {0}")]
    TargetNotFound(u32),
    #[error("Corrupted header at index {index}")]
    CorruptHeader { index: usize },
    #[error("Non-contiguous sequence: expected {expected}, got {found}")]
    NonContiguousSequence { expected: u32, found: u32 },
    #[error("Codec error at index {index}: {source}")]
    TokenFailed {
        index: usize,
        #[source]
        source: CodecError,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, EditorError>;

/// Result of [`ConversationEditor::append`].
#[derive(Clone, Debug)]
pub struct AppendOutcome {
    pub tokens: Vec<MessageToken>,
    pub root: IntegrityRoot,
    pub sequence: u32,
}

/// Result of [`ConversationEditor::destructive_edit`].
#[derive(Clone, Debug)]
pub struct EditOutcome {
    pub tokens: Vec<MessageToken>,
    pub root: IntegrityRoot,
    /// Tokens that existed after the target.
    pub deleted_count: usize,
    /// Role carried over from the replaced token.
    pub role: Role,
    /// Sequence the host should generate a fresh reply at, when requested.
    pub regenerate_from: Option<u32>,
}

/// Result of [`ConversationEditor::destructive_delete`].
#[derive(Clone, Debug)]
pub struct DeleteOutcome {
    pub tokens: Vec<MessageToken>,
    pub root: IntegrityRoot,
    /// Tokens that existed after the target.
    pub deleted_count: usize,
}

/// A single finding of [`ConversationEditor::verify_integrity`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    RootMismatch,
    CorruptHeader { index: usize },
    SequenceMismatch { index: usize, expected: u32, found: u32 },
    TimestampRegression { sequence: u32, previous: u32, current: u32 },
    DecryptionFailed { index: usize },
    /// Authentic ciphertext whose plaintext could not be decoded.
    DecodeFailed { index: usize },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootMismatch => write!(f, "integrity root mismatch"),
            Self::CorruptHeader { index } => write!(f, "corrupted header at index {}", index),
            Self::SequenceMismatch { index, expected, found } => write!(
                f,
                "sequence mismatch at index {}: expected {}, found {}",
                index, expected, found
            ),
            Self::TimestampRegression { sequence, previous, current } => write!(
                f,
                "timestamp regression at sequence {}: {} < {}",
                sequence, current, previous
            ),
            Self::DecryptionFailed { index } => write!(f, "decryption failed at index {}", index),
            Self::DecodeFailed { index } => write!(f, "decode failed at index {}", index),
        }
    }
}

/// Outcome of a full verification pass. Mismatches are data, not errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<IntegrityIssue>,
    /// Sequence of the last token that decrypted cleanly.
    pub last_valid_sequence: Option<u32>,
}

/// Sequence the next appended token must carry.
pub fn next_sequence(tokens: &[MessageToken]) -> Result<u32> {
    match tokens.last() {
        None => Ok(0),
        Some(last) => {
            let header = last.header().ok_or(EditorError::CorruptHeader {
                index: tokens.len() - 1,
            })?;
            Ok(header.sequence.saturating_add(1))
        }
    }
}

/// Index and header of the token carrying `target`, found by header scan only.
pub fn locate(tokens: &[MessageToken], target: u32) -> Result<(usize, MessageHeader)> {
    for (index, token) in tokens.iter().enumerate() {
        let header = token.header().ok_or(EditorError::CorruptHeader { index })?;
        if header.sequence == target {
            return Ok((index, header));
        }
    }
    Err(EditorError::TargetNotFound(target))
}

fn index_as_sequence(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Timestamp for a new token that never runs behind the token before it.
fn monotonic_timestamp(previous: Option<&MessageToken>) -> u32 {
    let now = now_timestamp();
    previous
        .and_then(MessageToken::header)
        .map_or(now, |h| now.max(h.timestamp))
}

/// Composes the message codec and the integrity chain.
#[derive(Clone, Debug, Default)]
pub struct ConversationEditor {
    codec: MessageCodec,
}

impl ConversationEditor {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            codec: MessageCodec::new(config),
        }
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    /// Pack `content` at `sequence`, append it, and recompute the root.
    pub fn append(
        &self,
        tokens: &[MessageToken],
        content: &str,
        role: Role,
        sequence: u32,
        conversation_key: &ConversationKey,
        integrity_key: &IntegrityKey,
    ) -> Result<AppendOutcome> {
        let expected = next_sequence(tokens)?;
        if sequence != expected {
            return Err(EditorError::NonContiguousSequence {
                expected,
                found: sequence,
            });
        }

        let timestamp = monotonic_timestamp(tokens.last());
        let token = self
            .codec
            .pack(content, role, sequence, conversation_key, Some(timestamp))?;

        let mut new_tokens = Vec::with_capacity(tokens.len() + 1);
        new_tokens.extend_from_slice(tokens);
        new_tokens.push(token);
        let root = compute_root(&new_tokens, integrity_key);

        log::debug!("Appended seq={} role={} (count={})", sequence, role.as_str(), new_tokens.len());

        Ok(AppendOutcome {
            tokens: new_tokens,
            root,
            sequence,
        })
    }

    /// Replace the token at `target` and discard everything after it.
    ///
    /// The replacement keeps the original token's sequence and role; only
    /// the content changes.
    pub fn destructive_edit(
        &self,
        tokens: &[MessageToken],
        target: u32,
        new_content: &str,
        regenerate: bool,
        conversation_key: &ConversationKey,
        integrity_key: &IntegrityKey,
    ) -> Result<EditOutcome> {
        let (index, original) = locate(tokens, target)?;
        let preserved_role = original.role;
        let preserved_sequence = original.sequence;

        let kept = &tokens[..index];
        let timestamp = monotonic_timestamp(kept.last());
        let replacement = self.codec.pack(
            new_content,
            preserved_role,
            preserved_sequence,
            conversation_key,
            Some(timestamp),
        )?;

        let mut new_tokens = Vec::with_capacity(index + 1);
        new_tokens.extend_from_slice(kept);
        new_tokens.push(replacement);
        let root = compute_root(&new_tokens, integrity_key);
        let deleted_count = tokens.len() - index - 1;

        log::debug!(
            "Destructive edit at seq={} role={} (deleted={}, regenerate={})",
            preserved_sequence,
            preserved_role.as_str(),
            deleted_count,
            regenerate
        );

        Ok(EditOutcome {
            tokens: new_tokens,
            root,
            deleted_count,
            role: preserved_role,
            regenerate_from: regenerate.then(|| preserved_sequence.saturating_add(1)),
        })
    }

    /// Drop the token at `target` and everything after it.
    pub fn destructive_delete(
        &self,
        tokens: &[MessageToken],
        target: u32,
        integrity_key: &IntegrityKey,
    ) -> Result<DeleteOutcome> {
        let (index, _) = locate(tokens, target)?;
        let new_tokens = tokens[..index].to_vec();
        let root = compute_root(&new_tokens, integrity_key);
        let deleted_count = tokens.len() - index - 1;

        log::debug!("Destructive delete at seq={} (deleted={})", target, deleted_count);

        Ok(DeleteOutcome {
            tokens: new_tokens,
            root,
            deleted_count,
        })
    }

    /// Root check plus a full decrypt pass.
    ///
    /// Sequences must equal their positions and timestamps must not decrease.
    /// The pass stops at the first token that fails to decrypt or decode.
    pub fn verify_integrity(
        &self,
        tokens: &[MessageToken],
        stored_root: &IntegrityRoot,
        conversation_key: &ConversationKey,
        integrity_key: &IntegrityKey,
    ) -> IntegrityReport {
        let mut errors = Vec::new();

        if !verify_root(tokens, stored_root, integrity_key) {
            log::warn!("Integrity root mismatch over {} tokens", tokens.len());
            errors.push(IntegrityIssue::RootMismatch);
        }

        let mut last_valid_sequence = None;
        let mut previous_timestamp: Option<u32> = None;

        for (index, token) in tokens.iter().enumerate() {
            let Some(header) = token.header() else {
                errors.push(IntegrityIssue::CorruptHeader { index });
                break;
            };

            let expected = index_as_sequence(index);
            if header.sequence != expected {
                errors.push(IntegrityIssue::SequenceMismatch {
                    index,
                    expected,
                    found: header.sequence,
                });
            }

            let message = match self.codec.unpack(token, conversation_key, None) {
                Ok(message) => message,
                Err(CodecError::DecryptionFailed) => {
                    errors.push(IntegrityIssue::DecryptionFailed { index });
                    break;
                }
                Err(_) => {
                    errors.push(IntegrityIssue::DecodeFailed { index });
                    break;
                }
            };

            if let Some(previous) = previous_timestamp {
                if message.timestamp < previous {
                    errors.push(IntegrityIssue::TimestampRegression {
                        sequence: message.sequence,
                        previous,
                        current: message.timestamp,
                    });
                }
            }
            previous_timestamp = Some(message.timestamp);
            last_valid_sequence = Some(message.sequence);
        }

        let valid = errors.is_empty();
        if !valid {
            log::warn!("Verification found {} issue(s)", errors.len());
        }

        IntegrityReport {
            valid,
            errors,
            last_valid_sequence,
        }
    }

    /// Decrypt a contiguous window of the collection.
    ///
    /// The range is clamped to the collection; each token must carry the
    /// sequence matching its position.
    pub fn decrypt_viewport(
        &self,
        tokens: &[MessageToken],
        range: Range<usize>,
        conversation_key: &ConversationKey,
    ) -> Result<Vec<UnpackedMessage>> {
        let end = range.end.min(tokens.len());
        let start = range.start.min(end);

        (start..end)
            .map(|index| {
                self.codec
                    .unpack(&tokens[index], conversation_key, Some(index_as_sequence(index)))
                    .map_err(|source| EditorError::TokenFailed { index, source })
            })
            .collect()
    }
}

/// [`ConversationEditor::append`] with the default configuration.
pub fn append(
    tokens: &[MessageToken],
    content: &str,
    role: Role,
    sequence: u32,
    conversation_key: &ConversationKey,
    integrity_key: &IntegrityKey,
) -> Result<AppendOutcome> {
    ConversationEditor::default().append(tokens, content, role, sequence, conversation_key, integrity_key)
}

/// [`ConversationEditor::destructive_edit`] with the default configuration.
pub fn destructive_edit(
    tokens: &[MessageToken],
    target: u32,
    new_content: &str,
    regenerate: bool,
    conversation_key: &ConversationKey,
    integrity_key: &IntegrityKey,
) -> Result<EditOutcome> {
    ConversationEditor::default().destructive_edit(
        tokens,
        target,
        new_content,
        regenerate,
        conversation_key,
        integrity_key,
    )
}

/// [`ConversationEditor::destructive_delete`] with the default configuration.
pub fn destructive_delete(
    tokens: &[MessageToken],
    target: u32,
    integrity_key: &IntegrityKey,
) -> Result<DeleteOutcome> {
    ConversationEditor::default().destructive_delete(tokens, target, integrity_key)
}

/// [`ConversationEditor::verify_integrity`] with the default configuration.
pub fn verify_integrity(
    tokens: &[MessageToken],
    stored_root: &IntegrityRoot,
    conversation_key: &ConversationKey,
    integrity_key: &IntegrityKey,
) -> IntegrityReport {
    ConversationEditor::default().verify_integrity(tokens, stored_root, conversation_key, integrity_key)
}
