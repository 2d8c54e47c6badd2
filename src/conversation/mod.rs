pub mod editor;
pub mod locks;
pub mod session;
pub mod stream;

pub use editor::{
    append, destructive_delete, destructive_edit, locate, next_sequence, verify_integrity,
    AppendOutcome, ConversationEditor, DeleteOutcome, EditOutcome, EditorError, IntegrityIssue,
    IntegrityReport,
};
pub use locks::WriterLocks;
pub use session::{ConversationSession, SessionError};
pub use stream::ReplyBuffer;
