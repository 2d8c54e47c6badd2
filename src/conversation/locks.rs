//! Per-conversation writer serialisation.
//!
//! Append, edit and delete read the whole collection and write back a full
//! replacement, so two unserialised writers on one conversation can lose an
//! append or resurrect a deleted tail. Readers need no lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct WriterLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WriterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `conversation_id`. Every caller asking for the same
    /// id while any handle is alive gets the same mutex.
    pub fn handle(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop entries nobody holds any more.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the writer lock for `conversation_id`.
    pub fn with_writer<T>(&self, conversation_id: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(conversation_id);
        let _guard: MutexGuard<'_, ()> = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of conversations with a live lock handle.
    pub fn active(&self) -> usize {
        let map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }
}
