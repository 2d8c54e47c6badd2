//! Accumulates a streamed reply until it is complete.
//!
//! Only [`ReplyBuffer::finish`] yields content that may be appended. An
//! aborted or dropped buffer leaves the token collection untouched.

use crate::config::DEFAULT_MAX_CONTENT_BYTES;
use crate::protocol::message::CodecError;

#[derive(Debug)]
pub struct ReplyBuffer {
    content: String,
    limit: usize,
    chunks: usize,
}

impl Default for ReplyBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_BYTES)
    }
}

impl ReplyBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            content: String::new(),
            limit,
            chunks: 0,
        }
    }

    /// Add a streamed chunk. Fails once the reply would exceed the limit.
    pub fn push(&mut self, chunk: &str) -> Result<(), CodecError> {
        let size = self.content.len() + chunk.len();
        if size > self.limit {
            return Err(CodecError::ContentTooLarge {
                size,
                max: self.limit,
            });
        }
        self.content.push_str(chunk);
        self.chunks += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Complete reply, or `EmptyContent` if nothing was produced.
    pub fn finish(self) -> Result<String, CodecError> {
        if self.content.is_empty() {
            return Err(CodecError::EmptyContent);
        }
        Ok(self.content)
    }

    /// Discard everything received so far.
    pub fn abort(self) {
        log::debug!("Reply aborted after {} chunk(s), {} bytes", self.chunks, self.content.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_accumulate() {
        let mut buffer = ReplyBuffer::default();
        for chunk in ["Hel", "lo, ", "world"] {
            buffer.push(chunk).unwrap();
        }
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.len(), 12);
        assert_eq!(buffer.finish().unwrap(), "Hello, world");
    }

    #[test]
    fn test_empty_reply_cannot_finish() {
        assert!(matches!(ReplyBuffer::default().finish(), Err(CodecError::EmptyContent)));
    }

    #[test]
    fn test_limit_enforced() {
        let mut buffer = ReplyBuffer::new(8);
        buffer.push("1234").unwrap();
        assert!(matches!(
            buffer.push("56789"),
            Err(CodecError::ContentTooLarge { size: 9, max: 8 })
        ));
        assert_eq!(buffer.len(), 4);
        buffer.abort();
    }
}
