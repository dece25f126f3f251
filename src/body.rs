//! Request body buffer.
//!
//! Every chunk handed to the facade is retained so it can be replayed onto the next hop
//! of a 307/308 chain. The running total is checked against the request's
//! `max_body_length` on each push.

use crate::error::{FollowError, Result};
use bytes::Bytes;

/// Ordered body chunks with a running total.
#[derive(Debug, Clone)]
pub(crate) struct BodyBuffer {
    chunks: Vec<Bytes>,
    total: usize,
    limit: usize,
}

impl BodyBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        BodyBuffer {
            chunks: Vec::new(),
            total: 0,
            limit,
        }
    }

    /// Append a chunk.
    ///
    /// Fails with [`FollowError::BodyTooLarge`] when the chunk would take the total past
    /// the limit; the chunk is not retained in that case.
    pub(crate) fn push(&mut self, chunk: Bytes) -> Result<()> {
        let total = self.total.saturating_add(chunk.len());
        if total > self.limit {
            return Err(FollowError::BodyTooLarge { limit: self.limit });
        }
        self.total = total;
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// Chunks in write order.
    pub(crate) fn chunks(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    /// Drop the retained chunks. The running total is kept so the limit still covers
    /// bytes written before the release.
    pub(crate) fn release(&mut self) {
        self.chunks = Vec::new();
    }
}
