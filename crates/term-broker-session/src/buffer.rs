//! Bounded replay buffer for late-joining viewers.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// Maximum buffered output per session (100 KiB).
pub const REPLAY_CAPACITY: usize = 100 * 1024;

/// Ordered chunks of recent process output with a running byte total.
///
/// Eviction removes whole oldest chunks until the total fits the capacity,
/// so the post-eviction size can undershoot the capacity by up to one
/// chunk's length. Replay is scrollback, not a transcript; exact byte
/// boundaries don't matter and whole chunks keep appends O(1).
#[derive(Debug)]
pub struct ReplayBuffer {
    chunks: VecDeque<Bytes>,
    total: usize,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a buffer with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(REPLAY_CAPACITY)
    }

    /// Create a buffer bounded at `capacity` bytes.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            total: 0,
            capacity,
        }
    }

    /// Append a chunk, evicting oldest chunks until the bound holds.
    pub fn push(&mut self, chunk: Bytes) {
        self.total += chunk.len();
        self.chunks.push_back(chunk);
        while self.total > self.capacity {
            let Some(oldest) = self.chunks.pop_front() else {
                break;
            };
            self.total -= oldest.len();
        }
    }

    /// All buffered output in chronological order.
    #[must_use]
    pub fn snapshot(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.total);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }

    /// Current buffered size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.total
    }

    /// Whether the buffer holds no output.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_order() {
        let mut buf = ReplayBuffer::new();
        buf.push(Bytes::from_static(b"hello"));
        buf.push(Bytes::from_static(b" world"));
        assert_eq!(buf.snapshot(), Bytes::from_static(b"hello world"));
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut buf = ReplayBuffer::new();
        let chunk = Bytes::from(vec![b'x'; 1024]);
        for _ in 0..(REPLAY_CAPACITY / 1024 + 10) {
            buf.push(chunk.clone());
            assert!(buf.len() <= REPLAY_CAPACITY);
        }
        assert!(buf.len() <= REPLAY_CAPACITY);
        assert!(!buf.is_empty());
    }

    #[test]
    fn evicts_whole_chunks_only() {
        let mut buf = ReplayBuffer::with_capacity(10);
        buf.push(Bytes::from_static(b"aaaa"));
        buf.push(Bytes::from_static(b"bbbb"));
        // 4 + 4 + 4 > 10: the oldest chunk goes in its entirety.
        buf.push(Bytes::from_static(b"cccc"));
        assert_eq!(buf.snapshot(), Bytes::from_static(b"bbbbcccc"));
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn oversized_chunk_leaves_buffer_empty() {
        let mut buf = ReplayBuffer::with_capacity(4);
        buf.push(Bytes::from_static(b"toolarge"));
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), Bytes::new());
    }
}
