// SPDX-License-Identifier: Apache-2.0
//! Bounded byte rings for input and output streams.
//!
//! Overflow drops the oldest bytes: the substrate treats its input as an
//! unbounded ephemeral stream, so under backpressure the freshest data
//! wins and a counter records the loss.

use std::collections::VecDeque;

/// Fixed-capacity FIFO over raw bytes.
#[derive(Debug)]
pub struct ByteRing {
    buf: VecDeque<u8>,
    cap: usize,
    dropped: u64,
}

impl ByteRing {
    /// Builds an empty ring holding at most `cap` bytes.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap.min(4096)),
            cap: cap.max(1),
            dropped: 0,
        }
    }

    /// Appends `bytes`, evicting the oldest content on overflow.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.len() == self.cap {
                self.buf.pop_front();
                self.dropped += 1;
            }
            self.buf.push_back(b);
        }
    }

    /// Moves up to `max` bytes into `out`, oldest first.
    pub fn drain_into(&mut self, out: &mut Vec<u8>, max: usize) {
        let take = self.buf.len().min(max);
        out.extend(self.buf.drain(..take));
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Lifetime count of bytes lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_respects_frame_bound() {
        let mut ring = ByteRing::with_capacity(16);
        ring.push_slice(b"abcdefgh");
        let mut out = Vec::new();
        ring.drain_into(&mut out, 3);
        assert_eq!(out, b"abc");
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn overflow_drops_oldest_bytes() {
        let mut ring = ByteRing::with_capacity(4);
        ring.push_slice(b"abcdef");
        let mut out = Vec::new();
        ring.drain_into(&mut out, 16);
        assert_eq!(out, b"cdef");
        assert_eq!(ring.dropped(), 2);
    }
}
