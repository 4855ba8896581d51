//! The receive-side octet buffer.
//!
//! Grows in place, doubling to the next power of two at least as large
//! as the requested length, so repeated oversized frames don't
//! reallocate every time.

use crate::wire::MAX_PACKET;

/// Growable octet buffer with a read cursor and an end cursor.
///
/// Invariant: `0 <= read <= end <= data.len()`, and `end >= HEADER_SIZE`
/// is required before [`crate::client::Client`] will attempt to dispatch.
pub struct IngressBuffer {
    data: Vec<u8>,
    end: usize,
}

impl IngressBuffer {
    pub fn new() -> Self {
        IngressBuffer { data: vec![0u8; MAX_PACKET], end: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// The filled prefix of the buffer.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.end]
    }

    /// Ensure at least `needed` bytes of capacity, growing in place by
    /// doubling (to the next power of two >= `needed`) if necessary.
    pub fn ensure_capacity(&mut self, needed: usize) {
        if self.data.len() >= needed {
            return;
        }
        let mut new_cap = self.data.len().max(1);
        while new_cap < needed {
            new_cap *= 2;
        }
        self.data.resize(new_cap, 0);
    }

    /// The writable tail after `end`, used as the target of the next
    /// non-blocking read.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    pub fn advance_end(&mut self, n: usize) {
        self.end += n;
        debug_assert!(self.end <= self.data.len());
    }

    /// Reset to the empty state for the next frame. Capacity is kept
    /// (shrinking back to [`MAX_PACKET`] only if it grew, to bound memory
    /// held by one oversized outlier frame).
    pub fn reset(&mut self) {
        self.end = 0;
        if self.data.len() > MAX_PACKET {
            self.data.truncate(MAX_PACKET);
            self.data.shrink_to_fit();
            self.data.resize(MAX_PACKET, 0);
        }
    }
}

impl Default for IngressBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_max_packet_capacity() {
        let buf = IngressBuffer::new();
        assert_eq!(buf.capacity(), MAX_PACKET);
        assert_eq!(buf.end(), 0);
    }

    #[test]
    fn grows_to_next_power_of_two() {
        let mut buf = IngressBuffer::new();
        buf.ensure_capacity(MAX_PACKET + 1);
        assert_eq!(buf.capacity(), MAX_PACKET * 2);
        assert!(buf.capacity() >= MAX_PACKET + 1);
    }

    #[test]
    fn ensure_capacity_is_noop_when_already_big_enough() {
        let mut buf = IngressBuffer::new();
        let cap_before = buf.capacity();
        buf.ensure_capacity(16);
        assert_eq!(buf.capacity(), cap_before);
    }

    #[test]
    fn reset_shrinks_oversized_buffer_back_down() {
        let mut buf = IngressBuffer::new();
        buf.ensure_capacity(MAX_PACKET * 4);
        buf.advance_end(10);
        buf.reset();
        assert_eq!(buf.end(), 0);
        assert_eq!(buf.capacity(), MAX_PACKET);
    }
}
