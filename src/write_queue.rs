//! Send-side buffering: an overflow FIFO for bytes the socket wasn't
//! ready to accept yet.

use std::collections::VecDeque;
use std::io::{self, Write};

/// Outcome of attempting to push a frame through the write queue.
#[derive(Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    /// Everything, including any previously queued bytes, was written.
    Empty,
    /// Some bytes remain queued; writable interest should stay enabled.
    Pending,
}

/// FIFO overflow buffer for frames the socket would otherwise block on.
///
/// There is no byte cap here; a caller that never drains its peer is a
/// policy problem for the embedding daemon, not this crate.
#[derive(Default)]
pub struct WriteQueue {
    pending: VecDeque<u8>,
}

impl WriteQueue {
    pub fn new() -> Self {
        WriteQueue { pending: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Push `frame` onto the tail of anything already queued, then try to
    /// drain as much as possible through `sock` without blocking.
    pub fn write<W: Write>(&mut self, sock: &mut W, frame: &[u8]) -> io::Result<WriteOutcome> {
        self.pending.extend(frame.iter().copied());
        self.flush(sock)
    }

    /// Drain as much of the queue as the socket will currently accept.
    pub fn flush<W: Write>(&mut self, sock: &mut W) -> io::Result<WriteOutcome> {
        while !self.pending.is_empty() {
            let (front, _) = self.pending.as_slices();
            let chunk = if front.is_empty() {
                // as_slices()'s first slice is empty only when the deque's
                // logical start wrapped to the second slice; rotate so the
                // whole buffer is contiguous.
                self.pending.make_contiguous();
                self.pending.as_slices().0
            } else {
                front
            };
            match sock.write(chunk) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteOutcome::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(WriteOutcome::Empty)
    }
}
