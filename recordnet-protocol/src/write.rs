//! Partial-write tracking for non-blocking sockets.
//!
//! A non-blocking write may accept only part of an encoded frame. Each
//! frame waiting to go out is a [`PendingWrite`]: the bytes plus a cursor of
//! how much has been flushed. A [`WriteQueue`] keeps them in FIFO order and
//! only drops a frame once its cursor reaches the end.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io;

/// One encoded frame and how much of it has reached the socket.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    bytes: Bytes,
    offset: usize,
}

impl PendingWrite {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            offset: 0,
        }
    }

    /// Bytes not yet written.
    pub fn remaining(&self) -> &[u8] {
        &self.bytes[self.offset..]
    }

    /// Marks `n` more bytes as written. The cursor never passes the end.
    pub fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.bytes.len());
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.bytes.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of a [`WriteQueue::flush`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flush {
    /// Bytes accepted by the writer during this pass.
    pub written: usize,
    /// Whether the queue is now empty.
    pub drained: bool,
}

/// FIFO queue of frames waiting for a writable socket.
#[derive(Debug, Default)]
pub struct WriteQueue {
    queue: VecDeque<PendingWrite>,
    pending_bytes: usize,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an encoded frame.
    pub fn push(&mut self, bytes: impl Into<Bytes>) {
        let write = PendingWrite::new(bytes);
        self.pending_bytes += write.len();
        self.queue.push_back(write);
    }

    /// Writes as much as `write` accepts, front to back.
    ///
    /// `write` is a non-blocking write such as `TcpStream::try_write`. The
    /// pass stops at the first `WouldBlock`, which is not an error. A write
    /// that accepts zero bytes is reported as `WriteZero`.
    pub fn flush<F>(&mut self, mut write: F) -> io::Result<Flush>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        let mut written = 0;

        while let Some(front) = self.queue.front_mut() {
            if front.is_complete() {
                self.queue.pop_front();
                continue;
            }

            match write(front.remaining()) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted zero bytes",
                    ))
                }
                Ok(n) => {
                    let before = front.offset();
                    front.advance(n);
                    let accepted = front.offset() - before;
                    written += accepted;
                    self.pending_bytes -= accepted;
                    if front.is_complete() {
                        self.queue.pop_front();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(Flush {
            written,
            drained: self.queue.is_empty(),
        })
    }

    /// Number of frames not yet fully written.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total unwritten bytes across all queued frames.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Drops every queued frame.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that accepts at most `budget` bytes per pass, then blocks.
    struct Throttled {
        budget: usize,
        per_call: usize,
        sink: Vec<u8>,
    }

    impl Throttled {
        fn new(budget: usize, per_call: usize) -> Self {
            Self {
                budget,
                per_call,
                sink: Vec::new(),
            }
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.per_call).min(self.budget);
            self.sink.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_pending_write_cursor() {
        let mut write = PendingWrite::new(Bytes::from_static(b"abcdef"));
        assert_eq!(write.remaining(), b"abcdef");

        write.advance(4);
        assert_eq!(write.remaining(), b"ef");
        assert!(!write.is_complete());

        write.advance(10);
        assert_eq!(write.offset(), 6);
        assert!(write.is_complete());
    }

    #[test]
    fn test_flush_everything_at_once() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"hello"));
        queue.push(Bytes::from_static(b"world"));

        let mut writer = Throttled::new(usize::MAX, usize::MAX);
        let flush = queue.flush(|buf| writer.write(buf)).unwrap();

        assert_eq!(
            flush,
            Flush {
                written: 10,
                drained: true
            }
        );
        assert_eq!(writer.sink, b"helloworld");
        assert_eq!(queue.pending_bytes(), 0);
    }

    #[test]
    fn test_partial_flush_keeps_remainder_in_order() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"0123456789"));
        queue.push(Bytes::from_static(b"abc"));

        let mut writer = Throttled::new(4, 3);
        let flush = queue.flush(|buf| writer.write(buf)).unwrap();
        assert_eq!(flush.written, 4);
        assert!(!flush.drained);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pending_bytes(), 9);

        writer.budget = 100;
        let flush = queue.flush(|buf| writer.write(buf)).unwrap();
        assert_eq!(flush.written, 9);
        assert!(flush.drained);
        assert_eq!(writer.sink, b"0123456789abc");
    }

    #[test]
    fn test_would_block_is_not_an_error() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"data"));

        let flush = queue
            .flush(|_| Err(io::ErrorKind::WouldBlock.into()))
            .unwrap();
        assert_eq!(flush.written, 0);
        assert!(!flush.drained);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_zero_byte_write_is_an_error() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"data"));

        let err = queue.flush(|_| Ok(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_empty_frame_is_dropped_on_flush() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::new());
        let flush = queue.flush(|_| Ok(0)).unwrap();
        assert!(flush.drained);
    }

    #[test]
    fn test_clear() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"abc"));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pending_bytes(), 0);
    }
}
