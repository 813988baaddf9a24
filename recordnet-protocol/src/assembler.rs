//! Incremental frame assembly across partial reads.
//!
//! A [`FrameAssembler`] holds the read-side state of one connection. Raw
//! chunks from non-blocking reads are fed in as they arrive; the assembler
//! consumes only the bytes belonging to the frame in progress and hands back
//! at most one completed payload per call. Frames are back-to-back on the
//! stream, so callers keep feeding the unconsumed tail of a chunk until it
//! is empty:
//!
//! ```
//! use recordnet_protocol::{Frame, FrameAssembler};
//!
//! let mut wire = Frame::new(&b"first"[..]).encode().unwrap();
//! wire.extend_from_slice(&Frame::new(&b"second"[..]).encode().unwrap());
//!
//! let mut assembler = FrameAssembler::new();
//! let mut chunk = &wire[..];
//! let mut payloads = Vec::new();
//! while !chunk.is_empty() {
//!     let fed = assembler.feed(chunk).unwrap();
//!     chunk = &chunk[fed.consumed..];
//!     payloads.extend(fed.payload);
//! }
//! assert_eq!(payloads.len(), 2);
//! ```

use crate::error::ProtocolError;
use crate::frame::{check_length, LENGTH_PREFIX_SIZE};
use crate::MAX_FRAME_BYTES;
use bytes::{Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Collecting the 4-byte length prefix.
    AwaitingLength,
    /// Length known and validated; collecting `expected` payload bytes.
    AwaitingPayload { expected: usize },
    /// A framing violation was seen; the stream cannot be resynchronised.
    Failed,
}

/// Outcome of a single [`FrameAssembler::feed`] call.
#[derive(Debug, Default)]
pub struct Feed {
    /// Number of bytes taken from the front of the chunk.
    pub consumed: usize,
    /// The payload completed by this call, if any.
    pub payload: Option<Bytes>,
}

/// Per-connection read state machine.
#[derive(Debug)]
pub struct FrameAssembler {
    state: State,
    length_buf: [u8; LENGTH_PREFIX_SIZE],
    length_read: usize,
    payload: BytesMut,
    max_frame_bytes: u32,
}

impl FrameAssembler {
    /// Creates an assembler enforcing the protocol-wide frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }

    /// Creates an assembler enforcing a custom frame limit.
    pub fn with_max_frame_bytes(max_frame_bytes: u32) -> Self {
        Self {
            state: State::AwaitingLength,
            length_buf: [0; LENGTH_PREFIX_SIZE],
            length_read: 0,
            payload: BytesMut::new(),
            max_frame_bytes,
        }
    }

    /// Feeds a chunk of raw bytes.
    ///
    /// Consumes bytes until either the chunk is exhausted or one frame is
    /// complete. Bytes left over belong to the next frame and must be fed
    /// again. An empty chunk consumes nothing.
    ///
    /// A length prefix above the frame limit returns
    /// [`ProtocolError::FrameTooLarge`] before any payload buffer is
    /// allocated; every later call returns [`ProtocolError::AssemblerFailed`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Feed, ProtocolError> {
        let mut consumed = 0;

        loop {
            match self.state {
                State::Failed => return Err(ProtocolError::AssemblerFailed),
                State::AwaitingLength => {
                    let want = LENGTH_PREFIX_SIZE - self.length_read;
                    let take = want.min(chunk.len() - consumed);
                    self.length_buf[self.length_read..self.length_read + take]
                        .copy_from_slice(&chunk[consumed..consumed + take]);
                    self.length_read += take;
                    consumed += take;

                    if self.length_read < LENGTH_PREFIX_SIZE {
                        return Ok(Feed {
                            consumed,
                            payload: None,
                        });
                    }

                    let length = u32::from_be_bytes(self.length_buf);
                    if let Err(e) = check_length(u64::from(length), self.max_frame_bytes) {
                        self.state = State::Failed;
                        return Err(e);
                    }

                    let expected = length as usize;
                    self.payload = BytesMut::with_capacity(expected);
                    self.state = State::AwaitingPayload { expected };
                }
                State::AwaitingPayload { expected } => {
                    let want = expected - self.payload.len();
                    let take = want.min(chunk.len() - consumed);
                    self.payload
                        .extend_from_slice(&chunk[consumed..consumed + take]);
                    consumed += take;

                    if self.payload.len() < expected {
                        return Ok(Feed {
                            consumed,
                            payload: None,
                        });
                    }

                    let payload = std::mem::take(&mut self.payload).freeze();
                    self.reset();
                    return Ok(Feed {
                        consumed,
                        payload: Some(payload),
                    });
                }
            }
        }
    }

    /// Feeds a whole chunk, collecting every payload it completes.
    pub fn feed_all(&mut self, mut chunk: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        let mut payloads = Vec::new();
        while !chunk.is_empty() {
            let fed = self.feed(chunk)?;
            chunk = &chunk[fed.consumed..];
            payloads.extend(fed.payload);
        }
        Ok(payloads)
    }

    /// Returns whether a frame is partially assembled.
    pub fn is_mid_frame(&self) -> bool {
        match self.state {
            State::AwaitingLength => self.length_read > 0,
            State::AwaitingPayload { .. } => true,
            State::Failed => false,
        }
    }

    /// Returns whether a framing violation has been seen.
    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// Returns the configured frame limit.
    pub fn max_frame_bytes(&self) -> u32 {
        self.max_frame_bytes
    }

    fn reset(&mut self) {
        self.state = State::AwaitingLength;
        self.length_read = 0;
        self.length_buf = [0; LENGTH_PREFIX_SIZE];
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use proptest::prelude::*;

    fn encode(payload: &[u8]) -> Vec<u8> {
        Frame::new(payload.to_vec()).encode().unwrap().to_vec()
    }

    #[test]
    fn test_whole_frame_in_one_chunk() {
        let wire = encode(b"hello");
        let mut assembler = FrameAssembler::new();

        let fed = assembler.feed(&wire).unwrap();
        assert_eq!(fed.consumed, wire.len());
        assert_eq!(fed.payload.as_deref(), Some(&b"hello"[..]));
        assert!(!assembler.is_mid_frame());
    }

    #[test]
    fn test_empty_chunk_consumes_nothing() {
        let mut assembler = FrameAssembler::new();
        let fed = assembler.feed(&[]).unwrap();
        assert_eq!(fed.consumed, 0);
        assert!(fed.payload.is_none());
    }

    #[test]
    fn test_split_length_prefix() {
        let wire = encode(b"split");
        let mut assembler = FrameAssembler::new();

        let fed = assembler.feed(&wire[..2]).unwrap();
        assert_eq!(fed.consumed, 2);
        assert!(fed.payload.is_none());
        assert!(assembler.is_mid_frame());

        let fed = assembler.feed(&wire[2..]).unwrap();
        assert_eq!(fed.payload.as_deref(), Some(&b"split"[..]));
    }

    #[test]
    fn test_zero_length_frame() {
        let mut assembler = FrameAssembler::new();
        let fed = assembler.feed(&[0, 0, 0, 0, 0xAA]).unwrap();
        assert_eq!(fed.consumed, 4);
        assert_eq!(fed.payload.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut wire = encode(b"first");
        wire.extend(encode(b"second"));

        let mut assembler = FrameAssembler::new();
        let fed = assembler.feed(&wire).unwrap();
        assert_eq!(fed.payload.as_deref(), Some(&b"first"[..]));
        assert!(fed.consumed < wire.len());

        let fed2 = assembler.feed(&wire[fed.consumed..]).unwrap();
        assert_eq!(fed2.payload.as_deref(), Some(&b"second"[..]));
        assert_eq!(fed.consumed + fed2.consumed, wire.len());
    }

    #[test]
    fn test_feed_all_keeps_partial_tail() {
        let mut wire = encode(b"a");
        wire.extend(encode(b"bc"));
        let tail = encode(b"def");
        wire.extend_from_slice(&tail[..5]);

        let mut assembler = FrameAssembler::new();
        let payloads = assembler.feed_all(&wire).unwrap();
        assert_eq!(payloads, vec![Bytes::from("a"), Bytes::from("bc")]);
        assert!(assembler.is_mid_frame());

        let payloads = assembler.feed_all(&tail[5..]).unwrap();
        assert_eq!(payloads, vec![Bytes::from("def")]);
    }

    #[test]
    fn test_oversized_length_is_fatal() {
        let mut assembler = FrameAssembler::with_max_frame_bytes(1024);
        let result = assembler.feed(&[0x00, 0x00, 0x04, 0x01]);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 1025, max: 1024 })
        ));
        assert!(assembler.is_failed());

        // No resynchronisation: even a valid frame is refused afterwards.
        let result = assembler.feed(&encode(b"ok"));
        assert!(matches!(result, Err(ProtocolError::AssemblerFailed)));
    }

    #[test]
    fn test_negative_length_does_not_allocate() {
        let mut assembler = FrameAssembler::new();
        let result = assembler.feed(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
        assert_eq!(assembler.payload.capacity(), 0);
    }

    #[test]
    fn test_state_resets_between_frames() {
        let mut assembler = FrameAssembler::new();
        for text in ["one", "two", "three"] {
            let fed = assembler.feed(&encode(text.as_bytes())).unwrap();
            assert_eq!(fed.payload.as_deref(), Some(text.as_bytes()));
            assert_eq!(assembler.state, State::AwaitingLength);
            assert_eq!(assembler.length_read, 0);
        }
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_payloads(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..300), 1..5),
            cuts in proptest::collection::vec(1usize..64, 0..40),
        ) {
            let mut wire = Vec::new();
            for p in &payloads {
                wire.extend(encode(p));
            }

            let mut assembler = FrameAssembler::new();
            let mut decoded = Vec::new();
            let mut rest = &wire[..];
            let mut cuts = cuts.into_iter();
            while !rest.is_empty() {
                let size = cuts.next().unwrap_or(rest.len()).min(rest.len());
                let (chunk, tail) = rest.split_at(size);
                decoded.extend(assembler.feed_all(chunk).unwrap());
                rest = tail;
            }

            let decoded: Vec<Vec<u8>> = decoded.iter().map(|b| b.to_vec()).collect();
            prop_assert_eq!(decoded, payloads);
            prop_assert!(!assembler.is_mid_frame());
        }

        #[test]
        fn prop_byte_at_a_time_matches_whole(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let wire = encode(&payload);

            let mut whole = FrameAssembler::new();
            let at_once = whole.feed_all(&wire).unwrap();

            let mut single = FrameAssembler::new();
            let mut one_by_one = Vec::new();
            for byte in &wire {
                one_by_one.extend(single.feed_all(std::slice::from_ref(byte)).unwrap());
            }

            prop_assert_eq!(at_once, one_by_one);
        }
    }
}
