//! Per-connection state machine.
//!
//! A connection owns its socket, its [`FrameAssembler`] and its
//! [`WriteQueue`]. It waits for readiness with an interest that depends on
//! the queue: read-only while nothing is queued, read+write while responses
//! are waiting, write-only once the queue reaches the backpressure limit.
//!
//! The limit also applies inside a single read: once the queue is full no
//! further frame from that read is dispatched. The unprocessed bytes are kept
//! in a stash and fed before the next socket read, once the queue has
//! drained below the limit.

use crate::error::ServerError;
use crate::guard;
use crate::registry::Registration;
use crate::server::{wait_for_shutdown, Shared};
use bytes::{Buf, Bytes, BytesMut};
use recordnet_protocol::{Decoder, Encoder, FrameAssembler, ProtocolError, Response, WriteQueue};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Whether the peer is still there after a read.
enum ReadOutcome {
    Open,
    Closed,
}

pub(crate) struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    registration: Registration,
    assembler: FrameAssembler,
    writes: WriteQueue,
    read_buf: Vec<u8>,
    /// Bytes already read but held back by backpressure.
    stash: BytesMut,
    shared: Arc<Shared>,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        peer: SocketAddr,
        registration: Registration,
        shared: Arc<Shared>,
    ) -> Self {
        let config = &shared.config;
        Self {
            stream,
            peer,
            registration,
            assembler: FrameAssembler::with_max_frame_bytes(config.max_frame_bytes),
            writes: WriteQueue::new(),
            read_buf: vec![0u8; config.read_buffer_size],
            stash: BytesMut::new(),
            shared,
        }
    }

    /// Drives the connection until the peer leaves, an error occurs or the
    /// server shuts down.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let id = self.registration.id();
        tracing::info!("Client connected: {} (conn={})", self.peer, id);

        let result = tokio::select! {
            result = self.serve() => result,
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::debug!("[{}] Shutdown signal received", self.peer);
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_framing() => {
                tracing::warn!("[{}] Closing connection: {}", self.peer, e);
            }
            Err(e) if e.is_disconnect() => {
                tracing::debug!("[{}] Connection lost: {}", self.peer, e);
            }
            Err(e) => {
                tracing::warn!("[{}] Connection error: {}", self.peer, e);
            }
        }

        if !self.writes.is_empty() || !self.stash.is_empty() {
            tracing::debug!(
                "[{}] Dropping {} unsent bytes and {} unprocessed bytes",
                self.peer,
                self.writes.pending_bytes(),
                self.stash.len()
            );
        }
        tracing::info!("Client disconnected: {} (conn={})", self.peer, id);
    }

    async fn serve(&mut self) -> Result<(), ServerError> {
        loop {
            // Held-back requests go first so arrival order is preserved.
            if !self.stash.is_empty() && !self.is_backpressured() {
                self.drain_stash()?;
                continue;
            }

            let interest = self.interest();
            let ready = self.stream.ready(interest).await?;

            if ready.is_writable() && !self.writes.is_empty() {
                self.on_writable()?;
            }

            if (ready.is_readable() || ready.is_read_closed()) && interest.is_readable() {
                if let ReadOutcome::Closed = self.on_readable()? {
                    tracing::debug!("[{}] Connection closed by client", self.peer);
                    return Ok(());
                }
            }
        }
    }

    /// Whether queued responses have reached the limit. An empty queue never
    /// counts, so every request gets at least one response in flight.
    fn is_backpressured(&self) -> bool {
        !self.writes.is_empty()
            && self.writes.pending_bytes() >= self.shared.config.max_pending_write_bytes
    }

    fn interest(&self) -> Interest {
        if self.writes.is_empty() {
            Interest::READABLE
        } else if self.is_backpressured() {
            // Backpressure: stop reading until the peer drains its responses.
            Interest::WRITABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    fn on_readable(&mut self) -> Result<ReadOutcome, ServerError> {
        let n = match self.stream.try_read(&mut self.read_buf) {
            Ok(0) => return Ok(ReadOutcome::Closed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::Open),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(ReadOutcome::Open),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("[{}] Received {} bytes", self.peer, n);

        let buf = std::mem::take(&mut self.read_buf);
        let result = self.feed(&buf[..n]);
        self.read_buf = buf;
        let consumed = result?;

        if consumed < n {
            self.stash.extend_from_slice(&self.read_buf[consumed..n]);
            tracing::debug!(
                "[{}] Write queue full, holding back {} bytes",
                self.peer,
                n - consumed
            );
        }

        Ok(ReadOutcome::Open)
    }

    /// Feeds stashed bytes once the write queue has room again.
    fn drain_stash(&mut self) -> Result<(), ServerError> {
        let mut stash = std::mem::take(&mut self.stash);
        let consumed = self.feed(&stash)?;
        stash.advance(consumed);
        self.stash = stash;
        Ok(())
    }

    /// Feeds bytes to the assembler and dispatches each completed request,
    /// stopping early once the write queue reaches the backpressure limit.
    /// Returns how many bytes were consumed.
    ///
    /// One read may hold several frames or a fraction of one.
    fn feed(&mut self, bytes: &[u8]) -> Result<usize, ServerError> {
        let mut offset = 0;
        while offset < bytes.len() && !self.is_backpressured() {
            let fed = match self.assembler.feed(&bytes[offset..]) {
                Ok(fed) => fed,
                Err(e) => {
                    self.shared.stats.framing_errors.fetch_add(1, Ordering::Relaxed);
                    return Err(e.into());
                }
            };
            offset += fed.consumed;
            if let Some(payload) = fed.payload {
                self.on_frame(payload)?;
            }
        }
        Ok(offset)
    }

    fn on_frame(&mut self, payload: Bytes) -> Result<(), ServerError> {
        let stats = &self.shared.stats;

        let request = match Decoder::decode_request(&payload) {
            Ok(request) => request,
            Err(e) => {
                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "[{}] Dropping malformed frame ({} bytes): {}",
                    self.peer,
                    payload.len(),
                    e
                );
                return Ok(());
            }
        };

        stats.requests_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "[{}] Request: {:?} (id={})",
            self.peer,
            request.command(),
            request.id
        );

        let dispatcher = self.shared.dispatcher.as_ref();
        let (response, fault) = guard::respond(dispatcher, &request);
        if let Some(fault) = fault {
            stats.dispatch_errors.fetch_add(1, Ordering::Relaxed);
            match fault {
                guard::DispatchFault::Panic(ref msg) => {
                    tracing::error!("[{}] Dispatcher panicked: {}", self.peer, msg);
                }
                guard::DispatchFault::Error(ref e) => {
                    tracing::debug!("[{}] Dispatch failed: {}", self.peer, e);
                }
            }
        }

        let encoded = self.encode(&response)?;
        self.send(encoded)
    }

    fn encode(&self, response: &Response) -> Result<Bytes, ServerError> {
        let max = self.shared.config.max_frame_bytes;
        match Encoder::encode_response_with_limit(response, max) {
            Ok(buf) => Ok(buf.freeze()),
            Err(ProtocolError::FrameTooLarge { size, max }) => {
                tracing::warn!(
                    "[{}] Response to id={} too large ({} bytes, max {})",
                    self.peer,
                    response.id,
                    size,
                    max
                );
                let replacement = guard::error_response(
                    self.shared.dispatcher.as_ref(),
                    &format!("response too large ({} bytes, max {})", size, max),
                )
                .with_id(response.id);
                Ok(Encoder::encode_response_with_limit(&replacement, max)?.freeze())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queues an encoded response and tries to write it straight away.
    fn send(&mut self, encoded: Bytes) -> Result<(), ServerError> {
        let size = encoded.len();
        self.writes.push(encoded);

        let stream = &self.stream;
        let flush = self.writes.flush(|buf| stream.try_write(buf))?;
        if !flush.drained {
            self.shared.stats.partial_writes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "[{}] Partial write of {} byte frame, {} bytes pending",
                self.peer,
                size,
                self.writes.pending_bytes()
            );
        }
        Ok(())
    }

    fn on_writable(&mut self) -> Result<(), ServerError> {
        let stream = &self.stream;
        let flush = self.writes.flush(|buf| stream.try_write(buf))?;
        if flush.written > 0 {
            self.shared
                .stats
                .write_ready_events
                .fetch_add(1, Ordering::Relaxed);
        }
        if flush.drained {
            tracing::debug!("[{}] Write queue drained", self.peer);
        }
        Ok(())
    }
}
