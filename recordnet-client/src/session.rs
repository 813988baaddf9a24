//! Synchronous request/response session.
//!
//! A [`ClientSession`] owns one outbound connection driven by a dedicated I/O
//! thread (see [`crate::io_loop`]). Caller threads never touch the socket:
//! they enqueue encoded frames on a command channel and block on a latch
//! until the I/O thread hands back the matching response, a failure, or the
//! timeout expires.
//!
//! At most one request is in flight per session. Concurrent callers are
//! serialized, and every request carries an id the server echoes back, so a
//! late response to a request that already timed out is discarded instead of
//! being delivered to the next caller.

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::io_loop::{Command, IoLoop};
use parking_lot::{Condvar, Mutex};
use recordnet_protocol::{Encoder, Request, Response};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Default)]
struct Latch {
    /// Id of the request currently awaiting a response.
    armed: Option<u64>,
    outcome: Option<Result<Response, ClientError>>,
}

/// State shared between caller threads and the I/O thread.
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<SessionState>,
    state_changed: Condvar,
    latch: Mutex<Latch>,
    latch_released: Condvar,
    running: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            state_changed: Condvar::new(),
            latch: Mutex::new(Latch::default()),
            latch_released: Condvar::new(),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
        self.state_changed.notify_all();
    }

    /// Waits until the state leaves `Connecting` or the deadline passes.
    fn wait_while_connecting(&self, deadline: Instant) -> SessionState {
        let mut state = self.state.lock();
        while *state == SessionState::Connecting {
            if self
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        *state
    }

    /// Prepares the latch for the response to request `id`.
    fn arm(&self, id: u64) {
        let mut latch = self.latch.lock();
        latch.armed = Some(id);
        latch.outcome = None;
    }

    fn disarm(&self) {
        let mut latch = self.latch.lock();
        latch.armed = None;
        latch.outcome = None;
    }

    /// Delivers a response. Returns `false` if nobody is waiting for it.
    pub(crate) fn complete(&self, response: Response) -> bool {
        let mut latch = self.latch.lock();
        if latch.armed != Some(response.id) {
            tracing::debug!(
                "Discarding response id={} (waiting for {:?})",
                response.id,
                latch.armed
            );
            return false;
        }
        latch.armed = None;
        latch.outcome = Some(Ok(response));
        self.latch_released.notify_all();
        true
    }

    /// Releases the waiter with an error. With `Some(id)` only the waiter for
    /// that request is released; with `None` any waiter is.
    pub(crate) fn fail(&self, id: Option<u64>, error: ClientError) {
        let mut latch = self.latch.lock();
        let Some(armed) = latch.armed else {
            return;
        };
        if matches!(id, Some(id) if id != armed) {
            return;
        }
        latch.armed = None;
        latch.outcome = Some(Err(error));
        self.latch_released.notify_all();
    }

    /// Blocks until the armed request completes or the deadline passes.
    fn wait(&self, deadline: Instant) -> Result<Response, ClientError> {
        let mut latch = self.latch.lock();
        loop {
            if let Some(outcome) = latch.outcome.take() {
                return outcome;
            }
            if latch.armed.is_none() {
                // Disarmed without an outcome; nothing will ever arrive.
                return Err(ClientError::ConnectionClosed);
            }
            if self
                .latch_released
                .wait_until(&mut latch, deadline)
                .timed_out()
            {
                if let Some(outcome) = latch.outcome.take() {
                    return outcome;
                }
                latch.armed = None;
                return Err(ClientError::Timeout);
            }
        }
    }
}

/// A client session with a synchronous API.
pub struct ClientSession {
    config: SessionConfig,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    /// Held for the duration of one request/response exchange.
    flight: Mutex<()>,
}

impl ClientSession {
    /// Creates a session and starts its I/O thread. No connection is opened
    /// until [`connect`](Self::connect) or the first request.
    pub fn new(config: SessionConfig) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let shared = Arc::new(Shared::new());
        let (commands, receiver) = mpsc::unbounded_channel();
        let io_loop = IoLoop::new(config.clone(), Arc::clone(&shared), receiver);

        let thread = std::thread::Builder::new()
            .name("recordnet-client-io".to_string())
            .spawn(move || runtime.block_on(io_loop.run()))?;

        Ok(Self {
            config,
            shared,
            commands,
            thread: Mutex::new(Some(thread)),
            next_id: AtomicU64::new(1),
            flight: Mutex::new(()),
        })
    }

    /// Connects to the server, waiting at most `connect_timeout`.
    ///
    /// Returns whether the session is connected afterwards.
    pub fn connect(&self) -> bool {
        if !self.shared.is_running() {
            return false;
        }

        let previous = {
            let mut state = self.shared.state.lock();
            let previous = *state;
            if previous == SessionState::Disconnected {
                *state = SessionState::Connecting;
            }
            previous
        };

        match previous {
            SessionState::Connected => return true,
            SessionState::Connecting => {}
            SessionState::Disconnected => {
                if self.commands.send(Command::Connect).is_err() {
                    self.shared.set_state(SessionState::Disconnected);
                    return false;
                }
            }
        }

        let deadline = Instant::now() + self.config.connect_timeout;
        let state = self.shared.wait_while_connecting(deadline);
        if state != SessionState::Connected {
            tracing::debug!("Connect to {} did not complete ({:?})", self.config.addr, state);
        }
        state == SessionState::Connected
    }

    /// Sends a request and waits for its response.
    ///
    /// The request id is assigned by the session. Connects first if needed.
    pub fn try_send_and_wait(
        &self,
        mut request: Request,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        if !self.shared.is_running() {
            return Err(ClientError::Closed);
        }

        let _flight = self.flight.lock();

        if !self.is_connected() && !self.connect() {
            return Err(ClientError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.id = id;
        let frame = Encoder::encode_request_with_limit(&request, self.config.max_frame_bytes)?
            .freeze();

        tracing::debug!(
            "Sending request id={} {:?} ({} bytes)",
            id,
            request.command(),
            frame.len()
        );

        let deadline = Instant::now() + timeout;
        self.shared.arm(id);
        if !self.shared.is_running() || self.commands.send(Command::Send { id, frame }).is_err() {
            self.shared.disarm();
            return Err(ClientError::Closed);
        }

        let result = self.shared.wait(deadline);
        if let Err(ref e) = result {
            tracing::debug!("Request id={} failed: {}", id, e);
        }
        result
    }

    /// Sends a request and waits up to `timeout` for its response.
    ///
    /// Returns `None` on timeout, disconnect, decode failure or if the
    /// session is closed. The session stays usable afterwards.
    pub fn send_and_wait(&self, request: Request, timeout: Duration) -> Option<Response> {
        self.try_send_and_wait(request, timeout).ok()
    }

    /// Sends a request using the configured request timeout.
    pub fn send(&self, request: Request) -> Option<Response> {
        self.send_and_wait(request, self.config.request_timeout)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state() == SessionState::Connected
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stops the I/O thread and releases any waiting caller. Idempotent.
    ///
    /// Waits at most `shutdown_timeout` for the thread to finish.
    pub fn close(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.commands.send(Command::Shutdown);
        self.shared.set_state(SessionState::Disconnected);
        self.shared.fail(None, ClientError::Closed);

        if let Some(thread) = self.thread.lock().take() {
            let deadline = Instant::now() + self.config.shutdown_timeout;
            while !thread.is_finished() {
                if Instant::now() >= deadline {
                    tracing::warn!(
                        "Client I/O thread did not stop within {:?}",
                        self.config.shutdown_timeout
                    );
                    return;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            if thread.join().is_err() {
                tracing::warn!("Client I/O thread panicked");
            }
        }

        tracing::debug!("Session to {} closed", self.config.addr);
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}
