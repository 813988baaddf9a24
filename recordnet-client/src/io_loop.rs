//! The session's I/O loop.
//!
//! Runs on the session's dedicated thread and owns the socket. It waits on
//! whichever of these fires first: a command from a caller, completion of a
//! connect attempt, readiness of the connected socket, the reconnect timer,
//! or the poll interval (so a cleared running flag is noticed promptly even
//! if no command arrives).

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::session::{SessionState, Shared};
use bytes::Bytes;
use recordnet_protocol::{Decoder, FrameAssembler, WriteQueue};
use std::future::{pending, Future};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

/// Requests from caller threads to the I/O thread.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Send { id: u64, frame: Bytes },
    Shutdown,
}

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

/// An established connection and its framing state.
struct Link {
    stream: TcpStream,
    assembler: FrameAssembler,
    writes: WriteQueue,
    read_buf: Vec<u8>,
}

impl Link {
    fn new(stream: TcpStream, config: &SessionConfig) -> Self {
        Self {
            stream,
            assembler: FrameAssembler::with_max_frame_bytes(config.max_frame_bytes),
            writes: WriteQueue::new(),
            read_buf: vec![0u8; config.read_buffer_size],
        }
    }

    fn interest(&self) -> Interest {
        if self.writes.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    fn flush(&mut self) -> Result<(), ClientError> {
        let stream = &self.stream;
        let flush = self.writes.flush(|buf| stream.try_write(buf))?;
        if flush.written > 0 {
            tracing::trace!("Flushed {} bytes", flush.written);
        }
        Ok(())
    }

    fn on_ready(&mut self, ready: Ready, shared: &Shared) -> Result<(), ClientError> {
        if ready.is_writable() && !self.writes.is_empty() {
            self.flush()?;
        }

        if !(ready.is_readable() || ready.is_read_closed()) {
            return Ok(());
        }

        let n = match self.stream.try_read(&mut self.read_buf) {
            Ok(0) => return Err(ClientError::ConnectionClosed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut offset = 0;
        while offset < n {
            let fed = self.assembler.feed(&self.read_buf[offset..n])?;
            offset += fed.consumed;
            if let Some(payload) = fed.payload {
                // An undecodable response is treated like a broken transport.
                let response = Decoder::decode_response(&payload)?;
                shared.complete(response);
            }
        }
        Ok(())
    }
}

pub(crate) struct IoLoop {
    config: SessionConfig,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    link: Option<Link>,
    connecting: Option<ConnectFuture>,
    reconnect_at: Option<Instant>,
}

impl IoLoop {
    pub(crate) fn new(
        config: SessionConfig,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            config,
            shared,
            commands,
            link: None,
            connecting: None,
            reconnect_at: None,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("Client I/O loop started for {}", self.config.addr);

        while self.shared.is_running() {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                result = poll_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result);
                }
                ready = wait_ready(self.link.as_ref()) => self.on_ready(ready),
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    tracing::info!("Reconnecting to {}", self.config.addr);
                    self.start_connect();
                }
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        self.link = None;
        self.connecting = None;
        self.shared.set_state(SessionState::Disconnected);
        self.shared.fail(None, ClientError::Closed);
        tracing::debug!("Client I/O loop stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if !self.shared.is_running() {
                    return;
                }
                if self.link.is_some() {
                    self.shared.set_state(SessionState::Connected);
                } else if self.connecting.is_none() {
                    self.reconnect_at = None;
                    self.start_connect();
                }
            }
            Command::Send { id, frame } => {
                let Some(link) = self.link.as_mut() else {
                    tracing::debug!("Request id={} dropped: not connected", id);
                    self.shared.fail(Some(id), ClientError::NotConnected);
                    return;
                };
                link.writes.push(frame);
                if let Err(e) = link.flush() {
                    self.teardown(e);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn start_connect(&mut self) {
        if !self.shared.is_running() {
            return;
        }

        let addr = self.config.addr;
        let timeout = self.config.connect_timeout;
        tracing::debug!("Connecting to {}...", addr);

        self.shared.set_state(SessionState::Connecting);
        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection attempt timed out",
                )),
            }
        }));
    }

    fn on_connect_result(&mut self, result: io::Result<TcpStream>) {
        if !self.shared.is_running() {
            return;
        }
        match result {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                self.link = Some(Link::new(stream, &self.config));
                self.shared.set_state(SessionState::Connected);
                tracing::info!("Connected to {}", self.config.addr);
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", self.config.addr, e);
                self.shared.set_state(SessionState::Disconnected);
                self.shared.fail(None, ClientError::Io(e));
                self.schedule_reconnect();
            }
        }
    }

    fn on_ready(&mut self, ready: io::Result<Ready>) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let result = ready
            .map_err(ClientError::from)
            .and_then(|ready| link.on_ready(ready, &self.shared));
        if let Err(e) = result {
            self.teardown(e);
        }
    }

    /// Drops the connection, releases any waiter and maybe schedules a
    /// reconnect.
    fn teardown(&mut self, error: ClientError) {
        if let Some(link) = self.link.take() {
            if !link.writes.is_empty() {
                tracing::debug!("Dropping {} unsent bytes", link.writes.pending_bytes());
            }
        }
        tracing::warn!("Connection to {} lost: {}", self.config.addr, error);

        self.shared.set_state(SessionState::Disconnected);
        self.shared.fail(None, error);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.shared.is_running() && self.config.auto_reconnect {
            tracing::debug!("Reconnect scheduled in {:?}", self.config.reconnect_backoff);
            self.reconnect_at = Some(Instant::now() + self.config.reconnect_backoff);
        }
    }
}

async fn poll_connect(connecting: &mut Option<ConnectFuture>) -> io::Result<TcpStream> {
    match connecting {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn wait_ready(link: Option<&Link>) -> io::Result<Ready> {
    match link {
        Some(link) => link.stream.ready(link.interest()).await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
