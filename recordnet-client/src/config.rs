//! Session configuration.

use recordnet_protocol::MAX_FRAME_BYTES;
use std::net::SocketAddr;
use std::time::Duration;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Bound on one connection attempt, and on how long a caller waits for it.
    pub connect_timeout: Duration,
    /// Default timeout used by `send`.
    pub request_timeout: Duration,
    /// Delay before reconnecting after a lost connection.
    pub reconnect_backoff: Duration,
    /// Whether to reconnect in the background after a lost connection.
    pub auto_reconnect: bool,
    /// Longest the I/O loop sleeps before rechecking the running flag.
    pub poll_interval: Duration,
    /// Bound on joining the I/O thread in `close`.
    pub shutdown_timeout: Duration,
    /// Largest frame payload sent or accepted.
    pub max_frame_bytes: u32,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl SessionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            reconnect_backoff: Duration::from_secs(1),
            auto_reconnect: true,
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(3),
            max_frame_bytes: MAX_FRAME_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: u32) -> Self {
        self.max_frame_bytes = max.min(MAX_FRAME_BYTES);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}
