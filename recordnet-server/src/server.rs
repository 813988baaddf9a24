//! TCP server implementation.

use crate::config::{DEFAULT_MAX_PENDING_WRITE_BYTES, DEFAULT_READ_BUFFER_SIZE};
use crate::connection::Connection;
use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use recordnet_protocol::{Dispatcher, DEFAULT_PORT, MAX_FRAME_BYTES};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: u32,
    /// Size of the per-connection read buffer.
    pub read_buffer_size: usize,
    /// Queued response bytes at which a connection stops being read.
    pub max_pending_write_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
            max_frame_bytes: MAX_FRAME_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_pending_write_bytes: DEFAULT_MAX_PENDING_WRITE_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: u32) -> Self {
        self.max_frame_bytes = max.min(MAX_FRAME_BYTES);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn with_max_pending_write_bytes(mut self, max: usize) -> Self {
        self.max_pending_write_bytes = max.max(1);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_total: AtomicU64,
    /// Well-framed payloads that could not be decoded (dropped).
    pub decode_errors: AtomicU64,
    /// Invalid length prefixes (connection closed).
    pub framing_errors: AtomicU64,
    /// Dispatcher errors and panics.
    pub dispatch_errors: AtomicU64,
    /// Immediate writes that left a remainder queued.
    pub partial_writes: AtomicU64,
    /// Writability events that flushed queued bytes.
    pub write_ready_events: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_rejected: u64,
    pub requests_total: u64,
    pub decode_errors: u64,
    pub framing_errors: u64,
    pub dispatch_errors: u64,
    pub partial_writes: u64,
    pub write_ready_events: u64,
}

impl ServerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
            partial_writes: self.partial_writes.load(Ordering::Relaxed),
            write_ready_events: self.write_ready_events.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the accept loop and every connection task.
pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) stats: ServerStats,
}

/// Resolves once the shutdown flag is set or its sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// TCP server for recordnet.
///
/// The server owns no business logic: every decoded request is handed to
/// the injected [`Dispatcher`].
pub struct Server {
    shared: Arc<Shared>,
    registry: Arc<ConnectionRegistry>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                dispatcher,
                stats: ServerStats::default(),
            }),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.accept(stream, peer, &mut connections),
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
                Some(joined) = connections.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("Connection task failed: {}", e);
                    }
                }
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        drop(listener);
        // Connection tasks observe the same signal and finish on their own.
        while connections.join_next().await.is_some() {}

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        connections: &mut JoinSet<()>,
    ) {
        if self.registry.len() >= self.shared.config.max_connections {
            tracing::warn!("Connection limit reached, rejecting {}", peer);
            self.shared
                .stats
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.shared
            .stats
            .connections_total
            .fetch_add(1, Ordering::Relaxed);

        let registration = self.registry.register(peer);
        let connection = Connection::new(stream, peer, registration, Arc::clone(&self.shared));
        connections.spawn(connection.run(self.shutdown.subscribe()));
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.shared.stats
    }

    /// Returns the registry of live connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }
}
