//! Synchronous start/stop around the async server.
//!
//! [`ServerHandle::start`] binds the listener on the calling thread, so bind
//! errors and the chosen port are known immediately, then drives the server
//! on one dedicated I/O thread with a current-thread runtime.

use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use crate::server::{Server, ServerConfig, ServerStats};
use recordnet_protocol::Dispatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A server running on its own thread.
pub struct ServerHandle {
    server: Arc<Server>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
}

impl ServerHandle {
    /// Binds `config.bind_addr` and starts serving with `dispatcher`.
    pub fn start(config: ServerConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self, ServerError> {
        let listener = std::net::TcpListener::bind(config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let server = Arc::new(Server::new(config, dispatcher));
        let thread = std::thread::Builder::new()
            .name("recordnet-server-io".to_string())
            .spawn({
                let server = Arc::clone(&server);
                move || {
                    runtime.block_on(async move {
                        let listener = tokio::net::TcpListener::from_std(listener)?;
                        server.serve(listener).await
                    })
                }
            })?;

        Ok(Self {
            server,
            local_addr,
            thread: Some(thread),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn stats(&self) -> &ServerStats {
        self.server.stats()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.server.registry()
    }

    pub fn is_running(&self) -> bool {
        self.server.is_running()
    }

    /// Stops the server and waits for its thread. Every connection is closed
    /// before this returns. Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.server.shutdown();
        match thread.join() {
            Ok(result) => result,
            Err(_) => Err(ServerError::ThreadPanicked),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Server stopped with error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordnet_protocol::{DispatchError, Request, Response};

    fn noop() -> Arc<dyn Dispatcher> {
        Arc::new(|_: &Request| -> Result<Response, DispatchError> { Ok(Response::text("ok")) })
    }

    #[test]
    fn test_start_reports_ephemeral_port() {
        let mut handle =
            ServerHandle::start(ServerConfig::new("127.0.0.1:0".parse().unwrap()), noop()).unwrap();
        assert_ne!(handle.port(), 0);

        handle.stop().unwrap();
        assert!(!handle.is_running());
        // Second stop is a no-op
        handle.stop().unwrap();
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let handle =
            ServerHandle::start(ServerConfig::new("127.0.0.1:0".parse().unwrap()), noop()).unwrap();
        let result = ServerHandle::start(ServerConfig::new(handle.local_addr()), noop());
        assert!(matches!(result, Err(ServerError::Io(_))));
    }
}
