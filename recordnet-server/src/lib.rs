//! # recordnet-server
//!
//! TCP server for recordnet.
//!
//! This crate provides:
//! - A readiness-driven connection multiplexer over tokio
//! - Per-connection frame assembly and partial-write draining
//! - Backpressure on connections whose responses are not being read
//! - A guarded call site for the injected [`recordnet_protocol::Dispatcher`]
//! - YAML and environment configuration

pub mod config;
mod connection;
pub mod error;
pub mod guard;
pub mod handle;
pub mod registry;
pub mod server;

pub use config::{Config, ConfigError, LimitsConfig, NetworkConfig};
pub use error::ServerError;
pub use handle::ServerHandle;
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use server::{Server, ServerConfig, ServerStats, StatsSnapshot};
