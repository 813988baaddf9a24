//! # recordnet-client
//!
//! Client library for recordnet.
//!
//! This crate provides:
//! - A synchronous request/response session usable from any thread
//! - A dedicated I/O thread handling partial reads and writes
//! - Request correlation, per-call timeouts and background reconnection

pub mod config;
pub mod error;
mod io_loop;
pub mod session;

pub use config::SessionConfig;
pub use error::ClientError;
pub use session::{ClientSession, SessionState};
