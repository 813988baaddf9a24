//! The seam between the protocol engine and business logic.
//!
//! The server hands every decoded [`Request`] to a [`Dispatcher`] and sends
//! back whatever it returns. The engine never looks inside a request beyond
//! its correlation id.

use crate::message::{CommandDescriptor, Request, Response};
use thiserror::Error;

/// Errors a dispatcher may report instead of a response.
///
/// The server turns these into an error-text response for the peer; they
/// never close the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("empty request")]
    EmptyRequest,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// Business-logic handler invoked once per decoded request.
///
/// Implementations are shared by every connection, so they must be
/// thread-safe and guard their own state.
pub trait Dispatcher: Send + Sync + 'static {
    /// Handles one request.
    fn dispatch(&self, request: &Request) -> Result<Response, DispatchError>;

    /// Returns the commands this dispatcher accepts.
    fn catalog(&self) -> Vec<CommandDescriptor> {
        Vec::new()
    }
}

impl<F> Dispatcher for F
where
    F: Fn(&Request) -> Result<Response, DispatchError> + Send + Sync + 'static,
{
    fn dispatch(&self, request: &Request) -> Result<Response, DispatchError> {
        self(request)
    }
}
