//! Dispatcher call-site guard.
//!
//! Business-logic faults never reach the protocol engine: an `Err` from the
//! dispatcher and a panic inside it both become an error-text response.

use recordnet_protocol::{DispatchError, Dispatcher, Request, Response};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A dispatcher failure caught at the call site.
#[derive(Debug)]
pub enum DispatchFault {
    Error(DispatchError),
    Panic(String),
}

impl fmt::Display for DispatchFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFault::Error(e) => write!(f, "{}", e),
            DispatchFault::Panic(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

/// Calls the dispatcher, catching errors and panics.
pub fn dispatch_guarded(
    dispatcher: &dyn Dispatcher,
    request: &Request,
) -> Result<Response, DispatchFault> {
    match catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(request))) {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(DispatchFault::Error(e)),
        Err(payload) => Err(DispatchFault::Panic(panic_message(payload.as_ref()))),
    }
}

/// Calls the dispatcher and always produces a response.
///
/// The response carries the request id. Failures are rendered as
/// `"error: ..."` text with the dispatcher's catalog attached.
pub fn respond(dispatcher: &dyn Dispatcher, request: &Request) -> (Response, Option<DispatchFault>) {
    let (response, fault) = match dispatch_guarded(dispatcher, request) {
        Ok(response) => (response, None),
        Err(fault) => (error_response(dispatcher, &fault.to_string()), Some(fault)),
    };
    (response.with_id(request.id), fault)
}

/// Builds an error-text response carrying the dispatcher catalog.
pub fn error_response(dispatcher: &dyn Dispatcher, message: &str) -> Response {
    let catalog = catch_unwind(AssertUnwindSafe(|| dispatcher.catalog())).unwrap_or_default();
    Response::text(format!("error: {}", message)).with_catalog(catalog)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "dispatcher panicked".to_string()
    }
}
