//! # recordnet-protocol
//!
//! Wire protocol implementation for recordnet.
//!
//! This crate provides:
//! - Length-prefixed framing (4-byte big-endian length + payload)
//! - Incremental frame assembly across partial reads
//! - Partial-write tracking for non-blocking sockets
//! - JSON request/response payload schema
//! - The dispatcher seam between the protocol engine and business logic

pub mod assembler;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod message;
pub mod write;

pub use assembler::{Feed, FrameAssembler};
pub use codec::{Decoder, Encoder};
pub use dispatch::{DispatchError, Dispatcher};
pub use error::ProtocolError;
pub use frame::{Frame, LENGTH_PREFIX_SIZE};
pub use message::{ArgumentKind, ArgumentSpec, CommandDescriptor, Credentials, Request, Response};
pub use write::{Flush, PendingWrite, WriteQueue};

/// Default port for the recordnet server.
pub const DEFAULT_PORT: u16 = 7411;

/// Maximum frame payload size (10 MiB).
pub const MAX_FRAME_BYTES: u32 = 10 * 1024 * 1024;
