//! # recordnet-collection
//!
//! The shared record collection served by recordnet.
//!
//! - [`Record`] and [`RecordDraft`]: the domain object and its client-supplied form
//! - [`RecordStore`]: ordered in-memory storage with its own id generator
//! - [`CollectionDispatcher`]: the command set clients run against the store

pub mod commands;
pub mod error;
pub mod record;
pub mod store;

pub use commands::CollectionDispatcher;
pub use error::CollectionError;
pub use record::{Record, RecordDraft};
pub use store::{IdGenerator, RecordStore, StoreInfo};
