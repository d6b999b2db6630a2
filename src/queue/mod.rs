//! Publish and consume through fanout exchanges.
//!
//! Two flavours of the same operations are available:
//! - the functions in [`facade`], which work on bare [`lapin`] handles;
//! - [`QueueConnection`], a session that keeps the connection, channel and queue it opened
//!   and applies a deadline to every operation.
pub mod facade;

mod connection;
mod delivery;
mod error;

pub use connection::QueueConnection;
pub use delivery::{Deliveries, Delivery};
pub(crate) use error::with_deadline;
pub use error::{Operation, QueueError};
