//! Host-side client core for the Bluetooth LED matrix.
//!
//! Talks the `ledmx-core` wire protocol over an opaque byte-stream
//! transport. The hard part of the host side is message framing: the
//! device answers with no terminator or usable length prefix, so the
//! [`aggregator`] infers response boundaries from inter-byte silence.
//! [`client::MatrixClient`] layers the command API, the cached LED
//! mirror, and the UI-facing event stream on top.

pub mod aggregator;
pub mod client;
pub mod error;
pub mod store;
pub mod transport;

pub use client::{Led, MatrixClient, MatrixEvent, RESPONSE_TIMEOUT};
pub use error::ClientError;
