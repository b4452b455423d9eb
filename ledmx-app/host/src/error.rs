//! Host-side error taxonomy.

use std::io;

use thiserror::Error;

use ledmx_core::protocol::{CodecError, Status};

/// Everything a client operation can fail with.
///
/// The `Display` rendering doubles as the user-visible message pushed
/// through the last-error event stream.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No complete response arrived inside the exchange deadline.
    #[error("Timeout")]
    Timeout,
    /// No device id stored or selected yet.
    #[error("no device selected")]
    NoDeviceSelected,
    /// The link died; a fresh connection attempt is required.
    #[error("device link closed")]
    Disconnected,
    /// The response could not be decoded (short frame, unknown status,
    /// malformed LED dump).
    #[error("malformed response: {0:?}")]
    Codec(CodecError),
    /// The device rejected the command.
    #[error("device rejected command: {0:?}")]
    Device(Status),
    /// The response echoed an opcode other than the request's.
    #[error("unexpected response opcode 0x{0:02X}")]
    UnexpectedOpcode(u8),
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
