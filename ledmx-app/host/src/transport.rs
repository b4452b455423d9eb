//! Byte-stream transport seams.
//!
//! The link to the device is an opaque byte stream; Bluetooth SPP
//! presents itself as a serial port, so the shipped connector goes
//! through `serialport`. Tests substitute loopback TCP streams.

use std::io;
use std::time::Duration;

use crate::error::ClientError;

/// Serial link rate of this deployment.
pub const SERIAL_BAUD: u32 = 38_400;

/// Transport reads must give up after this long so the aggregator's
/// reader never holds the shared lock across an unbounded block.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// A connected byte link.
///
/// Reads must return within a bounded time (a read timeout, surfacing
/// as `TimedOut`/`WouldBlock`) rather than blocking indefinitely.
pub trait Transport: io::Read + io::Write + Send {}

impl<T: io::Read + io::Write + Send> Transport for T {}

/// Opens a transport for a device id.
pub trait Connect {
    type Link: Transport + 'static;

    fn open(&mut self, device: &str) -> Result<Self::Link, ClientError>;
}

/// Connector for the serial (Bluetooth SPP) deployment; the device id is
/// the port name.
pub struct SerialConnector;

impl Connect for SerialConnector {
    type Link = Box<dyn serialport::SerialPort>;

    fn open(&mut self, device: &str) -> Result<Self::Link, ClientError> {
        let port = serialport::new(device, SERIAL_BAUD)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(port)
    }
}
