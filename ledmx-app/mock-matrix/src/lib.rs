//! Mock LED matrix device: the real firmware core over a TCP byte link.
//!
//! Stands in for the microcontroller during development and testing.
//! The firmware logic is untouched `ledmx-core`; only the peripheral
//! seams are substituted — a non-blocking TCP stream for the serial
//! link, a logging strip for the pixel chain, an idle pin for the
//! button, and a no-op power hook.

use std::io::{self, ErrorKind, Read as _, Write as _};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use embassy_time::Instant;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin};
use rand_core::{OsRng, RngCore, TryRngCore};
use smart_leds_trait::{SmartLedsWrite, RGB8};
use tracing::{debug, info, trace};

use ledmx_core::firmware::dispatch::LinkError;
use ledmx_core::firmware::{Firmware, PowerControl};

/// Main-loop pacing between polls.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Non-blocking TCP adapter exposing the stream as an `embedded_io`
/// byte link with an `available()`-style readiness probe.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl embedded_io::ErrorType for TcpLink {
    type Error = io::Error;
}

impl embedded_io::ReadReady for TcpLink {
    fn read_ready(&mut self) -> Result<bool, io::Error> {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            // data pending, or EOF the next read will observe
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl embedded_io::Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl embedded_io::Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        loop {
            match self.stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        self.stream.flush()
    }
}

/// Button input that is never pressed; the mock has no physical button.
pub struct IdlePin;

impl PinErrorType for IdlePin {
    type Error = core::convert::Infallible;
}

impl InputPin for IdlePin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        // pull-up idle level
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

/// Power hook that returns immediately; the mock never sleeps.
pub struct NoSleep;

impl PowerControl for NoSleep {
    fn suspend_until_wake(&mut self) {}
}

/// Pixel sink that logs frames instead of driving hardware.
pub struct ConsoleStrip;

impl SmartLedsWrite for ConsoleStrip {
    type Error = core::convert::Infallible;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for (id, color) in iterator.into_iter().enumerate() {
            let color: RGB8 = color.into();
            trace!(id, r = color.r, g = color.g, b = color.b, "pixel");
        }
        Ok(())
    }
}

/// xorshift* generator for the animation engine, seeded from the OS.
pub struct XorShift64(u64);

impl XorShift64 {
    pub fn seeded_from_os() -> Self {
        let mut raw = [0u8; 8];
        let seed = match OsRng.try_fill_bytes(&mut raw) {
            Ok(()) => u64::from_le_bytes(raw),
            Err(_) => 0x9E37_79B9_7F4A_7C15,
        };
        Self(seed.max(1))
    }
}

impl RngCore for XorShift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let word = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// Drive the firmware loop over one accepted connection until the peer
/// disconnects or the link errors out.
pub fn run_connection(stream: TcpStream) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let link = TcpLink::new(stream)?;
    let mut firmware = Firmware::new(
        link,
        ConsoleStrip,
        IdlePin,
        NoSleep,
        XorShift64::seeded_from_os(),
    );
    info!(%peer, "client connected");

    loop {
        match firmware.poll(Instant::now()) {
            Ok(()) => thread::sleep(POLL_INTERVAL),
            Err(LinkError::Closed) => {
                info!(%peer, "client disconnected");
                return Ok(());
            }
            Err(LinkError::Transport(e)) => {
                debug!(error = %e, "link error");
                return Err(e);
            }
        }
    }
}
