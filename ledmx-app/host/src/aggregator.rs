//! Silence-window framing of the inbound byte stream.
//!
//! Responses carry no terminator and no length prefix a reader could use
//! without already knowing the command, so message boundaries are
//! inferred: bytes accumulate until the line stays quiet for a full
//! silence window, then the buffer is published as one complete message.
//!
//! Two background threads share one locked accumulation state: a reader
//! that appends and timestamps incoming bytes, and a watcher that polls
//! well below the silence window and flushes at most once per quiet
//! span. The lock is held for one append or one snapshot-and-clear,
//! never across a blocking publish.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::transport::Transport;

/// Quiet period after which the accumulated bytes count as one message.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(50);

/// Watcher poll interval, well below the silence window.
const WATCH_INTERVAL: Duration = Duration::from_millis(5);

const READ_CHUNK: usize = 512;

struct AggState {
    buf: Vec<u8>,
    last_rx: Instant,
    flushed: bool,
    alive: bool,
}

/// Background consumer of the inbound stream, publishing one message per
/// silence span.
pub struct ResponseAggregator {
    state: Arc<Mutex<AggState>>,
    messages: Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
}

impl ResponseAggregator {
    /// Spawn the reader and watcher over a shared transport.
    ///
    /// The transport lock is only ever taken for a single bounded read,
    /// leaving room for the command writer to interleave.
    pub fn start<T: Transport + 'static>(
        transport: Arc<Mutex<T>>,
        silence_window: Duration,
    ) -> Self {
        let state = Arc::new(Mutex::new(AggState {
            buf: Vec::new(),
            last_rx: Instant::now(),
            flushed: true,
            alive: true,
        }));
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::spawn(move || read_loop(transport, state, stop))
        };
        let watcher = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::spawn(move || watch_loop(state, stop, tx, silence_window))
        };

        Self {
            state,
            messages: rx,
            stop,
            reader: Some(reader),
            watcher: Some(watcher),
        }
    }

    /// Discard buffered bytes and any stale published message.
    ///
    /// Command issuers call this before writing a request so leftovers
    /// of a previous, possibly timed-out exchange cannot be mistaken
    /// for the new response.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.buf.clear();
            state.flushed = true;
        }
        while self.messages.try_recv().is_ok() {}
    }

    /// Wait for the next non-empty message with a hard deadline.
    ///
    /// A timeout cancels only this wait; the request write has already
    /// completed and the device may still answer into the void.
    pub fn await_message(&self, timeout: Duration) -> Result<Vec<u8>, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timeout_error());
            }
            match self.messages.recv_timeout(remaining) {
                Ok(message) if !message.is_empty() => return Ok(message),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => return Err(self.timeout_error()),
                Err(RecvTimeoutError::Disconnected) => return Err(ClientError::Disconnected),
            }
        }
    }

    /// False once the reader observed EOF or a hard transport error.
    pub fn is_alive(&self) -> bool {
        self.state.lock().map(|state| state.alive).unwrap_or(false)
    }

    fn timeout_error(&self) -> ClientError {
        if self.is_alive() {
            ClientError::Timeout
        } else {
            ClientError::Disconnected
        }
    }

    /// Signal both threads and join them.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResponseAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<T: Transport>(
    transport: Arc<Mutex<T>>,
    state: Arc<Mutex<AggState>>,
    stop: Arc<AtomicBool>,
) {
    let mut chunk = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Relaxed) {
        let read = {
            let Ok(mut link) = transport.lock() else {
                break;
            };
            link.read(&mut chunk)
        };
        match read {
            Ok(0) => {
                debug!("transport closed");
                mark_dead(&state);
                break;
            }
            Ok(n) => {
                let Ok(mut st) = state.lock() else {
                    break;
                };
                st.buf.extend_from_slice(&chunk[..n]);
                st.last_rx = Instant::now();
                st.flushed = false;
                trace!(bytes = n, buffered = st.buf.len(), "bytes received");
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => {
                warn!(error = %e, "transport read failed");
                mark_dead(&state);
                break;
            }
        }
    }
}

fn mark_dead(state: &Arc<Mutex<AggState>>) {
    if let Ok(mut st) = state.lock() {
        st.alive = false;
    }
}

fn watch_loop(
    state: Arc<Mutex<AggState>>,
    stop: Arc<AtomicBool>,
    tx: Sender<Vec<u8>>,
    silence_window: Duration,
) {
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(WATCH_INTERVAL);
        let flushed = {
            let Ok(mut st) = state.lock() else {
                break;
            };
            if !st.flushed && st.last_rx.elapsed() > silence_window {
                st.flushed = true;
                Some(std::mem::take(&mut st.buf))
            } else {
                None
            }
        };
        if let Some(message) = flushed {
            debug!(len = message.len(), "message complete");
            if tx.send(message).is_err() {
                break;
            }
        }
    }
}
