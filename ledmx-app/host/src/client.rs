//! Host-side client: command exchanges, LED cache, event stream.
//!
//! The client owns a cached mirror of the matrix and pushes state
//! changes to the UI layer as [`MatrixEvent`]s over an mpsc channel.
//! Every wire exchange is `reset → write → await one message → decode`
//! against the response aggregator; taking `&mut self` serializes
//! exchanges, which the silence-window framing requires — two requests
//! in flight would be indistinguishable on the wire.

use std::io;
use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use ledmx_core::protocol::{self, Opcode, Status, LED_COUNT, MAX_WRITE_RECORDS};
use ledmx_core::RGB8;

use crate::aggregator::{ResponseAggregator, SILENCE_WINDOW};
use crate::error::ClientError;
use crate::store::DeviceStore;
use crate::transport::Connect;

/// Hard deadline for one request/response exchange.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// One LED of the cached mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Led {
    pub id: u8,
    pub color: RGB8,
}

/// State changes pushed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixEvent {
    /// Full snapshot of the cached mirror.
    Leds(Vec<Led>),
    /// Latest human-readable failure; `None` clears it.
    LastError(Option<String>),
    Connected(String),
    Disconnected,
}

struct Link<T> {
    transport: Arc<Mutex<T>>,
    aggregator: ResponseAggregator,
}

/// Client core consumed by the UI.
pub struct MatrixClient<C: Connect> {
    connector: C,
    store: Box<dyn DeviceStore>,
    link: Option<Link<C::Link>>,
    cache: [RGB8; LED_COUNT],
    events: Sender<MatrixEvent>,
}

impl<C: Connect> MatrixClient<C> {
    /// Build a client and the receiving end of its event stream.
    pub fn new(connector: C, store: Box<dyn DeviceStore>) -> (Self, Receiver<MatrixEvent>) {
        let (events, rx) = mpsc::channel();
        (
            Self {
                connector,
                store,
                link: None,
                cache: [RGB8::default(); LED_COUNT],
                events,
            },
            rx,
        )
    }

    /// Current cached mirror.
    pub fn leds(&self) -> Vec<Led> {
        self.cache
            .iter()
            .enumerate()
            .map(|(id, color)| Led {
                id: id as u8,
                color: *color,
            })
            .collect()
    }

    pub fn connected(&self) -> bool {
        self.link.is_some()
    }

    /// Optimistic local mutation; no wire traffic. Ids outside the
    /// matrix are ignored.
    pub fn set_local_color(&mut self, ids: &[u8], color: RGB8) {
        for &id in ids {
            if let Some(slot) = self.cache.get_mut(id as usize) {
                *slot = color;
            }
        }
        self.emit_leds();
    }

    /// Persist the device id and (re)connect to it.
    pub fn select_device(&mut self, device: &str) -> Result<(), ClientError> {
        self.store.set_last_device(device);
        self.link = None;
        let outcome = self.ensure_connected();
        self.report(outcome)
    }

    /// Drop the live link, if any.
    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            self.emit(MatrixEvent::Disconnected);
        }
    }

    /// Push the cached colors of `ids` to the device.
    ///
    /// Covers-the-matrix requests collapse into one WRITE_ALL; anything
    /// else goes out as WRITE frames of at most [`MAX_WRITE_RECORDS`]
    /// records each.
    pub fn send_colors(&mut self, ids: &[u8]) -> Result<(), ClientError> {
        let outcome = self.send_colors_inner(ids);
        self.report(outcome)
    }

    /// Re-read every LED from the device into the cache.
    pub fn refresh(&mut self) -> Result<(), ClientError> {
        let outcome = self.refresh_inner();
        self.report(outcome)
    }

    fn send_colors_inner(&mut self, ids: &[u8]) -> Result<(), ClientError> {
        if covers_matrix(ids) {
            let frame = protocol::encode_write_all(self.cache[0]);
            return self.exchange(Opcode::SetLedsAll, &frame);
        }

        let records: Vec<(u8, RGB8)> = ids
            .iter()
            .filter(|&&id| (id as usize) < LED_COUNT)
            .map(|&id| (id, self.cache[id as usize]))
            .collect();
        for chunk in records.chunks(MAX_WRITE_RECORDS) {
            let frame = protocol::encode_write(chunk).map_err(ClientError::Codec)?;
            self.exchange(Opcode::SetLeds, &frame)?;
        }
        Ok(())
    }

    fn refresh_inner(&mut self) -> Result<(), ClientError> {
        let frame = protocol::encode_read();
        let raw = self.exchange_raw(&frame)?;
        let response = protocol::decode_response(&raw).map_err(ClientError::Codec)?;
        if response.status != Status::Ok {
            return Err(ClientError::Device(response.status));
        }
        if response.opcode != Opcode::GetLeds as u8 {
            return Err(ClientError::UnexpectedOpcode(response.opcode));
        }
        self.cache = protocol::decode_led_dump(response.data).map_err(ClientError::Codec)?;
        self.emit_leds();
        Ok(())
    }

    /// One write exchange: success is an OK status echoing the opcode.
    fn exchange(&mut self, expected: Opcode, frame: &[u8]) -> Result<(), ClientError> {
        let raw = self.exchange_raw(frame)?;
        let response = protocol::decode_response(&raw).map_err(ClientError::Codec)?;
        if response.status != Status::Ok {
            return Err(ClientError::Device(response.status));
        }
        if response.opcode != expected as u8 {
            return Err(ClientError::UnexpectedOpcode(response.opcode));
        }
        Ok(())
    }

    /// Reset the aggregator, write the request, await one message.
    fn exchange_raw(&mut self, frame: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.ensure_connected()?;
        let outcome = {
            let Some(link) = self.link.as_ref() else {
                return Err(ClientError::Disconnected);
            };
            link.aggregator.reset();
            let written = match link.transport.lock() {
                Ok(mut transport) => transport
                    .write_all(frame)
                    .and_then(|()| transport.flush())
                    .map_err(ClientError::from),
                Err(_) => Err(ClientError::Io(io::Error::other("transport lock poisoned"))),
            };
            written.and_then(|()| link.aggregator.await_message(RESPONSE_TIMEOUT))
        };

        if matches!(
            outcome,
            Err(ClientError::Disconnected) | Err(ClientError::Io(_))
        ) {
            self.link = None;
            self.emit(MatrixEvent::Disconnected);
        }
        outcome
    }

    fn ensure_connected(&mut self) -> Result<(), ClientError> {
        if self.link.is_some() {
            return Ok(());
        }
        let device = self
            .store
            .last_device()
            .ok_or(ClientError::NoDeviceSelected)?;
        let transport = Arc::new(Mutex::new(self.connector.open(&device)?));
        let aggregator = ResponseAggregator::start(Arc::clone(&transport), SILENCE_WINDOW);
        self.link = Some(Link {
            transport,
            aggregator,
        });
        info!(device = %device, "connected");
        self.emit(MatrixEvent::Connected(device));
        Ok(())
    }

    /// Emit the latest-error event for an outcome: the newest failure
    /// wins, the next success clears it.
    fn report<V>(&mut self, outcome: Result<V, ClientError>) -> Result<V, ClientError> {
        match &outcome {
            Ok(_) => self.emit(MatrixEvent::LastError(None)),
            Err(e) => {
                warn!(error = %e, "operation failed");
                self.emit(MatrixEvent::LastError(Some(e.to_string())));
            }
        }
        outcome
    }

    fn emit(&self, event: MatrixEvent) {
        let _ = self.events.send(event);
    }

    fn emit_leds(&self) {
        self.emit(MatrixEvent::Leds(self.leds()));
    }
}

fn covers_matrix(ids: &[u8]) -> bool {
    let mut seen = [false; LED_COUNT];
    for &id in ids {
        if let Some(slot) = seen.get_mut(id as usize) {
            *slot = true;
        }
    }
    seen.iter().all(|&covered| covered)
}
