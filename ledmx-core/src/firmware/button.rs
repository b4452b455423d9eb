//! Debounced push-button sampler.
//!
//! The raw input is sampled at most once per 200 ms window; between
//! eligible samples `read` always reports [`ButtonEvent::Released`]. A
//! one-shot gate makes `Pressed` and `PressedContinuously` edge-triggered
//! at debounce granularity: each is reported once per hold, and the gate
//! rearms when a released sample is observed.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::InputPin;

/// Raw samples are taken at most once per this window.
const SAMPLE_WINDOW: Duration = Duration::from_millis(200);

/// Classified state of the button at one sampling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Released,
    /// Debounced rising edge.
    Pressed,
    /// Input still asserted on a later eligible sample of the same hold.
    PressedContinuously,
}

/// A single active-low push button (pull-up wiring).
pub struct Button<P> {
    pin: P,
    last_sample: Option<Instant>,
    latched: bool,
    reported: Option<ButtonEvent>,
}

impl<P: InputPin> Button<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            last_sample: None,
            latched: false,
            reported: None,
        }
    }

    /// Classify the button state at `now`.
    ///
    /// `now` must be monotone across calls. Pin read errors count as
    /// "not pressed"; the pin seam is infallible on the target hardware.
    pub fn read(&mut self, now: Instant) -> ButtonEvent {
        if let Some(last) = self.last_sample {
            if now - last <= SAMPLE_WINDOW {
                return ButtonEvent::Released;
            }
        }
        self.last_sample = Some(now);

        // active low: a press pulls the line down
        let pressed = self.pin.is_low().unwrap_or(false);

        let candidate = if pressed {
            if self.latched {
                ButtonEvent::PressedContinuously
            } else {
                self.latched = true;
                ButtonEvent::Pressed
            }
        } else {
            self.latched = false;
            ButtonEvent::Released
        };

        if candidate == ButtonEvent::Released {
            self.reported = None;
            return ButtonEvent::Released;
        }
        if self.reported == Some(candidate) {
            // gate: same candidate fires once per hold
            return ButtonEvent::Released;
        }
        self.reported = Some(candidate);
        candidate
    }
}
