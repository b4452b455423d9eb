//! Device-side control loop for the LED matrix.
//!
//! Hardware enters through the same trait seams the drivers use
//! elsewhere in the ecosystem: the serial link as `embedded_io`
//! Read/Write/ReadReady, the pixel chain as `SmartLedsWrite`, the button
//! as an `embedded_hal` input pin, and low-power suspend behind
//! [`PowerControl`]. [`Firmware::poll`] runs one cooperative main-loop
//! iteration; nothing here needs locking because button handling,
//! animation, and command dispatch execute strictly in sequence.

pub mod animate;
pub mod button;
pub mod dispatch;

use embassy_time::Instant;
use embedded_hal::digital::InputPin;
use embedded_io::{Read, ReadReady, Write};
use rand_core::RngCore;
use smart_leds_trait::{SmartLedsWrite, RGB8};

use crate::protocol::LED_COUNT;
use animate::Animator;
use button::{Button, ButtonEvent};
use dispatch::LinkError;

/// Operating regime of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Low-power suspend; only a button edge wakes the device.
    Off,
    /// The ambient animation drives the matrix.
    Random,
    /// An external controller owns the matrix; animation is halted.
    Bt,
}

/// Ground-truth pixel buffer plus the hardware sink behind it.
pub struct LedMatrix<D> {
    strip: D,
    colors: [RGB8; LED_COUNT],
}

impl<D, E> LedMatrix<D>
where
    D: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(strip: D) -> Self {
        Self {
            strip,
            colors: [RGB8::default(); LED_COUNT],
        }
    }

    /// Set one pixel in the buffer. `id` must be below [`LED_COUNT`].
    pub fn set(&mut self, id: usize, color: RGB8) {
        self.colors[id] = color;
    }

    /// Set every pixel in the buffer to `color`.
    pub fn fill(&mut self, color: RGB8) {
        self.colors = [color; LED_COUNT];
    }

    /// Blank the buffer.
    pub fn clear(&mut self) {
        self.fill(RGB8::default());
    }

    /// Replace the whole buffer with a rendered frame.
    pub fn load(&mut self, frame: &[RGB8; LED_COUNT]) {
        self.colors = *frame;
    }

    pub fn colors(&self) -> &[RGB8; LED_COUNT] {
        &self.colors
    }

    /// Push the whole buffer to the strip, flushing once.
    ///
    /// Sink failures are logged and swallowed; the protocol exchange
    /// must not be poisoned by the pixel hardware.
    pub fn show(&mut self) {
        if let Err(e) = self.strip.write(self.colors.iter().copied()) {
            tracing::error!(?e, "strip write failed");
        }
    }
}

/// Hardware low-power hook.
pub trait PowerControl {
    /// Suspend until the next button edge.
    ///
    /// The implementation must arm the button as a one-shot wake source
    /// before sleeping and disarm it on return. The wake interrupt does
    /// no protocol work; it only resumes the main loop.
    fn suspend_until_wake(&mut self);
}

/// The device firmware: one instance owns every peripheral seam.
pub struct Firmware<S, D, P, W, R> {
    serial: S,
    matrix: LedMatrix<D>,
    button: Button<P>,
    power: W,
    animator: Animator<R>,
    mode: Mode,
}

impl<S, D, E, P, W, R> Firmware<S, D, P, W, R>
where
    S: Read + Write + ReadReady,
    D: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
    P: InputPin,
    W: PowerControl,
    R: RngCore,
{
    pub fn new(serial: S, strip: D, pin: P, power: W, rng: R) -> Self {
        tracing::info!("boot finished");
        Self {
            serial,
            matrix: LedMatrix::new(strip),
            button: Button::new(pin),
            power,
            animator: Animator::new(rng),
            mode: Mode::Random,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn matrix(&self) -> &LedMatrix<D> {
        &self.matrix
    }

    /// One cooperative main-loop iteration: button, mode, link service.
    ///
    /// `now` must be monotone across calls. Link failures abandon the
    /// current dispatch cycle without a response; everything else in the
    /// iteration has already run by then.
    pub fn poll(&mut self, now: Instant) -> Result<(), LinkError<S::Error>> {
        match self.button.read(now) {
            ButtonEvent::Pressed => {
                tracing::info!("button pressed");
                self.mode = Mode::Random;
            }
            ButtonEvent::PressedContinuously => {
                tracing::info!("button pressed continuously");
                self.mode = Mode::Off;
            }
            ButtonEvent::Released => {}
        }

        match self.mode {
            Mode::Off => {
                self.matrix.clear();
                self.matrix.show();
                tracing::info!("sleeping");
                self.power.suspend_until_wake();
                tracing::info!("waking up");
                self.mode = Mode::Random;
            }
            Mode::Random => {
                if let Some(frame) = self.animator.tick(now) {
                    self.matrix.load(frame);
                    self.matrix.show();
                }
            }
            Mode::Bt => {}
        }

        dispatch::service_link(&mut self.serial, &mut self.matrix, &mut self.mode)
    }
}
