//! Ambient color animation.
//!
//! Every LED carries a `(current, target)` color pair. Once per tick each
//! current color steps one unit per channel toward its target; a LED that
//! has arrived draws a fresh random target. Targets are dominant-hue: one
//! channel spans the full byte range, the other two stay muted, so the
//! matrix drifts between saturated colors instead of white noise.

use embassy_time::{Duration, Instant};
use rand_core::RngCore;
use smart_leds_trait::RGB8;

use crate::protocol::LED_COUNT;

/// Fade step interval.
const FADE_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive ceiling for the two non-dominant channels of a new target.
const MUTED_CHANNEL_RANGE: u32 = 8;

/// Fade-toward-random-target animation over the whole matrix.
pub struct Animator<R> {
    rng: R,
    current: [RGB8; LED_COUNT],
    target: [RGB8; LED_COUNT],
    last_tick: Option<Instant>,
}

impl<R: RngCore> Animator<R> {
    /// All LEDs start black and immediately fade toward their first
    /// random targets.
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            current: [RGB8::default(); LED_COUNT],
            target: [RGB8::default(); LED_COUNT],
            last_tick: None,
        }
    }

    /// Advance the fade by one step if a tick is due.
    ///
    /// Returns the frame to push to the strip, or `None` when the
    /// interval has not elapsed. The caller pushes all colors and
    /// flushes once per tick, never per LED.
    pub fn tick(&mut self, now: Instant) -> Option<&[RGB8; LED_COUNT]> {
        if let Some(last) = self.last_tick {
            if now - last <= FADE_INTERVAL {
                return None;
            }
        }
        self.last_tick = Some(now);

        for i in 0..LED_COUNT {
            if self.current[i] == self.target[i] {
                self.target[i] = random_target(&mut self.rng);
            }
            self.current[i] = step_toward(self.current[i], self.target[i]);
        }
        Some(&self.current)
    }
}

fn random_target<R: RngCore>(rng: &mut R) -> RGB8 {
    let dominant = rng.next_u32() % 3;
    RGB8 {
        r: random_channel(rng, dominant == 0),
        g: random_channel(rng, dominant == 1),
        b: random_channel(rng, dominant == 2),
    }
}

fn random_channel<R: RngCore>(rng: &mut R, dominant: bool) -> u8 {
    let range = if dominant { 256 } else { MUTED_CHANNEL_RANGE };
    (rng.next_u32() % range) as u8
}

/// One-unit step per channel, landing exactly on the target.
fn step_toward(current: RGB8, target: RGB8) -> RGB8 {
    RGB8 {
        r: step_channel(current.r, target.r),
        g: step_channel(current.g, target.g),
        b: step_channel(current.b, target.b),
    }
}

fn step_channel(current: u8, target: u8) -> u8 {
    if current < target {
        current + 1
    } else if current > target {
        current - 1
    } else {
        current
    }
}
