//! Wire protocol and firmware logic for a Bluetooth-controlled LED matrix.
//!
//! The `protocol` module is the vocabulary shared with the host client;
//! `firmware` holds the device-side control loop behind hardware-generic
//! driver seams.
#![no_std]

pub mod firmware;
pub mod protocol;

pub use smart_leds_trait::RGB8;
