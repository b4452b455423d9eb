//! Byte-stream command dispatcher for the serial link.
//!
//! Commands arrive as raw bytes with no framing. One dispatch cycle
//! drains every byte currently available on the link, feeds them through
//! a per-byte state machine, and ends with exactly one response frame —
//! unless the transport itself fails, in which case the cycle is
//! abandoned silently and the next cycle starts fresh.

use embedded_io::{Read, ReadReady, Write};
use smart_leds_trait::{SmartLedsWrite, RGB8};

use crate::firmware::{LedMatrix, Mode};
use crate::protocol::{Opcode, Status, LED_COUNT, LED_DUMP_LEN, RECORD_LEN};

/// Why a dispatch cycle was abandoned without a response.
#[derive(Debug)]
pub enum LinkError<E> {
    /// The byte stream ended mid-cycle.
    Closed,
    /// The transport reported an error.
    Transport(E),
}

/// Command latched for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    GetLeds,
    SetLeds,
    SetLedsAll,
}

impl Pending {
    /// Opcode byte echoed in the response; 0x00 when nothing was latched.
    fn raw(self) -> u8 {
        match self {
            Pending::None => 0x00,
            Pending::GetLeds => Opcode::GetLeds as u8,
            Pending::SetLeds => Opcode::SetLeds as u8,
            Pending::SetLedsAll => Opcode::SetLedsAll as u8,
        }
    }
}

/// Drain one burst of available bytes and answer it.
///
/// Returns without touching the link when no byte is pending. A burst
/// that latches a mutating command moves `mode` to [`Mode::Bt`].
pub fn service_link<S, D, E>(
    serial: &mut S,
    matrix: &mut LedMatrix<D>,
    mode: &mut Mode,
) -> Result<(), LinkError<S::Error>>
where
    S: Read + Write + ReadReady,
    D: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
{
    if !serial.read_ready().map_err(LinkError::Transport)? {
        return Ok(());
    }

    // -1 = opcode not yet consumed, otherwise payload bytes consumed so far
    let mut count: i16 = -1;
    let mut cmd = Pending::None;
    let mut status = Status::InvalidDataLength;
    let mut scratch = [0u8; LED_DUMP_LEN];

    while serial.read_ready().map_err(LinkError::Transport)? {
        let mut byte = [0u8; 1];
        let n = serial.read(&mut byte).map_err(LinkError::Transport)?;
        if n == 0 {
            tracing::debug!("link closed mid-cycle");
            return Err(LinkError::Closed);
        }
        let data = byte[0];
        tracing::trace!(byte = data, "received");

        match cmd {
            Pending::None => {
                if status == Status::InvalidCommand {
                    // burst already rejected: keep draining the wire
                    tracing::trace!(byte = data, "consuming extra data");
                } else {
                    match Opcode::from_raw(data) {
                        Some(Opcode::GetLeds) => {
                            cmd = Pending::GetLeds;
                            // no payload: the opcode byte itself completes
                            // the command, so handle it in the same step
                            count = 0;
                            get_leds(count, &mut status, &mut scratch, matrix, data);
                        }
                        Some(Opcode::SetLeds) => cmd = Pending::SetLeds,
                        Some(Opcode::SetLedsAll) => cmd = Pending::SetLedsAll,
                        None => status = Status::InvalidCommand,
                    }
                }
            }
            Pending::GetLeds => get_leds(count, &mut status, &mut scratch, matrix, data),
            Pending::SetLeds => set_leds(count, &mut status, &mut scratch, matrix, mode, data),
            Pending::SetLedsAll => {
                set_leds_all(count, &mut status, &mut scratch, matrix, mode, data)
            }
        }
        count += 1;
    }

    tracing::debug!(bytes = count + 1, cmd = ?cmd, status = ?status, "burst drained");

    serial
        .write_all(&[cmd.raw(), status as u8])
        .map_err(LinkError::Transport)?;
    if status == Status::Ok && cmd == Pending::GetLeds {
        serial.write_all(&scratch).map_err(LinkError::Transport)?;
    }
    serial.flush().map_err(LinkError::Transport)?;
    Ok(())
}

/// GET_LEDS: snapshot the whole matrix on entry, drain anything after.
fn get_leds<D, E>(
    count: i16,
    status: &mut Status,
    scratch: &mut [u8; LED_DUMP_LEN],
    matrix: &LedMatrix<D>,
    data: u8,
) where
    D: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
{
    if count < 0 {
        *status = Status::InvalidState;
        return;
    }
    if count == 0 && matches!(*status, Status::InvalidDataLength | Status::Ok) {
        for (id, color) in matrix.colors().iter().enumerate() {
            let record = &mut scratch[id * RECORD_LEN..(id + 1) * RECORD_LEN];
            record[0] = id as u8;
            record[1] = color.r;
            record[2] = color.g;
            record[3] = color.b;
        }
        *status = Status::Ok;
    } else {
        tracing::trace!(byte = data, "consuming extra data");
    }
}

/// SET_LEDS: apply each completed `[id, r, g, b]` record immediately.
fn set_leds<D, E>(
    count: i16,
    status: &mut Status,
    scratch: &mut [u8; LED_DUMP_LEN],
    matrix: &mut LedMatrix<D>,
    mode: &mut Mode,
    data: u8,
) where
    D: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
{
    if count < 0 {
        *status = Status::InvalidState;
        return;
    }
    let at = count as usize;
    if at < LED_DUMP_LEN && matches!(*status, Status::InvalidDataLength | Status::Ok) {
        scratch[at] = data;
        if at % RECORD_LEN == RECORD_LEN - 1 {
            let record = &scratch[at + 1 - RECORD_LEN..=at];
            let id = record[0];
            if (id as usize) >= LED_COUNT {
                *status = Status::LedOutOfRange;
                return;
            }
            matrix.set(
                id as usize,
                RGB8 {
                    r: record[1],
                    g: record[2],
                    b: record[3],
                },
            );
            matrix.show();
            *mode = Mode::Bt;
            *status = Status::Ok;
        }
    } else {
        tracing::trace!(byte = data, "consuming extra data");
    }
}

/// SET_LEDS_ALL: the fill is re-applied after every accepted byte,
/// zero-padded until all three channels have arrived.
fn set_leds_all<D, E>(
    count: i16,
    status: &mut Status,
    scratch: &mut [u8; LED_DUMP_LEN],
    matrix: &mut LedMatrix<D>,
    mode: &mut Mode,
    data: u8,
) where
    D: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
{
    if count < 0 {
        *status = Status::InvalidState;
        return;
    }
    let at = count as usize;
    if at < 3 && matches!(*status, Status::InvalidDataLength | Status::Ok) {
        scratch[at] = data;
        matrix.fill(RGB8 {
            r: scratch[0],
            g: scratch[1],
            b: scratch[2],
        });
        matrix.show();
        *mode = Mode::Bt;
        *status = Status::Ok;
    } else {
        tracing::trace!(byte = data, "consuming extra data");
    }
}
