//! Serial command/response protocol shared by the firmware and the host.
//!
//! Requests are `[opcode, payload...]`, responses `[opcode, status, data...]`.
//! The stream carries no length prefix or terminator; the firmware infers
//! request boundaries from burst draining and the host infers response
//! boundaries from inter-byte silence. This module only defines the byte
//! layout; boundary handling lives with each end.

use heapless::Vec;
use smart_leds_trait::RGB8;

/// Number of addressable LEDs. Ids travel as a single byte, so this must
/// stay at or below 256.
pub const LED_COUNT: usize = 64;

/// Bytes per `[id, r, g, b]` record.
pub const RECORD_LEN: usize = 4;

/// Records allowed in one SET_LEDS request frame.
pub const MAX_WRITE_RECORDS: usize = 16;

/// `[opcode, status]`.
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Largest request frame: opcode plus a full SET_LEDS payload.
pub const MAX_REQUEST_LEN: usize = 1 + MAX_WRITE_RECORDS * RECORD_LEN;

/// Payload length of a successful GET_LEDS response.
pub const LED_DUMP_LEN: usize = LED_COUNT * RECORD_LEN;

/// Request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Read the color of every LED.
    GetLeds = 0x01,
    /// Set specific LEDs, one `[id, r, g, b]` record each.
    SetLeds = 0x02,
    /// Set every LED to one `[r, g, b]` color.
    SetLedsAll = 0x03,
}

impl Opcode {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Opcode::GetLeds),
            0x02 => Some(Opcode::SetLeds),
            0x03 => Some(Opcode::SetLedsAll),
            _ => None,
        }
    }
}

/// Terminal status of one command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    InvalidDataLength = 0x01,
    LedOutOfRange = 0x02,
    InvalidState = 0xFE,
    InvalidCommand = 0xFF,
}

impl Status {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::InvalidDataLength),
            0x02 => Some(Status::LedOutOfRange),
            0xFE => Some(Status::InvalidState),
            0xFF => Some(Status::InvalidCommand),
            _ => None,
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Response shorter than the mandatory `[opcode, status]` header.
    Truncated { len: usize },
    /// Status byte outside the defined set.
    UnknownStatus { raw: u8 },
    /// SET_LEDS request without any record.
    EmptyWrite,
    /// SET_LEDS request beyond [`MAX_WRITE_RECORDS`].
    TooManyRecords { count: usize },
    /// GET_LEDS payload length other than [`LED_DUMP_LEN`].
    DumpLengthMismatch { len: usize },
    /// GET_LEDS payload addressing an id outside the matrix.
    DumpIdOutOfRange { id: u8 },
}

/// A request frame ready for the wire.
pub type RequestFrame = Vec<u8, MAX_REQUEST_LEN>;

/// Encode a GET_LEDS request. The opcode is the whole frame.
pub fn encode_read() -> RequestFrame {
    let mut frame = RequestFrame::new();
    let _ = frame.push(Opcode::GetLeds as u8);
    frame
}

/// Encode a SET_LEDS request for the given `(id, color)` records.
pub fn encode_write(records: &[(u8, RGB8)]) -> Result<RequestFrame, CodecError> {
    if records.is_empty() {
        return Err(CodecError::EmptyWrite);
    }
    if records.len() > MAX_WRITE_RECORDS {
        return Err(CodecError::TooManyRecords {
            count: records.len(),
        });
    }
    let mut frame = RequestFrame::new();
    // cannot overflow: MAX_REQUEST_LEN covers MAX_WRITE_RECORDS records
    let _ = frame.push(Opcode::SetLeds as u8);
    for &(id, color) in records {
        let _ = frame.extend_from_slice(&[id, color.r, color.g, color.b]);
    }
    Ok(frame)
}

/// Encode a SET_LEDS_ALL request for one color.
pub fn encode_write_all(color: RGB8) -> RequestFrame {
    let mut frame = RequestFrame::new();
    let _ = frame.extend_from_slice(&[Opcode::SetLedsAll as u8, color.r, color.g, color.b]);
    frame
}

/// A decoded response frame, borrowing the raw data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'a> {
    /// Echoed request opcode; 0x00 when the device latched no command.
    pub opcode: u8,
    pub status: Status,
    pub data: &'a [u8],
}

/// Split a raw response into its fields.
///
/// Rejects anything shorter than the two-byte header, so callers never
/// index into a fragment.
pub fn decode_response(raw: &[u8]) -> Result<Response<'_>, CodecError> {
    if raw.len() < RESPONSE_HEADER_LEN {
        return Err(CodecError::Truncated { len: raw.len() });
    }
    let status = Status::from_raw(raw[1]).ok_or(CodecError::UnknownStatus { raw: raw[1] })?;
    Ok(Response {
        opcode: raw[0],
        status,
        data: &raw[RESPONSE_HEADER_LEN..],
    })
}

/// Parse a GET_LEDS success payload into a full color table.
///
/// The device emits `LED_COUNT` records in ascending id order; each id is
/// validated against the matrix size.
pub fn decode_led_dump(data: &[u8]) -> Result<[RGB8; LED_COUNT], CodecError> {
    if data.len() != LED_DUMP_LEN {
        return Err(CodecError::DumpLengthMismatch { len: data.len() });
    }
    let mut colors = [RGB8::default(); LED_COUNT];
    for record in data.chunks_exact(RECORD_LEN) {
        let id = record[0];
        if (id as usize) >= LED_COUNT {
            return Err(CodecError::DumpIdOutOfRange { id });
        }
        colors[id as usize] = RGB8 {
            r: record[1],
            g: record[2],
            b: record[3],
        };
    }
    Ok(colors)
}
