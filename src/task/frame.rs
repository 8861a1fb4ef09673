//! Wire framing for the task channel.
//!
//! ```text
//! ┌──────┬──────┬──────────┬──────────┬──────────┬────────────┬──────────┐
//! │ 0x7E │ kind │ token    │ seq      │ length   │ payload    │ crc32    │
//! │      │ u8   │ u16 LE   │ u16 LE   │ u16 LE   │ length B   │ u32 LE   │
//! └──────┴──────┴──────────┴──────────┴──────────┴────────────┴──────────┘
//! ```
//!
//! The CRC-32 (IEEE) covers everything between the start marker and the
//! trailer. After the marker, any `0x7E` or `0x7D` byte is sent as `0x7D`
//! followed by the byte XOR `0x20`, so a start marker on the wire always
//! begins a frame.
//!
//! `seq` numbers the data frames of one token from zero. A done frame carries
//! the number of data frames sent before it; the remaining kinds send zero.
//!
//! The [`Decoder`] is fed one byte at a time so it copes with reads that
//! split a frame, join several frames, or carry line noise between them.

use crate::channel::error::Error;
use heapless::Vec;

/// Start-of-frame marker.
pub const SOF: u8 = 0x7E;
const ESC: u8 = 0x7D;
const ESC_XOR: u8 = 0x20;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 256;

/// kind + token + seq + length
const HEADER_LEN: usize = 7;
const TRAILER_LEN: usize = 4;
const MAX_BODY_LEN: usize = HEADER_LEN + MAX_PAYLOAD + TRAILER_LEN;

/// Largest encoded frame, start marker and escapes included.
pub const MAX_FRAME_LEN: usize = 1 + 2 * MAX_BODY_LEN;

/// What a frame means to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    /// Microcontroller to co-processor: JSON command body.
    Command = 0x01,
    /// Co-processor accepted the command.
    Ack = 0x02,
    /// Co-processor refused the command; payload may carry a reason code.
    Nak = 0x03,
    /// A chunk of response data.
    Data = 0x04,
    /// The remote operation finished successfully.
    Done = 0x05,
    /// The remote operation failed; payload carries the reason.
    Fail = 0x06,
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Kind::Command),
            0x02 => Ok(Kind::Ack),
            0x03 => Ok(Kind::Nak),
            0x04 => Ok(Kind::Data),
            0x05 => Ok(Kind::Done),
            0x06 => Ok(Kind::Fail),
            _ => Err(Error::ProtocolError),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: Kind,
    /// Raw correlation token as it appeared on the wire.
    pub token: u16,
    pub seq: u16,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

/// Encode a frame into `out`, returning the number of bytes written.
pub fn encode(
    kind: Kind,
    token: u16,
    seq: u16,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::BufferOverflow);
    }

    let body_end = HEADER_LEN + payload.len();
    let mut body = [0u8; MAX_BODY_LEN];
    body[0] = kind as u8;
    body[1..3].copy_from_slice(&token.to_le_bytes());
    body[3..5].copy_from_slice(&seq.to_le_bytes());
    body[5..7].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    body[HEADER_LEN..body_end].copy_from_slice(payload);
    let crc = crc32fast::hash(&body[..body_end]);
    body[body_end..body_end + TRAILER_LEN].copy_from_slice(&crc.to_le_bytes());

    let mut written = 0;
    let mut put = |byte: u8| {
        let slot = out.get_mut(written).ok_or(Error::BufferOverflow)?;
        *slot = byte;
        written += 1;
        Ok::<(), Error>(())
    };
    put(SOF)?;
    for &byte in &body[..body_end + TRAILER_LEN] {
        if byte == SOF || byte == ESC {
            put(ESC)?;
            put(byte ^ ESC_XOR)?;
        } else {
            put(byte)?;
        }
    }
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Skipping bytes until a start marker shows up.
    Hunting,
    Header,
    /// Collecting payload and trailer; `expected` counts from the kind byte.
    Body { expected: usize },
}

/// Byte-at-a-time frame decoder.
#[derive(Debug)]
pub struct Decoder {
    state: State,
    escaped: bool,
    raw: [u8; MAX_BODY_LEN],
    collected: usize,
    rejected: u32,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: State::Hunting,
            escaped: false,
            raw: [0; MAX_BODY_LEN],
            collected: 0,
            rejected: 0,
        }
    }

    /// Push one byte; returns a frame when this byte completes a valid one.
    ///
    /// Frames with an unknown kind, an oversized length or a bad checksum are
    /// dropped and counted in [`rejected`](Self::rejected), as is a frame cut
    /// short by the next start marker.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        if byte == SOF {
            if self.state != State::Hunting && self.collected > 0 {
                self.reject();
            }
            self.collected = 0;
            self.escaped = false;
            self.state = State::Header;
            return None;
        }
        if self.state == State::Hunting {
            return None;
        }
        if byte == ESC {
            self.escaped = true;
            return None;
        }
        let byte = if self.escaped {
            self.escaped = false;
            byte ^ ESC_XOR
        } else {
            byte
        };

        self.raw[self.collected] = byte;
        self.collected += 1;
        match self.state {
            State::Hunting => None,
            State::Header => {
                if self.collected < HEADER_LEN {
                    return None;
                }

                let len = u16::from_le_bytes([self.raw[5], self.raw[6]]) as usize;
                if Kind::try_from(self.raw[0]).is_err() || len > MAX_PAYLOAD {
                    self.reject();
                    return None;
                }
                self.state = State::Body {
                    expected: HEADER_LEN + len + TRAILER_LEN,
                };
                None
            }
            State::Body { expected } => {
                if self.collected < expected {
                    return None;
                }
                self.state = State::Hunting;
                self.finish(expected)
            }
        }
    }

    fn finish(&mut self, expected: usize) -> Option<Frame> {
        let body_end = expected - TRAILER_LEN;
        let mut crc = [0u8; TRAILER_LEN];
        crc.copy_from_slice(&self.raw[body_end..expected]);
        if crc32fast::hash(&self.raw[..body_end]) != u32::from_le_bytes(crc) {
            self.reject();
            return None;
        }

        // Both checks already passed in the header state.
        let kind = Kind::try_from(self.raw[0]).ok()?;
        let payload = Vec::from_slice(&self.raw[HEADER_LEN..body_end]).ok()?;
        Some(Frame {
            kind,
            token: u16::from_le_bytes([self.raw[1], self.raw[2]]),
            seq: u16::from_le_bytes([self.raw[3], self.raw[4]]),
            payload,
        })
    }

    fn reject(&mut self) {
        trace!("dropping malformed frame");
        self.rejected = self.rejected.wrapping_add(1);
        self.state = State::Hunting;
        self.escaped = false;
        self.collected = 0;
    }

    /// Number of frames dropped for failing validation.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Discard any partially collected frame.
    pub fn reset(&mut self) {
        self.state = State::Hunting;
        self.escaped = false;
        self.collected = 0;
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
