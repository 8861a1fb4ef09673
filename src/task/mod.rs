//! # Task dispatch over the inter-processor channel
//!
//! Capability wrappers (such as [`https`](crate::https)) never touch the link
//! directly. They hand a [`Command`] to something implementing [`Dispatch`],
//! get a correlation [`Token`] back once the co-processor has acknowledged
//! it, and then [`poll`](Dispatch::poll) that token from the application's
//! main loop until the remote side reports completion or failure.
//!
//! ```text
//! ┌──────────────┐  submit / poll / cancel  ┌──────────────┐  frames  ┌─────────┐
//! │  Capability  │─────────────────────────▶│  Dispatcher  │─────────▶│ Channel │
//! │   wrapper    │◀─────────────────────────│  (+mailbox)  │◀─────────│         │
//! └──────────────┘   Poll::{Data, Done..}   └──────────────┘          └─────────┘
//! ```
//!
//! Only submission blocks, and only until the acknowledgement arrives (or the
//! configured number of read attempts runs out). The remote work itself is
//! observed exclusively through polling.
//!
//! Several wrappers can share one channel by sharing a
//! `RefCell<Dispatcher<_>>`: `&RefCell<D>` implements [`Dispatch`], and the
//! dispatcher parks frames addressed to other tokens until their owner polls.

#![deny(unsafe_code)]

use crate::channel::error::Error;
use core::cell::RefCell;
use core::fmt;
use core::num::NonZeroU16;

pub mod command;
pub mod dispatcher;
pub mod frame;

pub use command::{Command, Op};
pub use dispatcher::{Dispatcher, Stats};

/// Frames held for tokens other than the one being polled.
pub const MAILBOX_DEPTH: usize = 8;

/// Requests that may be outstanding on one dispatcher at the same time.
pub const MAX_LIVE_TOKENS: usize = 8;

/// Correlates a submitted command with the frames answering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(NonZeroU16);

impl Token {
    /// Wrap a wire value; zero is never a valid token.
    pub fn new(raw: u16) -> Option<Self> {
        NonZeroU16::new(raw).map(Token)
    }

    pub fn get(self) -> u16 {
        self.0.get()
    }
}

/// Why the co-processor gave up on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteError {
    /// Host name did not resolve.
    Dns,
    /// TLS handshake or certificate validation failed.
    Tls,
    /// The server answered with a non-success HTTP status.
    Http(u16),
    /// The co-processor has no capacity for another operation.
    Busy,
    /// The operation was cancelled on the remote side.
    Cancelled,
    /// A reason code this side does not know.
    Unknown(u8),
}

impl RemoteError {
    const DNS: u8 = 0x01;
    const TLS: u8 = 0x02;
    const HTTP: u8 = 0x03;
    const BUSY: u8 = 0x04;
    const CANCELLED: u8 = 0x05;

    /// Decode a `Fail`/`Nak` payload: reason code, then an optional LE status.
    pub fn from_payload(payload: &[u8]) -> Self {
        match payload {
            [] => RemoteError::Unknown(0),
            [Self::DNS, ..] => RemoteError::Dns,
            [Self::TLS, ..] => RemoteError::Tls,
            [Self::HTTP, lo, hi, ..] => RemoteError::Http(u16::from_le_bytes([*lo, *hi])),
            [Self::HTTP, ..] => RemoteError::Http(0),
            [Self::BUSY, ..] => RemoteError::Busy,
            [Self::CANCELLED, ..] => RemoteError::Cancelled,
            [code, ..] => RemoteError::Unknown(*code),
        }
    }

    /// Encode as a `Fail`/`Nak` payload.
    pub fn to_payload(self) -> heapless::Vec<u8, 3> {
        let mut out = heapless::Vec::new();
        let (code, status) = match self {
            RemoteError::Dns => (Self::DNS, None),
            RemoteError::Tls => (Self::TLS, None),
            RemoteError::Http(status) => (Self::HTTP, Some(status)),
            RemoteError::Busy => (Self::BUSY, None),
            RemoteError::Cancelled => (Self::CANCELLED, None),
            RemoteError::Unknown(code) => (code, None),
        };
        // Capacity is exactly one code byte plus a u16.
        let _ = out.push(code);
        if let Some(status) = status {
            let _ = out.extend_from_slice(&status.to_le_bytes());
        }
        out
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Dns => f.write_str("dns lookup failed"),
            RemoteError::Tls => f.write_str("tls handshake failed"),
            RemoteError::Http(status) => write!(f, "http status {}", status),
            RemoteError::Busy => f.write_str("co-processor busy"),
            RemoteError::Cancelled => f.write_str("cancelled remotely"),
            RemoteError::Unknown(code) => write!(f, "remote failure code {}", code),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RemoteError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            RemoteError::Dns => defmt::write!(f, "Dns"),
            RemoteError::Tls => defmt::write!(f, "Tls"),
            RemoteError::Http(status) => defmt::write!(f, "Http({})", status),
            RemoteError::Busy => defmt::write!(f, "Busy"),
            RemoteError::Cancelled => defmt::write!(f, "Cancelled"),
            RemoteError::Unknown(code) => defmt::write!(f, "Unknown({})", code),
        }
    }
}

/// Outcome of one [`Dispatch::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Nothing new for this token yet.
    Pending,
    /// This many bytes of response data were copied into the caller's buffer.
    Data(usize),
    /// The remote operation finished; the token is retired.
    Complete,
    /// The remote operation failed; the token is retired.
    Failed(RemoteError),
}

/// How `Data` payloads are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Raw bytes.
    #[default]
    Raw,
    /// Base64, for links that are not 8-bit clean.
    Base64,
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Channel reads spent waiting for an acknowledgement before giving up.
    pub ack_attempts: u32,
    /// Channel reads a single [`Dispatch::poll`] may spend looking for a frame.
    pub read_attempts: u32,
    /// Encoding of response data frames.
    pub encoding: Encoding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ack_attempts: 64,
            read_attempts: 4,
            encoding: Encoding::Raw,
        }
    }
}

/// The remote-call capability a wrapper is built on.
pub trait Dispatch {
    /// Send `command` and wait (bounded) for the co-processor to acknowledge it.
    fn submit(&mut self, command: &Command<'_>) -> Result<Token, Error>;

    /// Check for progress on `token`, copying any response data into `buf`.
    ///
    /// `buf` must be at least [`frame::MAX_PAYLOAD`] bytes long. An `Err` means
    /// the request cannot go on (the channel failed or data went missing),
    /// never "no data yet".
    fn poll(&mut self, token: Token, buf: &mut [u8]) -> Result<Poll, Error>;

    /// Ask the co-processor to abandon `token`. Returns without waiting for
    /// the remote side; the token is retired locally either way. A token
    /// that already finished sends nothing.
    fn cancel(&mut self, token: Token) -> Result<(), Error>;
}

impl<D: Dispatch + ?Sized> Dispatch for &mut D {
    fn submit(&mut self, command: &Command<'_>) -> Result<Token, Error> {
        (**self).submit(command)
    }

    fn poll(&mut self, token: Token, buf: &mut [u8]) -> Result<Poll, Error> {
        (**self).poll(token, buf)
    }

    fn cancel(&mut self, token: Token) -> Result<(), Error> {
        (**self).cancel(token)
    }
}

/// Shared access for several wrappers on one channel.
///
/// Calls are serialized through the `RefCell`; none of them re-enters the
/// dispatcher, so the borrow never overlaps.
impl<D: Dispatch> Dispatch for &RefCell<D> {
    fn submit(&mut self, command: &Command<'_>) -> Result<Token, Error> {
        self.borrow_mut().submit(command)
    }

    fn poll(&mut self, token: Token, buf: &mut [u8]) -> Result<Poll, Error> {
        self.borrow_mut().poll(token, buf)
    }

    fn cancel(&mut self, token: Token) -> Result<(), Error> {
        self.borrow_mut().cancel(token)
    }
}
