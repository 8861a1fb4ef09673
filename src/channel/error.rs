//! Common error types for channel and dispatch operations

use core::fmt;

/// A common error type for the task channel.
///
/// Covers failures of the byte link itself, of the dispatch protocol running
/// on top of it, and of the argument checks the capability wrappers perform
/// before anything is sent. It is `Copy` so it can be stored in status values
/// and reported long after the call that produced it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The link refused or failed a write; the command never left this side.
    WriteError,
    /// The link failed while reading.
    ReadError,
    /// The co-processor did not acknowledge a command in time.
    Timeout,
    /// The co-processor answered a command with a negative acknowledgement.
    Rejected,
    /// A frame arrived that does not fit the dispatch protocol.
    ProtocolError,
    /// A token was polled that the dispatcher does not track.
    UnknownToken,
    /// Every correlation slot is in use.
    TooManyRequests,
    /// Data did not fit in a fixed-size buffer.
    BufferOverflow,
    /// The URL is empty, malformed, or not `https://`.
    InvalidUrl,
    /// The URL does not fit in a single command frame.
    UrlTooLong,
    /// A request is already active and the wrapper is set to reject new ones.
    Busy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::WriteError => "channel write failed",
            Error::ReadError => "channel read failed",
            Error::Timeout => "no acknowledgement from co-processor",
            Error::Rejected => "command rejected by co-processor",
            Error::ProtocolError => "unexpected frame on task channel",
            Error::UnknownToken => "unknown correlation token",
            Error::TooManyRequests => "no free correlation slot",
            Error::BufferOverflow => "buffer overflow",
            Error::InvalidUrl => "invalid url",
            Error::UrlTooLong => "url too long",
            Error::Busy => "request already in progress",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::Rejected => defmt::write!(f, "Rejected"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
            Error::UnknownToken => defmt::write!(f, "UnknownToken"),
            Error::TooManyRequests => defmt::write!(f, "TooManyRequests"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            Error::InvalidUrl => defmt::write!(f, "InvalidUrl"),
            Error::UrlTooLong => defmt::write!(f, "UrlTooLong"),
            Error::Busy => defmt::write!(f, "Busy"),
        }
    }
}
