//! Byte-level link between the microcontroller and the co-processor.
//!
//! The physical transport (UART, SPI, shared memory) lives outside this crate.
//! Implement [`Read`] and [`Write`] for it and mark it with [`Channel`]; the
//! task dispatcher only ever talks to the link through these traits.
//!
//! Reads are expected to be non-blocking: `Ok(0)` means "no bytes available
//! right now", not end-of-stream. A link that is momentarily saturated may
//! also accept fewer bytes than offered on [`Write::write`].

#![deny(unsafe_code)]

/// Common error types for channel and dispatch operations
pub mod error;

pub use error::Error;

/// Re-exports of the channel traits
pub mod prelude {
    pub use super::{Channel, Read, Write};
}

pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read whatever bytes are currently available, returning `Ok(0)` if none
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the link, returning how many bytes were accepted
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// A duplex inter-processor link
pub trait Channel: Read + Write {}

/// Write all of `buf`, treating a zero-length write as a saturated link.
pub(crate) fn write_all<W: Write + ?Sized>(link: &mut W, mut buf: &[u8]) -> Result<(), Error> {
    while !buf.is_empty() {
        match link.write(buf) {
            Ok(0) => return Err(Error::WriteError),
            Ok(n) => buf = &buf[n..],
            Err(_) => return Err(Error::WriteError),
        }
    }
    link.flush().map_err(|_| Error::WriteError)
}
