//! HTTPS GET requests executed on the co-processor.
//!
//! The microcontroller never speaks TLS itself. [`HttpsClient`] sends an
//! `https_get` command through a [`Dispatch`](crate::task::Dispatch)
//! implementation and then drains the response chunk by chunk from the
//! application's main loop.
//!
//! # Usage
//!
//! ```rust,no_run
//! use libcoproc::https::{HttpsClient, Status};
//! use libcoproc::task::Dispatcher;
//! # use libcoproc::channel::{Channel, Read, Write};
//! # struct Uart;
//! # impl Read for Uart {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for Uart {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Channel for Uart {}
//!
//! let mut https = HttpsClient::new(Dispatcher::new(Uart));
//! https.connect("https://example.com/status").ok();
//!
//! loop {
//!     https.get_handle(|chunk| {
//!         // an empty chunk marks the end of the response
//!         let _ = chunk;
//!     });
//!     match https.status() {
//!         Status::Pending | Status::Streaming => { /* other loop work */ }
//!         _ => break,
//!     }
//! }
//! ```

/// HTTPS wrapper and delivery loop.
pub mod client;

pub use client::{Config, ConnectPolicy, Delivery, Failure, HttpsClient, Status};

/// Longest URL that still fits an `https_get` command frame.
pub const MAX_URL_LEN: usize = 224;
