//! # libcoproc - remote tasks for constrained microcontrollers
//!
//! Some boards pair a small microcontroller with a more capable co-processor
//! that owns the network stack. The microcontroller cannot fetch a web page
//! itself; it asks the co-processor to do it over an inter-processor channel
//! and collects the result piece by piece. This crate implements the
//! microcontroller side of that exchange.
//!
//! ## Layers
//!
//! - **[`channel`]**: the byte link to the co-processor. You provide it by
//!   implementing [`channel::Read`] and [`channel::Write`] for your UART, SPI
//!   or shared-memory driver.
//! - **[`task`]**: the dispatch protocol. Commands go out as checksummed
//!   frames, are acknowledged, and are answered with data, completion or
//!   failure frames correlated by token. [`task::Dispatcher`] is the
//!   channel-backed implementation of the [`task::Dispatch`] capability.
//! - **[`https`]**: [`https::HttpsClient`], which starts an HTTPS GET on the
//!   co-processor and streams the response back to a callback without ever
//!   blocking the main loop for the duration of the fetch.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use libcoproc::https::HttpsClient;
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
//! https.connect("https://example.com/battery").ok();
//!
//! // from the main loop
//! https.get_handle(|chunk| {
//!     let _ = chunk;
//! });
//! ```
//!
//! ### Sharing one channel
//!
//! ```rust,no_run
//! use core::cell::RefCell;
//! use libcoproc::https::HttpsClient;
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
//! let dispatcher = RefCell::new(Dispatcher::new(Uart));
//! let mut weather = HttpsClient::new(&dispatcher);
//! let mut prices = HttpsClient::new(&dispatcher);
//! weather.connect("https://example.com/weather").ok();
//! prices.connect("https://example.com/prices").ok();
//! ```
//!
//! ## Optional Features
//!
//! - `std`: implement `std::error::Error` for the error types
//! - `defmt`: log through `defmt` and implement `defmt::Format`
//! - `log`: log through the `log` facade

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Byte-level link to the co-processor.
///
/// Defines the traits a transport driver implements and the error type shared
/// by every layer above it.
#[allow(missing_docs)]
pub mod channel;

/// Task-dispatch protocol: framing, commands, correlation and polling.
#[allow(missing_docs)]
pub mod task;

/// HTTPS requests executed on the co-processor.
#[allow(missing_docs)]
pub mod https;
