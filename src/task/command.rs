//! JSON bodies carried by [`Kind::Command`](super::frame::Kind::Command) frames.
//!
//! ```json
//! {"op":"https_get","url":"https://example.com/a"}
//! {"op":"cancel"}
//! ```
//!
//! The correlation token travels in the frame header, not in the body.

use crate::channel::error::Error;
use serde::{Deserialize, Serialize};

/// Remote operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Start an HTTPS GET on the co-processor.
    HttpsGet,
    /// Abandon the operation identified by the frame's token.
    Cancel,
}

/// A command for the co-processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command<'a> {
    pub op: Op,
    #[serde(borrow, default, skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
}

impl<'a> Command<'a> {
    pub fn https_get(url: &'a str) -> Self {
        Self {
            op: Op::HttpsGet,
            url: Some(url),
        }
    }

    pub fn cancel() -> Self {
        Self {
            op: Op::Cancel,
            url: None,
        }
    }

    /// Serialize into `out`, returning the body length.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, Error> {
        serde_json_core::to_slice(self, out).map_err(|_| Error::BufferOverflow)
    }

    /// Parse a command body. Used on the co-processor side of the link.
    pub fn decode(body: &'a [u8]) -> Result<Self, Error> {
        serde_json_core::from_slice::<Command<'a>>(body)
            .map(|(command, _)| command)
            .map_err(|_| Error::ProtocolError)
    }
}
