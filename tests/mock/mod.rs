//! Scripted co-processor used as the channel in integration tests.
//!
//! Everything the dispatcher writes is decoded and recorded; `https_get`
//! commands are answered according to [`Reply`]. Response frames are queued
//! by the test and handed out through `read`, at most `max_read` bytes at a
//! time to mimic a slow link.

#![allow(dead_code)]

use libcoproc::channel::error::Error;
use libcoproc::channel::{Channel, Read, Write};
use libcoproc::task::frame::{self, Decoder, Kind, MAX_FRAME_LEN, MAX_PAYLOAD};
use libcoproc::task::{Command, Op, RemoteError};
use std::collections::{HashMap, VecDeque};

/// How the fake answers an `https_get` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nak(RemoteError),
    Silent,
}

/// A command as the co-processor saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub token: u16,
    pub op: Op,
    pub url: Option<String>,
}

#[derive(Debug)]
pub struct FakeCoprocessor {
    decoder: Decoder,
    outbound: VecDeque<u8>,
    /// Data frames sent so far, per token.
    data_sent: HashMap<u16, u16>,
    pub received: Vec<Received>,
    pub reply: Reply,
    pub max_read: usize,
    pub link_down: bool,
    pub base64: bool,
}

impl FakeCoprocessor {
    pub fn new() -> Self {
        Self {
            decoder: Decoder::new(),
            outbound: VecDeque::new(),
            data_sent: HashMap::new(),
            received: Vec::new(),
            reply: Reply::Ack,
            max_read: 64,
            link_down: false,
            base64: false,
        }
    }

    /// Token of the most recent `https_get`.
    pub fn last_request(&self) -> u16 {
        self.received
            .iter()
            .rev()
            .find(|r| r.op == Op::HttpsGet)
            .map(|r| r.token)
            .expect("no https_get received")
    }

    pub fn cancelled(&self) -> Vec<u16> {
        self.received
            .iter()
            .filter(|r| r.op == Op::Cancel)
            .map(|r| r.token)
            .collect()
    }

    /// Sequence number for the next `kind` frame on `token`.
    fn next_seq(&mut self, kind: Kind, token: u16) -> u16 {
        let sent = self.data_sent.entry(token).or_insert(0);
        match kind {
            Kind::Data => {
                *sent += 1;
                *sent - 1
            }
            Kind::Done => *sent,
            _ => 0,
        }
    }

    fn encode(&mut self, kind: Kind, token: u16, payload: &[u8]) -> Vec<u8> {
        let seq = self.next_seq(kind, token);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = frame::encode(kind, token, seq, payload, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    pub fn send(&mut self, kind: Kind, token: u16, payload: &[u8]) {
        let bytes = self.encode(kind, token, payload);
        self.outbound.extend(bytes);
    }

    pub fn send_data(&mut self, token: u16, chunk: &[u8]) {
        if self.base64 {
            use base64ct::{Base64, Encoding};
            let mut encoded = [0u8; MAX_PAYLOAD];
            let text = Base64::encode(chunk, &mut encoded).unwrap();
            let len = text.len();
            self.send(Kind::Data, token, &encoded[..len]);
        } else {
            self.send(Kind::Data, token, chunk);
        }
    }

    pub fn send_done(&mut self, token: u16) {
        self.send(Kind::Done, token, &[]);
    }

    pub fn send_fail(&mut self, token: u16, reason: RemoteError) {
        self.send(Kind::Fail, token, &reason.to_payload());
    }

    /// Bytes that are not part of any frame (boot messages, line noise).
    pub fn send_noise(&mut self, bytes: &[u8]) {
        self.outbound.extend(bytes);
    }

    /// A data frame damaged on the way, after its checksum was computed.
    pub fn send_corrupted(&mut self, token: u16, chunk: &[u8]) {
        let mut bytes = self.encode(Kind::Data, token, chunk);
        if let Some(last) = bytes.last_mut() {
            *last ^= 0x01;
        }
        self.outbound.extend(bytes);
    }

    pub fn pending_bytes(&self) -> usize {
        self.outbound.len()
    }

    fn on_frame(&mut self, token: u16, payload: &[u8]) {
        let command = Command::decode(payload).expect("malformed command body");
        self.received.push(Received {
            token,
            op: command.op,
            url: command.url.map(str::to_owned),
        });
        if command.op != Op::HttpsGet {
            return;
        }
        match self.reply {
            Reply::Ack => self.send(Kind::Ack, token, &[]),
            Reply::Nak(reason) => self.send(Kind::Nak, token, &reason.to_payload()),
            Reply::Silent => {}
        }
    }
}

impl Read for FakeCoprocessor {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.link_down {
            return Err(Error::ReadError);
        }
        let n = buf.len().min(self.max_read).min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeCoprocessor {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.link_down {
            return Err(Error::WriteError);
        }
        for &byte in buf {
            if let Some(frame) = self.decoder.push(byte) {
                assert_eq!(frame.kind, Kind::Command);
                self.on_frame(frame.token, &frame.payload);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Channel for FakeCoprocessor {}
