//! Channel-backed [`Dispatch`] implementation.

use super::frame::{self, Decoder, Frame, Kind, MAX_FRAME_LEN, MAX_PAYLOAD};
use super::{
    Command, Config, Dispatch, Encoding, MAILBOX_DEPTH, MAX_LIVE_TOKENS, Poll, RemoteError, Token,
};
use crate::channel::{self, Channel, error::Error};
use base64ct::{Base64, Encoding as _};
use heapless::{Deque, Vec};

/// Bytes pulled from the channel per read.
const RX_CHUNK: usize = 64;

/// Retired tokens held back from reuse, so frames the co-processor sent
/// before it saw the cancel cannot land in a new request.
const QUARANTINE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    token: Token,
    /// The mailbox overflowed while holding frames for this token; its
    /// stream has a gap and can only end in an error.
    overrun: bool,
    /// Sequence number the next data frame must carry.
    next_seq: u16,
}

impl Slot {
    fn new(token: Token) -> Self {
        Self {
            token,
            overrun: false,
            next_seq: 0,
        }
    }
}

/// Counters for frames that never reached a caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Frames that passed validation.
    pub frames_received: u32,
    /// Frames dropped by the decoder (bad checksum, length or kind).
    pub frames_rejected: u32,
    /// Valid frames addressed to retired or unknown tokens.
    pub frames_discarded: u32,
    /// Times the mailbox was full and a request had to be abandoned.
    pub mailbox_overruns: u32,
    /// Requests abandoned because a data frame went missing.
    pub sequence_gaps: u32,
}

/// Drives the task protocol over a [`Channel`].
///
/// Owns the decoder state and the mailbox of frames parked for tokens other
/// than the one currently being polled. Share it between wrappers through a
/// `RefCell` (see the [module docs](super)).
///
/// Tokens are allocated sequentially and wrap after `u16::MAX`. The last
/// few retired tokens are skipped on allocation; a request that outlives a
/// full wrap of the counter can still collide with a reused token.
#[derive(Debug)]
pub struct Dispatcher<C: Channel> {
    channel: C,
    config: Config,
    decoder: Decoder,
    rx_buf: [u8; RX_CHUNK],
    rx_pos: usize,
    rx_len: usize,
    next_token: u16,
    live: Vec<Slot, MAX_LIVE_TOKENS>,
    quarantine: Deque<u16, QUARANTINE_DEPTH>,
    mailbox: Vec<Frame, MAILBOX_DEPTH>,
    stats: Stats,
}

impl<C: Channel> Dispatcher<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, Config::default())
    }

    pub fn with_config(channel: C, config: Config) -> Self {
        Self {
            channel,
            config,
            decoder: Decoder::new(),
            rx_buf: [0; RX_CHUNK],
            rx_pos: 0,
            rx_len: 0,
            next_token: 0,
            live: Vec::new(),
            quarantine: Deque::new(),
            mailbox: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        Stats {
            frames_rejected: self.decoder.rejected(),
            ..self.stats
        }
    }

    /// Number of tokens submitted and not yet completed, failed or cancelled.
    pub fn live_requests(&self) -> usize {
        self.live.len()
    }

    /// Get the underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Get a mutable reference to the underlying channel
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    fn allocate_token(&mut self) -> Token {
        loop {
            self.next_token = self.next_token.wrapping_add(1);
            let Some(token) = Token::new(self.next_token) else {
                continue;
            };
            let quarantined = self.quarantine.iter().any(|&raw| raw == token.get());
            if !quarantined && self.slot_index(token).is_none() {
                return token;
            }
        }
    }

    fn slot_index(&self, token: Token) -> Option<usize> {
        self.live.iter().position(|slot| slot.token == token)
    }

    fn retire(&mut self, token: Token) {
        if let Some(index) = self.slot_index(token) {
            self.live.swap_remove(index);
            if !self.quarantine.iter().any(|&raw| raw == token.get()) {
                if self.quarantine.is_full() {
                    self.quarantine.pop_front();
                }
                let _ = self.quarantine.push_back(token.get());
            }
        }
        while let Some(index) = self.mailbox.iter().position(|f| f.token == token.get()) {
            self.mailbox.remove(index);
            self.stats.frames_discarded += 1;
        }
    }

    fn send(&mut self, kind: Kind, token: Token, payload: &[u8]) -> Result<(), Error> {
        let mut out = [0u8; MAX_FRAME_LEN];
        let len = frame::encode(kind, token.get(), 0, payload, &mut out)?;
        channel::write_all(&mut self.channel, &out[..len])
    }

    fn send_cancel(&mut self, token: Token) -> Result<(), Error> {
        let mut body = [0u8; 32];
        let len = Command::cancel().encode(&mut body)?;
        self.send(Kind::Command, token, &body[..len])
    }

    /// Next valid frame, spending at most `budget` channel reads on it.
    fn receive(&mut self, budget: &mut u32) -> Result<Option<Frame>, Error> {
        loop {
            while self.rx_pos < self.rx_len {
                let byte = self.rx_buf[self.rx_pos];
                self.rx_pos += 1;
                if let Some(frame) = self.decoder.push(byte) {
                    self.stats.frames_received += 1;
                    return Ok(Some(frame));
                }
            }

            if *budget == 0 {
                return Ok(None);
            }
            *budget -= 1;

            let n = self
                .channel
                .read(&mut self.rx_buf)
                .map_err(|_| Error::ReadError)?;
            self.rx_pos = 0;
            self.rx_len = n.min(RX_CHUNK);
        }
    }

    /// Hold a frame until its token is polled, or drop it if nobody owns it.
    fn park(&mut self, frame: Frame) {
        let index = Token::new(frame.token).and_then(|token| self.slot_index(token));
        let Some(index) = index else {
            trace!("discarding frame for stale token {}", frame.token);
            self.stats.frames_discarded += 1;
            return;
        };

        let slot = self.live[index];
        if slot.overrun || matches!(frame.kind, Kind::Ack | Kind::Command) {
            self.stats.frames_discarded += 1;
            return;
        }

        if self.mailbox.push(frame).is_err() {
            warn!("mailbox full, abandoning token {}", slot.token.get());
            self.stats.mailbox_overruns += 1;
            self.stats.frames_discarded += 1;
            let token = slot.token;
            self.retire(token);
            // Keep the slot so the owner learns about the gap on its next poll.
            let _ = self.live.push(Slot {
                overrun: true,
                ..Slot::new(token)
            });
            if let Err(e) = self.send_cancel(token) {
                warn!("cancel after overrun failed: {:?}", e);
            }
        }
    }

    fn take_parked(&mut self, token: Token) -> Option<Frame> {
        let index = self.mailbox.iter().position(|f| f.token == token.get())?;
        Some(self.mailbox.remove(index))
    }

    fn await_ack(&mut self, token: Token) -> Result<(), Error> {
        let mut budget = self.config.ack_attempts;
        while let Some(frame) = self.receive(&mut budget)? {
            if frame.token != token.get() {
                self.park(frame);
                continue;
            }
            match frame.kind {
                Kind::Ack => return Ok(()),
                Kind::Nak => {
                    let reason = RemoteError::from_payload(&frame.payload);
                    warn!("token {} rejected: {:?}", token.get(), reason);
                    return Err(Error::Rejected);
                }
                // The ack went missing but the remote side is already working.
                Kind::Data | Kind::Done | Kind::Fail => {
                    self.park(frame);
                    return Ok(());
                }
                Kind::Command => self.stats.frames_discarded += 1,
            }
        }
        warn!("no acknowledgement for token {}", token.get());
        Err(Error::Timeout)
    }

    /// Check that no data frame went missing before `frame`.
    ///
    /// On a gap the request is retired and cancelled; its stream can no
    /// longer add up to the remote response.
    fn check_sequence(&mut self, token: Token, frame: &Frame) -> Result<(), Error> {
        let index = self.slot_index(token).ok_or(Error::UnknownToken)?;
        let expected = self.live[index].next_seq;
        if frame.seq != expected {
            warn!(
                "token {}: expected data frame {}, got {}",
                token.get(),
                expected,
                frame.seq
            );
            self.stats.sequence_gaps += 1;
            self.retire(token);
            if let Err(e) = self.send_cancel(token) {
                warn!("cancel after sequence gap failed: {:?}", e);
            }
            return Err(Error::ProtocolError);
        }
        if frame.kind == Kind::Data {
            self.live[index].next_seq = expected.wrapping_add(1);
        }
        Ok(())
    }

    fn interpret(&mut self, token: Token, frame: Frame, buf: &mut [u8]) -> Result<Option<Poll>, Error> {
        if matches!(frame.kind, Kind::Data | Kind::Done) {
            self.check_sequence(token, &frame)?;
        }
        match frame.kind {
            Kind::Data if frame.payload.is_empty() => Ok(None),
            Kind::Data => decode_data(self.config.encoding, &frame.payload, buf)
                .map(|len| Some(Poll::Data(len))),
            Kind::Done => {
                debug!("token {} complete", token.get());
                self.retire(token);
                Ok(Some(Poll::Complete))
            }
            Kind::Fail | Kind::Nak => {
                let reason = RemoteError::from_payload(&frame.payload);
                debug!("token {} failed: {:?}", token.get(), reason);
                self.retire(token);
                Ok(Some(Poll::Failed(reason)))
            }
            Kind::Ack | Kind::Command => {
                self.stats.frames_discarded += 1;
                Ok(None)
            }
        }
    }
}

fn decode_data(encoding: Encoding, payload: &[u8], buf: &mut [u8]) -> Result<usize, Error> {
    match encoding {
        Encoding::Raw => {
            let dst = buf
                .get_mut(..payload.len())
                .ok_or(Error::BufferOverflow)?;
            dst.copy_from_slice(payload);
            Ok(payload.len())
        }
        Encoding::Base64 => Base64::decode(payload, buf)
            .map(|decoded| decoded.len())
            .map_err(|_| Error::ProtocolError),
    }
}

impl<C: Channel> Dispatch for Dispatcher<C> {
    fn submit(&mut self, command: &Command<'_>) -> Result<Token, Error> {
        if self.live.is_full() {
            return Err(Error::TooManyRequests);
        }

        let mut body = [0u8; MAX_PAYLOAD];
        let len = command.encode(&mut body)?;
        let token = self.allocate_token();
        self.live
            .push(Slot::new(token))
            .map_err(|_| Error::TooManyRequests)?;

        if let Err(e) = self.send(Kind::Command, token, &body[..len]) {
            warn!("command for token {} not sent: {:?}", token.get(), e);
            self.retire(token);
            return Err(e);
        }
        trace!("command sent, waiting for ack on token {}", token.get());

        match self.await_ack(token) {
            Ok(()) => {
                debug!("token {} acknowledged", token.get());
                Ok(token)
            }
            Err(e) => {
                self.retire(token);
                if e == Error::Timeout {
                    // The command may still be sitting in the remote queue.
                    if let Err(e) = self.send_cancel(token) {
                        warn!("cancel after ack timeout failed: {:?}", e);
                    }
                }
                Err(e)
            }
        }
    }

    fn poll(&mut self, token: Token, buf: &mut [u8]) -> Result<Poll, Error> {
        let index = self.slot_index(token).ok_or(Error::UnknownToken)?;
        if self.live[index].overrun {
            self.retire(token);
            return Err(Error::BufferOverflow);
        }

        let mut budget = self.config.read_attempts;
        loop {
            let frame = match self.take_parked(token) {
                Some(frame) => frame,
                None => match self.receive(&mut budget)? {
                    None => return Ok(Poll::Pending),
                    Some(frame) if frame.token == token.get() => frame,
                    Some(frame) => {
                        self.park(frame);
                        continue;
                    }
                },
            };
            if let Some(poll) = self.interpret(token, frame, buf)? {
                return Ok(poll);
            }
        }
    }

    fn cancel(&mut self, token: Token) -> Result<(), Error> {
        let live = self
            .slot_index(token)
            .is_some_and(|index| !self.live[index].overrun);
        self.retire(token);
        if !live {
            // Finished, or already cancelled by the dispatcher itself.
            return Ok(());
        }
        debug!("cancelling token {}", token.get());
        self.send_cancel(token)
    }
}
