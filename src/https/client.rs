use super::MAX_URL_LEN;
use crate::channel::error::Error;
use crate::task::frame::MAX_PAYLOAD;
use crate::task::{Command, Dispatch, Poll, RemoteError, Token};
use core::fmt;
use core::ops::ControlFlow;
use heapless::String;

/// What [`HttpsClient::connect`] does while a request is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectPolicy {
    /// Cancel the open request, then start the new one.
    #[default]
    Replace,
    /// Refuse with [`Error::Busy`] until the open request ends.
    Reject,
}

/// Wrapper tuning.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Most dispatcher polls one `get_handle`/`drain` call may perform.
    pub polls_per_drain: u32,
    /// Consecutive empty polls after which the request is abandoned with
    /// [`Failure::Timeout`]. `None` waits forever.
    pub stall_limit: Option<u32>,
    pub connect_policy: ConnectPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polls_per_drain: 16,
            stall_limit: Some(5_000),
            connect_policy: ConnectPolicy::Replace,
        }
    }
}

/// Why a request ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The channel failed; the co-processor may never have seen the request.
    Dispatch(Error),
    /// The co-processor reported the failure.
    Remote(RemoteError),
    /// The co-processor went quiet for longer than the stall limit.
    Timeout,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Dispatch(e) => write!(f, "dispatch failed: {}", e),
            Failure::Remote(e) => write!(f, "remote failure: {}", e),
            Failure::Timeout => f.write_str("co-processor stopped responding"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Failure {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Failure::Dispatch(e) => defmt::write!(f, "Dispatch({})", e),
            Failure::Remote(e) => defmt::write!(f, "Remote({})", e),
            Failure::Timeout => defmt::write!(f, "Timeout"),
        }
    }
}

/// Where the wrapper's current or most recent request stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No request has been made yet.
    Idle,
    /// Submitted and acknowledged, no data seen yet.
    Pending,
    /// At least one chunk has been delivered.
    Streaming,
    /// The whole response was delivered.
    Complete,
    Failed(Failure),
    /// Ended by [`HttpsClient::stop`].
    Cancelled,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Status::Idle => defmt::write!(f, "Idle"),
            Status::Pending => defmt::write!(f, "Pending"),
            Status::Streaming => defmt::write!(f, "Streaming"),
            Status::Complete => defmt::write!(f, "Complete"),
            Status::Failed(failure) => defmt::write!(f, "Failed({})", failure),
            Status::Cancelled => defmt::write!(f, "Cancelled"),
        }
    }
}

/// One step of the response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery<'a> {
    /// Response bytes, valid only for the duration of the callback.
    Data(&'a [u8]),
    Complete,
    Failed(Failure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Dispatched(Token),
    Streaming(Token),
    /// `connect` failed to dispatch; the next drain reports it once.
    Faulted(Failure),
}

/// Client handle for one HTTPS request at a time.
///
/// The application owns the handle and drives it from its main loop:
/// [`connect`](Self::connect) once, then [`get_handle`](Self::get_handle) (or
/// [`drain`](Self::drain)) every iteration until [`status`](Self::status)
/// leaves `Pending`/`Streaming`. The handle can be reused for any number of
/// requests.
#[derive(Debug)]
pub struct HttpsClient<D: Dispatch> {
    dispatcher: D,
    config: Config,
    url: String<MAX_URL_LEN>,
    state: State,
    status: Status,
    read_ok: bool,
    empty_polls: u32,
}

impl<D: Dispatch> HttpsClient<D> {
    pub fn new(dispatcher: D) -> Self {
        Self::with_config(dispatcher, Config::default())
    }

    pub fn with_config(dispatcher: D, config: Config) -> Self {
        Self {
            dispatcher,
            config,
            url: String::new(),
            state: State::Idle,
            status: Status::Idle,
            read_ok: false,
            empty_polls: 0,
        }
    }

    /// Start an HTTPS GET on the co-processor.
    ///
    /// Returns once the command has been acknowledged; the page itself loads
    /// in the background. Malformed URLs are refused before anything is sent.
    /// A dispatch failure is returned here and also reported once, as a
    /// terminal delivery, by the next drain.
    pub fn connect(&mut self, url: &str) -> Result<(), Error> {
        validate_url(url)?;

        if self.is_active() {
            match self.config.connect_policy {
                ConnectPolicy::Reject => return Err(Error::Busy),
                ConnectPolicy::Replace => {
                    debug!("replacing open request");
                    self.stop();
                }
            }
        }

        self.url = String::try_from(url).map_err(|_| Error::UrlTooLong)?;
        self.read_ok = false;
        self.empty_polls = 0;

        match self.dispatcher.submit(&Command::https_get(url)) {
            Ok(token) => {
                debug!("https request dispatched as token {}", token.get());
                self.state = State::Dispatched(token);
                self.status = Status::Pending;
                Ok(())
            }
            Err(e) => {
                warn!("https request not dispatched: {:?}", e);
                let failure = Failure::Dispatch(e);
                self.state = State::Faulted(failure);
                self.status = Status::Failed(failure);
                Err(e)
            }
        }
    }

    /// Deliver whatever response data has arrived.
    ///
    /// `callback` runs once per chunk, in arrival order. When the request
    /// ends, successfully or not, it runs once more with an empty slice;
    /// check [`status`](Self::status) to tell the two apart. Without an open
    /// request nothing is invoked.
    pub fn get_handle<F>(&mut self, mut callback: F)
    where
        F: FnMut(&[u8]),
    {
        self.drain(|delivery| {
            match delivery {
                Delivery::Data(chunk) => callback(chunk),
                Delivery::Complete | Delivery::Failed(_) => callback(&[]),
            }
            ControlFlow::Continue(())
        });
    }

    /// Deliver whatever has arrived as [`Delivery`] values.
    ///
    /// Performs at most `polls_per_drain` polls and returns as soon as the
    /// co-processor has nothing new, so the caller's loop keeps running.
    /// Returning `ControlFlow::Break` from `f` stops the request on the spot.
    pub fn drain<F>(&mut self, mut f: F) -> Status
    where
        F: FnMut(Delivery<'_>) -> ControlFlow<()>,
    {
        if let State::Faulted(failure) = self.state {
            self.state = State::Idle;
            let _ = f(Delivery::Failed(failure));
            return self.status;
        }

        let mut buf = [0u8; MAX_PAYLOAD];
        for _ in 0..self.config.polls_per_drain {
            let Some(token) = self.token() else {
                break;
            };

            match self.dispatcher.poll(token, &mut buf) {
                Ok(Poll::Pending) => {
                    self.empty_polls = self.empty_polls.saturating_add(1);
                    if self
                        .config
                        .stall_limit
                        .is_some_and(|limit| self.empty_polls >= limit)
                    {
                        warn!("token {} stalled, abandoning", token.get());
                        self.abandon(token, Failure::Timeout, &mut f);
                    }
                    break;
                }
                Ok(Poll::Data(len)) => {
                    trace!("token {} delivered {} bytes", token.get(), len);
                    self.empty_polls = 0;
                    self.read_ok = true;
                    self.state = State::Streaming(token);
                    self.status = Status::Streaming;
                    if f(Delivery::Data(&buf[..len])).is_break() {
                        self.stop();
                        break;
                    }
                }
                Ok(Poll::Complete) => {
                    self.read_ok = true;
                    self.state = State::Idle;
                    self.status = Status::Complete;
                    let _ = f(Delivery::Complete);
                    break;
                }
                Ok(Poll::Failed(reason)) => {
                    self.finish(Failure::Remote(reason), &mut f);
                    break;
                }
                Err(e) => {
                    warn!("polling token {} failed: {:?}", token.get(), e);
                    self.abandon(token, Failure::Dispatch(e), &mut f);
                    break;
                }
            }
        }
        self.status
    }

    /// Cancel the open request.
    ///
    /// Safe to call at any time; without an open request it does nothing.
    /// No callback fires for the cancelled request afterwards, even if the
    /// co-processor keeps sending for a while.
    pub fn stop(&mut self) {
        match self.state {
            State::Idle => {}
            State::Faulted(_) => self.state = State::Idle,
            State::Dispatched(token) | State::Streaming(token) => {
                if let Err(e) = self.dispatcher.cancel(token) {
                    warn!("cancel for token {} not sent: {:?}", token.get(), e);
                }
                self.state = State::Idle;
                self.status = Status::Cancelled;
            }
        }
        self.read_ok = false;
        self.empty_polls = 0;
    }

    /// Current request status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether a result has been observed for the current request.
    pub fn read_ok(&self) -> bool {
        self.read_ok
    }

    /// Whether a request is dispatched or streaming.
    pub fn is_active(&self) -> bool {
        self.token().is_some()
    }

    /// URL of the current or most recent request.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the underlying dispatcher
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Get a mutable reference to the underlying dispatcher
    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    fn token(&self) -> Option<Token> {
        match self.state {
            State::Dispatched(token) | State::Streaming(token) => Some(token),
            State::Idle | State::Faulted(_) => None,
        }
    }

    /// Cancel on the remote side, then end the stream with `failure`.
    fn abandon<F>(&mut self, token: Token, failure: Failure, f: &mut F)
    where
        F: FnMut(Delivery<'_>) -> ControlFlow<()>,
    {
        // The token may already be retired, or the channel may be down.
        let _ = self.dispatcher.cancel(token);
        self.finish(failure, f);
    }

    fn finish<F>(&mut self, failure: Failure, f: &mut F)
    where
        F: FnMut(Delivery<'_>) -> ControlFlow<()>,
    {
        self.state = State::Idle;
        self.status = Status::Failed(failure);
        self.empty_polls = 0;
        let _ = f(Delivery::Failed(failure));
    }
}

/// Checks done before anything reaches the channel.
fn validate_url(url: &str) -> Result<(), Error> {
    if url.is_empty() {
        return Err(Error::InvalidUrl);
    }
    if url.len() > MAX_URL_LEN {
        return Err(Error::UrlTooLong);
    }

    const SCHEME: &str = "https://";
    let has_scheme = url
        .get(..SCHEME.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(SCHEME));
    if !has_scheme || url.len() == SCHEME.len() {
        return Err(Error::InvalidUrl);
    }

    // Command bodies are JSON and must not need escaping.
    if url
        .bytes()
        .any(|b| b.is_ascii_control() || b == b' ' || b == b'"' || b == b'\\')
    {
        return Err(Error::InvalidUrl);
    }
    Ok(())
}
