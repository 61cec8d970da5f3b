//! Session management
//!
//! Handles the connection handshake and the commands that require an
//! established session.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    Channel, Command, Exchanger, FrameReader, HandshakeSignal, ProtocolError, Reply,
    DEFAULT_REPEAT_DELAY_MS, DEFAULT_REPLY_TIMEOUT_MS, DEVICE_IDENTITY_PREFIX,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Handshake completed, commands accepted
    Connected,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time allowed for each reply
    pub reply_timeout: Duration,
    /// Delay before each handshake probe
    pub repeat_delay: Duration,
    /// Sleep between polls of an idle channel
    pub poll_interval: Duration,
    /// Give up the handshake after this long. `None` keeps probing until cancelled.
    pub connect_timeout: Option<Duration>,
    /// Reject reply frames whose checksum does not match
    pub verify_checksums: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS),
            repeat_delay: Duration::from_millis(DEFAULT_REPEAT_DELAY_MS),
            poll_interval: Duration::from_millis(1),
            connect_timeout: None,
            verify_checksums: true,
        }
    }
}

/// Cloneable handle that aborts a running handshake
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unfired token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Steps of the connection handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// About to wait `repeat_delay` and send a NAK probe
    Probing {
        /// Probes sent so far
        attempt: u32,
    },
    /// Probe sent, looking for the terminal's identity frame
    Awaiting {
        /// Probes sent so far
        attempt: u32,
    },
    /// Identity received
    Done(String),
}

/// A conversation with one terminal over an exclusively owned channel
pub struct Session<C: Channel> {
    exchanger: Exchanger<C>,
    config: SessionConfig,
    state: ConnectionState,
    connection_string: Option<String>,
    cancel: CancelToken,
}

impl<C: Channel> Session<C> {
    /// Create a new session (not yet connected)
    pub fn new(channel: C, config: SessionConfig) -> Self {
        let reader = FrameReader::new(config.reply_timeout, config.poll_interval);
        Self {
            exchanger: Exchanger::new(channel, reader, config.verify_checksums),
            config,
            state: ConnectionState::Disconnected,
            connection_string: None,
            cancel: CancelToken::new(),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the handshake has completed
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Identity string reported by the terminal (if connected)
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that cancels a running or future [`connect`](Self::connect)
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Bytes written and frames received so far
    pub fn counters(&self) -> (u64, u64) {
        self.exchanger.counters()
    }

    /// Borrow the channel
    pub fn channel(&self) -> &C {
        self.exchanger.channel()
    }

    /// Mutably borrow the channel
    pub fn channel_mut(&mut self) -> &mut C {
        self.exchanger.channel_mut()
    }

    /// Release the channel
    pub fn into_channel(self) -> C {
        self.exchanger.into_channel()
    }

    /// Probe the terminal until it answers with its identity
    ///
    /// Runs until the terminal answers, the configured `connect_timeout`
    /// elapses ([`ProtocolError::Timeout`]) or the cancel token fires
    /// ([`ProtocolError::Cancelled`]). A reply that is not a `VFI` identity
    /// frame, or whose checksum does not verify, aborts with
    /// [`ProtocolError::ProtocolViolation`].
    pub fn connect(&mut self) -> Result<String, ProtocolError> {
        if self.is_connected() {
            warn!("already connected, can't connect");
            return Err(ProtocolError::AlreadyConnected);
        }

        self.state = ConnectionState::Connecting;
        let started = Instant::now();
        let mut handshake = HandshakeState::Probing { attempt: 0 };

        loop {
            if self.cancel.is_cancelled() {
                self.cancel.clear();
                self.state = ConnectionState::Disconnected;
                return Err(ProtocolError::Cancelled);
            }
            if let Some(limit) = self.config.connect_timeout {
                if started.elapsed() >= limit {
                    self.state = ConnectionState::Disconnected;
                    return Err(ProtocolError::Timeout);
                }
            }

            handshake = match self.advance(handshake) {
                Ok(HandshakeState::Done(identity)) => return self.complete(identity),
                Ok(next) => next,
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(e);
                }
            };
        }
    }

    /// Run one step of the handshake
    fn advance(&mut self, state: HandshakeState) -> Result<HandshakeState, ProtocolError> {
        match state {
            HandshakeState::Probing { attempt } => {
                thread::sleep(self.config.repeat_delay);
                self.exchanger.write_signal(HandshakeSignal::Nak)?;
                Ok(HandshakeState::Awaiting {
                    attempt: attempt + 1,
                })
            }
            HandshakeState::Awaiting { attempt } => {
                if !self.exchanger.has_input()? {
                    return Ok(HandshakeState::Probing { attempt });
                }
                match self.exchanger.read_reply() {
                    Ok(reply) => identity_from_reply(&reply).map(HandshakeState::Done),
                    Err(ProtocolError::ChecksumMismatch { expected, actual }) => {
                        Err(ProtocolError::ProtocolViolation(format!(
                            "corrupt connection response: checksum {:#06x}, expected {:#06x}",
                            actual, expected
                        )))
                    }
                    Err(e) if e.is_recoverable() => {
                        debug!("handshake attempt {} got no identity: {}", attempt, e);
                        Ok(HandshakeState::Probing { attempt })
                    }
                    Err(e) => Err(e),
                }
            }
            done @ HandshakeState::Done(_) => Ok(done),
        }
    }

    fn complete(&mut self, identity: String) -> Result<String, ProtocolError> {
        if let Err(e) = self.exchanger.write_signal(HandshakeSignal::Ack) {
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }
        info!("connected: {}", identity);
        self.state = ConnectionState::Connected;
        self.connection_string = Some(identity.clone());
        Ok(identity)
    }

    /// Show text on the terminal display
    ///
    /// The terminal only accepts a message whose first byte is `-`, CR, FF or
    /// BS; the caller supplies that prefix.
    pub fn message(&mut self, text: impl AsRef<[u8]>) -> Result<Reply, ProtocolError> {
        self.send(&Command::Message(text.as_ref().to_vec()))
    }

    /// Set a terminal configuration variable
    pub fn set_config_var(&mut self, name: &str, value: &str) -> Result<Reply, ProtocolError> {
        self.require_connected("set config var")?;
        info!("setting config var: {}={}", name, value);
        let command = Command::set_config_var(name, value)?;
        self.exchanger.send_command(&command)
    }

    /// Leave download mode
    ///
    /// The session is disconnected whatever the terminal answers.
    pub fn stop(&mut self) -> Result<(), ProtocolError> {
        self.require_connected("stop")?;

        let result = self.exchanger.send_command(&Command::Stop);
        self.state = ConnectionState::Disconnected;
        self.connection_string = None;

        if let Err(e) = result {
            warn!("no valid reply to stop: {}", e);
        }
        info!("disconnected");
        Ok(())
    }

    /// Send any command that needs an established session
    pub(crate) fn send(&mut self, command: &Command) -> Result<Reply, ProtocolError> {
        self.require_connected(command.label())?;
        self.exchanger.send_command(command)
    }

    fn require_connected(&self, operation: &str) -> Result<(), ProtocolError> {
        if self.is_connected() {
            Ok(())
        } else {
            info!("can't {}, connect first", operation);
            Err(ProtocolError::NotConnected)
        }
    }
}

/// Extract the identity string from a handshake reply
///
/// The identity is the whole frame payload, `VFI` prefix included, and must
/// be ASCII.
fn identity_from_reply(reply: &Reply) -> Result<String, ProtocolError> {
    match reply {
        Reply::Frame(frame) if frame.payload().starts_with(DEVICE_IDENTITY_PREFIX) => {
            let payload = frame.payload();
            if !payload.is_ascii() {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "non-ASCII identity: {:02x?}",
                    payload
                )));
            }
            Ok(payload.iter().map(|&b| char::from(b)).collect())
        }
        Reply::Frame(frame) => Err(ProtocolError::ProtocolViolation(format!(
            "invalid connection response: {:02x?}",
            frame.as_bytes()
        ))),
        Reply::Signal(signal) => Err(ProtocolError::ProtocolViolation(format!(
            "invalid connection response: bare {:?}",
            signal
        ))),
    }
}
