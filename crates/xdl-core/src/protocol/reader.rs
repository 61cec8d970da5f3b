//! Frame reassembly
//!
//! The terminal's replies carry no length field: a frame is only known to be
//! complete once ETX and the two checksum bytes have arrived. Reading is a
//! polling loop over a non-blocking channel, bounded by a timeout.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{
    frame::{RawFrame, MIN_FRAME_LEN},
    Channel, HandshakeSignal, ProtocolError, Reply, ETX, STX,
};

/// Byte-at-a-time frame reassembler
///
/// Outside a frame, ACK/NAK bytes are returned as signals, STX opens a frame
/// and everything else is dropped. Once inside a frame every byte is kept
/// until `ETX` is followed by exactly two checksum bytes.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    in_frame: bool,
}

impl FrameAssembler {
    /// Create an idle assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, returning a reply once one is complete
    pub fn push(&mut self, byte: u8) -> Option<Reply> {
        if !self.in_frame {
            if let Some(signal) = HandshakeSignal::from_byte(byte) {
                return Some(Reply::Signal(signal));
            }
            if byte == STX {
                self.in_frame = true;
                self.buffer.push(byte);
            }
            return None;
        }

        self.buffer.push(byte);
        let len = self.buffer.len();
        if len >= MIN_FRAME_LEN && self.buffer[len - 3] == ETX {
            self.in_frame = false;
            let bytes = std::mem::take(&mut self.buffer);
            return Some(Reply::Frame(RawFrame::new(bytes)));
        }
        None
    }

    /// Whether a frame has been opened but not completed
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Bytes of the frame in progress
    pub fn partial(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
    }
}

/// Timeout-bounded reader producing one [`Reply`] per call
#[derive(Debug, Clone, Copy)]
pub struct FrameReader {
    timeout: Duration,
    poll_interval: Duration,
}

impl FrameReader {
    /// Create a reader
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Time allowed for one reply
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for a handshake signal or a complete frame
    ///
    /// Bytes are pulled one at a time so nothing after the end of the reply
    /// is consumed.
    pub fn read_reply<C: Channel + ?Sized>(&self, channel: &mut C) -> Result<Reply, ProtocolError> {
        let start = Instant::now();
        let mut assembler = FrameAssembler::new();
        let mut byte = [0u8; 1];

        while start.elapsed() < self.timeout {
            if channel.read_available(&mut byte)? == 0 {
                if !self.poll_interval.is_zero() {
                    thread::sleep(self.poll_interval);
                }
                continue;
            }

            if let Some(reply) = assembler.push(byte[0]) {
                match &reply {
                    Reply::Signal(signal) => trace!("received {:?}", signal),
                    Reply::Frame(frame) => {
                        debug!("received frame: {:02x?}", frame.as_bytes())
                    }
                }
                return Ok(reply);
            }
        }

        debug!(
            "no reply within {}ms ({} bytes of partial frame)",
            self.timeout.as_millis(),
            assembler.partial().len()
        );
        Err(ProtocolError::Timeout)
    }
}
