//! Command/response exchange
//!
//! Strictly half duplex: one command is written, then exactly one reply is
//! awaited before anything else may use the channel.

use std::io::Write;
use tracing::{debug, warn};

use super::{Channel, Command, Frame, FrameReader, HandshakeSignal, ProtocolError, Reply, STX};

/// Owns the channel and pairs every command with its reply
pub struct Exchanger<C: Channel> {
    channel: C,
    reader: FrameReader,
    verify_checksums: bool,
    tx_bytes: u64,
    rx_frames: u64,
}

impl<C: Channel> Exchanger<C> {
    /// Create an exchanger over `channel`
    pub fn new(channel: C, reader: FrameReader, verify_checksums: bool) -> Self {
        Self {
            channel,
            reader,
            verify_checksums,
            tx_bytes: 0,
            rx_frames: 0,
        }
    }

    /// Write a command and wait for its reply
    pub fn send_command(&mut self, command: &Command) -> Result<Reply, ProtocolError> {
        let wire = command.to_wire();
        debug!(
            "sending {} ({} bytes): {:02x?}",
            command.label(),
            wire.len(),
            &wire[..wire.len().min(32)]
        );
        self.write(&wire)?;
        self.read_reply()
    }

    /// Write `STX + payload`, sealed with ETX and the command checksum when
    /// `include_checksum` is set, and wait for the reply
    pub fn send_raw(
        &mut self,
        payload: &[u8],
        include_checksum: bool,
    ) -> Result<Reply, ProtocolError> {
        let wire = if include_checksum {
            Frame::new(payload.to_vec()).to_bytes()
        } else {
            let mut bytes = Vec::with_capacity(payload.len() + 1);
            bytes.push(STX);
            bytes.extend_from_slice(payload);
            bytes
        };
        debug!("sending raw frame ({} bytes)", wire.len());
        self.write(&wire)?;
        self.read_reply()
    }

    /// Write a bare handshake byte, no reply expected
    pub fn write_signal(&mut self, signal: HandshakeSignal) -> Result<(), ProtocolError> {
        self.write(&[signal.byte()])
    }

    /// Wait for one reply, verifying frame checksums when enabled
    pub fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        let reply = self.reader.read_reply(&mut self.channel)?;
        if let Reply::Frame(frame) = &reply {
            self.rx_frames = self.rx_frames.saturating_add(1);
            if self.verify_checksums {
                if let Err(e) = frame.verify() {
                    warn!("rejecting reply frame: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(reply)
    }

    /// Whether input is waiting on the channel
    pub fn has_input(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.channel.bytes_available()? > 0)
    }

    /// Bytes written and frames received so far
    pub fn counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_frames)
    }

    /// Borrow the channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutably borrow the channel
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Release the channel
    pub fn into_channel(self) -> C {
        self.channel
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.channel.write_all(bytes)?;
        self.channel.flush()?;
        self.tx_bytes = self.tx_bytes.saturating_add(bytes.len() as u64);
        Ok(())
    }
}
