//! Frame encoding/decoding
//!
//! Frame format:
//! - 1 byte: STX (0x02)
//! - N bytes: Payload (opcode + arguments)
//! - 1 byte: ETX (0x03)
//! - 2 bytes: Command checksum of `payload + ETX` (big-endian)
//!
//! Outside of a frame the terminal may answer with a single ACK/NAK byte.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use super::{checksum::command_checksum, ProtocolError, ACK, ETX, NAK, STX};

/// Smallest well-formed frame: STX, ETX and two checksum bytes
pub(crate) const MIN_FRAME_LEN: usize = 4;

/// Single byte handshake signal exchanged outside of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeSignal {
    /// 0x06
    Ack,
    /// 0x05
    Nak,
}

impl HandshakeSignal {
    /// Interpret a byte received outside of a frame
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(HandshakeSignal::Ack),
            NAK => Some(HandshakeSignal::Nak),
            _ => None,
        }
    }

    /// Wire value of the signal
    pub fn byte(self) -> u8 {
        match self {
            HandshakeSignal::Ack => ACK,
            HandshakeSignal::Nak => NAK,
        }
    }
}

/// A frame exactly as it came off the wire, checksum not yet verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
}

impl RawFrame {
    /// Wrap reassembled bytes. The caller guarantees the framing shape.
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= MIN_FRAME_LEN);
        Self { bytes }
    }

    /// Complete frame including STX, ETX and checksum
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes between STX and ETX
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..self.bytes.len() - 3]
    }

    /// Checksum carried by the frame
    pub fn received_checksum(&self) -> u16 {
        BigEndian::read_u16(&self.bytes[self.bytes.len() - 2..])
    }

    /// Checksum recomputed over `payload + ETX`
    pub fn computed_checksum(&self) -> u16 {
        command_checksum(&self.bytes[1..self.bytes.len() - 2])
    }

    /// Check the received checksum against the recomputed one
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let expected = self.computed_checksum();
        let actual = self.received_checksum();
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }

    /// Consume into the raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Result of waiting for the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A bare ACK/NAK byte
    Signal(HandshakeSignal),
    /// A complete frame
    Frame(RawFrame),
}

impl Reply {
    /// Frame payload, if the reply is a frame
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Reply::Frame(frame) => Some(frame.payload()),
            Reply::Signal(_) => None,
        }
    }
}

/// A checksum-sealed protocol frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame payload (opcode and arguments)
    pub payload: Vec<u8>,
    /// Command checksum of `payload + ETX`
    pub checksum: u16,
}

impl Frame {
    /// Create a new frame with the given payload
    pub fn new(payload: Vec<u8>) -> Self {
        let checksum = seal(&payload);
        Self { payload, checksum }
    }

    /// Decode and verify a frame from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::ProtocolViolation(format!(
                "frame too short ({} bytes)",
                data.len()
            )));
        }

        let etx_pos = data.len() - 3;
        if data[0] != STX || data[etx_pos] != ETX {
            return Err(ProtocolError::ProtocolViolation(format!(
                "bad frame markers: {:02x?}",
                data
            )));
        }

        let payload = data[1..etx_pos].to_vec();
        let received = BigEndian::read_u16(&data[etx_pos + 1..]);
        let expected = seal(&payload);

        if received != expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected,
                actual: received,
            });
        }

        Ok(Self {
            payload,
            checksum: received,
        })
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.push(STX);
        bytes.extend_from_slice(&self.payload);
        bytes.push(ETX);

        let mut check = [0u8; 2];
        BigEndian::write_u16(&mut check, self.checksum);
        bytes.extend_from_slice(&check);

        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        self.payload.len() + MIN_FRAME_LEN
    }
}

/// Builder for command payloads
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    payload: Vec<u8>,
}

impl PayloadBuilder {
    /// Start a payload with its opcode
    pub fn command(opcode: u8) -> Self {
        Self {
            payload: vec![opcode],
        }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (big-endian)
    pub fn u16_be(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add a 32-bit value (big-endian)
    pub fn u32_be(mut self, value: u32) -> Self {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Finish the payload
    pub fn build(self) -> Vec<u8> {
        self.payload
    }
}

/// Command checksum of `payload + ETX`
fn seal(payload: &[u8]) -> u16 {
    let mut covered = Vec::with_capacity(payload.len() + 1);
    covered.extend_from_slice(payload);
    covered.push(ETX);
    command_checksum(&covered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let original = Frame::new(b"M-\x0chello".to_vec());
        let encoded = original.to_bytes();
        let decoded = Frame::from_bytes(&encoded).expect("Should decode successfully");

        assert_eq!(original.payload, decoded.payload);
        assert_eq!(original.checksum, decoded.checksum);
    }

    #[test]
    fn test_stop_frame_bytes() {
        let frame = Frame::new(vec![b'S']);
        assert_eq!(frame.to_bytes(), vec![STX, b'S', ETX, 0x6A, 0x0F]);
    }

    #[test]
    fn test_checksum_verification() {
        let mut encoded = Frame::new(vec![1, 2, 3, 4, 5]).to_bytes();

        // Corrupt a payload byte
        encoded[3] ^= 0xFF;

        assert!(matches!(
            Frame::from_bytes(&encoded),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_markers() {
        assert!(matches!(
            Frame::from_bytes(&[STX, b'S', 0x04, 0x00, 0x00]),
            Err(ProtocolError::ProtocolViolation(_))
        ));
        assert!(matches!(
            Frame::from_bytes(&[STX, ETX]),
            Err(ProtocolError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_raw_frame_accessors() {
        let raw = RawFrame::new(Frame::new(b"VFI-123".to_vec()).to_bytes());
        assert_eq!(raw.payload(), b"VFI-123");
        assert_eq!(raw.received_checksum(), raw.computed_checksum());
        assert!(raw.verify().is_ok());

        let mut bytes = raw.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(RawFrame::new(bytes).verify().is_err());
    }

    #[test]
    fn test_payload_builder() {
        let payload = PayloadBuilder::command(b'W')
            .u16_be(1000)
            .u32_be(2000)
            .bytes(&[0xAA])
            .build();

        assert_eq!(payload, vec![b'W', 0x03, 0xE8, 0x00, 0x00, 0x07, 0xD0, 0xAA]);
    }

    #[test]
    fn test_signal_bytes() {
        assert_eq!(HandshakeSignal::from_byte(0x06), Some(HandshakeSignal::Ack));
        assert_eq!(HandshakeSignal::from_byte(0x05), Some(HandshakeSignal::Nak));
        assert_eq!(HandshakeSignal::from_byte(STX), None);
        assert_eq!(HandshakeSignal::Ack.byte(), ACK);
    }
}
