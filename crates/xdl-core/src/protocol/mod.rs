//! Serial Protocol Communication
//!
//! Implements the download protocol spoken by VFI terminals in download mode.
//!
//! Frames are `STX | payload | ETX | checksum`, sealed with a 16-bit folding
//! checksum. Chunk writes are the exception and carry a CRC-16/BUYPASS instead.

pub mod channel;
pub mod checksum;
pub mod commands;
mod error;
mod exchange;
mod frame;
pub mod reader;
pub mod serial;
mod session;

pub use channel::{Channel, SerialChannel};
pub use checksum::{command_checksum, crc16_buypass};
pub use commands::{Command, FileKind};
pub use error::ProtocolError;
pub use exchange::Exchanger;
pub use frame::{Frame, HandshakeSignal, RawFrame, Reply};
pub use reader::{FrameAssembler, FrameReader};
pub use serial::{list_ports, open_port, PortInfo};
pub use session::{CancelToken, ConnectionState, HandshakeState, Session, SessionConfig};

/// Start of a frame
pub const STX: u8 = 0x02;

/// Checksum marker, the last byte covered by the command checksum
pub const ETX: u8 = 0x03;

/// Handshake acknowledgement
pub const ACK: u8 = 0x06;

/// Handshake negative reply, also sent by the host as its "are you there" probe
pub const NAK: u8 = 0x05;

/// Separator between config variable name and value
pub const FIELD_SEPARATOR: u8 = 0x1c;

/// Identity prefix of the terminal's handshake reply
pub const DEVICE_IDENTITY_PREFIX: &[u8] = b"VFI";

/// Default baud rate for the download port
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default serial device
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Default time to wait for one reply in milliseconds
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 200;

/// Default delay between handshake probes in milliseconds
pub const DEFAULT_REPEAT_DELAY_MS: u64 = 50;

/// Largest chunk carried by a single write command
pub const MAX_CHUNK_SIZE: usize = 1000;
