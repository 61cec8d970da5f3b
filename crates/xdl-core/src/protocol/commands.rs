//! Protocol commands
//!
//! Defines the commands understood by the terminal in download mode.

use byteorder::{BigEndian, ByteOrder};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{
    checksum::crc16_buypass,
    frame::{Frame, PayloadBuilder},
    ProtocolError, FIELD_SEPARATOR, MAX_CHUNK_SIZE, STX,
};

/// Fixed field following the file type byte of an open command.
/// Copied from captured traffic; its meaning is unknown.
pub const OPEN_FILE_RESERVED: &[u8; 16] = b"000000C300000000";

/// Fixed field following the timestamp of an open command.
/// Copied from captured traffic; its meaning is unknown.
pub const OPEN_FILE_PADDING: &[u8; 8] = b"XXXXXXXX";

/// `YYYYMMDDHHmmss` layout of the open command timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// How the terminal should store an uploaded file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Executable code
    #[default]
    Code,
    /// Data file
    Data,
}

impl FileKind {
    /// Type byte sent in the open command
    pub fn byte(self) -> u8 {
        match self {
            FileKind::Code => b'C',
            FileKind::Data => b'D',
        }
    }
}

/// Protocol commands for terminal communication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write to the terminal display ('M' command)
    Message(Vec<u8>),

    /// Set a configuration variable ('L' command)
    SetConfigVar {
        /// Variable name
        name: String,
        /// New value
        value: String,
    },

    /// Announce a file upload ('O' command)
    OpenFile {
        /// Code or data
        kind: FileKind,
        /// Timestamp recorded on the terminal
        timestamp: NaiveDateTime,
        /// Base name of the file
        name: String,
    },

    /// Write one chunk of the announced file ('W' command)
    WriteChunk {
        /// Bytes of the file already sent before this chunk
        offset: u32,
        /// Chunk contents
        data: Vec<u8>,
    },

    /// End of the announced file ('C' command)
    CloseFile,

    /// Leave download mode ('S' command)
    Stop,
}

impl Command {
    /// Build a config variable command, checking that both parts fit the wire format
    pub fn set_config_var(name: &str, value: &str) -> Result<Self, ProtocolError> {
        require_ascii("config variable name", name)?;
        require_ascii("config variable value", value)?;
        if name.as_bytes().contains(&FIELD_SEPARATOR) {
            return Err(ProtocolError::InvalidArgument(format!(
                "config variable name {:?} contains the field separator",
                name
            )));
        }
        Ok(Command::SetConfigVar {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Build a file announcement
    pub fn open_file(
        kind: FileKind,
        timestamp: NaiveDateTime,
        name: &str,
    ) -> Result<Self, ProtocolError> {
        require_ascii("file name", name)?;
        if name.is_empty() {
            return Err(ProtocolError::InvalidArgument("empty file name".into()));
        }
        Ok(Command::OpenFile {
            kind,
            timestamp,
            name: name.to_string(),
        })
    }

    /// Build a chunk write
    pub fn write_chunk(offset: u32, data: Vec<u8>) -> Result<Self, ProtocolError> {
        if data.is_empty() || data.len() > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidArgument(format!(
                "chunk length {} outside 1..={}",
                data.len(),
                MAX_CHUNK_SIZE
            )));
        }
        Ok(Command::WriteChunk { offset, data })
    }

    /// Get the opcode byte
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Message(_) => b'M',
            Command::SetConfigVar { .. } => b'L',
            Command::OpenFile { .. } => b'O',
            Command::WriteChunk { .. } => b'W',
            Command::CloseFile => b'C',
            Command::Stop => b'S',
        }
    }

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        match self {
            Command::Message(_) => "message",
            Command::SetConfigVar { .. } => "set-config-var",
            Command::OpenFile { .. } => "open-file",
            Command::WriteChunk { .. } => "write-chunk",
            Command::CloseFile => "close-file",
            Command::Stop => "stop",
        }
    }

    /// Chunk writes carry their own CRC instead of the ETX + command checksum footer
    pub fn is_crc_sealed(&self) -> bool {
        matches!(self, Command::WriteChunk { .. })
    }

    /// Opcode followed by the command arguments
    pub fn payload(&self) -> Vec<u8> {
        let builder = PayloadBuilder::command(self.opcode());
        match self {
            Command::Message(text) => builder.bytes(text).build(),
            Command::SetConfigVar { name, value } => builder
                .bytes(name.as_bytes())
                .byte(FIELD_SEPARATOR)
                .bytes(value.as_bytes())
                .build(),
            Command::OpenFile {
                kind,
                timestamp,
                name,
            } => builder
                .byte(kind.byte())
                .bytes(OPEN_FILE_RESERVED)
                .bytes(timestamp.format(TIMESTAMP_FORMAT).to_string().as_bytes())
                .bytes(OPEN_FILE_PADDING)
                .bytes(name.as_bytes())
                .build(),
            Command::WriteChunk { offset, data } => builder
                .u16_be(data.len() as u16)
                .u32_be(*offset)
                .bytes(data)
                .build(),
            Command::CloseFile | Command::Stop => builder.build(),
        }
    }

    /// Complete sealed bytes as written to the channel
    pub fn to_wire(&self) -> Vec<u8> {
        let payload = self.payload();
        if !self.is_crc_sealed() {
            return Frame::new(payload).to_bytes();
        }

        let mut crc = [0u8; 2];
        BigEndian::write_u16(&mut crc, crc16_buypass(&payload));

        let mut bytes = Vec::with_capacity(payload.len() + 3);
        bytes.push(STX);
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&crc);
        bytes
    }
}

fn require_ascii(what: &str, value: &str) -> Result<(), ProtocolError> {
    if value.is_ascii() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidArgument(format!(
            "{} {:?} is not ASCII",
            what, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ETX;
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 2)
            .and_then(|d| d.and_hms_opt(11, 22, 33))
            .unwrap()
    }

    #[test]
    fn test_opcodes() {
        assert_eq!(Command::Message(vec![]).opcode(), b'M');
        assert_eq!(Command::CloseFile.opcode(), b'C');
        assert_eq!(Command::Stop.opcode(), b'S');
        assert_eq!(Command::set_config_var("a", "b").unwrap().opcode(), b'L');
    }

    #[test]
    fn test_config_var_payload() {
        let cmd = Command::set_config_var("*GO", "APP.OUT").unwrap();
        assert_eq!(cmd.payload(), b"L*GO\x1cAPP.OUT".to_vec());
    }

    #[test]
    fn test_config_var_rejects_separator_and_non_ascii() {
        assert!(Command::set_config_var("a\x1cb", "c").is_err());
        assert!(Command::set_config_var("name", "välue").is_err());
    }

    #[test]
    fn test_open_file_payload() {
        let cmd = Command::open_file(FileKind::Code, timestamp(), "APP.OUT").unwrap();
        assert_eq!(
            cmd.payload(),
            b"OC000000C30000000020220102112233XXXXXXXXAPP.OUT".to_vec()
        );

        let data = Command::open_file(FileKind::Data, timestamp(), "CFG.DAT").unwrap();
        assert_eq!(data.payload()[1], b'D');
    }

    #[test]
    fn test_open_file_rejects_bad_names() {
        assert!(Command::open_file(FileKind::Code, timestamp(), "").is_err());
        assert!(Command::open_file(FileKind::Code, timestamp(), "naïve.bin").is_err());
    }

    #[test]
    fn test_write_chunk_wire() {
        let cmd = Command::write_chunk(1000, vec![0xAA, 0xBB]).unwrap();
        let payload = cmd.payload();
        assert_eq!(payload, vec![b'W', 0x00, 0x02, 0x00, 0x00, 0x03, 0xE8, 0xAA, 0xBB]);

        let wire = cmd.to_wire();
        let crc = crc16_buypass(&payload);
        assert_eq!(wire[0], STX);
        assert_eq!(&wire[1..wire.len() - 2], payload.as_slice());
        assert_eq!(&wire[wire.len() - 2..], &crc.to_be_bytes());
        assert!(!wire[1..wire.len() - 2].ends_with(&[ETX]));
    }

    #[test]
    fn test_write_chunk_bounds() {
        assert!(Command::write_chunk(0, vec![]).is_err());
        assert!(Command::write_chunk(0, vec![0; MAX_CHUNK_SIZE + 1]).is_err());
        assert!(Command::write_chunk(0, vec![0; MAX_CHUNK_SIZE]).is_ok());
    }

    #[test]
    fn test_framed_wire() {
        let wire = Command::Stop.to_wire();
        assert_eq!(wire, vec![STX, b'S', ETX, 0x6A, 0x0F]);
        assert!(!Command::Stop.is_crc_sealed());
    }
}
