//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Timed out waiting for the terminal")]
    Timeout,

    #[error("Not connected to terminal")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Handshake cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Chunk {chunk_index} at offset {offset} failed: {source}")]
    ChunkFailed {
        chunk_index: usize,
        offset: u32,
        #[source]
        source: Box<ProtocolError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the failed operation may be retried on the same session
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout | ProtocolError::ChunkFailed { .. }
        )
    }
}
