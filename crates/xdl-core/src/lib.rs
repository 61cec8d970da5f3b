//! # XDL Core Library
//!
//! Protocol engine for the download mode of VFI payment terminals.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The two wire checksums (command checksum and CRC-16/BUYPASS)
//! - Frame encoding and timeout-bounded frame reassembly
//! - The connection handshake and session commands
//! - Chunked file upload with on-device progress
//!
//! ## Example
//!
//! ```rust,ignore
//! use xdl_core::protocol::{open_port, Session, SessionConfig};
//! use xdl_core::transfer::{send_file, TransferOptions, UploadSource};
//!
//! let channel = open_port("/dev/ttyUSB0", 115200)?;
//! let mut session = Session::new(channel, SessionConfig::default());
//! let identity = session.connect()?;
//! println!("Connected: {identity}");
//!
//! let source = UploadSource::open("app.out")?;
//! send_file(&mut session, source, &TransferOptions::default(), |_| {})?;
//! session.stop()?;
//! ```

pub mod protocol;
pub mod transfer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        CancelToken, Channel, Command, ConnectionState, FileKind, ProtocolError, Reply, Session,
        SessionConfig,
    };
    pub use crate::transfer::{send_file, TransferOptions, TransferProgress, Upload, UploadSource};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
