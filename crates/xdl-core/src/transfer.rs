//! File upload
//!
//! Sends one file to the terminal:
//! 1. `O` announces the file type, timestamp and name, then the display is cleared
//! 2. `W` carries the contents in chunks of at most 1000 bytes, each tagged with
//!    the number of bytes already sent
//! 3. `C` closes the file
//!
//! After every acknowledged chunk a progress bar is drawn on the terminal
//! display and the caller's progress callback runs.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::protocol::{
    Channel, Command, FileKind, HandshakeSignal, ProtocolError, Reply, Session, MAX_CHUNK_SIZE,
};

/// Message that clears the terminal display
pub const CLEAR_DISPLAY: &[u8] = b"-\x0c";

/// Cells in the on-device progress bar
pub const PROGRESS_BAR_CELLS: u64 = 12;

const SPINNER: [u8; 4] = [b'-', b'\\', b'|', b'/'];

/// Options for one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Store as code or data
    pub kind: FileKind,
    /// Bytes per `W` command, at most [`MAX_CHUNK_SIZE`]
    pub chunk_size: usize,
    /// Timestamp sent with the announcement; current local time when unset
    pub timestamp: Option<NaiveDateTime>,
    /// Draw a progress bar on the terminal display
    pub device_progress: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            kind: FileKind::Code,
            chunk_size: MAX_CHUNK_SIZE,
            timestamp: None,
            device_progress: true,
        }
    }
}

/// Position within an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes acknowledged before the reported chunk
    pub bytes_sent: u64,
    /// Declared size of the source
    pub total_size: u64,
    /// Index of the reported chunk
    pub chunk_index: usize,
}

impl TransferProgress {
    /// Percentage complete, rounded up
    pub fn percent(&self) -> u32 {
        progress_percent(self.bytes_sent, self.total_size)
    }
}

/// A readable file with its name and length
pub struct UploadSource<R: Read> {
    name: String,
    size: u64,
    reader: R,
}

impl<R: Read> UploadSource<R> {
    /// Wrap any reader
    pub fn new(name: impl Into<String>, size: u64, reader: R) -> Self {
        Self {
            name: name.into(),
            size,
            reader,
        }
    }

    /// Name announced to the terminal
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared length in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl UploadSource<File> {
    /// Open a local file, announced under its base name
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ProtocolError::InvalidArgument(format!("no usable file name in {:?}", path))
            })?
            .to_string();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self::new(name, size, file))
    }
}

/// An upload in progress
///
/// A failed chunk leaves the offset untouched; calling
/// [`send_next_chunk`](Self::send_next_chunk) again resends the same bytes.
pub struct Upload<'s, C: Channel, R: Read> {
    session: &'s mut Session<C>,
    source: UploadSource<R>,
    options: TransferOptions,
    progress: TransferProgress,
    pending: Option<Vec<u8>>,
}

impl<'s, C: Channel, R: Read> Upload<'s, C, R> {
    /// Announce the file and clear the display
    pub fn begin(
        session: &'s mut Session<C>,
        source: UploadSource<R>,
        options: TransferOptions,
    ) -> Result<Self, ProtocolError> {
        if options.chunk_size == 0 || options.chunk_size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidArgument(format!(
                "chunk size {} outside 1..={}",
                options.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if source.size > u64::from(u32::MAX) {
            return Err(ProtocolError::InvalidArgument(format!(
                "{} is too large ({} bytes)",
                source.name, source.size
            )));
        }

        let timestamp = options
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local());
        let announce = Command::open_file(options.kind, timestamp, &source.name)?;

        info!(
            "sending '{}' ({} bytes) as {:?}",
            source.name, source.size, options.kind
        );
        session.send(&announce)?;
        session.message(CLEAR_DISPLAY)?;

        let progress = TransferProgress {
            bytes_sent: 0,
            total_size: source.size,
            chunk_index: 0,
        };

        Ok(Self {
            session,
            source,
            options,
            progress,
            pending: None,
        })
    }

    /// Current position: bytes acknowledged and index of the next chunk
    pub fn progress(&self) -> TransferProgress {
        self.progress
    }

    /// Send the next chunk
    ///
    /// Returns `None` once the source is exhausted. A transport failure is
    /// reported as [`ProtocolError::ChunkFailed`] and may be retried.
    pub fn send_next_chunk(&mut self) -> Result<Option<TransferProgress>, ProtocolError> {
        let data = match self.pending.take() {
            Some(data) => data,
            None => {
                let mut buf = Vec::with_capacity(self.options.chunk_size);
                (&mut self.source.reader)
                    .take(self.options.chunk_size as u64)
                    .read_to_end(&mut buf)?;
                if buf.is_empty() {
                    return Ok(None);
                }
                buf
            }
        };

        let chunk_len = data.len() as u64;
        let offset = u32::try_from(self.progress.bytes_sent)
            .ok()
            .filter(|o| u64::from(*o) + chunk_len <= u64::from(u32::MAX))
            .ok_or_else(|| {
                ProtocolError::InvalidArgument(format!(
                    "{} exceeds the 32-bit offset field",
                    self.source.name
                ))
            })?;
        let command = Command::write_chunk(offset, data)?;

        match self.session.send(&command) {
            Ok(Reply::Signal(HandshakeSignal::Nak)) => {
                warn!("terminal answered chunk {} with NAK", self.progress.chunk_index)
            }
            Ok(_) => {}
            Err(e) => {
                if let Command::WriteChunk { data, .. } = command {
                    self.pending = Some(data);
                }
                return Err(ProtocolError::ChunkFailed {
                    chunk_index: self.progress.chunk_index,
                    offset,
                    source: Box::new(e),
                });
            }
        }

        let acknowledged = self.progress;
        self.progress.bytes_sent += chunk_len;
        self.progress.chunk_index += 1;
        debug!(
            "chunk {} acknowledged, {}/{} bytes",
            acknowledged.chunk_index, self.progress.bytes_sent, self.progress.total_size
        );

        if self.options.device_progress {
            let bar = progress_bar(
                acknowledged.bytes_sent,
                acknowledged.total_size,
                acknowledged.chunk_index,
            );
            self.session.message(bar)?;
        }

        Ok(Some(acknowledged))
    }

    /// Close the file on the terminal
    pub fn finish(self) -> Result<TransferProgress, ProtocolError> {
        self.session.send(&Command::CloseFile)?;
        info!(
            "sent '{}' in {} chunks",
            self.source.name, self.progress.chunk_index
        );
        Ok(self.progress)
    }
}

/// Upload a whole file, stopping at the first failure
pub fn send_file<C, R, F>(
    session: &mut Session<C>,
    source: UploadSource<R>,
    options: &TransferOptions,
    mut on_progress: F,
) -> Result<TransferProgress, ProtocolError>
where
    C: Channel,
    R: Read,
    F: FnMut(&TransferProgress),
{
    let mut upload = Upload::begin(session, source, options.clone())?;
    while let Some(progress) = upload.send_next_chunk()? {
        on_progress(&progress);
    }
    upload.finish()
}

/// Percentage of `total` covered by `sent`, rounded up
pub fn progress_percent(sent: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    (sent.saturating_mul(100).div_ceil(total)).min(100) as u32
}

/// Display message drawing a progress bar on the terminal
///
/// Filled cells cover `sent / total` (rounded up), followed by a spinner cell
/// that turns with every chunk and blank cells up to the bar width.
pub fn progress_bar(sent: u64, total: u64, chunk_index: usize) -> Vec<u8> {
    let filled = if total == 0 {
        PROGRESS_BAR_CELLS
    } else {
        sent.saturating_mul(PROGRESS_BAR_CELLS)
            .div_ceil(total)
            .min(PROGRESS_BAR_CELLS)
    };
    let filled = filled as usize;
    let blank = PROGRESS_BAR_CELLS as usize - filled;

    let mut bar = Vec::with_capacity(PROGRESS_BAR_CELLS as usize + 5);
    bar.extend_from_slice(b"-\x08[");
    bar.extend(std::iter::repeat(0xFF).take(filled));
    bar.push(SPINNER[chunk_index % SPINNER.len()]);
    bar.extend(std::iter::repeat(b'_').take(blank));
    bar.push(b']');
    bar
}
