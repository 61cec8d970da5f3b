//! Byte channel abstraction
//!
//! The protocol only needs a writable stream that can be polled for input
//! without blocking.

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Duplex byte channel with non-blocking reads
pub trait Channel: Write {
    /// Read whatever is buffered, up to `buf.len()` bytes.
    /// Returns `Ok(0)` when nothing is available instead of blocking.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes currently buffered for reading
    fn bytes_available(&mut self) -> io::Result<usize>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }
}

/// Serial port wrapper implementing Channel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Port name, if the backend knows it
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Channel for SerialChannel {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
