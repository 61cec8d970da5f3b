#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use xdl_core::protocol::{Channel, Frame, SessionConfig, ACK, NAK, STX};

/// Session timings short enough for tests
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        reply_timeout: Duration::from_millis(40),
        repeat_delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        connect_timeout: Some(Duration::from_secs(5)),
        verify_checksums: true,
    }
}

/// Scripted terminal: answers handshake probes and acknowledges commands
pub struct MockDevice {
    /// Every write call, in order
    pub writes: Vec<Vec<u8>>,
    incoming: VecDeque<u8>,
    identity: Option<Vec<u8>>,
    corrupt_identity: bool,
    probes_before_reply: usize,
    probes: usize,
    command_reply: Option<Vec<u8>>,
    drop_commands: Vec<usize>,
    commands_seen: usize,
}

impl MockDevice {
    /// Device that answers the first probe with `identity` as a frame payload
    pub fn new(identity: &[u8]) -> Self {
        Self {
            writes: Vec::new(),
            incoming: VecDeque::new(),
            identity: Some(identity.to_vec()),
            corrupt_identity: false,
            probes_before_reply: 0,
            probes: 0,
            command_reply: Some(vec![ACK]),
            drop_commands: Vec::new(),
            commands_seen: 0,
        }
    }

    /// Device that never answers anything
    pub fn silent() -> Self {
        let mut device = Self::new(b"");
        device.identity = None;
        device.command_reply = None;
        device
    }

    /// Ignore this many probes before answering
    pub fn after_probes(mut self, probes: usize) -> Self {
        self.probes_before_reply = probes;
        self
    }

    /// Send the identity frame with a damaged checksum, on every probe
    pub fn corrupting_identity(mut self) -> Self {
        self.corrupt_identity = true;
        self
    }

    /// Raw bytes sent back for every command
    pub fn replying_with(mut self, reply: Option<Vec<u8>>) -> Self {
        self.command_reply = reply;
        self
    }

    /// Stay silent for the n-th (zero based) command frame
    pub fn dropping_command(mut self, index: usize) -> Self {
        self.drop_commands.push(index);
        self
    }

    /// Command frames written so far (signals excluded)
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|w| w.first() == Some(&STX))
            .cloned()
            .collect()
    }

    /// Opcodes of the command frames written so far
    pub fn opcodes(&self) -> Vec<u8> {
        self.commands().iter().map(|c| c[1]).collect()
    }

    fn on_write(&mut self, buf: &[u8]) {
        match buf {
            [NAK] => {
                self.probes += 1;
                if self.probes > self.probes_before_reply {
                    if self.corrupt_identity {
                        if let Some(identity) = &self.identity {
                            let mut frame = Frame::new(identity.clone()).to_bytes();
                            let last = frame.len() - 1;
                            frame[last] ^= 0x55;
                            self.incoming.extend(frame);
                        }
                    } else if let Some(identity) = self.identity.take() {
                        self.incoming.extend(Frame::new(identity).to_bytes());
                    }
                }
            }
            [ACK] => {}
            [STX, ..] => {
                let index = self.commands_seen;
                self.commands_seen += 1;
                if self.drop_commands.contains(&index) {
                    return;
                }
                if let Some(reply) = &self.command_reply {
                    self.incoming.extend(reply.iter().copied());
                }
            }
            _ => {}
        }
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes.push(buf.to_vec());
        self.on_write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for MockDevice {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.incoming.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.incoming.len())
    }
}

/// Channel delivering pre-recorded arrivals, with idle polls in between
pub struct ScriptedChannel {
    arrivals: VecDeque<Vec<u8>>,
    current: VecDeque<u8>,
    idle_polls: usize,
    countdown: usize,
}

impl ScriptedChannel {
    pub fn new(arrivals: Vec<Vec<u8>>, idle_polls: usize) -> Self {
        Self {
            arrivals: arrivals.into(),
            current: VecDeque::new(),
            idle_polls,
            countdown: idle_polls,
        }
    }

    /// One arrival per byte
    pub fn byte_at_a_time(bytes: &[u8], idle_polls: usize) -> Self {
        Self::new(bytes.iter().map(|&b| vec![b]).collect(), idle_polls)
    }

    /// Bytes not yet handed out
    pub fn remaining(&self) -> usize {
        self.current.len() + self.arrivals.iter().map(Vec::len).sum::<usize>()
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for ScriptedChannel {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current.is_empty() {
            if self.countdown > 0 {
                self.countdown -= 1;
                return Ok(0);
            }
            match self.arrivals.pop_front() {
                Some(next) => {
                    self.current.extend(next);
                    self.countdown = self.idle_polls;
                }
                None => return Ok(0),
            }
        }

        let mut n = 0;
        while n < buf.len() {
            match self.current.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.current.len())
    }
}
