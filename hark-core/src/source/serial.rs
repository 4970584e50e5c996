//! Live capture from a serial feature extractor.
//!
//! The extractor streams records continuously, so reads are given a short
//! timeout and the stop token is polled between them. A timed-out read can
//! leave a record half-received; bytes are therefore accumulated in a local
//! buffer and only complete lines are handed to the protocol parser.

use std::io::{self, Read};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::engine::StopToken;
use crate::error::{HarkError, Result};
use crate::frame::FeatureFrame;
use crate::source::{FrameSource, LineProtocol};

/// Upper bound on one blocking read. Also the worst-case latency between
/// a stop request and `next_frame` returning.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Lines dropped right after opening the port. Opening mid-stream usually
/// catches a truncated record, and some firmware revisions print a banner.
const STARTUP_DISCARD_LINES: u32 = 10;

/// Feature frames read live from a serial port.
///
/// Infinite for practical purposes; `next_frame` returns `Ok(None)` only
/// after the bound [`StopToken`] trips or when the device closes the link.
pub struct SerialSource {
    port: Box<dyn SerialPort>,
    protocol: LineProtocol,
    /// Replaced with the session's token when the engine starts.
    stop: StopToken,
    assembler: LineAssembler,
    discard: u32,
    skipped: u64,
}

impl SerialSource {
    /// Open `path` at `baud` and start streaming frames.
    pub fn open(path: &str, baud: u32, protocol: LineProtocol) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| HarkError::SerialDevice(format!("{path}: {e}")))?;

        info!(port = path, baud, "opened serial port");

        Ok(Self {
            port,
            protocol,
            stop: StopToken::new(),
            assembler: LineAssembler::new(),
            discard: STARTUP_DISCARD_LINES,
            skipped: 0,
        })
    }
}

impl FrameSource for SerialSource {
    fn bind_stop(&mut self, stop: StopToken) {
        self.stop = stop;
    }

    fn next_frame(&mut self) -> Result<Option<FeatureFrame>> {
        let mut chunk = [0u8; 256];
        loop {
            while let Some(line) = self.assembler.next_line() {
                if self.discard > 0 {
                    self.discard -= 1;
                    continue;
                }
                let parsed = std::str::from_utf8(&line)
                    .ok()
                    .and_then(|text| self.protocol.parse_line(text));
                match parsed {
                    Some(frame) => return Ok(Some(frame)),
                    None => self.skipped += 1,
                }
            }

            if self.stop.is_stopped() {
                debug!(skipped = self.skipped, "serial source stopping");
                return Ok(None);
            }

            match self.port.read(&mut chunk) {
                Ok(0) => {
                    info!("serial port closed by device");
                    return Ok(None);
                }
                Ok(n) => self.assembler.push(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn skipped_lines(&self) -> u64 {
        self.skipped
    }
}

/// Splits an incoming byte stream into newline-terminated lines, holding
/// partial tails across reads.
struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line including its `\n`, or `None` if only a partial
    /// line is buffered.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        Some(self.buf.drain(..=pos).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_line_split_across_chunks() {
        let mut asm = LineAssembler::new();
        asm.push(b"mfcc:0.1 1 2");
        assert!(asm.next_line().is_none());
        asm.push(b" 3 4 5 6 7\nmf");
        assert_eq!(asm.next_line().unwrap(), b"mfcc:0.1 1 2 3 4 5 6 7\n");
        assert!(asm.next_line().is_none());
        asm.push(b"cc:0.2 1 2 3 4 5 6 7\n");
        assert_eq!(asm.next_line().unwrap(), b"mfcc:0.2 1 2 3 4 5 6 7\n");
    }

    #[test]
    fn yields_every_line_in_one_chunk() {
        let mut asm = LineAssembler::new();
        asm.push(b"a\nb\nc\n");
        assert_eq!(asm.next_line().unwrap(), b"a\n");
        assert_eq!(asm.next_line().unwrap(), b"b\n");
        assert_eq!(asm.next_line().unwrap(), b"c\n");
        assert!(asm.next_line().is_none());
    }

    #[test]
    fn holds_partial_tail() {
        let mut asm = LineAssembler::new();
        asm.push(b"stat: fps:49\nmfcc:0.1");
        assert_eq!(asm.next_line().unwrap(), b"stat: fps:49\n");
        assert!(asm.next_line().is_none());
    }
}
