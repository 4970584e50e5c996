//! Frame acquisition.
//!
//! Everything downstream of this module consumes [`FeatureFrame`]s through the
//! [`FrameSource`] trait and never learns where they came from. The two
//! built-in producers are [`ReplaySource`] (a recorded log on disk) and, with
//! the `serial` feature, [`SerialSource`](serial::SerialSource) for a live
//! device. [`LineFrameSource`] is the shared adapter both are built on; tests
//! feed it from in-memory readers.

pub mod protocol;
#[cfg(feature = "serial")]
pub mod serial;

pub use protocol::{LineProtocol, FRAME_TAG};
#[cfg(feature = "serial")]
pub use serial::SerialSource;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::engine::StopToken;
use crate::error::Result;
use crate::frame::FeatureFrame;

/// Pull-based producer of feature frames.
pub trait FrameSource: Send {
    /// Produce the next frame, or `Ok(None)` once the stream is exhausted.
    ///
    /// Implementations skip unrecognized and malformed lines internally; `Err`
    /// is reserved for unrecoverable transport failures.
    fn next_frame(&mut self) -> Result<Option<FeatureFrame>>;

    /// Adopt the session's stop token before the first `next_frame` call.
    ///
    /// Sources that block indefinitely must poll the token at their read
    /// boundary and end the stream once it trips. Finite sources can ignore
    /// it; the default does nothing.
    fn bind_stop(&mut self, _stop: StopToken) {}

    /// Lines dropped so far because they were not parseable feature records.
    fn skipped_lines(&self) -> u64 {
        0
    }
}

/// Adapter turning any buffered line stream into a [`FrameSource`].
pub struct LineFrameSource<R> {
    reader: R,
    protocol: LineProtocol,
    line_buf: String,
    skipped: u64,
}

impl<R: BufRead> LineFrameSource<R> {
    pub fn new(reader: R, protocol: LineProtocol) -> Self {
        Self {
            reader,
            protocol,
            line_buf: String::new(),
            skipped: 0,
        }
    }
}

impl<R: BufRead + Send> FrameSource for LineFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<FeatureFrame>> {
        loop {
            self.line_buf.clear();
            let n = match self.reader.read_line(&mut self.line_buf) {
                Ok(n) => n,
                // Undecodable bytes up to the next newline were consumed;
                // treat them as one skipped line and keep reading.
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    self.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Ok(None);
            }
            match self.protocol.parse_line(&self.line_buf) {
                Some(frame) => return Ok(Some(frame)),
                None => self.skipped += 1,
            }
        }
    }

    fn skipped_lines(&self) -> u64 {
        self.skipped
    }
}

/// Replay of a recorded frame log. Finite; yields `Ok(None)` at end of file.
pub struct ReplaySource {
    inner: LineFrameSource<BufReader<File>>,
}

impl ReplaySource {
    /// Open a recorded log for replay.
    pub fn open(path: impl AsRef<Path>, protocol: LineProtocol) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            inner: LineFrameSource::new(BufReader::new(file), protocol),
        })
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<FeatureFrame>> {
        self.inner.next_frame()
    }

    fn skipped_lines(&self) -> u64 {
        self.inner.skipped_lines()
    }
}
