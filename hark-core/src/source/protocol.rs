//! Wire-format parsing for the serial feature stream.
//!
//! The upstream extractor emits newline-delimited ASCII records. A feature
//! record looks like
//!
//! ```text
//! mfcc:<amplitude> <c1> <c2> ... <cN>
//! ```
//!
//! where every value is a decimal float. Index 0 of the number list is the
//! frame amplitude; a configurable contiguous sub-range of the list is the
//! feature vector. The same link carries other record kinds (`raw:`, `spec:`,
//! `stat:`, `msg:`) for tooling that is out of scope here — those lines, and
//! anything malformed, are skipped rather than treated as errors.

use crate::frame::FeatureFrame;

/// Tag prefix marking a feature record line.
pub const FRAME_TAG: &str = "mfcc:";

/// Which slice of a feature record's numbers forms the feature vector.
///
/// Indices are into the full number list, amplitude at index 0. The reference
/// deployments use `[2, 7)` (D=5) or `[2, 9)` (D=7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineProtocol {
    /// First index of the feature vector. Must be ≥ 1 (the amplitude is never
    /// part of the feature vector).
    pub feature_lo: usize,
    /// One past the last feature index.
    pub feature_hi: usize,
}

impl LineProtocol {
    pub fn new(feature_lo: usize, feature_hi: usize) -> Self {
        Self {
            feature_lo,
            feature_hi,
        }
    }

    /// Dimension of the feature vectors this protocol produces.
    pub fn feature_dim(&self) -> usize {
        self.feature_hi.saturating_sub(self.feature_lo)
    }

    /// Parse one raw line into a frame.
    ///
    /// Returns `None` for lines that are not feature records: wrong or missing
    /// tag, non-numeric payload, or too few numbers to cover the configured
    /// feature range. Trailing `\r\n` is tolerated.
    pub fn parse_line(&self, line: &str) -> Option<FeatureFrame> {
        let payload = line.trim_end().strip_prefix(FRAME_TAG)?;

        let mut numbers = Vec::with_capacity(self.feature_hi.max(1));
        for token in payload.split_whitespace() {
            numbers.push(token.parse::<f32>().ok()?);
        }

        if numbers.is_empty() || numbers.len() < self.feature_hi {
            return None;
        }

        let amplitude = numbers[0];
        let features = numbers[self.feature_lo..self.feature_hi].to_vec();
        Some(FeatureFrame::new(amplitude, features))
    }
}
