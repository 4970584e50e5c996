//! Amplitude-gated word segmentation with hangover.
//!
//! ## Algorithm
//!
//! Per incoming frame:
//!
//! 1. If `amplitude > threshold`, append the normalized feature vector to the
//!    open buffer and reset the hangover counter to its maximum.
//! 2. If below threshold but the hangover counter is positive, append anyway
//!    and decrement the counter (bridges intra-word dips such as plosives).
//! 3. Once silence outlasts the hangover window, close the buffer: emit it
//!    with the trailing `max_quiet_frames` entries removed (the hangover tail
//!    is silence, not signal), or drop it entirely if it never grew past the
//!    hangover length.
//!
//! Feature vectors are rescaled before buffering (see [`normalize`]) so that
//! the downstream alignment distance reacts to spectral shape rather than to
//! absolute loudness.

use tracing::debug;

use crate::frame::{FeatureFrame, WordSegment};

/// Streaming segmenter turning a frame sequence into word segments.
///
/// Feed frames with [`push`](Self::push); at most one segment is emitted per
/// frame. The segmenter holds no resources, so abandoning it mid-word simply
/// drops the partial buffer.
#[derive(Debug, Clone)]
pub struct WordSegmenter {
    /// Amplitude level (exclusive) above which a frame counts as voiced.
    threshold: f32,
    /// How many consecutive below-threshold frames keep a word open after
    /// voicing ends. Also the number of trailing frames trimmed at emission.
    max_quiet_frames: usize,
    /// Current hangover countdown.
    hangover: usize,
    /// Normalized feature vectors of the open word, empty while in silence.
    buffer: Vec<Vec<f32>>,
}

impl WordSegmenter {
    /// Create a new `WordSegmenter`.
    ///
    /// # Parameters
    /// - `threshold`: amplitude above which a frame is considered voiced.
    ///   Default: `0.01`.
    /// - `max_quiet_frames`: quiet frames tolerated inside a word before it
    ///   closes. Default: `5` (≈ 100 ms at a 20 ms frame stride).
    pub fn new(threshold: f32, max_quiet_frames: usize) -> Self {
        Self {
            threshold,
            max_quiet_frames,
            hangover: 0,
            buffer: Vec::new(),
        }
    }

    /// Advance the automaton by one frame.
    ///
    /// Returns a completed [`WordSegment`] when this frame closes a word,
    /// otherwise `None`.
    pub fn push(&mut self, frame: &FeatureFrame) -> Option<WordSegment> {
        if frame.amplitude > self.threshold {
            // Voiced frame, full hangover credit again.
            self.buffer.push(normalize(&frame.features));
            self.hangover = self.max_quiet_frames;
            None
        } else if self.hangover > 0 {
            // Quiet, but still within the hangover window.
            self.buffer.push(normalize(&frame.features));
            self.hangover -= 1;
            None
        } else if self.buffer.len() > self.max_quiet_frames {
            let mut word = std::mem::take(&mut self.buffer);
            word.truncate(word.len() - self.max_quiet_frames);
            debug!(frames = word.len(), "word segment closed");
            Some(WordSegment::new(word))
        } else {
            // A blip shorter than the hangover window is noise.
            self.buffer.clear();
            None
        }
    }

    /// Whether a word is currently open (voiced or within hangover).
    pub fn is_voiced(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop any partially buffered word and return to silence.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.hangover = 0;
    }
}

impl Default for WordSegmenter {
    fn default() -> Self {
        Self::new(0.01, 5)
    }
}

/// Rescale a feature vector to `v * ln(|v| + 1) / |v|`.
///
/// Keeps the vector's direction while compressing its magnitude to
/// `ln(|v| + 1)`, which damps loudness variance between repetitions of the
/// same word. A zero vector has no direction and is returned unchanged.
pub fn normalize(features: &[f32]) -> Vec<f32> {
    let norm = features.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return features.to_vec();
    }
    let scale = (norm + 1.0).ln() / norm;
    features.iter().map(|v| v * scale).collect()
}
