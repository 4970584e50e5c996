//! Typed carriers passed between the source, segmenter and classifier stages.

/// One amplitude + feature-vector sample from the upstream extractor.
///
/// The feature dimension is fixed per session by [`crate::engine::EngineConfig`]:
/// the line parser only ever constructs frames whose feature length equals the
/// configured `feature_hi - feature_lo`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    /// RMS amplitude reported for this frame. Consumed by the segmenter gate;
    /// not part of the feature vector.
    pub amplitude: f32,
    /// Cepstral feature vector, dimension D for the whole session.
    pub features: Vec<f32>,
}

impl FeatureFrame {
    pub fn new(amplitude: f32, features: Vec<f32>) -> Self {
        Self {
            amplitude,
            features,
        }
    }

    /// Dimension of the feature vector.
    pub fn feature_dim(&self) -> usize {
        self.features.len()
    }
}

/// A contiguous run of normalized feature vectors judged to be one spoken word.
///
/// Produced only by the segmenter, which guarantees the run is non-empty and
/// longer than the hangover window would allow a spurious blip to be.
/// Immutable after emission.
#[derive(Debug, Clone, PartialEq)]
pub struct WordSegment {
    frames: Vec<Vec<f32>>,
}

impl WordSegment {
    /// Wrap an ordered run of normalized feature vectors.
    ///
    /// Callers must not pass an empty run; the segmenter never does.
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        debug_assert!(!frames.is_empty(), "word segments are non-empty by construction");
        Self { frames }
    }

    /// Number of frames in the segment.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True only for a segment constructed in violation of the contract.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Feature dimension shared by every frame in the segment.
    pub fn dim(&self) -> usize {
        self.frames.first().map(|f| f.len()).unwrap_or(0)
    }

    /// The normalized feature vectors, in time order.
    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }
}
