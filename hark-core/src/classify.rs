//! Nearest-reference classification.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::dictionary::ReferenceDictionary;
use crate::dtw;
use crate::error::{HarkError, Result};
use crate::frame::WordSegment;

/// Alignment distance of one reference against a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub distance: f32,
}

/// Outcome of classifying one word segment.
#[derive(Debug, Clone)]
pub struct WordMatch {
    /// Label of the nearest reference.
    pub label: String,
    /// Alignment distance to that reference.
    pub distance: f32,
    /// Distances to every reference, in dictionary order.
    pub scores: Vec<LabelScore>,
}

/// Scores candidate segments against a fixed [`ReferenceDictionary`].
#[derive(Debug, Clone)]
pub struct Classifier {
    dictionary: ReferenceDictionary,
}

impl Classifier {
    /// Wrap a dictionary for classification.
    ///
    /// # Errors
    /// `HarkError::EmptyDictionary` if there is nothing to match against.
    pub fn new(dictionary: ReferenceDictionary) -> Result<Self> {
        if dictionary.is_empty() {
            return Err(HarkError::EmptyDictionary);
        }
        Ok(Self { dictionary })
    }

    pub fn dictionary(&self) -> &ReferenceDictionary {
        &self.dictionary
    }

    /// Find the reference nearest to `candidate`.
    ///
    /// Exact ties go to the earliest dictionary entry. A feature-dimension
    /// mismatch between candidate and references is a configuration fault
    /// and fails loudly rather than producing a meaningless distance.
    pub fn classify(&self, candidate: &WordSegment) -> Result<WordMatch> {
        let dict_dim = self
            .dictionary
            .feature_dim()
            .ok_or(HarkError::EmptyDictionary)?;
        if candidate.dim() != dict_dim {
            return Err(HarkError::DimensionMismatch {
                candidate: candidate.dim(),
                dictionary: dict_dim,
            });
        }

        let mut scores: Vec<LabelScore> = Vec::with_capacity(self.dictionary.len());
        let mut best: Option<usize> = None;
        for (label, reference) in self.dictionary.entries() {
            let distance = dtw::distance(reference.frames(), candidate.frames());
            trace!(label, distance, "reference scored");
            if best.map_or(true, |b: usize| distance < scores[b].distance) {
                best = Some(scores.len());
            }
            scores.push(LabelScore {
                label: label.to_string(),
                distance,
            });
        }

        // The dictionary is non-empty, so at least one score exists.
        let nearest: &LabelScore = &scores[best.unwrap_or(0)];
        Ok(WordMatch {
            label: nearest.label.clone(),
            distance: nearest.distance,
            scores,
        })
    }
}
