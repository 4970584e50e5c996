//! Event types delivered to engine subscribers.
//!
//! Events are plain serializable values so front ends can forward them as
//! JSON lines without reshaping. Channels are single-consumer: clone a
//! receiver to share work between consumers, not to broadcast.

use serde::{Deserialize, Serialize};

use crate::classify::{LabelScore, WordMatch};

// ---------------------------------------------------------------------------
// Match events
// ---------------------------------------------------------------------------

/// Emitted once per classified word segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Label of the nearest reference.
    pub label: String,
    /// Alignment distance to that reference.
    pub distance: f32,
    /// Length of the classified segment in frames.
    pub frames: usize,
    /// Distances to every reference, in dictionary order.
    pub scores: Vec<LabelScore>,
}

impl MatchEvent {
    pub fn from_match(seq: u64, frames: usize, word_match: WordMatch) -> Self {
        Self {
            seq,
            label: word_match.label,
            distance: word_match.distance,
            frames,
            scores: word_match.scores,
        }
    }
}

// ---------------------------------------------------------------------------
// Activity events
// ---------------------------------------------------------------------------

/// Emitted for each processed frame: raw amplitude plus whether a word is
/// currently open. Delivery is lossy under backpressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Amplitude reported by the feature extractor for this frame.
    pub amplitude: f32,
    /// Whether the segmenter currently has a word open.
    pub is_voiced: bool,
}

// ---------------------------------------------------------------------------
// Engine status
// ---------------------------------------------------------------------------

/// Current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Pipeline running, classifying live segments.
    Listening,
    /// Pipeline ended; engine may be restarted.
    Stopped,
    /// Pipeline aborted on an unrecoverable error.
    Error,
}
