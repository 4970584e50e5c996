//! # hark-core
//!
//! Spoken-word spotting over a serial feature stream.
//!
//! ## Architecture
//!
//! ```text
//! Serial device / frame log → FrameSource → WordSegmenter → Classifier
//!                                                │               │
//!                                         ActivityEvent     DTW against
//!                                           (lossy)      ReferenceDictionary
//!                                                              │
//!                                                   crossbeam Sender<MatchEvent>
//! ```
//!
//! The feature extractor upstream (a microcontroller) streams one amplitude
//! plus a fixed-width feature vector per frame as tagged ASCII lines. This
//! crate segments that stream into word candidates with an amplitude-gated
//! hangover automaton and labels each candidate by its nearest reference
//! under dynamic time warping. The whole pipeline is synchronous and runs on
//! one thread per session.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod classify;
pub mod dictionary;
pub mod dtw;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod segment;
pub mod source;

// Convenience re-exports for downstream crates
pub use classify::{Classifier, LabelScore, WordMatch};
pub use dictionary::ReferenceDictionary;
pub use engine::{EngineConfig, HarkEngine, Session, StopToken};
pub use error::HarkError;
pub use events::{ActivityEvent, EngineStatus, MatchEvent};
pub use frame::{FeatureFrame, WordSegment};
pub use segment::WordSegmenter;
pub use source::{FrameSource, LineFrameSource, LineProtocol, ReplaySource};

#[cfg(feature = "serial")]
pub use source::SerialSource;
