//! `HarkEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! HarkEngine::new(config, dictionary)   → status = Idle
//!     └─► start(source)                 → pipeline thread spawned, status = Listening
//!         └─► stop() / Session::stop()  → pipeline unwinds, status = Stopped
//! ```
//!
//! `start()`/`stop()` in the wrong state return an error rather than
//! panicking. The engine owns no I/O: callers open a [`FrameSource`] and hand
//! it over, which keeps device errors at the call site and the engine
//! restartable with a fresh source.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info};

use crate::{
    classify::Classifier,
    dictionary::ReferenceDictionary,
    error::{HarkError, Result},
    events::{ActivityEvent, EngineStatus, MatchEvent},
    segment::WordSegmenter,
    source::{FrameSource, LineProtocol},
};

/// Activity channel capacity. Activity is a UI feed, so delivery is lossy:
/// when the buffer is full new events are dropped and counted.
const ACTIVITY_CAP: usize = 256;

/// Configuration for `HarkEngine`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Amplitude level (exclusive) above which a frame counts as voiced.
    /// Default: 0.01.
    pub amplitude_threshold: f32,
    /// Quiet frames tolerated inside a word before it closes; also the
    /// length of the trimmed hangover tail. Default: 5.
    pub max_quiet_frames: usize,
    /// First index of the feature vector within a record's number list
    /// (index 0 is the amplitude). Default: 2.
    pub feature_lo: usize,
    /// One past the last feature index. Default: 7.
    pub feature_hi: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.01,
            max_quiet_frames: 5,
            feature_lo: 2,
            feature_hi: 7,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.amplitude_threshold.is_finite() || self.amplitude_threshold < 0.0 {
            return Err(HarkError::InvalidConfig(
                "amplitude_threshold must be finite and non-negative".into(),
            ));
        }
        if self.feature_lo < 1 {
            return Err(HarkError::InvalidConfig(
                "feature_lo must be at least 1, index 0 is the amplitude".into(),
            ));
        }
        if self.feature_hi <= self.feature_lo {
            return Err(HarkError::InvalidConfig(format!(
                "feature range [{}, {}) is empty",
                self.feature_lo, self.feature_hi
            )));
        }
        Ok(())
    }

    /// Dimension of the feature vectors this configuration selects.
    pub fn feature_dim(&self) -> usize {
        self.feature_hi - self.feature_lo
    }

    /// Wire protocol for this feature range.
    pub fn protocol(&self) -> LineProtocol {
        LineProtocol::new(self.feature_lo, self.feature_hi)
    }

    /// A fresh segmenter with this configuration's gating parameters.
    pub fn segmenter(&self) -> WordSegmenter {
        WordSegmenter::new(self.amplitude_threshold, self.max_quiet_frames)
    }
}

/// Cooperative stop signal.
///
/// Cloned into the pipeline thread and into live frame sources, which poll it
/// between blocking reads. Stopping is edge-triggered and one-way: a token
/// never resets, each session gets a fresh one.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Takes effect at the next frame pull boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to one running pipeline.
///
/// Returned by [`HarkEngine::start`]. Dropping the session does not stop the
/// pipeline; signal the token, then [`join`](Self::join) for the outcome.
pub struct Session {
    stop: StopToken,
    handle: thread::JoinHandle<Result<()>>,
}

impl Session {
    /// Clone of this session's stop token, safe to hand to signal handlers.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pipeline to unwind and return its outcome.
    pub fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(HarkError::Other(anyhow::anyhow!(
                "pipeline thread panicked"
            ))),
        }
    }
}

/// The top-level engine handle.
///
/// `HarkEngine` is `Send + Sync`, all fields use interior mutability. Wrap in
/// `Arc` to share between a controlling thread and event consumers.
#[derive(Debug)]
pub struct HarkEngine {
    config: EngineConfig,
    /// Read-only once built; shared with the pipeline thread.
    classifier: Arc<Classifier>,
    /// `true` while a pipeline thread is alive.
    running: Arc<AtomicBool>,
    /// Canonical status, written by lifecycle methods and the pipeline thread.
    status: Arc<Mutex<EngineStatus>>,
    /// Stop token of the active session, taken by `stop()`.
    active: Mutex<Option<StopToken>>,
    match_tx: Sender<MatchEvent>,
    match_rx: Receiver<MatchEvent>,
    activity_tx: Sender<ActivityEvent>,
    activity_rx: Receiver<ActivityEvent>,
    /// Monotonically increasing match event sequence counter.
    seq: Arc<AtomicU64>,
    /// Shared pipeline diagnostics counters.
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl HarkEngine {
    /// Create an engine over a validated config and a non-empty dictionary.
    ///
    /// # Errors
    /// - `HarkError::InvalidConfig` for a bad feature range or threshold, or
    ///   when the dictionary's feature dimension does not match the config.
    /// - `HarkError::EmptyDictionary` when there is nothing to match against.
    pub fn new(config: EngineConfig, dictionary: ReferenceDictionary) -> Result<Self> {
        config.validate()?;
        if let Some(dict_dim) = dictionary.feature_dim() {
            if dict_dim != config.feature_dim() {
                return Err(HarkError::InvalidConfig(format!(
                    "dictionary references are {}-dimensional but the feature range [{}, {}) selects {}",
                    dict_dim,
                    config.feature_lo,
                    config.feature_hi,
                    config.feature_dim()
                )));
            }
        }
        let classifier = Arc::new(Classifier::new(dictionary)?);

        let (match_tx, match_rx) = unbounded();
        let (activity_tx, activity_rx) = bounded(ACTIVITY_CAP);

        Ok(Self {
            config,
            classifier,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            active: Mutex::new(None),
            match_tx,
            match_rx,
            activity_tx,
            activity_rx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the pipeline thread over `source` and return its session handle.
    ///
    /// The session's stop token is bound into the source, so a live source
    /// blocked on its device unblocks within one read timeout of `stop()`.
    ///
    /// # Errors
    /// `HarkError::AlreadyRunning` if a session is still alive.
    pub fn start(&self, mut source: Box<dyn FrameSource>) -> Result<Session> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HarkError::AlreadyRunning);
        }

        self.diagnostics.reset();
        *self.status.lock() = EngineStatus::Listening;

        let stop = StopToken::new();
        *self.active.lock() = Some(stop.clone());
        source.bind_stop(stop.clone());

        let ctx = pipeline::PipelineContext {
            config: self.config.clone(),
            source,
            classifier: Arc::clone(&self.classifier),
            stop: stop.clone(),
            match_tx: self.match_tx.clone(),
            activity_tx: self.activity_tx.clone(),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let spawned = thread::Builder::new()
            .name("hark-pipeline".into())
            .spawn(move || {
                let result = pipeline::run(ctx);
                match &result {
                    Ok(()) => *status.lock() = EngineStatus::Stopped,
                    Err(e) => {
                        error!(error = %e, "pipeline aborted");
                        *status.lock() = EngineStatus::Error;
                    }
                }
                running.store(false, Ordering::SeqCst);
                result
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                *self.status.lock() = EngineStatus::Error;
                *self.active.lock() = None;
                return Err(e.into());
            }
        };

        info!("engine started, listening");
        Ok(Session { stop, handle })
    }

    /// Request a stop of the active session.
    ///
    /// The pipeline finishes its current frame, then unwinds and marks the
    /// engine `Stopped`.
    ///
    /// # Errors
    /// `HarkError::NotRunning` if no session is alive.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(HarkError::NotRunning);
        }
        if let Some(token) = self.active.lock().take() {
            token.stop();
        }
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Receiver for match events. Single-consumer: clone shares the queue.
    pub fn subscribe_matches(&self) -> Receiver<MatchEvent> {
        self.match_rx.clone()
    }

    /// Receiver for lossy per-frame activity events.
    pub fn subscribe_activity(&self) -> Receiver<ActivityEvent> {
        self.activity_rx.clone()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}
