//! Blocking pipeline loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Poll the stop token; end the session if signalled
//! 2. Pull one frame from the source (blocks at the I/O boundary)
//! 3. Feed the segmenter; it closes at most one word per frame
//! 4. Emit a lossy ActivityEvent (amplitude + voicing)
//! 5. If a word closed: score it against every reference, emit a MatchEvent
//! ```
//!
//! Classification happens inline, so the next frame is pulled only after the
//! current word is fully scored. The loop runs on the dedicated thread owned
//! by [`Session`](crate::engine::Session); any transport or configuration
//! error unwinds it and becomes the session's result.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};

use crate::{
    classify::Classifier,
    engine::{EngineConfig, StopToken},
    error::Result,
    events::{ActivityEvent, MatchEvent},
    source::FrameSource,
};

#[derive(Debug)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub lines_skipped: AtomicUsize,
    pub words_closed: AtomicUsize,
    pub matches_emitted: AtomicUsize,
    pub activity_dropped: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            frames_in: AtomicUsize::new(0),
            lines_skipped: AtomicUsize::new(0),
            words_closed: AtomicUsize::new(0),
            matches_emitted: AtomicUsize::new(0),
            activity_dropped: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.lines_skipped.store(0, Ordering::Relaxed);
        self.words_closed.store(0, Ordering::Relaxed);
        self.matches_emitted.store(0, Ordering::Relaxed);
        self.activity_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            lines_skipped: self.lines_skipped.load(Ordering::Relaxed),
            words_closed: self.words_closed.load(Ordering::Relaxed),
            matches_emitted: self.matches_emitted.load(Ordering::Relaxed),
            activity_dropped: self.activity_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub lines_skipped: usize,
    pub words_closed: usize,
    pub matches_emitted: usize,
    pub activity_dropped: usize,
}

/// All context the pipeline needs, passed as one struct so the thread
/// closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub source: Box<dyn FrameSource>,
    pub classifier: Arc<Classifier>,
    pub stop: StopToken,
    pub match_tx: Sender<MatchEvent>,
    pub activity_tx: Sender<ActivityEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the pipeline until the stop token fires or the source ends.
pub fn run(mut ctx: PipelineContext) -> Result<()> {
    info!(
        threshold = ctx.config.amplitude_threshold,
        max_quiet_frames = ctx.config.max_quiet_frames,
        references = ctx.classifier.dictionary().len(),
        "pipeline started"
    );

    let mut segmenter = ctx.config.segmenter();
    // Independent sequence for activity events.
    let mut activity_seq = 0u64;

    loop {
        // ── 1. Stop token ─────────────────────────────────────────────────
        if ctx.stop.is_stopped() {
            info!("stop requested, ending session");
            break;
        }

        // ── 2. Pull one frame ─────────────────────────────────────────────
        let frame = match ctx.source.next_frame()? {
            Some(frame) => frame,
            None => {
                info!("frame source exhausted");
                break;
            }
        };
        ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        // ── 3. Segment ────────────────────────────────────────────────────
        let closed = segmenter.push(&frame);
        if closed.is_some() {
            ctx.diagnostics.words_closed.fetch_add(1, Ordering::Relaxed);
        }

        // ── 4. Activity event (lossy) ─────────────────────────────────────
        let activity = ActivityEvent {
            seq: activity_seq,
            amplitude: frame.amplitude,
            is_voiced: segmenter.is_voiced(),
        };
        activity_seq = activity_seq.saturating_add(1);
        if ctx.activity_tx.try_send(activity).is_err() {
            ctx.diagnostics
                .activity_dropped
                .fetch_add(1, Ordering::Relaxed);
        }

        // ── 5. Classify a closed word ─────────────────────────────────────
        if let Some(word) = closed {
            let word_match = match ctx.classifier.classify(&word) {
                Ok(m) => m,
                Err(e) => {
                    error!(error = %e, "classification failed, aborting pipeline");
                    return Err(e);
                }
            };

            let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
            info!(
                seq,
                label = word_match.label.as_str(),
                distance = word_match.distance,
                frames = word.len(),
                "word matched"
            );
            let event = MatchEvent::from_match(seq, word.len(), word_match);
            if ctx.match_tx.send(event).is_err() {
                warn!("match channel closed, ending session");
                break;
            }
            ctx.diagnostics
                .matches_emitted
                .fetch_add(1, Ordering::Relaxed);
        }

        // Source-side skip count is a gauge, refreshed as we go.
        ctx.diagnostics
            .lines_skipped
            .store(ctx.source.skipped_lines() as usize, Ordering::Relaxed);
    }

    if segmenter.is_voiced() {
        debug!("partial word buffered at shutdown, discarded");
    }

    ctx.diagnostics
        .lines_skipped
        .store(ctx.source.skipped_lines() as usize, Ordering::Relaxed);
    let snap = ctx.diagnostics.snapshot();
    info!(
        frames_in = snap.frames_in,
        lines_skipped = snap.lines_skipped,
        words_closed = snap.words_closed,
        matches_emitted = snap.matches_emitted,
        activity_dropped = snap.activity_dropped,
        "pipeline stopped, diagnostics"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::{bounded, unbounded, Receiver};

    use crate::dictionary::ReferenceDictionary;
    use crate::error::HarkError;
    use crate::frame::{FeatureFrame, WordSegment};
    use crate::segment::normalize;
    use crate::source::{LineFrameSource, LineProtocol};

    struct ScriptedSource {
        frames: std::vec::IntoIter<FeatureFrame>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<FeatureFrame>) -> Self {
            Self {
                frames: frames.into_iter(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<FeatureFrame>> {
            Ok(self.frames.next())
        }
    }

    /// Yields quiet frames until the test stops the pipeline.
    struct QuietForever;

    impl FrameSource for QuietForever {
        fn next_frame(&mut self) -> Result<Option<FeatureFrame>> {
            thread::sleep(Duration::from_millis(1));
            Ok(Some(FeatureFrame::new(0.0, vec![0.0, 0.0])))
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<FeatureFrame>> {
            Err(HarkError::SerialDevice("wire unplugged".into()))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            amplitude_threshold: 0.01,
            max_quiet_frames: 2,
            feature_lo: 2,
            feature_hi: 4,
        }
    }

    fn dictionary() -> ReferenceDictionary {
        let reference =
            |v: f32, frames: usize| WordSegment::new(vec![normalize(&[v, v]); frames]);
        ReferenceDictionary::from_entries(vec![
            ("one".to_string(), reference(1.0, 3)),
            ("five".to_string(), reference(5.0, 3)),
        ])
    }

    struct TestHarness {
        ctx: PipelineContext,
        matches: Receiver<MatchEvent>,
        activity: Receiver<ActivityEvent>,
        diagnostics: Arc<PipelineDiagnostics>,
        stop: StopToken,
    }

    fn harness(source: Box<dyn FrameSource>, activity_cap: usize) -> TestHarness {
        let (match_tx, matches) = unbounded();
        let (activity_tx, activity) = bounded(activity_cap);
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let stop = StopToken::new();
        let ctx = PipelineContext {
            config: config(),
            source,
            classifier: Arc::new(Classifier::new(dictionary()).unwrap()),
            stop: stop.clone(),
            match_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::clone(&diagnostics),
        };
        TestHarness {
            ctx,
            matches,
            activity,
            diagnostics,
            stop,
        }
    }

    fn word_frames(value: f32, voiced: usize) -> Vec<FeatureFrame> {
        let mut frames = Vec::new();
        for _ in 0..voiced {
            frames.push(FeatureFrame::new(0.5, vec![value, value]));
        }
        for _ in 0..3 {
            frames.push(FeatureFrame::new(0.0, vec![0.0, 0.0]));
        }
        frames
    }

    #[test]
    fn classifies_each_closed_word_in_order() {
        let mut frames = word_frames(1.0, 3);
        frames.extend(word_frames(5.0, 3));
        let h = harness(Box::new(ScriptedSource::new(frames)), 64);

        run(h.ctx).unwrap();

        let events: Vec<_> = h.matches.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].label, "one");
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[0].frames, 3);
        assert_eq!(events[0].distance, 0.0);
        assert_eq!(events[0].scores.len(), 2);
        assert_eq!(events[1].label, "five");
        assert_eq!(events[1].seq, 1);

        let snap = h.diagnostics.snapshot();
        assert_eq!(snap.frames_in, 12);
        assert_eq!(snap.words_closed, 2);
        assert_eq!(snap.matches_emitted, 2);
        assert_eq!(snap.activity_dropped, 0);
    }

    #[test]
    fn activity_events_track_amplitude_and_voicing() {
        let h = harness(Box::new(ScriptedSource::new(word_frames(1.0, 2))), 64);

        run(h.ctx).unwrap();

        let events: Vec<_> = h.activity.try_iter().collect();
        assert_eq!(events.len(), 5);
        assert!((events[0].amplitude - 0.5).abs() < 1e-6);
        assert!(events[0].is_voiced);
        assert!(events[3].is_voiced); // hangover keeps the word open
        assert!(!events[4].is_voiced); // closed on this frame
        let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn activity_overflow_is_dropped_not_blocking() {
        let h = harness(Box::new(ScriptedSource::new(word_frames(1.0, 3))), 1);

        run(h.ctx).unwrap();

        let snap = h.diagnostics.snapshot();
        assert_eq!(snap.frames_in, 6);
        // One slot in the channel, the rest must have been dropped.
        assert_eq!(snap.activity_dropped, 5);
    }

    #[test]
    fn stop_token_ends_an_infinite_source() {
        let h = harness(Box::new(QuietForever), 4);
        let stop = h.stop.clone();
        let diagnostics = Arc::clone(&h.diagnostics);

        let handle = thread::spawn(move || run(h.ctx));
        thread::sleep(Duration::from_millis(20));
        stop.stop();

        let result = handle.join().expect("pipeline thread panicked");
        assert!(result.is_ok());
        assert!(diagnostics.snapshot().frames_in > 0);
    }

    #[test]
    fn transport_errors_propagate() {
        let h = harness(Box::new(FailingSource), 4);

        let err = run(h.ctx).unwrap_err();
        assert!(matches!(err, HarkError::SerialDevice(_)));
        assert_eq!(h.diagnostics.snapshot().frames_in, 0);
    }

    #[test]
    fn dimension_mismatch_aborts_the_pipeline() {
        // Three-dimensional frames against a two-dimensional dictionary.
        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.push(FeatureFrame::new(0.5, vec![1.0, 1.0, 1.0]));
        }
        for _ in 0..3 {
            frames.push(FeatureFrame::new(0.0, vec![0.0, 0.0, 0.0]));
        }
        let h = harness(Box::new(ScriptedSource::new(frames)), 64);

        let err = run(h.ctx).unwrap_err();
        assert!(matches!(err, HarkError::DimensionMismatch { .. }));
        assert_eq!(h.diagnostics.snapshot().matches_emitted, 0);
    }

    #[test]
    fn closed_match_channel_ends_the_session_cleanly() {
        let h = harness(Box::new(ScriptedSource::new(word_frames(1.0, 3))), 64);
        drop(h.matches);

        run(h.ctx).unwrap();
        assert_eq!(h.diagnostics.snapshot().matches_emitted, 0);
    }

    #[test]
    fn skipped_lines_surface_in_diagnostics() {
        let log = "\
            stat: fps:49\n\
            mfcc:0.5 0 1 1\nmfcc:0.5 0 1 1\nmfcc:0.5 0 1 1\n\
            garbage line\n\
            mfcc:0.0 0 0 0\nmfcc:0.0 0 0 0\nmfcc:0.0 0 0 0\n";
        let source = LineFrameSource::new(
            std::io::Cursor::new(log.as_bytes().to_vec()),
            LineProtocol::new(2, 4),
        );
        let h = harness(Box::new(source), 64);

        run(h.ctx).unwrap();

        let snap = h.diagnostics.snapshot();
        assert_eq!(snap.frames_in, 6);
        assert_eq!(snap.lines_skipped, 2);
        assert_eq!(snap.matches_emitted, 1);
    }
}
