//! Reference dictionary built from a labeled corpus.
//!
//! The corpus is a pair of files recorded in one sitting: a labels file with
//! one word per line, and a frame log captured while those words were spoken
//! in the same order. Labels are paired with the segments the log yields
//! positionally. The pairing is zip-like, extra labels or extra segments are
//! dropped, but a count mismatch is loud in the logs because it almost always
//! means a mangled recording session.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::frame::WordSegment;
use crate::segment::WordSegmenter;
use crate::source::{FrameSource, LineProtocol, ReplaySource};

/// Immutable label to reference-segment mapping.
///
/// Entries keep corpus order, which makes classification ties deterministic:
/// the earliest matching entry wins.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDictionary {
    entries: Vec<(String, WordSegment)>,
}

impl ReferenceDictionary {
    /// Build from corpus files on disk.
    pub fn from_corpus(
        labels_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
        protocol: LineProtocol,
        segmenter: WordSegmenter,
    ) -> Result<Self> {
        let labels = BufReader::new(File::open(labels_path.as_ref())?);
        let mut source = ReplaySource::open(log_path.as_ref(), protocol)?;
        Self::from_readers(labels, &mut source, segmenter)
    }

    /// Build from an already-open labels reader and frame source.
    pub fn from_readers(
        labels: impl BufRead,
        source: &mut dyn FrameSource,
        mut segmenter: WordSegmenter,
    ) -> Result<Self> {
        let mut wanted = Vec::new();
        for line in labels.lines() {
            let label = line?.trim().to_string();
            if !label.is_empty() {
                wanted.push(label);
            }
        }

        let mut segments = Vec::new();
        while let Some(frame) = source.next_frame()? {
            if let Some(word) = segmenter.push(&frame) {
                segments.push(word);
            }
        }
        if segmenter.is_voiced() {
            warn!("frame log ended mid-word, partial segment discarded");
        }

        if wanted.len() != segments.len() {
            warn!(
                labels = wanted.len(),
                segments = segments.len(),
                "label and segment counts differ, pairing positionally and dropping the excess"
            );
        }

        let mut dict = Self::default();
        for (label, segment) in wanted.into_iter().zip(segments) {
            dict.insert(label, segment);
        }

        info!(entries = dict.len(), "reference dictionary built");
        Ok(dict)
    }

    /// Build directly from labeled segments, for callers that manage their
    /// own corpus format. Duplicate labels keep the later segment.
    pub fn from_entries(pairs: impl IntoIterator<Item = (String, WordSegment)>) -> Self {
        let mut dict = Self::default();
        for (label, segment) in pairs {
            dict.insert(label, segment);
        }
        dict
    }

    fn insert(&mut self, label: String, segment: WordSegment) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => {
                warn!(label = entry.0.as_str(), "duplicate label, keeping the later recording");
                entry.1 = segment;
            }
            None => self.entries.push((label, segment)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in corpus order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &WordSegment)> {
        self.entries.iter().map(|(label, seg)| (label.as_str(), seg))
    }

    pub fn get(&self, label: &str) -> Option<&WordSegment> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, seg)| seg)
    }

    /// Feature dimension shared by every reference, `None` when empty.
    pub fn feature_dim(&self) -> Option<usize> {
        self.entries.first().map(|(_, seg)| seg.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LineFrameSource;
    use std::io::Cursor;

    /// One voiced word with the given feature tag, followed by enough
    /// silence for the segmenter to close it.
    fn word_lines(tag: u32, voiced: usize) -> String {
        let mut out = String::new();
        for _ in 0..voiced {
            out.push_str(&format!("mfcc:0.5 0 {tag} {tag} {tag} {tag} {tag}\n"));
        }
        for _ in 0..7 {
            out.push_str("mfcc:0.0 0 0 0 0 0 0\n");
        }
        out
    }

    fn build(labels: &str, log: String) -> ReferenceDictionary {
        let mut source =
            LineFrameSource::new(Cursor::new(log.into_bytes()), LineProtocol::new(2, 7));
        ReferenceDictionary::from_readers(
            Cursor::new(labels.as_bytes().to_vec()),
            &mut source,
            WordSegmenter::new(0.01, 5),
        )
        .unwrap()
    }

    #[test]
    fn pairs_labels_with_segments_in_order() {
        let log = format!("{}{}", word_lines(1, 3), word_lines(2, 4));
        let dict = build("a\nb\n", log);

        assert_eq!(dict.len(), 2);
        let entries: Vec<_> = dict.entries().collect();
        assert_eq!(entries[0].0, "a");
        assert_eq!(entries[1].0, "b");
        assert_eq!(entries[0].1.len(), 3);
        assert_eq!(entries[1].1.len(), 4);
    }

    #[test]
    fn excess_labels_are_dropped() {
        let log = format!("{}{}", word_lines(1, 3), word_lines(2, 3));
        let dict = build("a\nb\nc\n", log);
        assert_eq!(dict.len(), 2);
        assert!(dict.get("c").is_none());
    }

    #[test]
    fn excess_segments_are_dropped() {
        let log = format!("{}{}{}", word_lines(1, 3), word_lines(2, 3), word_lines(3, 3));
        let dict = build("only\n", log);
        assert_eq!(dict.len(), 1);
        assert!(dict.get("only").is_some());
    }

    #[test]
    fn duplicate_label_keeps_later_recording() {
        let log = format!("{}{}{}", word_lines(1, 3), word_lines(2, 3), word_lines(3, 6));
        let dict = build("a\nb\na\n", log);

        assert_eq!(dict.len(), 2);
        // "a" was re-recorded as the third utterance, six frames long.
        assert_eq!(dict.get("a").unwrap().len(), 6);
        let order: Vec<_> = dict.entries().map(|(l, _)| l.to_string()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn blank_label_lines_are_skipped() {
        let log = format!("{}{}", word_lines(1, 3), word_lines(2, 3));
        let dict = build("a\n\nb\n", log);
        let order: Vec<_> = dict.entries().map(|(l, _)| l.to_string()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn labels_are_trimmed() {
        let dict = build("  hello \r\n", word_lines(1, 3));
        assert!(dict.get("hello").is_some());
    }

    #[test]
    fn empty_corpus_builds_empty_dictionary() {
        let dict = build("", String::new());
        assert!(dict.is_empty());
        assert_eq!(dict.feature_dim(), None);
    }

    #[test]
    fn feature_dim_comes_from_references() {
        let dict = build("a\n", word_lines(4, 3));
        assert_eq!(dict.feature_dim(), Some(5));
    }

    #[test]
    fn from_entries_preserves_order_and_dedups() {
        let seg = |v: f32| WordSegment::new(vec![vec![v, v]]);
        let dict = ReferenceDictionary::from_entries(vec![
            ("up".to_string(), seg(1.0)),
            ("down".to_string(), seg(2.0)),
            ("up".to_string(), seg(3.0)),
        ]);

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("up").unwrap().frames()[0][0], 3.0);
        let order: Vec<_> = dict.entries().map(|(l, _)| l.to_string()).collect();
        assert_eq!(order, vec!["up", "down"]);
    }
}
