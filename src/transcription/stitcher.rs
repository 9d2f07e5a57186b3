//! Stitching of recognizer output into client events.
//!
//! Incremental decoders sometimes re-estimate the start of a finalized span
//! slightly before the end of the previous one. Final events are clamped so
//! their start never precedes the last emitted end, and their end never
//! precedes their own start.

use super::{RecognizedSegment, TranscriptionEvent};

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round().max(0.0) as u64
}

#[derive(Debug, Default)]
pub struct TranscriptStitcher {
    last_end_ms: Option<u64>,
}

impl TranscriptStitcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// End of the last final event, if any was emitted since the last reset.
    pub fn last_end_ms(&self) -> Option<u64> {
        self.last_end_ms
    }

    /// Forget the stored end time. Only an explicit session reset does this.
    pub fn reset(&mut self) {
        self.last_end_ms = None;
    }

    pub fn stitch(&mut self, segment: &RecognizedSegment) -> Option<TranscriptionEvent> {
        let text = segment.text().trim();
        if text.is_empty() {
            return None;
        }

        match segment {
            RecognizedSegment::Final { start, end, .. } => {
                let mut start_ms = seconds_to_ms(*start);
                if let Some(last_end) = self.last_end_ms {
                    start_ms = start_ms.max(last_end);
                }
                let end_ms = seconds_to_ms(*end).max(start_ms);
                self.last_end_ms = Some(end_ms);

                Some(TranscriptionEvent {
                    text: text.to_string(),
                    start_ms,
                    end_ms,
                    is_final: true,
                })
            }
            RecognizedSegment::Partial { .. } => Some(TranscriptionEvent {
                text: text.to_string(),
                start_ms: 0,
                end_ms: 0,
                is_final: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn final_segment(start: f64, end: f64, text: &str) -> RecognizedSegment {
        RecognizedSegment::Final {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_overlapping_start_is_clamped() {
        let mut stitcher = TranscriptStitcher::new();

        let first = stitcher.stitch(&final_segment(2.0, 3.5, "hello")).unwrap();
        assert_eq!((first.start_ms, first.end_ms, first.is_final), (2000, 3500, true));

        let second = stitcher.stitch(&final_segment(3.2, 4.0, "world")).unwrap();
        assert_eq!((second.start_ms, second.end_ms, second.is_final), (3500, 4000, true));
        assert_eq!(second.text, "world");
    }

    #[test]
    fn test_partial_leaves_stored_end() {
        let mut stitcher = TranscriptStitcher::new();
        stitcher.stitch(&final_segment(0.0, 1.0, "one"));

        let partial = stitcher
            .stitch(&RecognizedSegment::Partial {
                text: "partial text".to_string(),
            })
            .unwrap();
        assert_eq!(partial.start_ms, 0);
        assert_eq!(partial.end_ms, 0);
        assert!(!partial.is_final);
        assert_eq!(stitcher.last_end_ms(), Some(1000));
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        let mut stitcher = TranscriptStitcher::new();
        assert!(stitcher.stitch(&final_segment(0.0, 1.0, "   ")).is_none());
        assert!(stitcher
            .stitch(&RecognizedSegment::Partial { text: String::new() })
            .is_none());
        assert_eq!(stitcher.last_end_ms(), None);
    }

    #[test]
    fn test_text_is_trimmed() {
        let mut stitcher = TranscriptStitcher::new();
        let event = stitcher.stitch(&final_segment(0.0, 0.5, "  And so ")).unwrap();
        assert_eq!(event.text, "And so");
    }

    #[test]
    fn test_final_timeline_is_monotonic() {
        let mut stitcher = TranscriptStitcher::new();
        let segments = [
            final_segment(0.0, 1.2, "a"),
            final_segment(1.0, 2.4, "b"),
            final_segment(0.5, 3.0, "c"),
            final_segment(2.0, 2.5, "d"),
            final_segment(3.0, 3.6, "e"),
        ];

        let mut previous_end = 0;
        for segment in &segments {
            let event = stitcher.stitch(segment).unwrap();
            assert!(event.start_ms >= previous_end);
            assert!(event.end_ms >= previous_end);
            previous_end = event.end_ms;
        }
    }

    #[test]
    fn test_reset_forgets_last_end() {
        let mut stitcher = TranscriptStitcher::new();
        stitcher.stitch(&final_segment(5.0, 6.0, "late"));
        stitcher.reset();

        let event = stitcher.stitch(&final_segment(0.2, 0.8, "early")).unwrap();
        assert_eq!(event.start_ms, 200);
    }
}
