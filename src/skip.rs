//! Playback-time evaluation of skip windows and the skip action

use crate::config::SkipConfig;
use crate::segments::SkipSegment;

/// Change to apply to the skip control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipUpdate {
    Unchanged,
    /// Show the action for the segment at this index
    Show(usize),
    Hide,
}

/// Tracks which segment, if any, the skip action is currently offered for
#[derive(Debug, Clone)]
pub struct SkipEvaluator {
    lead_in_secs: f64,
    seek_past_secs: f64,
    shown: Option<usize>,
}

impl SkipEvaluator {
    pub fn new(config: &SkipConfig) -> Self {
        Self {
            lead_in_secs: config.lead_in_secs,
            seek_past_secs: config.seek_past_secs,
            shown: None,
        }
    }

    pub fn shown(&self) -> Option<usize> {
        self.shown
    }

    pub fn reset(&mut self) {
        self.shown = None;
    }

    /// Evaluate a playback time against every segment window
    pub fn evaluate(&mut self, segments: &[SkipSegment], time: f64) -> SkipUpdate {
        let active = segments
            .iter()
            .position(|segment| segment.contains(time, self.lead_in_secs));

        match (active, self.shown) {
            (Some(index), Some(shown)) if index == shown => SkipUpdate::Unchanged,
            (Some(index), _) => {
                self.shown = Some(index);
                SkipUpdate::Show(index)
            }
            (None, Some(_)) => self.hide(),
            (None, None) => SkipUpdate::Unchanged,
        }
    }

    /// The media element left the document or there is nothing to offer
    pub fn hide(&mut self) -> SkipUpdate {
        match self.shown.take() {
            Some(_) => SkipUpdate::Hide,
            None => SkipUpdate::Unchanged,
        }
    }

    /// The user pressed skip: returns where to seek and dismisses the action
    pub fn activate(&mut self, segments: &[SkipSegment]) -> Option<f64> {
        let index = self.shown.take()?;
        segments
            .get(index)
            .map(|segment| segment.end_sec + self.seek_past_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{SegmentId, SegmentKind};

    fn segment(id: i64, start: f64, end: f64) -> SkipSegment {
        SkipSegment {
            id: SegmentId::Number(id),
            kind: SegmentKind::Intro,
            start_sec: start,
            end_sec: end,
            verified: false,
            votes: 1,
        }
    }

    #[test]
    fn test_visibility_around_window_edges() {
        let segments = vec![segment(1, 120.0, 150.0)];
        let mut evaluator = SkipEvaluator::new(&SkipConfig::default());

        assert_eq!(evaluator.evaluate(&segments, 117.9), SkipUpdate::Unchanged);
        assert_eq!(evaluator.evaluate(&segments, 118.0), SkipUpdate::Show(0));
        assert_eq!(evaluator.evaluate(&segments, 130.0), SkipUpdate::Unchanged);
        assert_eq!(evaluator.evaluate(&segments, 150.0), SkipUpdate::Unchanged);
        assert_eq!(evaluator.shown(), Some(0));
        assert_eq!(evaluator.evaluate(&segments, 150.1), SkipUpdate::Hide);
        assert_eq!(evaluator.evaluate(&segments, 151.0), SkipUpdate::Unchanged);
        assert_eq!(evaluator.shown(), None);
    }

    #[test]
    fn test_activate_seeks_past_end_and_dismisses() {
        let segments = vec![segment(1, 0.0, 45.0), segment(2, 600.0, 640.0)];
        let mut evaluator = SkipEvaluator::new(&SkipConfig::default());

        assert_eq!(evaluator.activate(&segments), None);
        assert_eq!(evaluator.evaluate(&segments, 605.0), SkipUpdate::Show(1));
        assert_eq!(evaluator.activate(&segments), Some(641.0));
        assert_eq!(evaluator.shown(), None);
    }

    #[test]
    fn test_moving_between_windows_switches_segment() {
        let segments = vec![segment(1, 10.0, 30.0), segment(2, 31.0, 60.0)];
        let mut evaluator = SkipEvaluator::new(&SkipConfig::default());

        assert_eq!(evaluator.evaluate(&segments, 20.0), SkipUpdate::Show(0));
        assert_eq!(evaluator.evaluate(&segments, 30.5), SkipUpdate::Show(1));
    }

    #[test]
    fn test_hide_is_idempotent() {
        let segments = vec![segment(1, 10.0, 30.0)];
        let mut evaluator = SkipEvaluator::new(&SkipConfig::default());
        assert_eq!(evaluator.hide(), SkipUpdate::Unchanged);
        evaluator.evaluate(&segments, 12.0);
        assert_eq!(evaluator.hide(), SkipUpdate::Hide);
        assert_eq!(evaluator.hide(), SkipUpdate::Unchanged);
    }
}
