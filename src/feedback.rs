//! User corrections of segment timing

use crate::backend::{SkipBackend, TimingCorrection};
use crate::segments::{SegmentId, SegmentStore, SkipSegment};
use crate::{Result, SkipError};
use tracing::{info, warn};

pub const NO_SEGMENTS_MESSAGE: &str = "No skip segments detected for this episode.";
pub const UPDATED_MESSAGE: &str = "Skip timing updated successfully";
pub const UPDATE_FAILED_MESSAGE: &str = "Failed to update timing. Please try again.";

/// A validated correction aimed at one slot of the segment store
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRequest {
    pub index: usize,
    pub segment_id: SegmentId,
    pub correction: TimingCorrection,
}

/// Local checks done before anything goes to the backend
pub fn validate_timing(start_sec: f64, end_sec: f64) -> Result<TimingCorrection> {
    if !start_sec.is_finite() || !end_sec.is_finite() {
        return Err(SkipError::InvalidCorrection("Times must be numbers!".to_string()));
    }
    if start_sec >= end_sec {
        return Err(SkipError::InvalidCorrection(
            "Start time must be before end time!".to_string(),
        ));
    }
    if start_sec < 0.0 || end_sec < 0.0 {
        return Err(SkipError::InvalidCorrection("Times must be positive!".to_string()));
    }
    Ok(TimingCorrection { start_sec, end_sec })
}

/// Build a correction for the segment at `index`. Verified segments are
/// read-only.
pub fn prepare_correction(
    store: &SegmentStore,
    index: usize,
    start_sec: f64,
    end_sec: f64,
) -> Result<CorrectionRequest> {
    let segment = store.get(index).ok_or(SkipError::SegmentNotFound(index))?;
    if segment.verified {
        return Err(SkipError::SegmentVerified(segment.id.to_string()));
    }
    let correction = validate_timing(start_sec, end_sec)?;

    Ok(CorrectionRequest {
        index,
        segment_id: segment.id.clone(),
        correction,
    })
}

pub async fn submit_correction(
    backend: &dyn SkipBackend,
    request: &CorrectionRequest,
) -> Result<SkipSegment> {
    info!(
        "✏️ Submitting correction for segment {}: {}s → {}s",
        request.segment_id, request.correction.start_sec, request.correction.end_sec
    );
    let updated = backend
        .update_segment(&request.segment_id, request.correction)
        .await?;
    info!("✅ Updated segment: {:?}", updated);
    Ok(updated)
}

/// Install the server-confirmed segment. No optimistic changes are made
/// before this point.
pub fn apply_correction(store: &mut SegmentStore, index: usize, updated: SkipSegment) -> Result<()> {
    store.patch(index, updated).map_err(|e| {
        warn!("Correction no longer matches segment at index {}", index);
        e
    })
}

/// Text shown to the user when a correction fails
pub fn failure_message(error: &SkipError) -> String {
    match error {
        SkipError::InvalidCorrection(message) => message.clone(),
        SkipError::Backend { message, .. } if !message.trim().is_empty() => message.clone(),
        SkipError::SegmentVerified(_) => "This segment is verified and cannot be edited.".to_string(),
        _ => UPDATE_FAILED_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnalysisResult, AudioSubmission};
    use crate::segments::{SegmentKind, SegmentOrigin};
    use async_trait::async_trait;

    /// Backend that only answers corrections
    struct CorrectionBackend {
        reject_with: Option<String>,
    }

    #[async_trait]
    impl SkipBackend for CorrectionBackend {
        async fn ping(&self) -> Result<bool> {
            Ok(true)
        }

        async fn lookup(&self, _media_id: &str) -> Result<Option<Vec<SkipSegment>>> {
            Ok(None)
        }

        async fn analyze_audio(&self, _submission: AudioSubmission) -> Result<AnalysisResult> {
            Ok(AnalysisResult::default())
        }

        async fn update_segment(&self, id: &SegmentId, correction: TimingCorrection) -> Result<SkipSegment> {
            if let Some(message) = &self.reject_with {
                return Err(SkipError::Backend { status: 400, message: message.clone() });
            }
            Ok(SkipSegment {
                id: id.clone(),
                kind: SegmentKind::Intro,
                start_sec: correction.start_sec,
                end_sec: correction.end_sec,
                verified: false,
                votes: 3,
            })
        }
    }

    fn store() -> SegmentStore {
        let mut store = SegmentStore::new();
        store.replace(
            SegmentOrigin::Lookup,
            vec![
                SkipSegment {
                    id: SegmentId::Number(1),
                    kind: SegmentKind::Intro,
                    start_sec: 10.0,
                    end_sec: 70.0,
                    verified: false,
                    votes: 2,
                },
                SkipSegment {
                    id: SegmentId::Number(2),
                    kind: SegmentKind::Credits,
                    start_sec: 1300.0,
                    end_sec: 1380.0,
                    verified: true,
                    votes: 12,
                },
            ],
        );
        store
    }

    #[test]
    fn test_validate_timing() {
        assert!(matches!(validate_timing(50.0, 40.0), Err(SkipError::InvalidCorrection(_))));
        assert!(matches!(validate_timing(40.0, 40.0), Err(SkipError::InvalidCorrection(_))));
        assert!(matches!(validate_timing(-5.0, 40.0), Err(SkipError::InvalidCorrection(_))));
        assert!(matches!(validate_timing(f64::NAN, 40.0), Err(SkipError::InvalidCorrection(_))));
        assert_eq!(
            validate_timing(0.0, 40.0).unwrap(),
            TimingCorrection { start_sec: 0.0, end_sec: 40.0 }
        );
    }

    #[test]
    fn test_prepare_correction_guards() {
        let store = store();
        let request = prepare_correction(&store, 0, 12.0, 68.0).unwrap();
        assert_eq!(request.segment_id, SegmentId::Number(1));

        assert!(matches!(prepare_correction(&store, 1, 1.0, 2.0), Err(SkipError::SegmentVerified(_))));
        assert!(matches!(prepare_correction(&store, 9, 1.0, 2.0), Err(SkipError::SegmentNotFound(9))));
    }

    #[test]
    fn test_failure_messages() {
        let backend = SkipError::Backend { status: 409, message: "Segment locked".to_string() };
        assert_eq!(failure_message(&backend), "Segment locked");

        let empty = SkipError::Backend { status: 500, message: String::new() };
        assert_eq!(failure_message(&empty), UPDATE_FAILED_MESSAGE);

        let invalid = validate_timing(50.0, 40.0).unwrap_err();
        assert_eq!(failure_message(&invalid), "Start time must be before end time!");
    }

    #[test]
    fn test_confirmed_correction_replaces_slot() {
        let mut store = store();
        let request = prepare_correction(&store, 0, 12.0, 68.0).unwrap();
        let backend = CorrectionBackend { reject_with: None };

        let updated = tokio_test::block_on(submit_correction(&backend, &request)).unwrap();
        apply_correction(&mut store, 0, updated).unwrap();

        let segment = store.get(0).unwrap();
        assert_eq!((segment.start_sec, segment.end_sec), (12.0, 68.0));
        assert_eq!(segment.votes, 3);
    }

    #[test]
    fn test_rejected_correction_leaves_store_untouched() {
        let store = store();
        let request = prepare_correction(&store, 0, 12.0, 68.0).unwrap();
        let backend = CorrectionBackend { reject_with: Some("Segment locked".to_string()) };

        let error = tokio_test::block_on(submit_correction(&backend, &request)).unwrap_err();
        assert_eq!(failure_message(&error), "Segment locked");
        assert_eq!(store.get(0).unwrap().start_sec, 10.0);
    }
}
