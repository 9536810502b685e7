//! Audio capture for fingerprinting
//!
//! The scheduler decides whether and when a capture may run; the recorder
//! runs one capture, tracks chunk quality and decides whether the sample is
//! worth submitting.

pub mod recorder;
pub mod scheduler;

pub use recorder::{
    quality_check, record, CaptureAttempt, CaptureOutcome, CapturedSample, ChunkSignal,
    QualityFailure, StopReason,
};
pub use scheduler::{CapturePhase, CaptureScheduler, MediaState, NotReady, Refusal, ScheduleDecision};

/// Failures opening the audio pipeline
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The element's audio is already routed into a pipeline
    #[error("audio pipeline already bound to this media element")]
    AlreadyBound,

    #[error("audio pipeline error: {0}")]
    Pipeline(String),
}
