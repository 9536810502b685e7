pub mod http;

pub use http::HttpSkipBackend;

use crate::segments::{SegmentId, SkipSegment};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An encoded audio sample ready for fingerprinting
#[derive(Debug, Clone)]
pub struct AudioSubmission {
    pub audio: Vec<u8>,
    pub media_id: String,
    /// Playback position (whole seconds) at which the sample starts
    pub start_time: f64,
}

/// Result of fingerprint analysis; empty means "stored, no match yet"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub segments: Vec<SkipSegment>,
}

/// Corrected timing for a segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingCorrection {
    pub start_sec: f64,
    pub end_sec: f64,
}

/// Skip segment backend
#[async_trait]
pub trait SkipBackend: Send + Sync {
    /// Liveness check; `true` when the backend answers "pong"
    async fn ping(&self) -> Result<bool>;

    /// Known segments for a media identifier. `Ok(None)` when the backend
    /// answered with a non-success status (treated as "no data").
    async fn lookup(&self, media_id: &str) -> Result<Option<Vec<SkipSegment>>>;

    async fn analyze_audio(&self, submission: AudioSubmission) -> Result<AnalysisResult>;

    /// Submit a timing correction; returns the server-confirmed segment
    async fn update_segment(&self, id: &SegmentId, correction: TimingCorrection) -> Result<SkipSegment>;
}
