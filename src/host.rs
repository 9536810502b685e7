//! Host application boundary
//!
//! The page, its media element, the audio pipeline and the on-screen controls
//! are owned by the host player. The session only talks to them through these
//! traits, so a browser binding, a desktop player or a test fake can drive it.

use crate::capture::CaptureError;
use crate::segments::SkipSegment;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time view of the page signals used for episode detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSnapshot {
    /// Resource-load log, oldest first
    pub resource_urls: Vec<String>,
    /// On-screen episode title text, if the element exists
    pub episode_title: Option<String>,
    /// Show identifier carried by the series-name element, if present
    pub series_show_id: Option<String>,
}

/// Read access to the host page
pub trait HostPage: Send + Sync {
    /// Current detection signals
    fn snapshot(&self) -> PageSnapshot;

    /// The playable media element currently in the document, if any
    fn find_media(&self) -> Option<Arc<dyn MediaElement>>;
}

/// Identity of a concrete media element instance. A replaced element gets a
/// new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub u64);

/// A playable media element
pub trait MediaElement: Send + Sync {
    fn handle(&self) -> MediaHandle;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn is_seeking(&self) -> bool;

    /// HTML-style ready state (0..=4)
    fn ready_state(&self) -> u8;

    /// Whether the element is still attached to the document
    fn is_attached(&self) -> bool;

    fn seek(&self, time: f64);

    /// Open an audio pipeline from this element, chunked every `timeslice`.
    /// Fails with [`CaptureError::AlreadyBound`] if the element's audio has
    /// already been routed elsewhere.
    fn open_capture(&self, timeslice: Duration) -> Result<Box<dyn AudioCapture>, CaptureError>;
}

/// A running audio recording
#[async_trait]
pub trait AudioCapture: Send {
    /// Next encoded chunk; `None` once the stream has ended.
    ///
    /// The recorder keeps each returned future alive until it resolves, so
    /// implementations need not be cancel safe. A future is only dropped
    /// unfinished right before [`AudioCapture::stop`] is called.
    async fn next_chunk(&mut self) -> Option<Vec<u8>>;

    /// Stop recording, returning any final flushed data. The pipeline is
    /// released once the capture is dropped.
    async fn stop(&mut self) -> Option<Vec<u8>>;
}

/// The small UI surface the session drives
pub trait ControlSurface: Send + Sync {
    /// Show the skip action for `segment`
    fn show_skip(&self, segment: &SkipSegment);

    fn hide_skip(&self);

    /// Add the feedback entry control to the player's control bar. Returns
    /// `false` when the host has no container for it.
    fn show_feedback_entry(&self) -> bool;

    fn hide_feedback_entry(&self);

    /// Present the correction editor for the current segments
    fn show_feedback_editor(&self, segments: &[SkipSegment]);

    /// User-visible notice (success or error)
    fn notify(&self, message: &str);
}
