//! AutoSkip - episode tracking and skip-segment lifecycle
//!
//! Works out which episode a host player is showing, looks up known
//! intro/recap segments for it, records a short audio sample for fingerprinting
//! when nothing is known yet, and drives a skip control from playback time.
//! The host application (page, media element, UI) sits behind the traits in
//! [`host`], so everything here runs and tests without a browser.

pub mod backend;
pub mod capture;
pub mod config;
pub mod feedback;
pub mod host;
pub mod identity;
pub mod runtime;
pub mod segments;
pub mod session;
pub mod skip;

// Re-export main types for easy access
pub use crate::backend::{HttpSkipBackend, SkipBackend};
pub use crate::capture::{CaptureError, CaptureOutcome, CapturePhase, CaptureScheduler};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::host::{AudioCapture, ControlSurface, HostPage, MediaElement, MediaHandle, PageSnapshot};
pub use crate::identity::{IdentitySource, MediaIdentity};
pub use crate::runtime::{MediaEventKind, SessionEvent, SessionHandle, SessionRuntime, SessionStatus};
pub use crate::segments::{SegmentKind, SegmentStore, SkipSegment};
pub use crate::session::Session;

/// Result type for AutoSkip operations
pub type Result<T> = std::result::Result<T, SkipError>;

/// Error types for AutoSkip operations
#[derive(thiserror::Error, Debug)]
pub enum SkipError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid correction: {0}")]
    InvalidCorrection(String),

    #[error("Segment {0} is verified and cannot be edited")]
    SegmentVerified(String),

    #[error("No segment at index {0}")]
    SegmentNotFound(usize),

    #[error("Session runtime has stopped")]
    RuntimeStopped,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
