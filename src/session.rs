//! Per-player session context
//!
//! Holds everything that belongs to the episode currently playing. A
//! confirmed episode change wipes all of it before the new identity is
//! staged, and bumps the identity token so late async results for the old
//! episode can be recognised and dropped.

use crate::capture::CaptureScheduler;
use crate::config::Config;
use crate::identity::MediaIdentity;
use crate::segments::{SegmentOrigin, SegmentStore, SkipSegment};
use crate::skip::SkipEvaluator;
use tracing::info;

/// Marks which identity an async operation was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityToken(u64);

#[derive(Debug)]
pub struct Session {
    identity: Option<MediaIdentity>,
    media_identifier: Option<String>,
    generation: u64,
    has_checked_for_skips: bool,
    lookup_waiting_for_show_start: bool,
    segments: SegmentStore,
    capture: CaptureScheduler,
    skip: SkipEvaluator,
    feedback_entry_shown: bool,
    server_reachable: bool,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            identity: None,
            media_identifier: None,
            generation: 0,
            has_checked_for_skips: false,
            lookup_waiting_for_show_start: false,
            segments: SegmentStore::new(),
            capture: CaptureScheduler::new(config.capture.clone()),
            skip: SkipEvaluator::new(&config.skip),
            feedback_entry_shown: false,
            server_reachable: false,
        }
    }

    /// Clear every per-episode field
    pub fn reset(&mut self) {
        info!("🧹 Clearing episode state");
        self.identity = None;
        self.media_identifier = None;
        self.generation += 1;
        self.has_checked_for_skips = false;
        self.lookup_waiting_for_show_start = false;
        self.segments.clear();
        self.capture.reset();
        self.skip.reset();
        self.feedback_entry_shown = false;
    }

    /// Reset, then make `identity` current
    pub fn change_identity(&mut self, identity: MediaIdentity) {
        self.reset();
        self.media_identifier = identity.media_identifier();
        self.identity = Some(identity);
    }

    pub fn identity(&self) -> Option<&MediaIdentity> {
        self.identity.as_ref()
    }

    pub fn media_identifier(&self) -> Option<&str> {
        self.media_identifier.as_deref()
    }

    pub fn has_complete_identity(&self) -> bool {
        self.identity.as_ref().is_some_and(MediaIdentity::is_complete)
    }

    pub fn token(&self) -> IdentityToken {
        IdentityToken(self.generation)
    }

    pub fn is_current(&self, token: IdentityToken) -> bool {
        token.0 == self.generation
    }

    pub fn has_checked_for_skips(&self) -> bool {
        self.has_checked_for_skips
    }

    /// Claim the single lookup for this identity. `false` if already claimed.
    pub fn claim_lookup(&mut self) -> bool {
        if self.has_checked_for_skips {
            return false;
        }
        self.has_checked_for_skips = true;
        self.lookup_waiting_for_show_start = false;
        self.capture.begin_lookup();
        true
    }

    pub fn lookup_waiting_for_show_start(&self) -> bool {
        self.lookup_waiting_for_show_start
    }

    pub fn set_lookup_waiting_for_show_start(&mut self, waiting: bool) {
        self.lookup_waiting_for_show_start = waiting;
    }

    pub fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut SegmentStore {
        &mut self.segments
    }

    pub fn install_segments(&mut self, origin: SegmentOrigin, segments: Vec<SkipSegment>) {
        self.segments.replace(origin, segments);
    }

    pub fn capture(&self) -> &CaptureScheduler {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut CaptureScheduler {
        &mut self.capture
    }

    pub fn skip(&self) -> &SkipEvaluator {
        &self.skip
    }

    /// Segments and skip evaluator together, for time updates
    pub fn skip_parts(&mut self) -> (&SegmentStore, &mut SkipEvaluator) {
        (&self.segments, &mut self.skip)
    }

    pub fn feedback_entry_shown(&self) -> bool {
        self.feedback_entry_shown
    }

    pub fn set_feedback_entry_shown(&mut self, shown: bool) {
        self.feedback_entry_shown = shown;
    }

    pub fn server_reachable(&self) -> bool {
        self.server_reachable
    }

    pub fn set_server_reachable(&mut self, reachable: bool) {
        self.server_reachable = reachable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CapturePhase, MediaState};
    use crate::identity::IdentitySource;
    use crate::segments::{SegmentId, SegmentKind};
    use tokio::time::Instant;

    fn identity(episode: &str) -> MediaIdentity {
        MediaIdentity::new("tt123", Some(episode.to_string()), IdentitySource::BackgroundUrl)
    }

    fn segment() -> SkipSegment {
        SkipSegment {
            id: SegmentId::Number(1),
            kind: SegmentKind::Intro,
            start_sec: 5.0,
            end_sec: 50.0,
            verified: false,
            votes: 0,
        }
    }

    #[test]
    fn test_change_identity_clears_previous_episode() {
        let mut session = Session::new(&Config::default());
        session.change_identity(identity("1_1"));
        let first_token = session.token();

        assert!(session.claim_lookup());
        assert!(!session.claim_lookup());
        session.capture_mut().lookup_finished(false);
        session.capture_mut().schedule(
            Instant::now(),
            Some(&MediaState { current_time: 4.0, paused: false, seeking: false, ready_state: 4 }),
        );
        session.install_segments(SegmentOrigin::Analysis, vec![segment()]);
        {
            let (segments, skip) = session.skip_parts();
            skip.evaluate(segments.segments(), 10.0);
        }
        session.set_feedback_entry_shown(true);

        session.change_identity(identity("1_2"));

        assert_eq!(session.media_identifier(), Some("tt123_1_2"));
        assert!(!session.has_checked_for_skips());
        assert!(session.segments().is_empty());
        assert_eq!(session.capture().phase(), CapturePhase::Idle);
        assert!(!session.capture().should_record());
        assert_eq!(session.skip().shown(), None);
        assert!(!session.feedback_entry_shown());
        assert!(!session.is_current(first_token));
        assert!(session.is_current(session.token()));
    }

    #[test]
    fn test_degraded_identity_is_not_complete() {
        let mut session = Session::new(&Config::default());
        session.change_identity(MediaIdentity::new("tt9", None, IdentitySource::SeriesNameElement));
        assert_eq!(session.media_identifier(), Some("tt9"));
        assert!(!session.has_complete_identity());
    }
}
