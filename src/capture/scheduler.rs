//! Capture scheduling state machine
//!
//! `Idle → AwaitingLookup → (ScheduledWait | Recording) → Idle`, one machine
//! per episode. Only one wait or recording may be in flight at a time.

use crate::config::CapturePolicy;
use crate::host::MediaElement;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    AwaitingLookup,
    ScheduledWait,
    Recording,
}

/// The media element fields the scheduler looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    pub current_time: f64,
    pub paused: bool,
    pub seeking: bool,
    pub ready_state: u8,
}

impl MediaState {
    pub fn of(media: &dyn MediaElement) -> Self {
        Self {
            current_time: media.current_time(),
            paused: media.is_paused(),
            seeking: media.is_seeking(),
            ready_state: media.ready_state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Refusal {
    /// Nothing to record for this episode
    NotNeeded,
    /// A wait or recording is already in flight
    InFlight,
    NoMedia,
    CoolingDown(Duration),
    /// Playback already past the window; given up for this episode
    TooLate(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleDecision {
    /// Check readiness again after this delay
    Wait(Duration),
    Refused(Refusal),
}

/// Why a scheduled check did not start a recording
#[derive(Debug, Clone, PartialEq)]
pub enum NotReady {
    NotWaiting,
    Paused,
    Seeking,
    OutsideWindow(f64),
    Buffering(u8),
}

#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    policy: CapturePolicy,
    phase: CapturePhase,
    should_record: bool,
    retry_after: Option<Instant>,
}

impl CaptureScheduler {
    pub fn new(policy: CapturePolicy) -> Self {
        Self {
            policy,
            phase: CapturePhase::Idle,
            should_record: false,
            retry_after: None,
        }
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn should_record(&self) -> bool {
        self.should_record
    }

    /// A wait or recording holds the capture slot
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, CapturePhase::ScheduledWait | CapturePhase::Recording)
    }

    pub fn is_recording(&self) -> bool {
        self.phase == CapturePhase::Recording
    }

    pub fn retry_after(&self) -> Option<Instant> {
        self.retry_after
    }

    /// Forget everything about the previous episode
    pub fn reset(&mut self) {
        self.phase = CapturePhase::Idle;
        self.should_record = false;
        self.retry_after = None;
    }

    pub fn begin_lookup(&mut self) {
        if self.phase == CapturePhase::Idle {
            self.phase = CapturePhase::AwaitingLookup;
        }
    }

    /// Lookup answered. No segments (or no answer) means we need a sample.
    pub fn lookup_finished(&mut self, found_segments: bool) {
        if self.phase == CapturePhase::AwaitingLookup {
            self.phase = CapturePhase::Idle;
        }
        self.should_record = !found_segments;
    }

    pub fn schedule(&mut self, now: Instant, media: Option<&MediaState>) -> ScheduleDecision {
        if !self.should_record {
            return ScheduleDecision::Refused(Refusal::NotNeeded);
        }
        if self.is_busy() {
            debug!("Cannot schedule - capture already in flight");
            return ScheduleDecision::Refused(Refusal::InFlight);
        }
        let Some(media) = media else {
            debug!("Cannot schedule - no media element");
            return ScheduleDecision::Refused(Refusal::NoMedia);
        };
        if let Some(retry_after) = self.retry_after {
            if now < retry_after {
                debug!("Too soon since last capture attempt");
                return ScheduleDecision::Refused(Refusal::CoolingDown(retry_after - now));
            }
        }

        let time = media.current_time;
        if time >= self.policy.max_start_secs {
            info!(
                "⏭️ Playback at {:.1}s is past the {}s mark, too late to record",
                time, self.policy.max_start_secs
            );
            self.should_record = false;
            return ScheduleDecision::Refused(Refusal::TooLate(time));
        }

        let wait = if time < self.policy.min_start_secs {
            let secs = self.policy.min_start_secs - time + self.policy.start_margin_secs;
            info!("⏳ Playback at {:.1}s, waiting {:.1}s until the show starts", time, secs);
            Duration::from_secs_f64(secs)
        } else {
            debug!("Playback inside capture window, starting shortly");
            Duration::from_secs_f64(self.policy.start_delay_secs)
        };

        self.phase = CapturePhase::ScheduledWait;
        ScheduleDecision::Wait(wait)
    }

    /// The deferred check fired. On `Ok` the caller must start recording.
    pub fn check_ready(&mut self, media: &MediaState) -> Result<(), NotReady> {
        if self.phase != CapturePhase::ScheduledWait {
            return Err(NotReady::NotWaiting);
        }

        let verdict = if media.paused {
            Err(NotReady::Paused)
        } else if media.seeking {
            Err(NotReady::Seeking)
        } else if media.current_time < self.policy.min_start_secs
            || media.current_time >= self.policy.max_start_secs
        {
            Err(NotReady::OutsideWindow(media.current_time))
        } else if media.ready_state < self.policy.min_ready_state {
            Err(NotReady::Buffering(media.ready_state))
        } else {
            Ok(())
        };

        if verdict.is_err() {
            self.phase = CapturePhase::Idle;
        }
        verdict
    }

    /// Drop a pending wait without checking the media (e.g. element gone)
    pub fn cancel_wait(&mut self) {
        if self.phase == CapturePhase::ScheduledWait {
            self.phase = CapturePhase::Idle;
        }
    }

    /// Recording began; the cool-down runs from here
    pub fn start_recording(&mut self, now: Instant) {
        self.phase = CapturePhase::Recording;
        self.retry_after = Some(now + self.policy.cooldown());
    }

    /// The pipeline is held by someone else: treat as in progress and stop
    /// trying for this episode
    pub fn capability_failed(&mut self) {
        self.phase = CapturePhase::Idle;
        self.should_record = false;
    }

    /// Sample discarded by the quality gate; retry after the shorter penalty
    pub fn recording_failed(&mut self, now: Instant) {
        self.phase = CapturePhase::Idle;
        self.retry_after = Some(now + self.policy.failure_cooldown());
    }

    /// Analysis of a submitted sample finished
    pub fn analysis_finished(&mut self, found_segments: bool) {
        self.phase = CapturePhase::Idle;
        if found_segments {
            self.should_record = false;
        }
    }
}
