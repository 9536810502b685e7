//! Session runtime
//!
//! One tokio task owns the [`Session`] and handles every trigger, timer and
//! network completion in order. Handlers never await: slow work (lookups,
//! recordings, uploads, debounce timers) is spawned and reports back through
//! the same queue, tagged with the identity token it was started for. A
//! completion whose token no longer matches the session is dropped.
//!
//! The runtime also binds the media element: it polls the host until one is
//! found, and only accepts media events from the bound element.

use crate::backend::{AudioSubmission, SkipBackend};
use crate::capture::{
    record, CaptureError, CaptureOutcome, CapturePhase, MediaState, ScheduleDecision,
};
use crate::config::Config;
use crate::feedback::{
    apply_correction, failure_message, prepare_correction, submit_correction,
    CorrectionRequest, NO_SEGMENTS_MESSAGE, UPDATED_MESSAGE,
};
use crate::host::{ControlSurface, HostPage, MediaElement, MediaHandle};
use crate::identity::{EpisodeTracker, MediaIdentity, Trigger, TriggerAction};
use crate::segments::{SegmentOrigin, SkipSegment};
use crate::session::{IdentityToken, Session};
use crate::skip::SkipUpdate;
use crate::{Result, SkipError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_QUEUE_SIZE: usize = 256;

/// Media element events forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEventKind {
    TimeUpdate,
    Playing,
    Waiting,
    Stalled,
}

/// Events the host delivers to a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Text of the episode title element changed
    TitleMutated(String),
    /// A resource finished loading
    ResourceLoaded(String),
    /// Identity fallback poll
    PollTick,
    /// Look for a media element to bind
    MediaPoll,
    Media { handle: MediaHandle, kind: MediaEventKind },
    SkipClicked,
    OpenFeedback,
    SubmitCorrection { index: usize, start_sec: f64, end_sec: f64 },
    Shutdown,
}

/// Read-only view of the session, mostly for diagnostics
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub identity: Option<MediaIdentity>,
    pub media_identifier: Option<String>,
    pub phase: CapturePhase,
    pub should_record: bool,
    pub has_checked_for_skips: bool,
    pub segments: Vec<SkipSegment>,
    pub skip_shown: Option<usize>,
    pub feedback_entry_shown: bool,
    pub server_reachable: bool,
    pub bound_media: Option<MediaHandle>,
    /// A recording (possibly for a previous episode) still holds the audio
    /// pipeline
    pub pipeline_held: bool,
}

#[derive(Debug)]
enum Message {
    Event(SessionEvent),
    PingCompleted(bool),
    /// A debounced re-detection is due
    Redetect,
    LookupCompleted {
        token: IdentityToken,
        segments: Option<Vec<SkipSegment>>,
    },
    CaptureCheck {
        token: IdentityToken,
    },
    CaptureFinished {
        token: IdentityToken,
        outcome: CaptureOutcome,
    },
    AnalysisCompleted {
        token: IdentityToken,
        segments: Vec<SkipSegment>,
    },
    CorrectionCompleted {
        token: IdentityToken,
        request: CorrectionRequest,
        result: Result<SkipSegment>,
    },
    Inspect(oneshot::Sender<SessionStatus>),
}

/// The recording that currently holds the media element's audio pipeline
#[derive(Debug)]
struct ActiveRecording {
    token: IdentityToken,
    stop: Option<oneshot::Sender<()>>,
}

/// Cheap, cloneable sender for a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Message>,
}

impl SessionHandle {
    pub async fn send(&self, event: SessionEvent) -> Result<()> {
        self.tx
            .send(Message::Event(event))
            .await
            .map_err(|_| SkipError::RuntimeStopped)
    }

    /// Forward a media element event
    pub async fn media_event(&self, handle: MediaHandle, kind: MediaEventKind) -> Result<()> {
        self.send(SessionEvent::Media { handle, kind }).await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Message::Inspect(reply))
            .await
            .map_err(|_| SkipError::RuntimeStopped)?;
        response.await.map_err(|_| SkipError::RuntimeStopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown).await
    }
}

async fn deliver(tx: &mpsc::Sender<Message>, message: Message) {
    if let Err(e) = tx.send(message).await {
        debug!("Session runtime gone, dropping completion: {}", e);
    }
}

pub struct SessionRuntime {
    config: Config,
    session: Session,
    tracker: EpisodeTracker,
    page: Arc<dyn HostPage>,
    controls: Arc<dyn ControlSurface>,
    backend: Arc<dyn SkipBackend>,
    media: Option<Arc<dyn MediaElement>>,
    media_poll: Option<JoinHandle<()>>,
    recording: Option<ActiveRecording>,
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
}

impl SessionRuntime {
    /// Fails if `config` does not validate
    pub fn new(
        config: Config,
        page: Arc<dyn HostPage>,
        controls: Arc<dyn ControlSurface>,
        backend: Arc<dyn SkipBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        Ok(Self {
            session: Session::new(&config),
            tracker: EpisodeTracker::new(&config.tracker),
            config,
            page,
            controls,
            backend,
            media: None,
            media_poll: None,
            recording: None,
            tx,
            rx,
        })
    }

    /// Use a custom tracker (e.g. with an extra identity signal)
    pub fn with_tracker(mut self, tracker: EpisodeTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle { tx: self.tx.clone() }
    }

    /// Run the session on its own task
    pub fn start_background(self) -> (SessionHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run until a [`SessionEvent::Shutdown`] arrives
    pub async fn run(mut self) {
        info!("🚀 AutoSkip session starting (server: {})", self.config.server.url);

        self.spawn_ping();
        let page = self.page.snapshot();
        self.tracker.prime(&page);
        self.handle_episode_change();
        self.bind_media();

        let identity_poll =
            self.spawn_ticker(self.config.tracker.poll_interval(), SessionEvent::PollTick);

        while let Some(message) = self.rx.recv().await {
            if !self.handle_message(message) {
                break;
            }
        }

        identity_poll.abort();
        if let Some(poll) = self.media_poll.take() {
            poll.abort();
        }
        self.stop_recording();
        info!("👋 AutoSkip session stopped");
    }

    /// Returns `false` when the runtime should stop
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Event(SessionEvent::Shutdown) => return false,
            Message::Event(event) => self.handle_event(event),
            Message::PingCompleted(reachable) => self.session.set_server_reachable(reachable),
            Message::Redetect => self.handle_episode_change(),
            Message::LookupCompleted { token, segments } => self.on_lookup_completed(token, segments),
            Message::CaptureCheck { token } => self.on_capture_check(token),
            Message::CaptureFinished { token, outcome } => self.on_capture_finished(token, outcome),
            Message::AnalysisCompleted { token, segments } => {
                self.on_analysis_completed(token, segments)
            }
            Message::CorrectionCompleted { token, request, result } => {
                self.on_correction_completed(token, request, result)
            }
            Message::Inspect(reply) => {
                let _ = reply.send(self.status());
            }
        }
        true
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::TitleMutated(text) => self.handle_trigger(Trigger::TitleMutated(text)),
            SessionEvent::ResourceLoaded(url) => self.handle_trigger(Trigger::ResourceLoaded(url)),
            SessionEvent::PollTick => self.handle_trigger(Trigger::Poll),
            SessionEvent::MediaPoll => self.bind_media(),
            SessionEvent::Media { handle, kind } => self.handle_media_event(handle, kind),
            SessionEvent::SkipClicked => self.on_skip_clicked(),
            SessionEvent::OpenFeedback => self.on_open_feedback(),
            SessionEvent::SubmitCorrection { index, start_sec, end_sec } => {
                self.on_submit_correction(index, start_sec, end_sec)
            }
            SessionEvent::Shutdown => {}
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            identity: self.session.identity().cloned(),
            media_identifier: self.session.media_identifier().map(str::to_string),
            phase: self.session.capture().phase(),
            should_record: self.session.capture().should_record(),
            has_checked_for_skips: self.session.has_checked_for_skips(),
            segments: self.session.segments().segments().to_vec(),
            skip_shown: self.session.skip().shown(),
            feedback_entry_shown: self.session.feedback_entry_shown(),
            server_reachable: self.session.server_reachable(),
            bound_media: self.media.as_ref().map(|media| media.handle()),
            pipeline_held: self.recording.is_some(),
        }
    }

    // --- background work -------------------------------------------------

    fn spawn_ping(&self) {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let reachable = match backend.ping().await {
                Ok(true) => {
                    info!("✅ Skip server reachable");
                    true
                }
                Ok(false) => {
                    warn!("⚠️ Skip server answered ping unexpectedly");
                    false
                }
                Err(e) => {
                    warn!("❌ Skip server not reachable: {}", e);
                    false
                }
            };
            deliver(&tx, Message::PingCompleted(reachable)).await;
        });
    }

    fn spawn_ticker(&self, period: Duration, event: SessionEvent) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Message::Event(event.clone())).await.is_err() {
                    break;
                }
            }
        })
    }

    fn deliver_after(&self, delay: Duration, message: Message) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            deliver(&tx, message).await;
        });
    }

    // --- identity --------------------------------------------------------

    fn handle_trigger(&mut self, trigger: Trigger) {
        let page = self.page.snapshot();
        match self
            .tracker
            .classify(&trigger, self.session.media_identifier(), &page)
        {
            TriggerAction::Ignore => {}
            TriggerAction::Defer(delay) => self.deliver_after(delay, Message::Redetect),
            TriggerAction::Redetect => self.handle_episode_change(),
        }
    }

    /// Recompute the identity; on a genuine change, wipe the old episode
    /// before the new one is staged
    fn handle_episode_change(&mut self) {
        let page = self.page.snapshot();
        let Some(identity) = self
            .tracker
            .detect_change(self.session.media_identifier(), &page)
        else {
            return;
        };

        self.controls.hide_skip();
        self.controls.hide_feedback_entry();
        self.stop_recording();
        self.session.change_identity(identity);
        self.bind_media();

        // Already playing: no new "playing" event may come, so let the next
        // time update past the show start run the lookup
        let playing = self.media.as_ref().is_some_and(|media| !media.is_paused());
        if playing && self.session.has_complete_identity() {
            info!("▶️ Video is playing, will check for skips once the show starts");
            self.session.set_lookup_waiting_for_show_start(true);
        }
    }

    // --- media binding ---------------------------------------------------

    fn bind_media(&mut self) {
        match self.page.find_media() {
            Some(media) => {
                let handle = media.handle();
                if self.media.as_ref().map(|bound| bound.handle()) != Some(handle) {
                    info!("🎥 Bound media element {:?}", handle);
                    self.media = Some(media);
                }
                if let Some(poll) = self.media_poll.take() {
                    debug!("Media element found, stopping poll");
                    poll.abort();
                }
            }
            None => {
                if self.media_poll.is_none() {
                    debug!("No media element yet, polling");
                    self.media_poll = Some(self.spawn_ticker(
                        self.config.tracker.media_poll_interval(),
                        SessionEvent::MediaPoll,
                    ));
                }
            }
        }
    }

    fn handle_media_event(&mut self, handle: MediaHandle, kind: MediaEventKind) {
        let Some(media) = self.media.clone() else {
            return;
        };
        if media.handle() != handle {
            debug!("Ignoring {:?} from unbound element {:?}", kind, handle);
            return;
        }

        match kind {
            MediaEventKind::TimeUpdate => self.on_time_update(media),
            MediaEventKind::Playing => self.on_playing(media),
            MediaEventKind::Waiting | MediaEventKind::Stalled => {
                if self.session.capture().is_recording() {
                    warn!("⚠️ Video {:?} during recording, audio quality may suffer", kind);
                } else {
                    debug!("Video {:?}", kind);
                }
            }
        }
    }

    fn on_time_update(&mut self, media: Arc<dyn MediaElement>) {
        if !media.is_attached() {
            info!("🎥 Media element left the page");
            let (_, skip) = self.session.skip_parts();
            if skip.hide() == SkipUpdate::Hide {
                self.controls.hide_skip();
            }
            self.media = None;
            self.bind_media();
            return;
        }

        let time = media.current_time();

        if self.session.lookup_waiting_for_show_start()
            && time >= self.config.capture.min_start_secs
        {
            info!("▶️ Show started ({:.1}s), looking up skips", time);
            self.start_lookup();
        }

        let (segments, skip) = self.session.skip_parts();
        match skip.evaluate(segments.segments(), time) {
            SkipUpdate::Show(index) => {
                if let Some(segment) = segments.get(index) {
                    info!("⏭️ Offering skip for {} at {:.1}s", segment.kind.label(), time);
                    self.controls.show_skip(segment);
                }
            }
            SkipUpdate::Hide => self.controls.hide_skip(),
            SkipUpdate::Unchanged => {}
        }
    }

    fn on_playing(&mut self, media: Arc<dyn MediaElement>) {
        if !self.session.has_complete_identity() {
            self.handle_episode_change();
        }

        if self.session.has_complete_identity() && !self.session.has_checked_for_skips() {
            let time = media.current_time();
            if time < self.config.capture.min_start_secs {
                if !self.session.lookup_waiting_for_show_start() {
                    info!("⏳ Playback at {:.1}s, lookup waits for the show to start", time);
                    self.session.set_lookup_waiting_for_show_start(true);
                }
            } else {
                self.start_lookup();
            }
        }

        let capture = self.session.capture();
        if capture.should_record() && !capture.is_busy() {
            self.schedule_capture();
        }
    }

    // --- lookup ----------------------------------------------------------

    fn start_lookup(&mut self) {
        let Some(media_id) = self.session.media_identifier().map(str::to_string) else {
            return;
        };
        if !self.session.claim_lookup() {
            return;
        }

        info!("🔍 Looking up skip segments for {}", media_id);
        let token = self.session.token();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let segments = match backend.lookup(&media_id).await {
                Ok(segments) => segments,
                Err(e) => {
                    warn!("❌ Lookup failed for {}: {}", media_id, e);
                    None
                }
            };
            deliver(&tx, Message::LookupCompleted { token, segments }).await;
        });
    }

    fn on_lookup_completed(&mut self, token: IdentityToken, segments: Option<Vec<SkipSegment>>) {
        if !self.session.is_current(token) {
            debug!("Discarding lookup result for a previous episode");
            return;
        }

        let segments = segments.unwrap_or_default();
        let found = !segments.is_empty();
        self.session.capture_mut().lookup_finished(found);

        if found {
            info!("✅ Found {} skip segment(s)", segments.len());
            self.install_segments(SegmentOrigin::Lookup, segments);
        } else {
            info!("📭 No skip segments known, a sample is needed");
            self.schedule_capture();
        }
    }

    fn install_segments(&mut self, origin: SegmentOrigin, segments: Vec<SkipSegment>) {
        self.session.install_segments(origin, segments);
        if self.session.segments().is_empty() || self.session.feedback_entry_shown() {
            return;
        }
        if self.controls.show_feedback_entry() {
            self.session.set_feedback_entry_shown(true);
        } else {
            debug!("No control bar for the feedback entry");
        }
    }

    // --- capture ---------------------------------------------------------

    fn schedule_capture(&mut self) {
        if self.recording.is_some() {
            debug!("Capture not scheduled: audio pipeline still held by a recording");
            return;
        }
        let state = self.media.as_ref().map(|media| MediaState::of(media.as_ref()));
        match self
            .session
            .capture_mut()
            .schedule(Instant::now(), state.as_ref())
        {
            ScheduleDecision::Wait(delay) => {
                let token = self.session.token();
                self.deliver_after(delay, Message::CaptureCheck { token });
            }
            ScheduleDecision::Refused(reason) => debug!("Capture not scheduled: {:?}", reason),
        }
    }

    fn on_capture_check(&mut self, token: IdentityToken) {
        if !self.session.is_current(token) {
            debug!("Discarding capture check for a previous episode");
            return;
        }
        let Some(media) = self.media.clone() else {
            info!("⏸️ Capture check cancelled, no media element");
            self.session.capture_mut().cancel_wait();
            return;
        };

        if self.recording.is_some() {
            info!("⏸️ Capture check cancelled, audio pipeline still held");
            self.session.capture_mut().cancel_wait();
            return;
        }

        let state = MediaState::of(media.as_ref());
        if let Err(reason) = self.session.capture_mut().check_ready(&state) {
            info!("⏸️ Capture check cancelled: {:?}", reason);
            return;
        }

        let capture = match media.open_capture(self.config.capture.timeslice()) {
            Ok(capture) => capture,
            Err(CaptureError::AlreadyBound) => {
                info!("🎙️ Audio already being captured for this element");
                self.session.capture_mut().capability_failed();
                return;
            }
            Err(e) => {
                warn!("❌ Could not open audio capture: {}", e);
                self.session.capture_mut().recording_failed(Instant::now());
                return;
            }
        };

        self.session.capture_mut().start_recording(Instant::now());
        let policy = self.session.capture().policy().clone();
        let (stop, stop_rx) = oneshot::channel();
        self.recording = Some(ActiveRecording {
            token,
            stop: Some(stop),
        });
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = record(capture, policy, state.current_time, stop_rx).await;
            deliver(&tx, Message::CaptureFinished { token, outcome }).await;
        });
    }

    /// Ask the running recording to stop. The pipeline stays held until its
    /// task reports back.
    fn stop_recording(&mut self) {
        let Some(active) = self.recording.as_mut() else {
            return;
        };
        if let Some(stop) = active.stop.take() {
            info!("⏹️ Stopping the recording in progress");
            let _ = stop.send(());
        }
    }

    /// Retry a capture the pipeline guard held back
    fn resume_capture(&mut self) {
        let playing = self.media.as_ref().is_some_and(|media| !media.is_paused());
        let capture = self.session.capture();
        if playing && capture.should_record() && !capture.is_busy() {
            self.schedule_capture();
        }
    }

    fn on_capture_finished(&mut self, token: IdentityToken, outcome: CaptureOutcome) {
        if self.recording.as_ref().is_some_and(|active| active.token == token) {
            self.recording = None;
        }

        if !self.session.is_current(token) {
            debug!("Discarding recording from a previous episode");
            self.resume_capture();
            return;
        }

        let sample = match outcome {
            CaptureOutcome::Accepted(sample) => sample,
            CaptureOutcome::Discarded { failure, reason } => {
                info!("🔁 Sample discarded ({:?}, {:?}), retrying after cool-down", failure, reason);
                self.session.capture_mut().recording_failed(Instant::now());
                return;
            }
        };

        let Some(media_id) = self.session.media_identifier().map(str::to_string) else {
            self.session.capture_mut().analysis_finished(false);
            return;
        };

        let submission = AudioSubmission {
            audio: sample.audio,
            media_id,
            start_time: sample.video_time_at_start,
        };
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let segments = match backend.analyze_audio(submission).await {
                Ok(result) => result.segments,
                Err(e) => {
                    warn!("❌ Audio analysis failed: {}", e);
                    Vec::new()
                }
            };
            deliver(&tx, Message::AnalysisCompleted { token, segments }).await;
        });
    }

    fn on_analysis_completed(&mut self, token: IdentityToken, segments: Vec<SkipSegment>) {
        if !self.session.is_current(token) {
            debug!("Discarding analysis result for a previous episode");
            return;
        }

        let found = !segments.is_empty();
        self.session.capture_mut().analysis_finished(found);
        if found {
            info!("🎯 Analysis matched {} segment(s)", segments.len());
            self.install_segments(SegmentOrigin::Analysis, segments);
        } else {
            info!("📝 Fingerprint stored, no match yet");
        }
    }

    // --- skip and feedback -----------------------------------------------

    fn on_skip_clicked(&mut self) {
        let Some(media) = self.media.clone() else {
            return;
        };
        let (segments, skip) = self.session.skip_parts();
        if let Some(target) = skip.activate(segments.segments()) {
            info!("⏩ Skipping to {:.1}s", target);
            media.seek(target);
            self.controls.hide_skip();
        }
    }

    fn on_open_feedback(&mut self) {
        if self.session.segments().is_empty() {
            self.controls.notify(NO_SEGMENTS_MESSAGE);
        } else {
            self.controls
                .show_feedback_editor(self.session.segments().segments());
        }
    }

    fn on_submit_correction(&mut self, index: usize, start_sec: f64, end_sec: f64) {
        let request = match prepare_correction(self.session.segments(), index, start_sec, end_sec) {
            Ok(request) => request,
            Err(e) => {
                warn!("❌ Correction rejected: {}", e);
                self.controls.notify(&failure_message(&e));
                return;
            }
        };

        let token = self.session.token();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = submit_correction(backend.as_ref(), &request).await;
            deliver(&tx, Message::CorrectionCompleted { token, request, result }).await;
        });
    }

    fn on_correction_completed(
        &mut self,
        token: IdentityToken,
        request: CorrectionRequest,
        result: Result<SkipSegment>,
    ) {
        if !self.session.is_current(token) {
            debug!("Discarding correction result for a previous episode");
            return;
        }

        let applied = result.and_then(|updated| {
            apply_correction(self.session.segments_mut(), request.index, updated)
        });
        match applied {
            Ok(()) => self.controls.notify(UPDATED_MESSAGE),
            Err(e) => {
                warn!("❌ Correction for segment {} failed: {}", request.segment_id, e);
                self.controls.notify(&failure_message(&e));
            }
        }
    }
}
