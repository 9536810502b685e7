//! One audio capture: chunk accounting, early stop and the quality gate

use crate::config::CapturePolicy;
use crate::host::AudioCapture;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info, warn};

/// What a new chunk means for the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSignal {
    Continue,
    /// Buffering after enough good audio; stop and keep the sample
    NaturalStop,
    /// Buffering before enough good audio; stop, the gate will discard
    BufferingStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Natural,
    Buffering,
    MaxDuration,
    NoData,
    StreamEnded,
    /// The episode changed or the session shut down
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityFailure {
    TooFewGoodChunks { good: usize, required: usize },
    TooSmall { bytes: usize, required: usize },
}

/// A sample that passed the quality gate
#[derive(Debug, Clone)]
pub struct CapturedSample {
    pub audio: Vec<u8>,
    /// Whole seconds of playback when recording began
    pub video_time_at_start: f64,
    pub chunk_count: usize,
    pub good_chunk_count: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Accepted(CapturedSample),
    Discarded {
        failure: QualityFailure,
        reason: StopReason,
    },
}

/// Check a finished recording against the policy
pub fn quality_check(
    policy: &CapturePolicy,
    good_chunk_count: usize,
    total_bytes: usize,
) -> Result<(), QualityFailure> {
    if good_chunk_count < policy.min_good_chunks {
        return Err(QualityFailure::TooFewGoodChunks {
            good: good_chunk_count,
            required: policy.min_good_chunks,
        });
    }
    if total_bytes < policy.min_total_bytes {
        return Err(QualityFailure::TooSmall {
            bytes: total_bytes,
            required: policy.min_total_bytes,
        });
    }
    Ok(())
}

/// Bookkeeping for a single in-flight recording. Dropped once it ends.
#[derive(Debug)]
pub struct CaptureAttempt {
    policy: CapturePolicy,
    pub started_at_wall_clock: DateTime<Utc>,
    pub started: Instant,
    pub video_time_at_start: f64,
    chunks: Vec<Vec<u8>>,
    chunk_count: usize,
    good_chunk_count: usize,
}

impl CaptureAttempt {
    pub fn new(policy: CapturePolicy, video_time: f64) -> Self {
        Self {
            policy,
            started_at_wall_clock: Utc::now(),
            started: Instant::now(),
            video_time_at_start: video_time.max(0.0).floor(),
            chunks: Vec::new(),
            chunk_count: 0,
            good_chunk_count: 0,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn good_chunk_count(&self) -> usize {
        self.good_chunk_count
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Record a chunk; empty chunks are ignored
    pub fn push(&mut self, chunk: Vec<u8>) -> ChunkSignal {
        if chunk.is_empty() {
            return ChunkSignal::Continue;
        }

        let size = chunk.len();
        self.chunks.push(chunk);
        self.chunk_count += 1;
        debug!("🎙️ Chunk received: {:.2} KB", size as f64 / 1024.0);

        if size > self.policy.good_chunk_bytes {
            self.good_chunk_count += 1;
        }

        if size < self.policy.tiny_chunk_bytes && self.chunk_count > self.policy.tiny_chunk_grace {
            warn!("⚠️ Tiny chunk detected - playback is buffering");
            if self.good_chunk_count >= self.policy.min_good_chunks {
                info!("Have {} good chunks, stopping", self.good_chunk_count);
                return ChunkSignal::NaturalStop;
            }
            info!("Only {} good chunks, discarding", self.good_chunk_count);
            return ChunkSignal::BufferingStop;
        }

        ChunkSignal::Continue
    }

    /// Apply the quality gate and hand back the encoded sample if it passed
    pub fn finish(self, reason: StopReason) -> CaptureOutcome {
        let total = self.total_bytes();
        info!(
            "🎙️ Recording complete: {:.2} KB ({} chunks, {} good chunks, {:?})",
            total as f64 / 1024.0,
            self.chunk_count,
            self.good_chunk_count,
            reason
        );

        if let Err(failure) = quality_check(&self.policy, self.good_chunk_count, total) {
            warn!("❌ Sample rejected: {:?}", failure);
            return CaptureOutcome::Discarded { failure, reason };
        }

        info!("✅ Recording quality acceptable");
        CaptureOutcome::Accepted(CapturedSample {
            audio: self.chunks.concat(),
            video_time_at_start: self.video_time_at_start,
            chunk_count: self.chunk_count,
            good_chunk_count: self.good_chunk_count,
            duration: self.started.elapsed(),
        })
    }
}

/// Run one capture to completion.
///
/// Stops on a buffering signal, the maximum duration, a no-data timeout, the
/// end of the stream or `stop` firing, then gates the result. The pipeline is
/// stopped and dropped before this returns.
pub async fn record(
    mut capture: Box<dyn AudioCapture>,
    policy: CapturePolicy,
    video_time: f64,
    stop: oneshot::Receiver<()>,
) -> CaptureOutcome {
    let mut attempt = CaptureAttempt::new(policy.clone(), video_time);
    info!(
        "🔴 Recording started at video time {}s ({}s max)",
        attempt.video_time_at_start,
        policy.max_duration().as_secs()
    );

    let deadline = sleep(policy.max_duration());
    tokio::pin!(deadline);
    tokio::pin!(stop);
    let health_period = policy.health_check_interval();
    let mut health = interval_at(attempt.started + health_period, health_period);

    let reason = loop {
        // One chunk request stays alive until it resolves
        let next = {
            let mut chunk = capture.next_chunk();
            loop {
                tokio::select! {
                    data = &mut chunk => break Ok(data),
                    _ = &mut stop => {
                        info!("⏹️ Recording cancelled");
                        break Err(StopReason::Cancelled);
                    }
                    _ = &mut deadline => {
                        info!("⏹️ Recording stopped ({}s)", policy.max_duration().as_secs());
                        break Err(StopReason::MaxDuration);
                    }
                    _ = health.tick() => {
                        let elapsed = attempt.started.elapsed();
                        debug!(
                            "Progress: {:.1}s / {}s, chunks: {}",
                            elapsed.as_secs_f64(),
                            policy.max_duration().as_secs(),
                            attempt.chunk_count()
                        );
                        if elapsed >= policy.no_data_timeout() && attempt.chunk_count() == 0 {
                            warn!("❌ No audio data, stopping");
                            break Err(StopReason::NoData);
                        }
                    }
                }
            }
        };

        match next {
            Err(reason) => break reason,
            Ok(None) => break StopReason::StreamEnded,
            Ok(Some(data)) => match attempt.push(data) {
                ChunkSignal::Continue => {}
                ChunkSignal::NaturalStop => break StopReason::Natural,
                ChunkSignal::BufferingStop => break StopReason::Buffering,
            },
        }
    };

    if reason != StopReason::StreamEnded {
        if let Some(tail) = capture.stop().await {
            attempt.push(tail);
        }
    }
    drop(capture);

    attempt.finish(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Emits one scripted chunk per timeslice
    struct ScriptedCapture {
        chunks: VecDeque<usize>,
        every: Duration,
        stopped: bool,
    }

    impl ScriptedCapture {
        fn boxed(sizes: &[usize]) -> Box<dyn AudioCapture> {
            Box::new(Self {
                chunks: sizes.iter().copied().collect(),
                every: Duration::from_secs(10),
                stopped: false,
            })
        }
    }

    #[async_trait]
    impl AudioCapture for ScriptedCapture {
        async fn next_chunk(&mut self) -> Option<Vec<u8>> {
            if self.stopped {
                return None;
            }
            tokio::time::sleep(self.every).await;
            match self.chunks.pop_front() {
                Some(size) => Some(vec![0u8; size]),
                // Silent pipeline: never produces anything
                None => std::future::pending().await,
            }
        }

        async fn stop(&mut self) -> Option<Vec<u8>> {
            self.stopped = true;
            None
        }
    }

    /// Reports when the pipeline is stopped
    struct ReleaseTracking {
        inner: ScriptedCapture,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AudioCapture for ReleaseTracking {
        async fn next_chunk(&mut self) -> Option<Vec<u8>> {
            self.inner.next_chunk().await
        }

        async fn stop(&mut self) -> Option<Vec<u8>> {
            self.stopped.store(true, Ordering::SeqCst);
            self.inner.stop().await
        }
    }

    #[test]
    fn test_quality_gate_thresholds() {
        let policy = CapturePolicy::default();
        assert_eq!(
            quality_check(&policy, 3, 299_999),
            Err(QualityFailure::TooSmall { bytes: 299_999, required: 300_000 })
        );
        assert_eq!(quality_check(&policy, 3, 300_000), Ok(()));
        assert_eq!(
            quality_check(&policy, 2, 1_000_000),
            Err(QualityFailure::TooFewGoodChunks { good: 2, required: 3 })
        );
    }

    #[test]
    fn test_four_chunks_two_good_is_discarded() {
        let mut attempt = CaptureAttempt::new(CapturePolicy::default(), 4.7);
        assert_eq!(attempt.video_time_at_start, 4.0);

        for size in [150_000, 50_000, 150_000, 60_000] {
            assert_eq!(attempt.push(vec![1u8; size]), ChunkSignal::Continue);
        }
        assert_eq!(attempt.chunk_count(), 4);
        assert_eq!(attempt.good_chunk_count(), 2);

        match attempt.finish(StopReason::MaxDuration) {
            CaptureOutcome::Discarded { failure, .. } => {
                assert_eq!(failure, QualityFailure::TooFewGoodChunks { good: 2, required: 3 })
            }
            CaptureOutcome::Accepted(_) => panic!("sample with 2 good chunks must be discarded"),
        }
    }

    #[test]
    fn test_tiny_chunk_signals() {
        let mut attempt = CaptureAttempt::new(CapturePolicy::default(), 3.0);
        // Tiny chunks within the first two are tolerated
        assert_eq!(attempt.push(vec![1u8; 5_000]), ChunkSignal::Continue);
        assert_eq!(attempt.push(vec![1u8; 200_000]), ChunkSignal::Continue);
        assert_eq!(attempt.push(vec![1u8; 5_000]), ChunkSignal::BufferingStop);

        let mut attempt = CaptureAttempt::new(CapturePolicy::default(), 3.0);
        for _ in 0..3 {
            attempt.push(vec![1u8; 120_000]);
        }
        assert_eq!(attempt.push(vec![1u8; 9_999]), ChunkSignal::NaturalStop);
        assert_eq!(attempt.push(Vec::new()), ChunkSignal::Continue);
        assert_eq!(attempt.chunk_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_stops_naturally_and_accepts() {
        let capture = ScriptedCapture::boxed(&[150_000, 150_000, 150_000, 4_000, 150_000]);
        let (_stop, stop_rx) = oneshot::channel();
        let outcome = record(capture, CapturePolicy::default(), 5.2, stop_rx).await;

        match outcome {
            CaptureOutcome::Accepted(sample) => {
                assert_eq!(sample.chunk_count, 4);
                assert_eq!(sample.good_chunk_count, 3);
                assert_eq!(sample.audio.len(), 454_000);
                assert_eq!(sample.video_time_at_start, 5.0);
                assert_eq!(sample.duration, Duration::from_secs(40));
            }
            other => panic!("expected accepted sample, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_gives_up_without_data() {
        let capture = ScriptedCapture::boxed(&[]);
        let (_stop, stop_rx) = oneshot::channel();
        let outcome = record(capture, CapturePolicy::default(), 3.0, stop_rx).await;

        match outcome {
            CaptureOutcome::Discarded { reason, failure } => {
                assert_eq!(reason, StopReason::NoData);
                assert_eq!(failure, QualityFailure::TooFewGoodChunks { good: 0, required: 3 });
            }
            other => panic!("expected discard, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_respects_max_duration() {
        let sizes = vec![120_000; 20];
        let capture = ScriptedCapture::boxed(&sizes);
        let (_stop, stop_rx) = oneshot::channel();
        let outcome = record(capture, CapturePolicy::default(), 3.0, stop_rx).await;

        match outcome {
            CaptureOutcome::Accepted(sample) => {
                assert!(sample.chunk_count <= 9);
                assert_eq!(sample.duration, Duration::from_secs(90));
            }
            other => panic!("expected accepted sample, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_checks_do_not_delay_chunks() {
        let policy = CapturePolicy {
            health_check_interval_ms: 1_000,
            ..CapturePolicy::default()
        };
        let capture = ScriptedCapture::boxed(&[150_000, 150_000, 150_000, 4_000]);
        let (_stop, stop_rx) = oneshot::channel();
        let outcome = record(capture, policy, 3.0, stop_rx).await;

        match outcome {
            CaptureOutcome::Accepted(sample) => {
                assert_eq!(sample.chunk_count, 4);
                assert_eq!(sample.duration, Duration::from_secs(40));
            }
            other => panic!("expected accepted sample, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_stops_when_cancelled() {
        let stopped = Arc::new(AtomicBool::new(false));
        let capture = Box::new(ReleaseTracking {
            inner: ScriptedCapture {
                chunks: [150_000; 8].into_iter().collect(),
                every: Duration::from_secs(10),
                stopped: false,
            },
            stopped: Arc::clone(&stopped),
        });
        let (stop, stop_rx) = oneshot::channel();
        let recording = tokio::spawn(record(capture, CapturePolicy::default(), 4.0, stop_rx));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!stopped.load(Ordering::SeqCst));
        stop.send(()).unwrap();

        match recording.await.unwrap() {
            CaptureOutcome::Discarded { reason, failure } => {
                assert_eq!(reason, StopReason::Cancelled);
                assert_eq!(failure, QualityFailure::TooFewGoodChunks { good: 1, required: 3 });
            }
            other => panic!("expected discard, got {:?}", other),
        }
        assert!(stopped.load(Ordering::SeqCst));
    }
}
