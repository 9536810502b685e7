//! Episode change detection across several noisy triggers

use super::signals::{title_has_episode, BackgroundUrlSignal, SignalCollector};
use super::MediaIdentity;
use crate::config::TrackerConfig;
use crate::host::PageSnapshot;
use std::time::Duration;
use tracing::{debug, info};

/// Something that may mean the episode changed
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Text of the episode title element changed
    TitleMutated(String),
    /// A resource finished loading
    ResourceLoaded(String),
    /// Fallback poll tick
    Poll,
}

/// What the caller should do about a trigger
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    Ignore,
    /// Re-detect after this delay
    Defer(Duration),
    /// Re-detect now
    Redetect,
}

/// Decides whether triggers warrant re-detection and whether a detected
/// identity is a real change.
///
/// Triggers never trust their own payload for the final decision: every path
/// ends in [`EpisodeTracker::detect_change`], which recomputes from the page.
pub struct EpisodeTracker {
    collector: SignalCollector,
    background: BackgroundUrlSignal,
    title_debounce: Duration,
    background_debounce: Duration,
    last_title: Option<String>,
}

impl EpisodeTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            collector: SignalCollector::with_background_marker(config.background_marker.clone()),
            background: BackgroundUrlSignal::new(config.background_marker.clone()),
            title_debounce: config.title_debounce(),
            background_debounce: config.background_debounce(),
            last_title: None,
        }
    }

    /// Replace the signal set (e.g. to add a host-specific signal)
    pub fn with_collector(mut self, collector: SignalCollector) -> Self {
        self.collector = collector;
        self
    }

    /// Remember the title present when watching starts
    pub fn prime(&mut self, page: &PageSnapshot) {
        self.last_title = page.episode_title.as_deref().map(|t| t.trim().to_string());
    }

    pub fn detect(&self, page: &PageSnapshot) -> MediaIdentity {
        self.collector.detect(page)
    }

    pub fn classify(
        &mut self,
        trigger: &Trigger,
        current_identifier: Option<&str>,
        page: &PageSnapshot,
    ) -> TriggerAction {
        match trigger {
            Trigger::TitleMutated(text) => {
                let title = text.trim();
                if self.last_title.as_deref() == Some(title) || !title_has_episode(title) {
                    return TriggerAction::Ignore;
                }
                info!("📝 Title changed: {}", title);
                self.last_title = Some(title.to_string());
                TriggerAction::Defer(self.title_debounce)
            }
            Trigger::ResourceLoaded(url) => {
                if !self.background.is_background_url(url) {
                    return TriggerAction::Ignore;
                }
                let reading = self.background.parse_url(url);
                let (Some(show), Some(episode)) = (reading.show_id, reading.episode_id) else {
                    return TriggerAction::Ignore;
                };
                let identifier = format!("{}_{}", show, episode);
                if current_identifier == Some(identifier.as_str()) {
                    return TriggerAction::Ignore;
                }
                info!("🖼️ New episode background loaded: {}", identifier);
                TriggerAction::Defer(self.background_debounce)
            }
            Trigger::Poll => {
                let detected = self.detect(page);
                if !detected.is_complete() {
                    return TriggerAction::Ignore;
                }
                match detected.media_identifier() {
                    Some(identifier) if current_identifier != Some(identifier.as_str()) => {
                        info!("🔄 Episode change detected via polling: {}", identifier);
                        TriggerAction::Redetect
                    }
                    _ => TriggerAction::Ignore,
                }
            }
        }
    }

    /// Re-detect from scratch; `Some` only for a genuine change to a known show
    pub fn detect_change(
        &self,
        current_identifier: Option<&str>,
        page: &PageSnapshot,
    ) -> Option<MediaIdentity> {
        let detected = self.detect(page);
        let Some(identifier) = detected.media_identifier() else {
            debug!("No show ID detected yet");
            return None;
        };

        if current_identifier == Some(identifier.as_str()) {
            return None;
        }

        info!(
            "🎬 Episode changed: {} → {} (source: {})",
            current_identifier.unwrap_or("none"),
            identifier,
            detected.source
        );
        Some(detected)
    }
}
