//! Identity signals and the collector that combines them

use super::{episode_key, IdentitySource, MediaIdentity};
use crate::host::PageSnapshot;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Default URL fragment of episode background image loads
pub const DEFAULT_BACKGROUND_MARKER: &str = "images.metahub.space/background/medium/";

fn show_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(tt\d+)").expect("show id pattern is valid"))
}

fn url_episode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":(\d+):(\d+)").expect("episode pattern is valid"))
}

fn title_episode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)S(\d+)E(\d+)").expect("title pattern is valid"))
}

/// Does `title` carry an `S<season>E<episode>` label?
pub fn title_has_episode(title: &str) -> bool {
    title_episode_regex().is_match(title)
}

/// What a single signal could read from the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalReading {
    pub show_id: Option<String>,
    pub episode_id: Option<String>,
}

impl SignalReading {
    pub fn is_empty(&self) -> bool {
        self.show_id.is_none() && self.episode_id.is_none()
    }
}

/// One independent way of telling what is playing
pub trait IdentitySignal: Send + Sync {
    fn source(&self) -> IdentitySource;

    fn read(&self, page: &PageSnapshot) -> SignalReading;
}

/// Most recent background image load; its URL encodes the show id and,
/// for episodes, `:<season>:<episode>`.
#[derive(Debug, Clone)]
pub struct BackgroundUrlSignal {
    marker: String,
}

impl BackgroundUrlSignal {
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }

    pub fn is_background_url(&self, url: &str) -> bool {
        url.contains(&self.marker)
    }

    /// Parse a single background URL. The show id is required for any result.
    pub fn parse_url(&self, url: &str) -> SignalReading {
        let Some(show) = show_id_regex().captures(url) else {
            return SignalReading::default();
        };
        let episode_id = url_episode_regex()
            .captures(url)
            .map(|caps| episode_key(&caps[1], &caps[2]));

        SignalReading {
            show_id: Some(show[1].to_string()),
            episode_id,
        }
    }
}

impl Default for BackgroundUrlSignal {
    fn default() -> Self {
        Self::new(DEFAULT_BACKGROUND_MARKER)
    }
}

impl IdentitySignal for BackgroundUrlSignal {
    fn source(&self) -> IdentitySource {
        IdentitySource::BackgroundUrl
    }

    fn read(&self, page: &PageSnapshot) -> SignalReading {
        page.resource_urls
            .iter()
            .rev()
            .find(|url| self.is_background_url(url))
            .map(|url| self.parse_url(url))
            .unwrap_or_default()
    }
}

/// On-screen episode title like "S02E05 - The Night Lands"
#[derive(Debug, Clone, Default)]
pub struct TitleElementSignal;

impl IdentitySignal for TitleElementSignal {
    fn source(&self) -> IdentitySource {
        IdentitySource::TitleElement
    }

    fn read(&self, page: &PageSnapshot) -> SignalReading {
        let episode_id = page
            .episode_title
            .as_deref()
            .map(str::trim)
            .and_then(|title| title_episode_regex().captures(title))
            .map(|caps| episode_key(&caps[1], &caps[2]));

        if let Some(episode) = &episode_id {
            debug!("📺 Found episode {} from title", episode);
        }

        SignalReading {
            show_id: None,
            episode_id,
        }
    }
}

/// Series-name element carrying an explicit show identifier
#[derive(Debug, Clone, Default)]
pub struct SeriesNameSignal;

impl IdentitySignal for SeriesNameSignal {
    fn source(&self) -> IdentitySource {
        IdentitySource::SeriesNameElement
    }

    fn read(&self, page: &PageSnapshot) -> SignalReading {
        SignalReading {
            show_id: page
                .series_show_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from),
            episode_id: None,
        }
    }
}

/// Runs the signals in priority order and merges their readings.
///
/// Earlier signals win: a later signal only fills fields that are still unset.
/// The source is the first signal that contributed anything.
pub struct SignalCollector {
    signals: Vec<Box<dyn IdentitySignal>>,
}

impl SignalCollector {
    pub fn new(signals: Vec<Box<dyn IdentitySignal>>) -> Self {
        Self { signals }
    }

    /// Background URL, then title element, then series-name element
    pub fn with_background_marker(marker: impl Into<String>) -> Self {
        Self::new(vec![
            Box::new(BackgroundUrlSignal::new(marker)),
            Box::new(TitleElementSignal),
            Box::new(SeriesNameSignal),
        ])
    }

    pub fn detect(&self, page: &PageSnapshot) -> MediaIdentity {
        let mut identity = MediaIdentity::unknown();

        for signal in &self.signals {
            let reading = signal.read(page);
            if reading.is_empty() {
                continue;
            }

            let mut contributed = false;
            if identity.show_id.is_none() && reading.show_id.is_some() {
                identity.show_id = reading.show_id;
                contributed = true;
            }
            if identity.episode_id.is_none() && reading.episode_id.is_some() {
                identity.episode_id = reading.episode_id;
                contributed = true;
            }
            if contributed && identity.source == IdentitySource::None {
                identity.source = signal.source();
            }
        }

        identity
    }
}

impl Default for SignalCollector {
    fn default() -> Self {
        Self::with_background_marker(DEFAULT_BACKGROUND_MARKER)
    }
}
