//! Episode identity: what is playing, and how we know
//!
//! Detection is split into independent signals (see [`signals`]) combined by a
//! collector, and a tracker (see [`tracker`]) that decides when a newly
//! detected identity is a genuine episode change.

pub mod signals;
pub mod tracker;

pub use signals::{
    BackgroundUrlSignal, IdentitySignal, SeriesNameSignal, SignalCollector, SignalReading,
    TitleElementSignal,
};
pub use tracker::{EpisodeTracker, Trigger, TriggerAction};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which signal supplied an identity first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentitySource {
    BackgroundUrl,
    TitleElement,
    SeriesNameElement,
    None,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentitySource::BackgroundUrl => "background-url",
            IdentitySource::TitleElement => "title-element",
            IdentitySource::SeriesNameElement => "series-name-element",
            IdentitySource::None => "none",
        };
        f.write_str(name)
    }
}

/// Best-effort identity of the content being played.
///
/// `show_id` is an external stable id (e.g. `tt0944947`); `episode_id` is a
/// `season_episode` composite. A missing episode is a degraded but valid
/// state; a missing show means "not known yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIdentity {
    pub show_id: Option<String>,
    pub episode_id: Option<String>,
    pub source: IdentitySource,
}

impl MediaIdentity {
    pub fn unknown() -> Self {
        Self {
            show_id: None,
            episode_id: None,
            source: IdentitySource::None,
        }
    }

    pub fn new(show_id: impl Into<String>, episode_id: Option<String>, source: IdentitySource) -> Self {
        Self {
            show_id: Some(show_id.into()),
            episode_id,
            source,
        }
    }

    /// Both show and episode are known
    pub fn is_complete(&self) -> bool {
        self.show_id.is_some() && self.episode_id.is_some()
    }

    /// `"{show}_{episode}"`, or the show alone when the episode is unknown.
    /// `None` until a show is known.
    pub fn media_identifier(&self) -> Option<String> {
        let show = self.show_id.as_deref()?;
        Some(match self.episode_id.as_deref() {
            Some(episode) => format!("{}_{}", show, episode),
            None => show.to_string(),
        })
    }
}

impl fmt::Display for MediaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.media_identifier() {
            Some(id) => write!(f, "{} (via {})", id, self.source),
            None => f.write_str("unknown"),
        }
    }
}

/// Build the `season_episode` composite. Numbers are written without leading
/// zeros so "S03E11" and ":3:11" name the same episode.
pub fn episode_key(season: &str, episode: &str) -> String {
    format!("{}_{}", canonical_number(season), canonical_number(episode))
}

fn canonical_number(digits: &str) -> String {
    match digits.parse::<u64>() {
        Ok(number) => number.to_string(),
        Err(_) => {
            let trimmed = digits.trim_start_matches('0');
            if trimmed.is_empty() { "0" } else { trimmed }.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_identifier_forms() {
        let full = MediaIdentity::new("tt123", Some("1_2".to_string()), IdentitySource::BackgroundUrl);
        assert_eq!(full.media_identifier().as_deref(), Some("tt123_1_2"));
        assert!(full.is_complete());

        let show_only = MediaIdentity::new("tt123", None, IdentitySource::SeriesNameElement);
        assert_eq!(show_only.media_identifier().as_deref(), Some("tt123"));
        assert!(!show_only.is_complete());

        assert_eq!(MediaIdentity::unknown().media_identifier(), None);
    }

    #[test]
    fn test_episode_key_drops_leading_zeros() {
        assert_eq!(episode_key("03", "11"), "3_11");
        assert_eq!(episode_key("1", "002"), "1_2");
        assert_eq!(episode_key("00", "0"), "0_0");
    }

    #[test]
    fn test_source_serializes_kebab_case() {
        let json = serde_json::to_string(&IdentitySource::SeriesNameElement).unwrap();
        assert_eq!(json, "\"series-name-element\"");
        assert_eq!(IdentitySource::BackgroundUrl.to_string(), "background-url");
    }
}
