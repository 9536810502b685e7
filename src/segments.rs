//! Skip segments and the per-episode cached copy of them

use crate::{Result, SkipError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Backend segment identifier. The backend may hand out numeric or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentId {
    Number(i64),
    Text(String),
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentId::Number(n) => write!(f, "{}", n),
            SegmentId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// What kind of content a segment covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentKind {
    Intro,
    Recap,
    Credits,
    Preview,
    Other(String),
}

impl From<String> for SegmentKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "intro" => SegmentKind::Intro,
            "recap" => SegmentKind::Recap,
            "credits" => SegmentKind::Credits,
            "preview" => SegmentKind::Preview,
            _ => SegmentKind::Other(value),
        }
    }
}

impl From<SegmentKind> for String {
    fn from(kind: SegmentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl SegmentKind {
    pub fn as_str(&self) -> &str {
        match self {
            SegmentKind::Intro => "intro",
            SegmentKind::Recap => "recap",
            SegmentKind::Credits => "credits",
            SegmentKind::Preview => "preview",
            SegmentKind::Other(other) => other,
        }
    }

    /// Capitalized label for display ("Intro", "Recap", ...)
    pub fn label(&self) -> String {
        let raw = self.as_str();
        let mut chars = raw.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// A skippable time range within an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipSegment {
    pub id: SegmentId,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub start_sec: f64,
    pub end_sec: f64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub votes: u32,
}

impl SkipSegment {
    /// Window in which the skip action is offered: `[max(0, start - lead_in), end]`
    pub fn display_window(&self, lead_in_secs: f64) -> (f64, f64) {
        ((self.start_sec - lead_in_secs).max(0.0), self.end_sec)
    }

    pub fn contains(&self, time: f64, lead_in_secs: f64) -> bool {
        let (start, end) = self.display_window(lead_in_secs);
        time >= start && time <= end
    }

    /// Votes as shown to users; segments without recorded votes count as one
    pub fn display_votes(&self) -> u32 {
        self.votes.max(1)
    }

    pub fn is_editable(&self) -> bool {
        !self.verified
    }
}

/// Where the current segment set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOrigin {
    Lookup,
    Analysis,
}

/// Cached copy of the backend's segments for the current episode.
///
/// Replaced wholesale by a lookup or analysis result, patched in place by
/// index after a confirmed correction.
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    segments: Vec<SkipSegment>,
    origin: Option<SegmentOrigin>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, origin: SegmentOrigin, segments: Vec<SkipSegment>) {
        debug!("📦 Installing {} segment(s) from {:?}", segments.len(), origin);
        self.segments = segments;
        self.origin = Some(origin);
    }

    /// Swap in a server-confirmed segment at `index`. The slot must still
    /// hold the segment with the same id.
    pub fn patch(&mut self, index: usize, updated: SkipSegment) -> Result<()> {
        let slot = self
            .segments
            .get_mut(index)
            .ok_or(SkipError::SegmentNotFound(index))?;
        if slot.id != updated.id {
            return Err(SkipError::SegmentNotFound(index));
        }
        *slot = updated;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.origin = None;
    }

    pub fn get(&self, index: usize) -> Option<&SkipSegment> {
        self.segments.get(index)
    }

    pub fn segments(&self) -> &[SkipSegment] {
        &self.segments
    }

    pub fn origin(&self) -> Option<SegmentOrigin> {
        self.origin
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: i64, start: f64, end: f64) -> SkipSegment {
        SkipSegment {
            id: SegmentId::Number(id),
            kind: SegmentKind::Intro,
            start_sec: start,
            end_sec: end,
            verified: false,
            votes: 0,
        }
    }

    #[test]
    fn test_segment_deserializes_backend_shape() {
        let json = r#"[
            {"id": 7, "type": "intro", "start_sec": 12.5, "end_sec": 80, "verified": true, "votes": 4},
            {"id": "abc", "type": "Recap", "start_sec": 0, "end_sec": 30},
            {"id": 9, "type": "cold-open", "start_sec": 1, "end_sec": 2}
        ]"#;
        let segments: Vec<SkipSegment> = serde_json::from_str(json).unwrap();

        assert_eq!(segments[0].id, SegmentId::Number(7));
        assert_eq!(segments[0].kind, SegmentKind::Intro);
        assert!(segments[0].verified);
        assert_eq!(segments[1].id, SegmentId::Text("abc".to_string()));
        assert_eq!(segments[1].kind, SegmentKind::Recap);
        assert_eq!(segments[1].votes, 0);
        assert_eq!(segments[1].display_votes(), 1);
        assert_eq!(segments[2].kind, SegmentKind::Other("cold-open".to_string()));
        assert_eq!(segments[2].kind.label(), "Cold-open");
    }

    #[test]
    fn test_display_window_has_lead_in_clamped_at_zero() {
        let early = segment(1, 1.0, 20.0);
        assert_eq!(early.display_window(2.0), (0.0, 20.0));

        let late = segment(2, 120.0, 150.0);
        assert!(late.contains(118.0, 2.0));
        assert!(late.contains(150.0, 2.0));
        assert!(!late.contains(117.9, 2.0));
        assert!(!late.contains(150.1, 2.0));
    }

    #[test]
    fn test_store_replace_and_patch() {
        let mut store = SegmentStore::new();
        store.replace(SegmentOrigin::Lookup, vec![segment(1, 10.0, 20.0), segment(2, 30.0, 40.0)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.origin(), Some(SegmentOrigin::Lookup));

        store.patch(1, segment(2, 31.0, 41.0)).unwrap();
        assert_eq!(store.get(1).unwrap().start_sec, 31.0);

        // Wrong id at that index is refused
        assert!(store.patch(0, segment(2, 1.0, 2.0)).is_err());
        assert!(store.patch(5, segment(1, 1.0, 2.0)).is_err());
        assert_eq!(store.get(0).unwrap().start_sec, 10.0);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.origin(), None);
    }
}
