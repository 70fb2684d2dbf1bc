//! Shared primitives for the tubepace reaction pipeline.
//!
//! Everything here is plain data: the content [`Category`] with its fixed
//! priority table, the enumerated [`PlaybackRate`] set, the [`ContentIdentity`]
//! used to tell real navigations from cosmetic churn, and the probe records the
//! page port hands back for markers and media elements.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Shared error type for the pipeline crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaceError {
    #[error("{message}")]
    Message { message: String },
}

impl PaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Kind of content currently displayed by the host.
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Category {
    Live,
    Premiere,
    Shorts,
    Music,
    Regular,
}

impl Category {
    /// Resolution order for overlapping signals, highest priority first.
    pub const PRIORITY: [Category; 5] = [
        Category::Live,
        Category::Premiere,
        Category::Shorts,
        Category::Music,
        Category::Regular,
    ];

    /// Categories that carry their own enable flag.
    pub const TOGGLEABLE: [Category; 4] = [
        Category::Live,
        Category::Premiere,
        Category::Shorts,
        Category::Music,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Live => "live",
            Category::Premiere => "premiere",
            Category::Shorts => "shorts",
            Category::Music => "music",
            Category::Regular => "regular",
        }
    }

    /// Regular content is always overridden and has no flag of its own.
    pub fn is_toggleable(self) -> bool {
        !matches!(self, Category::Regular)
    }

    pub fn rank(self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|candidate| *candidate == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = PaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_ascii_lowercase();
        Category::PRIORITY
            .into_iter()
            .find(|category| category.name() == lower)
            .ok_or_else(|| PaceError::new(format!("unknown category: {value}")))
    }
}

/// Rates the command surface offers; stored values outside this set are rejected.
pub const ALLOWED_RATES: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

const RATE_MATCH_TOLERANCE: f64 = 1e-6;

/// A playback rate guaranteed to be a member of [`ALLOWED_RATES`].
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "f64", into = "f64")
)]
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct PlaybackRate(f64);

impl PlaybackRate {
    pub const DEFAULT: PlaybackRate = PlaybackRate(1.0);

    pub fn new(value: f64) -> Result<Self, PaceError> {
        ALLOWED_RATES
            .iter()
            .copied()
            .find(|allowed| (allowed - value).abs() < RATE_MATCH_TOLERANCE)
            .map(PlaybackRate)
            .ok_or_else(|| PaceError::new(format!("rate {value} is not in the allowed set")))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn allowed() -> impl Iterator<Item = PlaybackRate> {
        ALLOWED_RATES.into_iter().map(PlaybackRate)
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for PlaybackRate {
    type Error = PaceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        PlaybackRate::new(value)
    }
}

impl From<PlaybackRate> for f64 {
    fn from(rate: PlaybackRate) -> Self {
        rate.0
    }
}

impl FromStr for PlaybackRate {
    type Err = PaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_end_matches(|c: char| c == 'x' || c == 'X');
        let parsed: f64 = trimmed
            .parse()
            .map_err(|_| PaceError::new(format!("not a number: {value}")))?;
        PlaybackRate::new(parsed)
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Stable key derived from the location, used to tell a navigation to new
/// content apart from re-renders of the same content.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ContentIdentity(pub String);

impl ContentIdentity {
    /// Derive the identity from a location.
    ///
    /// Watch pages key on the `v` parameter, shorts and live pages on their
    /// path segment; the surface (`watch`, `shorts`, `live`, `music`) is part of
    /// the key so that the same id opened in another surface still counts as a
    /// change. Timestamps, playlists and tracking parameters are ignored.
    pub fn from_location(location: &str) -> Self {
        let Ok(url) = Url::parse(location) else {
            return Self(format!("raw:{location}"));
        };
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let surface = if host.starts_with("music.") { "music" } else { "watch" };
        let path = url.path();

        if path == "/watch" {
            if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
                if !id.is_empty() {
                    return Self(format!("{surface}:{id}"));
                }
            }
        }

        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        match (segments.next(), segments.next()) {
            (Some("shorts"), Some(id)) => Self(format!("shorts:{id}")),
            (Some("live"), Some(id)) => Self(format!("live:{id}")),
            _ => Self(format!("page:{host}{}", path.trim_end_matches('/'))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-owning reference to a node inside the host document.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeRef(pub String);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `HTMLMediaElement.readyState` levels.
pub mod ready_state {
    pub const HAVE_NOTHING: u8 = 0;
    pub const HAVE_METADATA: u8 = 1;
    pub const HAVE_CURRENT_DATA: u8 = 2;
    pub const HAVE_FUTURE_DATA: u8 = 3;
    pub const HAVE_ENOUGH_DATA: u8 = 4;
}

/// Point-in-time view of a media element.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct MediaProbe {
    pub node: NodeRef,
    pub src: String,
    pub visible: bool,
    pub ready_state: u8,
    pub playback_rate: f64,
    pub connected: bool,
}

/// A marker element matched by a selector, reduced to what the classifier reads.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkerNode {
    pub visible: bool,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
}

impl MarkerNode {
    pub fn shown() -> Self {
        Self {
            visible: true,
            ..Self::default()
        }
    }

    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Correlates the log lines of one pipeline evaluation.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EvaluationId(pub String);

impl EvaluationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_orders_live_first_and_regular_last() {
        assert_eq!(Category::PRIORITY[0], Category::Live);
        assert_eq!(Category::PRIORITY[4], Category::Regular);
        assert!(Category::Live.rank() < Category::Shorts.rank());
        assert!(!Category::Regular.is_toggleable());
        assert!(Category::TOGGLEABLE.iter().all(|c| c.is_toggleable()));
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("LIVE".parse::<Category>().unwrap(), Category::Live);
        assert_eq!(" music ".parse::<Category>().unwrap(), Category::Music);
        assert!("podcast".parse::<Category>().is_err());
    }

    #[test]
    fn rates_outside_the_allowed_set_are_rejected() {
        assert!(PlaybackRate::new(1.25).is_ok());
        assert!(PlaybackRate::new(3.0).is_err());
        assert!(PlaybackRate::new(1.1).is_err());
        assert_eq!("1.5x".parse::<PlaybackRate>().unwrap().value(), 1.5);
        assert_eq!(PlaybackRate::allowed().count(), ALLOWED_RATES.len());
    }

    #[test]
    fn identity_ignores_cosmetic_query_parameters() {
        let a = ContentIdentity::from_location("https://www.youtube.com/watch?v=abc123&t=42s");
        let b = ContentIdentity::from_location("https://www.youtube.com/watch?list=PL1&v=abc123");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "watch:abc123");
    }

    #[test]
    fn identity_distinguishes_surfaces() {
        let watch = ContentIdentity::from_location("https://www.youtube.com/watch?v=xyz");
        let shorts = ContentIdentity::from_location("https://www.youtube.com/shorts/xyz");
        let music = ContentIdentity::from_location("https://music.youtube.com/watch?v=xyz");
        assert_ne!(watch, shorts);
        assert_ne!(watch, music);
        assert_eq!(shorts.as_str(), "shorts:xyz");
        assert_eq!(
            ContentIdentity::from_location("https://www.youtube.com/live/abc").as_str(),
            "live:abc"
        );
    }

    #[test]
    fn identity_falls_back_to_path_and_raw_text() {
        assert_eq!(
            ContentIdentity::from_location("https://www.youtube.com/@channel/videos/").as_str(),
            "page:www.youtube.com/@channel/videos"
        );
        assert_eq!(
            ContentIdentity::from_location("not a url").as_str(),
            "raw:not a url"
        );
    }

    #[test]
    fn marker_builder_sets_attributes() {
        let marker = MarkerNode::shown().with_text("LIVE").with_attr("disabled", "");
        assert!(marker.visible);
        assert!(marker.has_attr("disabled"));
        assert_eq!(marker.attr("missing"), None);
    }
}
