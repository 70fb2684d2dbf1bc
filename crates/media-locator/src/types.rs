use serde::Serialize;
use tubepace_core_types::{ready_state, MediaProbe, NodeRef};
use tubepace_scheduler::RetryPolicy;

/// Selector strategies in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaStrategy {
    /// The main player's video element
    MoviePlayer,
    /// The currently active reel in the shorts feed
    ActiveReel,
    /// Any main-video element outside the player container
    MainVideo,
    /// Any video at all
    AnyVideo,
}

impl MediaStrategy {
    pub fn fallback_chain() -> [MediaStrategy; 4] {
        [
            MediaStrategy::MoviePlayer,
            MediaStrategy::ActiveReel,
            MediaStrategy::MainVideo,
            MediaStrategy::AnyVideo,
        ]
    }

    pub fn selector(self) -> &'static str {
        match self {
            MediaStrategy::MoviePlayer => "#movie_player video.html5-main-video",
            MediaStrategy::ActiveReel => "ytd-reel-video-renderer[is-active] video",
            MediaStrategy::MainVideo => "video.html5-main-video",
            MediaStrategy::AnyVideo => "video",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MediaStrategy::MoviePlayer => "movie_player",
            MediaStrategy::ActiveReel => "active_reel",
            MediaStrategy::MainVideo => "main_video",
            MediaStrategy::AnyVideo => "any_video",
        }
    }
}

/// Reference to the active media element and the source it had when last
/// observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementHandle {
    pub node: NodeRef,
    pub source: String,
    pub strategy: MediaStrategy,
    pub last_probe: MediaProbe,
}

impl ElementHandle {
    pub fn new(probe: MediaProbe, strategy: MediaStrategy) -> Self {
        Self {
            node: probe.node.clone(),
            source: probe.src.clone(),
            strategy,
            last_probe: probe,
        }
    }

    pub fn rate(&self) -> f64 {
        self.last_probe.playback_rate
    }

    pub fn ready_state(&self) -> u8 {
        self.last_probe.ready_state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatorOptions {
    pub retry: RetryPolicy,
    pub min_ready_state: u8,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            min_ready_state: ready_state::HAVE_METADATA,
        }
    }
}

impl LocatorOptions {
    pub fn qualifies(&self, probe: &MediaProbe) -> bool {
        probe.connected
            && probe.visible
            && !probe.src.is_empty()
            && probe.ready_state >= self.min_ready_state
    }
}

/// Outcome of reconciling a source-attribute change with the held handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChange {
    /// The held element still shows the same source.
    Unchanged,
    /// The held element now plays something else; the handle was dropped.
    Swapped,
    /// Some element other than the held one changed, or nothing is held.
    Untracked,
}
