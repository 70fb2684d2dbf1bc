//! Navigation and media-swap detection.
//!
//! The watcher is the only component that listens to raw page signals. It
//! decides whether the displayed content really changed, invalidates the
//! classification cache and element handle accordingly, and publishes a
//! [`Trigger`](tubepace_scheduler::Trigger) on the signal bus.

pub mod phase;
pub mod watcher;

pub use phase::WatchPhase;
pub use watcher::{Change, NavigationWatcher, WatcherOptions};

/// Trigger keys published by the watcher.
pub mod keys {
    pub const NAVIGATION: &str = "navigation";
    pub const MEDIA: &str = "media";
}
