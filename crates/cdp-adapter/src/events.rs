use serde::{Deserialize, Serialize};
use tubepace_core_types::NodeRef;

/// Signals raised by the host page, already reduced to what the watcher needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PageEvent {
    /// One of the host's own navigation lifecycle events fired.
    HostNavigation { name: String, url: String },
    /// The structural observer saw the location change without a reload.
    LocationChanged { url: String },
    /// A media element's source attribute changed in place.
    MediaSourceChanged { node: NodeRef, src: String },
    /// A media element reported a readiness milestone.
    MediaReady { node: NodeRef, phase: String },
    /// The document was fully reloaded; every reference into it is stale.
    DocumentReloaded { url: String },
}

impl PageEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PageEvent::HostNavigation { .. } => "host_navigation",
            PageEvent::LocationChanged { .. } => "location_changed",
            PageEvent::MediaSourceChanged { .. } => "media_source_changed",
            PageEvent::MediaReady { .. } => "media_ready",
            PageEvent::DocumentReloaded { .. } => "document_reloaded",
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            PageEvent::HostNavigation { url, .. }
            | PageEvent::LocationChanged { url }
            | PageEvent::DocumentReloaded { url } => Some(url),
            _ => None,
        }
    }
}
