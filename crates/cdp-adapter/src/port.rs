use async_trait::async_trait;
use tokio::sync::broadcast;
use tubepace_core_types::{MarkerNode, MediaProbe, NodeRef};

use crate::error::AdapterError;
use crate::events::PageEvent;

/// Everything the pipeline reads from or writes to the host document.
///
/// Absent elements are not errors: queries return empty collections and
/// probes return `None`. Errors are reserved for transport or script failures.
#[async_trait]
pub trait PagePort: Send + Sync {
    async fn location(&self) -> Result<String, AdapterError>;

    async fn query_markers(&self, selector: &str) -> Result<Vec<MarkerNode>, AdapterError>;

    async fn media_candidates(&self, selector: &str) -> Result<Vec<MediaProbe>, AdapterError>;

    async fn probe_media(&self, node: &NodeRef) -> Result<Option<MediaProbe>, AdapterError>;

    /// Set the rate and return the value read back from the element.
    async fn set_playback_rate(&self, node: &NodeRef, rate: f64) -> Result<f64, AdapterError>;

    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
}
