//! In-memory page used by tests and dry runs.
//!
//! Markers and media elements are registered against the exact selector
//! strings the pipeline queries. Media elements also match the bare `video`
//! selector. The host's habit of reverting a freshly written rate is modelled
//! with [`MemoryPage::revert_next_writes`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tubepace_core_types::{ready_state, MarkerNode, MediaProbe, NodeRef};

use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::PageEvent;
use crate::port::PagePort;

/// Description of a media element to insert.
#[derive(Clone, Debug)]
pub struct MediaSpec {
    pub src: String,
    pub selectors: Vec<String>,
    pub visible: bool,
    pub ready_state: u8,
    pub playback_rate: f64,
}

impl MediaSpec {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            selectors: Vec::new(),
            visible: true,
            ready_state: ready_state::HAVE_ENOUGH_DATA,
            playback_rate: 1.0,
        }
    }

    pub fn matching(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn ready(mut self, level: u8) -> Self {
        self.ready_state = level;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }
}

#[derive(Debug)]
struct MediaElement {
    probe: MediaProbe,
    selectors: Vec<String>,
    pending_revert: Option<f64>,
}

impl MediaElement {
    fn matches(&self, selector: &str) -> bool {
        selector == "video" || self.selectors.iter().any(|s| s == selector)
    }

    fn settle(&mut self) {
        if let Some(rate) = self.pending_revert.take() {
            self.probe.playback_rate = rate;
        }
    }
}

#[derive(Debug)]
struct HostRevert {
    remaining: usize,
    to: f64,
}

#[derive(Debug, Default)]
struct MemoryDocument {
    url: String,
    markers: HashMap<String, Vec<MarkerNode>>,
    media: Vec<MediaElement>,
    next_node: u64,
    revert: Option<HostRevert>,
    failing: bool,
}

#[derive(Debug, Default)]
struct Counters {
    location_reads: AtomicUsize,
    marker_queries: AtomicUsize,
    media_queries: AtomicUsize,
    rate_writes: AtomicUsize,
}

/// Simulated host document implementing [`PagePort`].
pub struct MemoryPage {
    doc: Mutex<MemoryDocument>,
    events: broadcast::Sender<PageEvent>,
    counters: Counters,
}

impl MemoryPage {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            doc: Mutex::new(MemoryDocument {
                url: url.into(),
                ..MemoryDocument::default()
            }),
            events,
            counters: Counters::default(),
        })
    }

    /// Change the location without raising any event, as a silent
    /// history push would.
    pub fn set_location(&self, url: impl Into<String>) {
        self.doc.lock().url = url.into();
    }

    /// Change the location and raise the host's navigation-finished signal.
    pub fn navigate(&self, url: impl Into<String>) {
        let url = url.into();
        self.set_location(url.clone());
        self.emit(PageEvent::HostNavigation {
            name: "yt-navigate-finish".to_string(),
            url,
        });
    }

    pub fn add_marker(&self, selector: impl Into<String>, marker: MarkerNode) {
        self.doc
            .lock()
            .markers
            .entry(selector.into())
            .or_default()
            .push(marker);
    }

    pub fn clear_markers(&self, selector: &str) {
        self.doc.lock().markers.remove(selector);
    }

    pub fn add_media(&self, spec: MediaSpec) -> NodeRef {
        let mut doc = self.doc.lock();
        doc.next_node += 1;
        let node = NodeRef(format!("media-{}", doc.next_node));
        doc.media.push(MediaElement {
            probe: MediaProbe {
                node: node.clone(),
                src: spec.src,
                visible: spec.visible,
                ready_state: spec.ready_state,
                playback_rate: spec.playback_rate,
                connected: true,
            },
            selectors: spec.selectors,
            pending_revert: None,
        });
        node
    }

    /// Replace the element's source in place and raise the attribute signal.
    pub fn swap_source(&self, node: &NodeRef, src: impl Into<String>) {
        let src = src.into();
        {
            let mut doc = self.doc.lock();
            if let Some(element) = doc.media.iter_mut().find(|m| &m.probe.node == node) {
                element.probe.src = src.clone();
            }
        }
        self.emit(PageEvent::MediaSourceChanged {
            node: node.clone(),
            src,
        });
    }

    pub fn detach_media(&self, node: &NodeRef) {
        let mut doc = self.doc.lock();
        if let Some(element) = doc.media.iter_mut().find(|m| &m.probe.node == node) {
            element.probe.connected = false;
        }
    }

    pub fn set_ready_state(&self, node: &NodeRef, level: u8) {
        let mut doc = self.doc.lock();
        if let Some(element) = doc.media.iter_mut().find(|m| &m.probe.node == node) {
            element.probe.ready_state = level;
        }
    }

    /// Rate change made by the host itself, not counted as a pipeline write.
    pub fn host_set_rate(&self, node: &NodeRef, rate: f64) {
        let mut doc = self.doc.lock();
        if let Some(element) = doc.media.iter_mut().find(|m| &m.probe.node == node) {
            element.probe.playback_rate = rate;
            element.pending_revert = None;
        }
    }

    /// The next `count` rate writes are accepted, then reverted to `to`
    /// before anyone reads the element again.
    pub fn revert_next_writes(&self, count: usize, to: f64) {
        self.doc.lock().revert = Some(HostRevert {
            remaining: count,
            to,
        });
    }

    pub fn fail_queries(&self, failing: bool) {
        self.doc.lock().failing = failing;
    }

    pub fn emit(&self, event: PageEvent) {
        let _ = self.events.send(event);
    }

    pub fn rate_of(&self, node: &NodeRef) -> Option<f64> {
        let mut doc = self.doc.lock();
        doc.media
            .iter_mut()
            .find(|m| &m.probe.node == node)
            .map(|element| {
                element.settle();
                element.probe.playback_rate
            })
    }

    pub fn location_reads(&self) -> usize {
        self.counters.location_reads.load(Ordering::SeqCst)
    }

    pub fn marker_queries(&self) -> usize {
        self.counters.marker_queries.load(Ordering::SeqCst)
    }

    pub fn media_queries(&self) -> usize {
        self.counters.media_queries.load(Ordering::SeqCst)
    }

    pub fn rate_writes(&self) -> usize {
        self.counters.rate_writes.load(Ordering::SeqCst)
    }

    fn check_failing(doc: &MemoryDocument) -> Result<(), AdapterError> {
        if doc.failing {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("simulated transport failure")
                .retriable(true));
        }
        Ok(())
    }
}

#[async_trait]
impl PagePort for MemoryPage {
    async fn location(&self) -> Result<String, AdapterError> {
        self.counters.location_reads.fetch_add(1, Ordering::SeqCst);
        let doc = self.doc.lock();
        Self::check_failing(&doc)?;
        Ok(doc.url.clone())
    }

    async fn query_markers(&self, selector: &str) -> Result<Vec<MarkerNode>, AdapterError> {
        self.counters.marker_queries.fetch_add(1, Ordering::SeqCst);
        let doc = self.doc.lock();
        Self::check_failing(&doc)?;
        Ok(doc.markers.get(selector).cloned().unwrap_or_default())
    }

    async fn media_candidates(&self, selector: &str) -> Result<Vec<MediaProbe>, AdapterError> {
        self.counters.media_queries.fetch_add(1, Ordering::SeqCst);
        let mut doc = self.doc.lock();
        Self::check_failing(&doc)?;
        Ok(doc
            .media
            .iter_mut()
            .filter(|element| element.probe.connected && element.matches(selector))
            .map(|element| {
                element.settle();
                element.probe.clone()
            })
            .collect())
    }

    async fn probe_media(&self, node: &NodeRef) -> Result<Option<MediaProbe>, AdapterError> {
        let mut doc = self.doc.lock();
        Self::check_failing(&doc)?;
        Ok(doc
            .media
            .iter_mut()
            .find(|element| &element.probe.node == node && element.probe.connected)
            .map(|element| {
                element.settle();
                element.probe.clone()
            }))
    }

    async fn set_playback_rate(&self, node: &NodeRef, rate: f64) -> Result<f64, AdapterError> {
        self.counters.rate_writes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.doc.lock();
        Self::check_failing(&guard)?;
        let doc = &mut *guard;
        let element = doc
            .media
            .iter_mut()
            .find(|element| &element.probe.node == node && element.probe.connected)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Detached)
                    .with_hint(format!("media node {node} is no longer attached"))
            })?;
        element.probe.playback_rate = rate;
        element.pending_revert = None;
        if let Some(revert) = doc.revert.as_mut() {
            if revert.remaining > 0 {
                revert.remaining -= 1;
                element.pending_revert = Some(revert.to);
            }
        }
        Ok(rate)
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_selectors_return_empty() {
        let page = MemoryPage::new("https://www.youtube.com/");
        assert!(page.query_markers(".missing").await.unwrap().is_empty());
        assert!(page.media_candidates("video").await.unwrap().is_empty());
        assert_eq!(page.marker_queries(), 1);
    }

    #[tokio::test]
    async fn reverted_write_is_visible_on_next_read() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        let node = page.add_media(MediaSpec::new("blob:a"));
        page.revert_next_writes(1, 1.0);

        assert_eq!(page.set_playback_rate(&node, 1.5).await.unwrap(), 1.5);
        assert_eq!(page.rate_of(&node), Some(1.0));

        page.set_playback_rate(&node, 1.5).await.unwrap();
        assert_eq!(page.rate_of(&node), Some(1.5));
        assert_eq!(page.rate_writes(), 2);
    }

    #[tokio::test]
    async fn detached_media_is_not_probed_or_written() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        let node = page.add_media(MediaSpec::new("blob:a"));
        page.detach_media(&node);
        assert!(page.probe_media(&node).await.unwrap().is_none());
        let err = page.set_playback_rate(&node, 2.0).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Detached);
    }

    #[tokio::test]
    async fn navigate_raises_host_signal() {
        let page = MemoryPage::new("https://www.youtube.com/");
        let mut rx = page.subscribe();
        page.navigate("https://www.youtube.com/watch?v=b");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.url(), Some("https://www.youtube.com/watch?v=b"));
        assert_eq!(event.kind(), "host_navigation");
    }
}
