use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{PageEvent, PagePort};
use content_classifier::ClassificationCache;
use media_locator::{ElementLocator, SourceChange};
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tubepace_core_types::ContentIdentity;
use tubepace_event_bus::InMemoryBus;
use tubepace_scheduler::Trigger;

use crate::keys;
use crate::phase::WatchPhase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Location polling interval; `None` disables polling.
    pub poll_interval: Option<Duration>,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            poll_interval: Some(Duration::from_secs(1)),
        }
    }
}

/// Result of comparing a new location with the current content identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Different content; caches and handle were invalidated.
    Major(ContentIdentity),
    /// Same content, only cosmetic churn.
    Minor,
}

struct WatcherState {
    page: Arc<dyn PagePort>,
    cache: Arc<ClassificationCache>,
    locator: Arc<ElementLocator>,
    bus: Arc<InMemoryBus<Trigger>>,
    identity: Mutex<Option<ContentIdentity>>,
    phase: Mutex<WatchPhase>,
    navigations: AtomicU64,
    reloads: AtomicU64,
}

pub struct NavigationWatcher {
    state: Arc<WatcherState>,
    options: WatcherOptions,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl NavigationWatcher {
    pub fn new(
        page: Arc<dyn PagePort>,
        cache: Arc<ClassificationCache>,
        locator: Arc<ElementLocator>,
        bus: Arc<InMemoryBus<Trigger>>,
        options: WatcherOptions,
    ) -> Self {
        Self {
            state: Arc::new(WatcherState {
                page,
                cache,
                locator,
                bus,
                identity: Mutex::new(None),
                phase: Mutex::new(WatchPhase::Idle),
                navigations: AtomicU64::new(0),
                reloads: AtomicU64::new(0),
            }),
            options,
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Seed the content identity and start listening to page signals.
    pub async fn start(&self) {
        match self.state.page.location().await {
            Ok(url) => {
                let identity = ContentIdentity::from_location(&url);
                debug!(target: "tubepace-watcher", %identity, "initial content identity");
                *self.state.identity.lock() = Some(identity);
            }
            Err(err) => {
                warn!(target: "tubepace-watcher", %err, "could not read initial location");
            }
        }

        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
        tasks.push(spawn_event_loop(Arc::clone(&self.state), self.shutdown.clone()));
        if let Some(interval) = self.options.poll_interval.filter(|d| !d.is_zero()) {
            tasks.push(spawn_poll_loop(
                Arc::clone(&self.state),
                interval,
                self.shutdown.clone(),
            ));
        }
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Reconcile one page signal; returns the trigger published, if any.
    pub async fn observe(&self, event: PageEvent) -> Option<Trigger> {
        self.state.observe(event).await
    }

    /// Read the location once and react if the identity moved.
    pub async fn poll_once(&self) -> Option<Trigger> {
        self.state.poll_once().await
    }

    pub fn identity(&self) -> Option<ContentIdentity> {
        self.state.identity.lock().clone()
    }

    pub fn phase(&self) -> WatchPhase {
        *self.state.phase.lock()
    }

    /// The debounce window elapsed and an evaluation is starting.
    pub fn settle(&self) {
        *self.state.phase.lock() = WatchPhase::Idle;
    }

    /// Confirmed navigations so far.
    pub fn navigations(&self) -> u64 {
        self.state.navigations.load(Ordering::Relaxed)
    }

    pub fn reloads(&self) -> u64 {
        self.state.reloads.load(Ordering::Relaxed)
    }
}

impl Drop for NavigationWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl WatcherState {
    async fn observe(&self, event: PageEvent) -> Option<Trigger> {
        self.set_phase(WatchPhase::SignalReceived);
        let kind = event.kind();
        let trigger = match event {
            PageEvent::HostNavigation { url, .. } | PageEvent::LocationChanged { url } => {
                Some(self.on_location(&url, kind).await)
            }
            PageEvent::MediaSourceChanged { node, src } => {
                match self.locator.sync_source(&node, &src) {
                    SourceChange::Swapped => {
                        // Same URL can still mean new content (autoplay, playlists).
                        if let Ok(url) = self.page.location().await {
                            self.compare_identity(&url, kind);
                        }
                        Some(Trigger::full(keys::MEDIA, kind))
                    }
                    SourceChange::Untracked if self.locator.current().is_none() => {
                        Some(Trigger::full(keys::MEDIA, kind))
                    }
                    SourceChange::Untracked | SourceChange::Unchanged => None,
                }
            }
            PageEvent::MediaReady { node, phase } => {
                debug!(target: "tubepace-watcher", %node, %phase, "media readiness signal");
                Some(Trigger::light(keys::MEDIA, kind))
            }
            PageEvent::DocumentReloaded { url } => {
                self.reset(&url);
                Some(Trigger::full(keys::NAVIGATION, kind))
            }
        };

        match trigger {
            Some(trigger) => {
                self.bus.emit(trigger.clone());
                self.set_phase(WatchPhase::Debouncing);
                Some(trigger)
            }
            None => {
                self.set_phase(WatchPhase::Idle);
                None
            }
        }
    }

    async fn poll_once(&self) -> Option<Trigger> {
        let url = match self.page.location().await {
            Ok(url) => url,
            Err(err) => {
                debug!(target: "tubepace-watcher", %err, "location poll failed");
                return None;
            }
        };
        let moved = {
            let current = self.identity.lock();
            current.as_ref() != Some(&ContentIdentity::from_location(&url))
        };
        if !moved {
            return None;
        }
        self.observe(PageEvent::LocationChanged { url }).await
    }

    async fn on_location(&self, url: &str, reason: &str) -> Trigger {
        match self.compare_identity(url, reason) {
            Change::Major(_) => Trigger::full(keys::NAVIGATION, reason),
            Change::Minor => {
                // Keep the handle only while it is still attached and unchanged.
                if let Some(held) = self.locator.current() {
                    let intact = matches!(
                        self.page.probe_media(&held.node).await,
                        Ok(Some(probe)) if probe.src == held.source
                    );
                    if !intact {
                        self.locator.invalidate();
                        return Trigger::full(keys::NAVIGATION, reason);
                    }
                }
                Trigger::light(keys::NAVIGATION, reason)
            }
        }
    }

    /// Invalidate cache and handle exactly when the identity changes.
    fn compare_identity(&self, url: &str, reason: &str) -> Change {
        let next = ContentIdentity::from_location(url);
        let mut current = self.identity.lock();
        if current.as_ref() == Some(&next) {
            debug!(target: "tubepace-watcher", identity = %next, reason, "minor change, identity unchanged");
            return Change::Minor;
        }
        let previous = current.replace(next.clone());
        drop(current);

        self.cache.clear();
        self.locator.invalidate();
        self.navigations.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "tubepace-watcher",
            from = previous.as_ref().map(ContentIdentity::as_str).unwrap_or("-"),
            to = %next,
            reason,
            "content changed"
        );
        Change::Major(next)
    }

    fn reset(&self, url: &str) {
        *self.identity.lock() = Some(ContentIdentity::from_location(url));
        self.cache.clear();
        self.locator.invalidate();
        self.reloads.fetch_add(1, Ordering::Relaxed);
        info!(target: "tubepace-watcher", %url, "document reloaded, state reset");
    }

    fn set_phase(&self, phase: WatchPhase) {
        *self.phase.lock() = phase;
    }
}

fn spawn_event_loop(state: Arc<WatcherState>, shutdown: CancellationToken) -> JoinHandle<()> {
    let mut rx = state.page.subscribe();
    tokio::spawn(async move {
        debug!(target: "tubepace-watcher", "navigation watcher started");
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => {
                        state.observe(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "tubepace-watcher", skipped, "page signals lost, forcing full evaluation");
                        state.bus.emit(Trigger::full(keys::NAVIGATION, "lagged"));
                    }
                    Err(RecvError::Closed) => {
                        debug!(target: "tubepace-watcher", "page signal channel closed");
                        break;
                    }
                }
            }
        }
        debug!(target: "tubepace-watcher", "navigation watcher exited");
    })
}

fn spawn_poll_loop(
    state: Arc<WatcherState>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    state.poll_once().await;
                }
            }
        }
    })
}
