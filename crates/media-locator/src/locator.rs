use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cdp_adapter::{AdapterError, PagePort};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tubepace_core_types::{MediaProbe, NodeRef};
use tubepace_scheduler::{retry_until, EvaluationKind, RetryPolicy};

use crate::errors::LocatorError;
use crate::types::{ElementHandle, LocatorOptions, MediaStrategy, SourceChange};

pub struct ElementLocator {
    page: Arc<dyn PagePort>,
    options: LocatorOptions,
    handle: Mutex<Option<ElementHandle>>,
}

impl ElementLocator {
    pub fn new(page: Arc<dyn PagePort>, options: LocatorOptions) -> Self {
        Self {
            page,
            options,
            handle: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Return the active media element, locating it if needed.
    ///
    /// A held handle is re-probed first and reused while it still qualifies.
    /// `Light` evaluations make a single attempt; `Full` ones follow the
    /// configured retry policy.
    pub async fn locate(&self, kind: EvaluationKind) -> Result<ElementHandle, LocatorError> {
        if let Some(handle) = self.revalidate_held().await {
            return Ok(handle);
        }

        let policy = match kind {
            EvaluationKind::Light => RetryPolicy::single(),
            EvaluationKind::Full => self.options.retry.clone(),
        };
        let failures = AtomicU32::new(0);
        let last_error: Mutex<Option<AdapterError>> = Mutex::new(None);

        let found = retry_until(&policy, |attempt| {
            let failures = &failures;
            let last_error = &last_error;
            async move {
                match self.find_once().await {
                    Ok(found) => {
                        if found.is_none() {
                            debug!(target: "tubepace-locator", attempt, "no qualifying media element yet");
                        }
                        found
                    }
                    Err(err) => {
                        debug!(target: "tubepace-locator", attempt, %err, "media query failed");
                        failures.fetch_add(1, Ordering::Relaxed);
                        *last_error.lock() = Some(err);
                        None
                    }
                }
            }
        })
        .await;

        match found {
            Ok((strategy, probe)) => Ok(self.adopt(probe, strategy)),
            Err(_) => {
                let attempts = policy.attempts();
                let last_error = last_error.lock().take();
                match last_error {
                    Some(err) if failures.load(Ordering::Relaxed) == attempts => {
                        warn!(target: "tubepace-locator", attempts, %err, "page unreachable while locating media");
                        Err(LocatorError::Page(err))
                    }
                    _ => Err(LocatorError::ElementNotFound { attempts }),
                }
            }
        }
    }

    pub fn current(&self) -> Option<ElementHandle> {
        self.handle.lock().clone()
    }

    pub fn invalidate(&self) {
        if let Some(previous) = self.handle.lock().take() {
            debug!(target: "tubepace-locator", node = %previous.node, "element handle invalidated");
        }
    }

    /// Reconcile an observed source change with the held handle.
    pub fn sync_source(&self, node: &NodeRef, src: &str) -> SourceChange {
        let mut guard = self.handle.lock();
        match guard.as_ref() {
            Some(held) if &held.node == node => {
                if held.source == src {
                    SourceChange::Unchanged
                } else {
                    info!(
                        target: "tubepace-locator",
                        %node,
                        previous = %held.source,
                        source = %src,
                        "media source swapped in place"
                    );
                    *guard = None;
                    SourceChange::Swapped
                }
            }
            _ => SourceChange::Untracked,
        }
    }

    /// Record a fresh probe of the held element without changing identity.
    pub fn refresh(&self, probe: MediaProbe) {
        let mut guard = self.handle.lock();
        if let Some(held) = guard.as_mut() {
            if held.node == probe.node && held.source == probe.src {
                held.last_probe = probe;
            }
        }
    }

    async fn revalidate_held(&self) -> Option<ElementHandle> {
        let held = self.current()?;
        match self.page.probe_media(&held.node).await {
            Ok(Some(probe)) if self.options.qualifies(&probe) => {
                if probe.src == held.source {
                    let mut handle = held;
                    handle.last_probe = probe;
                    *self.handle.lock() = Some(handle.clone());
                    Some(handle)
                } else {
                    Some(self.adopt(probe, held.strategy))
                }
            }
            Ok(_) => {
                debug!(target: "tubepace-locator", node = %held.node, "held element no longer qualifies");
                self.invalidate();
                None
            }
            Err(err) => {
                debug!(target: "tubepace-locator", node = %held.node, %err, "held element probe failed");
                self.invalidate();
                None
            }
        }
    }

    async fn find_once(&self) -> Result<Option<(MediaStrategy, MediaProbe)>, AdapterError> {
        for strategy in MediaStrategy::fallback_chain() {
            let candidates = self.page.media_candidates(strategy.selector()).await?;
            if let Some(probe) = candidates
                .into_iter()
                .find(|probe| self.options.qualifies(probe))
            {
                return Ok(Some((strategy, probe)));
            }
        }
        Ok(None)
    }

    fn adopt(&self, probe: MediaProbe, strategy: MediaStrategy) -> ElementHandle {
        let handle = ElementHandle::new(probe, strategy);
        let mut guard = self.handle.lock();
        let replaced = guard
            .as_ref()
            .map(|held| held.node != handle.node || held.source != handle.source)
            .unwrap_or(true);
        if replaced {
            info!(
                target: "tubepace-locator",
                node = %handle.node,
                source = %handle.source,
                strategy = strategy.name(),
                "media element located"
            );
        }
        *guard = Some(handle.clone());
        handle
    }
}
