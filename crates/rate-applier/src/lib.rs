//! Playback-rate application with one post-settle verification.
//!
//! The host player may put its own rate back shortly after we write ours.
//! After every effective write a single verification runs once the settle
//! delay has passed; if the rate drifted it is written exactly once more and
//! then left alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{AdapterError, PagePort};
use media_locator::ElementHandle;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tubepace_core_types::{NodeRef, PlaybackRate};
use tubepace_scheduler::{retry_until, RetryPolicy};

#[derive(Debug, Error, Clone)]
pub enum ApplyError {
    #[error("media node {node} is no longer attached")]
    Detached { node: NodeRef },
    #[error("page error while applying rate: {0}")]
    Page(#[from] AdapterError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplierOptions {
    pub epsilon: f64,
    pub settle_delay: Duration,
}

impl Default for ApplierOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// How the post-settle check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Held,
    Reapplied,
    Detached,
    Failed,
}

pub struct RateApplier {
    page: Arc<dyn PagePort>,
    options: ApplierOptions,
    verification: Mutex<Option<JoinHandle<VerifyOutcome>>>,
    writes: Arc<AtomicU64>,
}

impl RateApplier {
    pub fn new(page: Arc<dyn PagePort>, options: ApplierOptions) -> Self {
        Self {
            page,
            options,
            verification: Mutex::new(None),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set `target` on the element unless it is already within epsilon.
    ///
    /// Returns whether a write happened.
    pub async fn apply(&self, handle: &ElementHandle, target: PlaybackRate) -> Result<bool, ApplyError> {
        let probe = self
            .page
            .probe_media(&handle.node)
            .await?
            .ok_or_else(|| ApplyError::Detached {
                node: handle.node.clone(),
            })?;

        let target = target.value();
        if (probe.playback_rate - target).abs() <= self.options.epsilon {
            debug!(
                target: "tubepace-applier",
                node = %handle.node,
                rate = probe.playback_rate,
                "rate already at target"
            );
            return Ok(false);
        }

        let applied = self.page.set_playback_rate(&handle.node, target).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "tubepace-applier",
            node = %handle.node,
            from = probe.playback_rate,
            to = applied,
            "playback rate applied"
        );
        self.spawn_verification(handle.node.clone(), target);
        Ok(true)
    }

    /// Await the pending verification, if any.
    pub async fn wait_verification(&self) -> Option<VerifyOutcome> {
        let pending = self.verification.lock().take()?;
        pending.await.ok()
    }

    pub fn verification_pending(&self) -> bool {
        self.verification
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Drop any scheduled verification, used when the element goes away.
    pub fn cancel_verification(&self) {
        if let Some(task) = self.verification.lock().take() {
            task.abort();
        }
    }

    /// Total rate writes made, verification re-applications included.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn spawn_verification(&self, node: NodeRef, target: f64) {
        let page = Arc::clone(&self.page);
        let options = self.options.clone();
        let writes = Arc::clone(&self.writes);
        let task = tokio::spawn(async move { verify_once(page, options, writes, node, target).await });
        if let Some(previous) = self.verification.lock().replace(task) {
            previous.abort();
        }
    }
}

async fn verify_once(
    page: Arc<dyn PagePort>,
    options: ApplierOptions,
    writes: Arc<AtomicU64>,
    node: NodeRef,
    target: f64,
) -> VerifyOutcome {
    let policy = RetryPolicy::once_after(options.settle_delay);
    let epsilon = options.epsilon;
    let observed = Mutex::new(None);
    let held = retry_until(&policy, |_| {
        let page = &page;
        let node = &node;
        let observed = &observed;
        async move {
            match page.probe_media(node).await {
                Ok(Some(probe)) => {
                    *observed.lock() = Some(Ok(probe.playback_rate));
                    ((probe.playback_rate - target).abs() <= epsilon).then_some(())
                }
                Ok(None) => {
                    *observed.lock() = Some(Err(None));
                    None
                }
                Err(err) => {
                    *observed.lock() = Some(Err(Some(err)));
                    None
                }
            }
        }
    })
    .await;

    if held.is_ok() {
        debug!(target: "tubepace-applier", %node, "rate held after settle delay");
        return VerifyOutcome::Held;
    }

    let observed = observed.lock().take();
    match observed {
        Some(Ok(rate)) => {
            warn!(
                target: "tubepace-applier",
                %node,
                observed = rate,
                target = target,
                "host reverted playback rate, re-applying once"
            );
            match page.set_playback_rate(&node, target).await {
                Ok(_) => {
                    writes.fetch_add(1, Ordering::Relaxed);
                    VerifyOutcome::Reapplied
                }
                Err(err) => {
                    warn!(target: "tubepace-applier", %node, %err, "re-application failed");
                    VerifyOutcome::Failed
                }
            }
        }
        Some(Err(None)) => {
            debug!(target: "tubepace-applier", %node, "element detached before verification");
            VerifyOutcome::Detached
        }
        Some(Err(Some(err))) => {
            warn!(target: "tubepace-applier", %node, %err, "verification probe failed");
            VerifyOutcome::Failed
        }
        None => VerifyOutcome::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{MediaSpec, MemoryPage};
    use media_locator::MediaStrategy;
    use tokio::time::sleep;

    async fn setup(rate: f64) -> (Arc<MemoryPage>, ElementHandle, RateApplier) {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        let node = page.add_media(MediaSpec::new("blob:a").rate(rate));
        let probe = page.probe_media(&node).await.unwrap().unwrap();
        let handle = ElementHandle::new(probe, MediaStrategy::AnyVideo);
        let applier = RateApplier::new(page.clone(), ApplierOptions::default());
        (page, handle, applier)
    }

    fn rate(value: f64) -> PlaybackRate {
        PlaybackRate::new(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn second_apply_is_a_no_op() {
        let (page, handle, applier) = setup(1.0).await;

        assert!(applier.apply(&handle, rate(1.5)).await.unwrap());
        assert!(!applier.apply(&handle, rate(1.5)).await.unwrap());
        assert_eq!(page.rate_writes(), 1);
        assert_eq!(applier.wait_verification().await, Some(VerifyOutcome::Held));
        assert_eq!(page.rate_of(&handle.node), Some(1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn within_epsilon_is_left_alone() {
        let (page, handle, applier) = setup(1.245).await;
        assert!(!applier.apply(&handle, rate(1.25)).await.unwrap());
        assert_eq!(page.rate_writes(), 0);
        assert!(!applier.verification_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn single_revert_is_corrected_once() {
        let (page, handle, applier) = setup(1.0).await;
        page.revert_next_writes(1, 1.0);

        assert!(applier.apply(&handle, rate(1.75)).await.unwrap());
        assert_eq!(applier.wait_verification().await, Some(VerifyOutcome::Reapplied));
        assert_eq!(page.rate_of(&handle.node), Some(1.75));
        assert_eq!(page.rate_writes(), 2);
        assert_eq!(applier.writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_revert_is_not_fought() {
        let (page, handle, applier) = setup(1.0).await;
        page.revert_next_writes(100, 1.0);

        applier.apply(&handle, rate(2.0)).await.unwrap();
        assert_eq!(applier.wait_verification().await, Some(VerifyOutcome::Reapplied));
        sleep(Duration::from_secs(30)).await;

        assert_eq!(page.rate_writes(), 2);
        assert_eq!(page.rate_of(&handle.node), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn detached_element_is_an_error() {
        let (page, handle, applier) = setup(1.0).await;
        page.detach_media(&handle.node);
        let err = applier.apply(&handle, rate(1.5)).await.unwrap_err();
        assert!(matches!(err, ApplyError::Detached { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn detach_before_settle_skips_reapply() {
        let (page, handle, applier) = setup(1.0).await;
        applier.apply(&handle, rate(1.5)).await.unwrap();
        page.detach_media(&handle.node);

        assert_eq!(applier.wait_verification().await, Some(VerifyOutcome::Detached));
        assert_eq!(page.rate_writes(), 1);
    }
}
