//! Debounced, single-flight evaluation scheduling.
//!
//! Each key owns at most one pending evaluation; scheduling the same key
//! again restarts its debounce window. When a window elapses the evaluation
//! runs only if no other evaluation is in flight, otherwise it is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::metrics::Counters;
use crate::model::{EvaluationKind, SchedulerConfig, Trigger};
use crate::metrics::SchedulerStats;

/// Whether an immediate run got past the single-flight gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Ran(Result<(), SchedulerError>),
    /// Another evaluation was in flight; nothing ran.
    Busy,
}

/// The work run once a trigger survives debouncing.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    async fn evaluate(&self, trigger: Trigger) -> Result<(), SchedulerError>;
}

struct PendingSlot {
    generation: u64,
    kind: EvaluationKind,
    handle: JoinHandle<()>,
}

struct Inner {
    config: SchedulerConfig,
    pipeline: Arc<dyn Pipeline>,
    pending: Mutex<HashMap<String, PendingSlot>>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    counters: Counters,
}

/// Releases the in-flight flag however the evaluation ends, panics included.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ReactionScheduler {
    inner: Arc<Inner>,
}

impl ReactionScheduler {
    pub fn new(config: SchedulerConfig, pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                pipeline,
                pending: Mutex::new(HashMap::new()),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Replace any pending evaluation for `trigger.key` with a fresh one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, trigger: Trigger) {
        let inner = &self.inner;
        inner.counters.record_scheduled();

        let mut pending = inner.pending.lock();
        let mut kind = trigger.kind;
        if let Some(previous) = pending.remove(&trigger.key) {
            previous.handle.abort();
            kind = kind.merge(previous.kind);
            inner.counters.record_coalesced();
            debug!(
                target: "tubepace-scheduler",
                key = %trigger.key,
                kind = %kind,
                "pending evaluation superseded"
            );
        }

        let generation = inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let key = trigger.key.clone();
        let trigger = Trigger { kind, ..trigger };
        let task_inner = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            sleep(task_inner.config.debounce).await;
            run_if_current(task_inner, trigger, generation).await;
        });
        pending.insert(
            key,
            PendingSlot {
                generation,
                kind,
                handle,
            },
        );
    }

    pub fn in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.counters.snapshot()
    }

    /// Run `trigger` now, skipping the debounce window but not the
    /// single-flight gate.
    pub async fn run_now(&self, trigger: Trigger) -> Admission {
        self.inner.counters.record_scheduled();
        run_gated(&self.inner, trigger).await
    }

    /// Abort every pending evaluation. An evaluation already running is
    /// left to finish.
    pub fn cancel_pending(&self) {
        for (_, slot) in self.inner.pending.lock().drain() {
            slot.handle.abort();
        }
    }
}

async fn run_if_current(inner: Arc<Inner>, trigger: Trigger, generation: u64) {
    {
        let mut pending = inner.pending.lock();
        match pending.get(&trigger.key) {
            Some(slot) if slot.generation == generation => {
                pending.remove(&trigger.key);
            }
            _ => return,
        }
    }

    let key = trigger.key.clone();
    if let Admission::Ran(Err(err)) = run_gated(&inner, trigger).await {
        warn!(target: "tubepace-scheduler", %key, %err, "evaluation failed");
    }
}

async fn run_gated(inner: &Inner, trigger: Trigger) -> Admission {
    if inner
        .in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        inner.counters.record_dropped_busy();
        debug!(
            target: "tubepace-scheduler",
            key = %trigger.key,
            "evaluation dropped: another evaluation is in flight"
        );
        return Admission::Busy;
    }
    let _guard = FlightGuard(&inner.in_flight);

    inner.counters.record_started();
    let result = inner.pipeline.evaluate(trigger).await;
    match &result {
        Ok(()) => inner.counters.record_completed(),
        Err(_) => inner.counters.record_failed(),
    }
    Admission::Ran(result)
}
