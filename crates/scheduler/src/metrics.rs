use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct Counters {
    scheduled: AtomicU64,
    coalesced: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped_busy: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub(crate) fn record_scheduled(&self) {
        increment(&self.scheduled);
    }

    pub(crate) fn record_coalesced(&self) {
        increment(&self.coalesced);
    }

    pub(crate) fn record_started(&self) {
        increment(&self.started);
    }

    pub(crate) fn record_completed(&self) {
        increment(&self.completed);
    }

    pub(crate) fn record_failed(&self) {
        increment(&self.failed);
    }

    pub(crate) fn record_dropped_busy(&self) {
        increment(&self.dropped_busy);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub coalesced: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped_busy: u64,
}
