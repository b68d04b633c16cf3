use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters of the background expiry sweep
#[derive(Debug, Default)]
pub(crate) struct SweeperStats {
    /// Number of completed sweep passes
    runs: AtomicUsize,
    /// Number of passes that failed with a storage error
    failures: AtomicUsize,
    /// Total number of records removed
    removed: AtomicUsize,
}

impl SweeperStats {
    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::Relaxed)
    }

    pub(crate) fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn removed(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
    }

    /// Records a successful pass that removed `count` records
    pub(crate) fn record_run(&self, count: usize) {
        self.removed.fetch_add(count, Ordering::Relaxed);
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}
