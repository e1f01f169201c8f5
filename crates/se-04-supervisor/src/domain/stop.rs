//! Stop gap: consecutive empty block reports seen by the collector.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct StopSignal {
    gap: AtomicUsize,
    threshold: usize,
}

impl StopSignal {
    pub fn new(threshold: usize) -> Self {
        Self {
            gap: AtomicUsize::new(0),
            threshold,
        }
    }

    pub fn inc(&self) {
        self.gap.fetch_add(1, Ordering::AcqRel);
    }

    pub fn reset(&self) {
        self.gap.store(0, Ordering::Release);
    }

    pub fn gap(&self) -> usize {
        self.gap.load(Ordering::Acquire)
    }

    /// Whether enough empty reports arrived in a row to end the run.
    pub fn gap_enough(&self) -> bool {
        self.gap() >= self.threshold
    }
}
