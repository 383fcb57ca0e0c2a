//! Latency history of one block node.

use std::collections::VecDeque;

/// Samples considered by [`LatencyTracker::latency`].
pub const LATENCY_WINDOW: usize = 5;

/// Latency reported before any sample was recorded.
pub const UNMEASURED: i64 = i64::MIN;

/// Keeps the most recent latency samples and reduces them to one value used
/// to break ties between nodes.
#[derive(Clone, Debug, Default)]
pub struct LatencyTracker {
    samples: VecDeque<i64>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency_ms: i64) {
        if self.samples.len() == LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    /// Lower median of the last [`LATENCY_WINDOW`] samples, [`UNMEASURED`]
    /// when there are none.
    pub fn latency(&self) -> i64 {
        if self.samples.is_empty() {
            return UNMEASURED;
        }
        let mut sorted: Vec<i64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        sorted[(sorted.len() - 1) / 2]
    }

    pub fn is_measured(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
