use std::collections::VecDeque;
use std::time::Duration;

/// Fixed-capacity window of recent durations with percentile lookup.
///
/// Samples are kept twice: in arrival order (to know which one to evict)
/// and sorted (to answer percentile queries without re-sorting).
#[derive(Debug, Clone)]
pub struct RollingDurationHistory {
    capacity: usize,
    chronological: VecDeque<Duration>,
    sorted: Vec<Duration>,
}

impl RollingDurationHistory {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "history capacity must be positive");
        Self {
            capacity: capacity.max(1),
            chronological: VecDeque::with_capacity(capacity),
            sorted: Vec::with_capacity(capacity),
        }
    }

    /// Add a sample, evicting the oldest one once the window is full.
    pub fn insert_sample(&mut self, sample: Duration) {
        if self.chronological.len() == self.capacity {
            if let Some(oldest) = self.chronological.pop_front() {
                if let Ok(idx) = self.sorted.binary_search(&oldest) {
                    self.sorted.remove(idx);
                }
            }
        }
        self.chronological.push_back(sample);
        let idx = self.sorted.partition_point(|s| *s <= sample);
        self.sorted.insert(idx, sample);
    }

    /// The `percentile`-th (0..=100) sample, or zero when empty.
    pub fn percentile(&self, percentile: f64) -> Duration {
        let n = self.sorted.len();
        if n == 0 {
            return Duration::ZERO;
        }
        let fraction = percentile / 100.0;
        if fraction <= 0.0 {
            return self.sorted[0];
        }
        if fraction >= 1.0 {
            return self.sorted[n - 1];
        }
        let rank = (fraction * n as f64).ceil() as usize;
        self.sorted[rank.clamp(1, n) - 1]
    }

    pub fn clear(&mut self) {
        self.chronological.clear();
        self.sorted.clear();
    }

    pub fn len(&self) -> usize {
        self.chronological.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chronological.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
