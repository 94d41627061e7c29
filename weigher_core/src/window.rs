//! Stabilization window: the last few samples and whether they agree.

use std::collections::VecDeque;

use crate::config::StabilityCfg;

/// Fixed-capacity FIFO of recent samples.
///
/// Stable only when full and `max - min <= tolerance`. The representative
/// value is the most recently pushed sample, not an average: the scale
/// settles on one terminal value.
#[derive(Debug, Clone)]
pub struct StabilizationWindow {
    samples: VecDeque<i32>,
    capacity: usize,
    tolerance: i32,
}

impl StabilizationWindow {
    pub fn new(cfg: StabilityCfg) -> Self {
        let capacity = cfg.window.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            tolerance: cfg.tolerance,
        }
    }

    pub fn push(&mut self, sample: i32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn is_stable(&self) -> bool {
        if self.samples.len() != self.capacity {
            return false;
        }
        let (min, max) = self
            .samples
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        i64::from(max) - i64::from(min) <= i64::from(self.tolerance)
    }

    /// The stable candidate, if the window is stable.
    pub fn stable_value(&self) -> Option<i32> {
        if self.is_stable() {
            self.samples.back().copied()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
