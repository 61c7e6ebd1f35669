// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Sliding-window variance tracker over acceleration magnitudes

use std::collections::VecDeque;

/// Fixed-capacity sliding window of acceleration magnitudes with on-demand
/// mean/variance.
///
/// The window is FIFO: once full, pushing a sample evicts the oldest one.
/// Statistics are withheld until `min_samples` magnitudes have been observed;
/// a shorter window is too noisy to classify against the variance threshold.
pub struct VarianceTracker {
    window: VecDeque<f64>,
    capacity: usize,
    min_samples: usize,
}

impl VarianceTracker {
    /// Create a tracker with the given window capacity and minimum sample
    /// count. `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            min_samples: min_samples.max(1),
        }
    }

    /// Append a magnitude, evicting the oldest sample at capacity.
    pub fn push(&mut self, magnitude: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(magnitude);
    }

    /// Population variance and mean of the buffered magnitudes.
    ///
    /// Returns `None` until at least `min_samples` samples are buffered.
    pub fn variance_and_mean(&self) -> Option<(f64, f64)> {
        if self.window.len() < self.min_samples {
            return None;
        }

        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|&x| (x - mean).powi(2))
            .sum::<f64>()
            / n;

        Some((variance, mean))
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True when no samples have been observed yet.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Drop all buffered samples.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}
