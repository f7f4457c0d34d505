//! Rolling sample window.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One per-frame colour average from the region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Red channel mean (0-255)
    pub r: f64,
    /// Green channel mean (0-255)
    pub g: f64,
    /// Blue channel mean (0-255)
    pub b: f64,
    /// Capture time in seconds
    pub timestamp: f64,
}

impl Sample {
    pub fn new(r: f64, g: f64, b: f64, timestamp: f64) -> Self {
        Self { r, g, b, timestamp }
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Mean of the three channels.
    pub fn brightness(&self) -> f64 {
        (self.r + self.g + self.b) / 3.0
    }
}

/// The most recent samples split into per-channel arrays, oldest first.
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    pub r: Array1<f64>,
    pub g: Array1<f64>,
    pub b: Array1<f64>,
}

impl ChannelWindow {
    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

/// Fixed-capacity FIFO of samples.
///
/// Insertion past capacity evicts the oldest sample first. An absent sample
/// (no region located upstream) leaves the window untouched.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample; `None` is a no-op.
    pub fn add(&mut self, sample: Option<Sample>) {
        if let Some(sample) = sample {
            self.push(sample);
        }
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// Non-finite samples are dropped so one corrupt frame cannot poison the window.
    pub fn push(&mut self, sample: Sample) {
        if !sample.is_finite() {
            log::trace!("dropping non-finite sample at t={}", sample.timestamp);
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ratio of buffered samples to capacity (0-1).
    pub fn fill_ratio(&self) -> f64 {
        self.samples.len() as f64 / self.capacity as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// The last `n` samples (or all of them, if fewer) as channel arrays.
    pub fn latest_channels(&self, n: usize) -> ChannelWindow {
        let start = self.samples.len().saturating_sub(n);
        let window = self.samples.iter().skip(start);
        let count = self.samples.len() - start;

        let mut r = Vec::with_capacity(count);
        let mut g = Vec::with_capacity(count);
        let mut b = Vec::with_capacity(count);
        for s in window {
            r.push(s.r);
            g.push(s.g);
            b.push(s.b);
        }

        ChannelWindow {
            r: Array1::from(r),
            g: Array1::from(g),
            b: Array1::from(b),
        }
    }
}
