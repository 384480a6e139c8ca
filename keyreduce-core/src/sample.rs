//! Samples, sampling ranges and segments

use serde::{Deserialize, Serialize};

/// A single (time, value) point of the dense sample grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Closed time interval `[start, end]` to be sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Span of samples between two consecutive keyframes.
///
/// `start` and `end` are indices into the sample sequence; both endpoints
/// belong to the segment, so neighbouring segments share one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of samples spanned, endpoints included.
    pub fn sample_count(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    /// Indices of the samples strictly between the two keyframes.
    pub fn interior(&self) -> std::ops::Range<usize> {
        (self.start + 1)..self.end.max(self.start + 1)
    }

    /// Duration of the segment within `samples`.
    pub fn duration(&self, samples: &[Sample]) -> f64 {
        samples[self.end].time - samples[self.start].time
    }
}
