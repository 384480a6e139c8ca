//! Fit error evaluation

use keyreduce_core::{hermite_value, weighted_value, Sample, Segment};

/// Tangents at the two ends of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTangents {
    /// Slope leaving the start key
    pub out_slope: f64,
    /// Slope arriving at the end key
    pub in_slope: f64,
    /// Out handle of the start key, as a fraction of the segment duration
    pub out_fraction: f64,
    /// In handle of the end key, as a fraction of the segment duration
    pub in_fraction: f64,
    pub weighted: bool,
}

impl SegmentTangents {
    /// Value of the segment spanning `segment` at `time`.
    pub fn value_at(&self, samples: &[Sample], segment: Segment, time: f64) -> f64 {
        let first = samples[segment.start];
        let last = samples[segment.end];
        let dt = last.time - first.time;
        if dt <= 0.0 {
            return first.value;
        }
        let s = ((time - first.time) / dt).clamp(0.0, 1.0);
        if self.weighted {
            weighted_value(
                first.value,
                self.out_slope,
                self.out_fraction,
                last.value,
                self.in_slope,
                self.in_fraction,
                dt,
                s,
            )
        } else {
            hermite_value(first.value, self.out_slope, last.value, self.in_slope, dt, s)
        }
    }
}

/// Measures how far a fitted segment strays from the dense samples.
///
/// The maximum (not the mean) is what the tolerance is compared against, so
/// an accepted curve is bounded everywhere it was sampled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorEvaluator;

impl ErrorEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Maximum absolute deviation over the samples spanned by `segment`.
    pub fn evaluate(&self, samples: &[Sample], segment: Segment, tangents: &SegmentTangents) -> f64 {
        segment
            .interior()
            .map(|i| {
                let sample = samples[i];
                (tangents.value_at(samples, segment, sample.time) - sample.value).abs()
            })
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parabola() -> Vec<Sample> {
        (0..=4).map(|i| Sample::new(i as f64, (i * i) as f64)).collect()
    }

    #[test]
    fn test_exact_segment_has_no_error() {
        // v = t^2 on [0, 4]: slopes 0 and 8 reproduce it exactly.
        let tangents = SegmentTangents {
            out_slope: 0.0,
            in_slope: 8.0,
            out_fraction: 1.0 / 3.0,
            in_fraction: 1.0 / 3.0,
            weighted: false,
        };
        let err = ErrorEvaluator::new().evaluate(&parabola(), Segment::new(0, 4), &tangents);
        assert!(err < 1e-12);
    }

    #[test]
    fn test_max_not_mean() {
        let samples = vec![
            Sample::new(0.0, 0.0),
            Sample::new(1.0, 0.0),
            Sample::new(2.0, 0.5),
            Sample::new(3.0, 0.0),
            Sample::new(4.0, 0.0),
        ];
        let flat = SegmentTangents {
            out_slope: 0.0,
            in_slope: 0.0,
            out_fraction: 1.0 / 3.0,
            in_fraction: 1.0 / 3.0,
            weighted: false,
        };
        let err = ErrorEvaluator::new().evaluate(&samples, Segment::new(0, 4), &flat);
        assert_relative_eq!(err, 0.5);
    }

    #[test]
    fn test_weighted_matches_unweighted_at_thirds() {
        let samples = parabola();
        let mut tangents = SegmentTangents {
            out_slope: 1.0,
            in_slope: 5.0,
            out_fraction: 1.0 / 3.0,
            in_fraction: 1.0 / 3.0,
            weighted: false,
        };
        let plain = ErrorEvaluator::new().evaluate(&samples, Segment::new(0, 4), &tangents);
        tangents.weighted = true;
        let weighted = ErrorEvaluator::new().evaluate(&samples, Segment::new(0, 4), &tangents);
        assert_relative_eq!(plain, weighted, epsilon = 1e-9);
    }
}
