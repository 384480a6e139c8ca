//! Dense sampling of the source curve

use keyreduce_core::{CurveEvaluator, Error, Result, Sample, TimeRange};

/// Grid times closer than this fraction of a step to the end are replaced
/// by the end time, so no zero-length segment is ever produced.
const GRID_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of samples a single curve may produce.
pub const MAX_SAMPLES: usize = 10_000_000;

/// Evaluates a curve on a uniform time grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    step: f64,
}

impl Sampler {
    pub fn new(step: f64) -> Self {
        Self { step }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Sample `curve` at `start, start + step, ...` and always at `end`.
    pub fn sample<E>(&self, curve: &E, range: TimeRange) -> Result<Vec<Sample>>
    where
        E: CurveEvaluator + ?Sized,
    {
        let step = self.step;
        if !step.is_finite() || step <= 0.0 {
            return Err(Error::InvalidRange(format!("step must be > 0, got {}", step)));
        }
        if !range.start.is_finite() || !range.end.is_finite() {
            return Err(Error::InvalidRange("range bounds must be finite".to_string()));
        }
        if range.end < range.start {
            return Err(Error::InvalidRange(format!(
                "range end {} precedes start {}",
                range.end, range.start
            )));
        }

        let intervals = (range.duration() / step).ceil();
        if intervals >= MAX_SAMPLES as f64 {
            return Err(Error::InvalidRange(format!(
                "sampling [{}, {}] at step {} exceeds {} samples",
                range.start, range.end, step, MAX_SAMPLES
            )));
        }

        let cutoff = range.end - step * GRID_TOLERANCE;
        let mut samples: Vec<Sample> = Vec::with_capacity(intervals as usize + 1);
        for i in 0.. {
            let time = range.start + i as f64 * step;
            if time >= cutoff {
                break;
            }
            if samples.last().is_some_and(|prev| time <= prev.time) {
                return Err(Error::InvalidRange(format!(
                    "step {} is below the time resolution at {}",
                    step, time
                )));
            }
            samples.push(Sample::new(time, curve.value_at(time)));
        }
        samples.push(Sample::new(range.end, curve.value_at(range.end)));

        Ok(samples)
    }
}

/// Sample `curve` over `range` at a fixed `step`.
pub fn sample<E>(curve: &E, range: TimeRange, step: f64) -> Result<Vec<Sample>>
where
    E: CurveEvaluator + ?Sized,
{
    Sampler::new(step).sample(curve, range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use keyreduce_core::FnCurve;

    fn line() -> FnCurve<impl Fn(f64) -> f64> {
        FnCurve::new(vec![0.0, 10.0], |t| 2.0 * t)
    }

    #[test]
    fn test_aligned_grid() {
        let samples = sample(&line(), TimeRange::new(0.0, 4.0), 1.0).unwrap();
        let times: Vec<f64> = samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_relative_eq!(samples[3].value, 6.0);
    }

    #[test]
    fn test_end_is_forced() {
        let samples = sample(&line(), TimeRange::new(0.0, 2.5), 1.0).unwrap();
        let times: Vec<f64> = samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 2.5]);
    }

    #[test]
    fn test_fractional_step_has_no_drift() {
        let samples = sample(&line(), TimeRange::new(0.0, 1.0), 0.1).unwrap();
        assert_eq!(samples.len(), 11);
        assert_eq!(samples.last().unwrap().time, 1.0);
        for pair in samples.windows(2) {
            assert!(pair[1].time - pair[0].time > 0.099);
        }
    }

    #[test]
    fn test_degenerate_range() {
        let samples = sample(&line(), TimeRange::new(3.0, 3.0), 1.0).unwrap();
        assert_eq!(samples, vec![Sample::new(3.0, 6.0)]);
    }

    #[test]
    fn test_invalid_inputs() {
        let curve = line();
        assert!(matches!(
            sample(&curve, TimeRange::new(0.0, 1.0), 0.0),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            sample(&curve, TimeRange::new(0.0, 1.0), -1.0),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            sample(&curve, TimeRange::new(2.0, 1.0), 1.0),
            Err(Error::InvalidRange(_))
        ));
        assert!(sample(&curve, TimeRange::new(0.0, 1e12), 1e-6).is_err());
    }

    #[test]
    fn test_step_below_time_resolution() {
        // Adjacent doubles are 16 apart near 1e17.
        let result = sample(&line(), TimeRange::new(1e17, 1e17 + 64.0), 1.0);
        assert!(matches!(result, Err(Error::InvalidRange(_))));

        let samples = sample(&line(), TimeRange::new(1e17, 1e17 + 64.0), 16.0).unwrap();
        assert_eq!(samples.len(), 5);
        assert!(samples.windows(2).all(|w| w[1].time > w[0].time));
    }
}
