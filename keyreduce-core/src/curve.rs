//! Ordered keyframe curves

use itertools::Itertools;

use crate::interpolate::segment_value;
use crate::{AuthoredTangents, CurveEvaluator, CurveWriter, Error, Keyframe, Result, Sample};

/// An ordered sequence of keyframes, strictly increasing in time.
///
/// A `Curve` is both the output of a reduction and a simple in-memory host
/// curve: it can be evaluated and its keys can be replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Curve {
    keyframes: Vec<Keyframe>,
}

impl Curve {
    /// Create a curve, rejecting non-finite keys and non-increasing times.
    pub fn new(keyframes: Vec<Keyframe>) -> Result<Self> {
        validate_keyframes(&keyframes)?;
        Ok(Self { keyframes })
    }

    /// Build a baked curve through `(time, value)` points.
    ///
    /// Slopes are central differences of the neighbouring points (one-sided
    /// at the ends), the way a host bakes smooth auto tangents.
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self> {
        let n = points.len();
        let keyframes = (0..n)
            .map(|i| {
                let (time, value) = points[i];
                let lo = points[i.saturating_sub(1)];
                let hi = points[(i + 1).min(n - 1)];
                let dt = hi.0 - lo.0;
                let slope = if dt > 0.0 { (hi.1 - lo.1) / dt } else { 0.0 };
                Keyframe::unified(time, value, slope)
            })
            .collect();
        Self::new(keyframes)
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn into_keyframes(self) -> Vec<Keyframe> {
        self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn first(&self) -> Option<&Keyframe> {
        self.keyframes.first()
    }

    pub fn last(&self) -> Option<&Keyframe> {
        self.keyframes.last()
    }

    pub fn times(&self) -> Vec<f64> {
        self.keyframes.iter().map(|k| k.time).collect()
    }

    /// Consecutive keyframe pairs.
    pub fn segments(&self) -> impl Iterator<Item = (&Keyframe, &Keyframe)> + '_ {
        self.keyframes.iter().tuple_windows()
    }

    /// Value at `time`, holding the end values outside the keyed range.
    pub fn evaluate(&self, time: f64) -> f64 {
        let (first, last) = match (self.keyframes.first(), self.keyframes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        let upper = self.keyframes.partition_point(|k| k.time <= time);
        segment_value(&self.keyframes[upper - 1], &self.keyframes[upper], time)
    }

    /// Largest absolute difference between the curve and `samples`.
    pub fn max_deviation(&self, samples: &[Sample]) -> f64 {
        samples
            .iter()
            .map(|s| (self.evaluate(s.time) - s.value).abs())
            .fold(0.0, f64::max)
    }
}

fn validate_keyframes(keyframes: &[Keyframe]) -> Result<()> {
    if let Some(bad) = keyframes.iter().find(|k| !k.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "keyframe at time {} has non-finite data",
            bad.time
        )));
    }
    if let Some((a, b)) = keyframes.iter().tuple_windows().find(|(a, b)| b.time <= a.time) {
        return Err(Error::InvalidInput(format!(
            "keyframe times must increase strictly ({} then {})",
            a.time, b.time
        )));
    }
    Ok(())
}

impl CurveEvaluator for Curve {
    fn value_at(&self, time: f64) -> f64 {
        self.evaluate(time)
    }

    fn keyframe_times(&self) -> Vec<f64> {
        self.times()
    }

    fn authored_tangents(&self, index: usize) -> Option<AuthoredTangents> {
        self.keyframes.get(index).map(AuthoredTangents::from)
    }

    fn keyframe(&self, index: usize) -> Option<Keyframe> {
        self.keyframes.get(index).copied()
    }
}

impl CurveWriter for Curve {
    fn write_keyframes(&mut self, keyframes: &[Keyframe]) -> Result<()> {
        validate_keyframes(keyframes)?;
        self.keyframes = keyframes.to_vec();
        Ok(())
    }
}
