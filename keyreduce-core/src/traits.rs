//! Host capability traits
//!
//! The reduction core never owns curve storage. A host hands it something
//! it can evaluate and, once a reduction succeeds, something it can write
//! the new keys to.

use crate::{AuthoredTangents, Keyframe, Result};

/// Read-only access to the curve being reduced.
pub trait CurveEvaluator {
    /// Value of the pre-reduction curve at `time`
    fn value_at(&self, time: f64) -> f64;

    /// Times of the authored keys, in increasing order
    fn keyframe_times(&self) -> Vec<f64>;

    /// Tangents of authored key `index`, when the host can report them
    fn authored_tangents(&self, _index: usize) -> Option<AuthoredTangents> {
        None
    }

    /// Authored key `index` in full, for hosts that store keyframes
    fn keyframe(&self, _index: usize) -> Option<Keyframe> {
        None
    }
}

/// Sink for the keys of a successful reduction.
pub trait CurveWriter {
    /// Replace every key on the target curve. Either all keys are written or
    /// the curve is left untouched.
    fn write_keyframes(&mut self, keyframes: &[Keyframe]) -> Result<()>;
}

impl<T: CurveEvaluator + ?Sized> CurveEvaluator for &T {
    fn value_at(&self, time: f64) -> f64 {
        (**self).value_at(time)
    }

    fn keyframe_times(&self) -> Vec<f64> {
        (**self).keyframe_times()
    }

    fn authored_tangents(&self, index: usize) -> Option<AuthoredTangents> {
        (**self).authored_tangents(index)
    }

    fn keyframe(&self, index: usize) -> Option<Keyframe> {
        (**self).keyframe(index)
    }
}

impl<T: CurveEvaluator + ?Sized> CurveEvaluator for Box<T> {
    fn value_at(&self, time: f64) -> f64 {
        (**self).value_at(time)
    }

    fn keyframe_times(&self) -> Vec<f64> {
        (**self).keyframe_times()
    }

    fn authored_tangents(&self, index: usize) -> Option<AuthoredTangents> {
        (**self).authored_tangents(index)
    }

    fn keyframe(&self, index: usize) -> Option<Keyframe> {
        (**self).keyframe(index)
    }
}

/// A curve defined by a closure over a fixed set of key times.
///
/// Handy for analytic test curves and for hosts that only expose an
/// evaluation callback.
#[derive(Debug, Clone)]
pub struct FnCurve<F> {
    times: Vec<f64>,
    f: F,
}

impl<F> FnCurve<F>
where
    F: Fn(f64) -> f64,
{
    pub fn new(times: Vec<f64>, f: F) -> Self {
        Self { times, f }
    }

    /// Keys at every `step` from `start` to `end` inclusive.
    pub fn baked(start: f64, end: f64, step: f64, f: F) -> Self {
        let mut times = Vec::new();
        if step > 0.0 && end >= start {
            let count = ((end - start) / step).round() as usize;
            times.extend((0..=count).map(|i| start + i as f64 * step));
        }
        Self { times, f }
    }
}

impl<F> CurveEvaluator for FnCurve<F>
where
    F: Fn(f64) -> f64,
{
    fn value_at(&self, time: f64) -> f64 {
        (self.f)(time)
    }

    fn keyframe_times(&self) -> Vec<f64> {
        self.times.clone()
    }
}
