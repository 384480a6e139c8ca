//! Error-bounded keyframe reduction
//!
//! This crate turns a densely keyed animation curve into a small set of
//! keyframes whose interpolation stays within a fixed tolerance of the
//! original everywhere it was sampled:
//! - Uniform sampling of the source curve
//! - Tangent classification (split, unified, weighted)
//! - Least-squares tangent fitting
//! - Greedy removal driven by the worst-case fit error

pub mod sampler;
pub mod tangent;
pub mod evaluate;
pub mod fit;
pub mod controller;

pub use sampler::*;
pub use tangent::*;
pub use evaluate::*;
pub use fit::*;
pub use controller::*;

use keyreduce_core::{
    AuthoredTangents, Curve, CurveEvaluator, CurveWriter, Error, Keyframe, ReductionOptions, Result,
    Sample, TimeRange,
};
use tracing::{debug, info};

/// Outcome of reducing one curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub curve: Curve,
    /// `1 - final / original` key count; 0 when nothing was reduced
    pub reduction_ratio: f64,
    pub convergence: Convergence,
    pub sample_count: usize,
    pub original_count: usize,
}

impl Reduction {
    pub fn keyframe_count(&self) -> usize {
        self.curve.len()
    }

    /// Whether the result should replace the source keys.
    pub fn is_reduced(&self) -> bool {
        self.convergence == Convergence::Reduced
    }

    /// Reduction ratio as a percentage.
    pub fn percent(&self) -> f64 {
        self.reduction_ratio * 100.0
    }
}

/// Reduce the keyframes of a curve
pub trait CurveReducer {
    /// Compute the reduced curve without touching the source
    fn reduce(&self, curve: &dyn CurveEvaluator) -> Result<Reduction>;
}

/// Sampler, classifier and fitter configured for one set of options.
#[derive(Debug, Default)]
pub struct KeyframeReducer {
    options: ReductionOptions,
    classifier: TangentClassifier,
    fitter: LeastSquaresFitter,
}

impl KeyframeReducer {
    pub fn new(options: ReductionOptions) -> Self {
        Self {
            options,
            classifier: TangentClassifier::new(),
            fitter: LeastSquaresFitter::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: TangentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_fitter(mut self, fitter: LeastSquaresFitter) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn options(&self) -> &ReductionOptions {
        &self.options
    }

    /// Reduce `curve` and write the result back when keys were saved.
    ///
    /// The writer is called at most once and never on failure.
    pub fn reduce_into<C>(&self, curve: &mut C) -> Result<Reduction>
    where
        C: CurveEvaluator + CurveWriter + ?Sized,
    {
        let reduction = self.reduce_curve(&*curve)?;
        if reduction.is_reduced() {
            curve.write_keyframes(reduction.curve.keyframes())?;
        }
        Ok(reduction)
    }

    #[tracing::instrument(skip_all, fields(error = self.options.error, step = self.options.step))]
    pub fn reduce_curve<E>(&self, curve: &E) -> Result<Reduction>
    where
        E: CurveEvaluator + ?Sized,
    {
        let options = &self.options;
        options.validate()?;

        let times = curve.keyframe_times();
        validate_times(&times)?;
        let original_count = times.len();
        let range = TimeRange::new(times[0], times[original_count - 1]);

        let samples = Sampler::new(options.step).sample(curve, range)?;
        if let Some(bad) = samples.iter().find(|s| !s.value.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "curve value at time {} is not finite",
                bad.time
            )));
        }
        debug!(samples = samples.len(), original_count, "sampled curve");

        let classifications = self.classifier.classify_all(curve, &samples, options);
        let shapes: Vec<_> = classifications.iter().map(|c| c.shape).collect();
        let pinned: Vec<bool> = classifications.iter().map(Classification::is_split).collect();
        debug!(
            policies = options.splits_enabled(),
            split = pinned.iter().filter(|&&p| p).count(),
            "classified tangents"
        );

        let mut controller =
            ReductionController::new(&samples, &shapes, &pinned, &self.fitter, options.error);
        let convergence = controller.run(original_count)?;

        let reduction = match convergence {
            Convergence::Reduced => {
                let curve = Curve::new(controller.keyframes())?;
                let reduction_ratio = 1.0 - curve.len() as f64 / original_count as f64;
                Reduction {
                    curve,
                    reduction_ratio,
                    convergence,
                    sample_count: samples.len(),
                    original_count,
                }
            }
            Convergence::NoReductionPossible => Reduction {
                curve: original_curve(curve, &times, &samples, &pinned)?,
                reduction_ratio: 0.0,
                convergence,
                sample_count: samples.len(),
                original_count,
            },
        };

        info!(
            keys = reduction.keyframe_count(),
            original = original_count,
            ratio = reduction.reduction_ratio,
            "curve reduced"
        );
        Ok(reduction)
    }
}

impl CurveReducer for KeyframeReducer {
    fn reduce(&self, curve: &dyn CurveEvaluator) -> Result<Reduction> {
        self.reduce_curve(curve)
    }
}

/// Reduce `curve` with `options`.
pub fn reduce<E>(curve: &E, options: &ReductionOptions) -> Result<Reduction>
where
    E: CurveEvaluator + ?Sized,
{
    KeyframeReducer::new(options.clone()).reduce_curve(curve)
}

fn validate_times(times: &[f64]) -> Result<()> {
    if times.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "curve needs at least 2 keyframes, found {}",
            times.len()
        )));
    }
    if times.iter().any(|t| !t.is_finite()) {
        return Err(Error::InvalidInput("keyframe times must be finite".to_string()));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::InvalidInput(
            "keyframe times must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

/// The source keys, as stored by the host or rebuilt from what it reports.
///
/// Keys with neither a stored form nor authored tangents get slopes from the
/// neighbouring key values. A key landing on a split sample takes one-sided
/// slopes so the corner survives.
fn original_curve<E>(
    curve: &E,
    times: &[f64],
    samples: &[Sample],
    split: &[bool],
) -> Result<Curve>
where
    E: CurveEvaluator + ?Sized,
{
    let values: Vec<f64> = times.iter().map(|&t| curve.value_at(t)).collect();
    let last = times.len() - 1;
    let slope = |a: usize, b: usize| (values[b] - values[a]) / (times[b] - times[a]);
    let keys = times
        .iter()
        .enumerate()
        .map(|(i, &time)| {
            if let Some(key) = curve.keyframe(i) {
                return key;
            }
            let tangents = curve.authored_tangents(i).unwrap_or_else(|| match i {
                0 => AuthoredTangents::smooth(slope(0, 1), slope(0, 1)),
                i if i == last => {
                    AuthoredTangents::smooth(slope(last - 1, last), slope(last - 1, last))
                }
                i if is_split_at(samples, split, time) => {
                    AuthoredTangents::smooth(slope(i - 1, i), slope(i, i + 1))
                }
                i => AuthoredTangents::smooth(slope(i - 1, i + 1), slope(i - 1, i + 1)),
            });
            if tangents.in_slope == tangents.out_slope {
                Keyframe::unified(time, values[i], tangents.in_slope)
            } else {
                Keyframe::split(time, values[i], tangents.in_slope, tangents.out_slope)
            }
        })
        .collect();
    Curve::new(keys)
}

/// Whether the sample nearest to `time` was classified split.
fn is_split_at(samples: &[Sample], split: &[bool], time: f64) -> bool {
    let after = samples.partition_point(|s| s.time < time);
    let nearest = match (after.checked_sub(1), samples.get(after)) {
        (Some(before), Some(next)) if time - samples[before].time < next.time - time => before,
        (Some(before), None) => before,
        _ => after,
    };
    split.get(nearest).copied().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyreduce_core::FnCurve;

    #[test]
    fn test_rejects_single_key() {
        let curve = FnCurve::new(vec![0.0], |_| 1.0);
        let result = reduce(&curve, &ReductionOptions::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_unordered_keys() {
        let curve = FnCurve::new(vec![0.0, 2.0, 1.0], |t| t);
        let result = reduce(&curve, &ReductionOptions::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let curve = FnCurve::new(vec![0.0, 4.0], |t| if t > 2.0 { f64::NAN } else { t });
        let result = reduce(&curve, &ReductionOptions::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_trait_object_reduction() {
        let reducer: Box<dyn CurveReducer> =
            Box::new(KeyframeReducer::new(ReductionOptions::new().with_error(0.01)));
        let curve = FnCurve::baked(0.0, 10.0, 1.0, |t| 0.5 * t);
        let reduction = reducer.reduce(&curve).unwrap();
        assert_eq!(reduction.keyframe_count(), 2);
        assert!(reduction.is_reduced());
        assert_eq!(reduction.sample_count, 11);
    }

    #[test]
    fn test_original_curve_keeps_authored_tangents() {
        let source = Curve::new(vec![
            Keyframe::unified(0.0, 0.0, 1.0),
            Keyframe::split(5.0, 5.0, 1.0, -1.0),
            Keyframe::unified(10.0, 0.0, -1.0),
        ])
        .unwrap();
        let rebuilt = original_curve(&source, &source.times(), &[], &[]).unwrap();
        assert_eq!(rebuilt.len(), 3);
        assert!(rebuilt.keyframes()[1].tangent_split);
        assert_eq!(rebuilt.keyframes()[1].out_slope, -1.0);
    }

    #[test]
    fn test_original_curve_from_values_only() {
        let source = FnCurve::new(vec![0.0, 1.0, 3.0], |t| t * t);
        let samples = [Sample::new(0.0, 0.0), Sample::new(1.0, 1.0), Sample::new(3.0, 9.0)];
        let rebuilt =
            original_curve(&source, &source.keyframe_times(), &samples, &[false; 3]).unwrap();
        let keys = rebuilt.keyframes();
        assert_eq!(keys[0].out_slope, 1.0);
        assert_eq!(keys[1].in_slope, 3.0);
        assert_eq!(keys[2].in_slope, 4.0);
        assert!(keys.iter().all(|k| !k.tangent_split));
    }

    #[test]
    fn test_original_curve_splits_at_classified_corner() {
        let source = FnCurve::new(vec![0.0, 2.0, 4.0], |t| (t - 2.0).abs());
        let samples: Vec<Sample> =
            (0..5).map(|i| Sample::new(i as f64, (i as f64 - 2.0).abs())).collect();
        let split = [false, false, true, false, false];
        let rebuilt = original_curve(&source, &source.keyframe_times(), &samples, &split).unwrap();
        let keys = rebuilt.keyframes();
        assert!(keys[1].tangent_split);
        assert_eq!((keys[1].in_slope, keys[1].out_slope), (-1.0, 1.0));
        assert!(!keys[0].tangent_split && !keys[2].tangent_split);
    }

    #[test]
    fn test_split_lookup_uses_nearest_sample() {
        let samples: Vec<Sample> = (0..4).map(|i| Sample::new(i as f64, 0.0)).collect();
        let split = [false, true, false, false];
        assert!(is_split_at(&samples, &split, 1.0));
        assert!(is_split_at(&samples, &split, 1.4));
        assert!(!is_split_at(&samples, &split, 1.6));
        assert!(!is_split_at(&samples, &split, 9.0));
        assert!(!is_split_at(&[], &[], 1.0));
    }
}
