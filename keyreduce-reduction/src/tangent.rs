//! Tangent classification
//!
//! Decides, for every sample that may become a keyframe, whether its in and
//! out tangents have to be independent ("split") and whether its handles are
//! weighted. Split samples are kept as keyframes by the controller.

use itertools::Itertools;
use keyreduce_core::{CurveEvaluator, ReductionOptions, Sample, TangentShape};

/// Authored keys whose in/out angles differ by more than this many degrees
/// count as already split.
pub const EXISTING_SPLIT_THRESHOLD: f64 = 12e-5;

/// Why a sample was given split tangents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitReason {
    /// The authored key at this time already had split or stepped tangents
    Existing,
    /// The local direction change exceeds the configured angle
    AngleThreshold,
    /// The corner detector flagged the sample
    Corner,
}

/// Outcome of classifying one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub shape: TangentShape,
    pub reason: Option<SplitReason>,
}

impl Classification {
    pub fn is_split(&self) -> bool {
        self.shape.split
    }
}

/// Local evidence about a sample, gathered once per reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleFeatures {
    /// An authored key mapped to this sample has split or stepped tangents
    pub authored_split: bool,
    /// Largest angle (degrees) between the unified direction and either side
    pub side_angle: f64,
    /// The corner detector flagged this sample
    pub corner: bool,
}

/// Policy deciding which samples are corners for `tangentSplitAuto`.
pub trait CornerDetector: Send + Sync {
    /// One flag per sample; endpoints are never corners.
    fn corners(&self, samples: &[Sample]) -> Vec<bool>;
}

/// Flags samples where curvature is concentrated in a single point.
///
/// The second difference (change of slope) at a corner is a spike: it stands
/// out against the average, and the second differences on either side are
/// either much smaller or of the opposite sign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondDifferenceCorners {
    /// Neighbours may reach at most this fraction of the spike
    pub neighbour_ratio: f64,
    /// The spike must exceed the mean magnitude by this factor
    pub prominence: f64,
    /// Spikes below this magnitude (relative to the slope scale) are noise
    pub relative_tolerance: f64,
}

impl Default for SecondDifferenceCorners {
    fn default() -> Self {
        Self {
            neighbour_ratio: 0.25,
            prominence: 4.0,
            relative_tolerance: 1e-9,
        }
    }
}

impl CornerDetector for SecondDifferenceCorners {
    fn corners(&self, samples: &[Sample]) -> Vec<bool> {
        let n = samples.len();
        let mut flags = vec![false; n];
        if n < 3 {
            return flags;
        }

        let slopes: Vec<f64> = samples
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b.value - a.value) / (b.time - a.time))
            .collect();
        // d2[i] is the change of slope at sample i + 1
        let d2: Vec<f64> = slopes.iter().tuple_windows().map(|(a, b)| b - a).collect();

        let scale = slopes.iter().fold(1.0_f64, |acc, s| acc.max(s.abs()));
        let tolerance = self.relative_tolerance * scale;
        let mean = d2.iter().map(|d| d.abs()).sum::<f64>() / d2.len() as f64;

        for (j, &spike) in d2.iter().enumerate() {
            let magnitude = spike.abs();
            if magnitude <= tolerance || magnitude < self.prominence * mean {
                continue;
            }
            let quiet = |other: f64| {
                other * spike < 0.0 || other.abs() <= self.neighbour_ratio * magnitude
            };
            let left_quiet = j == 0 || quiet(d2[j - 1]);
            let right_quiet = j + 1 == d2.len() || quiet(d2[j + 1]);
            if left_quiet && right_quiet {
                flags[j + 1] = true;
            }
        }

        flags
    }
}

/// Log-scaled angle heuristic.
///
/// Deflection angles are compared against a threshold derived from their own
/// distribution; curves whose mean deflection is close to the extremes are
/// considered smooth and get no splits at all.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngleSpreadCorners;

impl CornerDetector for AngleSpreadCorners {
    fn corners(&self, samples: &[Sample]) -> Vec<bool> {
        let n = samples.len();
        let mut flags = vec![false; n];
        if n < 3 {
            return flags;
        }

        let angles: Vec<f64> = samples
            .iter()
            .tuple_windows()
            .map(|(a, b, c)| deflection_angle(a, b, c))
            .collect();

        let min_angle = angles.iter().copied().fold(f64::INFINITY, f64::min).max(1e-5);
        let max_angle = angles.iter().copied().fold(0.0, f64::max);
        let average = (min_angle + max_angle) * 0.5;
        let mean = angles.iter().sum::<f64>() / angles.len() as f64 * 0.5;

        if mean <= 0.0 || max_angle <= min_angle || mean * 10.0 > average {
            return flags;
        }

        let threshold =
            (average.ln() - mean.ln()) / (max_angle.ln() - min_angle.ln()) * average;
        for (i, angle) in angles.iter().enumerate() {
            if *angle > threshold {
                flags[i + 1] = true;
            }
        }
        flags
    }
}

/// Applies the split policies in priority order.
pub struct TangentClassifier {
    corner_detector: Box<dyn CornerDetector>,
}

impl Default for TangentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TangentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TangentClassifier").finish_non_exhaustive()
    }
}

impl TangentClassifier {
    pub fn new() -> Self {
        Self::with_corner_detector(SecondDifferenceCorners::default())
    }

    /// Use a different corner policy for `tangentSplitAuto`.
    pub fn with_corner_detector(detector: impl CornerDetector + 'static) -> Self {
        Self {
            corner_detector: Box::new(detector),
        }
    }

    /// Classify a single sample from its gathered features.
    pub fn classify(&self, features: &SampleFeatures, options: &ReductionOptions) -> Classification {
        let weighted = options.weighted_tangents;
        let reason = if options.tangent_split_existing && features.authored_split {
            Some(SplitReason::Existing)
        } else if options.tangent_split_angle_threshold
            && features.side_angle > options.tangent_split_angle_threshold_value
        {
            Some(SplitReason::AngleThreshold)
        } else if options.tangent_split_auto && features.corner {
            Some(SplitReason::Corner)
        } else {
            None
        };

        Classification {
            shape: TangentShape {
                split: reason.is_some(),
                weighted,
            },
            reason,
        }
    }

    /// Gather features for every sample and classify them.
    ///
    /// The two endpoints always come back unified: they only have one side.
    pub fn classify_all<E>(
        &self,
        curve: &E,
        samples: &[Sample],
        options: &ReductionOptions,
    ) -> Vec<Classification>
    where
        E: CurveEvaluator + ?Sized,
    {
        let features = self.features(curve, samples, options);
        let last = samples.len().saturating_sub(1);
        features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == 0 || i == last {
                    Classification {
                        shape: TangentShape::unified(options.weighted_tangents),
                        reason: None,
                    }
                } else {
                    self.classify(f, options)
                }
            })
            .collect()
    }

    /// Per-sample evidence for the enabled policies.
    pub fn features<E>(
        &self,
        curve: &E,
        samples: &[Sample],
        options: &ReductionOptions,
    ) -> Vec<SampleFeatures>
    where
        E: CurveEvaluator + ?Sized,
    {
        let n = samples.len();
        let mut features = vec![SampleFeatures::default(); n];
        if n < 3 {
            return features;
        }

        if options.tangent_split_existing {
            for index in authored_split_indices(curve, samples, options.step) {
                features[index].authored_split = true;
            }
        }

        if options.tangent_split_angle_threshold {
            for (i, (a, b, c)) in samples.iter().tuple_windows().enumerate() {
                features[i + 1].side_angle = side_angle(a, b, c);
            }
        }

        if options.tangent_split_auto {
            let corners = self.corner_detector.corners(samples);
            for (feature, corner) in features.iter_mut().zip(corners) {
                feature.corner = corner;
            }
        }

        features
    }
}

/// Sample indices of authored keys that already have split or stepped tangents.
fn authored_split_indices<E>(curve: &E, samples: &[Sample], step: f64) -> Vec<usize>
where
    E: CurveEvaluator + ?Sized,
{
    let start = samples[0].time;
    let last = samples.len() - 1;
    curve
        .keyframe_times()
        .iter()
        .enumerate()
        .filter_map(|(key, &time)| {
            let tangents = curve.authored_tangents(key)?;
            if tangents.is_stepped() || tangents.angle_difference() > EXISTING_SPLIT_THRESHOLD {
                let index = ((time - start) / step).round().max(0.0) as usize;
                Some(index.min(last))
            } else {
                None
            }
        })
        .collect()
}

fn angle_between(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (ax * by - ay * bx).abs().atan2(ax * bx + ay * by).to_degrees()
}

/// Largest angle between the chord through the neighbours and either side.
fn side_angle(a: &Sample, b: &Sample, c: &Sample) -> f64 {
    let (ux, uy) = (c.time - a.time, c.value - a.value);
    let left = angle_between(ux, uy, b.time - a.time, b.value - a.value);
    let right = angle_between(ux, uy, c.time - b.time, c.value - b.value);
    left.max(right)
}

/// How far the direction turns at `b`, in degrees.
fn deflection_angle(a: &Sample, b: &Sample, c: &Sample) -> f64 {
    angle_between(b.time - a.time, b.value - a.value, c.time - b.time, c.value - b.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyreduce_core::{AuthoredTangents, FnCurve, TangentKind};

    fn samples_of(f: impl Fn(f64) -> f64, n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(i as f64, f(i as f64))).collect()
    }

    fn v_shape() -> Vec<Sample> {
        samples_of(|t| (t - 10.0).abs(), 21)
    }

    struct SteppedHost;

    impl CurveEvaluator for SteppedHost {
        fn value_at(&self, time: f64) -> f64 {
            time
        }

        fn keyframe_times(&self) -> Vec<f64> {
            vec![0.0, 3.0, 6.0, 9.0]
        }

        fn authored_tangents(&self, index: usize) -> Option<AuthoredTangents> {
            match index {
                1 => Some(AuthoredTangents {
                    out_kind: TangentKind::Stepped,
                    ..AuthoredTangents::smooth(1.0, 1.0)
                }),
                2 => Some(AuthoredTangents::smooth(1.0, -1.0)),
                _ => Some(AuthoredTangents::smooth(1.0, 1.0)),
            }
        }
    }

    #[test]
    fn test_second_difference_finds_corner() {
        let corners = SecondDifferenceCorners::default().corners(&v_shape());
        let flagged: Vec<usize> = corners.iter().positions(|&c| c).collect();
        assert_eq!(flagged, vec![10]);
    }

    #[test]
    fn test_second_difference_ignores_smooth_curves() {
        let sine = samples_of(|t| (t * 0.2).sin() * 5.0, 60);
        assert!(SecondDifferenceCorners::default().corners(&sine).iter().all(|c| !c));

        let line = samples_of(|t| 3.0 * t - 1.0, 30);
        assert!(SecondDifferenceCorners::default().corners(&line).iter().all(|c| !c));
    }

    #[test]
    fn test_angle_spread_finds_corner() {
        let corners = AngleSpreadCorners.corners(&v_shape());
        assert!(corners[10]);
        assert!(!corners[0] && !corners[20]);
    }

    #[test]
    fn test_angle_spread_leaves_smooth_curve() {
        let sine = samples_of(|t| (t * 0.2).sin() * 5.0, 60);
        assert!(AngleSpreadCorners.corners(&sine).iter().all(|c| !c));
    }

    #[test]
    fn test_priority_order() {
        let classifier = TangentClassifier::new();
        let features = SampleFeatures {
            authored_split: true,
            side_angle: 90.0,
            corner: true,
        };
        let options = ReductionOptions::new()
            .with_tangent_split_existing(true)
            .with_tangent_split_angle(10.0)
            .with_tangent_split_auto(true);
        assert_eq!(
            classifier.classify(&features, &options).reason,
            Some(SplitReason::Existing)
        );

        let options = options.with_tangent_split_existing(false);
        assert_eq!(
            classifier.classify(&features, &options).reason,
            Some(SplitReason::AngleThreshold)
        );

        let options = ReductionOptions::new().with_tangent_split_auto(true);
        assert_eq!(
            classifier.classify(&features, &options).reason,
            Some(SplitReason::Corner)
        );

        let plain = classifier.classify(&features, &ReductionOptions::new());
        assert!(!plain.is_split());
        assert!(plain.shape.weighted);
    }

    #[test]
    fn test_weighted_follows_option() {
        let classifier = TangentClassifier::new();
        let options = ReductionOptions::new().with_weighted_tangents(false);
        let c = classifier.classify(&SampleFeatures::default(), &options);
        assert_eq!(c.shape, TangentShape::unified(false));
    }

    #[test]
    fn test_angle_threshold_classification() {
        let samples = v_shape();
        let curve = FnCurve::new(vec![0.0, 20.0], |t| (t - 10.0).abs());
        let options = ReductionOptions::new().with_tangent_split_angle(30.0);
        let classes = TangentClassifier::new().classify_all(&curve, &samples, &options);
        let split: Vec<usize> = classes.iter().positions(|c| c.is_split()).collect();
        assert_eq!(split, vec![10]);
    }

    #[test]
    fn test_existing_classification() {
        let curve = SteppedHost;
        let samples = samples_of(|t| t, 10);
        let options = ReductionOptions::new().with_tangent_split_existing(true);
        let classes = TangentClassifier::new().classify_all(&curve, &samples, &options);
        let split: Vec<usize> = classes.iter().positions(|c| c.is_split()).collect();
        assert_eq!(split, vec![3, 6]);
        assert!(classes
            .iter()
            .filter(|c| c.is_split())
            .all(|c| c.reason == Some(SplitReason::Existing)));
    }

    #[test]
    fn test_endpoints_never_split() {
        let samples = v_shape();
        let curve = FnCurve::new(vec![0.0, 20.0], |t| (t - 10.0).abs());
        let options = ReductionOptions::new().with_tangent_split_angle(0.0);
        let classes = TangentClassifier::new().classify_all(&curve, &samples, &options);
        assert!(!classes[0].is_split());
        assert!(!classes[20].is_split());
    }
}
