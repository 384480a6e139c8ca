//! Integration tests for keyreduce-batch

use approx::assert_relative_eq;
use keyreduce_batch::*;
use keyreduce_core::{Curve, CurveEvaluator, CurveWriter, Keyframe, ReductionOptions, Result};

/// A host curve that can be told to return garbage values
#[derive(Debug, Clone, PartialEq)]
struct HostCurve {
    curve: Curve,
    broken: bool,
    writes: usize,
}

impl HostCurve {
    fn new(curve: Curve) -> Self {
        Self {
            curve,
            broken: false,
            writes: 0,
        }
    }

    fn broken(curve: Curve) -> Self {
        Self {
            broken: true,
            ..Self::new(curve)
        }
    }
}

impl CurveEvaluator for HostCurve {
    fn value_at(&self, time: f64) -> f64 {
        if self.broken {
            f64::NAN
        } else {
            self.curve.value_at(time)
        }
    }

    fn keyframe_times(&self) -> Vec<f64> {
        self.curve.keyframe_times()
    }
}

impl CurveWriter for HostCurve {
    fn write_keyframes(&mut self, keyframes: &[Keyframe]) -> Result<()> {
        self.writes += 1;
        self.curve.write_keyframes(keyframes)
    }
}

fn line(frames: usize) -> Curve {
    let points: Vec<(f64, f64)> = (0..frames).map(|i| (i as f64, 2.0 * i as f64)).collect();
    Curve::from_points(&points).unwrap()
}

fn wave(frames: usize) -> Curve {
    let points: Vec<(f64, f64)> = (0..frames)
        .map(|i| (i as f64, (i as f64 * 0.2).sin() * 5.0))
        .collect();
    Curve::from_points(&points).unwrap()
}

fn flat() -> Curve {
    Curve::new(vec![Keyframe::new(0.0, 1.0), Keyframe::new(8.0, 1.0)]).unwrap()
}

fn create_scene() -> Vec<BatchEntry<HostCurve>> {
    vec![
        BatchEntry::new("root.translateX", HostCurve::new(line(50))),
        BatchEntry::new("root.translateY", HostCurve::new(flat())),
        BatchEntry::new("root.rotateZ", HostCurve::broken(wave(40))),
        BatchEntry::new("spine.rotateX", HostCurve::new(wave(80))),
    ]
}

fn options() -> ReductionOptions {
    ReductionOptions::new().with_error(0.1)
}

#[test]
fn test_batch_reports_each_curve() {
    let mut scene = create_scene();
    let reducer = BatchReducer::new(options(), BatchConfig::new().with_threads(2));
    let summary = reducer.run(&mut scene, &CancelFlag::new()).unwrap();

    assert_eq!(summary.reports.len(), 4);
    let names: Vec<&str> = summary.reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["root.translateX", "root.translateY", "root.rotateZ", "spine.rotateX"]);

    assert_eq!(summary.reports[0].outcome, CurveOutcome::Reduced);
    assert_eq!(summary.reports[0].keyframe_count, 2);
    assert_relative_eq!(summary.reports[0].reduction_ratio, 0.96, epsilon = 1e-12);
    assert_eq!(summary.reports[1].outcome, CurveOutcome::Unchanged);
    assert!(summary.reports[2].is_failed());
    assert_eq!(summary.reports[3].outcome, CurveOutcome::Reduced);

    assert_eq!(summary.reduced(), 2);
    assert_eq!(summary.unchanged(), 1);
    assert_eq!(summary.failed(), 1);
}

#[test]
fn test_only_reduced_curves_are_written() {
    let mut scene = create_scene();
    let reducer = BatchReducer::new(options(), BatchConfig::new().with_parallel(false));
    reducer.run(&mut scene, &CancelFlag::new()).unwrap();

    let writes: Vec<usize> = scene.iter().map(|e| e.curve.writes).collect();
    assert_eq!(writes, [1, 0, 0, 1]);
    assert_eq!(scene[0].curve.curve.len(), 2);
    assert_eq!(scene[1].curve.curve, flat());
    assert_eq!(scene[2].curve.curve, wave(40));
}

#[test]
fn test_parallel_matches_serial() {
    let mut serial_scene = create_scene();
    let mut parallel_scene = create_scene();

    let serial = BatchReducer::new(options(), BatchConfig::new().with_parallel(false))
        .run(&mut serial_scene, &CancelFlag::new())
        .unwrap();
    let parallel = BatchReducer::new(options(), BatchConfig::new().with_threads(3))
        .run(&mut parallel_scene, &CancelFlag::new())
        .unwrap();

    for (a, b) in serial.reports.iter().zip(&parallel.reports) {
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.keyframe_count, b.keyframe_count);
    }
    assert_eq!(serial_scene, parallel_scene);
}

#[test]
fn test_cancelled_batch_touches_nothing() {
    let mut scene = create_scene();
    let before = scene.clone();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let summary = BatchReducer::new(options(), BatchConfig::default())
        .run(&mut scene, &cancel)
        .unwrap();
    assert_eq!(summary.cancelled(), 4);
    assert_eq!(summary.overall_ratio(), 0.0);
    assert_eq!(scene, before);
}
