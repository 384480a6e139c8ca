//! Basic usage example for keyreduce
//!
//! Reduces a baked ease-in-out curve with default options and with split
//! tangents, then checks the result against the source.

use keyreduce_core::{Curve, CurveEvaluator, FnCurve, ReductionOptions, TimeRange};
use keyreduce_reduction::{reduce, sample};

fn main() -> anyhow::Result<()> {
    println!("keyreduce Basic Example");
    println!("=======================");

    // A baked curve: one key per frame
    let source = FnCurve::baked(0.0, 96.0, 1.0, |t| {
        let s = t / 48.0;
        if s < 1.0 {
            10.0 * s * s * (3.0 - 2.0 * s)
        } else {
            10.0 - 4.0 * (s - 1.0).abs().sqrt()
        }
    });
    println!("Source curve has {} keys", source.keyframe_times().len());

    let options = ReductionOptions::new().with_error(0.05);
    let reduction = reduce(&source, &options)?;
    print_result("Weighted, unified", &reduction.curve, reduction.percent());

    let options = options.with_weighted_tangents(false).with_tangent_split_auto(true);
    let reduction = reduce(&source, &options)?;
    print_result("Unweighted, auto split", &reduction.curve, reduction.percent());

    // The reduced curve is a host curve too: compare it on the frame grid
    let samples = sample(&source, TimeRange::new(0.0, 96.0), 1.0)?;
    println!("\nMax deviation: {:.4}", reduction.curve.max_deviation(&samples));

    Ok(())
}

fn print_result(label: &str, curve: &Curve, percent: f64) {
    println!("\n{}: {} keys ({:.2}% reduction)", label, curve.len(), percent);
    for key in curve.keyframes() {
        println!(
            "  t={:6.1}  v={:8.4}  in={:8.4}  out={:8.4}{}",
            key.time,
            key.value,
            key.in_slope,
            key.out_slope,
            if key.tangent_split { "  split" } else { "" }
        );
    }
}
