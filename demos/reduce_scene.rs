//! Reduce every curve of a JSON scene
//!
//! A scene is `{ "options": {...}, "curves": [{ "name": ..., "points": [[t, v], ...] }] }`;
//! curves may give full `keyframes` instead of `points`. Without an input
//! file a synthetic motion-capture scene is generated.

use anyhow::Context;
use clap::Parser;
use keyreduce_batch::{BatchConfig, BatchEntry, BatchReducer, CancelFlag};
use keyreduce_core::{Curve, Keyframe, ReductionOptions};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reduce_scene", about = "Error-bounded keyframe reduction of animation curves")]
struct Cli {
    /// Scene file (JSON); a synthetic scene is used when omitted
    input: Option<PathBuf>,

    /// Write the reduced scene here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum allowed deviation
    #[arg(long, allow_hyphen_values = true)]
    error: Option<f64>,

    /// Sampling step
    #[arg(long)]
    step: Option<f64>,

    /// Use unweighted tangents
    #[arg(long)]
    unweighted: bool,

    /// Split tangents at detected corners
    #[arg(long)]
    split_auto: bool,

    /// Keep tangents that are already split
    #[arg(long)]
    split_existing: bool,

    /// Split tangents bending more than this many degrees
    #[arg(long)]
    split_angle: Option<f64>,

    /// Worker threads (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Reduce curves one after another
    #[arg(long)]
    serial: bool,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct Scene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<ReductionOptions>,
    curves: Vec<SceneCurve>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SceneCurve {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    points: Vec<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keyframes: Vec<Keyframe>,
}

impl SceneCurve {
    fn into_curve(self) -> anyhow::Result<BatchEntry<Curve>> {
        let curve = if !self.keyframes.is_empty() {
            Curve::new(self.keyframes)
        } else {
            Curve::from_points(&self.points)
        }
        .with_context(|| format!("curve '{}'", self.name))?;
        Ok(BatchEntry::new(self.name, curve))
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// A few joints of noisy motion-capture style channels.
fn synthetic_scene() -> Scene {
    let mut rng = StdRng::seed_from_u64(1);
    let mut curves = Vec::new();
    for joint in ["hips", "spine", "neck", "l_arm", "r_arm"] {
        for (axis, frequency) in [("rotateX", 0.03), ("rotateY", 0.05), ("rotateZ", 0.08)] {
            let amplitude = rng.gen_range(5.0..45.0);
            let phase = rng.gen_range(0.0..std::f64::consts::TAU);
            let points = (0..240)
                .map(|frame| {
                    let t = frame as f64;
                    let value = (t * frequency + phase).sin() * amplitude + rng.gen_range(-0.02..0.02);
                    (t, value)
                })
                .collect();
            curves.push(SceneCurve {
                name: format!("{}.{}", joint, axis),
                points,
                keyframes: Vec::new(),
            });
        }
    }
    Scene {
        options: None,
        curves,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let scene = match &cli.input {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<Scene>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => synthetic_scene(),
    };

    let mut options = scene.options.clone().unwrap_or_default();
    if let Some(error) = cli.error {
        options = options.with_error(error);
    }
    if let Some(step) = cli.step {
        options = options.with_step(step);
    }
    if cli.unweighted {
        options = options.with_weighted_tangents(false);
    }
    if cli.split_auto {
        options = options.with_tangent_split_auto(true);
    }
    if cli.split_existing {
        options = options.with_tangent_split_existing(true);
    }
    if let Some(angle) = cli.split_angle {
        options = options.with_tangent_split_angle(angle);
    }
    options.validate()?;

    let mut config = BatchConfig::new().with_parallel(!cli.serial);
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }

    let mut entries = scene
        .curves
        .into_iter()
        .map(SceneCurve::into_curve)
        .collect::<anyhow::Result<Vec<_>>>()?;
    tracing::info!(curves = entries.len(), error = options.error, "scene loaded");

    let summary = BatchReducer::new(options.clone(), config).run(&mut entries, &CancelFlag::new())?;
    for report in &summary.reports {
        println!("{}", report);
    }
    println!("{}", summary);

    if let Some(path) = &cli.output {
        let reduced = Scene {
            options: Some(options),
            curves: entries
                .into_iter()
                .map(|entry| SceneCurve {
                    name: entry.name,
                    points: Vec::new(),
                    keyframes: entry.curve.into_keyframes(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&reduced)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
