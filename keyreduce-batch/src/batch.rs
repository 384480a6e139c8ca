//! Reduce a set of independent curves

use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::BatchConfig;
use keyreduce_core::{CurveEvaluator, CurveWriter, Error, ReductionOptions, Result};
use keyreduce_reduction::KeyframeReducer;

/// Shared switch checked before each curve starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A named curve owned by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry<C> {
    pub name: String,
    pub curve: C,
}

impl<C> BatchEntry<C> {
    pub fn new(name: impl Into<String>, curve: C) -> Self {
        Self {
            name: name.into(),
            curve,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurveOutcome {
    /// New keys were written back
    Reduced,
    /// The curve could not be reduced and was left alone
    Unchanged,
    Failed(Error),
    /// Skipped because the batch was cancelled first
    Cancelled,
}

/// What happened to one curve.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveReport {
    pub name: String,
    pub outcome: CurveOutcome,
    pub original_count: usize,
    pub keyframe_count: usize,
    pub reduction_ratio: f64,
    pub elapsed: Duration,
}

impl CurveReport {
    fn skipped(name: &str, outcome: CurveOutcome, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            original_count: 0,
            keyframe_count: 0,
            reduction_ratio: 0.0,
            elapsed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CurveOutcome::Failed(_))
    }
}

impl fmt::Display for CurveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {:.2}s | ",
            self.name,
            self.elapsed.as_secs_f64()
        )?;
        match &self.outcome {
            CurveOutcome::Reduced => write!(
                f,
                "{} -> {} keys | reduced {:.2}%",
                self.original_count,
                self.keyframe_count,
                self.reduction_ratio * 100.0
            ),
            CurveOutcome::Unchanged => write!(f, "{} keys | unable to reduce", self.original_count),
            CurveOutcome::Failed(e) => write!(f, "failed: {}", e),
            CurveOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Reports for every entry of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub reports: Vec<CurveReport>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn reduced(&self) -> usize {
        self.count(|o| matches!(o, CurveOutcome::Reduced))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, CurveOutcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CurveOutcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, CurveOutcome::Cancelled))
    }

    /// Mean reduction ratio over all curves; curves that were not reduced
    /// count as zero.
    pub fn overall_ratio(&self) -> f64 {
        if self.reports.is_empty() {
            return 0.0;
        }
        self.reports.iter().map(|r| r.reduction_ratio).sum::<f64>() / self.reports.len() as f64
    }

    fn count(&self, predicate: impl Fn(&CurveOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} curves in {:.2}s | reduced {} | unchanged {} | failed {} | cancelled {} | overall {:.2}%",
            self.reports.len(),
            self.elapsed.as_secs_f64(),
            self.reduced(),
            self.unchanged(),
            self.failed(),
            self.cancelled(),
            self.overall_ratio() * 100.0
        )
    }
}

/// Runs one set of options over many curves.
#[derive(Debug)]
pub struct BatchReducer {
    reducer: KeyframeReducer,
    config: BatchConfig,
}

impl BatchReducer {
    pub fn new(options: ReductionOptions, config: BatchConfig) -> Self {
        Self::with_reducer(KeyframeReducer::new(options), config)
    }

    pub fn with_reducer(reducer: KeyframeReducer, config: BatchConfig) -> Self {
        Self { reducer, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Reduce every entry, writing successful results back.
    ///
    /// Per-curve failures end up in the summary; only a thread pool that
    /// cannot be built fails the batch.
    #[tracing::instrument(skip_all, fields(curves = entries.len()))]
    pub fn run<C>(&self, entries: &mut [BatchEntry<C>], cancel: &CancelFlag) -> Result<BatchSummary>
    where
        C: CurveEvaluator + CurveWriter + Send,
    {
        let start = Instant::now();
        let reports: Vec<CurveReport> = match self.config.build_pool()? {
            Some(pool) => pool.install(|| {
                entries
                    .par_iter_mut()
                    .map(|entry| self.process(entry, cancel))
                    .collect::<Vec<_>>()
            }),
            None => entries
                .iter_mut()
                .map(|entry| self.process(entry, cancel))
                .collect(),
        };

        let summary = BatchSummary {
            reports,
            elapsed: start.elapsed(),
        };
        info!("{}", summary);
        Ok(summary)
    }

    fn process<C>(&self, entry: &mut BatchEntry<C>, cancel: &CancelFlag) -> CurveReport
    where
        C: CurveEvaluator + CurveWriter,
    {
        if cancel.is_cancelled() {
            return CurveReport::skipped(&entry.name, CurveOutcome::Cancelled, Duration::ZERO);
        }

        let start = Instant::now();
        let report = match self.reducer.reduce_into(&mut entry.curve) {
            Ok(reduction) => CurveReport {
                name: entry.name.clone(),
                outcome: if reduction.is_reduced() {
                    CurveOutcome::Reduced
                } else {
                    CurveOutcome::Unchanged
                },
                original_count: reduction.original_count,
                keyframe_count: reduction.keyframe_count(),
                reduction_ratio: reduction.reduction_ratio,
                elapsed: start.elapsed(),
            },
            Err(e) => {
                if e.is_fatal() {
                    error!(curve = %entry.name, error = %e, "internal reduction error");
                } else {
                    warn!(curve = %entry.name, error = %e, "curve skipped");
                }
                CurveReport::skipped(&entry.name, CurveOutcome::Failed(e), start.elapsed())
            }
        };
        info!("{}", report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_report_display() {
        let report = CurveReport {
            name: "hips.translateX".to_string(),
            outcome: CurveOutcome::Reduced,
            original_count: 50,
            keyframe_count: 2,
            reduction_ratio: 0.96,
            elapsed: Duration::from_millis(10),
        };
        assert_eq!(report.to_string(), "hips.translateX | 0.01s | 50 -> 2 keys | reduced 96.00%");

        let failed = CurveReport::skipped(
            "spine.rotateY",
            CurveOutcome::Failed(Error::InvalidInput("bad".to_string())),
            Duration::ZERO,
        );
        assert!(failed.is_failed());
        assert!(failed.to_string().starts_with("spine.rotateY | 0.00s | failed: "));
    }

    #[test]
    fn test_overall_ratio_counts_unreduced_as_zero() {
        let mut summary = BatchSummary::default();
        assert_eq!(summary.overall_ratio(), 0.0);
        for (ratio, outcome) in [(0.5, CurveOutcome::Reduced), (0.0, CurveOutcome::Unchanged)] {
            summary.reports.push(CurveReport {
                name: String::new(),
                outcome,
                original_count: 10,
                keyframe_count: 5,
                reduction_ratio: ratio,
                elapsed: Duration::ZERO,
            });
        }
        assert_eq!(summary.overall_ratio(), 0.25);
        assert_eq!(summary.reduced(), 1);
        assert_eq!(summary.unchanged(), 1);
    }
}
