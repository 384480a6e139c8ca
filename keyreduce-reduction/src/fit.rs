//! Least-squares tangent fitting
//!
//! Keyframe values are fixed to the samples they sit on, so a segment's
//! shape is governed only by its end tangents. For fixed handle lengths the
//! interpolated value is linear in the two slopes, which turns the fit into
//! a 2x2 normal-equations system solved by Cholesky. Weighted handles add
//! the two handle lengths as unknowns; they are optimised by damped
//! Gauss-Newton on the same squared residual, re-solving the slopes exactly
//! for every trial pair of lengths.

use nalgebra::{Matrix2, Vector2};

use crate::evaluate::{ErrorEvaluator, SegmentTangents};
use keyreduce_core::{
    bernstein_basis, bezier_parameter, clamp_handle_fractions, hermite_basis, Error, Result,
    Sample, Segment, TangentShape, MIN_HANDLE_FRACTION, UNWEIGHTED_HANDLE_FRACTION,
};

const FINITE_DIFFERENCE_STEP: f64 = 1e-6;
const RESIDUAL_FLOOR: f64 = 1e-24;
const MAX_DAMPING: f64 = 1e8;

/// The segment on the other side of a unified key.
///
/// Its far key is held fixed; only the shared slope moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjacentSegment {
    pub segment: Segment,
    /// Slope of the far key on this segment
    pub far_slope: f64,
    /// Handle fraction of the far key on this segment
    pub far_fraction: f64,
    /// Handle fraction of the shared key on this segment
    pub near_fraction: f64,
}

/// One end of the segment being fitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitEnd {
    /// Current slope on the segment's side, used as the regularisation prior
    pub slope: f64,
    /// Current handle fraction on the segment's side
    pub fraction: f64,
    pub shape: TangentShape,
    /// Segment across the key, if the key has one
    pub adjacent: Option<AdjacentSegment>,
}

impl FitEnd {
    pub fn new(slope: f64, shape: TangentShape) -> Self {
        Self {
            slope,
            fraction: UNWEIGHTED_HANDLE_FRACTION,
            shape,
            adjacent: None,
        }
    }

    pub fn with_adjacent(mut self, adjacent: AdjacentSegment) -> Self {
        self.adjacent = Some(adjacent);
        self
    }

    /// The adjacent segment, when the slope is shared with it.
    fn shared(&self) -> Option<&AdjacentSegment> {
        if self.shape.split {
            None
        } else {
            self.adjacent.as_ref()
        }
    }
}

/// A segment together with the tangent shapes of its end keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitWindow {
    pub segment: Segment,
    pub start: FitEnd,
    pub end: FitEnd,
}

impl FitWindow {
    pub fn weighted(&self) -> bool {
        self.start.shape.weighted || self.end.shape.weighted
    }

    /// Every segment whose shape depends on the fitted tangents.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(3);
        if let Some(before) = self.start.shared() {
            segments.push(before.segment);
        }
        segments.push(self.segment);
        if let Some(after) = self.end.shared() {
            segments.push(after.segment);
        }
        segments
    }
}

/// Fitted tangents of a window and the resulting worst deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    /// Out slope of the start key (shared with its in slope when unified)
    pub start_slope: f64,
    /// In slope of the end key (shared with its out slope when unified)
    pub end_slope: f64,
    pub start_fraction: f64,
    pub end_fraction: f64,
    /// Maximum deviation over every segment of the window
    pub max_deviation: f64,
}

impl FitResult {
    /// Tangents of the fitted segment itself.
    pub fn tangents(&self, weighted: bool) -> SegmentTangents {
        SegmentTangents {
            out_slope: self.start_slope,
            in_slope: self.end_slope,
            out_fraction: self.start_fraction,
            in_fraction: self.end_fraction,
            weighted,
        }
    }
}

/// One residual: `value - (base + c0 * m0 + c1 * m1)`.
#[derive(Debug, Clone, Copy)]
struct Row {
    value: f64,
    base: f64,
    c0: f64,
    c1: f64,
}

impl Row {
    #[inline]
    fn residual(&self, slopes: &Vector2<f64>) -> f64 {
        self.value - self.base - self.c0 * slopes[0] - self.c1 * slopes[1]
    }
}

/// Constant part and slope coefficients of a segment value at `s`.
///
/// Returns `(base, start_coefficient, end_coefficient)`.
fn segment_terms(weighted: bool, y0: f64, y1: f64, fa: f64, fb: f64, dt: f64, s: f64) -> (f64, f64, f64) {
    if weighted {
        let u = bezier_parameter(fa, fb, s);
        let [_, b1, b2, b3] = bernstein_basis(u);
        (y0 + (y1 - y0) * (b2 + b3), b1 * fa * dt, -b2 * fb * dt)
    } else {
        let [_, h10, h01, h11] = hermite_basis(s);
        (y0 + (y1 - y0) * h01, h10 * dt, h11 * dt)
    }
}

/// Samples of one window, ready to be turned into residual rows.
struct Problem<'a> {
    samples: &'a [Sample],
    window: &'a FitWindow,
    weighted: bool,
    /// Rows of the adjacent segments; they do not depend on the fitted lengths
    fixed_rows: Vec<Row>,
}

impl<'a> Problem<'a> {
    fn new(samples: &'a [Sample], window: &'a FitWindow) -> Self {
        let weighted = window.weighted();
        let mut fixed_rows = Vec::new();

        if let Some(before) = window.start.shared() {
            let (first, last) = (samples[before.segment.start], samples[before.segment.end]);
            let dt = last.time - first.time;
            for sample in &samples[before.segment.interior()] {
                let s = (sample.time - first.time) / dt;
                let (base, far, near) = segment_terms(
                    weighted,
                    first.value,
                    last.value,
                    before.far_fraction,
                    before.near_fraction,
                    dt,
                    s,
                );
                fixed_rows.push(Row {
                    value: sample.value,
                    base: base + far * before.far_slope,
                    c0: near,
                    c1: 0.0,
                });
            }
        }

        if let Some(after) = window.end.shared() {
            let (first, last) = (samples[after.segment.start], samples[after.segment.end]);
            let dt = last.time - first.time;
            for sample in &samples[after.segment.interior()] {
                let s = (sample.time - first.time) / dt;
                let (base, near, far) = segment_terms(
                    weighted,
                    first.value,
                    last.value,
                    after.near_fraction,
                    after.far_fraction,
                    dt,
                    s,
                );
                fixed_rows.push(Row {
                    value: sample.value,
                    base: base + far * after.far_slope,
                    c0: 0.0,
                    c1: near,
                });
            }
        }

        Self {
            samples,
            window,
            weighted,
            fixed_rows,
        }
    }

    /// All residual rows for handle fractions `a` (start) and `b` (end).
    fn rows(&self, a: f64, b: f64) -> Vec<Row> {
        let segment = self.window.segment;
        let (first, last) = (self.samples[segment.start], self.samples[segment.end]);
        let dt = last.time - first.time;

        let mut rows = Vec::with_capacity(self.fixed_rows.len() + segment.sample_count());
        rows.extend_from_slice(&self.fixed_rows);
        for sample in &self.samples[segment.interior()] {
            let s = (sample.time - first.time) / dt;
            let (base, c0, c1) = segment_terms(self.weighted, first.value, last.value, a, b, dt, s);
            rows.push(Row {
                value: sample.value,
                base,
                c0,
                c1,
            });
        }
        rows
    }
}

fn sum_of_squares(rows: &[Row], slopes: &Vector2<f64>) -> f64 {
    rows.iter().map(|r| r.residual(slopes).powi(2)).sum()
}

/// Fits end tangents of a segment by least squares.
#[derive(Debug, Clone)]
pub struct LeastSquaresFitter {
    /// Tikhonov weight pulling slopes toward their current values, relative
    /// to the trace of the normal matrix
    pub regularization: f64,
    /// Gauss-Newton iterations spent on weighted handle lengths
    pub max_iterations: usize,
    evaluator: ErrorEvaluator,
}

impl Default for LeastSquaresFitter {
    fn default() -> Self {
        Self {
            regularization: 1e-9,
            max_iterations: 8,
            evaluator: ErrorEvaluator::new(),
        }
    }
}

impl LeastSquaresFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(regularization: f64, max_iterations: usize) -> Self {
        Self {
            regularization,
            max_iterations,
            evaluator: ErrorEvaluator::new(),
        }
    }

    /// Fit the tangents of `window` against `samples`.
    pub fn fit(&self, samples: &[Sample], window: &FitWindow) -> Result<FitResult> {
        for segment in window.segments() {
            let dt = segment.duration(samples);
            if !dt.is_finite() || dt <= 0.0 {
                return Err(Error::SingularFit(format!(
                    "segment [{}, {}] has zero length",
                    segment.start, segment.end
                )));
            }
        }

        // Nothing between the keys and nothing shared: any tangents fit exactly.
        if window.segment.sample_count() <= 2
            && window.start.shared().is_none()
            && window.end.shared().is_none()
        {
            return Ok(FitResult {
                start_slope: window.start.slope,
                end_slope: window.end.slope,
                start_fraction: window.start.fraction,
                end_fraction: window.end.fraction,
                max_deviation: 0.0,
            });
        }

        let problem = Problem::new(samples, window);
        let third = UNWEIGHTED_HANDLE_FRACTION;
        let slopes = self.solve_slopes(&problem.rows(third, third), window)?;
        let mut best = self.finish(samples, window, slopes, third, third);

        if problem.weighted {
            let (slopes, a, b) = self.fit_handle_lengths(&problem, slopes)?;
            let weighted = self.finish(samples, window, slopes, a, b);
            if weighted.max_deviation <= best.max_deviation {
                best = weighted;
            }
        }

        if !best.start_slope.is_finite() || !best.end_slope.is_finite() || !best.max_deviation.is_finite() {
            return Err(Error::FitFailed(format!(
                "non-finite tangents for segment [{}, {}]",
                window.segment.start, window.segment.end
            )));
        }
        Ok(best)
    }

    /// Maximum deviation of the window for the given tangents.
    pub fn window_deviation(&self, samples: &[Sample], window: &FitWindow, fit: &FitResult) -> f64 {
        let weighted = window.weighted();
        let mut deviation = self.evaluator.evaluate(samples, window.segment, &fit.tangents(weighted));
        if let Some(before) = window.start.shared() {
            let tangents = SegmentTangents {
                out_slope: before.far_slope,
                in_slope: fit.start_slope,
                out_fraction: before.far_fraction,
                in_fraction: before.near_fraction,
                weighted,
            };
            deviation = deviation.max(self.evaluator.evaluate(samples, before.segment, &tangents));
        }
        if let Some(after) = window.end.shared() {
            let tangents = SegmentTangents {
                out_slope: fit.end_slope,
                in_slope: after.far_slope,
                out_fraction: after.near_fraction,
                in_fraction: after.far_fraction,
                weighted,
            };
            deviation = deviation.max(self.evaluator.evaluate(samples, after.segment, &tangents));
        }
        deviation
    }

    fn finish(&self, samples: &[Sample], window: &FitWindow, slopes: Vector2<f64>, a: f64, b: f64) -> FitResult {
        let mut fit = FitResult {
            start_slope: slopes[0],
            end_slope: slopes[1],
            start_fraction: a,
            end_fraction: b,
            max_deviation: 0.0,
        };
        fit.max_deviation = self.window_deviation(samples, window, &fit);
        fit
    }

    /// Solve the regularised 2x2 normal equations for the two slopes.
    fn solve_slopes(&self, rows: &[Row], window: &FitWindow) -> Result<Vector2<f64>> {
        let mut normal = Matrix2::zeros();
        let mut rhs = Vector2::zeros();
        for row in rows {
            let c = Vector2::new(row.c0, row.c1);
            normal += c * c.transpose();
            rhs += c * (row.value - row.base);
        }

        let prior = Vector2::new(window.start.slope, window.end.slope);
        let lambda = self.regularization * (normal.trace() + f64::EPSILON);
        normal += Matrix2::identity() * lambda;
        rhs += prior * lambda;

        let slopes = normal
            .cholesky()
            .map(|chol| chol.solve(&rhs))
            .ok_or_else(|| {
                Error::FitFailed(format!(
                    "normal equations of segment [{}, {}] are not positive definite",
                    window.segment.start, window.segment.end
                ))
            })?;

        if slopes.iter().all(|s| s.is_finite()) {
            Ok(slopes)
        } else {
            Err(Error::FitFailed(format!(
                "non-finite slopes for segment [{}, {}]",
                window.segment.start, window.segment.end
            )))
        }
    }

    /// Damped Gauss-Newton over the two handle fractions of the segment.
    fn fit_handle_lengths(
        &self,
        problem: &Problem<'_>,
        slopes: Vector2<f64>,
    ) -> Result<(Vector2<f64>, f64, f64)> {
        let window = problem.window;
        let third = UNWEIGHTED_HANDLE_FRACTION;
        let (mut a, mut b) = (third, third);
        let mut slopes = slopes;
        let mut rows = problem.rows(a, b);
        let mut sse = sum_of_squares(&rows, &slopes);
        let mut damping = 1e-3;

        for _ in 0..self.max_iterations {
            if sse <= RESIDUAL_FLOOR {
                break;
            }
            let residuals: Vec<f64> = rows.iter().map(|r| r.residual(&slopes)).collect();

            let mut columns: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
            for (j, column) in columns.iter_mut().enumerate() {
                let (value, other) = if j == 0 { (a, b) } else { (b, a) };
                let h = if value + FINITE_DIFFERENCE_STEP + other > 1.0 {
                    -FINITE_DIFFERENCE_STEP
                } else {
                    FINITE_DIFFERENCE_STEP
                };
                let (ta, tb) = if j == 0 { (a + h, b) } else { (a, b + h) };
                let trial_rows = problem.rows(ta, tb);
                let trial_slopes = self.solve_slopes(&trial_rows, window)?;
                *column = trial_rows
                    .iter()
                    .zip(&residuals)
                    .map(|(r, base)| (r.residual(&trial_slopes) - base) / h)
                    .collect();
            }

            let mut jtj = Matrix2::zeros();
            let mut jtr = Vector2::zeros();
            for (k, residual) in residuals.iter().enumerate() {
                let g = Vector2::new(columns[0][k], columns[1][k]);
                jtj += g * g.transpose();
                jtr += g * *residual;
            }

            let mut improved = false;
            while damping <= MAX_DAMPING {
                let mut damped = jtj;
                damped[(0, 0)] += damping * jtj[(0, 0)] + f64::EPSILON;
                damped[(1, 1)] += damping * jtj[(1, 1)] + f64::EPSILON;
                let step = match damped.cholesky() {
                    Some(chol) => -chol.solve(&jtr),
                    None => break,
                };
                let (na, nb) = clamp_handle_fractions(a + step[0], b + step[1]);
                let trial_rows = problem.rows(na, nb);
                let trial_slopes = self.solve_slopes(&trial_rows, window)?;
                let trial_sse = sum_of_squares(&trial_rows, &trial_slopes);
                if trial_sse < sse {
                    let gain = sse - trial_sse;
                    a = na;
                    b = nb;
                    rows = trial_rows;
                    slopes = trial_slopes;
                    sse = trial_sse;
                    damping = (damping * 0.1).max(1e-12);
                    improved = gain > 1e-12 * (sse + gain);
                    break;
                }
                damping *= 10.0;
            }

            if !improved {
                break;
            }
        }

        debug_assert!(a >= MIN_HANDLE_FRACTION && b >= MIN_HANDLE_FRACTION);
        Ok((slopes, a, b))
    }
}
