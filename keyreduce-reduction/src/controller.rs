//! Greedy error-bounded keyframe removal
//!
//! Every sample starts out as a keyframe. Candidates form a doubly linked
//! list over the sample indices; each removable candidate carries the cost
//! of merging its two segments, kept in a priority queue (cheapest first).
//! The cheapest removal is applied while its cost stays within tolerance.
//! Because the order of removals never depends on the tolerance, a larger
//! tolerance only continues the same sequence further.

use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use tracing::{debug, trace};

use crate::fit::{AdjacentSegment, FitEnd, FitResult, FitWindow, LeastSquaresFitter};
use keyreduce_core::{Keyframe, Result, Sample, Segment, TangentShape, UNWEIGHTED_HANDLE_FRACTION};

const INVALID: usize = usize::MAX;

/// Slack on the error bound, relative to the largest sample magnitude.
/// Absorbs floating-point residue so exact fits survive a zero tolerance.
const ROUNDING_SLACK: f64 = 64.0 * f64::EPSILON;

/// Terminal outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Fewer keys than the source curve authored
    Reduced,
    /// The search could not beat the authored key count
    NoReductionPossible,
}

/// Lifecycle of a [`ReductionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionState {
    Initialized,
    Searching,
    Converged(Convergence),
}

#[derive(Debug, Clone)]
struct Candidate {
    prev: usize,
    next: usize,
    alive: bool,
    /// Endpoints and split keys are never removed
    pinned: bool,
    shape: TangentShape,
    in_slope: f64,
    out_slope: f64,
    in_fraction: f64,
    out_fraction: f64,
}

/// Priority of a removal: lowest deviation first, then lowest index.
#[derive(Debug, Clone, Copy)]
struct RemovalCost {
    deviation: f64,
    index: usize,
}

impl PartialEq for RemovalCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for RemovalCost {}

impl PartialOrd for RemovalCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RemovalCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap reversed: smallest deviation, then smallest index
        other
            .deviation
            .total_cmp(&self.deviation)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Drives the search over retained keyframes for one curve.
pub struct ReductionController<'a> {
    samples: &'a [Sample],
    fitter: &'a LeastSquaresFitter,
    error: f64,
    slack: f64,
    candidates: Vec<Candidate>,
    queue: PriorityQueue<usize, RemovalCost>,
    proposals: Vec<Option<FitResult>>,
    alive: usize,
    state: ReductionState,
}

impl<'a> ReductionController<'a> {
    /// Set up the candidate list. `shapes` holds one tangent shape per
    /// sample; `pinned` marks samples that must stay keyframes.
    pub fn new(
        samples: &'a [Sample],
        shapes: &[TangentShape],
        pinned: &[bool],
        fitter: &'a LeastSquaresFitter,
        error: f64,
    ) -> Self {
        let n = samples.len();
        let candidates = (0..n)
            .map(|i| {
                let slope = initial_slope(samples, i);
                Candidate {
                    prev: if i == 0 { INVALID } else { i - 1 },
                    next: if i + 1 == n { INVALID } else { i + 1 },
                    alive: true,
                    pinned: i == 0 || i + 1 == n || pinned.get(i).copied().unwrap_or(false),
                    shape: shapes.get(i).copied().unwrap_or_default(),
                    in_slope: slope,
                    out_slope: slope,
                    in_fraction: UNWEIGHTED_HANDLE_FRACTION,
                    out_fraction: UNWEIGHTED_HANDLE_FRACTION,
                }
            })
            .collect();
        let magnitude = samples.iter().fold(1.0_f64, |m, s| m.max(s.value.abs()));

        Self {
            samples,
            fitter,
            error,
            slack: ROUNDING_SLACK * magnitude,
            candidates,
            queue: PriorityQueue::with_capacity(n),
            proposals: vec![None; n],
            alive: n,
            state: ReductionState::Initialized,
        }
    }

    pub fn state(&self) -> ReductionState {
        self.state
    }

    /// Number of keyframes currently retained.
    pub fn keyframe_count(&self) -> usize {
        self.alive
    }

    /// Remove candidates until the cheapest removal would exceed the
    /// tolerance. `original_count` is the authored key count the result
    /// has to beat.
    pub fn run(&mut self, original_count: usize) -> Result<Convergence> {
        self.state = ReductionState::Searching;

        for index in 0..self.candidates.len() {
            self.refresh(index)?;
        }
        debug!(candidates = self.queue.len(), "removal queue seeded");

        let mut removed = 0usize;
        while let Some((&index, cost)) = self.queue.peek() {
            if cost.deviation > self.error + self.slack {
                break;
            }
            let deviation = cost.deviation;
            self.queue.pop();
            let Some(fit) = self.proposals[index].take() else {
                continue;
            };

            let (prev, next) = self.remove(index, &fit);
            removed += 1;
            trace!(index, deviation, remaining = self.alive, "removed keyframe");

            for neighbour in self.neighbourhood(prev, next) {
                self.refresh(neighbour)?;
            }
        }

        let convergence = if self.alive >= original_count {
            Convergence::NoReductionPossible
        } else {
            Convergence::Reduced
        };
        debug!(removed, retained = self.alive, ?convergence, "search converged");
        self.state = ReductionState::Converged(convergence);
        Ok(convergence)
    }

    /// Retained keyframes in time order.
    pub fn keyframes(&self) -> Vec<Keyframe> {
        let mut keys = Vec::with_capacity(self.alive);
        let mut index = 0;
        while index != INVALID {
            let candidate = &self.candidates[index];
            let sample = self.samples[index];
            let before = self.span(candidate.prev, index);
            let after = self.span(index, candidate.next);
            let (before, after) = match (before, after) {
                (Some(b), Some(a)) => (b, a),
                (Some(b), None) => (b, b),
                (None, Some(a)) => (a, a),
                (None, None) => (0.0, 0.0),
            };
            keys.push(Keyframe {
                time: sample.time,
                value: sample.value,
                in_slope: candidate.in_slope,
                out_slope: candidate.out_slope,
                in_weight: candidate.in_fraction * before,
                out_weight: candidate.out_fraction * after,
                tangent_weighted: candidate.shape.weighted,
                tangent_split: candidate.shape.split,
            });
            index = candidate.next;
        }
        keys
    }

    fn span(&self, from: usize, to: usize) -> Option<f64> {
        if from == INVALID || to == INVALID {
            None
        } else {
            Some(self.samples[to].time - self.samples[from].time)
        }
    }

    /// Window that results from removing `index`.
    fn window(&self, index: usize) -> FitWindow {
        let c = &self.candidates[index];
        let (p, n) = (c.prev, c.next);
        let (left, right) = (&self.candidates[p], &self.candidates[n]);

        let mut start = FitEnd {
            slope: left.out_slope,
            fraction: left.out_fraction,
            shape: left.shape,
            adjacent: None,
        };
        if left.prev != INVALID {
            let far = &self.candidates[left.prev];
            start = start.with_adjacent(AdjacentSegment {
                segment: Segment::new(left.prev, p),
                far_slope: far.out_slope,
                far_fraction: far.out_fraction,
                near_fraction: left.in_fraction,
            });
        }

        let mut end = FitEnd {
            slope: right.in_slope,
            fraction: right.in_fraction,
            shape: right.shape,
            adjacent: None,
        };
        if right.next != INVALID {
            let far = &self.candidates[right.next];
            end = end.with_adjacent(AdjacentSegment {
                segment: Segment::new(n, right.next),
                far_slope: far.in_slope,
                far_fraction: far.in_fraction,
                near_fraction: right.out_fraction,
            });
        }

        FitWindow {
            segment: Segment::new(p, n),
            start,
            end,
        }
    }

    /// Recompute the removal proposal for `index`.
    fn refresh(&mut self, index: usize) -> Result<()> {
        let candidate = &self.candidates[index];
        if !candidate.alive || candidate.pinned {
            return Ok(());
        }
        let window = self.window(index);
        let fit = self.fitter.fit(self.samples, &window)?;
        self.queue.push(
            index,
            RemovalCost {
                deviation: fit.max_deviation,
                index,
            },
        );
        self.proposals[index] = Some(fit);
        Ok(())
    }

    /// Unlink `index` and adopt the fitted tangents on its neighbours.
    fn remove(&mut self, index: usize, fit: &FitResult) -> (usize, usize) {
        let (p, n) = (self.candidates[index].prev, self.candidates[index].next);
        self.candidates[index].alive = false;
        self.alive -= 1;

        let left = &mut self.candidates[p];
        left.next = n;
        left.out_slope = fit.start_slope;
        left.out_fraction = fit.start_fraction;
        if !left.shape.split {
            left.in_slope = fit.start_slope;
        }

        let right = &mut self.candidates[n];
        right.prev = p;
        right.in_slope = fit.end_slope;
        right.in_fraction = fit.end_fraction;
        if !right.shape.split {
            right.out_slope = fit.end_slope;
        }

        (p, n)
    }

    /// Candidates whose removal windows touch the keys at `prev` and `next`.
    fn neighbourhood(&self, prev: usize, next: usize) -> Vec<usize> {
        let mut indices = Vec::with_capacity(6);
        let mut cursor = prev;
        for _ in 0..3 {
            if cursor == INVALID {
                break;
            }
            indices.push(cursor);
            cursor = self.candidates[cursor].prev;
        }
        let mut cursor = next;
        for _ in 0..3 {
            if cursor == INVALID {
                break;
            }
            indices.push(cursor);
            cursor = self.candidates[cursor].next;
        }
        indices
    }
}

/// Central difference, one-sided at the ends.
fn initial_slope(samples: &[Sample], i: usize) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    let (a, b) = match i {
        0 => (0, 1),
        i if i + 1 == n => (n - 2, n - 1),
        i => (i - 1, i + 1),
    };
    (samples[b].value - samples[a].value) / (samples[b].time - samples[a].time)
}
