//! Segment interpolation shared by hosts and the fitter
//!
//! Unweighted segments are cubic Hermite in time. Weighted segments are
//! cubic Bezier curves in the (time, value) plane whose handles span a
//! fraction of the segment duration; the value at a time is found by
//! inverting the (monotonic) time component.

use crate::keyframe::{Keyframe, UNWEIGHTED_HANDLE_FRACTION};

/// Smallest handle fraction a weighted segment may use.
pub const MIN_HANDLE_FRACTION: f64 = 0.02;

const PARAMETER_TOLERANCE: f64 = 1e-12;
const MAX_PARAMETER_ITERATIONS: usize = 48;

/// Cubic Hermite basis `[h00, h10, h01, h11]` at normalized time `s`.
#[inline]
pub fn hermite_basis(s: f64) -> [f64; 4] {
    let s2 = s * s;
    let s3 = s2 * s;
    [
        2.0 * s3 - 3.0 * s2 + 1.0,
        s3 - 2.0 * s2 + s,
        -2.0 * s3 + 3.0 * s2,
        s3 - s2,
    ]
}

/// Cubic Bernstein basis `[b0, b1, b2, b3]` at parameter `u`.
#[inline]
pub fn bernstein_basis(u: f64) -> [f64; 4] {
    let t = 1.0 - u;
    [t * t * t, 3.0 * u * t * t, 3.0 * u * u * t, u * u * u]
}

/// Value of a Hermite segment of duration `dt` at normalized time `s`.
///
/// Written relative to `y0` so a flat segment evaluates to `y0` exactly.
#[inline]
pub fn hermite_value(y0: f64, m0: f64, y1: f64, m1: f64, dt: f64, s: f64) -> f64 {
    let [_, h10, h01, h11] = hermite_basis(s);
    y0 + (y1 - y0) * h01 + dt * (h10 * m0 + h11 * m1)
}

/// Clamp handle fractions so the time component stays monotonic.
pub fn clamp_handle_fractions(a: f64, b: f64) -> (f64, f64) {
    let a = if a.is_finite() { a } else { UNWEIGHTED_HANDLE_FRACTION };
    let b = if b.is_finite() { b } else { UNWEIGHTED_HANDLE_FRACTION };
    let a = a.clamp(MIN_HANDLE_FRACTION, 1.0);
    let b = b.clamp(MIN_HANDLE_FRACTION, 1.0);
    let sum = a + b;
    if sum > 1.0 {
        (a / sum, b / sum)
    } else {
        (a, b)
    }
}

/// Handle fractions of a weighted segment from absolute handle lengths.
pub fn handle_fractions(out_weight: f64, in_weight: f64, dt: f64) -> (f64, f64) {
    if dt <= 0.0 {
        return (UNWEIGHTED_HANDLE_FRACTION, UNWEIGHTED_HANDLE_FRACTION);
    }
    clamp_handle_fractions(out_weight / dt, in_weight / dt)
}

/// Bezier parameter `u` whose time component equals normalized time `s`.
///
/// Control times are `0, a, 1 - b, 1` with `a + b <= 1`, so the time
/// component is monotonic and Newton steps can be safeguarded by bisection.
pub fn bezier_parameter(a: f64, b: f64, s: f64) -> f64 {
    let s = s.clamp(0.0, 1.0);
    let c1 = a;
    let c2 = 1.0 - b;

    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut u = s;
    for _ in 0..MAX_PARAMETER_ITERATIONS {
        let [_, b1, b2, b3] = bernstein_basis(u);
        let f = b1 * c1 + b2 * c2 + b3 - s;
        if f.abs() < PARAMETER_TOLERANCE {
            return u;
        }
        if f > 0.0 {
            hi = u;
        } else {
            lo = u;
        }

        let t = 1.0 - u;
        let df = 3.0 * (c1 * t * t + 2.0 * (c2 - c1) * u * t + (1.0 - c2) * u * u);
        let newton = if df > PARAMETER_TOLERANCE { u - f / df } else { f64::NAN };
        u = if newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    u
}

/// Value of a weighted segment at normalized time `s`.
///
/// `a` and `b` are the out-handle and in-handle time fractions.
#[allow(clippy::too_many_arguments)]
pub fn weighted_value(y0: f64, m0: f64, a: f64, y1: f64, m1: f64, b: f64, dt: f64, s: f64) -> f64 {
    let u = bezier_parameter(a, b, s);
    let [_, b1, b2, b3] = bernstein_basis(u);
    y0 + (y1 - y0) * (b2 + b3) + dt * (b1 * a * m0 - b2 * b * m1)
}

/// Value between two consecutive keyframes at `time`.
///
/// The segment is weighted when either key is weighted. Times outside the
/// segment are clamped to it.
pub fn segment_value(k0: &Keyframe, k1: &Keyframe, time: f64) -> f64 {
    let dt = k1.time - k0.time;
    if dt <= 0.0 {
        return k0.value;
    }
    let s = ((time - k0.time) / dt).clamp(0.0, 1.0);
    if k0.tangent_weighted || k1.tangent_weighted {
        let (a, b) = handle_fractions(k0.out_weight, k1.in_weight, dt);
        weighted_value(k0.value, k0.out_slope, a, k1.value, k1.in_slope, b, dt, s)
    } else {
        hermite_value(k0.value, k0.out_slope, k1.value, k1.in_slope, dt, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hermite_endpoints() {
        assert_relative_eq!(hermite_value(1.0, 5.0, 3.0, -2.0, 2.0, 0.0), 1.0);
        assert_relative_eq!(hermite_value(1.0, 5.0, 3.0, -2.0, 2.0, 1.0), 3.0);
    }

    #[test]
    fn test_hermite_reproduces_line() {
        // v = 2t + 1 over [0, 4]
        for i in 0..=8 {
            let s = i as f64 / 8.0;
            let v = hermite_value(1.0, 2.0, 9.0, 2.0, 4.0, s);
            assert_relative_eq!(v, 1.0 + 8.0 * s, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_flat_segments_are_exact() {
        for i in 0..=16 {
            let s = i as f64 / 16.0;
            assert_eq!(hermite_value(5.1, 0.0, 5.1, 0.0, 3.0, s), 5.1);
            assert_eq!(weighted_value(5.1, 0.0, 0.4, 5.1, 0.0, 0.2, 3.0, s), 5.1);
        }
    }

    #[test]
    fn test_third_handles_match_hermite() {
        let third = UNWEIGHTED_HANDLE_FRACTION;
        for i in 0..=10 {
            let s = i as f64 / 10.0;
            let hermite = hermite_value(0.5, 1.5, -1.0, 0.25, 3.0, s);
            let bezier = weighted_value(0.5, 1.5, third, -1.0, 0.25, third, 3.0, s);
            assert_relative_eq!(hermite, bezier, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bezier_parameter_inverts_time() {
        let (a, b) = (0.6, 0.1);
        for i in 0..=20 {
            let s = i as f64 / 20.0;
            let u = bezier_parameter(a, b, s);
            let [_, b1, b2, b3] = bernstein_basis(u);
            assert_relative_eq!(b1 * a + b2 * (1.0 - b) + b3, s, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_clamp_handle_fractions() {
        let (a, b) = clamp_handle_fractions(0.9, 0.6);
        assert_relative_eq!(a + b, 1.0, epsilon = 1e-12);
        assert!(a > b);

        let (a, b) = clamp_handle_fractions(0.0, f64::NAN);
        assert_eq!(a, MIN_HANDLE_FRACTION);
        assert_eq!(b, UNWEIGHTED_HANDLE_FRACTION);
    }

    #[test]
    fn test_segment_value_weighted() {
        let k0 = Keyframe::unified(0.0, 0.0, 1.0).with_weights(1.0, 1.0);
        let k1 = Keyframe::unified(3.0, 3.0, 1.0).with_weights(1.0, 1.0);
        // Collinear handles keep the segment on the line.
        assert_relative_eq!(segment_value(&k0, &k1, 1.2), 1.2, epsilon = 1e-9);
        assert_relative_eq!(segment_value(&k0, &k1, -1.0), 0.0);
        assert_relative_eq!(segment_value(&k0, &k1, 5.0), 3.0);
    }
}
