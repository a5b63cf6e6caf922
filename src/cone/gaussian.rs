//! 1-D Gaussian evaluation and fixed-width integration
//!
//! The cone schedule only ever needs the mass of a normal distribution
//! inside `[-r, r]`. A midpoint rule with a fixed segment length keeps the
//! result deterministic; [`midpoint_error_bound`] gives the worst case
//! for a given `(sigma, radius)`.

use std::f64::consts::PI;

/// Target segment length of the midpoint rule (domain units)
pub const INTEGRATION_SEGMENT: f64 = 0.05;

/// Normal probability density with zero mean
#[inline(always)]
pub fn gaussian_eval(x: f64, sigma: f64) -> f64 {
    (1.0 / ((2.0 * PI).sqrt() * sigma)) * (-(x * x) / (2.0 * sigma * sigma)).exp()
}

/// Total mass of the unnormalised Gaussian `exp(-x² / 2σ²)`
#[inline(always)]
pub fn gaussian_mass(sigma: f64) -> f64 {
    sigma * (2.0 * PI).sqrt()
}

/// Number of midpoint segments used for `[-radius, radius]`
#[inline]
pub fn segment_count(radius: f64) -> usize {
    ((2.0 * radius) / INTEGRATION_SEGMENT).ceil().max(1.0) as usize
}

/// Integrate the normal PDF over `[-radius, radius]`
///
/// Midpoint rule with `ceil(2r / 0.05)` segments (at least one). The
/// segment width is rescaled so the segments tile the interval exactly.
/// Tends to 1 as `radius` grows.
pub fn integrate_over_radius(sigma: f64, radius: f64) -> f64 {
    let radius = radius.max(0.0);
    let nt = segment_count(radius);
    let segment = (2.0 * radius) / nt as f64;

    // Midpoint of the first segment
    let s0 = -radius + segment * 0.5;

    (0..nt)
        .map(|i| gaussian_eval(s0 + segment * i as f64, sigma) * segment)
        .sum()
}

/// Upper bound of the midpoint-rule error of [`integrate_over_radius`]
///
/// `(b - a) h² max|f''| / 24`, with `max|f''| = 1 / (σ³ sqrt(2π))`
/// reached at the mean.
pub fn midpoint_error_bound(sigma: f64, radius: f64) -> f64 {
    let radius = radius.max(0.0);
    let h = (2.0 * radius) / segment_count(radius) as f64;
    let max_f2 = 1.0 / (sigma.powi(3) * (2.0 * PI).sqrt());
    2.0 * radius * h * h * max_f2 / 24.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference integral with a much finer midpoint rule
    fn reference(sigma: f64, radius: f64) -> f64 {
        let n = 200_000;
        let h = 2.0 * radius / n as f64;
        (0..n)
            .map(|i| gaussian_eval(-radius + h * (i as f64 + 0.5), sigma) * h)
            .sum()
    }

    #[test]
    fn test_eval_peak() {
        let sigma = 1.5;
        let peak = gaussian_eval(0.0, sigma);
        assert!((peak - 1.0 / (sigma * (2.0 * PI).sqrt())).abs() < 1e-12);
        assert!(gaussian_eval(1.0, sigma) < peak);
        assert!((gaussian_eval(0.7, sigma) - gaussian_eval(-0.7, sigma)).abs() < 1e-15);
    }

    #[test]
    fn test_zero_radius() {
        assert_eq!(segment_count(0.0), 1);
        assert_eq!(integrate_over_radius(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(1.0), 40);
        assert_eq!(segment_count(0.01), 1);
    }

    #[test]
    fn test_monotonic_in_radius() {
        let sigma = 1.25;
        let mut prev = 0.0;
        for i in 1..200 {
            let r = i as f64 * 0.037;
            let p = integrate_over_radius(sigma, r);
            assert!(p >= prev, "not monotonic at r={}: {} < {}", r, p, prev);
            prev = p;
        }
    }

    #[test]
    fn test_asymptotic_mass() {
        for &sigma in &[0.5, 1.0, 1.25, 4.0] {
            let p = integrate_over_radius(sigma, 12.0 * sigma);
            assert!((p - 1.0).abs() < 1e-4, "sigma={} p={}", sigma, p);
            let mass = p * gaussian_mass(sigma);
            assert!((mass - sigma * (2.0 * PI).sqrt()).abs() < 1e-3 * sigma);
        }
    }

    #[test]
    fn test_error_bound_holds() {
        for &(sigma, radius) in &[(0.5, 0.3), (1.0, 2.0), (1.25, 2.5), (2.5, 0.04)] {
            let err = (integrate_over_radius(sigma, radius) - reference(sigma, radius)).abs();
            let bound = midpoint_error_bound(sigma, radius);
            assert!(err <= bound + 1e-9, "sigma={} r={} err={} bound={}", sigma, radius, err, bound);
        }
    }
}
