//! Common test helpers for conevol integration tests

#![allow(dead_code)]

use conevol::prelude::*;

// ============================================================================
// Standard test volumes
// ============================================================================

/// 16³ soft sphere with unit spacing
pub fn test_sphere() -> ScalarField {
    sphere_field([16, 16, 16], Vec3::ONE, 0.6).unwrap()
}

/// Constant-density field
pub fn test_uniform(resolution: [u32; 3], density: f32) -> ScalarField {
    uniform_field(resolution, Vec3::ONE, density).unwrap()
}

/// Linear extinction ramp, white
pub fn test_tf(max_extinction: f32) -> TransferFunction {
    TransferFunction::ramp(Vec3::ONE, max_extinction)
}

/// Sphere scene with a moderate ramp
pub fn test_scene() -> Scene {
    Scene {
        field: test_sphere(),
        transfer_function: test_tf(0.3),
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// Build a schedule, panicking on error
pub fn build_schedule(params: ConeParams, sigma0: f64) -> ConeSchedule {
    let mut sampler = ConeGaussianSampler::new(params);
    sampler.compute_cone_integration_steps(sigma0).unwrap().clone()
}

/// Whether sigma doubling can ever fit a section far from the apex
///
/// Far out the next position grows like `d_sigma * sigma`, so placement
/// succeeds only if `d_sigma * tan(widest per-ray angle) < r_sigma`.
pub fn converges(p: &ConeParams) -> bool {
    let per_ray = (p.half_angle_deg as f64).to_radians() / p.max_packing.angle_divisor();
    (p.separation_multiplier as f64) * per_ray.tan() < p.sigma_limit_multiplier as f64
}

/// Representative parameter grid covering every packing and the range edges
///
/// Includes configurations that do not converge; see [`converges`].
pub fn param_grid() -> Vec<ConeParams> {
    let mut out = Vec::new();
    for &angle in &[0.5f32, 5.0, 20.0, 30.0, 60.0] {
        for packing in ConePacking::ALL {
            for &(d_sigma, r_sigma) in &[(1.0f32, 2.0f32), (1.25, 2.0), (3.0, 3.0), (1.0, 0.5)] {
                let mut p = ConeParams {
                    max_packing: packing,
                    ..Default::default()
                };
                p.set_half_angle(angle);
                p.set_separation_multiplier(d_sigma);
                p.set_sigma_limit_multiplier(r_sigma);
                out.push(p);
            }
        }
    }
    out
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert two floats are within `tol`
pub fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
    assert!((a - b).abs() <= tol, "{}: {} vs {} (tol {})", msg, a, b, tol);
}
