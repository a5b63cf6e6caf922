//! Integration tests: Cone schedule
//!
//! Verifies section ordering, coverage, the section/interval shape, the
//! mip-level formula and the reference 20° scenario.

mod common;

use common::*;
use conevol::cone::{integrate_over_radius, CONE_DIV_3};
use conevol::prelude::*;
use conevol::ScheduleError;

// ============================================================================
// Structural invariants
// ============================================================================

#[test]
fn schedule_is_monotonic() {
    for params in param_grid().into_iter().filter(converges) {
        let s = build_schedule(params, 1.0);
        for pair in s.sections.windows(2) {
            assert!(pair[1].ray_count >= pair[0].ray_count, "ray count decreased for {:?}", params);
            assert!(
                pair[1].distance_from_origin > pair[0].distance_from_origin,
                "distance not increasing for {:?}",
                params
            );
            assert!(pair[1].sampled_sigma >= pair[0].sampled_sigma);
        }
    }
}

#[test]
fn schedule_covers_distance() {
    for params in param_grid().into_iter().filter(converges) {
        let s = build_schedule(params, 1.25);
        let last = s.sections.last().unwrap().distance_from_origin;
        let max_step = s.intervals.iter().map(|i| i.width()).fold(0.0, f64::max);
        assert!(last >= params.covered_distance as f64 - max_step, "{:?}", params);
        assert!(last >= params.covered_distance as f64, "{:?}", params);
    }
}

#[test]
fn sections_exceed_intervals_by_one() {
    for params in param_grid().into_iter().filter(converges) {
        let s = build_schedule(params, 0.8);
        assert_eq!(s.sections.len(), s.intervals.len() + 1);
        assert_eq!(s.packing_counts.iter().sum::<usize>(), s.sections.len());
    }
}

#[test]
fn mip_level_formula() {
    for &sigma0 in &[0.5, 1.0, 1.25, 3.0] {
        for params in param_grid().into_iter().filter(converges) {
            let s = build_schedule(params, sigma0);
            for sec in &s.sections {
                assert!((sec.mip_level - (sec.sampled_sigma / sigma0).log2()).abs() < 1e-6);
            }
        }
    }
}

#[test]
fn packing_ceiling_respected() {
    for params in param_grid().into_iter().filter(converges) {
        let s = build_schedule(params, 1.0);
        assert!(s.sections.iter().all(|sec| sec.ray_count <= params.max_packing.ray_count()));
    }
}

#[test]
fn diverging_configuration_reports_overflow() {
    let diverging: Vec<_> = param_grid().into_iter().filter(|p| !converges(p)).collect();
    assert!(!diverging.is_empty());

    for params in diverging {
        let mut sampler = ConeGaussianSampler::new(params);
        assert!(
            matches!(
                sampler.compute_cone_integration_steps(1.0),
                Err(ScheduleError::SigmaOverflow { .. })
            ),
            "{:?}",
            params
        );
        assert!(sampler.schedule().is_none());
    }
}

// ============================================================================
// Amplitude
// ============================================================================

#[test]
fn amplitude_matches_definition() {
    let s = build_schedule(ConeParams::default(), 1.0);
    for sec in &s.sections {
        let p = integrate_over_radius(sec.sampled_sigma, sec.cone_radius);
        let g = sec.sampled_sigma * (2.0 * std::f64::consts::PI).sqrt();
        let expected = p * p * g * g / (std::f64::consts::PI * sec.cone_radius * sec.cone_radius);
        assert_close(sec.amplitude, expected, 1e-9, "amplitude");
        assert!(sec.amplitude > 0.0);
    }
}

// ============================================================================
// Reference scenario
// ============================================================================

#[test]
fn scenario_20_degrees_three_rays() {
    let mut params = ConeParams {
        max_packing: ConePacking::Three,
        ..Default::default()
    };
    params.set_half_angle(20.0);
    params.set_initial_step(3.0);
    params.set_covered_distance(100.0);
    let sigma0 = 1.25;

    let s = build_schedule(params, sigma0);
    let first = &s.sections[0];
    assert_close(first.distance_from_origin, 3.0, 1e-12, "first section");
    assert_eq!(first.ray_count, 1);

    let switch = s
        .sections
        .iter()
        .find(|sec| sec.ray_count == 3)
        .expect("cone never widened to 3 rays");
    let limit = params.sigma_limit_multiplier as f64 * sigma0 / (20f64.to_radians() / CONE_DIV_3).tan();
    assert!(switch.distance_from_origin < limit, "{} >= {}", switch.distance_from_origin, limit);
}

#[test]
fn section_table_layout() {
    let mut sampler = ConeGaussianSampler::new(ConeParams::occlusion());
    sampler.compute_cone_integration_steps(1.0).unwrap();
    let table = sampler.section_table();
    for (row, sec) in table.iter().zip(sampler.sections()) {
        assert_eq!(row[0], sec.distance_from_origin as f32);
        assert_eq!(row[1], sec.mip_level as f32);
        assert_eq!(row[2], sec.integral_contribution as f32);
        assert_eq!(row[3], sec.amplitude as f32);
    }
}

#[test]
fn wider_cone_uses_more_rays_sooner() {
    let narrow = build_schedule(
        ConeParams {
            half_angle_deg: 10.0,
            ..Default::default()
        },
        1.0,
    );
    let wide = build_schedule(
        ConeParams {
            half_angle_deg: 45.0,
            ..Default::default()
        },
        1.0,
    );
    let first_multi = |s: &ConeSchedule| {
        s.sections
            .iter()
            .find(|sec| sec.ray_count > 1)
            .map_or(f64::INFINITY, |sec| sec.distance_from_origin)
    };
    assert!(first_multi(&wide) < first_multi(&narrow));
}
