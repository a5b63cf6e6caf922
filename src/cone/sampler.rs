//! Cone integration schedule with Gaussian sections
//!
//! Builds, once per parameter change, the table the ray marcher walks to
//! integrate extinction over a cone. Close to the apex the cone is narrow
//! and a single ray sampling a fine mip level suffices; further out the
//! footprint is covered by 3 or 7 sub-rays, and once even those overflow
//! the `r_sigma * sigma` limit the sampled sigma doubles (one mip level up).
//!
//! ```text
//!   sections:  |1|  |1|   |3|    |3|      |7|          |7|
//!   apex *-----+----+-----+------+--------+------------+----> axis
//!   sigma:     s0   s0    s0     2s0      2s0          4s0
//! ```
//!
//! Each accepted section is separated from the next by an interval of
//! `d_sigma * sigma_before + d_sigma * sigma_after`.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::gaussian::{gaussian_mass, integrate_over_radius};
use super::packing::{ConePacking, PackingDirections};
use crate::error::ScheduleError;

/// Upper bound on sigma doublings while placing a single section
const MAX_SIGMA_DOUBLINGS: u32 = 64;

/// Cone parameters
///
/// Fields are public for deserialization; the setters clamp to the valid
/// ranges and [`ConeParams::sanitized`] does the same for a whole struct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConeParams {
    /// Cone half-angle (degrees), 0.5..=89.5
    pub half_angle_deg: f32,
    /// Distance of the first section from the apex, >= 0.01
    pub initial_step: f32,
    /// Widest allowed packing
    pub max_packing: ConePacking,
    /// Distance along the axis to cover, >= 10
    pub covered_distance: f32,
    /// Half-step multiplier `d_sigma`, 1.0..=3.0
    pub separation_multiplier: f32,
    /// Radius limit multiplier `r_sigma`, 0.5..=3.0
    pub sigma_limit_multiplier: f32,
    /// Attenuation weight applied at render time, 0.0..=1.0
    pub attenuation: f32,
}

impl Default for ConeParams {
    fn default() -> Self {
        ConeParams {
            half_angle_deg: 30.0,
            initial_step: 3.0,
            max_packing: ConePacking::Seven,
            covered_distance: 100.0,
            separation_multiplier: 1.25,
            sigma_limit_multiplier: 2.0,
            attenuation: 1.0,
        }
    }
}

impl ConeParams {
    /// Occlusion cone defaults (20°, up to 3 rays, weight 0.35)
    pub fn occlusion() -> Self {
        ConeParams {
            half_angle_deg: 20.0,
            max_packing: ConePacking::Three,
            attenuation: 0.35,
            ..Default::default()
        }
    }

    /// Shadow cone defaults (0.5°, single ray, weight 1.0)
    pub fn shadow() -> Self {
        ConeParams {
            half_angle_deg: 0.5,
            max_packing: ConePacking::One,
            attenuation: 1.0,
            ..Default::default()
        }
    }

    /// Copy with every field clamped to its valid range
    pub fn sanitized(mut self) -> Self {
        self.set_half_angle(self.half_angle_deg);
        self.set_initial_step(self.initial_step);
        self.set_covered_distance(self.covered_distance);
        self.set_separation_multiplier(self.separation_multiplier);
        self.set_sigma_limit_multiplier(self.sigma_limit_multiplier);
        self.set_attenuation(self.attenuation);
        self
    }

    /// Set the half-angle, clamped to 0.5..=89.5 degrees
    pub fn set_half_angle(&mut self, degrees: f32) {
        self.half_angle_deg = clamp_or(degrees, 0.5, 89.5, 30.0);
    }

    /// Widen by 1° above 10°, by 0.5° below
    pub fn increase_half_angle(&mut self) {
        let step = if self.half_angle_deg < 10.0 { 0.5 } else { 1.0 };
        self.set_half_angle(self.half_angle_deg + step);
    }

    /// Narrow by 1° above 10°, by 0.5° at or below
    pub fn decrease_half_angle(&mut self) {
        let step = if self.half_angle_deg > 10.0 { 1.0 } else { 0.5 };
        self.set_half_angle(self.half_angle_deg - step);
    }

    /// Allow one more packing step (saturating at 7 rays)
    pub fn next_packing(&mut self) {
        self.max_packing = self.max_packing.next();
    }

    /// Allow one packing step less (saturating at 1 ray)
    pub fn previous_packing(&mut self) {
        self.max_packing = self.max_packing.previous();
    }

    /// Set the first section distance (at least 0.01)
    pub fn set_initial_step(&mut self, step: f32) {
        self.initial_step = clamp_or(step, 0.01, f32::MAX, 3.0);
    }

    /// Set the covered distance (at least 10)
    pub fn set_covered_distance(&mut self, distance: f32) {
        self.covered_distance = clamp_or(distance, 10.0, f32::MAX, 100.0);
    }

    /// Set `d_sigma`, clamped to 1.0..=3.0
    pub fn set_separation_multiplier(&mut self, m: f32) {
        self.separation_multiplier = clamp_or(m, 1.0, 3.0, 1.25);
    }

    /// Set `r_sigma`, clamped to 0.5..=3.0
    pub fn set_sigma_limit_multiplier(&mut self, m: f32) {
        self.sigma_limit_multiplier = clamp_or(m, 0.5, 3.0, 2.0);
    }

    /// Set the attenuation weight, clamped to 0.0..=1.0
    pub fn set_attenuation(&mut self, w: f32) {
        self.attenuation = clamp_or(w, 0.0, 1.0, 1.0);
    }
}

#[inline]
fn clamp_or(v: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if v.is_nan() {
        fallback
    } else {
        v.clamp(lo, hi)
    }
}

/// One cone section: where to sample, with how many rays, at which level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Distance of the section from the apex
    pub distance_from_origin: f64,
    /// Number of sub-rays (1, 3 or 7)
    pub ray_count: u32,
    /// Radius of each sub-ray's cone at this distance
    pub cone_radius: f64,
    /// Gaussian standard deviation sampled at this section
    pub sampled_sigma: f64,
    /// `log2(sampled_sigma / sigma0)` (fractional)
    pub mip_level: f64,
    /// `P² G² / (π r²)`: expected extinction weight per unit length
    pub amplitude: f64,
    /// Axis length integrated by this section
    ///
    /// Half of each adjacent interval; section 0 leads with `G / 2`, the
    /// last section has no trailing half.
    pub integral_contribution: f64,
}

impl Section {
    fn new(distance_from_origin: f64, ray_count: u32, cone_radius: f64, sampled_sigma: f64) -> Self {
        Section {
            distance_from_origin,
            ray_count,
            cone_radius,
            sampled_sigma,
            mip_level: 0.0,
            amplitude: 0.0,
            integral_contribution: 0.0,
        }
    }

    /// Packing used by this section
    pub fn packing(&self) -> ConePacking {
        ConePacking::from_ray_count(self.ray_count).unwrap_or(ConePacking::One)
    }
}

/// Gap between two consecutive sections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Position of the section that opens the interval
    pub position: f64,
    /// `d_sigma * sigma` of the opening section
    pub leading_half_step: f64,
    /// `d_sigma * sigma` of the closing section
    pub trailing_half_step: f64,
}

impl Interval {
    /// Full interval width
    #[inline(always)]
    pub fn width(&self) -> f64 {
        self.leading_half_step + self.trailing_half_step
    }
}

/// A complete cone schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ConeSchedule {
    /// Parameters the schedule was built with
    pub params: ConeParams,
    /// Base standard deviation of the pyramid
    pub sigma0: f64,
    /// Sections, ordered by distance
    pub sections: Vec<Section>,
    /// Intervals between consecutive sections
    pub intervals: Vec<Interval>,
    /// Sub-ray directions
    pub directions: PackingDirections,
    /// Number of sections using 1, 3 and 7 rays
    pub packing_counts: [usize; 3],
}

impl ConeSchedule {
    /// Number of sections
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the schedule is empty
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Flat lookup table, one `[distance, mip_level, integral_contribution, amplitude]` row per section
    pub fn section_table(&self) -> Vec<[f32; 4]> {
        self.sections
            .iter()
            .map(|s| {
                [
                    s.distance_from_origin as f32,
                    s.mip_level as f32,
                    s.integral_contribution as f32,
                    s.amplitude as f32,
                ]
            })
            .collect()
    }

    /// Highest mip level referenced
    pub fn max_mip_level(&self) -> f64 {
        self.sections.iter().map(|s| s.mip_level).fold(0.0, f64::max)
    }
}

/// Builds and owns the cone schedule for one cone (occlusion or shadow)
#[derive(Debug, Clone, Default)]
pub struct ConeGaussianSampler {
    params: ConeParams,
    schedule: Option<ConeSchedule>,
}

impl ConeGaussianSampler {
    /// Sampler with the given parameters (clamped)
    pub fn new(params: ConeParams) -> Self {
        ConeGaussianSampler {
            params: params.sanitized(),
            schedule: None,
        }
    }

    /// Current parameters
    pub fn params(&self) -> &ConeParams {
        &self.params
    }

    /// Mutable parameters; call `compute_cone_integration_steps` afterwards
    pub fn params_mut(&mut self) -> &mut ConeParams {
        &mut self.params
    }

    /// Last successfully built schedule
    pub fn schedule(&self) -> Option<&ConeSchedule> {
        self.schedule.as_ref()
    }

    /// Sections of the last schedule (empty if none)
    pub fn sections(&self) -> &[Section] {
        self.schedule.as_ref().map_or(&[], |s| s.sections.as_slice())
    }

    /// Number of sections of the last schedule
    pub fn number_of_sections(&self) -> usize {
        self.sections().len()
    }

    /// Flat section table of the last schedule
    pub fn section_table(&self) -> Vec<[f32; 4]> {
        self.schedule.as_ref().map(ConeSchedule::section_table).unwrap_or_default()
    }

    /// i-th direction of the 3-ray packing
    pub fn ray3_direction(&self, i: usize) -> Option<Vec3> {
        self.schedule.as_ref().and_then(|s| s.directions.ray3.get(i).copied())
    }

    /// i-th direction of the 7-ray packing
    pub fn ray7_direction(&self, i: usize) -> Option<Vec3> {
        self.schedule.as_ref().and_then(|s| s.directions.ray7.get(i).copied())
    }

    /// Rebuild the schedule for pyramid base sigma `sigma0`
    ///
    /// On error the previous schedule is kept.
    pub fn compute_cone_integration_steps(&mut self, sigma0: f64) -> Result<&ConeSchedule, ScheduleError> {
        let schedule = build_schedule(&self.params, sigma0)?;
        log::info!(
            "Cone schedule ({}°, max {} rays): {} sections [1: {}, 3: {}, 7: {}], max mip {:.2}",
            self.params.half_angle_deg,
            self.params.max_packing,
            schedule.len(),
            schedule.packing_counts[0],
            schedule.packing_counts[1],
            schedule.packing_counts[2],
            schedule.max_mip_level(),
        );
        Ok(self.schedule.insert(schedule))
    }
}

/// Section placement state: the widest packing used so far
struct Placer<'a> {
    params: &'a ConeParams,
    half_angle: f64,
    r_sigma: f64,
    current: ConePacking,
    sections: Vec<Section>,
}

impl Placer<'_> {
    /// Try to place a section at `pos` with `sigma`
    ///
    /// Tries packings from the current one up to the ceiling. The current
    /// packing advances with every attempt, so a cone never narrows again.
    fn try_place(&mut self, pos: f64, sigma: f64) -> bool {
        let limit = self.r_sigma * sigma;

        for packing in ConePacking::ALL {
            if packing < self.current || packing > self.params.max_packing {
                continue;
            }
            self.current = packing;

            let per_ray_angle = self.half_angle / packing.angle_divisor();
            let cone_radius = pos * per_ray_angle.tan();

            if cone_radius <= limit {
                self.sections.push(Section::new(pos, packing.ray_count(), cone_radius, sigma));
                return true;
            }
        }

        false
    }

    /// Place a section, doubling sigma until it fits
    ///
    /// `pos_for` maps the candidate sigma to the section position.
    fn place(&mut self, sigma: &mut f64, pos_for: impl Fn(f64) -> f64) -> Result<(), ScheduleError> {
        for _ in 0..MAX_SIGMA_DOUBLINGS {
            if self.try_place(pos_for(*sigma), *sigma) {
                return Ok(());
            }
            *sigma *= 2.0;
        }
        Err(ScheduleError::SigmaOverflow {
            distance: pos_for(*sigma),
            doublings: MAX_SIGMA_DOUBLINGS,
        })
    }
}

fn build_schedule(params: &ConeParams, sigma0: f64) -> Result<ConeSchedule, ScheduleError> {
    if !sigma0.is_finite() || sigma0 <= 0.0 {
        return Err(ScheduleError::InvalidSigma(sigma0));
    }

    let d_sigma = params.separation_multiplier as f64;
    let covered = params.covered_distance as f64;

    let mut placer = Placer {
        params,
        half_angle: (params.half_angle_deg as f64).to_radians(),
        r_sigma: params.sigma_limit_multiplier as f64,
        current: ConePacking::One,
        sections: Vec::new(),
    };
    let mut intervals = Vec::new();

    let mut curr_pos = params.initial_step as f64;
    let mut sigma = sigma0;

    placer.place(&mut sigma, |_| curr_pos)?;

    while curr_pos < covered {
        let leading = d_sigma * sigma;
        placer.place(&mut sigma, |s| curr_pos + leading + d_sigma * s)?;
        let interval = Interval {
            position: curr_pos,
            leading_half_step: leading,
            trailing_half_step: d_sigma * sigma,
        };
        curr_pos += interval.width();
        intervals.push(interval);
    }

    let mut schedule = ConeSchedule {
        params: *params,
        sigma0,
        sections: placer.sections,
        intervals,
        directions: PackingDirections::new(params.half_angle_deg as f64),
        packing_counts: [0; 3],
    };
    compute_additional_info(&mut schedule)?;

    log::debug!(
        "Cone schedule: last section at {:.3} (covered {:.3})",
        schedule.sections.last().map_or(0.0, |s| s.distance_from_origin),
        covered
    );

    Ok(schedule)
}

/// Validate the section sequence and fill amplitude, mip level and integral length
fn compute_additional_info(schedule: &mut ConeSchedule) -> Result<(), ScheduleError> {
    for (i, pair) in schedule.sections.windows(2).enumerate() {
        if pair[1].ray_count < pair[0].ray_count {
            return Err(ScheduleError::RayCountDecreased {
                index: i + 1,
                previous: pair[0].ray_count,
                current: pair[1].ray_count,
            });
        }
    }

    if schedule.sections.len() != schedule.intervals.len() + 1 {
        return Err(ScheduleError::SectionIntervalMismatch {
            sections: schedule.sections.len(),
            intervals: schedule.intervals.len(),
        });
    }

    let sigma0 = schedule.sigma0;
    let last = schedule.sections.len() - 1;

    for (i, section) in schedule.sections.iter_mut().enumerate() {
        let sigma = section.sampled_sigma;
        let radius = section.cone_radius;

        let leading = if i == 0 {
            gaussian_mass(sigma) * 0.5
        } else {
            schedule.intervals[i - 1].width() * 0.5
        };
        let trailing = if i < last {
            schedule.intervals[i].width() * 0.5
        } else {
            0.0
        };
        section.integral_contribution = leading + trailing;

        // Fraction of the Gaussian inside the footprint, squared for the
        // cross-section, over the footprint area
        let p = integrate_over_radius(sigma, radius);
        let g = gaussian_mass(sigma);
        let area = std::f64::consts::PI * radius * radius;
        section.amplitude = if area > 0.0 { (p * p) * (g * g) / area } else { 0.0 };

        section.mip_level = (sigma / sigma0).log2();

        match section.ray_count {
            1 => schedule.packing_counts[0] += 1,
            3 => schedule.packing_counts[1] += 1,
            _ => schedule.packing_counts[2] += 1,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(params: ConeParams, sigma0: f64) -> ConeSchedule {
        let mut sampler = ConeGaussianSampler::new(params);
        sampler.compute_cone_integration_steps(sigma0).unwrap().clone()
    }

    #[test]
    fn test_defaults() {
        let p = ConeParams::default();
        assert_eq!(p.half_angle_deg, 30.0);
        assert_eq!(p.max_packing, ConePacking::Seven);
        assert_eq!(p.separation_multiplier, 1.25);
        assert_eq!(p.sigma_limit_multiplier, 2.0);
    }

    #[test]
    fn test_setters_clamp() {
        let mut p = ConeParams::default();
        p.set_half_angle(120.0);
        assert_eq!(p.half_angle_deg, 89.5);
        p.set_half_angle(0.0);
        assert_eq!(p.half_angle_deg, 0.5);
        p.set_covered_distance(2.0);
        assert_eq!(p.covered_distance, 10.0);
        p.set_separation_multiplier(5.0);
        assert_eq!(p.separation_multiplier, 3.0);
        p.set_sigma_limit_multiplier(0.1);
        assert_eq!(p.sigma_limit_multiplier, 0.5);
        p.set_attenuation(-1.0);
        assert_eq!(p.attenuation, 0.0);
        p.set_initial_step(-3.0);
        assert_eq!(p.initial_step, 0.01);
    }

    #[test]
    fn test_half_angle_steps() {
        let mut p = ConeParams::default();
        p.set_half_angle(10.0);
        p.increase_half_angle();
        assert_eq!(p.half_angle_deg, 11.0);
        p.decrease_half_angle();
        assert_eq!(p.half_angle_deg, 10.0);
        p.decrease_half_angle();
        assert_eq!(p.half_angle_deg, 9.5);
        p.increase_half_angle();
        assert_eq!(p.half_angle_deg, 10.0);
    }

    #[test]
    fn test_packing_steps() {
        let mut p = ConeParams::shadow();
        p.next_packing();
        assert_eq!(p.max_packing, ConePacking::Three);
        p.next_packing();
        p.next_packing();
        assert_eq!(p.max_packing, ConePacking::Seven);
        p.previous_packing();
        assert_eq!(p.max_packing, ConePacking::Three);
    }

    #[test]
    fn test_sanitized_nan() {
        let p = ConeParams {
            half_angle_deg: f32::NAN,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p.half_angle_deg, 30.0);
    }

    #[test]
    fn test_invalid_sigma() {
        let mut sampler = ConeGaussianSampler::new(ConeParams::default());
        assert!(matches!(
            sampler.compute_cone_integration_steps(0.0),
            Err(ScheduleError::InvalidSigma(_))
        ));
        assert!(sampler.compute_cone_integration_steps(f64::NAN).is_err());
        assert!(sampler.schedule().is_none());
    }

    #[test]
    fn test_failed_rebuild_keeps_previous() {
        let mut sampler = ConeGaussianSampler::new(ConeParams::default());
        sampler.compute_cone_integration_steps(1.0).unwrap();
        let before = sampler.number_of_sections();
        assert!(sampler.compute_cone_integration_steps(-1.0).is_err());
        assert_eq!(sampler.number_of_sections(), before);
    }

    #[test]
    fn test_section_interval_shape() {
        let s = build(ConeParams::default(), 1.0);
        assert_eq!(s.sections.len(), s.intervals.len() + 1);
        for (i, iv) in s.intervals.iter().enumerate() {
            assert!((iv.position - s.sections[i].distance_from_origin).abs() < 1e-9);
            let next = s.sections[i + 1].distance_from_origin;
            assert!((iv.position + iv.width() - next).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_packing_only_ones() {
        let s = build(
            ConeParams {
                max_packing: ConePacking::One,
                ..Default::default()
            },
            1.0,
        );
        assert!(s.sections.iter().all(|sec| sec.ray_count == 1));
        assert_eq!(s.packing_counts[0], s.len());
    }

    #[test]
    fn test_sigma_doubles_by_mip() {
        let s = build(ConeParams::default(), 1.25);
        for sec in &s.sections {
            let level = sec.mip_level.round();
            assert!((sec.mip_level - level).abs() < 1e-9);
            assert!((sec.sampled_sigma - 1.25 * 2f64.powf(level)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_radius_within_limit() {
        let params = ConeParams::default();
        let s = build(params, 1.0);
        for sec in &s.sections {
            assert!(sec.cone_radius <= params.sigma_limit_multiplier as f64 * sec.sampled_sigma + 1e-9);
        }
    }

    #[test]
    fn test_integral_contribution_sums_to_span() {
        let s = build(ConeParams::default(), 1.0);
        let total: f64 = s.sections.iter().map(|sec| sec.integral_contribution).sum();
        let first = &s.sections[0];
        let last = s.sections.last().unwrap();
        let span = last.distance_from_origin - first.distance_from_origin;
        let expected = span + gaussian_mass(first.sampled_sigma) * 0.5;
        assert!((total - expected).abs() < 1e-6);
    }

    #[test]
    fn test_integral_contribution_halves() {
        let s = build(ConeParams::default(), 1.0);
        let n = s.sections.len();
        assert!(n >= 3);
        let first = &s.sections[0];
        let g0 = gaussian_mass(first.sampled_sigma);
        assert!((first.integral_contribution - (g0 + s.intervals[0].width()) * 0.5).abs() < 1e-9);
        let mid = &s.sections[1];
        let expected = (s.intervals[0].width() + s.intervals[1].width()) * 0.5;
        assert!((mid.integral_contribution - expected).abs() < 1e-9);
        let last = &s.sections[n - 1];
        assert!((last.integral_contribution - s.intervals[n - 2].width() * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_table_matches_sections() {
        let mut sampler = ConeGaussianSampler::new(ConeParams::default());
        sampler.compute_cone_integration_steps(1.0).unwrap();
        let table = sampler.section_table();
        assert_eq!(table.len(), sampler.number_of_sections());
        let sec = sampler.sections()[2];
        assert!((table[2][0] - sec.distance_from_origin as f32).abs() < 1e-4);
        assert!((table[2][3] - sec.amplitude as f32).abs() < 1e-4);
    }

    #[test]
    fn test_ray_direction_lookup() {
        let mut sampler = ConeGaussianSampler::new(ConeParams::default());
        assert!(sampler.ray3_direction(0).is_none());
        sampler.compute_cone_integration_steps(1.0).unwrap();
        assert!(sampler.ray3_direction(2).is_some());
        assert!(sampler.ray3_direction(3).is_none());
        assert_eq!(sampler.ray7_direction(0), Some(Vec3::Z));
        assert!(sampler.ray7_direction(7).is_none());
    }
}
