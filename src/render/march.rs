//! Front-to-back ray marching with cone-traced occlusion and shadows
//!
//! Each pixel runs a small state machine:
//!
//! ```text
//! BoxIntersect --miss--> Terminated (background)
//!      |
//!     hit
//!      v
//!   Marching --alpha >= early_termination / exit / max_steps--> Terminated
//! ```
//!
//! While marching, samples with non-negligible opacity periodically walk
//! the occlusion cone (towards the viewer) and one shadow cone per light
//! through the extinction pyramid. The resulting transmittances are cached
//! in the per-pixel state and reused until the next cone evaluation. With a
//! [`LightCache`] attached, a cone evaluation reads the cached grids instead
//! of walking the cones; the spot aperture test stays per sample.

use glam::{Vec3, Vec4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::light_cache::LightCache;
use crate::cone::packing::{orthonormal_basis, to_world, ConePacking};
use crate::cone::ConeSchedule;
use crate::types::{Camera, ColorBuffer, Light, Ray};
use crate::volume::{ExtinctionPyramid, ScalarField, TransferFunction};

/// Blinn-Phong coefficients for gradient shading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinnPhong {
    /// Ambient term
    pub ka: f32,
    /// Diffuse term
    pub kd: f32,
    /// Specular term
    pub ks: f32,
    /// Specular exponent
    pub shininess: f32,
}

impl Default for BlinnPhong {
    fn default() -> Self {
        BlinnPhong {
            ka: 0.4,
            kd: 0.6,
            ks: 0.2,
            shininess: 20.0,
        }
    }
}

/// Ray marching configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarchConfig {
    /// Fixed step length; `None` uses `0.5 / sqrt(3) * |spacing|`
    pub step_size: Option<f32>,
    /// Accumulated alpha at which a ray stops
    pub early_termination: f32,
    /// Minimum number of steps between cone evaluations
    pub cone_interval: u32,
    /// Minimum sample opacity that triggers a cone evaluation
    pub cone_opacity_threshold: f32,
    /// Attenuate by the occlusion cone
    pub occlusion: bool,
    /// Attenuate lights by their shadow cones
    pub shadows: bool,
    /// Pre-illumination cache resolution; `None` walks the cones per sample
    pub light_cache: Option<[u32; 3]>,
    /// Gradient shading; `None` uses unshaded emission
    pub shading: Option<BlinnPhong>,
    /// Background color
    pub background: Vec3,
    /// Hard cap on samples per ray
    pub max_steps: u32,
}

impl Default for MarchConfig {
    fn default() -> Self {
        MarchConfig {
            step_size: None,
            early_termination: 0.99,
            cone_interval: 1,
            cone_opacity_threshold: 1e-3,
            occlusion: true,
            shadows: false,
            light_cache: None,
            shading: None,
            background: Vec3::ONE,
            max_steps: 4096,
        }
    }
}

impl MarchConfig {
    /// Copy with every field clamped to its valid range
    pub fn sanitized(mut self) -> Self {
        self.step_size = self.step_size.filter(|s| s.is_finite() && *s > 0.0);
        self.early_termination = if self.early_termination.is_nan() {
            0.99
        } else {
            self.early_termination.clamp(0.0, 1.0)
        };
        self.cone_interval = self.cone_interval.max(1);
        self.light_cache = self.light_cache.map(|r| r.map(|n| n.max(1)));
        self.max_steps = self.max_steps.max(1);
        self
    }

    /// Step length for `field`
    pub fn step_for(&self, field: &ScalarField) -> f32 {
        self.step_size
            .unwrap_or_else(|| 0.5 / 3f32.sqrt() * field.spacing().length())
    }
}

/// Per-pixel marching phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarchPhase {
    /// Clip the primary ray against the volume bounds
    BoxIntersect,
    /// Sampling inside the volume
    Marching,
    /// Done
    Terminated,
}

/// Ephemeral per-pixel marching state
#[derive(Debug, Clone)]
pub struct RayMarchState {
    /// Accumulated (premultiplied) color
    pub color: Vec3,
    /// Accumulated alpha
    pub alpha: f32,
    /// Current distance along the primary ray
    pub t: f32,
    /// Exit distance from the volume
    pub t_exit: f32,
    /// Samples taken
    pub step: u32,
    /// Last occlusion transmittance
    pub occlusion: f32,
    /// Last visibility of each light (aperture times shadow transmittance)
    pub visibility: Vec<f32>,
    /// Step of the last cone evaluation
    pub last_cone_step: Option<u32>,
    /// Current phase
    pub phase: MarchPhase,
}

impl Default for RayMarchState {
    fn default() -> Self {
        RayMarchState {
            color: Vec3::ZERO,
            alpha: 0.0,
            t: 0.0,
            t_exit: 0.0,
            step: 0,
            occlusion: 1.0,
            visibility: Vec::new(),
            last_cone_step: None,
            phase: MarchPhase::BoxIntersect,
        }
    }
}

impl RayMarchState {
    /// Front-to-back over operator
    #[inline(always)]
    pub fn composite(&mut self, rgb: Vec3, alpha: f32) {
        let w = (1.0 - self.alpha) * alpha;
        self.color += rgb * w;
        self.alpha += w;
    }

    /// Final RGBA over `background`
    #[inline(always)]
    pub fn resolve(&self, background: Vec3) -> Vec4 {
        (self.color + background * (1.0 - self.alpha)).extend(self.alpha)
    }

    /// Sum of light colors weighted by their visibility; white without lights
    fn incident_light(&self, lights: &[Light]) -> Vec3 {
        if lights.is_empty() {
            return Vec3::ONE;
        }
        lights
            .iter()
            .zip(&self.visibility)
            .map(|(light, v)| light.color * *v)
            .sum()
    }
}

/// Pyramid and schedules used for cone tracing
#[derive(Debug, Clone, Copy)]
pub struct ConeInputs<'a> {
    /// Extinction pyramid
    pub pyramid: &'a ExtinctionPyramid,
    /// Occlusion cone schedule
    pub occlusion: Option<&'a ConeSchedule>,
    /// Shadow cone schedule
    pub shadow: Option<&'a ConeSchedule>,
}

/// Ray marcher over a scalar field
#[derive(Debug, Clone, Copy)]
pub struct ConeTracedRayMarcher<'a> {
    field: &'a ScalarField,
    tf: &'a TransferFunction,
    cones: Option<ConeInputs<'a>>,
    light_cache: Option<&'a LightCache>,
    config: MarchConfig,
    step: f32,
}

impl<'a> ConeTracedRayMarcher<'a> {
    /// Plain emission-absorption marcher, no cones
    pub fn direct(field: &'a ScalarField, tf: &'a TransferFunction, config: MarchConfig) -> Self {
        let config = config.sanitized();
        ConeTracedRayMarcher {
            field,
            tf,
            cones: None,
            light_cache: None,
            step: config.step_for(field),
            config,
        }
    }

    /// Marcher attenuating samples by cone-traced occlusion and shadows
    pub fn with_cones(
        field: &'a ScalarField,
        tf: &'a TransferFunction,
        cones: ConeInputs<'a>,
        config: MarchConfig,
    ) -> Self {
        ConeTracedRayMarcher {
            cones: Some(cones),
            ..Self::direct(field, tf, config)
        }
    }

    /// Read cone transmittances from `cache` instead of walking the cones
    pub fn with_light_cache(self, cache: &'a LightCache) -> Self {
        ConeTracedRayMarcher {
            light_cache: Some(cache),
            ..self
        }
    }

    /// Pre-illumination cache for `eye` and `lights`; `None` without cones
    pub fn build_light_cache(&self, eye: Vec3, lights: &[Light], resolution: [u32; 3]) -> Option<LightCache> {
        self.cones.as_ref().map(|cones| {
            LightCache::build(
                cones,
                eye,
                lights,
                resolution,
                self.config.occlusion,
                self.config.shadows,
            )
        })
    }

    /// Step length in use
    pub fn step_size(&self) -> f32 {
        self.step
    }

    /// Render a `width` x `height` image, rows in parallel
    pub fn render(&self, camera: &Camera, lights: &[Light], width: usize, height: usize) -> ColorBuffer {
        let mut buffer = ColorBuffer::new(width, height, self.config.background.extend(0.0));
        if width == 0 || height == 0 {
            return buffer;
        }

        let (forward, right, up, half_width, half_height) = camera.basis(width, height);

        buffer
            .pixels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let v = 1.0 - ((y as f32 + 0.5) / height as f32) * 2.0;
                let row_vec = forward + up * (v * half_height);
                let right_scaled = right * half_width;
                let inv_width = 1.0 / width as f32;

                for (x, pixel) in row.iter_mut().enumerate() {
                    let u = ((x as f32 + 0.5) * inv_width) * 2.0 - 1.0;
                    let ray = Ray::new(camera.eye, row_vec + right_scaled * u);
                    *pixel = self.trace(&ray, lights).resolve(self.config.background);
                }
            });

        buffer
    }

    /// Run the marching state machine for one primary ray
    pub fn trace(&self, ray: &Ray, lights: &[Light]) -> RayMarchState {
        let mut state = RayMarchState {
            visibility: vec![1.0; lights.len()],
            ..Default::default()
        };

        loop {
            match state.phase {
                MarchPhase::BoxIntersect => match self.field.bounds().intersect_ray(ray) {
                    Some((t_near, t_far)) => {
                        state.t = t_near + self.step * 0.5;
                        state.t_exit = t_far;
                        state.phase = MarchPhase::Marching;
                    }
                    None => state.phase = MarchPhase::Terminated,
                },
                MarchPhase::Marching => {
                    if state.t > state.t_exit || state.step >= self.config.max_steps {
                        state.phase = MarchPhase::Terminated;
                        continue;
                    }

                    self.shade_sample(ray, lights, &mut state);
                    state.step += 1;
                    state.t += self.step;

                    if state.alpha >= self.config.early_termination {
                        state.phase = MarchPhase::Terminated;
                    }
                }
                MarchPhase::Terminated => return state,
            }
        }
    }

    fn shade_sample(&self, ray: &Ray, lights: &[Light], state: &mut RayMarchState) {
        let p = ray.at(state.t);
        let density = self.field.sample(p);
        let tau = self.tf.extinction_at(density);
        let alpha = 1.0 - (-tau * self.step).exp();
        if alpha <= 0.0 {
            return;
        }

        match &self.cones {
            Some(cones) => {
                let due = state
                    .last_cone_step
                    .map_or(true, |last| state.step - last >= self.config.cone_interval);
                if due && alpha > self.config.cone_opacity_threshold {
                    self.evaluate_cones(cones, ray, lights, p, state);
                    state.last_cone_step = Some(state.step);
                }
            }
            None => {
                for (v, light) in state.visibility.iter_mut().zip(lights) {
                    *v = if light.illuminates(p) { 1.0 } else { 0.0 };
                }
            }
        }

        let albedo = self.tf.color_at(density);
        let rgb = match self.config.shading {
            Some(bp) => self.blinn_phong(&bp, ray, lights, p, albedo, state),
            None => albedo * state.occlusion * state.incident_light(lights),
        };

        state.composite(rgb, alpha);
    }

    fn evaluate_cones(&self, cones: &ConeInputs<'_>, ray: &Ray, lights: &[Light], p: Vec3, state: &mut RayMarchState) {
        let cache = self.light_cache;

        if self.config.occlusion {
            if let Some(schedule) = cones.occlusion {
                state.occlusion = cache
                    .and_then(|c| c.occlusion_at(p))
                    .unwrap_or_else(|| cone_transmittance(cones.pyramid, schedule, p, -ray.direction));
            }
        }

        for (i, (v, light)) in state.visibility.iter_mut().zip(lights).enumerate() {
            *v = if !light.illuminates(p) {
                0.0
            } else {
                match cones.shadow {
                    Some(schedule) if self.config.shadows => cache
                        .and_then(|c| c.shadow_at(i, p))
                        .unwrap_or_else(|| cone_transmittance(cones.pyramid, schedule, p, light.direction_to(p))),
                    _ => 1.0,
                }
            };
        }
    }

    fn blinn_phong(
        &self,
        bp: &BlinnPhong,
        ray: &Ray,
        lights: &[Light],
        p: Vec3,
        albedo: Vec3,
        state: &RayMarchState,
    ) -> Vec3 {
        let ambient = albedo * bp.ka * state.occlusion;
        if lights.is_empty() {
            return ambient + albedo * bp.kd * state.occlusion;
        }

        let gradient = self.field.gradient(p);
        if gradient.length_squared() < 1e-12 {
            return ambient + albedo * bp.kd * state.incident_light(lights);
        }

        let n = -gradient.normalize();
        let v = -ray.direction;
        let mut rgb = ambient;
        for (light, visibility) in lights.iter().zip(&state.visibility) {
            if *visibility <= 0.0 {
                continue;
            }
            let l = light.direction_to(p);
            let diffuse = n.dot(l).abs();
            let h = (l + v).normalize_or_zero();
            let specular = n.dot(h).abs().powf(bp.shininess);
            rgb += (albedo * bp.kd * diffuse + Vec3::splat(bp.ks * specular)) * light.color * *visibility;
        }
        rgb
    }
}

/// Transmittance along a cone with apex `origin` and unit `axis`
///
/// Sums `amplitude * mean_extinction * integral_contribution` over the
/// schedule's sections until every sub-ray point has left the volume, and
/// returns `exp(-attenuation * sum)`.
pub fn cone_transmittance(pyramid: &ExtinctionPyramid, schedule: &ConeSchedule, origin: Vec3, axis: Vec3) -> f32 {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return 1.0;
    }
    let (tangent, bitangent) = orthonormal_basis(axis);
    let bounds = pyramid.bounds();
    let ring_weight = schedule.directions.ray7_adjacent_weight() as f32;

    let mut depth = 0.0f64;
    for section in &schedule.sections {
        let packing = section.packing();
        let dist = section.distance_from_origin as f32;
        let mip = section.mip_level as f32;

        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        let mut inside = false;

        for (i, local) in schedule.directions.local_rays(packing).iter().enumerate() {
            let w = if packing == ConePacking::Seven && i > 0 {
                ring_weight
            } else {
                1.0
            };
            let p = origin + to_world(*local, axis, tangent, bitangent) * dist;
            if bounds.contains(p) {
                inside = true;
                sum += w * pyramid.sample(p, mip);
            }
            weight_sum += w;
        }

        // The volume is convex: once every sub-ray is out, later sections are too
        if !inside {
            break;
        }

        depth += section.amplitude * (sum / weight_sum) as f64 * section.integral_contribution;
    }

    (-(schedule.params.attenuation as f64) * depth).exp() as f32
}
