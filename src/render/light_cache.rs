//! Pre-illumination cache
//!
//! A coarse grid over the pyramid bounds holding the occlusion-cone
//! transmittance towards the eye and one shadow-cone transmittance per
//! light, evaluated at every cell centre. The marcher reads these with a
//! trilinear lookup instead of walking cones per sample. The cache depends
//! on the eye and lights, so it is rebuilt whenever the frame changes.

use std::time::Instant;

use glam::Vec3;

use super::march::{cone_transmittance, ConeInputs};
use crate::types::{Aabb, Light};
use crate::volume::{fill_grid, Grid3};

/// Default cache resolution per axis
pub const DEFAULT_LIGHT_CACHE_RESOLUTION: u32 = 32;

/// Cached cone transmittances for one eye position and light set
#[derive(Debug, Clone, PartialEq)]
pub struct LightCache {
    bounds: Aabb,
    occlusion: Option<Grid3>,
    shadow: Vec<Grid3>,
}

impl LightCache {
    /// Evaluate the cones of `cones` at every cell centre of a `resolution` grid
    ///
    /// The occlusion grid is filled only when `occlusion` is set and a
    /// schedule exists; likewise the shadow grids. Resolution axes of zero
    /// are raised to one.
    pub fn build(
        cones: &ConeInputs<'_>,
        eye: Vec3,
        lights: &[Light],
        resolution: [u32; 3],
        occlusion: bool,
        shadows: bool,
    ) -> Self {
        let start = Instant::now();
        let res = resolution.map(|r| r.max(1));
        let bounds = cones.pyramid.bounds();
        let cell = bounds.size() / Vec3::new(res[0] as f32, res[1] as f32, res[2] as f32);
        let centre = |x: usize, y: usize, z: usize| bounds.min + (Vec3::new(x as f32, y as f32, z as f32) + 0.5) * cell;

        let occlusion = match cones.occlusion {
            Some(schedule) if occlusion => Some(fill_grid(res, |x, y, z| {
                let c = centre(x, y, z);
                cone_transmittance(cones.pyramid, schedule, c, eye - c)
            })),
            _ => None,
        };

        let shadow = match cones.shadow {
            Some(schedule) if shadows => lights
                .iter()
                .map(|light| {
                    fill_grid(res, |x, y, z| {
                        let c = centre(x, y, z);
                        cone_transmittance(cones.pyramid, schedule, c, light.direction_to(c))
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        log::debug!(
            "Light cache {:?}: occlusion {}, {} shadow grids ({:.1} ms)",
            res,
            occlusion.is_some(),
            shadow.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        LightCache {
            bounds,
            occlusion,
            shadow,
        }
    }

    /// Cache resolution
    pub fn resolution(&self) -> Option<[u32; 3]> {
        self.occlusion
            .as_ref()
            .or_else(|| self.shadow.first())
            .map(|g| g.resolution)
    }

    /// Occlusion grid, if cached
    pub fn occlusion_grid(&self) -> Option<&Grid3> {
        self.occlusion.as_ref()
    }

    /// Shadow grid of light `index`, if cached
    pub fn shadow_grid(&self, index: usize) -> Option<&Grid3> {
        self.shadow.get(index)
    }

    /// Cached occlusion transmittance at `p`
    #[inline]
    pub fn occlusion_at(&self, p: Vec3) -> Option<f32> {
        self.occlusion.as_ref().map(|g| self.lookup(g, p))
    }

    /// Cached shadow transmittance of light `index` at `p`
    #[inline]
    pub fn shadow_at(&self, index: usize, p: Vec3) -> Option<f32> {
        self.shadow.get(index).map(|g| self.lookup(g, p))
    }

    #[inline(always)]
    fn lookup(&self, grid: &Grid3, p: Vec3) -> f32 {
        let uvw = (p - self.bounds.min) / self.bounds.size();
        let res = Vec3::new(
            grid.resolution[0] as f32,
            grid.resolution[1] as f32,
            grid.resolution[2] as f32,
        );
        grid.sample(uvw * res)
    }
}
