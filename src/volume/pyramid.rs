//! Gaussian pre-filtered extinction pyramid
//!
//! Level `L` holds the field's extinction blurred by a Gaussian of
//! standard deviation `sigma_L = sigma0 * 2^L` (world units) and stored at
//! `ceil(res_{L-1} / 2)` voxels per axis, down to `1x1x1`.
//!
//! # Build
//!
//! ```text
//! level 0   tau(field)  --blur(sigma0)-->  D = tau * G_0
//! level L   D_{L-1}     --4x4x4 blend--->  D = (G_L / G_{L-1}) * -ln(sum w exp(-D_child))
//! finish    D_L         --------------->   tau = D / G_L
//! ```
//!
//! with `G_L = sigma_L * sqrt(2π)`, the length over which a section of the
//! cone schedule integrates at that level. Levels are built as optical
//! depth `D = -ln(1 - alpha)`: the child blend averages transmittance
//! `exp(-D)`, evaluated relative to the smallest child depth so dense
//! regions never saturate.
//!
//! The domain a pyramid is in is part of its type: [`OpticalDepthPyramid`],
//! [`OpacityPyramid`] and [`ExtinctionPyramid`] convert into each other by
//! value. The opacity view is for inspection; it saturates in `f32` once
//! `D` exceeds about 16.

use std::marker::PhantomData;
use std::time::Instant;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bake::fill_grid;
use super::transfer::{TransferFunction, MAX_OPACITY};
use super::{Grid3, ScalarField};
use crate::cone::gaussian::gaussian_mass;
use crate::error::PyramidError;
use crate::types::Aabb;

/// Level-0 resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PyramidResolution {
    /// Same resolution as the input field
    #[default]
    Native,
    /// Resample level 0 to a custom resolution
    Custom([u32; 3]),
}

/// Opacity domain marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opacity;

/// Optical depth domain marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpticalDepth;

/// Extinction domain marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extinction;

/// One pyramid level
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Level index
    pub index: u32,
    /// Gaussian standard deviation of this level (world units)
    pub sigma: f32,
    /// Voxel data
    pub grid: Grid3,
}

impl Level {
    /// Integration length `sigma * sqrt(2π)` of this level
    #[inline(always)]
    pub fn gaussian_length(&self) -> f64 {
        gaussian_mass(self.sigma as f64)
    }
}

/// Mip pyramid over the field bounds, tagged with its value domain
#[derive(Debug, Clone, PartialEq)]
pub struct Pyramid<D> {
    levels: Vec<Level>,
    sigma0: f32,
    bounds: Aabb,
    _domain: PhantomData<D>,
}

/// Pyramid storing per-level opacity over `G_L`
pub type OpacityPyramid = Pyramid<Opacity>;

/// Pyramid storing per-level optical depth over `G_L`
pub type OpticalDepthPyramid = Pyramid<OpticalDepth>;

/// Pyramid storing extinction coefficients
pub type ExtinctionPyramid = Pyramid<Extinction>;

impl<D> Pyramid<D> {
    /// All levels, finest first
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Level `index`, if present
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    /// Number of levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Resolution of every level
    pub fn level_dimensions(&self) -> Vec<[u32; 3]> {
        self.levels.iter().map(|l| l.grid.resolution).collect()
    }

    /// Sigma of every level
    pub fn sigmas(&self) -> Vec<f32> {
        self.levels.iter().map(|l| l.sigma).collect()
    }

    /// Base sigma
    pub fn sigma0(&self) -> f32 {
        self.sigma0
    }

    /// World-space bounds covered by every level
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Quadrilinear sample at a world-space position and fractional level
    ///
    /// Trilinear within the two bracketing levels, linear across them.
    /// Levels are clamped to the available range; positions outside the
    /// bounds read zero.
    pub fn sample(&self, pos: Vec3, mip_level: f32) -> f32 {
        if !self.bounds.contains(pos) || self.levels.is_empty() {
            return 0.0;
        }

        let max_level = (self.levels.len() - 1) as f32;
        let m = mip_level.clamp(0.0, max_level);
        let l0 = m.floor() as usize;
        let l1 = (l0 + 1).min(self.levels.len() - 1);
        let t = m - l0 as f32;

        let uvw = (pos - self.bounds.min) / self.bounds.size();
        let a = self.sample_level(l0, uvw);
        if t <= 0.0 || l0 == l1 {
            return a;
        }
        let b = self.sample_level(l1, uvw);
        a * (1.0 - t) + b * t
    }

    #[inline(always)]
    fn sample_level(&self, level: usize, uvw: Vec3) -> f32 {
        let grid = &self.levels[level].grid;
        let res = Vec3::new(
            grid.resolution[0] as f32,
            grid.resolution[1] as f32,
            grid.resolution[2] as f32,
        );
        grid.sample(uvw * res)
    }

    /// Apply `f(value, G_L)` to every voxel of every level
    fn map_values<E>(mut self, f: impl Fn(f64, f64) -> f64 + Sync) -> Pyramid<E> {
        for level in &mut self.levels {
            let g = level.gaussian_length();
            level.grid.data.par_iter_mut().for_each(|v| {
                *v = f(*v as f64, g) as f32;
            });
        }
        Pyramid {
            levels: self.levels,
            sigma0: self.sigma0,
            bounds: self.bounds,
            _domain: PhantomData,
        }
    }
}

impl OpticalDepthPyramid {
    /// Convert every level to extinction: `tau = D / G_L`
    pub fn into_extinction(self) -> ExtinctionPyramid {
        self.map_values(|depth, g| depth.max(0.0) / g)
    }

    /// Convert every level to opacity: `alpha = 1 - exp(-D)`
    pub fn into_opacity(self) -> OpacityPyramid {
        self.map_values(|depth, _| 1.0 - (-depth.max(0.0)).exp())
    }
}

impl OpacityPyramid {
    /// Convert every level to optical depth: `D = -ln(1 - alpha)`
    pub fn into_optical_depth(self) -> OpticalDepthPyramid {
        self.map_values(|alpha, _| -(1.0 - alpha.clamp(0.0, MAX_OPACITY as f64)).ln())
    }

    /// Convert every level to extinction: `tau = -ln(1 - alpha) / G_L`
    pub fn into_extinction(self) -> ExtinctionPyramid {
        self.into_optical_depth().into_extinction()
    }
}

impl ExtinctionPyramid {
    /// Convert every level to optical depth: `D = tau * G_L`
    pub fn into_optical_depth(self) -> OpticalDepthPyramid {
        self.map_values(|tau, g| tau.max(0.0) * g)
    }

    /// Convert every level to opacity: `alpha = 1 - exp(-tau * G_L)`
    pub fn into_opacity(self) -> OpacityPyramid {
        self.into_optical_depth().into_opacity()
    }
}

/// Builds extinction pyramids from a field and transfer function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtinctionVolumeBuilder {
    /// Base Gaussian standard deviation (world units)
    pub sigma0: f32,
    /// Level-0 resolution
    pub resolution: PyramidResolution,
}

impl Default for ExtinctionVolumeBuilder {
    fn default() -> Self {
        ExtinctionVolumeBuilder {
            sigma0: 1.0,
            resolution: PyramidResolution::Native,
        }
    }
}

impl ExtinctionVolumeBuilder {
    /// Builder with the given base sigma and level-0 resolution
    pub fn new(sigma0: f32, resolution: PyramidResolution) -> Self {
        ExtinctionVolumeBuilder { sigma0, resolution }
    }

    /// Level-0 resolution for `field`
    pub fn base_resolution(&self, field: &ScalarField) -> [u32; 3] {
        match self.resolution {
            PyramidResolution::Native => field.resolution(),
            PyramidResolution::Custom(res) => res,
        }
    }

    /// Build the full extinction pyramid
    pub fn build(&self, field: &ScalarField, tf: &TransferFunction) -> Result<ExtinctionPyramid, PyramidError> {
        let start = Instant::now();
        let pyramid = self.build_depth_levels(field, tf)?.into_extinction();
        log::info!(
            "Extinction pyramid: {} levels from {:?}, sigma0 {} ({:.1} ms)",
            pyramid.level_count(),
            pyramid.levels[0].grid.resolution,
            self.sigma0,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(pyramid)
    }

    /// Build every level as opacity over `G_L`
    pub fn build_opacity_levels(
        &self,
        field: &ScalarField,
        tf: &TransferFunction,
    ) -> Result<OpacityPyramid, PyramidError> {
        Ok(self.build_depth_levels(field, tf)?.into_opacity())
    }

    /// Build every level as optical depth, without the final transform
    pub fn build_depth_levels(
        &self,
        field: &ScalarField,
        tf: &TransferFunction,
    ) -> Result<OpticalDepthPyramid, PyramidError> {
        if !self.sigma0.is_finite() || self.sigma0 <= 0.0 {
            return Err(PyramidError::InvalidSigma(self.sigma0));
        }
        let res0 = self.base_resolution(field);
        if res0.contains(&0) {
            return Err(PyramidError::EmptyResolution(res0));
        }

        let bounds = field.bounds();
        let mut levels = vec![self.build_level0(field, tf, res0)];

        loop {
            let prev = &levels[levels.len() - 1];
            if prev.grid.resolution == [1, 1, 1] {
                break;
            }
            let next = build_coarser_level(prev, &bounds);
            log::debug!(
                "Pyramid level {}: {:?}, sigma {}, mean optical depth {:.4}",
                next.index,
                next.grid.resolution,
                next.sigma,
                next.grid.mean()
            );
            levels.push(next);
        }

        Ok(Pyramid {
            levels,
            sigma0: self.sigma0,
            bounds,
            _domain: PhantomData,
        })
    }

    fn build_level0(&self, field: &ScalarField, tf: &TransferFunction, res: [u32; 3]) -> Level {
        let native = res == field.resolution();
        let voxel = field.size() / Vec3::new(res[0] as f32, res[1] as f32, res[2] as f32);

        let tau = fill_grid(res, |x, y, z| {
            let density = if native {
                field.grid().get(x, y, z)
            } else {
                let p = (Vec3::new(x as f32, y as f32, z as f32) + 0.5) * voxel;
                field.sample(p)
            };
            tf.extinction_at(density)
        });

        let sigma_vox = Vec3::splat(self.sigma0) / voxel;
        let blurred = gaussian_blur(&tau, sigma_vox);

        let g0 = gaussian_mass(self.sigma0 as f64);
        let mut grid = blurred;
        grid.data.par_iter_mut().for_each(|v| {
            *v = ((*v as f64).max(0.0) * g0) as f32;
        });

        Level {
            index: 0,
            sigma: self.sigma0,
            grid,
        }
    }
}

/// Next coarser level from `prev` (optical depth domain)
///
/// Each parent voxel blends the transmittance of the 4 children around its
/// centre along every axis (offsets ±0.5 and ±1.5 child voxels) with
/// Gaussian weights of std-dev `sqrt(sigma_L² - sigma_{L-1}²)`, then
/// rescales the blended depth from `G_{L-1}` to `G_L`.
fn build_coarser_level(prev: &Level, bounds: &Aabb) -> Level {
    let child_res = prev.grid.resolution;
    let res = child_res.map(|r| r.div_ceil(2).max(1));
    let sigma = prev.sigma * 2.0;

    let child_voxel = bounds.size() / Vec3::new(child_res[0] as f32, child_res[1] as f32, child_res[2] as f32);
    let extra = ((sigma as f64).powi(2) - (prev.sigma as f64).powi(2)).sqrt();
    let weights = [0, 1, 2].map(|axis| {
        if child_res[axis] == 1 {
            [0.0, 0.5, 0.5, 0.0]
        } else {
            blend_weights(extra / child_voxel[axis] as f64)
        }
    });

    let ratio = sigma as f64 / prev.sigma as f64;
    let src = &prev.grid;

    let grid = fill_grid(res, |x, y, z| {
        let (bx, by, bz) = (2 * x as i64 - 1, 2 * y as i64 - 1, 2 * z as i64 - 1);
        let mut taps = [(0.0f64, 0.0f64); 64];
        let mut n = 0;
        for (k, wz) in weights[2].iter().enumerate() {
            for (j, wy) in weights[1].iter().enumerate() {
                for (i, wx) in weights[0].iter().enumerate() {
                    let w = wz * wy * wx;
                    if w > 0.0 {
                        let d = src.get_clamped(bx + i as i64, by + j as i64, bz + k as i64) as f64;
                        taps[n] = (w, d.max(0.0));
                        n += 1;
                    }
                }
            }
        }
        (blend_depth(&taps[..n]) * ratio) as f32
    });

    Level {
        index: prev.index + 1,
        sigma,
        grid,
    }
}

/// `-ln(sum w_i exp(-d_i))` for normalised weights, relative to the smallest depth
fn blend_depth(taps: &[(f64, f64)]) -> f64 {
    let d_min = taps.iter().map(|&(_, d)| d).fold(f64::INFINITY, f64::min);
    if !d_min.is_finite() {
        return 0.0;
    }
    let t_rel: f64 = taps.iter().map(|&(w, d)| w * (d_min - d).exp()).sum();
    (d_min - t_rel.ln()).max(0.0)
}

/// Normalised Gaussian weights at child offsets -1.5, -0.5, 0.5, 1.5
fn blend_weights(sigma_vox: f64) -> [f64; 4] {
    let s = sigma_vox.max(1e-3);
    let raw = [-1.5f64, -0.5, 0.5, 1.5].map(|o| (-(o * o) / (2.0 * s * s)).exp());
    let sum: f64 = raw.iter().sum();
    raw.map(|w| w / sum)
}

/// Normalised 1-D Gaussian kernel with radius `ceil(3 sigma)`
fn gaussian_kernel(sigma_vox: f32) -> Vec<f64> {
    if sigma_vox < 1e-3 {
        return vec![1.0];
    }
    let s = sigma_vox as f64;
    let radius = (3.0 * s).ceil() as i64;
    let raw: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * s * s)).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / sum).collect()
}

/// Separable Gaussian blur with clamp-to-edge borders
fn gaussian_blur(grid: &Grid3, sigma_vox: Vec3) -> Grid3 {
    let mut out = grid.clone();
    for axis in 0..3 {
        let kernel = gaussian_kernel(sigma_vox[axis]);
        if kernel.len() == 1 {
            continue;
        }
        let radius = (kernel.len() / 2) as i64;
        let src = out;
        out = fill_grid(src.resolution, |x, y, z| {
            let mut p = [x as i64, y as i64, z as i64];
            let centre = p[axis];
            let mut acc = 0.0f64;
            for (k, w) in kernel.iter().enumerate() {
                p[axis] = centre + k as i64 - radius;
                acc += w * src.get_clamped(p[0], p[1], p[2]) as f64;
            }
            acc as f32
        });
    }
    out
}
