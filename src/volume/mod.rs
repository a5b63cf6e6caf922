//! Scalar volumes: dense grids, the input density field and its derived pyramids
//!
//! # Layout
//!
//! All grids are flat `f32` arrays in Z-major order:
//! `index = x + y * res.x + z * res.x * res.y`.
//!
//! Voxels are cell-centred: voxel `i` covers `[i, i + 1)` in voxel space and
//! its sample sits at `i + 0.5`. A field of resolution `R` and spacing `s`
//! spans the world box `[0, R * s]`.

pub mod bake;
pub mod pyramid;
pub mod transfer;

use glam::Vec3;

use crate::error::VolumeError;
use crate::types::Aabb;

/// Dense 3D grid of `f32` samples
#[derive(Debug, Clone, PartialEq)]
pub struct Grid3 {
    /// Resolution along each axis [x, y, z]
    pub resolution: [u32; 3],
    /// Flat voxel data in Z-major order
    pub data: Vec<f32>,
}

impl Grid3 {
    /// Zero-filled grid
    pub fn new(resolution: [u32; 3]) -> Self {
        Self::filled(resolution, 0.0)
    }

    /// Grid filled with `value`
    pub fn filled(resolution: [u32; 3], value: f32) -> Self {
        Grid3 {
            resolution,
            data: vec![value; voxel_count(resolution)],
        }
    }

    /// Wrap an existing buffer, checking its length
    pub fn from_vec(resolution: [u32; 3], data: Vec<f32>) -> Result<Self, VolumeError> {
        if resolution.contains(&0) {
            return Err(VolumeError::EmptyResolution(resolution));
        }
        let expected = voxel_count(resolution);
        if data.len() != expected {
            return Err(VolumeError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Grid3 { resolution, data })
    }

    /// Total number of voxels
    #[inline(always)]
    pub fn voxel_count(&self) -> usize {
        self.data.len()
    }

    /// Flat index from 3D coordinates (bounds-unchecked)
    #[inline(always)]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let rx = self.resolution[0] as usize;
        let ry = self.resolution[1] as usize;
        x + y * rx + z * rx * ry
    }

    /// Voxel at 3D coordinates
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[self.index(x, y, z)]
    }

    /// Set voxel at 3D coordinates
    #[inline(always)]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let idx = self.index(x, y, z);
        self.data[idx] = value;
    }

    /// Voxel at signed coordinates, clamped to the nearest edge voxel
    #[inline(always)]
    pub fn get_clamped(&self, x: i64, y: i64, z: i64) -> f32 {
        let cx = x.clamp(0, self.resolution[0] as i64 - 1) as usize;
        let cy = y.clamp(0, self.resolution[1] as i64 - 1) as usize;
        let cz = z.clamp(0, self.resolution[2] as i64 - 1) as usize;
        self.get(cx, cy, cz)
    }

    /// Trilinear sample at a voxel-space position
    ///
    /// Positions outside the grid are clamped to the boundary voxels.
    pub fn sample(&self, p: Vec3) -> f32 {
        let res = [
            self.resolution[0] as f32,
            self.resolution[1] as f32,
            self.resolution[2] as f32,
        ];

        // Cell-centred: shift so voxel centres land on integers
        let fx = (p.x - 0.5).clamp(0.0, res[0] - 1.0);
        let fy = (p.y - 0.5).clamp(0.0, res[1] - 1.0);
        let fz = (p.z - 0.5).clamp(0.0, res[2] - 1.0);

        let x0 = fx as usize;
        let y0 = fy as usize;
        let z0 = fz as usize;
        let x1 = (x0 + 1).min(self.resolution[0] as usize - 1);
        let y1 = (y0 + 1).min(self.resolution[1] as usize - 1);
        let z1 = (z0 + 1).min(self.resolution[2] as usize - 1);

        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;
        let tz = fz - z0 as f32;

        let c00 = self.get(x0, y0, z0) * (1.0 - tx) + self.get(x1, y0, z0) * tx;
        let c10 = self.get(x0, y1, z0) * (1.0 - tx) + self.get(x1, y1, z0) * tx;
        let c01 = self.get(x0, y0, z1) * (1.0 - tx) + self.get(x1, y0, z1) * tx;
        let c11 = self.get(x0, y1, z1) * (1.0 - tx) + self.get(x1, y1, z1) * tx;

        let c0 = c00 * (1.0 - ty) + c10 * ty;
        let c1 = c01 * (1.0 - ty) + c11 * ty;

        c0 * (1.0 - tz) + c1 * tz
    }

    /// Minimum and maximum voxel values
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Mean voxel value
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        (self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64) as f32
    }
}

/// Number of voxels implied by a resolution
#[inline(always)]
pub fn voxel_count(resolution: [u32; 3]) -> usize {
    resolution[0] as usize * resolution[1] as usize * resolution[2] as usize
}

/// Normalised density field with physical voxel spacing
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct ScalarField {
    grid: Grid3,
    spacing: Vec3,
}

impl ScalarField {
    /// Build from a raw Z-major buffer
    pub fn new(resolution: [u32; 3], spacing: Vec3, data: Vec<f32>) -> Result<Self, VolumeError> {
        Self::from_grid(Grid3::from_vec(resolution, data)?, spacing)
    }

    /// Wrap a grid with the given voxel spacing
    pub fn from_grid(grid: Grid3, spacing: Vec3) -> Result<Self, VolumeError> {
        if grid.resolution.contains(&0) {
            return Err(VolumeError::EmptyResolution(grid.resolution));
        }
        if !(spacing.cmpgt(Vec3::ZERO).all() && spacing.is_finite()) {
            return Err(VolumeError::InvalidSpacing(spacing.to_array()));
        }
        if let Some(index) = grid.data.iter().position(|v| !v.is_finite()) {
            return Err(VolumeError::NonFiniteSample { index });
        }
        Ok(ScalarField { grid, spacing })
    }

    /// Underlying grid
    pub fn grid(&self) -> &Grid3 {
        &self.grid
    }

    /// Resolution [x, y, z]
    pub fn resolution(&self) -> [u32; 3] {
        self.grid.resolution
    }

    /// Physical voxel spacing
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    /// World-space extent of the field
    pub fn size(&self) -> Vec3 {
        Vec3::new(
            self.grid.resolution[0] as f32,
            self.grid.resolution[1] as f32,
            self.grid.resolution[2] as f32,
        ) * self.spacing
    }

    /// World-space bounding box `[0, res * spacing]`
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::ZERO, self.size())
    }

    /// Length of the bounding-box diagonal
    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }

    /// World-space centre of voxel `(x, y, z)`
    #[inline(always)]
    pub fn voxel_center(&self, x: usize, y: usize, z: usize) -> Vec3 {
        (Vec3::new(x as f32, y as f32, z as f32) + 0.5) * self.spacing
    }

    /// Trilinear density at a world-space position (clamped)
    #[inline]
    pub fn sample(&self, pos: Vec3) -> f32 {
        self.grid.sample(pos / self.spacing)
    }

    /// Central-difference density gradient, one voxel wide per axis
    pub fn gradient(&self, pos: Vec3) -> Vec3 {
        let h = self.spacing;
        let dx = self.sample(pos + Vec3::X * h.x) - self.sample(pos - Vec3::X * h.x);
        let dy = self.sample(pos + Vec3::Y * h.y) - self.sample(pos - Vec3::Y * h.y);
        let dz = self.sample(pos + Vec3::Z * h.z) - self.sample(pos - Vec3::Z * h.z);
        Vec3::new(dx / (2.0 * h.x), dy / (2.0 * h.y), dz / (2.0 * h.z))
    }
}

pub use bake::{bake_field, fill_grid, sphere_field, uniform_field};
pub use pyramid::{
    Extinction, ExtinctionPyramid, ExtinctionVolumeBuilder, Level, Opacity, OpacityPyramid, OpticalDepth,
    OpticalDepthPyramid, Pyramid,
    PyramidResolution,
};
pub use transfer::{Absorption, AbsorptionPoint, ColorPoint, TransferFunction};
