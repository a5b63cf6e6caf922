//! Z-slab parallel grid filling
//!
//! Every per-voxel pass (field baking, pyramid filters, domain transforms)
//! goes through [`fill_grid`], which hands each Z slice to a rayon worker.

use glam::Vec3;
use rayon::prelude::*;

use super::{voxel_count, Grid3, ScalarField};
use crate::error::VolumeError;

/// Fill a grid by evaluating `f(x, y, z)` for every voxel
///
/// Slices along Z are processed in parallel; within a slice voxels are
/// visited row by row.
pub fn fill_grid<F>(resolution: [u32; 3], f: F) -> Grid3
where
    F: Fn(usize, usize, usize) -> f32 + Sync,
{
    let rx = resolution[0] as usize;
    let ry = resolution[1] as usize;
    let slice_size = (rx * ry).max(1);

    let mut data = vec![0.0f32; voxel_count(resolution)];

    data.par_chunks_mut(slice_size)
        .enumerate()
        .for_each(|(z, slice)| {
            for y in 0..ry {
                let row_offset = y * rx;
                for x in 0..rx {
                    slice[row_offset + x] = f(x, y, z);
                }
            }
        });

    Grid3 { resolution, data }
}

/// Bake a field by evaluating `f` at every voxel centre (world space)
pub fn bake_field<F>(resolution: [u32; 3], spacing: Vec3, f: F) -> Result<ScalarField, VolumeError>
where
    F: Fn(Vec3) -> f32 + Sync,
{
    if resolution.contains(&0) {
        return Err(VolumeError::EmptyResolution(resolution));
    }

    let grid = fill_grid(resolution, |x, y, z| {
        let p = (Vec3::new(x as f32, y as f32, z as f32) + 0.5) * spacing;
        f(p)
    });

    ScalarField::from_grid(grid, spacing)
}

/// Field with the same density everywhere
pub fn uniform_field(resolution: [u32; 3], spacing: Vec3, density: f32) -> Result<ScalarField, VolumeError> {
    if resolution.contains(&0) {
        return Err(VolumeError::EmptyResolution(resolution));
    }
    ScalarField::from_grid(Grid3::filled(resolution, density), spacing)
}

/// Soft sphere centred in the volume
///
/// Density 1 inside `radius_fraction` of the half-extent, falling linearly
/// to 0 over one voxel.
pub fn sphere_field(resolution: [u32; 3], spacing: Vec3, radius_fraction: f32) -> Result<ScalarField, VolumeError> {
    let size = Vec3::new(resolution[0] as f32, resolution[1] as f32, resolution[2] as f32) * spacing;
    let center = size * 0.5;
    let radius = size.min_element() * 0.5 * radius_fraction;
    let falloff = spacing.max_element();

    bake_field(resolution, spacing, |p| {
        let d = (p - center).length() - radius;
        (0.5 - d / falloff).clamp(0.0, 1.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_grid_order() {
        let grid = fill_grid([3, 2, 2], |x, y, z| (x + 10 * y + 100 * z) as f32);
        assert_eq!(grid.get(2, 1, 1), 112.0);
        assert_eq!(grid.data[grid.index(1, 0, 1)], 101.0);
    }

    #[test]
    fn test_bake_field_voxel_centres() {
        let field = bake_field([2, 2, 2], Vec3::splat(2.0), |p| p.x).unwrap();
        assert_eq!(field.grid().get(0, 0, 0), 1.0);
        assert_eq!(field.grid().get(1, 0, 0), 3.0);
    }

    #[test]
    fn test_bake_empty_resolution() {
        assert!(bake_field([4, 0, 4], Vec3::ONE, |_| 0.0).is_err());
        assert!(uniform_field([0, 1, 1], Vec3::ONE, 1.0).is_err());
    }

    #[test]
    fn test_sphere_field() {
        let field = sphere_field([16, 16, 16], Vec3::ONE, 0.5).unwrap();
        assert_eq!(field.sample(Vec3::splat(8.0)), 1.0);
        assert_eq!(field.sample(Vec3::splat(0.5)), 0.0);
    }
}
