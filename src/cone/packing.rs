//! Sub-ray packings for a cone cross-section
//!
//! A wide cone section is approximated by 1, 3 or 7 narrower cones whose
//! circular footprints pack the parent circle:
//!
//! ```text
//!   1:   ( o )      3:  (o o)      7:  (o o)
//!                        ( o )        (o o o)
//!                                      (o o)
//! ```
//!
//! Directions are expressed around the local `+Z` axis and rotated into
//! world space by the caller.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Packing divisor for 3 sub-cones: `1 + 2 / sqrt(3)` (≈ 2.1547)
pub const CONE_DIV_3: f64 = 2.154_700_538_379_251_5;

/// Packing divisor for 7 sub-cones
pub const CONE_DIV_7: f64 = 3.01;

/// Maximum number of sub-rays per cone section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConePacking {
    /// Single central ray
    One,
    /// Three rays at 120° spacing
    Three,
    /// One central ray plus six at 60° spacing
    Seven,
}

impl ConePacking {
    /// All packings, narrowest first
    pub const ALL: [ConePacking; 3] = [ConePacking::One, ConePacking::Three, ConePacking::Seven];

    /// Number of sub-rays
    #[inline(always)]
    pub fn ray_count(self) -> u32 {
        match self {
            ConePacking::One => 1,
            ConePacking::Three => 3,
            ConePacking::Seven => 7,
        }
    }

    /// Packing with exactly `n` rays
    pub fn from_ray_count(n: u32) -> Option<Self> {
        match n {
            1 => Some(ConePacking::One),
            3 => Some(ConePacking::Three),
            7 => Some(ConePacking::Seven),
            _ => None,
        }
    }

    /// Divisor applied to the cone half-angle to get each sub-ray's half-angle
    #[inline(always)]
    pub fn angle_divisor(self) -> f64 {
        match self {
            ConePacking::One => 1.0,
            ConePacking::Three => CONE_DIV_3,
            ConePacking::Seven => CONE_DIV_7,
        }
    }

    /// Next wider packing (saturating)
    pub fn next(self) -> Self {
        match self {
            ConePacking::One => ConePacking::Three,
            _ => ConePacking::Seven,
        }
    }

    /// Next narrower packing (saturating)
    pub fn previous(self) -> Self {
        match self {
            ConePacking::Seven => ConePacking::Three,
            _ => ConePacking::One,
        }
    }
}

impl std::fmt::Display for ConePacking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ray_count())
    }
}

/// Rotate `v` by `angle` radians around `axis` (Rodrigues)
#[inline]
fn rotate(v: Vec3, angle: f64, axis: Vec3) -> Vec3 {
    Quat::from_axis_angle(axis, angle as f32) * v
}

/// Sub-ray directions of the 3- and 7-packings for one cone half-angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingDirections {
    /// Three rays, 120° apart, each tilted off the axis
    pub ray3: [Vec3; 3],
    /// Central ray followed by six rays 60° apart
    pub ray7: [Vec3; 7],
}

impl PackingDirections {
    /// Build the direction sets for a cone of `half_angle_deg`
    pub fn new(half_angle_deg: f64) -> Self {
        let half_angle = half_angle_deg.to_radians();

        let tilt3 = half_angle - half_angle / CONE_DIV_3;
        let r0 = rotate(rotate(Vec3::Z, tilt3, Vec3::Y), 30f64.to_radians(), Vec3::Z);
        let step3 = 120f64.to_radians();
        let r1 = rotate(r0, step3, Vec3::Z);
        let r2 = rotate(r1, step3, Vec3::Z);

        let tilt7 = half_angle - half_angle / CONE_DIV_7;
        let mut ray7 = [Vec3::Z; 7];
        ray7[1] = rotate(Vec3::Z, tilt7, Vec3::Y);
        for i in 2..7 {
            ray7[i] = rotate(ray7[i - 1], 60f64.to_radians(), Vec3::Z);
        }

        PackingDirections {
            ray3: [r0, r1, r2],
            ray7,
        }
    }

    /// Cosine between the axis and each 3-packing ray
    pub fn ray3_adjacent_weight(&self) -> f64 {
        Vec3::Z.dot(self.ray3[0]) as f64
    }

    /// Cosine between the axis and each outer 7-packing ray
    pub fn ray7_adjacent_weight(&self) -> f64 {
        Vec3::Z.dot(self.ray7[1]) as f64
    }

    /// Local directions for a packing
    pub fn local_rays(&self, packing: ConePacking) -> &[Vec3] {
        match packing {
            ConePacking::One => &self.ray7[..1],
            ConePacking::Three => &self.ray3,
            ConePacking::Seven => &self.ray7,
        }
    }
}

/// Orthonormal basis `(tangent, bitangent)` completing `axis`
pub fn orthonormal_basis(axis: Vec3) -> (Vec3, Vec3) {
    let up = if axis.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    let tangent = axis.cross(up).normalize();
    let bitangent = tangent.cross(axis).normalize();
    (tangent, bitangent)
}

/// Map a local `+Z`-based direction onto a world-space cone axis
#[inline(always)]
pub fn to_world(local: Vec3, axis: Vec3, tangent: Vec3, bitangent: Vec3) -> Vec3 {
    tangent * local.x + bitangent * local.y + axis * local.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_counts() {
        assert_eq!(ConePacking::One.ray_count(), 1);
        assert_eq!(ConePacking::Three.ray_count(), 3);
        assert_eq!(ConePacking::Seven.ray_count(), 7);
        assert_eq!(ConePacking::from_ray_count(3), Some(ConePacking::Three));
        assert_eq!(ConePacking::from_ray_count(5), None);
    }

    #[test]
    fn test_next_previous_saturate() {
        assert_eq!(ConePacking::One.next(), ConePacking::Three);
        assert_eq!(ConePacking::Seven.next(), ConePacking::Seven);
        assert_eq!(ConePacking::Seven.previous(), ConePacking::Three);
        assert_eq!(ConePacking::One.previous(), ConePacking::One);
        assert!(ConePacking::One < ConePacking::Seven);
    }

    #[test]
    fn test_div3_constant() {
        assert!((CONE_DIV_3 - (1.0 + 2.0 / 3f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_directions_unit_length() {
        let dirs = PackingDirections::new(20.0);
        for d in dirs.ray3.iter().chain(dirs.ray7.iter()) {
            assert!((d.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_ray3_tilt_and_spacing() {
        let half_angle: f64 = 20.0;
        let dirs = PackingDirections::new(half_angle);
        let tilt = (half_angle - half_angle / CONE_DIV_3).to_radians();

        for d in &dirs.ray3 {
            assert!((d.z as f64 - tilt.cos()).abs() < 1e-5);
        }

        // 120° apart in the XY plane
        let a = dirs.ray3[0].truncate().normalize();
        let b = dirs.ray3[1].truncate().normalize();
        assert!((a.dot(b) - (-0.5)).abs() < 1e-4);
    }

    #[test]
    fn test_ray7_layout() {
        let dirs = PackingDirections::new(30.0);
        assert_eq!(dirs.ray7[0], Vec3::Z);

        for i in 1..7 {
            let next = if i == 6 { 1 } else { i + 1 };
            let a = dirs.ray7[i].truncate().normalize();
            let b = dirs.ray7[next].truncate().normalize();
            assert!((a.dot(b) - 0.5).abs() < 1e-4, "ring ray {} not 60° from {}", i, next);
        }
        assert!(dirs.ray7_adjacent_weight() < 1.0);
        assert!(dirs.ray7_adjacent_weight() > 0.9);
    }

    #[test]
    fn test_basis_to_world() {
        let axis = Vec3::new(1.0, 2.0, -0.5).normalize();
        let (t, b) = orthonormal_basis(axis);
        assert!(t.dot(axis).abs() < 1e-5);
        assert!(b.dot(axis).abs() < 1e-5);
        assert!((to_world(Vec3::Z, axis, t, b) - axis).length() < 1e-6);
    }
}
