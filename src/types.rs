//! Core geometric and frame types
//!
//! Bounding boxes, rays, the per-frame camera and light description,
//! and the RGBA output buffer.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Length of the main diagonal
    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }

    /// Check if point is inside (inclusive)
    #[inline(always)]
    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Slab test against a ray
    ///
    /// Returns the entry and exit distances along the ray, with the entry
    /// clamped to zero when the origin is inside. `None` on a miss.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv = ray.direction.recip();
        let t0 = (self.min - ray.origin) * inv;
        let t1 = (self.max - ray.origin) * inv;

        let t_near = t0.min(t1).max_element().max(0.0);
        let t_far = t0.max(t1).min_element();

        if t_far >= t_near && t_far > 0.0 {
            Some((t_near, t_far))
        } else {
            None
        }
    }
}

/// Ray for marching
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Ray origin point
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Ray {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get point along ray at distance t
    #[inline(always)]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Pinhole camera
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Camera {
    /// Eye position
    pub eye: Vec3,
    /// Look-at target
    pub target: Vec3,
    /// Up hint
    pub up: Vec3,
    /// Vertical field of view (degrees)
    pub fov_y_deg: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_deg: 45.0,
        }
    }
}

impl Camera {
    /// Camera looking at the center of `bounds` from `distance` diagonals along +Z
    pub fn framing(bounds: &Aabb, distance: f32) -> Self {
        let center = bounds.center();
        Camera {
            eye: center + Vec3::Z * bounds.diagonal() * distance,
            target: center,
            ..Default::default()
        }
    }

    /// Orthonormal view basis and half-extents of the image plane
    ///
    /// Returns `(forward, right, up, half_width, half_height)`.
    pub fn basis(&self, width: usize, height: usize) -> (Vec3, Vec3, Vec3, f32, f32) {
        let forward = (self.target - self.eye).normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);

        let aspect = width as f32 / height.max(1) as f32;
        let half_height = (self.fov_y_deg.to_radians() * 0.5).tan();
        let half_width = half_height * aspect;

        (forward, right, up, half_width, half_height)
    }
}

/// Light source type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    /// Omnidirectional light at `Light::position`
    Point,
    /// Cone light at `Light::position`
    Spot {
        /// Spot axis (from the light into the scene)
        direction: Vec3,
        /// Aperture half-angle (degrees)
        max_angle_deg: f32,
    },
    /// Light at infinity
    Directional {
        /// Propagation direction (from the light into the scene)
        direction: Vec3,
    },
}

/// A light source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Light {
    /// World-space position (ignored for directional lights)
    pub position: Vec3,
    /// Light color/intensity (RGB)
    pub color: Vec3,
    /// Light type
    pub kind: LightKind,
}

impl Default for Light {
    fn default() -> Self {
        Light {
            position: Vec3::new(0.0, 10.0, 10.0),
            color: Vec3::ONE,
            kind: LightKind::Point,
        }
    }
}

impl Light {
    /// Unit vector from `point` towards the light
    #[inline]
    pub fn direction_to(&self, point: Vec3) -> Vec3 {
        match self.kind {
            LightKind::Directional { direction } => -direction.normalize(),
            LightKind::Point | LightKind::Spot { .. } => (self.position - point).normalize_or_zero(),
        }
    }

    /// Whether `point` lies inside the light's aperture
    #[inline]
    pub fn illuminates(&self, point: Vec3) -> bool {
        match self.kind {
            LightKind::Spot {
                direction,
                max_angle_deg,
            } => {
                let to_point = (point - self.position).normalize_or_zero();
                to_point.dot(direction.normalize()) >= max_angle_deg.to_radians().cos()
            }
            _ => true,
        }
    }
}

/// Per-frame camera and lights handed to renderers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Camera
    pub camera: Camera,
    /// Lights
    pub lights: Vec<Light>,
}

/// RGBA output image (premultiplied by accumulated alpha)
///
/// Stores pixels row-major, top row first.
#[derive(Debug, Clone)]
pub struct ColorBuffer {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Row-major pixels
    pub pixels: Vec<Vec4>,
}

impl ColorBuffer {
    /// Create a buffer filled with `fill`
    pub fn new(width: usize, height: usize, fill: Vec4) -> Self {
        ColorBuffer {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    /// Pixel at `(x, y)`
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> Vec4 {
        self.pixels[x + y * self.width]
    }

    /// Mean of all pixels
    pub fn mean(&self) -> Vec4 {
        if self.pixels.is_empty() {
            return Vec4::ZERO;
        }
        self.pixels.iter().copied().sum::<Vec4>() / self.pixels.len() as f32
    }
}
