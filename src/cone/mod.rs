//! Cone integration: Gaussian helpers, sub-ray packings and the section schedule
//!
//! A cone is integrated as a sequence of Gaussian-weighted sections along
//! its axis. Each section samples the extinction pyramid at the level whose
//! sigma matches the cone footprint, through 1, 3 or 7 sub-rays.

pub mod gaussian;
pub mod packing;
pub mod sampler;

pub use gaussian::{gaussian_eval, gaussian_mass, integrate_over_radius, midpoint_error_bound, INTEGRATION_SEGMENT};
pub use packing::{orthonormal_basis, to_world, ConePacking, PackingDirections, CONE_DIV_3, CONE_DIV_7};
pub use sampler::{ConeGaussianSampler, ConeParams, ConeSchedule, Interval, Section};
