//! # conevol
//!
//! **Cone-traced directional occlusion and soft shadows for scalar volumes**
//!
//! A CPU volume-rendering core that approximates ambient occlusion and
//! soft shadows by integrating extinction over cones instead of sampling
//! them densely every frame.
//!
//! ## Features
//!
//! - **Cone schedule**: Gaussian sections placed along a cone axis, switching
//!   between 1, 3 and 7 sub-rays and doubling sigma as the cone widens
//! - **Extinction pyramid**: Gaussian pre-filtered mip levels whose index is
//!   the schedule's time axis, built in optical depth and typed by value domain
//! - **Ray marching**: Front-to-back compositing, early termination, cone
//!   occlusion towards the viewer and shadow cones towards each light,
//!   optionally read from a coarse per-frame light cache
//! - **Session**: Scene ownership and a closed set of renderers
//!
//! ## Example
//!
//! ```rust
//! use conevol::prelude::*;
//!
//! let field = sphere_field([16, 16, 16], Vec3::ONE, 0.6).unwrap();
//! let tf = TransferFunction::ramp(Vec3::ONE, 0.3);
//!
//! // Pre-filtered extinction
//! let pyramid = ExtinctionVolumeBuilder::default().build(&field, &tf).unwrap();
//!
//! // Occlusion cone schedule for the pyramid's base sigma
//! let mut occlusion = ConeGaussianSampler::new(ConeParams::occlusion());
//! occlusion.compute_cone_integration_steps(pyramid.sigma0() as f64).unwrap();
//!
//! // Render
//! let cones = ConeInputs {
//!     pyramid: &pyramid,
//!     occlusion: occlusion.schedule(),
//!     shadow: None,
//! };
//! let image = ConeTracedRayMarcher::with_cones(&field, &tf, cones, MarchConfig::default())
//!     .render(&Camera::framing(&field.bounds(), 1.5), &[], 32, 32);
//! assert_eq!(image.pixels.len(), 32 * 32);
//! ```

#![warn(missing_docs)]

pub mod cone;
pub mod config;
pub mod error;
pub mod render;
pub mod session;
pub mod types;
pub mod volume;

pub use error::{ConfigError, Error, PyramidError, ScheduleError, VolumeError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::cone::{ConeGaussianSampler, ConePacking, ConeParams, ConeSchedule, Interval, Section};
    pub use crate::config::SessionConfig;
    pub use crate::error::Error;
    pub use crate::render::{
        cone_transmittance, BlinnPhong, ConeInputs, ConeTracedRayMarcher, LightCache, MarchConfig, Renderer,
        RendererKind, VolumeRenderer,
    };
    pub use crate::session::{RenderSession, Scene};
    pub use crate::types::{Aabb, Camera, ColorBuffer, Frame, Light, LightKind, Ray};
    pub use crate::volume::{
        bake_field, sphere_field, uniform_field, Absorption, AbsorptionPoint, ColorPoint, ExtinctionPyramid,
        ExtinctionVolumeBuilder, OpacityPyramid, OpticalDepthPyramid, PyramidResolution, ScalarField,
        TransferFunction,
    };
    pub use glam::{Vec3, Vec4};
}
