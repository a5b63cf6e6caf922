//! Volume renderers
//!
//! A closed set of renderer variants behind one capability interface.
//! Renderers own their precomputed products (pyramid, cone schedules) and
//! the live frame state; the scene itself is borrowed from the session.
//!
//! | Variant | Products | Per frame |
//! |---|---|---|
//! | `Null` | none | background only |
//! | `DirectRayCast` | none | emission-absorption march |
//! | `ConeOcclusion` | pyramid + 2 schedules (+ light cache) | march with cone occlusion/shadows |

pub mod light_cache;
pub mod march;

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cone::{ConeGaussianSampler, ConeParams};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::session::Scene;
use crate::types::{ColorBuffer, Frame};
use crate::volume::{ExtinctionPyramid, ExtinctionVolumeBuilder};

pub use light_cache::{LightCache, DEFAULT_LIGHT_CACHE_RESOLUTION};
pub use march::{
    cone_transmittance, BlinnPhong, ConeInputs, ConeTracedRayMarcher, MarchConfig, MarchPhase, RayMarchState,
};

/// Renderer capabilities
pub trait VolumeRenderer {
    /// Display name
    fn name(&self) -> &'static str;

    /// Build scene-dependent products
    ///
    /// On failure the previous products stay in place.
    fn init(&mut self, scene: &Scene) -> Result<(), Error>;

    /// Take the camera and lights for the next frame
    fn update(&mut self, frame: &Frame);

    /// Render the current frame
    fn redraw(&self, scene: &Scene) -> ColorBuffer;

    /// Change the output size
    fn reshape(&mut self, width: usize, height: usize);
}

/// Renderer selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RendererKind {
    /// Background only
    Null,
    /// Plain emission-absorption ray casting
    DirectRayCast,
    /// Ray casting with cone-traced occlusion and shadows
    #[default]
    ConeOcclusion,
}

/// Output size and frame shared by all variants
#[derive(Debug, Clone, Default)]
struct View {
    frame: Frame,
    width: usize,
    height: usize,
}

/// Renders the background color only
#[derive(Debug, Clone, Default)]
pub struct NullRenderer {
    view: View,
    march: MarchConfig,
}

impl VolumeRenderer for NullRenderer {
    fn name(&self) -> &'static str {
        "null"
    }

    fn init(&mut self, _scene: &Scene) -> Result<(), Error> {
        Ok(())
    }

    fn update(&mut self, frame: &Frame) {
        self.view.frame = frame.clone();
    }

    fn redraw(&self, _scene: &Scene) -> ColorBuffer {
        ColorBuffer::new(self.view.width, self.view.height, self.march.background.extend(0.0))
    }

    fn reshape(&mut self, width: usize, height: usize) {
        self.view.width = width;
        self.view.height = height;
    }
}

/// Emission-absorption ray caster without cones
#[derive(Debug, Clone, Default)]
pub struct DirectRayCaster {
    view: View,
    march: MarchConfig,
}

impl DirectRayCaster {
    /// Ray caster with the given marching configuration
    pub fn new(march: MarchConfig) -> Self {
        DirectRayCaster {
            view: View::default(),
            march,
        }
    }
}

impl VolumeRenderer for DirectRayCaster {
    fn name(&self) -> &'static str {
        "direct ray cast"
    }

    fn init(&mut self, _scene: &Scene) -> Result<(), Error> {
        Ok(())
    }

    fn update(&mut self, frame: &Frame) {
        self.view.frame = frame.clone();
    }

    fn redraw(&self, scene: &Scene) -> ColorBuffer {
        ConeTracedRayMarcher::direct(&scene.field, &scene.transfer_function, self.march).render(
            &self.view.frame.camera,
            &self.view.frame.lights,
            self.view.width,
            self.view.height,
        )
    }

    fn reshape(&mut self, width: usize, height: usize) {
        self.view.width = width;
        self.view.height = height;
    }
}

/// Ray caster with cone-traced directional occlusion and soft shadows
#[derive(Debug, Clone)]
pub struct ConeOcclusionRenderer {
    view: View,
    march: MarchConfig,
    builder: ExtinctionVolumeBuilder,
    scene_relative: bool,
    occlusion: ConeGaussianSampler,
    shadow: ConeGaussianSampler,
    pyramid: Option<ExtinctionPyramid>,
    light_cache: Option<LightCache>,
}

impl Default for ConeOcclusionRenderer {
    fn default() -> Self {
        ConeOcclusionRenderer::new(&SessionConfig::default())
    }
}

impl ConeOcclusionRenderer {
    /// Renderer configured from `config`; products are built by `init`
    pub fn new(config: &SessionConfig) -> Self {
        ConeOcclusionRenderer {
            view: View::default(),
            march: config.march,
            builder: config.pyramid,
            scene_relative: config.scene_relative_cones,
            occlusion: ConeGaussianSampler::new(config.occlusion),
            shadow: ConeGaussianSampler::new(config.shadow),
            pyramid: None,
            light_cache: None,
        }
    }

    /// Current extinction pyramid
    pub fn pyramid(&self) -> Option<&ExtinctionPyramid> {
        self.pyramid.as_ref()
    }

    /// Pre-illumination cache for the current frame, when enabled
    pub fn light_cache(&self) -> Option<&LightCache> {
        self.light_cache.as_ref()
    }

    /// Occlusion cone sampler
    pub fn occlusion_sampler(&self) -> &ConeGaussianSampler {
        &self.occlusion
    }

    /// Shadow cone sampler
    pub fn shadow_sampler(&self) -> &ConeGaussianSampler {
        &self.shadow
    }

    /// Scene-dependent cone parameters
    ///
    /// Initial step `3 * sigma0`; covered distance half the diagonal for
    /// occlusion and three quarters of it for shadows.
    fn scene_params(&self, base: ConeParams, diagonal: f32, fraction: f32) -> ConeParams {
        let mut params = base;
        if self.scene_relative {
            params.set_initial_step(3.0 * self.builder.sigma0);
            params.set_covered_distance(diagonal * fraction);
        }
        params
    }

    fn cones(&self) -> Option<ConeInputs<'_>> {
        self.pyramid.as_ref().map(|pyramid| ConeInputs {
            pyramid,
            occlusion: self.occlusion.schedule(),
            shadow: self.shadow.schedule(),
        })
    }

    /// Recompute the light cache for the current frame
    fn refresh_light_cache(&mut self) {
        let cache = match (self.march.light_cache, self.cones()) {
            (Some(resolution), Some(cones)) => Some(LightCache::build(
                &cones,
                self.view.frame.camera.eye,
                &self.view.frame.lights,
                resolution,
                self.march.occlusion,
                self.march.shadows,
            )),
            _ => None,
        };
        self.light_cache = cache;
    }

    fn build(&self, scene: &Scene) -> Result<(ExtinctionPyramid, ConeGaussianSampler, ConeGaussianSampler), Error> {
        let pyramid = self.builder.build(&scene.field, &scene.transfer_function)?;
        let diagonal = scene.field.diagonal();
        let sigma0 = self.builder.sigma0 as f64;

        let mut occlusion = ConeGaussianSampler::new(self.scene_params(*self.occlusion.params(), diagonal, 0.5));
        occlusion.compute_cone_integration_steps(sigma0)?;

        let mut shadow = ConeGaussianSampler::new(self.scene_params(*self.shadow.params(), diagonal, 0.75));
        shadow.compute_cone_integration_steps(sigma0)?;

        Ok((pyramid, occlusion, shadow))
    }
}

impl VolumeRenderer for ConeOcclusionRenderer {
    fn name(&self) -> &'static str {
        "cone occlusion"
    }

    fn init(&mut self, scene: &Scene) -> Result<(), Error> {
        let start = Instant::now();
        match self.build(scene) {
            Ok((pyramid, occlusion, shadow)) => {
                self.pyramid = Some(pyramid);
                self.occlusion = occlusion;
                self.shadow = shadow;
                self.refresh_light_cache();
                log::info!(
                    "{}: products rebuilt in {:.1} ms",
                    self.name(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("{}: rebuild failed, keeping previous products: {}", self.name(), e);
                Err(e)
            }
        }
    }

    fn update(&mut self, frame: &Frame) {
        self.view.frame = frame.clone();
        self.refresh_light_cache();
    }

    fn redraw(&self, scene: &Scene) -> ColorBuffer {
        let camera = &self.view.frame.camera;
        let lights = &self.view.frame.lights;
        let (w, h) = (self.view.width, self.view.height);

        match self.cones() {
            Some(cones) => {
                let marcher =
                    ConeTracedRayMarcher::with_cones(&scene.field, &scene.transfer_function, cones, self.march);
                match &self.light_cache {
                    Some(cache) => marcher.with_light_cache(cache).render(camera, lights, w, h),
                    None => marcher.render(camera, lights, w, h),
                }
            }
            None => {
                log::debug!("{}: no products yet, rendering without cones", self.name());
                ConeTracedRayMarcher::direct(&scene.field, &scene.transfer_function, self.march)
                    .render(camera, lights, w, h)
            }
        }
    }

    fn reshape(&mut self, width: usize, height: usize) {
        self.view.width = width;
        self.view.height = height;
    }
}

/// The closed set of renderers
#[derive(Debug, Clone)]
pub enum Renderer {
    /// Background only
    Null(NullRenderer),
    /// Plain ray casting
    DirectRayCast(DirectRayCaster),
    /// Cone-traced occlusion and shadows
    ConeOcclusion(Box<ConeOcclusionRenderer>),
}

impl Renderer {
    /// Renderer of `kind`, configured from `config`
    pub fn from_kind(kind: RendererKind, config: &SessionConfig) -> Self {
        match kind {
            RendererKind::Null => Renderer::Null(NullRenderer {
                view: View::default(),
                march: config.march,
            }),
            RendererKind::DirectRayCast => Renderer::DirectRayCast(DirectRayCaster::new(config.march)),
            RendererKind::ConeOcclusion => Renderer::ConeOcclusion(Box::new(ConeOcclusionRenderer::new(config))),
        }
    }

    /// Selector of this variant
    pub fn kind(&self) -> RendererKind {
        match self {
            Renderer::Null(_) => RendererKind::Null,
            Renderer::DirectRayCast(_) => RendererKind::DirectRayCast,
            Renderer::ConeOcclusion(_) => RendererKind::ConeOcclusion,
        }
    }

    fn inner(&self) -> &dyn VolumeRenderer {
        match self {
            Renderer::Null(r) => r,
            Renderer::DirectRayCast(r) => r,
            Renderer::ConeOcclusion(r) => r.as_ref(),
        }
    }

    fn inner_mut(&mut self) -> &mut dyn VolumeRenderer {
        match self {
            Renderer::Null(r) => r,
            Renderer::DirectRayCast(r) => r,
            Renderer::ConeOcclusion(r) => r.as_mut(),
        }
    }
}

impl VolumeRenderer for Renderer {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn init(&mut self, scene: &Scene) -> Result<(), Error> {
        self.inner_mut().init(scene)
    }

    fn update(&mut self, frame: &Frame) {
        self.inner_mut().update(frame)
    }

    fn redraw(&self, scene: &Scene) -> ColorBuffer {
        self.inner().redraw(scene)
    }

    fn reshape(&mut self, width: usize, height: usize) {
        self.inner_mut().reshape(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Camera;
    use crate::volume::{sphere_field, uniform_field, TransferFunction};
    use glam::Vec3;

    fn scene() -> Scene {
        Scene {
            field: sphere_field([16, 16, 16], Vec3::ONE, 0.6).unwrap(),
            transfer_function: TransferFunction::ramp(Vec3::ONE, 0.3),
        }
    }

    #[test]
    fn test_kind_round_trip() {
        let config = SessionConfig::default();
        for kind in [RendererKind::Null, RendererKind::DirectRayCast, RendererKind::ConeOcclusion] {
            assert_eq!(Renderer::from_kind(kind, &config).kind(), kind);
        }
    }

    #[test]
    fn test_null_renders_background() {
        let mut r = Renderer::from_kind(RendererKind::Null, &SessionConfig::default());
        r.reshape(4, 3);
        let img = r.redraw(&scene());
        assert_eq!(img.pixels.len(), 12);
        assert!(img.pixels.iter().all(|p| p.w == 0.0));
    }

    #[test]
    fn test_cone_renderer_builds_products() {
        let s = scene();
        let mut r = ConeOcclusionRenderer::default();
        r.init(&s).unwrap();
        assert!(r.pyramid().is_some());

        let occ = r.occlusion_sampler().params();
        assert!((occ.covered_distance - (s.field.diagonal() * 0.5).max(10.0)).abs() < 1e-4);
        assert_eq!(occ.initial_step, 3.0);
        let shadow = r.shadow_sampler().params();
        assert!((shadow.covered_distance - (s.field.diagonal() * 0.75).max(10.0)).abs() < 1e-4);
        assert!(r.occlusion_sampler().number_of_sections() > 0);
    }

    #[test]
    fn test_failed_init_keeps_previous() {
        let s = scene();
        let mut r = ConeOcclusionRenderer::default();
        r.init(&s).unwrap();
        let levels = r.pyramid().map(|p| p.level_count());

        r.builder.sigma0 = -1.0;
        assert!(r.init(&s).is_err());
        assert_eq!(r.pyramid().map(|p| p.level_count()), levels);
    }

    #[test]
    fn test_light_cache_follows_frame() {
        let s = scene();
        let config = SessionConfig {
            march: MarchConfig {
                shadows: true,
                light_cache: Some([8, 8, 8]),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut r = ConeOcclusionRenderer::new(&config);
        r.update(&Frame::default());
        assert!(r.light_cache().is_none());

        r.init(&s).unwrap();
        assert_eq!(r.light_cache().and_then(|c| c.resolution()), Some([8, 8, 8]));

        let camera = Camera::framing(&s.field.bounds(), 1.5);
        r.update(&Frame {
            camera,
            lights: vec![Default::default(), Default::default()],
        });
        let cache = r.light_cache().unwrap();
        assert!(cache.shadow_grid(1).is_some());
        assert!(cache.occlusion_grid().is_some());

        r.reshape(4, 4);
        let img = r.redraw(&s);
        assert!(img.pixels.iter().all(|p| p.is_finite()));

        let off = ConeOcclusionRenderer::default();
        assert!(off.light_cache().is_none());
    }

    #[test]
    fn test_cone_redraw_matches_size() {
        let s = Scene {
            field: uniform_field([8, 8, 8], Vec3::ONE, 0.5).unwrap(),
            transfer_function: TransferFunction::ramp(Vec3::ONE, 0.5),
        };
        let mut r = Renderer::from_kind(RendererKind::ConeOcclusion, &SessionConfig::default());
        r.init(&s).unwrap();
        r.reshape(6, 4);
        r.update(&Frame {
            camera: Camera::framing(&s.field.bounds(), 1.5),
            lights: vec![Default::default()],
        });
        let img = r.redraw(&s);
        assert_eq!((img.width, img.height), (6, 4));
        assert!(img.pixels.iter().any(|p| p.w > 0.0));
    }
}
