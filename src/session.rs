//! Rendering session
//!
//! Owns the scene and the active renderer. Everything that used to live in
//! process-wide state is reached through a `RenderSession` value.

use crate::config::SessionConfig;
use crate::error::Error;
use crate::render::{Renderer, RendererKind, VolumeRenderer};
use crate::types::{ColorBuffer, Frame};
use crate::volume::{ScalarField, TransferFunction};

/// Density field and transfer function being rendered
#[derive(Debug, Clone)]
pub struct Scene {
    /// Normalised density field
    pub field: ScalarField,
    /// Transfer function
    pub transfer_function: TransferFunction,
}

/// Scene, configuration and active renderer
#[derive(Debug)]
pub struct RenderSession {
    scene: Scene,
    config: SessionConfig,
    renderer: Renderer,
}

impl RenderSession {
    /// Create a session and initialise the configured renderer
    pub fn new(scene: Scene, config: SessionConfig) -> Result<Self, Error> {
        let config = config.sanitized();
        let mut renderer = Renderer::from_kind(config.renderer, &config);
        renderer.reshape(config.width, config.height);
        renderer.init(&scene)?;
        log::info!(
            "Session: {:?} field, renderer '{}', {}x{}",
            scene.field.resolution(),
            renderer.name(),
            config.width,
            config.height
        );
        Ok(RenderSession {
            scene,
            config,
            renderer,
        })
    }

    /// Current scene
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Current configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Active renderer
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Switch renderer; the new one is initialised against the current scene
    ///
    /// On failure the previous renderer stays active.
    pub fn set_renderer(&mut self, kind: RendererKind) -> Result<(), Error> {
        let mut config = self.config;
        config.renderer = kind;
        let mut renderer = Renderer::from_kind(kind, &config);
        renderer.reshape(config.width, config.height);
        renderer.init(&self.scene)?;
        self.renderer = renderer;
        self.config = config;
        Ok(())
    }

    /// Change the output size
    pub fn reshape(&mut self, width: usize, height: usize) {
        self.config.width = width;
        self.config.height = height;
        self.renderer.reshape(width, height);
    }

    /// Replace the scene and fully rebuild the renderer's products
    ///
    /// On failure the previous scene and products are kept.
    pub fn replace_scene(&mut self, scene: Scene) -> Result<(), Error> {
        self.renderer.init(&scene)?;
        self.scene = scene;
        Ok(())
    }

    /// Replace the transfer function and rebuild
    pub fn set_transfer_function(&mut self, tf: TransferFunction) -> Result<(), Error> {
        let scene = Scene {
            field: self.scene.field.clone(),
            transfer_function: tf,
        };
        self.replace_scene(scene)
    }

    /// Apply a new configuration and rebuild the renderer
    pub fn reconfigure(&mut self, config: SessionConfig) -> Result<(), Error> {
        let config = config.sanitized();
        let mut renderer = Renderer::from_kind(config.renderer, &config);
        renderer.reshape(config.width, config.height);
        renderer.init(&self.scene)?;
        self.renderer = renderer;
        self.config = config;
        Ok(())
    }

    /// Render one frame
    pub fn render_frame(&mut self, frame: &Frame) -> ColorBuffer {
        self.renderer.update(frame);
        self.renderer.redraw(&self.scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Camera;
    use crate::volume::{sphere_field, uniform_field};
    use glam::Vec3;

    fn scene() -> Scene {
        Scene {
            field: sphere_field([12, 12, 12], Vec3::ONE, 0.6).unwrap(),
            transfer_function: TransferFunction::ramp(Vec3::ONE, 0.4),
        }
    }

    fn small_config() -> SessionConfig {
        SessionConfig {
            width: 8,
            height: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_session_renders() {
        let mut session = RenderSession::new(scene(), small_config()).unwrap();
        let frame = Frame {
            camera: Camera::framing(&session.scene().field.bounds(), 1.5),
            lights: vec![Default::default()],
        };
        let img = session.render_frame(&frame);
        assert_eq!(img.pixels.len(), 64);
    }

    #[test]
    fn test_set_renderer() {
        let mut session = RenderSession::new(scene(), small_config()).unwrap();
        session.set_renderer(RendererKind::DirectRayCast).unwrap();
        assert_eq!(session.renderer().kind(), RendererKind::DirectRayCast);
        assert_eq!(session.config().renderer, RendererKind::DirectRayCast);
    }

    #[test]
    fn test_reshape() {
        let mut session = RenderSession::new(scene(), small_config()).unwrap();
        session.reshape(3, 5);
        let img = session.render_frame(&Frame::default());
        assert_eq!((img.width, img.height), (3, 5));
    }

    #[test]
    fn test_replace_scene() {
        let mut session = RenderSession::new(scene(), small_config()).unwrap();
        let other = Scene {
            field: uniform_field([4, 4, 4], Vec3::ONE, 0.0).unwrap(),
            transfer_function: TransferFunction::default(),
        };
        session.replace_scene(other).unwrap();
        assert_eq!(session.scene().field.resolution(), [4, 4, 4]);
    }
}
