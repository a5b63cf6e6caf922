//! Session configuration
//!
//! Every tunable of the pyramid, the two cones and the marcher in one
//! serializable struct. Files are JSON; missing fields take their defaults
//! and [`SessionConfig::sanitized`] clamps out-of-range values.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cone::ConeParams;
use crate::error::ConfigError;
use crate::render::{MarchConfig, RendererKind};
use crate::volume::{ExtinctionVolumeBuilder, PyramidResolution};

/// Configuration of a rendering session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Active renderer
    pub renderer: RendererKind,
    /// Extinction pyramid parameters
    pub pyramid: ExtinctionVolumeBuilder,
    /// Occlusion cone
    pub occlusion: ConeParams,
    /// Shadow cone
    pub shadow: ConeParams,
    /// Derive initial step and covered distance from `sigma0` and the volume diagonal
    pub scene_relative_cones: bool,
    /// Ray marching
    pub march: MarchConfig,
    /// Output width
    pub width: usize,
    /// Output height
    pub height: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            renderer: RendererKind::ConeOcclusion,
            pyramid: ExtinctionVolumeBuilder::default(),
            occlusion: ConeParams::occlusion(),
            shadow: ConeParams::shadow(),
            scene_relative_cones: true,
            march: MarchConfig::default(),
            width: 256,
            height: 256,
        }
    }
}

impl SessionConfig {
    /// Copy with every field clamped to its valid range
    ///
    /// A non-positive or non-finite `sigma0` falls back to 1.0 and custom
    /// resolution axes are raised to at least 1.
    pub fn sanitized(mut self) -> Self {
        if !(self.pyramid.sigma0.is_finite() && self.pyramid.sigma0 > 0.0) {
            self.pyramid.sigma0 = 1.0;
        }
        if let PyramidResolution::Custom(res) = self.pyramid.resolution {
            self.pyramid.resolution = PyramidResolution::Custom(res.map(|r| r.max(1)));
        }
        self.occlusion = self.occlusion.sanitized();
        self.shadow = self.shadow.sanitized();
        self.march = self.march.sanitized();
        self
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: SessionConfig = serde_json::from_reader(reader)?;
        Ok(config.sanitized())
    }

    /// Save as a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
