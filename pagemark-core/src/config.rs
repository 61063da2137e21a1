use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::debug;

use crate::error::{AnnotateError, Result};
use crate::raster::Color;

pub const DEFAULT_WORKING_SCALE: f32 = 2.0;
/// Largest accepted pen width, check-mark size and text size, in raster pixels.
pub const MAX_GLYPH_SIZE: f32 = 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Uniform multiplier applied when rendering a source into page rasters.
    pub working_scale: f32,
    pub pen: PenConfig,
    pub check: CheckConfig,
    pub text: TextConfig,
    /// Names offered as one-key text stamps.
    pub quick_stamps: Vec<String>,
    pub default_export_name: String,
    pub pdfium_library: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_scale: DEFAULT_WORKING_SCALE,
            pen: PenConfig::default(),
            check: CheckConfig::default(),
            text: TextConfig::default(),
            quick_stamps: Vec::new(),
            default_export_name: "annotated".to_owned(),
            pdfium_library: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenConfig {
    pub width: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub color: Color,
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            width: 2.0,
            color: Color::BLACK,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub size: f32,
    pub thickness: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub color: Color,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            size: 30.0,
            thickness: 3.0,
            color: Color::BLACK,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub size: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub color: Color,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            size: 24.0,
            color: Color::BLACK,
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(source).map_err(|err| AnnotateError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let source = fs::read_to_string(path)
            .map_err(|err| AnnotateError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml(&source)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("working_scale", self.working_scale),
            ("pen.width", self.pen.width),
            ("check.size", self.check.size),
            ("check.thickness", self.check.thickness),
            ("text.size", self.text.size),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnnotateError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        let bounded = [
            ("pen.width", self.pen.width),
            ("check.size", self.check.size),
            ("check.thickness", self.check.thickness),
            ("text.size", self.text.size),
        ];
        for (name, value) in bounded {
            if value > MAX_GLYPH_SIZE {
                return Err(AnnotateError::Config(format!(
                    "{name} must not exceed {MAX_GLYPH_SIZE}, got {value}"
                )));
            }
        }
        if let Some(index) = self
            .quick_stamps
            .iter()
            .position(|name| name.trim().is_empty())
        {
            return Err(AnnotateError::Config(format!(
                "quick_stamps[{index}] must not be blank"
            )));
        }
        if self.default_export_name.trim().is_empty() {
            return Err(AnnotateError::Config(
                "default_export_name must not be blank".to_owned(),
            ));
        }
        Ok(())
    }
}
