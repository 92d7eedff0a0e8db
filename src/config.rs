//! Background configuration file.
//!
//! A JSON document describing one background: which preset, its colours and
//! slider positions, and the output geometry used by offline renders.

use serde::{Deserialize, Serialize};

use crate::gpu::shaders::ScenePreset;
use crate::params::{
    slider_to_scalar, ParameterField, ParameterStore, Rgb, DEFAULT_BACKGROUND, DEFAULT_BLOB,
    DEFAULT_BLOB_COUNT, SLIDER_MAX_TICK,
};

/// Default slider position for size and speed (the middle of the range).
fn default_tick() -> f32 {
    5.0
}

fn default_background() -> Rgb {
    DEFAULT_BACKGROUND
}

fn default_blob_color() -> Rgb {
    DEFAULT_BLOB
}

fn default_blob_count() -> usize {
    DEFAULT_BLOB_COUNT
}

fn default_fps() -> f64 {
    60.0
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_frames() -> u32 {
    120
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    #[serde(default)]
    pub preset: ScenePreset,

    #[serde(default = "default_background")]
    pub background_color: Rgb,

    #[serde(default = "default_blob_color")]
    pub blob_color: Rgb,

    /// Slider tick in `[0, 10]`.
    #[serde(default = "default_tick")]
    pub blob_size: f32,

    /// Slider tick in `[0, 10]`.
    #[serde(default = "default_tick")]
    pub speed: f32,

    #[serde(default = "default_blob_count")]
    pub blob_count: usize,

    /// Blob placement seed. None picks a fresh layout every run.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Frame count for offline renders.
    #[serde(default = "default_frames")]
    pub frames: u32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            preset: ScenePreset::default(),
            background_color: default_background(),
            blob_color: default_blob_color(),
            blob_size: default_tick(),
            speed: default_tick(),
            blob_count: default_blob_count(),
            seed: None,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            frames: default_frames(),
        }
    }
}

impl BackgroundConfig {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_file(path: &std::path::Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;
        Self::from_json(&content).map_err(|e| format!("Failed to parse config file {:?}: {}", path, e))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=SLIDER_MAX_TICK).contains(&self.blob_size) {
            return Err(format!("blobSize must be within 0..={}", SLIDER_MAX_TICK));
        }
        if !(0.0..=SLIDER_MAX_TICK).contains(&self.speed) {
            return Err(format!("speed must be within 0..={}", SLIDER_MAX_TICK));
        }
        if !(self.fps > 0.0) {
            return Err("FPS must be positive".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err("Width and height must be positive".to_string());
        }
        Ok(())
    }

    /// Writes every parameter into `store`, normalizing slider ticks.
    pub fn apply(&self, store: &ParameterStore) {
        let colors = [
            (ParameterField::BackgroundColor, self.background_color),
            (ParameterField::BlobColor, self.blob_color),
        ];
        for (field, color) in colors {
            if let Err(e) = store.set_color(field, color) {
                log::warn!("{}", e);
            }
        }
        let scalars = [
            (ParameterField::GlobalSize, self.blob_size),
            (ParameterField::GlobalSpeed, self.speed),
        ];
        for (field, tick) in scalars {
            if let Err(e) = store.set_scalar(field, slider_to_scalar(tick)) {
                log::warn!("{}", e);
            }
        }
        store.set_blob_count(self.blob_count);
    }
}
