//! Built-in scene presets and their WGSL sources.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

const FULLSCREEN_VS: &str = include_str!("shader_fullscreen.wgsl");
const BLOBS_FS: &str = include_str!("shader_blobs.wgsl");
const SNOWY_DAY_FS: &str = include_str!("shader_snowy_day.wgsl");

/// Vertex + fragment source text for one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn new(label: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Reads a user-supplied fragment shader, paired with the built-in
    /// full-screen vertex shader unless `vertex` is given too.
    pub fn from_files(fragment: &Path, vertex: Option<&Path>) -> std::io::Result<Self> {
        let fragment_src = std::fs::read_to_string(fragment)?;
        let vertex_src = match vertex {
            Some(path) => std::fs::read_to_string(path)?,
            None => FULLSCREEN_VS.to_string(),
        };
        Ok(Self::new(fragment.display().to_string(), vertex_src, fragment_src))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(not(target_arch = "wasm32"), derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ScenePreset {
    /// Orbiting metaballs over a flat background.
    #[default]
    Blobs,
    /// Sun and moon crossing the sky with layered snowfall.
    SnowyDay,
}

impl ScenePreset {
    pub fn sources(self) -> ShaderSources {
        let fragment = match self {
            ScenePreset::Blobs => BLOBS_FS,
            ScenePreset::SnowyDay => SNOWY_DAY_FS,
        };
        ShaderSources::new(self.to_string(), FULLSCREEN_VS, fragment)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "blobs" => Some(ScenePreset::Blobs),
            "snowy-day" | "snowy_day" | "snowyday" => Some(ScenePreset::SnowyDay),
            _ => None,
        }
    }
}

impl fmt::Display for ScenePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenePreset::Blobs => write!(f, "blobs"),
            ScenePreset::SnowyDay => write!(f, "snowy-day"),
        }
    }
}
