pub mod error;
pub mod gpu;
pub mod params;
pub mod scene;
pub mod schedule;
pub mod engine;
pub mod compositor;
pub mod config;

pub use engine::{Engine, EngineOptions, EngineState};
pub use params::{ParamValue, ParameterField, ParameterStore, Rgb};

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
