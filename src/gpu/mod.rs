pub mod backend;
pub mod pipeline;
pub mod program;
pub mod quad;
pub mod recording;
pub mod shaders;
pub mod uniforms;
pub mod validate;
pub mod wgpu_backend;
