//! The drawing-surface seam between the engine and a graphics API.
//!
//! The shape is deliberately close to a WebGL context: shader and program
//! objects are created, compiled or linked, and explicitly deleted, so the
//! program manager can guarantee that failed objects are released.

use std::fmt;

use crate::error::SurfaceLostError;
use crate::gpu::quad::QuadVertex;
use crate::gpu::uniforms::FrameUniforms;

/// Vertex entry point every program's vertex stage must export.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Fragment entry point every program's fragment stage must export.
pub const FRAGMENT_ENTRY: &str = "fs_main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => VERTEX_ENTRY,
            ShaderStage::Fragment => FRAGMENT_ENTRY,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
}

/// Result of a draw that did not fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn,
    /// The surface was not ready (outdated or timed out); nothing was presented.
    Skipped,
}

/// A GPU context bound to one draw surface.
pub trait GraphicsBackend {
    type Shader;
    type Program;

    fn create_shader(&mut self, stage: ShaderStage) -> Self::Shader;
    /// Compiles `source` into `shader`. On failure returns the diagnostic log;
    /// the shader object stays alive until `delete_shader`.
    fn compile_shader(&mut self, shader: &mut Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: Self::Shader);

    fn create_program(&mut self) -> Self::Program;
    fn link_program(
        &mut self,
        program: &mut Self::Program,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<(), String>;
    fn delete_program(&mut self, program: Self::Program);

    /// Uploads the static geometry drawn every frame.
    fn upload_quad(&mut self, vertices: &[QuadVertex]) -> Result<(), String>;

    /// Current pixel size of the surface.
    fn surface_size(&self) -> (u32, u32);
    fn set_viewport(&mut self, width: u32, height: u32);
    fn upload_uniforms(&mut self, program: &Self::Program, uniforms: &FrameUniforms);
    fn draw(
        &mut self,
        program: &Self::Program,
        primitive: Primitive,
        vertex_count: u32,
    ) -> Result<DrawOutcome, SurfaceLostError>;
}
