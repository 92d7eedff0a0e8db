//! In-memory backend that records every call instead of touching a GPU.
//!
//! Shaders are still validated with naga, so compile and link failures
//! behave like a real context. Used by the test suite and by `glowfield check`.

use std::collections::HashSet;

use crate::error::SurfaceLostError;
use crate::gpu::backend::{DrawOutcome, GraphicsBackend, Primitive, ShaderStage};
use crate::gpu::quad::QuadVertex;
use crate::gpu::uniforms::FrameUniforms;
use crate::gpu::validate::{self, StageInterface};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    CreateShader { id: u32, stage: ShaderStage },
    CompileShader { id: u32, ok: bool },
    DeleteShader { id: u32 },
    CreateProgram { id: u32 },
    LinkProgram { id: u32, ok: bool },
    DeleteProgram { id: u32 },
    UploadQuad { vertex_count: usize },
    SetViewport { width: u32, height: u32 },
    UploadUniforms { program: u32, uniforms: Box<FrameUniforms> },
    Draw { program: u32, primitive: Primitive, vertex_count: u32 },
}

#[derive(Debug)]
pub struct RecordedShader {
    id: u32,
    stage: ShaderStage,
    interface: Option<StageInterface>,
}

#[derive(Debug)]
pub struct RecordedProgram {
    id: u32,
    linked: bool,
}

pub struct RecordingBackend {
    calls: Vec<RecordedCall>,
    next_id: u32,
    live_shaders: HashSet<u32>,
    live_programs: HashSet<u32>,
    surface_size: (u32, u32),
    quad_uploaded: bool,
    /// Draws left before the surface is reported lost.
    lose_surface_after: Option<usize>,
    /// Upcoming draws that report an unready surface.
    skip_draws: usize,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: Vec::new(),
            next_id: 1,
            live_shaders: HashSet::new(),
            live_programs: HashSet::new(),
            surface_size: (width, height),
            quad_uploaded: false,
            lose_surface_after: None,
            skip_draws: 0,
        }
    }

    /// Reports the surface lost once `draws` more draws have succeeded.
    pub fn lose_surface_after(&mut self, draws: usize) {
        self.lose_surface_after = Some(draws);
    }

    /// The next `draws` draws are skipped, as with an outdated surface.
    pub fn skip_next_draws(&mut self, draws: usize) {
        self.skip_draws = draws;
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn live_shaders(&self) -> usize {
        self.live_shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.live_programs.len()
    }

    /// `(primitive, vertex_count)` of every draw so far.
    pub fn draw_calls(&self) -> Vec<(Primitive, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Draw { primitive, vertex_count, .. } => Some((*primitive, *vertex_count)),
                _ => None,
            })
            .collect()
    }

    pub fn last_uniforms(&self) -> Option<&FrameUniforms> {
        self.calls.iter().rev().find_map(|c| match c {
            RecordedCall::UploadUniforms { uniforms, .. } => Some(uniforms.as_ref()),
            _ => None,
        })
    }

    pub fn last_viewport(&self) -> Option<(u32, u32)> {
        self.calls.iter().rev().find_map(|c| match c {
            RecordedCall::SetViewport { width, height } => Some((*width, *height)),
            _ => None,
        })
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsBackend for RecordingBackend {
    type Shader = RecordedShader;
    type Program = RecordedProgram;

    fn create_shader(&mut self, stage: ShaderStage) -> RecordedShader {
        let id = self.allocate_id();
        self.live_shaders.insert(id);
        self.calls.push(RecordedCall::CreateShader { id, stage });
        RecordedShader { id, stage, interface: None }
    }

    fn compile_shader(&mut self, shader: &mut RecordedShader, source: &str) -> Result<(), String> {
        let result = validate::compile_stage(shader.stage, source);
        self.calls.push(RecordedCall::CompileShader { id: shader.id, ok: result.is_ok() });
        shader.interface = Some(result?);
        Ok(())
    }

    fn delete_shader(&mut self, shader: RecordedShader) {
        self.live_shaders.remove(&shader.id);
        self.calls.push(RecordedCall::DeleteShader { id: shader.id });
    }

    fn create_program(&mut self) -> RecordedProgram {
        let id = self.allocate_id();
        self.live_programs.insert(id);
        self.calls.push(RecordedCall::CreateProgram { id });
        RecordedProgram { id, linked: false }
    }

    fn link_program(
        &mut self,
        program: &mut RecordedProgram,
        vertex: &RecordedShader,
        fragment: &RecordedShader,
    ) -> Result<(), String> {
        let result = match (&vertex.interface, &fragment.interface) {
            (Some(vs), Some(fs)) => validate::link_stages(vs, fs),
            _ => Err("attached shader was never compiled".to_string()),
        };
        program.linked = result.is_ok();
        self.calls.push(RecordedCall::LinkProgram { id: program.id, ok: program.linked });
        result
    }

    fn delete_program(&mut self, program: RecordedProgram) {
        self.live_programs.remove(&program.id);
        self.calls.push(RecordedCall::DeleteProgram { id: program.id });
    }

    fn upload_quad(&mut self, vertices: &[QuadVertex]) -> Result<(), String> {
        self.quad_uploaded = true;
        self.calls.push(RecordedCall::UploadQuad { vertex_count: vertices.len() });
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.calls.push(RecordedCall::SetViewport { width, height });
    }

    fn upload_uniforms(&mut self, program: &RecordedProgram, uniforms: &FrameUniforms) {
        self.calls.push(RecordedCall::UploadUniforms {
            program: program.id,
            uniforms: Box::new(*uniforms),
        });
    }

    fn draw(
        &mut self,
        program: &RecordedProgram,
        primitive: Primitive,
        vertex_count: u32,
    ) -> Result<DrawOutcome, SurfaceLostError> {
        if !program.linked || !self.live_programs.contains(&program.id) {
            return Err(SurfaceLostError::new("draw with a program that is not live"));
        }
        if !self.quad_uploaded {
            return Err(SurfaceLostError::new("draw before geometry upload"));
        }
        match self.lose_surface_after {
            Some(0) => return Err(SurfaceLostError::new("context lost")),
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        if self.skip_draws > 0 {
            self.skip_draws -= 1;
            return Ok(DrawOutcome::Skipped);
        }
        self.calls.push(RecordedCall::Draw { program: program.id, primitive, vertex_count });
        Ok(DrawOutcome::Drawn)
    }
}
