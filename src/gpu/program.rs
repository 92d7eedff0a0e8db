//! Shader program management: compile two stages, link them, own the result.

use crate::error::{CompileError, InitError, LinkError};
use crate::gpu::backend::{GraphicsBackend, ShaderStage};
use crate::gpu::shaders::ShaderSources;

/// Owns the single linked program an engine draws with.
///
/// Failures are final: no retries, no fallback sources. Every object created
/// on the backend is deleted again on the failure paths.
pub struct ShaderProgramManager<B: GraphicsBackend> {
    program: Option<B::Program>,
}

impl<B: GraphicsBackend> ShaderProgramManager<B> {
    pub fn new() -> Self {
        Self { program: None }
    }

    pub fn compile(
        &self,
        backend: &mut B,
        stage: ShaderStage,
        source: &str,
    ) -> Result<B::Shader, CompileError> {
        let mut shader = backend.create_shader(stage);
        match backend.compile_shader(&mut shader, source) {
            Ok(()) => Ok(shader),
            Err(log) => {
                backend.delete_shader(shader);
                Err(CompileError { stage, log })
            }
        }
    }

    pub fn link(
        &self,
        backend: &mut B,
        vertex: &B::Shader,
        fragment: &B::Shader,
    ) -> Result<B::Program, LinkError> {
        let mut program = backend.create_program();
        match backend.link_program(&mut program, vertex, fragment) {
            Ok(()) => Ok(program),
            Err(log) => {
                backend.delete_program(program);
                Err(LinkError { log })
            }
        }
    }

    /// Compiles and links `sources`, replacing any previously held program.
    /// Shader objects are deleted once linking has been attempted.
    pub fn build(&mut self, backend: &mut B, sources: &ShaderSources) -> Result<(), InitError> {
        let vertex = self.compile(backend, ShaderStage::Vertex, &sources.vertex)?;
        let fragment = match self.compile(backend, ShaderStage::Fragment, &sources.fragment) {
            Ok(shader) => shader,
            Err(e) => {
                backend.delete_shader(vertex);
                return Err(e.into());
            }
        };

        let linked = self.link(backend, &vertex, &fragment);
        backend.delete_shader(vertex);
        backend.delete_shader(fragment);
        let program = linked?;

        self.release(backend);
        self.program = Some(program);
        log::info!("shader program '{}' linked", sources.label);
        Ok(())
    }

    pub fn program(&self) -> Option<&B::Program> {
        self.program.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    pub fn release(&mut self, backend: &mut B) {
        if let Some(program) = self.program.take() {
            backend.delete_program(program);
        }
    }
}

impl<B: GraphicsBackend> Default for ShaderProgramManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingBackend;
    use crate::gpu::shaders::ScenePreset;

    #[test]
    fn test_build_preset_leaves_only_program() {
        let mut backend = RecordingBackend::new(320, 200);
        let mut manager = ShaderProgramManager::new();
        manager
            .build(&mut backend, &ScenePreset::Blobs.sources())
            .unwrap();
        assert!(manager.is_linked());
        assert_eq!(backend.live_shaders(), 0);
        assert_eq!(backend.live_programs(), 1);

        manager.release(&mut backend);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_compile_failure_releases_shader() {
        let mut backend = RecordingBackend::new(320, 200);
        let manager = ShaderProgramManager::<RecordingBackend>::new();
        let err = manager
            .compile(&mut backend, ShaderStage::Fragment, "@fragment fn fs_main( {")
            .unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(!err.log.is_empty());
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn test_fragment_failure_releases_vertex() {
        let mut backend = RecordingBackend::new(320, 200);
        let mut manager = ShaderProgramManager::new();
        let mut sources = ScenePreset::Blobs.sources();
        sources.fragment = "not wgsl".to_string();

        let err = manager.build(&mut backend, &sources).unwrap_err();
        assert!(matches!(err, InitError::Compile(CompileError { stage: ShaderStage::Fragment, .. })));
        assert_eq!(backend.live_shaders(), 0);
        assert_eq!(backend.live_programs(), 0);
        assert!(!manager.is_linked());
    }

    #[test]
    fn test_link_failure_releases_everything() {
        let mut backend = RecordingBackend::new(320, 200);
        let mut manager = ShaderProgramManager::new();
        let mut sources = ScenePreset::Blobs.sources();
        sources.fragment = r#"
@fragment
fn fs_main(@location(3) shade: f32) -> @location(0) vec4<f32> {
    return vec4<f32>(shade, shade, shade, 1.0);
}
"#
        .to_string();

        let err = manager.build(&mut backend, &sources).unwrap_err();
        assert!(matches!(err, InitError::Link(_)));
        assert_eq!(backend.live_shaders(), 0);
        assert_eq!(backend.live_programs(), 0);
    }
}
