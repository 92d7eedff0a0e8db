//! The animation loop.
//!
//! An [`Engine`] owns one backend (its draw surface), one scheduler, the
//! compiled program and the scene. Each frame it snapshots the parameter
//! store, reconciles the scene, uploads uniforms, draws the full-screen quad
//! and asks the scheduler for the next callback.
//!
//! ```text
//! init ──> Ready ──start──> Running ──stop──> Stopped ──start──> Running
//!                              │
//!                              └── frame error ──> Stopped (faulted)
//! ```

use std::sync::mpsc;
use std::sync::Arc;

use crate::error::{EngineError, FrameError, InitError};
use crate::gpu::backend::{DrawOutcome, GraphicsBackend, Primitive};
use crate::gpu::program::ShaderProgramManager;
use crate::gpu::quad::{FULLSCREEN_QUAD, QUAD_VERTEX_COUNT};
use crate::gpu::shaders::ShaderSources;
use crate::gpu::uniforms::FrameUniforms;
use crate::params::{ParamValue, ParameterField, ParameterStore};
use crate::scene::SceneModel;
use crate::schedule::{FrameRequest, FrameScheduler};

/// Converts host timestamps (milliseconds) to the seconds-scale time the
/// shaders' orbit speeds are tuned against.
pub const TIME_SCALE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Running,
    Stopped,
}

/// Optional knobs for [`Engine::init_with`].
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Seed for blob randomization. `None` seeds from the host.
    pub seed: Option<u64>,
    /// Store shared with UI controls. A fresh one is created when `None`.
    pub params: Option<Arc<ParameterStore>>,
}

pub struct Engine<B: GraphicsBackend, S: FrameScheduler> {
    backend: B,
    scheduler: S,
    programs: ShaderProgramManager<B>,
    params: Arc<ParameterStore>,
    scene: SceneModel,
    state: EngineState,
    pending: Option<FrameRequest>,
    viewport: (u32, u32),
    elapsed: f32,
    frames_drawn: u64,
    fault: Option<FrameError>,
    status_tx: Option<mpsc::Sender<EngineState>>,
}

impl<B: GraphicsBackend, S: FrameScheduler> Engine<B, S> {
    pub fn init(backend: B, scheduler: S, sources: &ShaderSources) -> Result<Self, InitError> {
        Self::init_with(backend, scheduler, sources, EngineOptions::default())
    }

    /// Compiles and links `sources`, uploads the quad and binds the surface.
    /// On error nothing is left allocated on the backend.
    pub fn init_with(
        mut backend: B,
        scheduler: S,
        sources: &ShaderSources,
        options: EngineOptions,
    ) -> Result<Self, InitError> {
        let mut programs = ShaderProgramManager::new();
        programs.build(&mut backend, sources)?;

        if let Err(msg) = backend.upload_quad(&FULLSCREEN_QUAD) {
            programs.release(&mut backend);
            return Err(InitError::Surface(msg));
        }

        let params = options.params.unwrap_or_else(|| Arc::new(ParameterStore::new()));
        let mut scene = match options.seed {
            Some(seed) => SceneModel::with_seed(seed),
            None => SceneModel::new(),
        };
        scene.reconcile(params.blob_count());
        let viewport = backend.surface_size();

        log::info!(
            "engine ready: '{}' at {}x{}, {} blobs",
            sources.label,
            viewport.0,
            viewport.1,
            scene.len()
        );

        Ok(Self {
            backend,
            scheduler,
            programs,
            params,
            scene,
            state: EngineState::Ready,
            pending: None,
            viewport,
            elapsed: 0.0,
            frames_drawn: 0,
            fault: None,
            status_tx: None,
        })
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        if let Some(fault) = &self.fault {
            return Err(EngineError::Faulted(fault.clone()));
        }
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        if self.state == EngineState::Running {
            return Ok(());
        }
        self.pending = Some(self.scheduler.request_frame()?);
        self.transition(EngineState::Running);
        Ok(())
    }

    /// Idempotent. Once this returns no earlier callback will draw.
    pub fn stop(&mut self) {
        if let Some(request) = self.pending.take() {
            self.scheduler.cancel_frame(request);
        }
        if self.state == EngineState::Running {
            self.transition(EngineState::Stopped);
        }
    }

    /// Frame callback body. `timestamp_ms` is the host's monotonic clock.
    ///
    /// Callbacks that arrive while stopped, or with no request outstanding,
    /// are ignored. Failures stop the loop and are returned.
    pub fn on_frame(&mut self, timestamp_ms: f64) -> Result<(), FrameError> {
        if self.state != EngineState::Running || self.pending.take().is_none() {
            log::trace!("ignoring stale frame callback");
            return Ok(());
        }

        if let Err(err) = self.render_frame(timestamp_ms) {
            self.fail(err.clone());
            return Err(err);
        }

        match self.scheduler.request_frame() {
            Ok(request) => {
                self.pending = Some(request);
                Ok(())
            }
            Err(e) => {
                let err = FrameError::from(e);
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    fn render_frame(&mut self, timestamp_ms: f64) -> Result<(), FrameError> {
        let snapshot = self.params.snapshot();
        self.scene.reconcile(snapshot.blob_count);
        self.elapsed = (timestamp_ms * TIME_SCALE) as f32;

        let (width, height) = self.viewport;
        if width == 0 || height == 0 {
            log::debug!("viewport is {}x{}; skipping draw", width, height);
            return Ok(());
        }

        let program = match self.programs.program() {
            Some(p) => p,
            None => return Ok(()),
        };
        let uniforms = FrameUniforms::compose(&snapshot, self.scene.snapshot(), self.viewport, self.elapsed);
        self.backend.set_viewport(width, height);
        self.backend.upload_uniforms(program, &uniforms);
        match self.backend.draw(program, Primitive::Triangles, QUAD_VERTEX_COUNT)? {
            DrawOutcome::Drawn => self.frames_drawn += 1,
            DrawOutcome::Skipped => log::trace!("frame at {}ms not presented", timestamp_ms),
        }
        Ok(())
    }

    fn fail(&mut self, err: FrameError) {
        log::error!("render loop stopped: {}", err);
        self.fault = Some(err);
        self.stop();
    }

    /// Generic control entry point for UI collaborators.
    pub fn set_parameter(&mut self, field: ParameterField, value: ParamValue) -> Result<(), EngineError> {
        self.params.set(field, value)?;
        if field == ParameterField::BlobCount {
            self.scene.reconcile(self.params.blob_count());
        }
        Ok(())
    }

    /// Takes effect on the next frame; never draws synchronously.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        log::debug!("resize to {}x{}", width, height);
        self.viewport = (width, height);
    }

    /// Replaces the status subscriber. Only the latest receiver gets
    /// transitions, each one in order.
    pub fn subscribe(&mut self) -> mpsc::Receiver<EngineState> {
        let (tx, rx) = mpsc::channel();
        self.status_tx = Some(tx);
        rx
    }

    fn transition(&mut self, next: EngineState) {
        log::info!("engine {:?} -> {:?}", self.state, next);
        self.state = next;
        if let Some(tx) = &self.status_tx {
            if tx.send(next).is_err() {
                self.status_tx = None;
            }
        }
    }

    /// Stops the loop and releases the program. Also done on drop.
    /// The engine cannot be started again afterwards.
    pub fn shutdown(&mut self) {
        self.stop();
        if self.programs.is_linked() {
            self.programs.release(&mut self.backend);
            log::info!("engine shut down after {} frames", self.frames_drawn);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        !self.programs.is_linked()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn fault(&self) -> Option<&FrameError> {
        self.fault.as_ref()
    }

    pub fn params(&self) -> Arc<ParameterStore> {
        Arc::clone(&self.params)
    }

    pub fn scene(&self) -> &SceneModel {
        &self.scene
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Seconds-scale time passed to the last frame's shader.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}

impl<B: GraphicsBackend, S: FrameScheduler> Drop for Engine<B, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
