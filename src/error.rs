//! Error types for the engine, its backends and the frame compositor.
//!
//! Initialization errors are returned synchronously from `Engine::init`.
//! Per-frame errors stop the loop and are returned from `Engine::on_frame`.

use std::fmt;

use crate::gpu::backend::ShaderStage;
use crate::params::ParameterField;

/// A shader stage failed to compile. Carries the backend's diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} shader failed to compile: {}", self.stage, self.log)
    }
}

impl std::error::Error for CompileError {}

/// A vertex/fragment pair failed to link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkError {
    pub log: String,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program failed to link: {}", self.log)
    }
}

impl std::error::Error for LinkError {}

/// Everything that can stop `Engine::init` from producing an engine.
#[derive(Debug)]
pub enum InitError {
    Compile(CompileError),
    Link(LinkError),
    /// The draw surface rejected the geometry upload or is unusable.
    Surface(String),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Compile(e) => write!(f, "engine init failed: {}", e),
            InitError::Link(e) => write!(f, "engine init failed: {}", e),
            InitError::Surface(msg) => write!(f, "engine init failed: surface unusable: {}", msg),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Compile(e) => Some(e),
            InitError::Link(e) => Some(e),
            InitError::Surface(_) => None,
        }
    }
}

impl From<CompileError> for InitError {
    fn from(e: CompileError) -> Self {
        InitError::Compile(e)
    }
}

impl From<LinkError> for InitError {
    fn from(e: LinkError) -> Self {
        InitError::Link(e)
    }
}

/// The drawing surface or its context became invalid mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLostError {
    pub reason: String,
}

impl SurfaceLostError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl fmt::Display for SurfaceLostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draw surface lost: {}", self.reason)
    }
}

impl std::error::Error for SurfaceLostError {}

/// The host refused to schedule another frame callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerError {
    pub message: String,
}

impl SchedulerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame scheduling failed: {}", self.message)
    }
}

impl std::error::Error for SchedulerError {}

/// Fatal per-frame failure. The loop is stopped when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    SurfaceLost(SurfaceLostError),
    Schedule(SchedulerError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::SurfaceLost(e) => e.fmt(f),
            FrameError::Schedule(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::SurfaceLost(e) => Some(e),
            FrameError::Schedule(e) => Some(e),
        }
    }
}

impl From<SurfaceLostError> for FrameError {
    fn from(e: SurfaceLostError) -> Self {
        FrameError::SurfaceLost(e)
    }
}

impl From<SchedulerError> for FrameError {
    fn from(e: SchedulerError) -> Self {
        FrameError::Schedule(e)
    }
}

/// Control-API errors (`start` after a fatal frame error, and the like).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A previous frame failed fatally; the engine will not run again.
    Faulted(FrameError),
    /// `shutdown` already released the program.
    ShutDown,
    Schedule(SchedulerError),
    Parameter(ParameterError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Faulted(e) => write!(f, "engine faulted earlier: {}", e),
            EngineError::ShutDown => write!(f, "engine has been shut down"),
            EngineError::Schedule(e) => e.fmt(f),
            EngineError::Parameter(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParameterError> for EngineError {
    fn from(e: ParameterError) -> Self {
        EngineError::Parameter(e)
    }
}

impl From<SchedulerError> for EngineError {
    fn from(e: SchedulerError) -> Self {
        EngineError::Schedule(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterError {
    InvalidHex(String),
    TypeMismatch {
        field: ParameterField,
        expected: &'static str,
    },
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::InvalidHex(s) => write!(f, "invalid hex colour '{}'", s),
            ParameterError::TypeMismatch { field, expected } => {
                write!(f, "parameter {:?} expects a {} value", field, expected)
            }
        }
    }
}

impl std::error::Error for ParameterError {}

/// Non-fatal: the compositor falls back to a background-only frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    Unavailable(String),
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentationError::Unavailable(msg) => write!(f, "segmentation unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SegmentationError {}

/// GPU setup failures for the wgpu backend (adapter, device, surface, readback).
#[derive(Debug)]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graphics backend error: {}", self.message)
    }
}

impl std::error::Error for BackendError {}
