//! Frame scheduling: the host's "run before next paint" primitive.
//!
//! The engine asks its scheduler for exactly one pending callback at a time
//! and cancels it on stop. Hosts then call `Engine::on_frame` when the
//! callback fires.

use crate::error::SchedulerError;

/// Handle for one pending frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

pub trait FrameScheduler {
    fn request_frame(&mut self) -> Result<FrameRequest, SchedulerError>;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Scheduler driven by hand: requests are only recorded, the owner decides
/// when frames fire. Used for offline renders and tests.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    outstanding: Option<FrameRequest>,
    requested: u64,
    cancelled: u64,
    refuse: bool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request the engine is currently waiting on, if any.
    pub fn outstanding(&self) -> Option<FrameRequest> {
        self.outstanding
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }

    /// Makes every further `request_frame` fail, as a torn-down host would.
    pub fn refuse_requests(&mut self) {
        self.refuse = true;
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> Result<FrameRequest, SchedulerError> {
        if self.refuse {
            return Err(SchedulerError::new("host refused frame request"));
        }
        self.next_id += 1;
        self.requested += 1;
        let request = FrameRequest(self.next_id);
        self.outstanding = Some(request);
        Ok(request)
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.outstanding == Some(request) {
            self.outstanding = None;
        }
        self.cancelled += 1;
    }
}

/// Timestamps for a fixed frame rate, in milliseconds, for hosts without a
/// paint callback (offline export, fixed-rate timers).
#[derive(Debug, Clone, Copy)]
pub struct FixedStepClock {
    fps: f64,
    start_ms: f64,
}

pub const DEFAULT_FPS: f64 = 60.0;

impl FixedStepClock {
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS };
        Self { fps, start_ms: 0.0 }
    }

    pub fn starting_at(mut self, start_ms: f64) -> Self {
        self.start_ms = start_ms;
        self
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.fps
    }

    pub fn timestamp_ms(&self, frame: u64) -> f64 {
        self.start_ms + frame as f64 * self.frame_interval_ms()
    }
}

impl Default for FixedStepClock {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

/// Native preview scheduler: a redraw request on the winit window is the
/// frame callback. Redraws cannot be withdrawn, so cancelling is a no-op and
/// the engine ignores the stray callback.
#[cfg(not(target_arch = "wasm32"))]
pub struct RedrawScheduler {
    window: std::sync::Arc<winit::window::Window>,
    next_id: u64,
}

#[cfg(not(target_arch = "wasm32"))]
impl RedrawScheduler {
    pub fn new(window: std::sync::Arc<winit::window::Window>) -> Self {
        Self { window, next_id: 0 }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) -> Result<FrameRequest, SchedulerError> {
        self.window.request_redraw();
        self.next_id += 1;
        Ok(FrameRequest(self.next_id))
    }

    fn cancel_frame(&mut self, _request: FrameRequest) {}
}

/// Browser scheduler backed by `requestAnimationFrame`.
///
/// The callback closure is installed after the engine exists, since it
/// needs a handle back to it.
#[cfg(target_arch = "wasm32")]
pub struct AnimationFrameScheduler {
    window: web_sys::Window,
    callback: std::rc::Rc<std::cell::RefCell<Option<wasm_bindgen::closure::Closure<dyn FnMut(f64)>>>>,
}

#[cfg(target_arch = "wasm32")]
impl AnimationFrameScheduler {
    pub fn new(window: web_sys::Window) -> Self {
        Self {
            window,
            callback: std::rc::Rc::new(std::cell::RefCell::new(None)),
        }
    }

    pub fn set_callback(&self, callback: wasm_bindgen::closure::Closure<dyn FnMut(f64)>) {
        *self.callback.borrow_mut() = Some(callback);
    }
}

#[cfg(target_arch = "wasm32")]
impl FrameScheduler for AnimationFrameScheduler {
    fn request_frame(&mut self) -> Result<FrameRequest, SchedulerError> {
        use wasm_bindgen::JsCast;

        let callback = self.callback.borrow();
        let callback = callback
            .as_ref()
            .ok_or_else(|| SchedulerError::new("frame callback not installed"))?;
        let id = self
            .window
            .request_animation_frame(callback.as_ref().unchecked_ref())
            .map_err(|e| SchedulerError::new(format!("requestAnimationFrame failed: {:?}", e)))?;
        Ok(FrameRequest(id as u32 as u64))
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if let Err(e) = self.window.cancel_animation_frame(request.0 as u32 as i32) {
            log::warn!("cancelAnimationFrame failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_tracks_outstanding() {
        let mut s = ManualScheduler::new();
        let a = s.request_frame().unwrap();
        let b = s.request_frame().unwrap();
        assert_ne!(a, b);
        assert_eq!(s.outstanding(), Some(b));

        s.cancel_frame(a);
        assert_eq!(s.outstanding(), Some(b));
        s.cancel_frame(b);
        assert_eq!(s.outstanding(), None);
        assert_eq!((s.requested(), s.cancelled()), (2, 2));
    }

    #[test]
    fn test_refused_requests() {
        let mut s = ManualScheduler::new();
        s.refuse_requests();
        assert!(s.request_frame().is_err());
    }

    #[test]
    fn test_fixed_step_clock() {
        let clock = FixedStepClock::new(50.0).starting_at(1000.0);
        assert_eq!(clock.frame_interval_ms(), 20.0);
        assert_eq!(clock.timestamp_ms(0), 1000.0);
        assert_eq!(clock.timestamp_ms(3), 1060.0);
        assert_eq!(FixedStepClock::new(0.0).fps(), DEFAULT_FPS);
    }
}
