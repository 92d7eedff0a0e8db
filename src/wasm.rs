use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

use crate::engine::{Engine, EngineOptions, EngineState};
use crate::gpu::shaders::ScenePreset;
use crate::gpu::wgpu_backend::WgpuBackend;
use crate::params::{slider_to_scalar, ParamValue, ParameterField, ParameterStore, Rgb};
use crate::schedule::AnimationFrameScheduler;

type CanvasEngine = Engine<WgpuBackend, AnimationFrameScheduler>;

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// One animated background bound to one canvas.
#[wasm_bindgen]
pub struct WasmBackground {
    inner: Rc<RefCell<CanvasEngine>>,
    params: Arc<ParameterStore>,
}

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

#[wasm_bindgen]
impl WasmBackground {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmBackground, JsValue> {
        Err(JsValue::from_str("Use create_background async constructor"))
    }

    pub fn start(&self) -> Result<(), JsValue> {
        self.inner.borrow_mut().start().map_err(to_js)
    }

    pub fn stop(&self) {
        self.inner.borrow_mut().stop();
    }

    pub fn set_background_color(&self, hex: &str) -> Result<(), JsValue> {
        let color = Rgb::from_hex(hex).map_err(to_js)?;
        self.params
            .set_color(ParameterField::BackgroundColor, color)
            .map_err(to_js)
    }

    pub fn set_blob_color(&self, hex: &str) -> Result<(), JsValue> {
        let color = Rgb::from_hex(hex).map_err(to_js)?;
        self.params
            .set_color(ParameterField::BlobColor, color)
            .map_err(to_js)
    }

    /// Slider tick in 0..=10.
    pub fn set_blob_size(&self, tick: f32) -> Result<(), JsValue> {
        self.params
            .set_scalar(ParameterField::GlobalSize, slider_to_scalar(tick))
            .map_err(to_js)
    }

    /// Slider tick in 0..=10.
    pub fn set_speed(&self, tick: f32) -> Result<(), JsValue> {
        self.params
            .set_scalar(ParameterField::GlobalSpeed, slider_to_scalar(tick))
            .map_err(to_js)
    }

    pub fn set_blob_count(&self, count: u32) -> Result<(), JsValue> {
        self.inner
            .borrow_mut()
            .set_parameter(ParameterField::BlobCount, ParamValue::Count(count as usize))
            .map_err(to_js)
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.inner.borrow_mut().notify_resize(width, height);
    }

    /// "ready", "running" or "stopped".
    pub fn state(&self) -> String {
        match self.inner.borrow().state() {
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
        .to_string()
    }

    /// Last fatal frame error, if the loop stopped on its own.
    pub fn fault(&self) -> Option<String> {
        self.inner.borrow().fault().map(|e| e.to_string())
    }

    pub fn frames_drawn(&self) -> f64 {
        self.inner.borrow().frames_drawn() as f64
    }

    /// Stops the loop and releases GPU objects. The handle is unusable afterwards.
    pub fn destroy(&self) {
        self.inner.borrow_mut().shutdown();
    }
}

#[wasm_bindgen]
pub async fn create_background(canvas: HtmlCanvasElement, preset: Option<String>) -> Result<WasmBackground, JsValue> {
    init_panic_hook();

    let preset = match preset.as_deref() {
        Some(name) => ScenePreset::from_name(name)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown preset '{}'", name)))?,
        None => ScenePreset::default(),
    };

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let surface = instance
        .create_surface(wgpu::SurfaceTarget::Canvas(canvas.clone()))
        .map_err(|e| JsValue::from_str(&format!("Failed to create surface: {}", e)))?;
    let backend = WgpuBackend::with_surface(&instance, surface, canvas.width(), canvas.height())
        .await
        .map_err(to_js)?;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let params = Arc::new(ParameterStore::new());
    let options = EngineOptions { seed: None, params: Some(Arc::clone(&params)) };
    let engine = Engine::init_with(backend, AnimationFrameScheduler::new(window), &preset.sources(), options)
        .map_err(to_js)?;

    let inner = Rc::new(RefCell::new(engine));
    let weak = Rc::downgrade(&inner);
    let on_frame = Closure::wrap(Box::new(move |timestamp_ms: f64| {
        let Some(engine) = weak.upgrade() else {
            return;
        };
        if let Err(e) = engine.borrow_mut().on_frame(timestamp_ms) {
            log::error!("{}", e);
        }
    }) as Box<dyn FnMut(f64)>);
    inner.borrow().scheduler().set_callback(on_frame);

    Ok(WasmBackground { inner, params })
}
