//! End-to-end engine behaviour against the recording backend.

use glowfield::engine::{Engine, EngineOptions, EngineState};
use glowfield::error::{FrameError, InitError};
use glowfield::gpu::backend::{Primitive, ShaderStage};
use glowfield::gpu::recording::RecordingBackend;
use glowfield::gpu::shaders::{ScenePreset, ShaderSources};
use glowfield::params::{slider_to_scalar, ParamValue, ParameterField, Rgb};
use glowfield::scene::{SceneModel, MAX_BLOBS};
use glowfield::schedule::{FixedStepClock, ManualScheduler};

type TestEngine = Engine<RecordingBackend, ManualScheduler>;

fn seeded(preset: ScenePreset, width: u32, height: u32, seed: u64) -> TestEngine {
    Engine::init_with(
        RecordingBackend::new(width, height),
        ManualScheduler::new(),
        &preset.sources(),
        EngineOptions { seed: Some(seed), params: None },
    )
    .expect("preset should build")
}

#[test]
fn test_growth_keeps_existing_blobs() {
    let mut scene = SceneModel::with_seed(11);
    scene.reconcile(4);
    let before = scene.snapshot().to_vec();

    assert_eq!(scene.reconcile(9), 9);
    assert_eq!(&scene.snapshot()[..4], before.as_slice());
}

#[test]
fn test_truncation_keeps_prefix() {
    let mut scene = SceneModel::with_seed(3);
    scene.reconcile(10);
    let before = scene.snapshot().to_vec();

    assert_eq!(scene.reconcile(6), 6);
    assert_eq!(scene.snapshot(), &before[..6]);
}

#[test]
fn test_one_tick_draws_one_quad() {
    let mut engine = seeded(ScenePreset::Blobs, 800, 600, 1);
    engine.start().unwrap();
    engine.on_frame(16.7).unwrap();

    assert_eq!(engine.backend().draw_calls(), vec![(Primitive::Triangles, 6)]);
}

#[test]
fn test_stop_twice_then_callback() {
    let mut engine = seeded(ScenePreset::Blobs, 100, 100, 1);
    engine.start().unwrap();
    engine.on_frame(16.0).unwrap();
    engine.stop();
    engine.stop();

    // A callback the host had already queued before stop.
    engine.on_frame(32.0).unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.backend().draw_calls().len(), 1);
}

#[test]
fn test_parameter_write_visible_next_tick() {
    let mut engine = seeded(ScenePreset::Blobs, 100, 100, 1);
    engine.start().unwrap();
    engine.on_frame(16.0).unwrap();

    let params = engine.params();
    let orange = Rgb::from_hex("#ff8800").unwrap();
    params.set_color(ParameterField::BackgroundColor, orange).unwrap();
    params
        .set_scalar(ParameterField::GlobalSpeed, slider_to_scalar(7.0))
        .unwrap();
    params.set_scalar(ParameterField::GlobalSize, 0.5).unwrap();
    engine.on_frame(32.0).unwrap();

    let uniforms = engine.backend().last_uniforms().unwrap();
    assert_eq!(uniforms.bg_color, orange.to_vec4());
    assert!((uniforms.speed - 0.7).abs() < 1e-6);
    assert_eq!(uniforms.size, 0.5);
}

#[test]
fn test_zero_size_resize_survives() {
    let mut engine = seeded(ScenePreset::SnowyDay, 100, 100, 1);
    engine.start().unwrap();
    engine.notify_resize(0, 0);
    for i in 0..3 {
        engine.on_frame(i as f64 * 16.0).unwrap();
    }
    assert_eq!(engine.state(), EngineState::Running);
    assert!(engine.backend().draw_calls().is_empty());
    assert!(engine.scheduler().outstanding().is_some());
}

#[test]
fn test_compile_failure_surfaces_log() {
    let sources = ShaderSources::new(
        "broken",
        ScenePreset::Blobs.sources().vertex,
        "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined_name; }",
    );
    match Engine::init(RecordingBackend::new(10, 10), ManualScheduler::new(), &sources) {
        Err(InitError::Compile(e)) => {
            assert_eq!(e.stage, ShaderStage::Fragment);
            assert!(!e.log.is_empty());
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("broken shader produced an engine"),
    }
}

#[test]
fn test_blob_count_clamped_to_shader_capacity() {
    let mut engine = seeded(ScenePreset::Blobs, 100, 100, 5);
    engine
        .set_parameter(ParameterField::BlobCount, ParamValue::Count(MAX_BLOBS + 15))
        .unwrap();
    assert_eq!(engine.scene().len(), MAX_BLOBS);

    engine.start().unwrap();
    engine.on_frame(0.0).unwrap();
    assert_eq!(engine.backend().last_uniforms().unwrap().count as usize, MAX_BLOBS);
}

#[test]
fn test_surface_loss_is_fatal() {
    let mut engine = seeded(ScenePreset::Blobs, 100, 100, 1);
    engine.backend_mut().lose_surface_after(2);
    engine.start().unwrap();

    let clock = FixedStepClock::default();
    engine.on_frame(clock.timestamp_ms(0)).unwrap();
    engine.on_frame(clock.timestamp_ms(1)).unwrap();
    let err = engine.on_frame(clock.timestamp_ms(2)).unwrap_err();

    assert!(matches!(err, FrameError::SurfaceLost(_)));
    assert_eq!(engine.fault(), Some(&err));
    assert_eq!(engine.frames_drawn(), 2);
    assert!(engine.start().is_err());
}

#[test]
fn test_engines_are_independent() {
    let mut a = seeded(ScenePreset::Blobs, 100, 100, 1);
    let mut b = seeded(ScenePreset::SnowyDay, 200, 50, 2);
    a.start().unwrap();
    b.start().unwrap();

    a.params().set_blob_count(2);
    a.on_frame(16.0).unwrap();
    b.on_frame(16.0).unwrap();
    a.stop();
    b.on_frame(32.0).unwrap();

    assert_eq!(a.backend().last_uniforms().unwrap().count, 2);
    assert_eq!(b.backend().last_uniforms().unwrap().count, 8);
    assert_eq!(b.backend().last_viewport(), Some((200, 50)));
    assert_eq!(a.state(), EngineState::Stopped);
    assert_eq!(b.state(), EngineState::Running);
    assert_eq!(b.frames_drawn(), 2);
}

#[test]
fn test_same_seed_same_layout() {
    let a = seeded(ScenePreset::Blobs, 10, 10, 99);
    let b = seeded(ScenePreset::Blobs, 10, 10, 99);
    assert_eq!(a.scene().snapshot(), b.scene().snapshot());
}
