use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
    window::WindowBuilder,
};

use crate::compositor::{BackgroundEffect, FrameCompositor, LumaKeyProvider, SegmentationProvider, StaticMaskProvider, VideoFrame};
use crate::config::BackgroundConfig;
use crate::engine::{Engine, EngineOptions, EngineState};
use crate::gpu::recording::RecordingBackend;
use crate::gpu::shaders::{ScenePreset, ShaderSources};
use crate::gpu::wgpu_backend::WgpuBackend;
use crate::params::{ParameterStore, Rgb};
use crate::schedule::{FixedStepClock, ManualScheduler, RedrawScheduler};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames to disk without opening a window
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        #[command(flatten)]
        scene: SceneArgs,

        /// Number of frames to render
        #[arg(long)]
        frames: Option<u32>,
    },
    /// Animate the background in a window (space pauses, escape quits)
    Preview {
        #[command(flatten)]
        scene: SceneArgs,
    },
    /// Compile and link shaders, printing diagnostics
    Check {
        /// Built-in preset to check when no fragment shader is given
        #[arg(long, value_enum, default_value_t = ScenePreset::Blobs)]
        preset: ScenePreset,

        /// Fragment shader (WGSL) to check instead of a preset
        #[arg(long)]
        fragment: Option<PathBuf>,

        /// Vertex shader (WGSL) paired with --fragment
        #[arg(long, requires = "fragment")]
        vertex: Option<PathBuf>,
    },
    /// Replace the background of a sequence of PNG frames
    Composite {
        /// PNG file or directory of PNG frames
        #[arg(long)]
        input: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Person mask (grayscale PNG). Without one a luma key is used.
        #[arg(long)]
        mask: Option<PathBuf>,

        /// Luma key threshold when no mask is given
        #[arg(long, default_value_t = 128)]
        luma_threshold: u8,

        #[arg(long, value_enum, default_value_t = EffectKind::Blur)]
        effect: EffectKind,

        /// Blur strength for --effect blur
        #[arg(long, default_value_t = 8.0)]
        sigma: f32,

        /// Hex colour for --effect color
        #[arg(long, default_value = "#0f172a")]
        color: String,

        /// Picture for --effect image
        #[arg(long)]
        image: Option<PathBuf>,

        /// Input frame rate, used for output timestamps
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },
}

/// Scene selection shared by `render` and `preview`. Flags override the
/// config file, which overrides built-in defaults.
#[derive(Args, Debug)]
struct SceneArgs {
    /// JSON background config
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    preset: Option<ScenePreset>,

    /// Custom fragment shader (WGSL) instead of the preset's
    #[arg(long)]
    fragment: Option<PathBuf>,

    /// Background colour as hex
    #[arg(long)]
    background: Option<String>,

    /// Blob colour as hex
    #[arg(long)]
    blob_color: Option<String>,

    /// Blob size slider tick (0-10)
    #[arg(long)]
    size: Option<f32>,

    /// Speed slider tick (0-10)
    #[arg(long)]
    speed: Option<f32>,

    #[arg(long)]
    blobs: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<f64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectKind {
    Blur,
    Mirror,
    Image,
    Color,
    Cleared,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { out, scene, frames } => {
            let (mut config, sources) = scene.resolve()?;
            if let Some(frames) = frames {
                config.frames = frames;
            }
            pollster::block_on(render_offline(&config, &sources, &out))?;
        }
        Commands::Preview { scene } => {
            let (config, sources) = scene.resolve()?;
            preview(&config, &sources)?;
        }
        Commands::Check { preset, fragment, vertex } => {
            let sources = match fragment {
                Some(path) => ShaderSources::from_files(&path, vertex.as_deref())
                    .with_context(|| format!("reading {:?}", path))?,
                None => preset.sources(),
            };
            check(&sources)?;
        }
        Commands::Composite { input, out, mask, luma_threshold, effect, sigma, color, image: picture_path, fps } => {
            let effect = match effect {
                EffectKind::Blur => BackgroundEffect::Blur { sigma },
                EffectKind::Mirror => BackgroundEffect::Mirror,
                EffectKind::Color => BackgroundEffect::Color(Rgb::from_hex(&color)?),
                EffectKind::Cleared => BackgroundEffect::Cleared,
                EffectKind::Image => {
                    let path = picture_path.context("--effect image needs --image")?;
                    let picture = image::open(&path)
                        .with_context(|| format!("opening {:?}", path))?
                        .to_rgba8();
                    BackgroundEffect::Image(picture)
                }
            };
            let clock = FixedStepClock::new(fps);
            match mask {
                Some(path) => {
                    let mask = image::open(&path)
                        .with_context(|| format!("opening mask {:?}", path))?
                        .to_luma8();
                    composite(StaticMaskProvider::new(mask), effect, &input, &out, clock)?;
                }
                None => {
                    composite(LumaKeyProvider::new(luma_threshold), effect, &input, &out, clock)?;
                }
            }
        }
    }
    Ok(())
}

impl SceneArgs {
    fn resolve(self) -> Result<(BackgroundConfig, ShaderSources)> {
        let mut config = match &self.config {
            Some(path) => BackgroundConfig::from_file(path).map_err(anyhow::Error::msg)?,
            None => BackgroundConfig::default(),
        };
        if let Some(preset) = self.preset {
            config.preset = preset;
        }
        if let Some(hex) = &self.background {
            config.background_color = Rgb::from_hex(hex)?;
        }
        if let Some(hex) = &self.blob_color {
            config.blob_color = Rgb::from_hex(hex)?;
        }
        if let Some(size) = self.size {
            config.blob_size = size;
        }
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if let Some(blobs) = self.blobs {
            config.blob_count = blobs;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        config.validate().map_err(anyhow::Error::msg)?;

        let sources = match &self.fragment {
            Some(path) => ShaderSources::from_files(path, None)
                .with_context(|| format!("reading {:?}", path))?,
            None => config.preset.sources(),
        };
        Ok((config, sources))
    }
}

fn engine_options(config: &BackgroundConfig) -> EngineOptions {
    let params = Arc::new(ParameterStore::new());
    config.apply(&params);
    EngineOptions { seed: config.seed, params: Some(params) }
}

async fn render_offline(config: &BackgroundConfig, sources: &ShaderSources, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;

    let backend = WgpuBackend::headless(config.width, config.height).await?;
    let mut engine = Engine::init_with(backend, ManualScheduler::new(), sources, engine_options(config))?;
    let clock = FixedStepClock::new(config.fps);

    println!("Rendering {} frames of '{}' to {:?}...", config.frames, sources.label, out_dir);
    engine.start()?;

    for i in 0..config.frames {
        engine.on_frame(clock.timestamp_ms(i as u64))?;

        let frame = engine.backend().read_pixels()?;
        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        frame
            .save(&frame_path)
            .with_context(|| format!("writing {:?}", frame_path))?;

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");

    engine.shutdown();
    Ok(())
}

fn preview(config: &BackgroundConfig, sources: &ShaderSources) -> Result<()> {
    let event_loop = EventLoop::new().context("creating winit event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(format!("glowfield - {}", sources.label))
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(&event_loop)
            .context("creating preview window")?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("creating window surface")?;
    let size = window.inner_size();
    let backend = pollster::block_on(WgpuBackend::with_surface(&instance, surface, size.width, size.height))?;

    let scheduler = RedrawScheduler::new(window.clone());
    let mut engine = Engine::init_with(backend, scheduler, sources, engine_options(config))?;
    engine.start()?;
    let started = Instant::now();

    event_loop
        .run(move |event, target| {
            let Event::WindowEvent { window_id, event } = event else {
                return;
            };
            if window_id != window.id() {
                return;
            }
            match event {
                WindowEvent::CloseRequested => {
                    engine.stop();
                    target.exit();
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key: Key::Named(NamedKey::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => {
                    engine.stop();
                    target.exit();
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key: Key::Named(NamedKey::Space),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => {
                    if engine.state() == EngineState::Running {
                        engine.stop();
                    } else if let Err(e) = engine.start() {
                        log::error!("{}", e);
                    }
                }
                WindowEvent::Resized(new_size) => {
                    engine.notify_resize(new_size.width, new_size.height)
                }
                WindowEvent::RedrawRequested => {
                    let now_ms = started.elapsed().as_secs_f64() * 1000.0;
                    if let Err(e) = engine.on_frame(now_ms) {
                        eprintln!("[glowfield] {}", e);
                        target.exit();
                    }
                }
                _ => {}
            }
        })
        .context("running preview")?;
    Ok(())
}

/// Runs the engine's init path against the recording backend, so shader
/// errors are reported without a GPU.
fn check(sources: &ShaderSources) -> Result<()> {
    let mut engine = Engine::init(RecordingBackend::new(1, 1), ManualScheduler::new(), sources)
        .with_context(|| format!("checking '{}'", sources.label))?;
    engine.shutdown();
    println!("'{}': vertex and fragment stages compile and link", sources.label);
    Ok(())
}

fn composite<P: SegmentationProvider>(
    provider: P,
    effect: BackgroundEffect,
    input: &Path,
    out_dir: &Path,
    clock: FixedStepClock,
) -> Result<()> {
    let paths = collect_frames(input)?;
    std::fs::create_dir_all(out_dir)?;

    // Decoded on demand: only the frame being composited is held in memory.
    let frames = paths.iter().enumerate().map(|(i, path)| -> Result<VideoFrame> {
        let image = image::open(path)
            .with_context(|| format!("opening frame {:?}", path))?
            .to_rgba8();
        let timestamp_us = (clock.timestamp_ms(i as u64) * 1000.0) as i64;
        Ok(VideoFrame::new(timestamp_us, image))
    });

    let mut compositor = FrameCompositor::new(provider, effect);
    let mut index = 0usize;
    let written = pollster::block_on(compositor.run(frames, |frame| -> Result<()> {
        let path = out_dir.join(format!("frame_{:05}.png", index));
        frame
            .image
            .save(&path)
            .with_context(|| format!("writing {:?}", path))?;
        index += 1;
        Ok(())
    }))?;

    let stats = compositor.stats();
    println!(
        "Composited {} frames into {:?} ({} without a mask)",
        written, out_dir, stats.mask_fallbacks
    );
    Ok(())
}

fn collect_frames(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(input).with_context(|| format!("reading {:?}", input))? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        anyhow::bail!("no PNG frames found in {:?}", input);
    }
    Ok(paths)
}
