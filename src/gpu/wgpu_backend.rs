//! wgpu implementation of [`GraphicsBackend`].
//!
//! Draws into either a presentable surface (window or canvas) or an offscreen
//! texture that can be read back for frame export.

use wgpu::util::DeviceExt;

use crate::error::{BackendError, SurfaceLostError};
use crate::gpu::backend::{DrawOutcome, GraphicsBackend, Primitive, ShaderStage};
use crate::gpu::pipeline;
use crate::gpu::quad::QuadVertex;
use crate::gpu::uniforms::FrameUniforms;
use crate::gpu::validate::{self, StageInterface};

/// Hex colours are already sRGB-encoded, so targets use a non-sRGB format
/// to avoid encoding them twice.
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct WgpuShader {
    stage: ShaderStage,
    interface: Option<StageInterface>,
    module: Option<wgpu::ShaderModule>,
}

pub struct WgpuProgram {
    pipeline: Option<wgpu::RenderPipeline>,
}

enum RenderTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    target: RenderTarget,
    size: (u32, u32),
    uniform_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    quad_buffer: Option<wgpu::Buffer>,
}

async fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'static>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), BackendError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| BackendError::new("no suitable GPU adapter"))?;

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("glowfield device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| BackendError::new(format!("failed to create device: {}", e)))?;

    Ok((adapter, device, queue))
}

fn create_offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

impl WgpuBackend {
    /// Backend rendering into an offscreen texture; no window required.
    pub async fn headless(width: u32, height: u32) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let (_adapter, device, queue) = request_device(&instance, None).await?;
        let texture = create_offscreen_texture(&device, width, height);
        log::info!("headless backend ready at {}x{}", width, height);
        Ok(Self::from_parts(
            device,
            queue,
            OFFSCREEN_FORMAT,
            RenderTarget::Offscreen { texture },
            (width, height),
        ))
    }

    /// Backend presenting to a window or canvas surface.
    pub async fn with_surface(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, BackendError> {
        let (adapter, device, queue) = request_device(instance, Some(&surface)).await?;

        let config = surface_config(&surface.get_capabilities(&adapter), width, height)?;
        surface.configure(&device, &config);
        log::info!("surface backend ready at {}x{} ({:?})", width, height, config.format);

        Ok(Self::from_parts(
            device,
            queue,
            config.format,
            RenderTarget::Surface { surface, config },
            (width, height),
        ))
    }

    fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        target: RenderTarget,
        size: (u32, u32),
    ) -> Self {
        let uniform_size = std::mem::size_of::<FrameUniforms>() as u64;
        let uniform_layout = pipeline::create_uniform_layout(&device, uniform_size);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Background Uniform Buffer"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("background_uniform_bind_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            format,
            target,
            size,
            uniform_layout,
            uniform_buffer,
            uniform_bind_group,
            quad_buffer: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Runs `f` inside a validation error scope.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match self.pop_validation_error() {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn pop_validation_error(&self) -> Option<wgpu::Error> {
        pollster::block_on(self.device.pop_error_scope())
    }

    // The browser cannot block on the scope; naga has already validated the
    // source, and anything else surfaces through wgpu's uncaptured-error log.
    #[cfg(target_arch = "wasm32")]
    fn pop_validation_error(&self) -> Option<wgpu::Error> {
        drop(self.device.pop_error_scope());
        None
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        match &mut self.target {
            RenderTarget::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            RenderTarget::Offscreen { texture } => {
                *texture = create_offscreen_texture(&self.device, width, height);
            }
        }
        log::debug!("render target resized to {}x{}", width, height);
    }

    /// Copies the offscreen target into an RGBA image.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn read_pixels(&self) -> Result<image::RgbaImage, BackendError> {
        let texture = match &self.target {
            RenderTarget::Offscreen { texture } => texture,
            RenderTarget::Surface { .. } => {
                return Err(BackendError::new("pixel readback needs an offscreen target"))
            }
        };
        let width = texture.width();
        let height = texture.height();

        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture.size(),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BackendError::new(format!("readback channel closed: {}", e)))?
            .map_err(|e| BackendError::new(format!("failed to map readback buffer: {}", e)))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        output_buffer.unmap();

        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| BackendError::new("readback produced a short buffer"))
    }
}

impl GraphicsBackend for WgpuBackend {
    type Shader = WgpuShader;
    type Program = WgpuProgram;

    fn create_shader(&mut self, stage: ShaderStage) -> WgpuShader {
        WgpuShader { stage, interface: None, module: None }
    }

    fn compile_shader(&mut self, shader: &mut WgpuShader, source: &str) -> Result<(), String> {
        let interface = validate::compile_stage(shader.stage, source)?;
        let label = format!("{} shader", shader.stage);
        let module = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        shader.interface = Some(interface);
        shader.module = Some(module);
        Ok(())
    }

    fn delete_shader(&mut self, shader: WgpuShader) {
        drop(shader);
    }

    fn create_program(&mut self) -> WgpuProgram {
        WgpuProgram { pipeline: None }
    }

    fn link_program(
        &mut self,
        program: &mut WgpuProgram,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
    ) -> Result<(), String> {
        let (vs, fs) = match (&vertex.module, &fragment.module) {
            (Some(vs), Some(fs)) => (vs, fs),
            _ => return Err("attached shader was never compiled".to_string()),
        };
        if let (Some(vi), Some(fi)) = (&vertex.interface, &fragment.interface) {
            validate::link_stages(vi, fi)?;
        }

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Background Pipeline Layout"),
            bind_group_layouts: &[&self.uniform_layout],
            push_constant_ranges: &[],
        });
        let format = self.format;
        let pipeline = self.scoped(|device| {
            pipeline::create_background_pipeline(device, &layout, vs, fs, format)
        })?;
        program.pipeline = Some(pipeline);
        Ok(())
    }

    fn delete_program(&mut self, program: WgpuProgram) {
        drop(program);
    }

    fn upload_quad(&mut self, vertices: &[QuadVertex]) -> Result<(), String> {
        let buffer = self.scoped(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Fullscreen Quad"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        })?;
        self.quad_buffer = Some(buffer);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.resize_target(width, height);
    }

    fn upload_uniforms(&mut self, _program: &WgpuProgram, uniforms: &FrameUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn draw(
        &mut self,
        program: &WgpuProgram,
        primitive: Primitive,
        vertex_count: u32,
    ) -> Result<DrawOutcome, SurfaceLostError> {
        let pipeline = program
            .pipeline
            .as_ref()
            .ok_or_else(|| SurfaceLostError::new("program has no pipeline"))?;
        let quad = self
            .quad_buffer
            .as_ref()
            .ok_or_else(|| SurfaceLostError::new("geometry not uploaded"))?;
        match primitive {
            Primitive::Triangles => {}
        }

        let (frame, view) = match &self.target {
            RenderTarget::Surface { surface, config } => match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                    (Some(frame), view)
                }
                Err(wgpu::SurfaceError::Lost) => {
                    return Err(SurfaceLostError::new("surface lost"));
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    return Err(SurfaceLostError::new("surface out of memory"));
                }
                Err(wgpu::SurfaceError::Outdated) => {
                    // Size changed underneath us; configure and draw next tick.
                    surface.configure(&self.device, config);
                    log::debug!("surface outdated; frame skipped");
                    return Ok(DrawOutcome::Skipped);
                }
                Err(e) => {
                    log::warn!("surface error: {:?}; frame skipped", e);
                    return Ok(DrawOutcome::Skipped);
                }
            },
            RenderTarget::Offscreen { texture } => {
                (None, texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("background frame") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Background Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_vertex_buffer(0, quad.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(DrawOutcome::Drawn)
    }
}

/// Picks a non-sRGB format where the surface offers one. Present and alpha
/// modes fall back to `Fifo` and `Auto`, which every surface accepts.
fn surface_config(
    caps: &wgpu::SurfaceCapabilities,
    width: u32,
    height: u32,
) -> Result<wgpu::SurfaceConfiguration, BackendError> {
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .or_else(|| caps.formats.first().copied())
        .ok_or_else(|| BackendError::new("surface reports no texture formats"))?;

    Ok(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
        alpha_mode: caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: vec![],
            alpha_modes: vec![],
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn test_surface_config_without_modes_uses_fallbacks() {
        let config = surface_config(&caps(vec![wgpu::TextureFormat::Bgra8Unorm]), 0, 480).unwrap();
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
        assert_eq!(config.alpha_mode, wgpu::CompositeAlphaMode::Auto);
        assert_eq!((config.width, config.height), (1, 480));
    }

    #[test]
    fn test_surface_config_prefers_linear_format() {
        let mut surface_caps = caps(vec![
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8Unorm,
        ]);
        surface_caps.present_modes = vec![wgpu::PresentMode::Mailbox];
        surface_caps.alpha_modes = vec![wgpu::CompositeAlphaMode::Opaque];

        let config = surface_config(&surface_caps, 64, 64).unwrap();
        assert_eq!(config.format, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(config.present_mode, wgpu::PresentMode::Mailbox);
        assert_eq!(config.alpha_mode, wgpu::CompositeAlphaMode::Opaque);
    }

    #[test]
    fn test_surface_config_needs_a_format() {
        assert!(surface_config(&caps(vec![]), 64, 64).is_err());
    }
}
