//! Compositing engine
//!
//! Owns the wgpu device, the buffer pool and every compiled program. Each
//! draw call binds its destination explicitly and submits its own encoder,
//! so the call order is the GPU order.

use std::sync::Arc;

use inkframe_core::{Color, Effect, LayerSettings, Mat4, Material, Point, Rectangle, Shadow};
use inkframe_text::{StencilChannel, StencilDebugSettings};
use wgpu::util::DeviceExt;

use crate::pool::{clear_view, BufferPool, GpuTargetAllocator, PoolStats, PooledBuffer, RenderTarget};
use crate::primitives::{BlendUniforms, BlurUniforms, EffectUniforms, ImageUniforms, MaterialUniforms};
use crate::registry::{
    create_pipeline, BindGroupLayouts, EffectProgram, GraphicsContext, MaterialProgram,
    ProgramRegistry,
};
use crate::shaders;
use crate::textures::GpuTexture;
use crate::{InitializationError, ResourceError, TextureError};

/// A render target on loan from the engine's pool
pub type Buffer = PooledBuffer<RenderTarget>;

fn env_f32(name: &str) -> Option<f32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Bounds on shadow blur
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurLimits {
    /// Largest accepted blur radius in pixels
    pub max_radius: f32,
    /// Kernel half-width per unit of radius
    pub taps_per_unit: f32,
}

impl Default for BlurLimits {
    fn default() -> Self {
        Self {
            max_radius: 3600.0,
            taps_per_unit: 3.0,
        }
    }
}

impl BlurLimits {
    /// Gaussian sigma and kernel half-width for a requested blur
    pub fn kernel(&self, blur: f32) -> (f32, f32) {
        let sigma = blur.clamp(0.0, self.max_radius);
        (sigma, sigma * self.taps_per_unit)
    }
}

/// Configuration for creating a compositor
#[derive(Clone, Debug)]
pub struct CompositorConfig {
    /// Format of pooled buffers and pipeline targets
    pub texture_format: wgpu::TextureFormat,
    pub blur: BlurLimits,
    /// Font size used to measure lines before scaling
    pub probe_font_size: f32,
    pub stencil_debug: StencilDebugSettings,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            texture_format: wgpu::TextureFormat::Rgba8Unorm,
            blur: BlurLimits::default(),
            probe_font_size: 100.0,
            stencil_debug: StencilDebugSettings::default(),
        }
    }
}

impl CompositorConfig {
    /// Apply environment overrides
    ///
    /// Env:
    /// - INKFRAME_MAX_BLUR_RADIUS=3600
    /// - INKFRAME_BLUR_TAPS_PER_UNIT=3
    /// - INKFRAME_PROBE_FONT_SIZE=100
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_f32("INKFRAME_MAX_BLUR_RADIUS") {
            self.blur.max_radius = v;
        }
        if let Some(v) = env_f32("INKFRAME_BLUR_TAPS_PER_UNIT") {
            self.blur.taps_per_unit = v;
        }
        if let Some(v) = env_f32("INKFRAME_PROBE_FONT_SIZE") {
            self.probe_font_size = v;
        }
        self
    }
}

fn log_compositor_config(config: &CompositorConfig) {
    tracing::info!(
        "compositor config: format={:?}, max_blur_radius={}, blur_taps_per_unit={}, probe_font_size={}",
        config.texture_format,
        config.blur.max_radius,
        config.blur.taps_per_unit,
        config.probe_font_size
    );
}

fn preferred_backends() -> wgpu::Backends {
    #[cfg(target_os = "macos")]
    {
        wgpu::Backends::METAL
    }
    #[cfg(target_os = "windows")]
    {
        wgpu::Backends::DX12
    }
    #[cfg(target_os = "linux")]
    {
        wgpu::Backends::VULKAN
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        wgpu::Backends::PRIMARY
    }
}

struct Samplers {
    /// Stencils, layers and images
    linear: wgpu::Sampler,
    /// Pattern tiling
    repeat: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        let linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let repeat = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Pattern Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self { linear, repeat }
    }
}

/// GPU compositing engine
pub struct CompositingEngine {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: CompositorConfig,
    /// Canvas size in pixels
    size: (u32, u32),
    pool: BufferPool<GpuTargetAllocator>,
    layouts: BindGroupLayouts,
    programs: ProgramRegistry,
    blur_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
    image_pipeline: wgpu::RenderPipeline,
    samplers: Samplers,
    /// Bound to the pattern slot of programs without a pattern
    blank: GpuTexture,
}

impl CompositingEngine {
    /// Create a headless engine on its own device
    ///
    /// `INKFRAME_*` environment variables override `config`.
    pub async fn new(config: CompositorConfig) -> Result<Self, InitializationError> {
        let config = config.with_env_overrides();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: preferred_backends(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(InitializationError::AdapterNotFound)?;

        let info = adapter.get_info();
        tracing::info!("compositor adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("inkframe GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        Self::from_device(Arc::new(device), Arc::new(queue), config)
    }

    /// Blocking version of [`CompositingEngine::new`]
    pub fn new_blocking(config: CompositorConfig) -> Result<Self, InitializationError> {
        pollster::block_on(Self::new(config))
    }

    /// Create an engine on a device owned by the host
    ///
    /// `config` is used as given.
    pub fn from_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: CompositorConfig,
    ) -> Result<Self, InitializationError> {
        log_compositor_config(&config);
        let format = config.texture_format;

        let layouts = BindGroupLayouts::new(&device);
        let programs = ProgramRegistry::new(&device, &layouts, format);
        let blur_pipeline = create_pipeline(
            &device,
            "Shadow Blur Pipeline",
            &shaders::blur_source(),
            &layouts.textured,
            format,
            wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );
        let blend_pipeline = create_pipeline(
            &device,
            "Layer Blend Pipeline",
            &shaders::blend_source(),
            &layouts.blend,
            format,
            wgpu::BlendState::REPLACE,
        );
        let image_pipeline = create_pipeline(
            &device,
            "Image Pipeline",
            shaders::IMAGE_SHADER,
            &layouts.textured,
            format,
            wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );
        let samplers = Samplers::new(&device);
        let blank = GpuTexture::from_rgba(&device, &queue, &[0; 4], 1, 1, Some("Blank Texture"))
            .map_err(|e| InitializationError::Resource(e.to_string()))?;
        let pool = BufferPool::new(GpuTargetAllocator::new(
            device.clone(),
            queue.clone(),
            format,
        ));

        Ok(Self {
            device,
            queue,
            config,
            size: (1, 1),
            pool,
            layouts,
            programs,
            blur_pipeline,
            blend_pipeline,
            image_pipeline,
            samplers,
            blank,
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Largest texture side the device accepts
    pub fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Set the canvas size used for cameras and resolutions
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        let max = self.max_dimension();
        if width > max || height > max {
            return Err(ResourceError::SizeLimit { width, height, max });
        }
        self.size = (width.max(1), height.max(1));
        Ok(())
    }

    /// Orthographic camera mapping canvas pixels (y down) to clip space
    pub fn camera(&self) -> Mat4 {
        let (w, h) = self.size;
        Mat4::orthographic(0.0, w as f32, h as f32, 0.0, -100.0, 100.0)
    }

    fn resolution(&self) -> [f32; 2] {
        [self.size.0 as f32, self.size.1 as f32]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Buffers
    // ─────────────────────────────────────────────────────────────────────────

    /// Borrow a cleared canvas-sized buffer
    pub fn acquire(&mut self) -> Buffer {
        self.pool.acquire(self.size.0, self.size.1)
    }

    /// Hand a buffer back to the pool
    ///
    /// Misuse is logged by the pool and otherwise ignored.
    pub fn release(&mut self, buffer: Buffer) {
        if let Err(err) = self.pool.release(buffer) {
            tracing::debug!("compositor: release ignored: {}", err);
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Clear a target to transparent black
    pub fn clear(&self, target: &wgpu::TextureView) {
        clear_view(&self.device, &self.queue, target);
    }

    /// 1x1 texture of a straight-alpha color
    pub fn solid_texture(&self, color: Color) -> Result<GpuTexture, TextureError> {
        GpuTexture::from_rgba(
            &self.device,
            &self.queue,
            &color.to_rgba8(),
            1,
            1,
            Some("Solid Texture"),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Draws
    // ─────────────────────────────────────────────────────────────────────────

    fn uniform_buffer<T: bytemuck::Pod>(&self, label: &str, data: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(data),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    fn textured_bind_group(
        &self,
        label: &str,
        uniforms: &wgpu::Buffer,
        texture: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layouts.textured,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.samplers.linear),
                },
            ],
        })
    }

    /// Record one quad draw into `target` and submit it
    fn submit_quad(
        &self,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
        target: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Paint one stencil channel with a material
    ///
    /// Disabled materials draw nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_stencil_layer(
        &self,
        ctx: &GraphicsContext<'_>,
        stencil: &wgpu::TextureView,
        channel: StencilChannel,
        channel_mask: u32,
        rectangle: &Rectangle,
        material: &Material,
        destination: &wgpu::TextureView,
    ) -> Result<(), TextureError> {
        let Some(program) = MaterialProgram::for_kind(&material.kind) else {
            return Ok(());
        };
        let entry = self.programs.material(program);
        let binding = (entry.uniforms)(&material.kind, rectangle, ctx)?;

        let mut uniforms = MaterialUniforms::new(
            &self.camera(),
            &rectangle.model_matrix(),
            channel,
            channel_mask,
            material.alpha,
        );
        uniforms.params = binding.params;
        uniforms.pattern_transform = binding.pattern_transform.cols;

        let pattern = binding.pattern.unwrap_or(&self.blank);
        let uniform_buffer = self.uniform_buffer("Material Uniforms", &uniforms);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &self.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(stencil),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.samplers.linear),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&pattern.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.samplers.repeat),
                },
            ],
        });
        self.submit_quad(
            "Stencil Layer Pass",
            &entry.pipeline,
            &bind_group,
            destination,
            wgpu::LoadOp::Load,
        );
        Ok(())
    }

    /// Draw a blurred, tinted copy of a stencil layer into `destination`
    ///
    /// The layer is offset by `shadow.offset`, blurred horizontally into one
    /// pooled buffer, then vertically with the tint over `destination`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_shadow(
        &mut self,
        ctx: &GraphicsContext<'_>,
        stencil: &wgpu::TextureView,
        channel: StencilChannel,
        channel_mask: u32,
        rectangle: &Rectangle,
        material: &Material,
        shadow: &Shadow,
        destination: &wgpu::TextureView,
    ) -> Result<(), TextureError> {
        if material.is_disabled() {
            return Ok(());
        }
        let layer = self.acquire();
        let offset = rectangle.translated(shadow.offset);
        if let Err(err) = self.draw_stencil_layer(
            ctx,
            stencil,
            channel,
            channel_mask,
            &offset,
            material,
            &layer.view,
        ) {
            self.release(layer);
            return Err(err);
        }

        let blurred = self.acquire();
        let (sigma, extent) = self.config.blur.kernel(shadow.blur);
        let horizontal = BlurUniforms {
            resolution: self.resolution(),
            direction: [1.0, 0.0],
            sigma,
            extent,
            ..Default::default()
        };
        let vertical = BlurUniforms {
            color: shadow.color.to_array(),
            direction: [0.0, 1.0],
            saturation: shadow.saturation,
            tint: 1,
            ..horizontal
        };

        let horizontal_buffer = self.uniform_buffer("Blur H Uniforms", &horizontal);
        let vertical_buffer = self.uniform_buffer("Blur V Uniforms", &vertical);
        let horizontal_group =
            self.textured_bind_group("Blur H Bind Group", &horizontal_buffer, &layer.view);
        let vertical_group =
            self.textured_bind_group("Blur V Bind Group", &vertical_buffer, &blurred.view);

        // Both passes in one submission
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shadow Blur Encoder"),
            });
        for (target, group, label) in [
            (&blurred.view, &horizontal_group, "Shadow Blur H Pass"),
            (destination, &vertical_group, "Shadow Blur V Pass"),
        ] {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blur_pipeline);
            pass.set_bind_group(0, group, &[]);
            pass.draw(0..6, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.release(blurred);
        self.release(layer);
        Ok(())
    }

    fn run_effect(
        &self,
        program: EffectProgram,
        effect: Option<&Effect>,
        rectangle: &Rectangle,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
    ) {
        let entry = self.programs.effect(program);
        let uniforms = EffectUniforms {
            resolution: self.resolution(),
            _pad: [0.0; 2],
            params: effect.map_or([[0.0; 4]; 2], |e| (entry.uniforms)(e, rectangle)),
        };
        let uniform_buffer = self.uniform_buffer("Effect Uniforms", &uniforms);
        let bind_group = self.textured_bind_group("Effect Bind Group", &uniform_buffer, source);
        self.submit_quad(
            "Effect Pass",
            &entry.pipeline,
            &bind_group,
            target,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        );
    }

    /// Run an effect chain from `source` into `destination`
    ///
    /// Intermediate stages rotate through a fixed slot array: slot 0 is the
    /// source, slots 1 and 2 are pooled temporaries. With `reuse_source` the
    /// source doubles as the second ping-pong slot and may be overwritten.
    pub fn draw_modifications(
        &mut self,
        effects: &[Effect],
        rectangle: &Rectangle,
        source: &wgpu::TextureView,
        destination: &wgpu::TextureView,
        reuse_source: bool,
    ) {
        let Some(last) = effects.len().checked_sub(1) else {
            self.run_effect(EffectProgram::Passthrough, None, rectangle, source, destination);
            return;
        };

        let ring: [usize; 2] = if reuse_source { [1, 0] } else { [1, 2] };
        let temporaries = match last {
            0 => 0,
            _ if reuse_source => 1,
            1 => 1,
            _ => 2,
        };
        let buffers: Vec<Buffer> = (0..temporaries).map(|_| self.acquire()).collect();
        {
            let mut slots: [&wgpu::TextureView; 3] = [source; 3];
            for (slot, buffer) in slots[1..].iter_mut().zip(&buffers) {
                *slot = &buffer.view;
            }
            for (i, effect) in effects.iter().enumerate() {
                let read = if i == 0 { 0 } else { ring[(i - 1) % 2] };
                let write = if i == last {
                    destination
                } else {
                    slots[ring[i % 2]]
                };
                self.run_effect(
                    EffectProgram::for_effect(effect),
                    Some(effect),
                    rectangle,
                    slots[read],
                    write,
                );
            }
        }
        for buffer in buffers {
            self.release(buffer);
        }
    }

    /// Blend `source` over `background` into `result`
    pub fn blend_to(
        &self,
        settings: &LayerSettings,
        source: &wgpu::TextureView,
        background: &wgpu::TextureView,
        result: &wgpu::TextureView,
    ) {
        let uniforms = BlendUniforms::new(
            self.size,
            settings.blend_mode,
            settings.compose_mode,
            settings.alpha,
        );
        let uniform_buffer = self.uniform_buffer("Blend Uniforms", &uniforms);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blend Bind Group"),
            layout: &self.layouts.blend,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(background),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.samplers.linear),
                },
            ],
        });
        self.submit_quad(
            "Blend Pass",
            &self.blend_pipeline,
            &bind_group,
            result,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        );
    }

    /// Draw a textured quad; `tex_coords` are the texture coordinates of the
    /// quad corners (top-left, top-right, bottom-right, bottom-left)
    pub fn draw_image(
        &self,
        texture: &GpuTexture,
        tex_coords: &[Point; 4],
        rectangle: &Rectangle,
        alpha: f32,
        destination: &wgpu::TextureView,
    ) {
        let uniforms = ImageUniforms::new(
            &self.camera(),
            &rectangle.model_matrix(),
            tex_coords,
            alpha,
        );
        let uniform_buffer = self.uniform_buffer("Image Uniforms", &uniforms);
        let bind_group =
            self.textured_bind_group("Image Bind Group", &uniform_buffer, &texture.view);
        self.submit_quad(
            "Image Pass",
            &self.image_pipeline,
            &bind_group,
            destination,
            wgpu::LoadOp::Load,
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy a target back to the CPU as straight-alpha RGBA
    pub fn read_pixels(&self, target: &RenderTarget) -> Result<image::RgbaImage, ResourceError> {
        let (width, height) = (target.size.0.max(1), target.size.1.max(1));
        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .unwrap_or(Err(wgpu::BufferAsyncError))
            .map_err(|e| ResourceError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
        }
        buffer.unmap();

        unpremultiply(&mut pixels);
        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| ResourceError::Readback("pixel buffer size mismatch".into()))
    }

    /// Destroy pooled buffers
    pub fn teardown(&mut self) -> Result<(), ResourceError> {
        self.blank.texture.destroy();
        self.pool.teardown()
    }
}

fn unpremultiply(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_radius_is_clamped() {
        let limits = BlurLimits::default();
        assert_eq!(limits.kernel(4.0), (4.0, 12.0));
        assert_eq!(limits.kernel(10_000.0), (3600.0, 10_800.0));
        assert_eq!(limits.kernel(-1.0), (0.0, 0.0));
    }

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        let mut pixels = [64, 32, 0, 128, 10, 20, 30, 0, 1, 2, 3, 255];
        unpremultiply(&mut pixels);
        assert_eq!(&pixels[..4], &[128, 64, 0, 128]);
        // Fully transparent and opaque pixels are left alone
        assert_eq!(&pixels[4..], &[10, 20, 30, 0, 1, 2, 3, 255]);
    }

    #[test]
    fn env_overrides_accept_fractional_values() {
        std::env::set_var("INKFRAME_MAX_BLUR_RADIUS", "120.5");
        std::env::set_var("INKFRAME_BLUR_TAPS_PER_UNIT", "not a number");
        let config = CompositorConfig::default().with_env_overrides();
        std::env::remove_var("INKFRAME_MAX_BLUR_RADIUS");
        std::env::remove_var("INKFRAME_BLUR_TAPS_PER_UNIT");

        assert_eq!(config.blur.max_radius, 120.5);
        assert_eq!(config.blur.taps_per_unit, 3.0);
    }

    #[test]
    fn default_config_uses_rgba8() {
        let config = CompositorConfig::default();
        assert_eq!(config.texture_format, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(config.blur, BlurLimits::default());
        assert!(!config.stencil_debug.any());
    }
}
