//! Program registry
//!
//! Maps each material and effect kind to its render pipeline and the
//! function that turns settings into uniforms. Keys are closed enums, so a
//! missing program is a compile error rather than a runtime lookup miss.

use inkframe_core::{Effect, Mat4, MaterialKind, PatternScale, Point, Rectangle};

use crate::shaders;
use crate::textures::{GpuTexture, PatternRegistry, TextureStore};
use crate::TextureError;

/// Resources a uniform builder may consult
#[derive(Clone, Copy)]
pub struct GraphicsContext<'a> {
    pub textures: &'a TextureStore,
    pub patterns: &'a PatternRegistry,
}

impl<'a> GraphicsContext<'a> {
    pub fn new(textures: &'a TextureStore, patterns: &'a PatternRegistry) -> Self {
        Self { textures, patterns }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialProgram {
    Color,
    Pattern,
    Gradient4,
}

impl MaterialProgram {
    pub const ALL: [MaterialProgram; 3] = [
        MaterialProgram::Color,
        MaterialProgram::Pattern,
        MaterialProgram::Gradient4,
    ];

    /// Program for a material, `None` when the material draws nothing
    pub fn for_kind(kind: &MaterialKind) -> Option<Self> {
        match kind {
            MaterialKind::Disabled => None,
            MaterialKind::Color { .. } => Some(MaterialProgram::Color),
            MaterialKind::Pattern { .. } => Some(MaterialProgram::Pattern),
            MaterialKind::Gradient4 { .. } => Some(MaterialProgram::Gradient4),
        }
    }

    fn fragment(self) -> &'static str {
        match self {
            MaterialProgram::Color => shaders::COLOR_MATERIAL,
            MaterialProgram::Pattern => shaders::PATTERN_MATERIAL,
            MaterialProgram::Gradient4 => shaders::GRADIENT4_MATERIAL,
        }
    }

    fn uniforms(self) -> MaterialUniformFn {
        match self {
            MaterialProgram::Color => color_uniforms,
            MaterialProgram::Pattern => pattern_uniforms,
            MaterialProgram::Gradient4 => gradient4_uniforms,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectProgram {
    /// Copies the layer unchanged
    Passthrough,
    Noise,
    Bulge,
    Pinch,
    Swirl,
    Pixelation,
    BrightnessContrast,
    Temperature,
}

impl EffectProgram {
    pub const ALL: [EffectProgram; 8] = [
        EffectProgram::Passthrough,
        EffectProgram::Noise,
        EffectProgram::Bulge,
        EffectProgram::Pinch,
        EffectProgram::Swirl,
        EffectProgram::Pixelation,
        EffectProgram::BrightnessContrast,
        EffectProgram::Temperature,
    ];

    pub fn for_effect(effect: &Effect) -> Self {
        match effect {
            Effect::Noise { .. } => EffectProgram::Noise,
            Effect::Bulge { .. } => EffectProgram::Bulge,
            Effect::Pinch { .. } => EffectProgram::Pinch,
            Effect::Swirl { .. } => EffectProgram::Swirl,
            Effect::Pixelation { .. } => EffectProgram::Pixelation,
            Effect::BrightnessContrast { .. } => EffectProgram::BrightnessContrast,
            Effect::Temperature { .. } => EffectProgram::Temperature,
        }
    }

    fn fragment(self) -> &'static str {
        match self {
            EffectProgram::Passthrough => shaders::PASSTHROUGH_EFFECT,
            EffectProgram::Noise => shaders::NOISE_EFFECT,
            EffectProgram::Bulge => shaders::BULGE_EFFECT,
            EffectProgram::Pinch => shaders::PINCH_EFFECT,
            EffectProgram::Swirl => shaders::SWIRL_EFFECT,
            EffectProgram::Pixelation => shaders::PIXELATION_EFFECT,
            EffectProgram::BrightnessContrast => shaders::BRIGHTNESS_CONTRAST_EFFECT,
            EffectProgram::Temperature => shaders::TEMPERATURE_EFFECT,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Uniform builders
// ─────────────────────────────────────────────────────────────────────────────

/// Program-specific part of the material uniforms
pub struct MaterialBinding<'a> {
    pub params: [[f32; 4]; 4],
    pub pattern_transform: Mat4,
    /// Texture bound to the pattern slot, a blank texture when `None`
    pub pattern: Option<&'a GpuTexture>,
}

impl Default for MaterialBinding<'_> {
    fn default() -> Self {
        Self {
            params: [[0.0; 4]; 4],
            pattern_transform: Mat4::IDENTITY,
            pattern: None,
        }
    }
}

pub type MaterialUniformFn = for<'a> fn(
    &MaterialKind,
    &Rectangle,
    &GraphicsContext<'a>,
) -> Result<MaterialBinding<'a>, TextureError>;

pub type EffectUniformFn = fn(&Effect, &Rectangle) -> [[f32; 4]; 2];

fn color_uniforms<'a>(
    kind: &MaterialKind,
    _rectangle: &Rectangle,
    _ctx: &GraphicsContext<'a>,
) -> Result<MaterialBinding<'a>, TextureError> {
    let mut binding = MaterialBinding::default();
    if let MaterialKind::Color { value } = kind {
        binding.params[0] = value.to_array();
    }
    Ok(binding)
}

fn gradient4_uniforms<'a>(
    kind: &MaterialKind,
    _rectangle: &Rectangle,
    _ctx: &GraphicsContext<'a>,
) -> Result<MaterialBinding<'a>, TextureError> {
    let mut binding = MaterialBinding::default();
    if let MaterialKind::Gradient4 { colors } = kind {
        for (param, color) in binding.params.iter_mut().zip(colors) {
            *param = color.to_array();
        }
    }
    Ok(binding)
}

fn pattern_uniforms<'a>(
    kind: &MaterialKind,
    rectangle: &Rectangle,
    ctx: &GraphicsContext<'a>,
) -> Result<MaterialBinding<'a>, TextureError> {
    let MaterialKind::Pattern {
        name,
        scale,
        rotate,
        shift,
    } = kind
    else {
        return Ok(MaterialBinding::default());
    };
    let texture = ctx.textures.get(ctx.patterns.texture_id(name)?)?;
    Ok(MaterialBinding {
        params: [[0.0; 4]; 4],
        pattern_transform: pattern_transform(
            *scale,
            *rotate,
            *shift,
            rectangle,
            texture.dimensions(),
        ),
        pattern: Some(texture),
    })
}

/// Block uv to pattern uv: translate(shift / size) · rotate(degrees) · scale
///
/// `Factor(f)` tiles the pattern so one tile covers `size · f` pixels of
/// the block; `Font` maps one tile onto the whole block.
pub fn pattern_transform(
    scale: PatternScale,
    rotate: f32,
    shift: Point,
    block: &Rectangle,
    pattern_size: (u32, u32),
) -> Mat4 {
    let (pw, ph) = (pattern_size.0.max(1) as f32, pattern_size.1.max(1) as f32);
    let scaling = match scale {
        PatternScale::Font => Mat4::IDENTITY,
        PatternScale::Factor(f) => Mat4::scale(block.width / (pw * f.x), block.height / (ph * f.y), 1.0),
    };
    Mat4::translation(shift.x / pw, shift.y / ph, 0.0)
        .mul(&Mat4::rotation_z(rotate.to_radians()))
        .mul(&scaling)
}

/// Effect parameters packed as two `vec4`s
pub fn effect_params(effect: &Effect, _rectangle: &Rectangle) -> [[f32; 4]; 2] {
    let first = match *effect {
        Effect::Noise {
            radius,
            min_alpha,
            max_alpha,
        } => [radius, min_alpha, max_alpha, 0.0],
        Effect::Bulge {
            center,
            radius,
            strength,
        }
        | Effect::Pinch {
            center,
            radius,
            strength,
        } => [center.x, center.y, radius, strength],
        Effect::Swirl {
            center,
            radius,
            angle,
        } => [center.x, center.y, radius, angle.to_radians()],
        Effect::Pixelation { radius } => [radius, 0.0, 0.0, 0.0],
        Effect::BrightnessContrast {
            brightness,
            contrast,
        } => [brightness, contrast, 0.0, 0.0],
        Effect::Temperature {
            temperature,
            strength,
        } => [temperature, strength, 0.0, 0.0],
    };
    [first, [0.0; 4]]
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipelines
// ─────────────────────────────────────────────────────────────────────────────

/// Bind group layouts shared by the engine's programs
pub struct BindGroupLayouts {
    /// Uniforms, stencil texture + sampler, pattern texture + sampler
    pub material: wgpu::BindGroupLayout,
    /// Uniforms, one texture + sampler (effects, blur, images)
    pub textured: wgpu::BindGroupLayout,
    /// Uniforms, source texture, backdrop texture, sampler
    pub blend: wgpu::BindGroupLayout,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1),
                sampler_entry(2),
                texture_entry(3),
                sampler_entry(4),
            ],
        });
        let textured = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Textured Bind Group Layout"),
            entries: &[uniform_entry(0), texture_entry(1), sampler_entry(2)],
        });
        let blend = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blend Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });
        Self {
            material,
            textured,
            blend,
        }
    }
}

/// Build a pipeline whose vertex stage generates its own quad
pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            buffers: &[], // No vertex buffers - quad generated in shader
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

pub struct MaterialEntry {
    pub pipeline: wgpu::RenderPipeline,
    pub uniforms: MaterialUniformFn,
}

pub struct EffectEntry {
    pub pipeline: wgpu::RenderPipeline,
    pub uniforms: EffectUniformFn,
}

/// Every material and effect program, compiled for one target format
pub struct ProgramRegistry {
    materials: Vec<MaterialEntry>,
    effects: Vec<EffectEntry>,
}

impl ProgramRegistry {
    pub fn new(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        format: wgpu::TextureFormat,
    ) -> Self {
        let materials = MaterialProgram::ALL
            .iter()
            .map(|&program| MaterialEntry {
                pipeline: create_pipeline(
                    device,
                    &format!("{program:?} Material Pipeline"),
                    &shaders::material_source(program.fragment()),
                    &layouts.material,
                    format,
                    wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
                ),
                uniforms: program.uniforms(),
            })
            .collect();
        // Effects overwrite every pixel of their target
        let effects = EffectProgram::ALL
            .iter()
            .map(|&program| EffectEntry {
                pipeline: create_pipeline(
                    device,
                    &format!("{program:?} Effect Pipeline"),
                    &shaders::effect_source(program.fragment()),
                    &layouts.textured,
                    format,
                    wgpu::BlendState::REPLACE,
                ),
                uniforms: effect_params,
            })
            .collect();
        tracing::debug!(
            "program registry: {} material and {} effect pipelines",
            MaterialProgram::ALL.len(),
            EffectProgram::ALL.len()
        );
        Self { materials, effects }
    }

    pub fn material(&self, program: MaterialProgram) -> &MaterialEntry {
        &self.materials[program as usize]
    }

    pub fn effect(&self, program: EffectProgram) -> &EffectEntry {
        &self.effects[program as usize]
    }
}
