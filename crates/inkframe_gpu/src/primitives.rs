//! GPU uniform layouts
//!
//! Defines GPU-ready data structures that match the shader uniform layouts.
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod` for safe
//! GPU buffer copies.

use inkframe_core::{BlendMode, ComposeMode, Mat4, Point};
use inkframe_text::StencilChannel;

/// Uniforms shared by every material program
///
/// Memory layout (272 bytes total):
/// - camera: `mat4x4<f32>` (64 bytes) - orthographic canvas projection
/// - transform: `mat4x4<f32>` (64 bytes) - unit quad to block rectangle
/// - pattern_transform: `mat4x4<f32>` (64 bytes) - block uv to pattern uv
/// - params: 4 x `vec4<f32>` (64 bytes) - program specific (colors)
/// - channel, channel_mask: `u32` (8 bytes) - stencil channel bit and enabled channels
/// - alpha: `f32` (4 bytes) - material alpha
/// - _pad: `f32` (4 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniforms {
    pub camera: [[f32; 4]; 4],
    pub transform: [[f32; 4]; 4],
    pub pattern_transform: [[f32; 4]; 4],
    pub params: [[f32; 4]; 4],
    pub channel: u32,
    pub channel_mask: u32,
    pub alpha: f32,
    pub _pad: f32,
}

impl MaterialUniforms {
    pub fn new(
        camera: &Mat4,
        transform: &Mat4,
        channel: StencilChannel,
        channel_mask: u32,
        alpha: f32,
    ) -> Self {
        Self {
            camera: camera.cols,
            transform: transform.cols,
            pattern_transform: Mat4::IDENTITY.cols,
            params: [[0.0; 4]; 4],
            channel: channel.bit(),
            channel_mask,
            alpha,
            _pad: 0.0,
        }
    }
}

/// Uniforms for one separable Gaussian pass
///
/// Memory layout (48 bytes total):
/// - color: `vec4<f32>` (16 bytes) - shadow tint, straight alpha
/// - resolution: `vec2<f32>` (8 bytes) - canvas size in pixels
/// - direction: `vec2<f32>` (8 bytes) - (1, 0) horizontal, (0, 1) vertical
/// - sigma: `f32` (4 bytes) - Gaussian standard deviation in pixels
/// - extent: `f32` (4 bytes) - kernel half-width in pixels
/// - saturation: `f32` (4 bytes) - alpha multiplier for the tinted pass
/// - tint: `u32` (4 bytes) - 0 = keep coverage only, 1 = output tinted shadow
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurUniforms {
    pub color: [f32; 4],
    pub resolution: [f32; 2],
    pub direction: [f32; 2],
    pub sigma: f32,
    pub extent: f32,
    pub saturation: f32,
    pub tint: u32,
}

/// Uniforms for effect passes
///
/// Memory layout (48 bytes total):
/// - resolution: `vec2<f32>` (8 bytes) - canvas size in pixels
/// - _pad: `vec2<f32>` (8 bytes)
/// - params: 2 x `vec4<f32>` (32 bytes) - effect specific
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EffectUniforms {
    pub resolution: [f32; 2],
    pub _pad: [f32; 2],
    pub params: [[f32; 4]; 2],
}

/// Uniforms for the blend/compose pass
///
/// Memory layout (32 bytes total):
/// - resolution: `vec2<f32>` (8 bytes)
/// - blend_mode: `u32` (4 bytes) - [`BlendMode::shader_code`]
/// - compose_mode: `u32` (4 bytes) - [`ComposeMode::shader_code`]
/// - src_alpha: `f32` (4 bytes) - layer alpha
/// - _pad: 3 x `f32` (12 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlendUniforms {
    pub resolution: [f32; 2],
    pub blend_mode: u32,
    pub compose_mode: u32,
    pub src_alpha: f32,
    pub _pad: [f32; 3],
}

impl BlendUniforms {
    pub fn new(
        resolution: (u32, u32),
        blend_mode: BlendMode,
        compose_mode: ComposeMode,
        src_alpha: f32,
    ) -> Self {
        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            blend_mode: blend_mode.shader_code(),
            compose_mode: compose_mode.shader_code(),
            src_alpha,
            _pad: [0.0; 3],
        }
    }
}

/// Uniforms for textured quads
///
/// Memory layout (176 bytes total):
/// - camera, transform: 2 x `mat4x4<f32>` (128 bytes)
/// - tex_coords: 2 x `vec4<f32>` (32 bytes) - corner uvs packed as (p0, p1), (p2, p3)
/// - alpha: `f32` (4 bytes)
/// - _pad: 3 x `f32` (12 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ImageUniforms {
    pub camera: [[f32; 4]; 4],
    pub transform: [[f32; 4]; 4],
    pub tex_coords: [[f32; 4]; 2],
    pub alpha: f32,
    pub _pad: [f32; 3],
}

impl ImageUniforms {
    /// `tex_coords` are the texture positions of the quad's top-left,
    /// top-right, bottom-right and bottom-left corners
    pub fn new(camera: &Mat4, transform: &Mat4, tex_coords: &[Point; 4], alpha: f32) -> Self {
        let [a, b, c, d] = tex_coords;
        Self {
            camera: camera.cols,
            transform: transform.cols,
            tex_coords: [[a.x, a.y, b.x, b.y], [c.x, c.y, d.x, d.y]],
            alpha,
            _pad: [0.0; 3],
        }
    }
}
