//! inkframe GPU compositor
//!
//! Stencil-masked materials, blurred shadows, effect chains and W3C blend
//! and compose modes, drawn with wgpu into pooled offscreen buffers.

pub mod compositor;
pub mod engine;
pub mod pool;
pub mod primitives;
pub mod registry;
pub mod shaders;
pub mod stencil;
pub mod textures;

pub use compositor::{crop_tex_coords, global_text_center, global_text_size, FrameCompositor, LayerDraw};
pub use engine::{BlurLimits, Buffer, CompositingEngine, CompositorConfig};
pub use pool::{BufferPool, GpuTargetAllocator, PoolStats, PooledBuffer, RenderTarget, TargetAllocator};
pub use registry::{EffectProgram, GraphicsContext, MaterialProgram, ProgramRegistry};
pub use stencil::{
    GpuStencilBackend, StencilBackend, StencilCache, StencilCacheStats, StencilId, StencilLookup,
    StencilTexture,
};
pub use textures::{GpuTexture, PatternRegistry, TextureStore};

use inkframe_core::ConfigurationError;
use inkframe_text::{FontError, LayoutError};
use thiserror::Error;

/// Device creation errors
#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,

    #[error("Failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("Failed to create engine resource: {0}")]
    Resource(String),
}

/// Buffer pool misuse and readback failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Buffer {0} is not held by this pool")]
    NotHeld(u64),

    #[error("{count} buffers still held at teardown")]
    Leaked { count: usize },

    #[error("Pixel readback failed: {0}")]
    Readback(String),

    #[error("Canvas of {width}x{height} exceeds the {max} pixel texture limit")]
    SizeLimit { width: u32, height: u32, max: u32 },
}

/// Texture lookup and upload errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextureError {
    #[error("Texture not found: {0}")]
    NotFound(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Invalid pixel data: {width}x{height} with {len} bytes")]
    InvalidData { width: u32, height: u32, len: usize },

    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),
}

/// Errors from drawing a frame
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Stencil evicted while in use")]
    MissingStencil,

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

impl From<FontError> for CompositorError {
    fn from(err: FontError) -> Self {
        CompositorError::Layout(LayoutError::Font(err))
    }
}
