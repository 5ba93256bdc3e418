//! Text fitting for inkframe
//!
//! This crate provides:
//! - Reference-string measurement (shaping via rustybuzz, ink boxes via ttf-parser)
//! - Per-font size/height tables sampled from a measurer
//! - Layout strategies that fit lines into a box
//! - Two-channel glyph masks (stroke and fill) rasterized with swash

pub mod layout;
pub mod measure;
pub mod metrics;
pub mod rasterizer;
pub mod registry;
pub mod stencil;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use layout::{LayoutLine, LayoutOptions, TextLayout, TextLayoutEngine};
pub use measure::{BoundingBox, MeasureContext, TextMeasurements, TextMeasurer};
pub use metrics::{
    FontMetricsProvider, FontMetricsStore, FontMetricsTable, FontStatistics, SampleMark,
    SamplingOptions, MAX_TABLE_SIZE, REFERENCE_TEXT,
};
pub use rasterizer::SwashStencilRasterizer;
pub use registry::{FontData, FontLibrary, ShapedGlyph};
pub use stencil::{
    StencilChannel, StencilDebugSettings, StencilImage, StencilRasterizer, StencilRequest,
};

use thiserror::Error;

/// Font lookup, parsing and rasterization errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FontError {
    #[error("Font not found: {0}")]
    NotFound(String),

    #[error("Failed to load font: {0}")]
    LoadError(String),

    #[error("Failed to parse font: {0}")]
    ParseError(String),

    #[error("Invalid font data")]
    InvalidFontData,

    #[error("Stencil of {width}x{height} pixels cannot be allocated")]
    StencilSize { width: u32, height: u32 },
}

/// Layout errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("No metrics loaded for font: {0}")]
    MissingMetrics(String),

    #[error("Invalid font size strategy: {0}")]
    InvalidStrategy(String),

    #[error("Invalid metrics table: {0}")]
    InvalidMetrics(String),

    #[error("Stencil of {width}x{height} exceeds the {max} pixel texture limit")]
    StencilTooLarge { width: f32, height: f32, max: u32 },

    #[error(transparent)]
    Font(#[from] FontError),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
