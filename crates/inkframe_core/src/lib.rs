//! inkframe core data model
//!
//! Frames are ordered stacks of blocks. Each block places text or image
//! content in a rectangle, paints it through materials, runs an effect chain
//! and merges into the frame with its layer settings. Every tag is a closed
//! enum; unknown names are rejected at deserialization or `FromStr` time.

pub mod color;
pub mod effect;
pub mod frame;
pub mod geometry;
pub mod layer;
pub mod material;
pub mod schedule;
pub mod text;

pub use color::Color;
pub use effect::Effect;
pub use frame::{Block, Container, Content, Frame, GlobalContainer, ImageContent, TextContent};
pub use geometry::{Mat4, Point, Rectangle};
pub use layer::{BlendMode, ComposeMode, LayerSettings};
pub use material::{Material, MaterialKind, PatternScale, Shadow};
pub use schedule::{CoalescePolicy, CoalescingTrigger};
pub use text::{
    FixedUnit, FontDescriptor, FontSizeStrategy, RelativeUnit, TextAlign, TextBaseline, TextCase,
    TextStyle,
};

use thiserror::Error;

/// A tag or value outside the closed sets the engine understands
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown blend mode: {0}")]
    UnknownBlendMode(String),

    #[error("Unknown compose mode: {0}")]
    UnknownComposeMode(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),
}
