//! Frames and blocks: the document handed to the compositor

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::effect::Effect;
use crate::geometry::Rectangle;
use crate::layer::LayerSettings;
use crate::text::TextStyle;

/// Auto-layout relative to the frame, all values fractions of frame size
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalContainer {
    pub max_width: f32,
    pub max_height: f32,
    pub min_height: f32,
    /// Gap to the frame edge in units of font size
    pub text_padding: f32,
}

impl Default for GlobalContainer {
    fn default() -> Self {
        Self {
            max_width: 0.96,
            max_height: 0.4,
            min_height: 0.1,
            text_padding: 0.0,
        }
    }
}

/// Where a block is placed
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Container {
    Rectangle(Rectangle),
    Global(GlobalContainer),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub texture_id: String,
    /// Visible part of the image in normalized texture coordinates
    #[serde(default)]
    pub crop: Rectangle,
}

/// What a block draws
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text(TextContent),
    Image(ImageContent),
}

/// One visual unit of a frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub container: Container,
    pub content: Content,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub layer: LayerSettings,
}

impl Block {
    pub fn text(id: impl Into<String>, container: Container, text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            id: id.into(),
            container,
            content: Content::Text(TextContent {
                text: text.into(),
                style,
            }),
            effects: Vec::new(),
            layer: LayerSettings::default(),
        }
    }

    pub fn image(id: impl Into<String>, container: Container, texture_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            container,
            content: Content::Image(ImageContent {
                texture_id: texture_id.into(),
                crop: Rectangle::default(),
            }),
            effects: Vec::new(),
            layer: LayerSettings::default(),
        }
    }

    pub fn with_effects(mut self, effects: Vec<Effect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_layer(mut self, layer: LayerSettings) -> Self {
        self.layer = layer;
        self
    }
}

/// An ordered stack of blocks over a solid background
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    /// Bottom to top
    #[serde(default)]
    pub blocks: Vec<Block>,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background")]
    pub background_color: Color,
    #[serde(default = "default_background_alpha")]
    pub background_alpha: f32,
}

fn default_background() -> Color {
    Color::WHITE
}

fn default_background_alpha() -> f32 {
    1.0
}

impl Frame {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            blocks: Vec::new(),
            width,
            height,
            background_color: Color::WHITE,
            background_alpha: 1.0,
        }
    }

    pub fn with_background(mut self, color: Color, alpha: f32) -> Self {
        self.background_color = color;
        self.background_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }
}
