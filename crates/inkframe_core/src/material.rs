//! Materials: paint applied through a stencil mask

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::geometry::Point;

/// How a pattern texture is scaled onto a block
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScale {
    /// Stretch one pattern tile across the block
    Font,
    /// Tile size relative to the pattern's own pixel size
    Factor(Point),
}

/// Paint kind, dispatched to a GPU program by the compositing engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialKind {
    Disabled,
    Color {
        value: Color,
    },
    Pattern {
        name: String,
        scale: PatternScale,
        /// Degrees
        #[serde(default)]
        rotate: f32,
        #[serde(default)]
        shift: Point,
    },
    /// Four corner colors (top-left, top-right, bottom-right, bottom-left)
    Gradient4 {
        colors: [Color; 4],
    },
}

/// Blurred, tinted copy of a layer drawn beneath it
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub blur: f32,
    pub color: Color,
    #[serde(default)]
    pub offset: Point,
    #[serde(default = "default_saturation")]
    pub saturation: f32,
}

fn default_saturation() -> f32 {
    1.0
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            blur: 5.0,
            color: Color::BLACK,
            offset: Point::ZERO,
            saturation: 1.0,
        }
    }
}

fn default_alpha() -> f32 {
    1.0
}

/// A material with opacity and optional shadow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    #[serde(flatten)]
    pub kind: MaterialKind,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
}

impl Material {
    pub fn disabled() -> Self {
        Self {
            kind: MaterialKind::Disabled,
            alpha: 1.0,
            shadow: None,
        }
    }

    pub fn color(value: Color) -> Self {
        Self {
            kind: MaterialKind::Color { value },
            alpha: 1.0,
            shadow: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_shadow(mut self, shadow: Shadow) -> Self {
        self.shadow = Some(shadow);
        self
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.kind, MaterialKind::Disabled)
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::color(Color::WHITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_json_is_internally_tagged() {
        let json = r##"{"type":"color","value":"#ff0000","alpha":0.5}"##;
        let material: Material = serde_json::from_str(json).unwrap();
        assert_eq!(material.kind, MaterialKind::Color { value: Color::RED });
        assert_eq!(material.alpha, 0.5);
        assert!(material.shadow.is_none());
    }

    #[test]
    fn unknown_material_tag_is_rejected() {
        let json = r#"{"type":"hologram","alpha":1}"#;
        assert!(serde_json::from_str::<Material>(json).is_err());
    }

    #[test]
    fn pattern_scale_variants() {
        let json = r#"{"type":"pattern","name":"bricks","scale":"font","alpha":1}"#;
        let material: Material = serde_json::from_str(json).unwrap();
        match material.kind {
            MaterialKind::Pattern { scale, rotate, .. } => {
                assert_eq!(scale, PatternScale::Font);
                assert_eq!(rotate, 0.0);
            }
            other => panic!("unexpected material {other:?}"),
        }
    }
}
