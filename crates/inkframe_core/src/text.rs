//! Text styling: font selection, case, alignment and font-size strategy

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::material::Material;

/// Font family plus the style bits that select a face
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontDescriptor {
    pub family: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub small_caps: bool,
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            bold: false,
            italic: false,
            small_caps: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    /// Stable key such as `Impact_italic_bold_small-caps`
    pub fn key(&self) -> String {
        let mut key = self.family.clone();
        if self.italic {
            key.push_str("_italic");
        }
        if self.bold {
            key.push_str("_bold");
        }
        if self.small_caps {
            key.push_str("_small-caps");
        }
        key
    }
}

impl Default for FontDescriptor {
    fn default() -> Self {
        Self::new("Impact")
    }
}

/// Case transform applied before layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    AsIs,
    #[default]
    Upper,
    Lower,
}

impl TextCase {
    pub fn apply(self, text: &str) -> String {
        match self {
            TextCase::AsIs => text.to_string(),
            TextCase::Upper => text.to_uppercase(),
            TextCase::Lower => text.to_lowercase(),
        }
    }
}

/// Horizontal alignment of lines inside the text box
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical placement of the line stack inside the text box
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextBaseline {
    Top,
    #[default]
    Middle,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedUnit {
    Px,
    Pt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeUnit {
    /// Percent of frame width
    Vw,
    /// Percent of frame height
    Vh,
}

/// How the font size of a text block is chosen
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FontSizeStrategy {
    /// One size for all lines, the largest that fits the box
    #[default]
    SameHeight,
    /// Every line sized to fill the box width
    SameWidth,
    Fixed { value: f32, unit: FixedUnit },
    Relative { value: f32, unit: RelativeUnit },
}

impl FontSizeStrategy {
    pub fn is_relative(&self) -> bool {
        matches!(self, FontSizeStrategy::Relative { .. })
    }
}

/// Full style of a text block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font: FontDescriptor,
    pub case: TextCase,
    pub align: TextAlign,
    pub baseline: TextBaseline,
    /// Extra gap between lines as a fraction of line height
    pub line_spacing: f32,
    /// Stroke width in percent of font size (0..=100)
    pub stroke_width: f32,
    pub font_size_strategy: FontSizeStrategy,
    pub fill: Material,
    pub stroke: Material,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: FontDescriptor::default(),
            case: TextCase::Upper,
            align: TextAlign::Center,
            baseline: TextBaseline::Middle,
            line_spacing: -0.125,
            stroke_width: 14.0,
            font_size_strategy: FontSizeStrategy::SameHeight,
            fill: Material::color(Color::WHITE),
            stroke: Material::color(Color::BLACK),
        }
    }
}

impl TextStyle {
    /// Stroke width as a fraction of font size; zero when the stroke is disabled
    pub fn stroke_fraction(&self) -> f32 {
        if self.stroke.is_disabled() {
            0.0
        } else {
            self.stroke_width.max(0.0) / 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_key_orders_style_bits() {
        let font = FontDescriptor {
            family: "Lobster".into(),
            bold: true,
            italic: true,
            small_caps: true,
        };
        assert_eq!(font.key(), "Lobster_italic_bold_small-caps");
        assert_eq!(FontDescriptor::new("Impact").key(), "Impact");
    }

    #[test]
    fn case_transform() {
        assert_eq!(TextCase::Upper.apply("hello мир"), "HELLO МИР");
        assert_eq!(TextCase::Lower.apply("HeLLo"), "hello");
        assert_eq!(TextCase::AsIs.apply("HeLLo"), "HeLLo");
    }

    #[test]
    fn disabled_stroke_has_no_width() {
        let mut style = TextStyle::default();
        assert!((style.stroke_fraction() - 0.14).abs() < 1e-6);
        style.stroke = Material::disabled();
        assert_eq!(style.stroke_fraction(), 0.0);
    }

    #[test]
    fn strategy_json() {
        let strategy: FontSizeStrategy =
            serde_json::from_str(r#"{"type":"fixed","value":12,"unit":"pt"}"#).unwrap();
        assert_eq!(
            strategy,
            FontSizeStrategy::Fixed {
                value: 12.0,
                unit: FixedUnit::Pt
            }
        );
        assert!(serde_json::from_str::<FontSizeStrategy>(r#"{"type":"biggest"}"#).is_err());
    }
}
