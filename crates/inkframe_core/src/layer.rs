//! Layer settings: how a block's output merges into the frame

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// Color blend function applied where source and backdrop overlap
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    /// Bitwise XOR of the 8-bit color channels
    Xor,
}

impl BlendMode {
    pub const ALL: [BlendMode; 17] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
        BlendMode::Xor,
    ];

    /// Selector understood by the blend shader
    pub fn shader_code(self) -> u32 {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Multiply => 1,
            BlendMode::Screen => 2,
            BlendMode::Overlay => 3,
            BlendMode::Darken => 4,
            BlendMode::Lighten => 5,
            BlendMode::ColorDodge => 6,
            BlendMode::ColorBurn => 7,
            BlendMode::HardLight => 8,
            BlendMode::SoftLight => 9,
            BlendMode::Difference => 10,
            BlendMode::Exclusion => 11,
            BlendMode::Hue => 12,
            BlendMode::Saturation => 13,
            BlendMode::Color => 14,
            BlendMode::Luminosity => 15,
            BlendMode::Xor => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color_dodge",
            BlendMode::ColorBurn => "color_burn",
            BlendMode::HardLight => "hard_light",
            BlendMode::SoftLight => "soft_light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
            BlendMode::Xor => "xor",
        }
    }
}

impl FromStr for BlendMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlendMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownBlendMode(s.to_string()))
    }
}

/// Porter-Duff compositing operator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeMode {
    Clear,
    Copy,
    Destination,
    #[default]
    SourceOver,
    DestinationOver,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceAtop,
    DestinationAtop,
    Xor,
    Lighter,
}

impl ComposeMode {
    pub const ALL: [ComposeMode; 13] = [
        ComposeMode::Clear,
        ComposeMode::Copy,
        ComposeMode::Destination,
        ComposeMode::SourceOver,
        ComposeMode::DestinationOver,
        ComposeMode::SourceIn,
        ComposeMode::DestinationIn,
        ComposeMode::SourceOut,
        ComposeMode::DestinationOut,
        ComposeMode::SourceAtop,
        ComposeMode::DestinationAtop,
        ComposeMode::Xor,
        ComposeMode::Lighter,
    ];

    pub fn shader_code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            ComposeMode::Clear => "clear",
            ComposeMode::Copy => "copy",
            ComposeMode::Destination => "destination",
            ComposeMode::SourceOver => "source_over",
            ComposeMode::DestinationOver => "destination_over",
            ComposeMode::SourceIn => "source_in",
            ComposeMode::DestinationIn => "destination_in",
            ComposeMode::SourceOut => "source_out",
            ComposeMode::DestinationOut => "destination_out",
            ComposeMode::SourceAtop => "source_atop",
            ComposeMode::DestinationAtop => "destination_atop",
            ComposeMode::Xor => "xor",
            ComposeMode::Lighter => "lighter",
        }
    }

    /// Porter-Duff coverage factors `(Fa, Fb)` for source alpha `sa` and backdrop alpha `da`
    pub fn factors(self, sa: f32, da: f32) -> (f32, f32) {
        match self {
            ComposeMode::Clear => (0.0, 0.0),
            ComposeMode::Copy => (1.0, 0.0),
            ComposeMode::Destination => (0.0, 1.0),
            ComposeMode::SourceOver => (1.0, 1.0 - sa),
            ComposeMode::DestinationOver => (1.0 - da, 1.0),
            ComposeMode::SourceIn => (da, 0.0),
            ComposeMode::DestinationIn => (0.0, sa),
            ComposeMode::SourceOut => (1.0 - da, 0.0),
            ComposeMode::DestinationOut => (0.0, 1.0 - sa),
            ComposeMode::SourceAtop => (da, 1.0 - sa),
            ComposeMode::DestinationAtop => (1.0 - da, sa),
            ComposeMode::Xor => (1.0 - da, 1.0 - sa),
            ComposeMode::Lighter => (1.0, 1.0),
        }
    }
}

impl FromStr for ComposeMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComposeMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownComposeMode(s.to_string()))
    }
}

fn default_alpha() -> f32 {
    1.0
}

/// Blend mode, compose mode and opacity of one block
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSettings {
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub compose_mode: ComposeMode,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Normal,
            compose_mode: ComposeMode::SourceOver,
            alpha: 1.0,
        }
    }
}

impl LayerSettings {
    pub fn new(blend_mode: BlendMode, compose_mode: ComposeMode, alpha: f32) -> Self {
        Self {
            blend_mode,
            compose_mode,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_mode_names_parse_back() {
        for mode in BlendMode::ALL {
            assert_eq!(mode.name().parse::<BlendMode>().unwrap(), mode);
        }
        assert!(matches!(
            "vivid_light".parse::<BlendMode>(),
            Err(ConfigurationError::UnknownBlendMode(_))
        ));
    }

    #[test]
    fn compose_codes_are_dense() {
        for (i, mode) in ComposeMode::ALL.into_iter().enumerate() {
            assert_eq!(mode.shader_code(), i as u32);
            assert_eq!(mode.name().parse::<ComposeMode>().unwrap(), mode);
        }
    }

    #[test]
    fn xor_clears_full_overlap() {
        let (fa, fb) = ComposeMode::Xor.factors(1.0, 1.0);
        assert_eq!(fa * 1.0 + fb * 1.0, 0.0);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let settings: LayerSettings =
            serde_json::from_str(r#"{"blend_mode":"color_dodge","compose_mode":"destination_atop"}"#)
                .unwrap();
        assert_eq!(settings.blend_mode, BlendMode::ColorDodge);
        assert_eq!(settings.compose_mode, ComposeMode::DestinationAtop);
        assert_eq!(settings.alpha, 1.0);
    }
}
