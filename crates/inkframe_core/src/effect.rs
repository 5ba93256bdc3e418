//! Per-block post-processing effects

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// A GPU post-processing pass applied after a block's content is drawn
///
/// Distances and centres are canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Random per-cell alpha grain
    Noise {
        radius: f32,
        min_alpha: f32,
        max_alpha: f32,
    },
    /// Magnify around `center`
    #[serde(alias = "bugle")]
    Bulge {
        center: Point,
        radius: f32,
        strength: f32,
    },
    /// Contract toward `center`
    Pinch {
        center: Point,
        radius: f32,
        strength: f32,
    },
    /// Rotate around `center`, fading out at `radius`
    Swirl {
        center: Point,
        radius: f32,
        /// Degrees
        angle: f32,
    },
    Pixelation {
        radius: f32,
    },
    BrightnessContrast {
        brightness: f32,
        contrast: f32,
    },
    Temperature {
        temperature: f32,
        strength: f32,
    },
}

impl Effect {
    pub fn noise() -> Self {
        Effect::Noise {
            radius: 10.0,
            min_alpha: 0.5,
            max_alpha: 1.0,
        }
    }

    pub fn bulge() -> Self {
        Effect::Bulge {
            center: Point::new(250.0, 250.0),
            radius: 500.0,
            strength: 0.5,
        }
    }

    pub fn pinch() -> Self {
        Effect::Pinch {
            center: Point::new(250.0, 250.0),
            radius: 500.0,
            strength: 0.5,
        }
    }

    pub fn swirl() -> Self {
        Effect::Swirl {
            center: Point::new(250.0, 250.0),
            radius: 500.0,
            angle: 180.0,
        }
    }

    pub fn pixelation() -> Self {
        Effect::Pixelation { radius: 10.0 }
    }

    /// Effect name as used in serialized frames and logs
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Noise { .. } => "noise",
            Effect::Bulge { .. } => "bulge",
            Effect::Pinch { .. } => "pinch",
            Effect::Swirl { .. } => "swirl",
            Effect::Pixelation { .. } => "pixelation",
            Effect::BrightnessContrast { .. } => "brightness_contrast",
            Effect::Temperature { .. } => "temperature",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_bugle_tag_is_accepted() {
        let json = r#"{"type":"bugle","center":{"x":1,"y":2},"radius":3,"strength":0.5}"#;
        let effect: Effect = serde_json::from_str(json).unwrap();
        assert_eq!(effect.name(), "bulge");
    }

    #[test]
    fn snake_case_tags() {
        let effect = Effect::BrightnessContrast {
            brightness: 0.1,
            contrast: 0.2,
        };
        let json = serde_json::to_value(effect).unwrap();
        assert_eq!(json["type"], "brightness_contrast");
    }
}
