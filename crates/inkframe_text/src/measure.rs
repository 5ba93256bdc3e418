//! Text measurement seam
//!
//! Layout never shapes text itself. It asks a [`TextMeasurer`] for the ink
//! box of a string at a given size and works from those numbers only.

use inkframe_core::FontDescriptor;

use crate::FontError;

/// Ink extents relative to the pen origin
///
/// The origin is the left end of the alphabetic baseline. All four values
/// are distances: `top` above the baseline, `bottom` below it, `left` to the
/// left of the origin and `right` to the right of it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

/// Measured size of a run of text
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextMeasurements {
    /// Sum of glyph advances
    pub advance: f32,
    /// Ink width, `left + right`
    pub width: f32,
    /// Ink height, `top + bottom`
    pub height: f32,
    pub bounding_box: BoundingBox,
}

impl TextMeasurements {
    pub fn from_box(advance: f32, bounding_box: BoundingBox) -> Self {
        Self {
            advance,
            width: bounding_box.left + bounding_box.right,
            height: bounding_box.top + bounding_box.bottom,
            bounding_box,
        }
    }
}

/// Frame dimensions for strategies sized relative to the frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeasureContext {
    pub frame_width: f32,
    pub frame_height: f32,
}

impl MeasureContext {
    pub fn new(frame_width: f32, frame_height: f32) -> Self {
        Self {
            frame_width,
            frame_height,
        }
    }
}

/// Measures single lines of text
pub trait TextMeasurer {
    fn measure(
        &self,
        text: &str,
        font: &FontDescriptor,
        font_size: f32,
    ) -> Result<TextMeasurements, FontError>;
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for &T {
    fn measure(
        &self,
        text: &str,
        font: &FontDescriptor,
        font_size: f32,
    ) -> Result<TextMeasurements, FontError> {
        (**self).measure(text, font, font_size)
    }
}
