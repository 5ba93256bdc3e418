//! Deterministic font stand-ins
//!
//! Every character occupies a fixed cell and non-space characters draw a
//! solid box, so layouts and stencils can be checked without system fonts.

use std::cell::Cell;

use inkframe_core::FontDescriptor;

use crate::measure::{BoundingBox, TextMeasurements, TextMeasurer};
use crate::stencil::{StencilChannel, StencilImage, StencilRasterizer, StencilRequest};
use crate::FontError;

/// Monospace measurer with box-shaped glyphs
///
/// Glyph ink spans `[0.05, 0.55]` of a `0.6` em cell horizontally and
/// `ascent`/`descent` em vertically, independent of the character.
#[derive(Debug)]
pub struct MonospaceMeasurer {
    pub advance: f32,
    pub ink_start: f32,
    pub ink_end: f32,
    pub ascent: f32,
    pub descent: f32,
    calls: Cell<usize>,
}

impl Default for MonospaceMeasurer {
    fn default() -> Self {
        Self {
            advance: 0.6,
            ink_start: 0.05,
            ink_end: 0.55,
            ascent: 0.8,
            descent: 0.25,
            calls: Cell::new(0),
        }
    }
}

impl MonospaceMeasurer {
    /// Ink height per unit of font size
    pub fn height_ratio(&self) -> f32 {
        self.ascent + self.descent
    }

    /// Number of `measure` calls so far
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Horizontal ink span of character `index`, relative to the pen origin
    pub fn glyph_span(&self, index: usize, font_size: f32) -> (f32, f32) {
        let cell = index as f32 * self.advance;
        (
            (cell + self.ink_start) * font_size,
            (cell + self.ink_end) * font_size,
        )
    }
}

impl TextMeasurer for MonospaceMeasurer {
    fn measure(
        &self,
        text: &str,
        _font: &FontDescriptor,
        font_size: f32,
    ) -> Result<TextMeasurements, FontError> {
        self.calls.set(self.calls.get() + 1);
        let chars: Vec<char> = text.chars().collect();
        let advance = chars.len() as f32 * self.advance * font_size;
        let first = chars.iter().position(|c| !c.is_whitespace());
        let last = chars.iter().rposition(|c| !c.is_whitespace());
        let (Some(first), Some(last)) = (first, last) else {
            return Ok(TextMeasurements {
                advance,
                ..Default::default()
            });
        };
        let bounding_box = BoundingBox {
            top: self.ascent * font_size,
            bottom: self.descent * font_size,
            left: -self.glyph_span(first, font_size).0,
            right: self.glyph_span(last, font_size).1,
        };
        Ok(TextMeasurements::from_box(advance, bounding_box))
    }
}

/// Rasterizer drawing [`MonospaceMeasurer`] boxes
#[derive(Debug, Default)]
pub struct BlockRasterizer {
    pub glyphs: MonospaceMeasurer,
    rasterized: usize,
}

impl BlockRasterizer {
    /// Number of stencils drawn so far
    pub fn rasterized(&self) -> usize {
        self.rasterized
    }
}

impl StencilRasterizer for BlockRasterizer {
    fn rasterize(&mut self, request: &StencilRequest<'_>) -> Result<StencilImage, FontError> {
        self.rasterized += 1;
        let mut image = StencilImage::new(request.width, request.height)?;
        let passes = [StencilChannel::Stroke, StencilChannel::Fill];
        for channel in passes {
            for line in &request.layout.lines {
                let grow = match channel {
                    StencilChannel::Stroke if line.line_width > 0.0 => line.line_width / 2.0,
                    StencilChannel::Stroke => continue,
                    StencilChannel::Fill => 0.0,
                };
                let top = line.y - self.glyphs.ascent * line.font_size - grow;
                let bottom = line.y + self.glyphs.descent * line.font_size + grow;
                for (i, c) in line.text.chars().enumerate() {
                    if c.is_whitespace() {
                        continue;
                    }
                    let (x0, x1) = self.glyphs.glyph_span(i, line.font_size);
                    image.fill_rect(line.x + x0 - grow, top, line.x + x1 + grow, bottom, channel);
                }
            }
        }
        if request.debug.any() {
            image.draw_debug_overlays(request.layout, &request.debug);
        }
        Ok(image)
    }
}
