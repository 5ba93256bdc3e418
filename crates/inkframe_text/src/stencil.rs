//! Glyph-mask rasterization seam
//!
//! A stencil is an RGBA8 image holding two coverage masks: the stroke in the
//! red channel and the fill in the green channel. One texture then serves
//! both the stroke and the fill pass of a text block.

use inkframe_core::FontDescriptor;

use crate::layout::TextLayout;
use crate::FontError;

/// Which coverage mask of a stencil a draw reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilChannel {
    Stroke,
    Fill,
}

impl StencilChannel {
    /// Byte offset inside an RGBA pixel
    pub fn offset(self) -> usize {
        match self {
            StencilChannel::Stroke => 0,
            StencilChannel::Fill => 1,
        }
    }

    /// Bit in a channel mask
    pub fn bit(self) -> u32 {
        match self {
            StencilChannel::Stroke => 1,
            StencilChannel::Fill => 2,
        }
    }
}

/// Diagnostic overlays burned into stencils
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StencilDebugSettings {
    pub draw_stencil_border: bool,
    pub draw_baseline: bool,
    pub draw_line_border: bool,
}

impl StencilDebugSettings {
    pub fn any(&self) -> bool {
        self.draw_stencil_border || self.draw_baseline || self.draw_line_border
    }
}

/// CPU-side stencil pixels
#[derive(Clone, Debug, PartialEq)]
pub struct StencilImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows
    pub data: Vec<u8>,
}

impl StencilImage {
    /// Blank stencil; fails when the pixel buffer size overflows
    pub fn new(width: u32, height: u32) -> Result<Self, FontError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or(FontError::StencilSize { width, height })?;
        Ok(Self {
            width,
            height,
            data: vec![0; len],
        })
    }

    /// Coverage of one channel at a pixel
    pub fn coverage(&self, x: u32, y: u32, channel: StencilChannel) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[(y as usize * self.width as usize + x as usize) * 4 + channel.offset()]
    }

    /// Raise coverage at a pixel; coverage of overlapping glyphs takes the maximum
    pub fn accumulate(&mut self, x: i32, y: i32, offset: usize, value: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4 + offset;
        let texel = &mut self.data[index];
        *texel = (*texel).max(value);
    }

    /// Composite an 8-bit alpha mask whose top-left corner lands at `(left, top)`
    pub fn blit_mask(
        &mut self,
        mask: &[u8],
        mask_width: u32,
        mask_height: u32,
        left: i32,
        top: i32,
        channel: StencilChannel,
    ) {
        for row in 0..mask_height as i32 {
            for col in 0..mask_width as i32 {
                let value = mask[(row * mask_width as i32 + col) as usize];
                if value > 0 {
                    self.accumulate(left + col, top + row, channel.offset(), value);
                }
            }
        }
    }

    /// Fill a pixel rectangle in one channel
    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, channel: StencilChannel) {
        self.fill_rect_raw(x0, y0, x1, y1, channel.offset(), 255);
    }

    fn fill_rect_raw(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, offset: usize, value: u8) {
        let (x0, x1) = (x0.min(x1).round() as i32, x0.max(x1).round() as i32);
        let (y0, y1) = (y0.min(y1).round() as i32, y0.max(y1).round() as i32);
        for y in y0..y1 {
            for x in x0..x1 {
                self.accumulate(x, y, offset, value);
            }
        }
    }

    fn stroke_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, offset: usize, value: u8) {
        let h = width / 2.0;
        self.fill_rect_raw(x0 - h, y0 - h, x1 + h, y0 + h, offset, value);
        self.fill_rect_raw(x0 - h, y1 - h, x1 + h, y1 + h, offset, value);
        self.fill_rect_raw(x0 - h, y0 - h, x0 + h, y1 + h, offset, value);
        self.fill_rect_raw(x1 - h, y0 - h, x1 + h, y1 + h, offset, value);
    }

    /// Burn the enabled debug overlays into the image
    pub fn draw_debug_overlays(&mut self, layout: &TextLayout, settings: &StencilDebugSettings) {
        let (w, h) = (self.width as f32, self.height as f32);
        if settings.draw_stencil_border {
            for (offset, value) in [(0, 0x0a), (1, 0xaa), (2, 0xaa)] {
                self.stroke_rect(0.0, 0.0, w, h, 3.0, offset, value);
                self.fill_rect_raw(w / 2.0 - 1.5, 0.0, w / 2.0 + 1.5, h, offset, value);
                self.fill_rect_raw(0.0, h / 2.0 - 1.5, w, h / 2.0 + 1.5, offset, value);
            }
        }
        for line in &layout.lines {
            let b = line.bounds;
            if settings.draw_baseline {
                let stroke = StencilChannel::Stroke.offset();
                self.fill_rect_raw(0.0, line.y - 0.5, w, line.y + 0.5, stroke, 255);
                self.fill_rect_raw(line.x - 0.5, line.y - b.top, line.x + 0.5, line.y + b.bottom, stroke, 255);
            }
            if settings.draw_line_border {
                self.stroke_rect(
                    line.x - b.left,
                    line.y - b.top,
                    line.x + b.right,
                    line.y + b.bottom,
                    1.0,
                    StencilChannel::Fill.offset(),
                    255,
                );
            }
        }
    }
}

/// Everything a rasterizer needs to draw one stencil
#[derive(Clone, Copy, Debug)]
pub struct StencilRequest<'a> {
    pub layout: &'a TextLayout,
    pub font: &'a FontDescriptor,
    pub width: u32,
    pub height: u32,
    pub debug: StencilDebugSettings,
}

/// Draws laid-out text into a two-channel stencil
///
/// Implementations stroke every line with its `line_width` and round joins
/// into the red channel, then fill every line into the green channel.
pub trait StencilRasterizer {
    fn rasterize(&mut self, request: &StencilRequest<'_>) -> Result<StencilImage, FontError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_takes_maximum_coverage() {
        let mut image = StencilImage::new(4, 4).unwrap();
        image.blit_mask(&[100, 200, 50, 10], 2, 2, 1, 1, StencilChannel::Fill);
        image.blit_mask(&[150], 1, 1, 1, 1, StencilChannel::Fill);
        assert_eq!(image.coverage(1, 1, StencilChannel::Fill), 150);
        assert_eq!(image.coverage(2, 1, StencilChannel::Fill), 200);
        assert_eq!(image.coverage(1, 1, StencilChannel::Stroke), 0);
    }

    #[test]
    fn out_of_bounds_writes_are_clipped() {
        let mut image = StencilImage::new(2, 2).unwrap();
        image.blit_mask(&[255; 9], 3, 3, -1, -1, StencilChannel::Stroke);
        assert_eq!(image.coverage(0, 0, StencilChannel::Stroke), 255);
        assert_eq!(image.coverage(1, 1, StencilChannel::Stroke), 255);
        assert_eq!(image.data.len(), 16);
    }

    #[test]
    fn oversized_stencil_is_rejected() {
        let huge = 1e10_f32 as u32;
        assert_eq!(huge, u32::MAX);
        assert_eq!(
            StencilImage::new(huge, huge),
            Err(FontError::StencilSize {
                width: huge,
                height: huge
            })
        );
    }

    #[test]
    fn channel_bits_and_offsets() {
        assert_eq!(StencilChannel::Stroke.bit() | StencilChannel::Fill.bit(), 3);
        assert_eq!(StencilChannel::Fill.offset(), 1);
    }
}
