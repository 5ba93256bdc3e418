//! Glyph mask rasterization using swash
//!
//! Each line of a layout is shaped, then every glyph outline is rendered
//! twice: once stroked (red channel) and once filled (green channel).

use swash::scale::{Render, ScaleContext, Source};
use swash::zeno::{Format, Join, Stroke, Vector};

use crate::layout::LayoutLine;
use crate::registry::{FontData, FontLibrary};
use crate::stencil::{StencilChannel, StencilImage, StencilRasterizer, StencilRequest};
use crate::FontError;

/// Stencil rasterizer backed by system fonts
pub struct SwashStencilRasterizer {
    fonts: FontLibrary,
    /// Swash scale context (caches scaling state)
    context: ScaleContext,
}

impl SwashStencilRasterizer {
    pub fn new(fonts: FontLibrary) -> Self {
        Self {
            fonts,
            context: ScaleContext::new(),
        }
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    fn draw_line(
        &mut self,
        image: &mut StencilImage,
        face: &FontData,
        small_caps: bool,
        line: &LayoutLine,
        channel: StencilChannel,
    ) -> Result<(), FontError> {
        let font_size = line.font_size;
        let glyphs = self.fonts.shape(face, &line.text, small_caps)?;
        let font = swash::FontRef::from_index(face.data(), face.index() as usize)
            .ok_or(FontError::InvalidFontData)?;
        let scale = font_size / face.units_per_em();

        let mut scaler = self
            .context
            .builder(font)
            .size(font_size)
            .hint(false)
            .build();

        let mut render = Render::new(&[Source::Outline]);
        render.format(Format::Alpha);
        if channel == StencilChannel::Stroke {
            let mut stroke = Stroke::new(line.line_width);
            stroke.join(Join::Round);
            render.style(stroke);
        }

        let baseline = line.y.round();
        let mut pen = line.x;
        for glyph in glyphs {
            let x = pen + glyph.x_offset * scale;
            let y = baseline - glyph.y_offset * scale;
            let (whole_x, frac_x) = (x.floor(), x - x.floor());
            render.offset(Vector::new(frac_x, 0.0));
            if let Some(mask) = render.render(&mut scaler, glyph.glyph_id) {
                image.blit_mask(
                    &mask.data,
                    mask.placement.width,
                    mask.placement.height,
                    whole_x as i32 + mask.placement.left,
                    y as i32 - mask.placement.top,
                    channel,
                );
            }
            pen += glyph.x_advance * scale;
        }
        Ok(())
    }
}

impl StencilRasterizer for SwashStencilRasterizer {
    fn rasterize(&mut self, request: &StencilRequest<'_>) -> Result<StencilImage, FontError> {
        let face = self.fonts.face(request.font)?;
        let mut image = StencilImage::new(request.width, request.height)?;

        for channel in [StencilChannel::Stroke, StencilChannel::Fill] {
            for line in &request.layout.lines {
                if channel == StencilChannel::Stroke && line.line_width <= 0.0 {
                    continue;
                }
                self.draw_line(&mut image, &face, request.font.small_caps, line, channel)?;
            }
        }

        if request.debug.any() {
            image.draw_debug_overlays(request.layout, &request.debug);
        }
        tracing::trace!(
            "rasterized stencil {}x{} with {} lines",
            request.width,
            request.height,
            request.layout.lines.len()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextLayout;
    use crate::measure::TextMeasurer;
    use crate::stencil::StencilDebugSettings;
    use inkframe_core::{FontDescriptor, TextAlign, TextBaseline};

    fn single_line(fonts: &FontLibrary, font: &FontDescriptor, line_width: f32) -> TextLayout {
        let measured = fonts.measure("HI", font, 40.0).unwrap();
        TextLayout {
            lines: vec![LayoutLine {
                text: "HI".to_string(),
                x: 10.0,
                y: 50.0,
                font_size: 40.0,
                line_width,
                bounds: measured.bounding_box,
            }],
            font_size: 40.0,
            line_width,
            line_height: 40.0,
            total_height: 40.0,
            align: TextAlign::Left,
            baseline: TextBaseline::Top,
        }
    }

    fn render(line_width: f32) -> Option<StencilImage> {
        let fonts = FontLibrary::system();
        let font = FontDescriptor::new("DejaVu Sans");
        // Skip when no fonts are installed
        fonts.face(&font).ok()?;
        let layout = single_line(&fonts, &font, line_width);
        let mut rasterizer = SwashStencilRasterizer::new(fonts);
        let image = rasterizer
            .rasterize(&StencilRequest {
                layout: &layout,
                font: &font,
                width: 128,
                height: 64,
                debug: StencilDebugSettings::default(),
            })
            .unwrap();
        Some(image)
    }

    fn channel_sum(image: &StencilImage, channel: StencilChannel) -> u64 {
        (0..image.height)
            .flat_map(|y| (0..image.width).map(move |x| (x, y)))
            .map(|(x, y)| image.coverage(x, y, channel) as u64)
            .sum()
    }

    #[test]
    fn stroke_covers_more_than_fill() {
        let Some(image) = render(6.0) else { return };
        let fill = channel_sum(&image, StencilChannel::Fill);
        let stroke = channel_sum(&image, StencilChannel::Stroke);
        assert!(fill > 0);
        assert!(stroke > fill);
    }

    #[test]
    fn zero_line_width_leaves_stroke_channel_empty() {
        let Some(image) = render(0.0) else { return };
        assert_eq!(channel_sum(&image, StencilChannel::Stroke), 0);
        assert!(channel_sum(&image, StencilChannel::Fill) > 0);
    }
}
