//! Frame compositor
//!
//! Draws a [`Frame`] in two phases. Resolution lays out every block, builds
//! its stencils and checks every texture it needs; any error surfaces here,
//! before the frame is touched. Drawing then runs each block's layer draws
//! through three pooled buffers:
//!
//! - **layer**: the draw's content, after effects
//! - **effect**: scratch for effects, then the blend result
//! - **composed**: everything blended so far
//!
//! After each blend the effect and composed roles swap. The last blend of
//! the frame writes straight into the presentation target.

use inkframe_core::{
    Block, Container, Content, Frame, GlobalContainer, LayerSettings, Mat4, Material, MaterialKind,
    Point, Rectangle, Shadow, TextBaseline, TextStyle,
};
use inkframe_text::{
    FontLibrary, LayoutOptions, MeasureContext, StencilChannel, StencilRasterizer,
    SwashStencilRasterizer, TextLayoutEngine, TextMeasurer,
};
use smallvec::SmallVec;

use crate::engine::{Buffer, CompositingEngine};
use crate::pool::RenderTarget;
use crate::registry::GraphicsContext;
use crate::stencil::{GpuStencilBackend, StencilCache, StencilCacheStats, StencilId};
use crate::textures::{PatternRegistry, TextureStore};
use crate::{CompositorError, TextureError};

/// One pass of a block, blended into the frame on its own
#[derive(Clone, Debug)]
pub enum LayerDraw {
    Shadow {
        stencil: StencilId,
        channel: StencilChannel,
        material: Material,
        shadow: Shadow,
    },
    Stencil {
        stencil: StencilId,
        channel: StencilChannel,
        material: Material,
    },
    Image {
        texture_id: String,
        tex_coords: [Point; 4],
    },
}

/// A block ready to draw
#[derive(Clone, Debug)]
struct ResolvedBlock {
    rectangle: Rectangle,
    channel_mask: u32,
    draws: SmallVec<[LayerDraw; 4]>,
}

#[derive(Clone, Copy)]
enum Slot {
    Layer = 0,
    Effect = 1,
    Composed = 2,
}

/// Three pooled buffers addressed by role
struct FrameSlots {
    buffers: [Buffer; 3],
    /// Buffer index per role
    roles: [usize; 3],
}

impl FrameSlots {
    fn acquire(engine: &mut CompositingEngine) -> Self {
        Self {
            buffers: [engine.acquire(), engine.acquire(), engine.acquire()],
            roles: [0, 1, 2],
        }
    }

    fn view(&self, slot: Slot) -> &wgpu::TextureView {
        &self.buffers[self.roles[slot as usize]].view
    }

    /// The blend result becomes the composed backdrop
    fn rotate(&mut self) {
        self.roles.swap(Slot::Effect as usize, Slot::Composed as usize);
    }

    fn release(self, engine: &mut CompositingEngine) {
        for buffer in self.buffers {
            engine.release(buffer);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Placement
// ─────────────────────────────────────────────────────────────────────────────

/// Size of an auto-placed text box
///
/// Height grows with the line count and shrinks slightly for long lines,
/// bounded by the container's min and max height.
pub fn global_text_size(
    global: &GlobalContainer,
    frame_width: f32,
    frame_height: f32,
    lines: usize,
    longest_line_chars: usize,
) -> (f32, f32) {
    let per_line = 0.175 + (0.03 * (2.5 - longest_line_chars as f32 / 10.0)).max(-0.05);
    let height = (lines as f32 * per_line)
        .min(global.max_height)
        .max(global.min_height);
    (frame_width * global.max_width, frame_height * height)
}

/// Centre of an auto-placed text box
pub fn global_text_center(
    global: &GlobalContainer,
    baseline: TextBaseline,
    frame_width: f32,
    frame_height: f32,
    height: f32,
    font_size: f32,
) -> Point {
    let padding = font_size * global.text_padding;
    let y = match baseline {
        TextBaseline::Top => height / 2.0 + padding,
        TextBaseline::Middle => frame_height / 2.0,
        TextBaseline::Bottom => frame_height - (height / 2.0 + padding),
    };
    Point::new(frame_width / 2.0, y)
}

/// Texture coordinates of the quad corners for a crop rectangle
///
/// `crop` is in normalized texture space; its rotation is applied in pixel
/// space so non-square images are not sheared.
pub fn crop_tex_coords(crop: &Rectangle, image_size: (u32, u32)) -> [Point; 4] {
    let (iw, ih) = (image_size.0.max(1) as f32, image_size.1.max(1) as f32);
    let m = Mat4::translation(crop.position.x, crop.position.y, 0.0)
        .mul(&Mat4::scale(1.0 / iw, 1.0 / ih, 1.0))
        .mul(&Mat4::rotation_z(crop.rotation))
        .mul(&Mat4::scale(crop.width * iw, crop.height * ih, 1.0));
    [
        m.transform_point(Point::new(-0.5, -0.5)),
        m.transform_point(Point::new(0.5, -0.5)),
        m.transform_point(Point::new(0.5, 0.5)),
        m.transform_point(Point::new(-0.5, 0.5)),
    ]
}

fn channel_mask(style: &TextStyle) -> u32 {
    let stroke = !style.stroke.is_disabled() as u32;
    let fill = !style.fill.is_disabled() as u32;
    stroke | (fill << 1)
}

/// Stroke shadow, stroke, fill shadow, fill; disabled materials are skipped
fn text_draws(stencil: StencilId, style: &TextStyle) -> SmallVec<[LayerDraw; 4]> {
    let mut draws = SmallVec::new();
    for (channel, material) in [
        (StencilChannel::Stroke, &style.stroke),
        (StencilChannel::Fill, &style.fill),
    ] {
        if material.is_disabled() {
            continue;
        }
        if let Some(shadow) = material.shadow {
            draws.push(LayerDraw::Shadow {
                stencil,
                channel,
                material: material.clone(),
                shadow,
            });
        }
        draws.push(LayerDraw::Stencil {
            stencil,
            channel,
            material: material.clone(),
        });
    }
    draws
}

// ─────────────────────────────────────────────────────────────────────────────
// Compositor
// ─────────────────────────────────────────────────────────────────────────────

/// Draws frames with a measurer `M` and a stencil rasterizer `R`
pub struct FrameCompositor<M, R> {
    engine: CompositingEngine,
    layout: TextLayoutEngine<M>,
    rasterizer: R,
    stencils: StencilCache<GpuStencilBackend>,
    textures: TextureStore,
    patterns: PatternRegistry,
    /// Offscreen target for snapshots and exports
    canvas: Option<RenderTarget>,
}

impl FrameCompositor<FontLibrary, SwashStencilRasterizer> {
    /// Compositor on system fonts; metrics are sampled on first use
    pub fn system(engine: CompositingEngine) -> Self {
        let fonts = FontLibrary::system();
        let options = LayoutOptions {
            probe_size: engine.config().probe_font_size,
            sample_missing_metrics: true,
            ..Default::default()
        };
        let layout = TextLayoutEngine::new(fonts.clone()).with_options(options);
        Self::new(engine, layout, SwashStencilRasterizer::new(fonts))
    }
}

impl<M: TextMeasurer, R: StencilRasterizer> FrameCompositor<M, R> {
    pub fn new(engine: CompositingEngine, layout: TextLayoutEngine<M>, rasterizer: R) -> Self {
        let device = engine.device().clone();
        let queue = engine.queue().clone();
        let stencils = StencilCache::new(GpuStencilBackend::new(device.clone(), queue.clone()))
            .with_debug(engine.config().stencil_debug);
        Self {
            engine,
            layout,
            rasterizer,
            stencils,
            textures: TextureStore::new(device, queue),
            patterns: PatternRegistry::new(),
            canvas: None,
        }
    }

    pub fn engine(&self) -> &CompositingEngine {
        &self.engine
    }

    pub fn layout_engine_mut(&mut self) -> &mut TextLayoutEngine<M> {
        &mut self.layout
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut TextureStore {
        &mut self.textures
    }

    pub fn patterns_mut(&mut self) -> &mut PatternRegistry {
        &mut self.patterns
    }

    pub fn stencil_stats(&self) -> StencilCacheStats {
        self.stencils.stats()
    }

    /// Advance the stencil cache generation, evicting unused stencils
    pub fn tick(&mut self) {
        self.stencils.tick();
    }

    fn check_material(&self, material: &Material) -> Result<(), TextureError> {
        if let MaterialKind::Pattern { name, .. } = &material.kind {
            self.textures.get(self.patterns.texture_id(name)?)?;
        }
        Ok(())
    }

    fn resolve_block(&mut self, block: &Block, frame: &Frame) -> Result<ResolvedBlock, CompositorError> {
        let (fw, fh) = (frame.width as f32, frame.height as f32);
        match &block.content {
            Content::Text(content) => {
                let style = &content.style;
                self.check_material(&style.stroke)?;
                self.check_material(&style.fill)?;

                let (width, height) = match &block.container {
                    Container::Rectangle(rectangle) => (rectangle.width, rectangle.height),
                    Container::Global(global) => {
                        let lines: Vec<&str> = content.text.split('\n').collect();
                        let longest = lines.iter().map(|line| line.chars().count()).max();
                        global_text_size(global, fw, fh, lines.len(), longest.unwrap_or(0))
                    }
                };
                let ctx = MeasureContext::new(fw, fh);
                let lookup = self.stencils.get(
                    &content.text,
                    style,
                    width,
                    height,
                    &ctx,
                    &mut self.layout,
                    &mut self.rasterizer,
                )?;
                let rectangle = match &block.container {
                    Container::Rectangle(rectangle) => *rectangle,
                    Container::Global(global) => {
                        let center = global_text_center(
                            global,
                            style.baseline,
                            fw,
                            fh,
                            height,
                            lookup.layout.font_size,
                        );
                        Rectangle::centered(width, height, center)
                    }
                };
                Ok(ResolvedBlock {
                    rectangle,
                    channel_mask: channel_mask(style),
                    draws: text_draws(lookup.id, style),
                })
            }
            Content::Image(content) => {
                let texture = self.textures.get(&content.texture_id)?;
                let rectangle = match &block.container {
                    Container::Rectangle(rectangle) => *rectangle,
                    Container::Global(global) => Rectangle::centered(
                        fw * global.max_width,
                        fh * global.max_height,
                        Point::new(fw / 2.0, fh / 2.0),
                    ),
                };
                let mut draws = SmallVec::new();
                draws.push(LayerDraw::Image {
                    texture_id: content.texture_id.clone(),
                    tex_coords: crop_tex_coords(&content.crop, texture.dimensions()),
                });
                Ok(ResolvedBlock {
                    rectangle,
                    channel_mask: 0,
                    draws,
                })
            }
        }
    }

    /// Draw `frame` into `target`, which must be `frame.width` × `frame.height`
    pub fn draw_frame(
        &mut self,
        frame: &Frame,
        target: &wgpu::TextureView,
    ) -> Result<(), CompositorError> {
        self.engine.resize(frame.width, frame.height)?;
        let resolved = frame
            .blocks
            .iter()
            .map(|block| self.resolve_block(block, frame))
            .collect::<Result<Vec<_>, _>>()?;

        let background_color = frame.background_color;
        let background = self.engine.solid_texture(
            background_color.with_alpha(background_color.a * frame.background_alpha),
        )?;

        let mut slots = FrameSlots::acquire(&mut self.engine);
        let result = self.draw_resolved(frame, &resolved, &background.view, target, &mut slots);
        slots.release(&mut self.engine);
        background.texture.destroy();
        result
    }

    fn draw_resolved(
        &mut self,
        frame: &Frame,
        resolved: &[ResolvedBlock],
        background: &wgpu::TextureView,
        target: &wgpu::TextureView,
        slots: &mut FrameSlots,
    ) -> Result<(), CompositorError> {
        let total: usize = resolved.iter().map(|block| block.draws.len()).sum();
        if total == 0 {
            // Transparent layer over the background
            self.engine.blend_to(
                &LayerSettings::default(),
                slots.view(Slot::Layer),
                background,
                target,
            );
            return Ok(());
        }

        let ctx = GraphicsContext::new(&self.textures, &self.patterns);
        let mut index = 0;
        for (block, resolved) in frame.blocks.iter().zip(resolved) {
            for draw in &resolved.draws {
                let has_effects = !block.effects.is_empty();
                // With effects the content goes to the effect slot first and
                // the chain writes the layer slot
                let content_slot = if has_effects { Slot::Effect } else { Slot::Layer };
                self.engine.clear(slots.view(content_slot));

                let destination = slots.view(content_slot);
                match draw {
                    LayerDraw::Shadow {
                        stencil,
                        channel,
                        material,
                        shadow,
                    } => {
                        let texture = self
                            .stencils
                            .texture(*stencil)
                            .ok_or(CompositorError::MissingStencil)?;
                        self.engine.draw_shadow(
                            &ctx,
                            &texture.view,
                            *channel,
                            resolved.channel_mask,
                            &resolved.rectangle,
                            material,
                            shadow,
                            destination,
                        )?;
                    }
                    LayerDraw::Stencil {
                        stencil,
                        channel,
                        material,
                    } => {
                        let texture = self
                            .stencils
                            .texture(*stencil)
                            .ok_or(CompositorError::MissingStencil)?;
                        self.engine.draw_stencil_layer(
                            &ctx,
                            &texture.view,
                            *channel,
                            resolved.channel_mask,
                            &resolved.rectangle,
                            material,
                            destination,
                        )?;
                    }
                    LayerDraw::Image {
                        texture_id,
                        tex_coords,
                    } => {
                        let texture = self.textures.get(texture_id)?;
                        self.engine.draw_image(
                            texture,
                            tex_coords,
                            &resolved.rectangle,
                            1.0,
                            destination,
                        );
                    }
                }

                if has_effects {
                    self.engine.draw_modifications(
                        &block.effects,
                        &resolved.rectangle,
                        slots.view(Slot::Effect),
                        slots.view(Slot::Layer),
                        true,
                    );
                }

                let backdrop = if index == 0 {
                    background
                } else {
                    slots.view(Slot::Composed)
                };
                let result = if index + 1 == total {
                    target
                } else {
                    slots.view(Slot::Effect)
                };
                self.engine
                    .blend_to(&block.layer, slots.view(Slot::Layer), backdrop, result);
                slots.rotate();
                index += 1;
            }
        }
        tracing::trace!("frame {}: {} layer draws", frame.id, total);
        Ok(())
    }

    /// Take the offscreen canvas, recreating it for a new size
    fn take_canvas(&mut self, size: (u32, u32)) -> RenderTarget {
        match self.canvas.take() {
            Some(canvas) if canvas.matches_size(size) => canvas,
            previous => {
                if let Some(previous) = previous {
                    previous.texture.destroy();
                }
                RenderTarget::new(
                    self.engine.device(),
                    size,
                    self.engine.config().texture_format,
                )
            }
        }
    }

    /// Draw `frame` offscreen and read it back as straight-alpha RGBA
    pub fn render_snapshot(&mut self, frame: &Frame) -> Result<image::RgbaImage, CompositorError> {
        self.engine.resize(frame.width, frame.height)?;
        let canvas = self.take_canvas(self.engine.size());
        let result = self
            .draw_frame(frame, &canvas.view)
            .and_then(|()| self.engine.read_pixels(&canvas).map_err(Into::into));
        self.canvas = Some(canvas);
        result
    }

    /// Draw `frame` offscreen and encode it as PNG
    pub fn export_png(&mut self, frame: &Frame) -> Result<Vec<u8>, CompositorError> {
        let snapshot = self.render_snapshot(frame)?;
        let mut bytes = Vec::new();
        snapshot
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| CompositorError::Encode(e.to_string()))?;
        tracing::debug!("exported frame {} ({} bytes)", frame.id, bytes.len());
        Ok(bytes)
    }

    /// Release every GPU resource the compositor owns
    pub fn teardown(&mut self) -> Result<(), CompositorError> {
        self.stencils.teardown();
        self.textures.clear();
        if let Some(canvas) = self.canvas.take() {
            canvas.texture.destroy();
        }
        self.engine.teardown()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkframe_core::Color;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn global_text_height_follows_line_count() {
        let global = GlobalContainer::default();
        // Short lines: 0.175 + 0.03 * (2.5 - 0.5) = 0.235 per line
        let (w, h) = global_text_size(&global, 500.0, 1000.0, 1, 5);
        assert!((w - 480.0).abs() < 1e-3);
        assert!((h - 235.0).abs() < 1e-3);
        // Three lines hit max_height
        let (_, h) = global_text_size(&global, 500.0, 1000.0, 3, 5);
        assert!((h - 400.0).abs() < 1e-3);
        // Very long lines bottom out at 0.125 per line, then min_height applies
        let tight = GlobalContainer {
            min_height: 0.2,
            ..global
        };
        let (_, h) = global_text_size(&tight, 500.0, 1000.0, 1, 200);
        assert!((h - 200.0).abs() < 1e-3);
    }

    #[test]
    fn global_text_center_by_baseline() {
        let global = GlobalContainer {
            text_padding: 0.5,
            ..Default::default()
        };
        let top = global_text_center(&global, TextBaseline::Top, 400.0, 300.0, 100.0, 20.0);
        let middle = global_text_center(&global, TextBaseline::Middle, 400.0, 300.0, 100.0, 20.0);
        let bottom = global_text_center(&global, TextBaseline::Bottom, 400.0, 300.0, 100.0, 20.0);
        assert!(close(top, Point::new(200.0, 60.0)));
        assert!(close(middle, Point::new(200.0, 150.0)));
        assert!(close(bottom, Point::new(200.0, 240.0)));
    }

    #[test]
    fn default_crop_covers_whole_texture() {
        let coords = crop_tex_coords(&Rectangle::default(), (640, 480));
        let expected = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        for (got, want) in coords.iter().zip(expected) {
            assert!(close(*got, want), "{got:?} != {want:?}");
        }
    }

    #[test]
    fn crop_selects_sub_rectangle() {
        // Right half of the image
        let crop = Rectangle::centered(0.5, 1.0, Point::new(0.75, 0.5));
        let coords = crop_tex_coords(&crop, (200, 100));
        assert!(close(coords[0], Point::new(0.5, 0.0)));
        assert!(close(coords[2], Point::new(1.0, 1.0)));
    }

    #[test]
    fn text_draw_order_and_mask() {
        let shadowed = Material::color(Color::BLACK).with_shadow(Shadow::default());
        let style = TextStyle {
            stroke: shadowed,
            ..Default::default()
        };
        let id = StencilId::default();
        let draws = text_draws(id, &style);
        let kinds: Vec<(&str, StencilChannel)> = draws
            .iter()
            .map(|draw| match draw {
                LayerDraw::Shadow { channel, .. } => ("shadow", *channel),
                LayerDraw::Stencil { channel, .. } => ("stencil", *channel),
                LayerDraw::Image { .. } => ("image", StencilChannel::Fill),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("shadow", StencilChannel::Stroke),
                ("stencil", StencilChannel::Stroke),
                ("stencil", StencilChannel::Fill),
            ]
        );
        assert_eq!(channel_mask(&style), 3);

        let hollow = TextStyle {
            fill: Material::disabled(),
            ..Default::default()
        };
        assert_eq!(channel_mask(&hollow), 1);
        assert_eq!(text_draws(id, &hollow).len(), 1);
    }
}
