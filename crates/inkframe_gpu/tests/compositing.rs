//! GPU integration tests
//!
//! Each test returns early when no adapter is available.

use std::sync::Arc;

use inkframe_core::{
    Block, Color, ComposeMode, Container, Effect, FixedUnit, FontSizeStrategy, Frame,
    LayerSettings, Material, Point, Rectangle, Shadow, TextStyle,
};
use inkframe_gpu::{
    crop_tex_coords, CompositingEngine, CompositorConfig, CompositorError, FrameCompositor,
    GpuTexture, ResourceError,
};
use inkframe_text::LayoutError;
use inkframe_text::mock::{BlockRasterizer, MonospaceMeasurer};
use inkframe_text::TextLayoutEngine;

type MockCompositor = FrameCompositor<MonospaceMeasurer, BlockRasterizer>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper to create a test wgpu device
async fn create_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .ok()?;

    Some((device, queue))
}

fn create_engine() -> Option<CompositingEngine> {
    init_tracing();
    let (device, queue) = pollster::block_on(create_test_device())?;
    let engine =
        CompositingEngine::from_device(Arc::new(device), Arc::new(queue), CompositorConfig::default())
            .unwrap();
    Some(engine)
}

fn create_compositor() -> Option<MockCompositor> {
    let engine = create_engine()?;
    let layout = TextLayoutEngine::new(MonospaceMeasurer::default());
    Some(FrameCompositor::new(engine, layout, BlockRasterizer::default()))
}

fn full_frame(width: u32, height: u32) -> Rectangle {
    Rectangle::centered(
        width as f32,
        height as f32,
        Point::new(width as f32 / 2.0, height as f32 / 2.0),
    )
}

fn solid_frame(background: Color, layer: LayerSettings) -> Frame {
    let mut frame = Frame::new("solid", 8, 8).with_background(background, 1.0);
    frame.push(
        Block::image("red", Container::Rectangle(full_frame(8, 8)), "red").with_layer(layer),
    );
    frame
}

#[test]
fn red_image_over_blue_background() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    compositor
        .textures_mut()
        .insert("red", &[255, 0, 0, 255], 1, 1)
        .unwrap();

    let frame = solid_frame(Color::BLUE, LayerSettings::default());
    let snapshot = compositor.render_snapshot(&frame).unwrap();
    assert_eq!(snapshot.dimensions(), (8, 8));
    assert_eq!(snapshot.get_pixel(3, 4).0, [255, 0, 0, 255]);
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

#[test]
fn compose_xor_of_opaque_layers_is_transparent() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    compositor
        .textures_mut()
        .insert("red", &[255, 0, 0, 255], 1, 1)
        .unwrap();

    let layer = LayerSettings {
        compose_mode: ComposeMode::Xor,
        ..Default::default()
    };
    let snapshot = compositor
        .render_snapshot(&solid_frame(Color::BLUE, layer))
        .unwrap();
    assert_eq!(snapshot.get_pixel(4, 4).0[3], 0);
}

#[test]
fn empty_frame_shows_background() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let frame = Frame::new("empty", 4, 4).with_background(Color::GREEN, 1.0);
    let snapshot = compositor.render_snapshot(&frame).unwrap();
    for pixel in snapshot.pixels() {
        assert_eq!(pixel.0, [0, 255, 0, 255]);
    }
}

#[test]
fn neutral_effect_chain_is_identity() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let pixels = [
        200, 40, 10, 255, 10, 200, 40, 255, //
        40, 10, 200, 255, 120, 120, 120, 255,
    ];
    compositor
        .textures_mut()
        .insert("quad", &pixels, 2, 2)
        .unwrap();

    let plain = Block::image("photo", Container::Rectangle(full_frame(16, 16)), "quad");
    let neutral = Effect::BrightnessContrast {
        brightness: 0.0,
        contrast: 0.0,
    };
    let mut reference = Frame::new("plain", 16, 16);
    reference.push(plain.clone());
    let mut chained = Frame::new("chained", 16, 16);
    // Three passes exercise every slot of the rotation
    chained.push(plain.with_effects(vec![neutral; 3]));

    let expected = compositor.render_snapshot(&reference).unwrap();
    let actual = compositor.render_snapshot(&chained).unwrap();
    for (a, b) in expected.pixels().zip(actual.pixels()) {
        for (x, y) in a.0.iter().zip(b.0) {
            assert!(x.abs_diff(y) <= 2, "{:?} vs {:?}", a.0, b.0);
        }
    }
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

fn caption_frame() -> Frame {
    let style = TextStyle {
        font_size_strategy: FontSizeStrategy::Fixed {
            value: 24.0,
            unit: FixedUnit::Px,
        },
        fill: Material::color(Color::RED),
        stroke: Material::color(Color::BLACK),
        ..Default::default()
    };
    let mut frame = Frame::new("caption", 96, 64).with_background(Color::WHITE, 1.0);
    frame.push(Block::text(
        "caption",
        Container::Rectangle(full_frame(96, 64)),
        "HI",
        style,
    ));
    frame
}

#[test]
fn text_block_paints_fill_and_stroke() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let snapshot = compositor.render_snapshot(&caption_frame()).unwrap();
    let pixels: Vec<[u8; 4]> = snapshot.pixels().map(|p| p.0).collect();
    assert!(pixels.contains(&[255, 0, 0, 255]));
    assert!(pixels.contains(&[0, 0, 0, 255]));
    assert!(pixels.contains(&[255, 255, 255, 255]));
}

#[test]
fn rendering_is_deterministic_and_cached() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let frame = caption_frame();
    let first = compositor.export_png(&frame).unwrap();
    let second = compositor.export_png(&frame).unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with(b"\x89PNG"));

    let stats = compositor.stencil_stats();
    assert_eq!((stats.misses, stats.hits), (1, 1));
}

#[test]
fn frame_from_json_draws_shadowed_caption() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let frame: Frame = serde_json::from_str(
        r##"{
            "id": "json",
            "width": 64,
            "height": 64,
            "background_color": "#ffffff",
            "blocks": [{
                "id": "caption",
                "container": {"type": "global", "value": {"max_height": 0.5}},
                "content": {"type": "text", "text": "ok", "style": {
                    "font_size_strategy": {"type": "fixed", "value": 20, "unit": "px"},
                    "fill": {"type": "color", "value": "#ff0000",
                             "shadow": {"blur": 2, "color": "#000000"}}
                }}
            }]
        }"##,
    )
    .unwrap();
    let snapshot = compositor.render_snapshot(&frame).unwrap();
    assert_eq!(snapshot.dimensions(), (64, 64));
    assert_eq!(compositor.engine().pool_stats().held, 0);
    compositor.teardown().unwrap();
}

#[test]
fn missing_texture_fails_before_drawing() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let frame = solid_frame(Color::BLUE, LayerSettings::default());
    let err = compositor.render_snapshot(&frame).unwrap_err();
    assert!(err.to_string().contains("red"));
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

#[test]
fn texture_store_round_trip() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let source = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
    let mut png = Vec::new();
    source
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let store = compositor.textures_mut();
    store.insert_encoded("tile", &png).unwrap();
    assert!(store.contains("tile"));
    assert_eq!(store.get("tile").unwrap().dimensions(), (3, 2));
    assert!(store.delete("tile"));
    assert!(store.get("tile").is_err());
    assert!(store.insert_encoded("broken", b"not an image").is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Effects
// ─────────────────────────────────────────────────────────────────────────────

const GRADIENT_SIZE: u32 = 16;

/// Red grows along x, green along y
fn gradient() -> Vec<u8> {
    let mut pixels = Vec::new();
    for y in 0..GRADIENT_SIZE {
        for x in 0..GRADIENT_SIZE {
            pixels.extend_from_slice(&[(x * 16) as u8, (y * 16) as u8, 128, 255]);
        }
    }
    pixels
}

/// Gradient channel seen by a pixelated pixel
///
/// Cell centres fall between two texels, so linear filtering averages them.
fn pixelated(index: u32, cell: u32) -> f32 {
    let centre = ((index / cell) as f32 + 0.5) * cell as f32;
    16.0 * (centre - 0.5)
}

fn brighten(value: f32, brightness: f32) -> f32 {
    (value / 255.0 + brightness).clamp(0.0, 1.0) * 255.0
}

fn contrast(value: f32, contrast: f32) -> f32 {
    ((value / 255.0 - 0.5) * (1.0 + contrast) + 0.5).clamp(0.0, 1.0) * 255.0
}

fn assert_pixels(image: &image::RgbaImage, expected: impl Fn(u32, u32) -> [f32; 4]) {
    for (x, y, pixel) in image.enumerate_pixels() {
        let want = expected(x, y);
        for (got, want) in pixel.0.iter().zip(want) {
            assert!(
                (*got as f32 - want).abs() <= 2.0,
                "pixel ({}, {}): {:?} vs {:?}",
                x,
                y,
                pixel.0,
                expected(x, y)
            );
        }
    }
}

fn gradient_frame(effects: Vec<Effect>) -> Frame {
    let mut frame = Frame::new("gradient", GRADIENT_SIZE, GRADIENT_SIZE);
    frame.push(
        Block::image(
            "photo",
            Container::Rectangle(full_frame(GRADIENT_SIZE, GRADIENT_SIZE)),
            "gradient",
        )
        .with_effects(effects),
    );
    frame
}

fn gradient_compositor() -> Option<MockCompositor> {
    let mut compositor = create_compositor()?;
    compositor
        .textures_mut()
        .insert("gradient", &gradient(), GRADIENT_SIZE, GRADIENT_SIZE)
        .unwrap();
    Some(compositor)
}

#[test]
fn single_effect_adjusts_contrast() {
    let Some(mut compositor) = gradient_compositor() else {
        return;
    };
    let frame = gradient_frame(vec![Effect::BrightnessContrast {
        brightness: 0.0,
        contrast: 1.0,
    }]);
    let snapshot = compositor.render_snapshot(&frame).unwrap();
    assert_pixels(&snapshot, |x, y| {
        [
            contrast((x * 16) as f32, 1.0),
            contrast((y * 16) as f32, 1.0),
            contrast(128.0, 1.0),
            255.0,
        ]
    });
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

#[test]
fn two_effect_chain_pixelates_then_brightens() {
    let Some(mut compositor) = gradient_compositor() else {
        return;
    };
    let frame = gradient_frame(vec![
        Effect::Pixelation { radius: 4.0 },
        Effect::BrightnessContrast {
            brightness: 0.2,
            contrast: 0.0,
        },
    ]);
    let snapshot = compositor.render_snapshot(&frame).unwrap();
    assert_pixels(&snapshot, |x, y| {
        [
            brighten(pixelated(x, 4), 0.2),
            brighten(pixelated(y, 4), 0.2),
            brighten(128.0, 0.2),
            255.0,
        ]
    });
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

#[test]
fn chain_without_source_reuse_leaves_source_intact() {
    let Some(mut engine) = create_engine() else {
        return;
    };
    engine.resize(GRADIENT_SIZE, GRADIENT_SIZE).unwrap();
    let rectangle = full_frame(GRADIENT_SIZE, GRADIENT_SIZE);
    let texture = GpuTexture::from_rgba(
        engine.device(),
        engine.queue(),
        &gradient(),
        GRADIENT_SIZE,
        GRADIENT_SIZE,
        Some("Gradient"),
    )
    .unwrap();
    let tex_coords = crop_tex_coords(&Rectangle::default(), (GRADIENT_SIZE, GRADIENT_SIZE));

    let source = engine.acquire();
    engine.draw_image(&texture, &tex_coords, &rectangle, 1.0, &source.view);
    let destination = engine.acquire();
    // Three passes write both temporaries
    let effects = [
        Effect::Pixelation { radius: 4.0 },
        Effect::BrightnessContrast {
            brightness: 0.2,
            contrast: 0.0,
        },
        Effect::BrightnessContrast {
            brightness: -0.2,
            contrast: 0.0,
        },
    ];
    engine.draw_modifications(&effects, &rectangle, &source.view, &destination.view, false);

    let original = engine.read_pixels(&source).unwrap();
    let chained = engine.read_pixels(&destination).unwrap();
    engine.release(source);
    engine.release(destination);
    assert_eq!(engine.pool_stats().held, 0);

    assert_pixels(&original, |x, y| [(x * 16) as f32, (y * 16) as f32, 128.0, 255.0]);
    assert_pixels(&chained, |x, y| {
        let channel = |v: f32| brighten(brighten(v, 0.2), -0.2);
        [
            channel(pixelated(x, 4)),
            channel(pixelated(y, 4)),
            channel(128.0),
            255.0,
        ]
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Shadows and limits
// ─────────────────────────────────────────────────────────────────────────────

fn glyph_frame(shadow: Option<Shadow>) -> Frame {
    let mut fill = Material::color(Color::RED);
    fill.shadow = shadow;
    let style = TextStyle {
        font_size_strategy: FontSizeStrategy::Fixed {
            value: 16.0,
            unit: FixedUnit::Px,
        },
        fill,
        stroke: Material::disabled(),
        ..Default::default()
    };
    let mut frame = Frame::new("glyph", 64, 64).with_background(Color::WHITE, 1.0);
    frame.push(Block::text(
        "glyph",
        Container::Rectangle(full_frame(64, 64)),
        "I",
        style,
    ));
    frame
}

#[test]
fn blurred_shadow_spreads_past_glyph_in_shadow_color() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let plain = compositor.render_snapshot(&glyph_frame(None)).unwrap();
    let shadowed = compositor
        .render_snapshot(&glyph_frame(Some(Shadow {
            blur: 3.0,
            color: Color::BLUE,
            offset: Point::ZERO,
            saturation: 1.0,
        })))
        .unwrap();

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];
    let mut spread = 0;
    for (a, b) in plain.pixels().zip(shadowed.pixels()) {
        if a.0 == RED {
            assert_eq!(b.0, RED);
        } else if a.0 == WHITE && b.0 != WHITE {
            spread += 1;
            let [r, g, blue, alpha] = b.0;
            assert!(r.abs_diff(g) <= 2 && blue >= 253 && alpha == 255, "{:?}", b.0);
        }
    }
    assert!(spread > 0);
    assert_eq!(shadowed.get_pixel(0, 0).0, WHITE);
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

#[test]
fn oversized_frames_and_containers_are_rejected() {
    let Some(mut compositor) = create_compositor() else {
        return;
    };
    let max = compositor.engine().max_dimension();
    let err = compositor
        .render_snapshot(&Frame::new("huge", max + 1, 8))
        .unwrap_err();
    assert!(matches!(
        err,
        CompositorError::Resource(ResourceError::SizeLimit { .. })
    ));

    let mut frame = Frame::new("wide caption", 64, 64);
    frame.push(Block::text(
        "caption",
        Container::Rectangle(Rectangle::centered(1e10, 20.0, Point::new(32.0, 32.0))),
        "wide",
        TextStyle::default(),
    ));
    let err = compositor.render_snapshot(&frame).unwrap_err();
    assert!(matches!(
        err,
        CompositorError::Layout(LayoutError::StencilTooLarge { .. })
    ));
    assert_eq!(compositor.engine().pool_stats().held, 0);
}

#[test]
fn adopted_device_ignores_environment_overrides() {
    std::env::set_var("INKFRAME_PROBE_FONT_SIZE", "42");
    let engine = create_engine();
    std::env::remove_var("INKFRAME_PROBE_FONT_SIZE");
    let Some(engine) = engine else {
        return;
    };
    assert_eq!(engine.config().probe_font_size, 100.0);
}

#[test]
fn blocking_constructor_creates_headless_engine() {
    init_tracing();
    let Ok(engine) = CompositingEngine::new_blocking(CompositorConfig::default()) else {
        return;
    };
    assert_eq!(engine.size(), (1, 1));
    assert_eq!(engine.pool_stats().held, 0);
}
