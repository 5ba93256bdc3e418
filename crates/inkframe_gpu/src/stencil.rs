//! Stencil cache
//!
//! Text blocks are laid out and rasterized once per distinct key and kept
//! as GPU textures. Every hit stamps the entry with the current generation;
//! [`StencilCache::tick`] evicts entries that were not used since the last
//! tick and keeps their textures for reuse.

use std::sync::Arc;

use inkframe_core::{
    FixedUnit, FontDescriptor, FontSizeStrategy, RelativeUnit, TextAlign, TextBaseline, TextCase,
    TextStyle,
};
use inkframe_text::{
    LayoutError, MeasureContext, StencilDebugSettings, StencilImage, StencilRasterizer,
    StencilRequest, TextLayout, TextLayoutEngine, TextMeasurer,
};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    /// Handle of a cached stencil
    pub struct StencilId;
}

/// Owns the storage behind cached stencils
pub trait StencilBackend {
    type Texture;

    /// Upload stencil pixels, writing into `reuse` when it has the right size
    fn upload(&mut self, image: &StencilImage, reuse: Option<Self::Texture>) -> Self::Texture;
    fn destroy(&mut self, texture: Self::Texture);
    /// Largest texture side the backend can hold
    fn max_dimension(&self) -> u32;
}

/// Stencil texture on the GPU
#[derive(Debug)]
pub struct StencilTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

pub struct GpuStencilBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl GpuStencilBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    fn create(&self, size: (u32, u32)) -> StencilTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("inkframe_stencil"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        StencilTexture {
            texture,
            view,
            size,
        }
    }
}

impl StencilBackend for GpuStencilBackend {
    type Texture = StencilTexture;

    fn upload(&mut self, image: &StencilImage, reuse: Option<StencilTexture>) -> StencilTexture {
        let size = (image.width.max(1), image.height.max(1));
        let target = match reuse {
            Some(texture) if texture.size == size => texture,
            Some(texture) => {
                texture.texture.destroy();
                self.create(size)
            }
            None => self.create(size),
        };
        if image.width > 0 && image.height > 0 {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &image.data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(image.width * 4),
                    rows_per_image: Some(image.height),
                },
                wgpu::Extent3d {
                    width: image.width,
                    height: image.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        target
    }

    fn destroy(&mut self, texture: StencilTexture) {
        texture.texture.destroy();
    }

    fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

/// Everything that changes a stencil's pixels
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StencilKey {
    width: u32,
    height: u32,
    line_spacing: u32,
    case: TextCase,
    align: TextAlign,
    baseline: TextBaseline,
    stroke_width: u32,
    font: FontDescriptor,
    strategy: (u8, u32, u8),
    /// Only set for frame-relative sizes
    frame: Option<(u32, u32)>,
    stroke_disabled: bool,
    fill_disabled: bool,
}

impl StencilKey {
    fn new(style: &TextStyle, width: u32, height: u32, ctx: &MeasureContext) -> Self {
        let strategy = match style.font_size_strategy {
            FontSizeStrategy::SameHeight => (0, 0, 0),
            FontSizeStrategy::SameWidth => (1, 0, 0),
            FontSizeStrategy::Fixed { value, unit } => {
                let unit = match unit {
                    FixedUnit::Px => 0,
                    FixedUnit::Pt => 1,
                };
                (2, value.to_bits(), unit)
            }
            FontSizeStrategy::Relative { value, unit } => {
                let unit = match unit {
                    RelativeUnit::Vw => 0,
                    RelativeUnit::Vh => 1,
                };
                (3, value.to_bits(), unit)
            }
        };
        let frame = style
            .font_size_strategy
            .is_relative()
            .then(|| (ctx.frame_width.to_bits(), ctx.frame_height.to_bits()));
        Self {
            width,
            height,
            line_spacing: style.line_spacing.to_bits(),
            case: style.case,
            align: style.align,
            baseline: style.baseline,
            stroke_width: style.stroke_width.to_bits(),
            font: style.font.clone(),
            strategy,
            frame,
            stroke_disabled: style.stroke.is_disabled(),
            fill_disabled: style.fill.is_disabled(),
        }
    }
}

struct StencilEntry<T> {
    key: StencilKey,
    text: String,
    texture: T,
    layout: TextLayout,
    generation: u64,
}

/// Cache counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StencilCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    /// Evicted textures waiting for reuse
    pub free: usize,
}

/// A cached stencil
pub struct StencilLookup<'a, T> {
    pub id: StencilId,
    pub texture: &'a T,
    pub layout: &'a TextLayout,
}

pub struct StencilCache<B: StencilBackend> {
    backend: B,
    entries: SlotMap<StencilId, StencilEntry<B::Texture>>,
    by_text: FxHashMap<String, SmallVec<[StencilId; 2]>>,
    free: Vec<B::Texture>,
    generation: u64,
    debug: StencilDebugSettings,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<B: StencilBackend> StencilCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: SlotMap::with_key(),
            by_text: FxHashMap::default(),
            free: Vec::new(),
            generation: 1,
            debug: StencilDebugSettings::default(),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn with_debug(mut self, debug: StencilDebugSettings) -> Self {
        self.debug = debug;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn debug(&self) -> StencilDebugSettings {
        self.debug
    }

    /// Change debug overlays; cached stencils are evicted when they differ
    pub fn set_debug(&mut self, debug: StencilDebugSettings) {
        if self.debug == debug {
            return;
        }
        self.debug = debug;
        let ids: Vec<StencilId> = self.entries.keys().collect();
        for id in ids {
            self.evict(id);
        }
    }

    /// Look up or build the stencil for a text block
    #[allow(clippy::too_many_arguments)]
    pub fn get<M: TextMeasurer, R: StencilRasterizer>(
        &mut self,
        text: &str,
        style: &TextStyle,
        width: f32,
        height: f32,
        ctx: &MeasureContext,
        layout_engine: &mut TextLayoutEngine<M>,
        rasterizer: &mut R,
    ) -> Result<StencilLookup<'_, B::Texture>, LayoutError> {
        let max = self.backend.max_dimension();
        let (w, h) = (width.abs().ceil().max(1.0), height.abs().ceil().max(1.0));
        if w > max as f32 || h > max as f32 {
            tracing::warn!("stencil of {}x{} exceeds texture limit {}", w, h, max);
            return Err(LayoutError::StencilTooLarge {
                width: w,
                height: h,
                max,
            });
        }
        let (width, height) = (w as u32, h as u32);
        let key = StencilKey::new(style, width, height, ctx);

        let hit = self.by_text.get(text).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|&id| self.entries.get(id).is_some_and(|entry| entry.key == key))
        });
        let id = match hit {
            Some(id) => {
                self.hits += 1;
                id
            }
            None => {
                self.misses += 1;
                tracing::debug!("stencil cache miss: {:?} at {}x{}", text, width, height);
                let layout =
                    layout_engine.layout_text(text, style, width as f32, height as f32, ctx)?;
                let image = rasterizer.rasterize(&StencilRequest {
                    layout: &layout,
                    font: &style.font,
                    width,
                    height,
                    debug: self.debug,
                })?;
                let reuse = self.free.pop();
                let texture = self.backend.upload(&image, reuse);
                let id = self.entries.insert(StencilEntry {
                    key,
                    text: text.to_owned(),
                    texture,
                    layout,
                    generation: self.generation,
                });
                self.by_text.entry(text.to_owned()).or_default().push(id);
                id
            }
        };

        let generation = self.generation;
        let entry = &mut self.entries[id];
        entry.generation = generation;
        Ok(StencilLookup {
            id,
            texture: &entry.texture,
            layout: &entry.layout,
        })
    }

    /// Texture of a live entry
    pub fn texture(&self, id: StencilId) -> Option<&B::Texture> {
        self.entries.get(id).map(|entry| &entry.texture)
    }

    pub fn layout(&self, id: StencilId) -> Option<&TextLayout> {
        self.entries.get(id).map(|entry| &entry.layout)
    }

    fn evict(&mut self, id: StencilId) {
        let Some(entry) = self.entries.remove(id) else {
            return;
        };
        if let Some(ids) = self.by_text.get_mut(&entry.text) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_text.remove(&entry.text);
            }
        }
        self.free.push(entry.texture);
        self.evictions += 1;
    }

    /// Evict entries unused in the current generation, then advance it
    pub fn tick(&mut self) {
        let generation = self.generation;
        let stale: Vec<StencilId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.generation != generation)
            .map(|(id, _)| id)
            .collect();
        if !stale.is_empty() {
            tracing::debug!("stencil cache: evicting {} entries", stale.len());
        }
        for id in stale {
            self.evict(id);
        }
        self.generation += 1;
    }

    pub fn stats(&self) -> StencilCacheStats {
        StencilCacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len(),
            free: self.free.len(),
        }
    }

    /// Destroy every texture, cached or free
    pub fn teardown(&mut self) {
        for (_, entry) in self.entries.drain() {
            self.backend.destroy(entry.texture);
        }
        for texture in self.free.drain(..) {
            self.backend.destroy(texture);
        }
        self.by_text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkframe_core::Material;
    use inkframe_text::mock::{BlockRasterizer, MonospaceMeasurer};

    #[derive(Debug, PartialEq)]
    struct FakeTexture {
        size: (u32, u32),
    }

    #[derive(Default)]
    struct FakeBackend {
        created: usize,
        reused: usize,
        destroyed: usize,
    }

    impl StencilBackend for FakeBackend {
        type Texture = FakeTexture;

        fn upload(&mut self, image: &StencilImage, reuse: Option<FakeTexture>) -> FakeTexture {
            let size = (image.width, image.height);
            match reuse {
                Some(texture) if texture.size == size => {
                    self.reused += 1;
                    texture
                }
                Some(_) => {
                    self.destroyed += 1;
                    self.created += 1;
                    FakeTexture { size }
                }
                None => {
                    self.created += 1;
                    FakeTexture { size }
                }
            }
        }

        fn destroy(&mut self, _texture: FakeTexture) {
            self.destroyed += 1;
        }

        fn max_dimension(&self) -> u32 {
            8192
        }
    }

    fn fixed_style() -> TextStyle {
        TextStyle {
            font_size_strategy: FontSizeStrategy::Fixed {
                value: 20.0,
                unit: FixedUnit::Px,
            },
            ..Default::default()
        }
    }

    struct Harness {
        cache: StencilCache<FakeBackend>,
        layout: TextLayoutEngine<MonospaceMeasurer>,
        rasterizer: BlockRasterizer,
        ctx: MeasureContext,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                cache: StencilCache::new(FakeBackend::default()),
                layout: TextLayoutEngine::new(MonospaceMeasurer::default()),
                rasterizer: BlockRasterizer::default(),
                ctx: MeasureContext::new(500.0, 500.0),
            }
        }

        fn get(&mut self, text: &str, style: &TextStyle, width: f32) -> StencilId {
            self.cache
                .get(
                    text,
                    style,
                    width,
                    100.0,
                    &self.ctx,
                    &mut self.layout,
                    &mut self.rasterizer,
                )
                .unwrap()
                .id
        }
    }

    #[test]
    fn repeated_lookups_hit() {
        let mut h = Harness::new();
        let style = fixed_style();
        let first = h.get("hello", &style, 200.0);
        let second = h.get("hello", &style, 200.0);
        assert_eq!(first, second);

        let stats = h.cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(h.rasterizer.rasterized(), 1);
    }

    #[test]
    fn oversized_container_is_rejected_before_layout() {
        let mut h = Harness::new();
        let result = h.cache.get(
            "hello",
            &fixed_style(),
            1e10,
            100.0,
            &h.ctx,
            &mut h.layout,
            &mut h.rasterizer,
        );
        assert!(matches!(
            result,
            Err(LayoutError::StencilTooLarge { max: 8192, .. })
        ));
        assert_eq!(h.rasterizer.rasterized(), 0);
        assert_eq!(h.cache.stats().entries, 0);

        // The limit itself is still accepted
        h.get("hello", &fixed_style(), 8192.0);
        assert_eq!(h.cache.stats().entries, 1);
    }

    #[test]
    fn key_covers_size_and_style() {
        let mut h = Harness::new();
        let style = fixed_style();
        let base = h.get("hello", &style, 200.0);
        // Sizes are rounded up to whole pixels
        assert_eq!(h.get("hello", &style, 199.5), base);
        assert_ne!(h.get("hello", &style, 201.0), base);

        let hollow = TextStyle {
            fill: Material::disabled(),
            ..fixed_style()
        };
        assert_ne!(h.get("hello", &hollow, 200.0), base);
        assert_ne!(h.get("world", &style, 200.0), base);
        assert_eq!(h.cache.stats().misses, 4);
    }

    #[test]
    fn frame_size_only_matters_for_relative_sizes() {
        let mut h = Harness::new();
        let fixed = fixed_style();
        let relative = TextStyle {
            font_size_strategy: FontSizeStrategy::Relative {
                value: 5.0,
                unit: RelativeUnit::Vw,
            },
            ..Default::default()
        };
        let a = h.get("x", &fixed, 100.0);
        let b = h.get("x", &relative, 100.0);
        h.ctx = MeasureContext::new(800.0, 600.0);
        assert_eq!(h.get("x", &fixed, 100.0), a);
        assert_ne!(h.get("x", &relative, 100.0), b);
    }

    #[test]
    fn unused_entries_are_evicted_after_two_ticks() {
        let mut h = Harness::new();
        let style = fixed_style();
        let id = h.get("hello", &style, 200.0);

        h.cache.tick();
        assert!(h.cache.texture(id).is_some());
        h.cache.tick();
        assert!(h.cache.texture(id).is_none());
        assert_eq!(h.cache.stats().evictions, 1);
        assert_eq!(h.cache.stats().free, 1);

        // A same-sized miss reuses the evicted texture
        h.get("other", &style, 200.0);
        assert_eq!(h.cache.backend().reused, 1);
        assert_eq!(h.cache.stats().free, 0);
    }

    #[test]
    fn used_entries_survive_ticks() {
        let mut h = Harness::new();
        let style = fixed_style();
        let id = h.get("hello", &style, 200.0);
        for _ in 0..3 {
            h.cache.tick();
            assert_eq!(h.get("hello", &style, 200.0), id);
        }
        assert_eq!(h.cache.stats().evictions, 0);
        assert_eq!(h.cache.generation(), 4);
    }

    #[test]
    fn debug_change_evicts_everything() {
        let mut h = Harness::new();
        let style = fixed_style();
        let id = h.get("hello", &style, 200.0);
        h.cache.set_debug(StencilDebugSettings::default());
        assert!(h.cache.texture(id).is_some());

        h.cache.set_debug(StencilDebugSettings {
            draw_baseline: true,
            ..Default::default()
        });
        assert!(h.cache.texture(id).is_none());
        assert_eq!(h.cache.stats().entries, 0);
    }

    #[test]
    fn teardown_destroys_cached_and_free_textures() {
        let mut h = Harness::new();
        let style = fixed_style();
        h.get("a", &style, 100.0);
        h.cache.tick();
        h.cache.tick();
        h.get("b", &style, 120.0);
        h.cache.teardown();
        assert_eq!(h.cache.backend().destroyed, 2);
        assert_eq!(h.cache.stats().entries, 0);
    }
}
