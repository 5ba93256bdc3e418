//! Image and pattern textures
//!
//! Textures are uploaded premultiplied so every sampling program can treat
//! them like render targets.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::TextureError;

/// A sampled GPU texture with its pixel size
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Upload straight-alpha RGBA pixels
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pixels: &[u8],
        width: u32,
        height: u32,
        label: Option<&str>,
    ) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(TextureError::InvalidData {
                width,
                height,
                len: pixels.len(),
            });
        }
        let premultiplied = premultiply(pixels);
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label,
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &premultiplied,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn premultiply(pixels: &[u8]) -> Vec<u8> {
    let mut out = pixels.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    out
}

/// Textures by id
pub struct TextureStore {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: FxHashMap<String, GpuTexture>,
}

impl TextureStore {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            textures: FxHashMap::default(),
        }
    }

    /// Upload straight-alpha RGBA pixels under `id`, replacing any previous texture
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), TextureError> {
        let id = id.into();
        let texture =
            GpuTexture::from_rgba(&self.device, &self.queue, pixels, width, height, Some(&id))?;
        tracing::debug!("texture store: uploaded '{}' ({}x{})", id, width, height);
        if let Some(old) = self.textures.insert(id, texture) {
            old.texture.destroy();
        }
        Ok(())
    }

    /// Decode a PNG or JPEG and upload it under `id`
    pub fn insert_encoded(&mut self, id: impl Into<String>, bytes: &[u8]) -> Result<(), TextureError> {
        let id = id.into();
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| TextureError::Decode(format!("{id}: {e}")))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        self.insert(id, decoded.as_raw(), width, height)
    }

    pub fn get(&self, id: &str) -> Result<&GpuTexture, TextureError> {
        self.textures
            .get(id)
            .ok_or_else(|| TextureError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.textures.contains_key(id)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        match self.textures.remove(id) {
            Some(texture) => {
                texture.texture.destroy();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, texture) in self.textures.drain() {
            texture.texture.destroy();
        }
    }
}

/// Pattern names to texture ids
///
/// Passed explicitly to the engine through
/// [`GraphicsContext`](crate::GraphicsContext).
#[derive(Debug, Default, Clone)]
pub struct PatternRegistry {
    patterns: FxHashMap<String, String>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, texture_id: impl Into<String>) {
        self.patterns.insert(name.into(), texture_id.into());
    }

    pub fn unregister(&mut self, name: &str) -> Option<String> {
        self.patterns.remove(name)
    }

    pub fn texture_id(&self, name: &str) -> Result<&str, TextureError> {
        self.patterns
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TextureError::UnknownPattern(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premultiply_scales_color_by_alpha() {
        let px = premultiply(&[255, 128, 0, 128, 10, 20, 30, 255, 200, 200, 200, 0]);
        assert_eq!(&px[..4], &[128, 64, 0, 128]);
        assert_eq!(&px[4..8], &[10, 20, 30, 255]);
        assert_eq!(&px[8..], &[0, 0, 0, 0]);
    }

    #[test]
    fn pattern_registry_lookup() {
        let mut patterns = PatternRegistry::new();
        patterns.register("bricks", "tex-bricks");
        assert_eq!(patterns.texture_id("bricks").unwrap(), "tex-bricks");
        assert_eq!(
            patterns.texture_id("wood"),
            Err(TextureError::UnknownPattern("wood".to_string()))
        );
        assert_eq!(patterns.unregister("bricks").as_deref(), Some("tex-bricks"));
        assert_eq!(patterns.names().count(), 0);
    }
}
