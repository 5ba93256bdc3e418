//! System font discovery and text measurement
//!
//! Uses fontdb to find faces by family and style, rustybuzz to shape runs,
//! and the shaped glyph boxes to measure ink extents.

use std::sync::{Arc, Mutex};

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use inkframe_core::FontDescriptor;
use rustc_hash::FxHashMap;

use crate::measure::{BoundingBox, TextMeasurements, TextMeasurer};
use crate::FontError;

/// Raw bytes of one face inside a font file or collection
#[derive(Debug)]
pub struct FontData {
    data: Vec<u8>,
    index: u32,
    units_per_em: f32,
}

impl FontData {
    pub fn from_data(data: Vec<u8>, index: u32) -> Result<Self, FontError> {
        let units_per_em = ttf_parser::Face::parse(&data, index)
            .map_err(|e| FontError::ParseError(e.to_string()))?
            .units_per_em() as f32;
        Ok(Self {
            data,
            index,
            units_per_em,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn units_per_em(&self) -> f32 {
        self.units_per_em
    }
}

/// One shaped glyph in font units
#[derive(Clone, Copy, Debug)]
pub struct ShapedGlyph {
    pub glyph_id: u16,
    pub x_advance: f32,
    pub x_offset: f32,
    pub y_offset: f32,
}

struct LibraryInner {
    db: Database,
    /// Resolved faces by descriptor key (None = not found)
    faces: Mutex<FxHashMap<String, Option<Arc<FontData>>>>,
}

/// Shared handle to a font database and its loaded faces
///
/// Cloning is cheap; clones share the face cache.
#[derive(Clone)]
pub struct FontLibrary {
    inner: Arc<LibraryInner>,
}

impl FontLibrary {
    /// Library over all installed system fonts
    pub fn system() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        tracing::debug!("font library loaded {} system faces", db.len());
        Self::from_database(db)
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            inner: Arc::new(LibraryInner {
                db,
                faces: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Resolve a descriptor to face data, falling back to the sans-serif family
    pub fn face(&self, font: &FontDescriptor) -> Result<Arc<FontData>, FontError> {
        let key = font.key();
        let mut faces = self
            .inner
            .faces
            .lock()
            .map_err(|_| FontError::LoadError("font cache poisoned".to_string()))?;
        if let Some(cached) = faces.get(&key) {
            return cached.clone().ok_or(FontError::NotFound(key));
        }

        let weight = if font.bold { Weight::BOLD } else { Weight::NORMAL };
        let style = if font.italic { Style::Italic } else { Style::Normal };
        let named = [Family::Name(&font.family)];
        let id = self
            .inner
            .db
            .query(&Query {
                families: &named,
                weight,
                style,
                stretch: Stretch::Normal,
            })
            .or_else(|| {
                tracing::warn!("font '{}' not found, using sans-serif", font.family);
                self.inner.db.query(&Query {
                    families: &[Family::SansSerif],
                    weight,
                    style,
                    stretch: Stretch::Normal,
                })
            });

        let face = match id {
            Some(id) => self
                .inner
                .db
                .with_face_data(id, |data, index| FontData::from_data(data.to_vec(), index))
                .transpose()?
                .map(Arc::new),
            None => None,
        };
        faces.insert(key.clone(), face.clone());
        face.ok_or(FontError::NotFound(key))
    }

    /// Shape a run with rustybuzz; small caps enable the `smcp` feature
    pub fn shape(
        &self,
        face: &FontData,
        text: &str,
        small_caps: bool,
    ) -> Result<Vec<ShapedGlyph>, FontError> {
        let rb_face =
            rustybuzz::Face::from_slice(face.data(), face.index()).ok_or(FontError::InvalidFontData)?;
        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);

        let features = if small_caps {
            vec![rustybuzz::Feature::new(
                ttf_parser::Tag::from_bytes(b"smcp"),
                1,
                ..,
            )]
        } else {
            Vec::new()
        };
        let output = rustybuzz::shape(&rb_face, &features, buffer);

        Ok(output
            .glyph_infos()
            .iter()
            .zip(output.glyph_positions())
            .map(|(info, pos)| ShapedGlyph {
                glyph_id: info.glyph_id as u16,
                x_advance: pos.x_advance as f32,
                x_offset: pos.x_offset as f32,
                y_offset: pos.y_offset as f32,
            })
            .collect())
    }
}

impl TextMeasurer for FontLibrary {
    fn measure(
        &self,
        text: &str,
        font: &FontDescriptor,
        font_size: f32,
    ) -> Result<TextMeasurements, FontError> {
        let face = self.face(font)?;
        let glyphs = self.shape(&face, text, font.small_caps)?;
        let parsed = ttf_parser::Face::parse(face.data(), face.index())
            .map_err(|e| FontError::ParseError(e.to_string()))?;

        let mut pen = 0.0f32;
        let mut ink: Option<(f32, f32, f32, f32)> = None;
        for glyph in &glyphs {
            if let Some(rect) = parsed.glyph_bounding_box(ttf_parser::GlyphId(glyph.glyph_id)) {
                let x = pen + glyph.x_offset;
                let bounds = (
                    x + rect.x_min as f32,
                    glyph.y_offset + rect.y_min as f32,
                    x + rect.x_max as f32,
                    glyph.y_offset + rect.y_max as f32,
                );
                ink = Some(match ink {
                    Some((x0, y0, x1, y1)) => {
                        (x0.min(bounds.0), y0.min(bounds.1), x1.max(bounds.2), y1.max(bounds.3))
                    }
                    None => bounds,
                });
            }
            pen += glyph.x_advance;
        }

        let scale = font_size / face.units_per_em();
        let bounding_box = match ink {
            Some((x0, y0, x1, y1)) => BoundingBox {
                top: y1 * scale,
                bottom: -y0 * scale,
                left: -x0 * scale,
                right: x1 * scale,
            },
            None => BoundingBox::default(),
        };
        Ok(TextMeasurements::from_box(pen * scale, bounding_box))
    }
}
