//! Empirical font-size → glyph-height tables
//!
//! Ink height does not scale perfectly linearly with font size at small sizes
//! because of hinting and pixel rounding. A [`FontMetricsTable`] records the
//! measured height of a reference string at many sizes so the layout engine
//! can invert that relation, and falls back to a linear slope beyond the
//! sampled range.

use std::fmt::Write as _;

use inkframe_core::FontDescriptor;
use rustc_hash::FxHashMap;

use crate::measure::TextMeasurer;
use crate::{FontError, LayoutError};

/// Reference string covering Latin and Cyrillic ascenders and descenders
pub const REFERENCE_TEXT: &str = "AaBbCcDdEeFfGgHhIiJjKkLlMmNnOoPpQqRrSsTtUuVvWwXxYyZzАаБбВвГгДдЕеЁёЖжЗзИиЙйКкЛлМмНнОоПпРрСсТтУуФфХхЦцЧчШшЩщЪъЫыЬьЭэЮюЯя";

/// Largest size kept in a table; larger sizes use the slope
pub const MAX_TABLE_SIZE: f32 = 256.0;

// ─────────────────────────────────────────────────────────────────────────────
// Interpolation table
// ─────────────────────────────────────────────────────────────────────────────

/// Monotonic (size, height) samples plus a linear slope for extrapolation
#[derive(Clone, Debug, PartialEq)]
pub struct FontMetricsTable {
    slope: f32,
    sizes: Vec<f32>,
    heights: Vec<f32>,
}

impl Default for FontMetricsTable {
    /// Placeholder used before any statistics are loaded
    fn default() -> Self {
        Self {
            slope: 1.0 / MAX_TABLE_SIZE,
            sizes: vec![0.0, 1.0],
            heights: vec![0.0, 1.0],
        }
    }
}

impl FontMetricsTable {
    /// Build a table from already filtered samples
    ///
    /// Heights must be strictly increasing and the slope positive.
    pub fn new(slope: f32, sizes: Vec<f32>, heights: Vec<f32>) -> Result<Self, LayoutError> {
        if sizes.is_empty() || sizes.len() != heights.len() {
            return Err(LayoutError::InvalidMetrics(format!(
                "{} sizes for {} heights",
                sizes.len(),
                heights.len()
            )));
        }
        if !(slope.is_finite() && slope > 0.0) {
            return Err(LayoutError::InvalidMetrics(format!("slope {slope}")));
        }
        if heights.windows(2).any(|w| w[1] <= w[0]) {
            return Err(LayoutError::InvalidMetrics(
                "heights are not strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            slope,
            sizes,
            heights,
        })
    }

    /// Reduce raw statistics to an interpolation table
    ///
    /// The slope comes from the last sample; rows are kept while their height
    /// strictly increases and their size is within [`MAX_TABLE_SIZE`].
    pub fn from_statistics(statistics: &FontStatistics) -> Result<Self, LayoutError> {
        let (Some(&last_size), Some(&last_height)) =
            (statistics.font_size.last(), statistics.height.last())
        else {
            return Err(LayoutError::InvalidMetrics("no samples".to_string()));
        };

        let mut sizes = Vec::new();
        let mut heights = Vec::new();
        let mut prev = f32::NEG_INFINITY;
        for (&size, &height) in statistics.font_size.iter().zip(&statistics.height) {
            if prev < height && size <= MAX_TABLE_SIZE {
                prev = height;
                sizes.push(size);
                heights.push(height);
            }
        }

        Self::new(last_height / last_size, sizes, heights)
    }

    /// Height per unit of font size beyond the table
    pub fn slope(&self) -> f32 {
        self.slope
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn max_height(&self) -> f32 {
        self.heights.last().copied().unwrap_or(0.0)
    }

    /// Largest font size whose ink height does not exceed `target_height`
    ///
    /// Inside the table this is floor-biased: a target between two samples
    /// resolves to the smaller size, so text never overshoots its box.
    ///
    /// Above the table the size is `target_height / slope`, never less than
    /// the last tabulated size. The floor keeps the result monotonic when the
    /// slope is steeper than the table's own last row.
    pub fn interpolate(&self, target_height: f32) -> f32 {
        if target_height > self.max_height() {
            let last_size = self.sizes.last().copied().unwrap_or(0.0);
            return (target_height / self.slope).max(last_size);
        }

        let mut l = 0usize;
        let mut r = self.sizes.len() - 1;
        while r - l > 1 {
            let mid = (l + r + 1) / 2;
            if self.heights[mid] <= target_height {
                l = mid;
            } else {
                r = mid;
            }
        }
        if r > l && self.heights[r] <= target_height {
            return self.sizes[r];
        }
        self.sizes[l]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Marks where the height curve jumps between neighbouring sizes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleMark {
    /// Last height before a jump
    Close,
    /// First height after a jump
    Open,
    /// Ordinary sample
    Continue,
}

impl SampleMark {
    fn as_str(self) -> &'static str {
        match self {
            SampleMark::Close => "c",
            SampleMark::Open => "o",
            SampleMark::Continue => "-",
        }
    }

    fn parse(cell: &str) -> Option<Self> {
        match cell {
            "c" => Some(SampleMark::Close),
            "o" => Some(SampleMark::Open),
            "-" => Some(SampleMark::Continue),
            _ => None,
        }
    }
}

/// Size range and resolution for [`FontStatistics::sample`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingOptions {
    pub min_size: f32,
    pub max_size: f32,
    pub step: f32,
    /// Height difference between neighbours that counts as a jump
    pub jump_threshold: f32,
    /// Extra size measured last to fix the extrapolation slope
    pub slope_probe: f32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            min_size: 1.0,
            max_size: 256.1,
            step: 0.1,
            jump_threshold: 0.5,
            slope_probe: 300.0,
        }
    }
}

/// Measured reference-string heights across font sizes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FontStatistics {
    pub font_size: Vec<f32>,
    pub height: Vec<f32>,
    pub meta: Vec<SampleMark>,
}

impl FontStatistics {
    /// Walk the size range measuring [`REFERENCE_TEXT`] at each step
    ///
    /// Every step is probed half a step to either side; a height change larger
    /// than the jump threshold records both sides of the jump.
    pub fn sample(
        measurer: &impl TextMeasurer,
        font: &FontDescriptor,
        options: &SamplingOptions,
    ) -> Result<Self, FontError> {
        let height_at = |size: f32| -> Result<f32, FontError> {
            Ok(measurer.measure(REFERENCE_TEXT, font, size)?.height)
        };

        let mut stats = FontStatistics::default();
        let half = options.step / 2.0;
        let steps = ((options.max_size - options.min_size) / options.step).round() as u32;
        let mut prev = 0.0f32;

        for i in 0..=steps {
            let x = ((options.min_size + i as f32 * options.step) * 1000.0).round() / 1000.0;
            let (ly, y, ry) = (height_at(x - half)?, height_at(x)?, height_at(x + half)?);
            if (ly - y).abs() > options.jump_threshold {
                stats.push(x, ly, SampleMark::Open);
                stats.push(x, y, SampleMark::Close);
                prev = y;
            } else if (ry - y).abs() > options.jump_threshold {
                stats.push(x, y, SampleMark::Close);
                stats.push(x, ry, SampleMark::Open);
                prev = ry;
            } else if prev != y {
                stats.push(x, y, SampleMark::Continue);
                prev = y;
            }
        }

        let probe = options.slope_probe;
        stats.push(probe, height_at(probe)?, SampleMark::Continue);

        tracing::debug!(
            "sampled {} font statistics rows for {}",
            stats.font_size.len(),
            font.key()
        );
        Ok(stats)
    }

    fn push(&mut self, size: f32, height: f32, mark: SampleMark) {
        self.font_size.push(size);
        self.height.push(height);
        self.meta.push(mark);
    }

    pub fn len(&self) -> usize {
        self.font_size.len()
    }

    pub fn is_empty(&self) -> bool {
        self.font_size.is_empty()
    }

    /// `fontSize,height,meta` rows
    pub fn to_csv(&self) -> String {
        let mut out = String::from("fontSize,height,meta");
        for i in 0..self.len() {
            let mark = self.meta.get(i).copied().unwrap_or(SampleMark::Continue);
            let _ = write!(
                out,
                "\n{},{},{}",
                self.font_size[i],
                self.height[i],
                mark.as_str()
            );
        }
        out
    }

    /// Parse CSV produced by [`FontStatistics::to_csv`]
    ///
    /// Columns are located by header name; `meta` is optional.
    pub fn from_csv(data: &str) -> Result<Self, LayoutError> {
        let mut lines = data.lines().filter(|line| !line.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| LayoutError::InvalidMetrics("empty CSV".to_string()))?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |names: &[&str]| columns.iter().position(|c| names.contains(c));
        let size_col = find(&["fontSize", "font_size"])
            .ok_or_else(|| LayoutError::InvalidMetrics("missing fontSize column".to_string()))?;
        let height_col = find(&["height"])
            .ok_or_else(|| LayoutError::InvalidMetrics("missing height column".to_string()))?;
        let meta_col = find(&["meta"]);

        let mut stats = FontStatistics::default();
        for (row, line) in lines.enumerate() {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let number = |col: usize| -> Result<f32, LayoutError> {
                cells
                    .get(col)
                    .and_then(|cell| cell.parse::<f32>().ok())
                    .ok_or_else(|| {
                        LayoutError::InvalidMetrics(format!("row {}: bad number", row + 1))
                    })
            };
            let mark = meta_col
                .and_then(|col| cells.get(col))
                .and_then(|cell| SampleMark::parse(cell))
                .unwrap_or(SampleMark::Continue);
            stats.push(number(size_col)?, number(height_col)?, mark);
        }
        Ok(stats)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Source of metrics tables for fonts
pub trait FontMetricsProvider {
    fn metrics(&self, font: &FontDescriptor) -> Result<&FontMetricsTable, LayoutError>;
}

/// Metrics tables keyed by [`FontDescriptor::key`]
///
/// Until the first table is inserted every font resolves to the placeholder
/// table, which effectively leaves font size to the width constraint.
#[derive(Debug, Default)]
pub struct FontMetricsStore {
    tables: FxHashMap<String, FontMetricsTable>,
    placeholder: FontMetricsTable,
}

impl FontMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, font: &FontDescriptor, table: FontMetricsTable) {
        self.tables.insert(font.key(), table);
    }

    pub fn insert_statistics(
        &mut self,
        font: &FontDescriptor,
        statistics: &FontStatistics,
    ) -> Result<(), LayoutError> {
        let table = FontMetricsTable::from_statistics(statistics)?;
        self.insert(font, table);
        Ok(())
    }

    pub fn contains(&self, font: &FontDescriptor) -> bool {
        self.tables.contains_key(&font.key())
    }

    pub fn is_loaded(&self) -> bool {
        !self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FontMetricsProvider for FontMetricsStore {
    fn metrics(&self, font: &FontDescriptor) -> Result<&FontMetricsTable, LayoutError> {
        if self.tables.is_empty() {
            return Ok(&self.placeholder);
        }
        let key = font.key();
        self.tables
            .get(&key)
            .ok_or(LayoutError::MissingMetrics(key))
    }
}
