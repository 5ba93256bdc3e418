//! Text fitting and line placement
//!
//! Given lines of text, a style and a target box, the layout engine picks a
//! font size (or one per line) and positions every line:
//!
//! - **Fixed** / **Relative**: the size is given, only placement is computed
//! - **SameHeight**: one size for all lines, the largest that fits both axes
//! - **SameWidth**: every line scaled to fill the width, shrunk together until
//!   the stack fits the height
//!
//! Coordinates are in stencil pixels. Each line's `(x, y)` is the pen origin
//! on the alphabetic baseline; glyphs are drawn left to right from there.

use inkframe_core::{
    FixedUnit, FontDescriptor, FontSizeStrategy, RelativeUnit, TextAlign, TextBaseline, TextStyle,
};
use rustc_hash::FxHashMap;

use crate::measure::{BoundingBox, MeasureContext, TextMeasurements, TextMeasurer};
use crate::metrics::{
    FontMetricsProvider, FontMetricsStore, FontStatistics, SamplingOptions, REFERENCE_TEXT,
};
use crate::{LayoutError, Result};

/// CSS points to pixels
const PT_TO_PX: f32 = 96.0 / 72.0;

/// Below this working width or stack height, same-width fitting stops shrinking
const MIN_FIT_EXTENT: f32 = 8.0;

const MAX_FIT_ITERATIONS: usize = 64;

/// A positioned line of text
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutLine {
    pub text: String,
    /// Pen origin
    pub x: f32,
    /// Alphabetic baseline
    pub y: f32,
    pub font_size: f32,
    /// Stroke width for this line
    pub line_width: f32,
    /// Ink box measured at `font_size`, relative to `(x, y)`
    pub bounds: BoundingBox,
}

/// Result of laying out a text block
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<LayoutLine>,
    /// Shared font size; the smallest line size for same-width fitting
    pub font_size: f32,
    pub line_width: f32,
    /// Height of one line including half the stroke
    pub line_height: f32,
    /// Height of the whole stack
    pub total_height: f32,
    pub align: TextAlign,
    pub baseline: TextBaseline,
}

/// Options for [`TextLayoutEngine`]
#[derive(Clone, Debug)]
pub struct LayoutOptions {
    /// Font size used to measure line widths before scaling
    pub probe_size: f32,
    /// Sample metrics with the measurer when a font has no table
    pub sample_missing_metrics: bool,
    pub sampling: SamplingOptions,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            probe_size: 100.0,
            sample_missing_metrics: false,
            sampling: SamplingOptions::default(),
        }
    }
}

/// Per-line size and measurement during placement
struct SizedLine<'a> {
    text: &'a str,
    font_size: f32,
    reference: TextMeasurements,
}

/// Text layout engine
pub struct TextLayoutEngine<M> {
    measurer: M,
    metrics: FontMetricsStore,
    /// Reference-string measurements keyed by font and size bits
    references: FxHashMap<(String, u32), TextMeasurements>,
    options: LayoutOptions,
}

impl<M: TextMeasurer> TextLayoutEngine<M> {
    pub fn new(measurer: M) -> Self {
        Self::with_metrics(measurer, FontMetricsStore::new())
    }

    pub fn with_metrics(measurer: M, metrics: FontMetricsStore) -> Self {
        Self {
            measurer,
            metrics,
            references: FxHashMap::default(),
            options: LayoutOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    pub fn measurer(&self) -> &M {
        &self.measurer
    }

    pub fn metrics(&self) -> &FontMetricsStore {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut FontMetricsStore {
        &mut self.metrics
    }

    /// Apply the style's case transform, split on newlines and lay out
    pub fn layout_text(
        &mut self,
        text: &str,
        style: &TextStyle,
        box_width: f32,
        box_height: f32,
        ctx: &MeasureContext,
    ) -> Result<TextLayout> {
        let cased = style.case.apply(text);
        let lines: Vec<&str> = cased.split('\n').collect();
        self.layout(&lines, style, box_width, box_height, ctx)
    }

    /// Lay out already case-transformed lines inside `box_width` × `box_height`
    pub fn layout(
        &mut self,
        lines: &[&str],
        style: &TextStyle,
        box_width: f32,
        box_height: f32,
        ctx: &MeasureContext,
    ) -> Result<TextLayout> {
        let lines: &[&str] = if lines.is_empty() { &[""] } else { lines };
        let stroke = style.stroke_fraction();

        let size = match style.font_size_strategy {
            FontSizeStrategy::SameWidth => {
                return self.layout_same_width(lines, style, stroke, box_width, box_height);
            }
            FontSizeStrategy::SameHeight => {
                self.fit_same_height(lines, style, stroke, box_width - 2.0, box_height - 2.0)?
            }
            FontSizeStrategy::Fixed { value, unit } => {
                let px = match unit {
                    FixedUnit::Px => value,
                    FixedUnit::Pt => value * PT_TO_PX,
                };
                validate_size(px, &style.font_size_strategy)?
            }
            FontSizeStrategy::Relative { value, unit } => {
                let extent = match unit {
                    RelativeUnit::Vw => ctx.frame_width,
                    RelativeUnit::Vh => ctx.frame_height,
                };
                validate_size(value / 100.0 * extent, &style.font_size_strategy)?
            }
        };

        let reference = self.reference(&style.font, size)?;
        let sized: Vec<SizedLine<'_>> = lines
            .iter()
            .map(|&text| SizedLine {
                text,
                font_size: size,
                reference,
            })
            .collect();
        self.place(&sized, style, stroke, box_width, box_height)
    }

    /// Largest single font size that fits every line in the box
    ///
    /// Width follows the widest line measured at the probe size and scaled
    /// linearly. Height is inverted through the font's metrics table.
    pub fn fit_same_height(
        &mut self,
        lines: &[&str],
        style: &TextStyle,
        stroke: f32,
        width: f32,
        height: f32,
    ) -> Result<f32> {
        if width < 2.0 || height < 2.0 {
            return Ok(width.min(height).max(0.0));
        }
        let probe = self.options.probe_size;
        let mut widest = 0.0f32;
        for line in lines {
            widest = widest.max(self.measurer.measure(line, &style.font, probe)?.width);
        }
        let k_width = (widest + stroke * probe) / probe;
        let width_candidate = if k_width > 0.0 {
            width / k_width
        } else {
            f32::INFINITY
        };

        let n = lines.len() as f32;
        let line_height = height / (n + style.line_spacing * (n - 1.0)) / (1.0 + stroke);
        let height_candidate = self.table_lookup(&style.font, line_height)?;

        Ok(width_candidate.min(height_candidate))
    }

    fn table_lookup(&mut self, font: &FontDescriptor, line_height: f32) -> Result<f32> {
        match self.metrics.metrics(font) {
            Ok(table) => return Ok(table.interpolate(line_height)),
            Err(LayoutError::MissingMetrics(key)) if self.options.sample_missing_metrics => {
                tracing::debug!("sampling font metrics for {}", key);
            }
            Err(e) => return Err(e),
        }
        let statistics = FontStatistics::sample(&self.measurer, font, &self.options.sampling)?;
        self.metrics.insert_statistics(font, &statistics)?;
        Ok(self.metrics.metrics(font)?.interpolate(line_height))
    }

    fn layout_same_width(
        &mut self,
        lines: &[&str],
        style: &TextStyle,
        stroke: f32,
        box_width: f32,
        box_height: f32,
    ) -> Result<TextLayout> {
        let (fit_width, fit_height) = (box_width - 2.0, box_height - 2.0);
        let probe = self.options.probe_size;

        // Width per unit of font size, None for lines without ink
        let mut slopes = Vec::with_capacity(lines.len());
        for line in lines {
            let width = self.measurer.measure(line, &style.font, probe)?.width;
            slopes.push((width > 0.0).then(|| (width + stroke * probe) / probe));
        }

        if fit_width < 2.0 || fit_height < 2.0 || slopes.iter().all(Option::is_none) {
            let size = self.fit_same_height(lines, style, stroke, fit_width, fit_height)?;
            let reference = self.reference(&style.font, size)?;
            let sized: Vec<SizedLine<'_>> = lines
                .iter()
                .map(|&text| SizedLine {
                    text,
                    font_size: size,
                    reference,
                })
                .collect();
            return self.place(&sized, style, stroke, box_width, box_height);
        }

        let mut working = fit_width;
        let mut sized = Vec::with_capacity(lines.len());
        for iteration in 0..MAX_FIT_ITERATIONS {
            let sizes: Vec<Option<f32>> = slopes.iter().map(|k| k.map(|k| working / k)).collect();
            let smallest = sizes
                .iter()
                .flatten()
                .copied()
                .fold(f32::INFINITY, f32::min);

            sized.clear();
            for (&text, size) in lines.iter().zip(&sizes) {
                let font_size = size.unwrap_or(smallest);
                let reference = self.reference(&style.font, font_size)?;
                sized.push(SizedLine {
                    text,
                    font_size,
                    reference,
                });
            }

            let total = stack_height(&sized, stroke, style.line_spacing);
            if total <= fit_height || working < MIN_FIT_EXTENT || total < MIN_FIT_EXTENT {
                tracing::trace!(
                    "same-width fit settled after {} iterations at width {}",
                    iteration + 1,
                    working
                );
                break;
            }
            working *= (fit_height / total).min(0.999);
        }

        self.place(&sized, style, stroke, box_width, box_height)
    }

    fn place(
        &mut self,
        sized: &[SizedLine<'_>],
        style: &TextStyle,
        stroke: f32,
        width: f32,
        height: f32,
    ) -> Result<TextLayout> {
        let total_height = stack_height(sized, stroke, style.line_spacing);
        let shift = match style.baseline {
            TextBaseline::Top => 0.0,
            TextBaseline::Middle => ((height - total_height) / 2.0).trunc(),
            TextBaseline::Bottom => height - total_height,
        };

        let mut lines = Vec::with_capacity(sized.len());
        let mut bottom = shift;
        for (i, line) in sized.iter().enumerate() {
            let line_width = stroke * line.font_size;
            let line_height = line.reference.height + line_width / 2.0;
            if i > 0 {
                bottom += line_height * style.line_spacing;
            }
            bottom += line_height;

            let half = line_width / 2.0;
            let base_x = match style.align {
                TextAlign::Left => half,
                TextAlign::Right => width - half,
                TextAlign::Center => (width / 2.0).trunc(),
            };
            let bounds = self
                .measurer
                .measure(line.text, &style.font, line.font_size)?
                .bounding_box;
            let x = match style.align {
                TextAlign::Center => base_x + (bounds.left - bounds.right) / 2.0,
                TextAlign::Left => base_x + bounds.left,
                TextAlign::Right => base_x - bounds.right,
            };

            lines.push(LayoutLine {
                text: line.text.to_string(),
                x,
                y: bottom - line.reference.bounding_box.bottom,
                font_size: line.font_size,
                line_width,
                bounds,
            });
        }

        let font_size = sized
            .iter()
            .map(|line| line.font_size)
            .fold(f32::INFINITY, f32::min);
        let font_size = if font_size.is_finite() { font_size } else { 0.0 };
        let line_height = sized
            .first()
            .map(|line| line.reference.height + stroke * line.font_size / 2.0)
            .unwrap_or(0.0);

        Ok(TextLayout {
            lines,
            font_size,
            line_width: stroke * font_size,
            line_height,
            total_height,
            align: style.align,
            baseline: style.baseline,
        })
    }

    /// Reference-string measurement, cached per font and size
    pub fn reference(&mut self, font: &FontDescriptor, font_size: f32) -> Result<TextMeasurements> {
        let key = (font.key(), font_size.to_bits());
        if let Some(cached) = self.references.get(&key) {
            return Ok(*cached);
        }
        let measured = self.measurer.measure(REFERENCE_TEXT, font, font_size)?;
        self.references.insert(key, measured);
        Ok(measured)
    }

    /// Drop cached reference measurements
    pub fn clear_cache(&mut self) {
        self.references.clear();
    }
}

/// Height of the stacked lines plus the outer half of the stroke
fn stack_height(sized: &[SizedLine<'_>], stroke: f32, spacing: f32) -> f32 {
    let mut total = 0.0;
    let mut widest_stroke = 0.0f32;
    for (i, line) in sized.iter().enumerate() {
        let line_width = stroke * line.font_size;
        let line_height = line.reference.height + line_width / 2.0;
        total += if i == 0 {
            line_height
        } else {
            line_height * (1.0 + spacing)
        };
        widest_stroke = widest_stroke.max(line_width);
    }
    total + widest_stroke / 2.0
}

fn validate_size(size: f32, strategy: &FontSizeStrategy) -> Result<f32> {
    if size.is_finite() && size > 0.0 {
        Ok(size)
    } else {
        Err(LayoutError::InvalidStrategy(format!(
            "{:?} resolves to font size {}",
            strategy, size
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::FontMetricsTable;
    use crate::mock::MonospaceMeasurer;
    use inkframe_core::Material;

    fn engine() -> TextLayoutEngine<MonospaceMeasurer> {
        let measurer = MonospaceMeasurer::default();
        let font = FontDescriptor::default();
        // Coarse steps; the synthetic font has no hinting jumps to record
        let options = SamplingOptions {
            min_size: 1.0,
            max_size: 256.0,
            step: 1.0,
            jump_threshold: 1.0,
            ..Default::default()
        };
        let stats = FontStatistics::sample(&measurer, &font, &options).unwrap();
        let mut store = FontMetricsStore::new();
        store.insert(&font, FontMetricsTable::from_statistics(&stats).unwrap());
        TextLayoutEngine::with_metrics(measurer, store)
    }

    fn ctx() -> MeasureContext {
        MeasureContext::new(800.0, 600.0)
    }

    #[test]
    fn fixed_points_convert_to_pixels() {
        let mut engine = engine();
        let style = TextStyle {
            font_size_strategy: FontSizeStrategy::Fixed {
                value: 12.0,
                unit: FixedUnit::Pt,
            },
            ..Default::default()
        };
        let layout = engine.layout(&["HELLO"], &style, 300.0, 100.0, &ctx()).unwrap();
        assert!((layout.font_size - 16.0).abs() < 1e-4);
        assert!((layout.lines[0].font_size - 16.0).abs() < 1e-4);
    }

    #[test]
    fn relative_sizes_follow_the_frame() {
        let mut engine = engine();
        let style = TextStyle {
            font_size_strategy: FontSizeStrategy::Relative {
                value: 5.0,
                unit: RelativeUnit::Vh,
            },
            ..Default::default()
        };
        let layout = engine.layout(&["A"], &style, 300.0, 100.0, &ctx()).unwrap();
        assert!((layout.font_size - 30.0).abs() < 1e-4);
    }

    #[test]
    fn non_positive_fixed_size_is_an_error() {
        let mut engine = engine();
        let style = TextStyle {
            font_size_strategy: FontSizeStrategy::Fixed {
                value: 0.0,
                unit: FixedUnit::Px,
            },
            ..Default::default()
        };
        let result = engine.layout(&["A"], &style, 300.0, 100.0, &ctx());
        assert!(matches!(result, Err(LayoutError::InvalidStrategy(_))));
    }

    #[test]
    fn same_height_never_overflows() {
        let mut engine = engine();
        let style = TextStyle::default();
        let words = ["MEME", "WHEN YOU", "I", "SOME LONGER CAPTION", "OK"];
        let height = 240.0;
        for count in 1..=5 {
            let lines = &words[..count];
            for width in (50..=2000).step_by(75) {
                let width = width as f32;
                let layout = engine.layout(lines, &style, width, height, &ctx()).unwrap();
                for line in &layout.lines {
                    let ink = engine
                        .measurer()
                        .measure(line.text.as_str(), &style.font, line.font_size)
                        .unwrap();
                    assert!(ink.width <= width, "{} > {} ({} lines)", ink.width, width, count);
                }
                assert!(
                    layout.total_height <= height,
                    "{} > {} ({} lines, width {})",
                    layout.total_height,
                    height,
                    count,
                    width
                );
            }
        }
    }

    #[test]
    fn same_height_tiny_boxes_return_the_smaller_side() {
        let mut engine = engine();
        let style = TextStyle::default();
        let size = engine
            .fit_same_height(&["ABC"], &style, 0.14, 1.5, 40.0)
            .unwrap();
        assert_eq!(size, 1.5);
    }

    #[test]
    fn same_width_fills_each_line() {
        let mut engine = engine();
        let style = TextStyle {
            font_size_strategy: FontSizeStrategy::SameWidth,
            stroke: Material::disabled(),
            ..Default::default()
        };
        let layout = engine
            .layout(&["BIG", "SMALLER LINE"], &style, 400.0, 2000.0, &ctx())
            .unwrap();
        assert!(layout.lines[0].font_size > layout.lines[1].font_size);
        for line in &layout.lines {
            let ink = engine
                .measurer()
                .measure(line.text.as_str(), &style.font, line.font_size)
                .unwrap();
            assert!((ink.width - 398.0).abs() < 0.5, "ink width {}", ink.width);
        }
    }

    #[test]
    fn same_width_shrinks_to_fit_height() {
        let mut engine = engine();
        let style = TextStyle {
            font_size_strategy: FontSizeStrategy::SameWidth,
            ..Default::default()
        };
        let layout = engine
            .layout(&["A", "B", "C"], &style, 400.0, 120.0, &ctx())
            .unwrap();
        assert!(layout.total_height <= 118.0 + 1e-3);
        // Equal-width lines end up with equal sizes
        let first = layout.lines[0].font_size;
        assert!(layout.lines.iter().all(|l| (l.font_size - first).abs() < 1e-4));
    }

    #[test]
    fn horizontal_alignment_uses_the_ink_box() {
        let mut engine = engine();
        for align in [TextAlign::Left, TextAlign::Center, TextAlign::Right] {
            let style = TextStyle {
                align,
                font_size_strategy: FontSizeStrategy::Fixed {
                    value: 20.0,
                    unit: FixedUnit::Px,
                },
                ..Default::default()
            };
            let layout = engine.layout(&["WIDE", "I"], &style, 300.0, 200.0, &ctx()).unwrap();
            let half_stroke = layout.line_width / 2.0;
            for line in &layout.lines {
                let ink_left = line.x - line.bounds.left;
                let ink_right = line.x + line.bounds.right;
                match align {
                    TextAlign::Left => assert!((ink_left - half_stroke).abs() < 1e-3),
                    TextAlign::Right => assert!((ink_right - (300.0 - half_stroke)).abs() < 1e-3),
                    TextAlign::Center => {
                        assert!(((ink_left + ink_right) / 2.0 - 150.0).abs() < 1e-3)
                    }
                }
            }
        }
    }

    #[test]
    fn vertical_placement() {
        let mut engine = engine();
        let mut style = TextStyle {
            font_size_strategy: FontSizeStrategy::Fixed {
                value: 20.0,
                unit: FixedUnit::Px,
            },
            stroke: Material::disabled(),
            line_spacing: 0.0,
            ..Default::default()
        };
        let reference = engine.reference(&style.font, 20.0).unwrap();

        style.baseline = TextBaseline::Top;
        let top = engine.layout(&["A", "B"], &style, 200.0, 200.0, &ctx()).unwrap();
        // First line's reference ink touches the top edge
        let first = &top.lines[0];
        assert!((first.y - reference.bounding_box.top).abs() < 1e-3);
        assert!((top.lines[1].y - first.y - reference.height).abs() < 1e-3);

        style.baseline = TextBaseline::Bottom;
        let bottom = engine.layout(&["A", "B"], &style, 200.0, 200.0, &ctx()).unwrap();
        let last = bottom.lines.last().unwrap();
        assert!((last.y + reference.bounding_box.bottom - 200.0).abs() < 1e-3);
    }

    #[test]
    fn reference_measurement_is_cached() {
        let mut engine = engine();
        let font = FontDescriptor::default();
        engine.reference(&font, 42.0).unwrap();
        let calls = engine.measurer().calls();
        engine.reference(&font, 42.0).unwrap();
        assert_eq!(engine.measurer().calls(), calls);
    }

    #[test]
    fn missing_metrics_propagate() {
        let mut engine = engine();
        let style = TextStyle {
            font: FontDescriptor::new("Unlisted"),
            ..Default::default()
        };
        let result = engine.layout(&["A"], &style, 300.0, 100.0, &ctx());
        assert!(matches!(result, Err(LayoutError::MissingMetrics(_))));
    }

    #[test]
    fn missing_metrics_can_be_sampled() {
        let mut engine = engine().with_options(LayoutOptions {
            sample_missing_metrics: true,
            sampling: SamplingOptions {
                step: 2.0,
                ..Default::default()
            },
            ..Default::default()
        });
        let font = FontDescriptor::new("Unlisted");
        let style = TextStyle {
            font: font.clone(),
            ..Default::default()
        };
        engine.layout(&["A"], &style, 300.0, 100.0, &ctx()).unwrap();
        assert!(engine.metrics().contains(&font));
    }

    #[test]
    fn case_transform_is_applied_before_layout() {
        let mut engine = engine();
        let layout = engine
            .layout_text("hello\nworld", &TextStyle::default(), 400.0, 200.0, &ctx())
            .unwrap();
        let texts: Vec<&str> = layout.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["HELLO", "WORLD"]);
    }
}
