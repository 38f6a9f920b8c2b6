//! Capabilities the graphics-state engine consumes and drives.
//!
//! [`FontMetrics`] answers glyph-width queries. [`TextRenderer`] receives one
//! call per shown text run. Both default to no-op or fixed behaviour so a
//! caller only implements what it needs.

use crate::interp::matrix::Point;
use crate::model::state::GraphicsState;

/// Glyph widths are in thousandths of text space units.
pub const DEFAULT_GLYPH_WIDTH: f64 = 500.0;

/// Default vertical advance (`w1`) for vertical writing mode.
pub const DEFAULT_VERTICAL_ADVANCE: f64 = -1000.0;

/// Minimal font metrics query.
pub trait FontMetrics {
    /// Horizontal displacement `w0` of single-byte character `code` in
    /// font resource `font`, in thousandths of an em.
    fn glyph_width(&self, font: &str, code: u8) -> f64;

    /// Vertical displacement `w1`, in thousandths of an em.
    fn glyph_height(&self, _font: &str, _code: u8) -> f64 {
        DEFAULT_VERTICAL_ADVANCE
    }

    /// Whether `font` uses vertical writing mode.
    fn is_vertical(&self, _font: &str) -> bool {
        false
    }
}

/// Every glyph has the same width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformMetrics(pub f64);

impl Default for UniformMetrics {
    fn default() -> Self {
        Self(DEFAULT_GLYPH_WIDTH)
    }
}

impl FontMetrics for UniformMetrics {
    fn glyph_width(&self, _font: &str, _code: u8) -> f64 {
        self.0
    }
}

/// Output sink for shown text.
pub trait TextRenderer {
    /// Called once per text run. `state` is the state before the run is
    /// advanced over; `width` is the run's advance in text space.
    fn text_run(&mut self, state: &GraphicsState, text: &[u8], width: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl TextRenderer for NullRenderer {
    fn text_run(&mut self, _state: &GraphicsState, _text: &[u8], _width: f64) {}
}

/// One recorded text run.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: Vec<u8>,
    /// Device-space start point.
    pub origin: Point,
    pub width: f64,
    pub font: Option<String>,
    pub font_size: f64,
}

impl TextRun {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

/// Records every text run with its device-space start point.
#[derive(Debug, Default, Clone)]
pub struct TextRunCollector {
    pub runs: Vec<TextRun>,
}

impl TextRunCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_runs(self) -> Vec<TextRun> {
        self.runs
    }
}

impl TextRenderer for TextRunCollector {
    fn text_run(&mut self, state: &GraphicsState, text: &[u8], width: f64) {
        self.runs.push(TextRun {
            text: text.to_vec(),
            origin: state.text_origin(),
            width,
            font: state.text.font_name().map(str::to_string),
            font_size: state.text.font_size,
        });
    }
}
