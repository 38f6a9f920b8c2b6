//! Page render entry point and page-backed font metrics.

use crate::content::traverse::traverse;
use crate::content::tree::ContentTree;
use crate::document::{DEFAULT_MEDIA_BOX, PDFDocument};
use crate::error::Result;
use crate::interp::device::{DEFAULT_GLYPH_WIDTH, FontMetrics, TextRenderer};
use crate::interp::engine::GraphicsEngine;
use crate::model::objects::{Dict, PDFObject};
use crate::model::state::GraphicsState;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Widths of one simple font.
#[derive(Debug, Clone, PartialEq)]
pub struct FontWidths {
    pub first_char: u32,
    pub widths: Vec<f64>,
    pub missing_width: f64,
    pub vertical: bool,
}

impl FontWidths {
    pub fn width(&self, code: u8) -> f64 {
        u32::from(code)
            .checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .unwrap_or(self.missing_width)
    }
}

/// [`FontMetrics`] read from the font dictionaries of one page.
///
/// Unknown fonts fall back to a fixed default width.
#[derive(Debug, Clone)]
pub struct PageFontMetrics {
    fonts: FxHashMap<String, FontWidths>,
    default_width: f64,
}

impl PageFontMetrics {
    pub fn new() -> Self {
        Self {
            fonts: FxHashMap::default(),
            default_width: DEFAULT_GLYPH_WIDTH,
        }
    }

    /// Read the `Font` resources of page `n` (1-based).
    pub fn load(doc: &PDFDocument, n: usize) -> Self {
        let mut metrics = Self::new();
        let Some(resources) = doc.page_resources(n) else {
            return metrics;
        };
        let Some(fonts) = resources.get("Font").and_then(|f| doc.resolve_dict(f)) else {
            return metrics;
        };
        for (name, font) in &fonts {
            match doc.resolve_dict(font) {
                Some(font) => {
                    metrics.fonts.insert(name.clone(), read_widths(doc, &font));
                }
                None => warn!("font resource /{name} on page {n} is not a dictionary"),
            }
        }
        debug!("page {n}: {} font(s) with metrics", metrics.fonts.len());
        metrics
    }

    pub fn with_default_width(mut self, width: f64) -> Self {
        self.default_width = width;
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, widths: FontWidths) {
        self.fonts.insert(name.into(), widths);
    }

    pub fn font(&self, name: &str) -> Option<&FontWidths> {
        self.fonts.get(name)
    }
}

impl Default for PageFontMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FontMetrics for PageFontMetrics {
    fn glyph_width(&self, font: &str, code: u8) -> f64 {
        self.fonts
            .get(font)
            .map_or(self.default_width, |f| f.width(code))
    }

    fn is_vertical(&self, font: &str) -> bool {
        self.fonts.get(font).is_some_and(|f| f.vertical)
    }
}

fn read_widths(doc: &PDFDocument, font: &Dict) -> FontWidths {
    let number = |obj: Option<&PDFObject>| obj.and_then(|o| doc.resolve(o).as_num().ok());

    let first_char = number(font.get("FirstChar")).unwrap_or(0.0).max(0.0) as u32;
    let widths = match font.get("Widths").map(|w| doc.resolve(w)) {
        Some(PDFObject::Array(items)) => items
            .iter()
            .map(|w| doc.resolve(w).as_num().unwrap_or(0.0))
            .collect(),
        _ => Vec::new(),
    };
    let descriptor_missing = font
        .get("FontDescriptor")
        .and_then(|d| doc.resolve_dict(d))
        .and_then(|d| number(d.get("MissingWidth")));
    let missing_width = number(font.get("MissingWidth"))
        .or(descriptor_missing)
        .or_else(|| number(font.get("DW")))
        .unwrap_or(if widths.is_empty() { DEFAULT_GLYPH_WIDTH } else { 0.0 });
    let vertical = matches!(
        font.get("Encoding").map(|e| doc.resolve(e)),
        Some(PDFObject::Name(ref n)) if n.ends_with("-V")
    );

    FontWidths {
        first_char,
        widths,
        missing_width,
        vertical,
    }
}

/// Run the content of page `n` (1-based) through the graphics-state engine.
///
/// Text runs go to `renderer`; the final top-level state is returned.
/// Validation findings are logged, not returned.
pub fn render_page(
    doc: &PDFDocument,
    n: usize,
    metrics: Rc<dyn FontMetrics>,
    renderer: &mut dyn TextRenderer,
) -> Result<GraphicsState> {
    let content = doc.page_content(n)?;
    let tree = ContentTree::parse(&content)?;
    for warning in tree.validate() {
        debug!("page {n}: {warning}");
    }

    let media_box = doc.media_box(n).unwrap_or(DEFAULT_MEDIA_BOX);
    let initial = GraphicsState::new().with_origin((media_box[0], media_box[1]));
    let mut engine = GraphicsEngine::new(metrics, renderer);
    Ok(traverse(&tree, initial, &mut engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_lookup_uses_first_char_and_missing_width() {
        let widths = FontWidths {
            first_char: 65,
            widths: vec![600.0, 700.0],
            missing_width: 250.0,
            vertical: false,
        };
        assert_eq!(widths.width(b'A'), 600.0);
        assert_eq!(widths.width(b'B'), 700.0);
        assert_eq!(widths.width(b'C'), 250.0);
        assert_eq!(widths.width(b' '), 250.0);
    }

    #[test]
    fn unknown_font_uses_default_width() {
        let metrics = PageFontMetrics::new().with_default_width(333.0);
        assert_eq!(metrics.glyph_width("F9", b'x'), 333.0);
        assert!(!metrics.is_vertical("F9"));
    }
}
