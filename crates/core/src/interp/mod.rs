//! Graphics-state engine.
//!
//! - `matrix`: affine matrix algebra
//! - `engine`: operator semantics over `GraphicsState`
//! - `device`: font metrics and text renderer capabilities
//! - `interpreter`: page render entry point

pub mod device;
pub mod engine;
pub mod interpreter;
pub mod matrix;

pub use device::{
    FontMetrics, NullRenderer, TextRenderer, TextRun, TextRunCollector, UniformMetrics,
};
pub use engine::GraphicsEngine;
pub use interpreter::{FontWidths, PageFontMetrics, render_page};
pub use matrix::{MATRIX_IDENTITY, Matrix, Point, apply_matrix, apply_matrix_pt, translate_matrix};
