//! Graphics and text state value types.
//!
//! Both are plain values: the content traversal copies them when it enters
//! a block and drops the copy when a `q`/`Q` block closes. Colour component
//! arrays, dash arrays and the font name are `Rc`-shared, so a clone copies
//! scalars and bumps reference counts.

use crate::interp::matrix::{MATRIX_IDENTITY, Matrix, Point, apply_matrix, apply_matrix_pt};
use std::rc::Rc;

/// A colour value in a named colour space.
#[derive(Debug, Clone, PartialEq)]
pub struct Colour {
    /// Colour space name (`DeviceGray`, `DeviceRGB`, a resource name, ...).
    pub space: Rc<str>,
    pub components: Rc<[f64]>,
    /// Pattern resource name for `scn`/`SCN` with a trailing name operand.
    pub pattern: Option<Rc<str>>,
}

impl Colour {
    pub fn new(space: &str, components: &[f64]) -> Self {
        Self {
            space: Rc::from(space),
            components: Rc::from(components),
            pattern: None,
        }
    }

    /// The initial colour of `space`.
    pub fn initial(space: &str) -> Self {
        let components: &[f64] = match space {
            "DeviceGray" | "G" | "CalGray" | "Indexed" | "I" | "Separation" => &[0.0],
            "DeviceRGB" | "RGB" | "CalRGB" | "Lab" => &[0.0, 0.0, 0.0],
            "DeviceCMYK" | "CMYK" => &[0.0, 0.0, 0.0, 1.0],
            "Pattern" => &[],
            _ => &[0.0],
        };
        Self::new(space, components)
    }

    pub fn gray(g: f64) -> Self {
        Self::new("DeviceGray", &[g])
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::gray(0.0)
    }
}

/// Text state parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TextState {
    /// Font resource name selected by `Tf`.
    pub font: Option<Rc<str>>,
    pub font_size: f64,
    /// `Tc`
    pub char_spacing: f64,
    /// `Tw`, applied to byte 32 only.
    pub word_spacing: f64,
    /// `Tz`, in percent.
    pub horizontal_scaling: f64,
    /// `TL`
    pub leading: f64,
    pub render_mode: i64,
    pub rise: f64,
    /// Writing mode of the current font.
    pub vertical: bool,
    pub matrix: Matrix,
    pub line_matrix: Matrix,
}

impl TextState {
    pub fn new() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 100.0,
            leading: 0.0,
            render_mode: 0,
            rise: 0.0,
            vertical: false,
            matrix: MATRIX_IDENTITY,
            line_matrix: MATRIX_IDENTITY,
        }
    }

    /// Reset the text and line matrices at the start of a text object.
    pub fn reset(&mut self) {
        self.matrix = MATRIX_IDENTITY;
        self.line_matrix = MATRIX_IDENTITY;
    }

    /// `Th` as a factor.
    pub fn scale_factor(&self) -> f64 {
        self.horizontal_scaling / 100.0
    }

    pub fn font_name(&self) -> Option<&str> {
        self.font.as_deref()
    }
}

impl Default for TextState {
    fn default() -> Self {
        Self::new()
    }
}

/// The graphics state threaded through a content traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub ctm: Matrix,
    /// Lower-left corner of the media box, subtracted on the way to device
    /// space.
    pub origin: Point,
    pub line_width: f64,
    pub line_cap: i64,
    pub line_join: i64,
    pub miter_limit: f64,
    pub dash_array: Rc<[f64]>,
    pub dash_phase: f64,
    pub rendering_intent: Rc<str>,
    pub flatness: f64,
    /// Last `gs` resource name applied.
    pub ext_gstate: Option<Rc<str>>,
    pub stroke_colour: Colour,
    pub fill_colour: Colour,
    /// Start of the current subpath, for `h`.
    pub path_start: Option<Point>,
    /// Current point of the path under construction.
    pub current_point: Option<Point>,
    pub text: TextState,
}

impl GraphicsState {
    pub fn new() -> Self {
        Self {
            ctm: MATRIX_IDENTITY,
            origin: (0.0, 0.0),
            line_width: 1.0,
            line_cap: 0,
            line_join: 0,
            miter_limit: 10.0,
            dash_array: Rc::from(&[][..]),
            dash_phase: 0.0,
            rendering_intent: Rc::from("RelativeColorimetric"),
            flatness: 1.0,
            ext_gstate: None,
            stroke_colour: Colour::default(),
            fill_colour: Colour::default(),
            path_start: None,
            current_point: None,
            text: TextState::new(),
        }
    }

    /// Initial state for a page whose media box starts at `origin`.
    pub fn with_origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_ctm(mut self, ctm: Matrix) -> Self {
        self.ctm = ctm;
        self
    }

    /// User space to device space.
    pub fn user_to_device(&self, p: Point) -> Point {
        let (x, y) = apply_matrix_pt(self.ctm, p);
        (x - self.origin.0, y - self.origin.1)
    }

    /// Text space to user space.
    pub fn text_to_user(&self, p: Point) -> Point {
        apply_matrix_pt(self.text.matrix, p)
    }

    /// Text space to device space.
    pub fn text_to_device(&self, p: Point) -> Point {
        let (x, y) = apply_matrix_pt(apply_matrix(self.text.matrix, self.ctm), p);
        (x - self.origin.0, y - self.origin.1)
    }

    /// Device-space position where the next glyph is drawn.
    pub fn text_origin(&self) -> Point {
        self.text_to_device((0.0, self.text.rise))
    }

    pub fn clear_path(&mut self) {
        self.path_start = None;
        self.current_point = None;
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::matrix::{scaling, translation};

    #[test]
    fn clone_shares_colour_components() {
        let mut state = GraphicsState::new();
        state.fill_colour = Colour::new("DeviceRGB", &[1.0, 0.5, 0.0]);
        let copy = state.clone();
        assert!(Rc::ptr_eq(
            &state.fill_colour.components,
            &copy.fill_colour.components
        ));
        assert_eq!(copy, state);
    }

    #[test]
    fn device_space_subtracts_media_origin() {
        let state = GraphicsState::new()
            .with_ctm(translation(100.0, 200.0))
            .with_origin((50.0, 50.0));
        assert_eq!(state.user_to_device((0.0, 0.0)), (50.0, 150.0));
    }

    #[test]
    fn text_to_device_composes_text_matrix_and_ctm() {
        let mut state = GraphicsState::new().with_ctm(scaling(2.0, 2.0));
        state.text.matrix = translation(10.0, 20.0);
        assert_eq!(state.text_to_user((1.0, 0.0)), (11.0, 20.0));
        assert_eq!(state.text_to_device((1.0, 0.0)), (22.0, 40.0));
    }

    #[test]
    fn initial_colours() {
        assert_eq!(&*Colour::initial("DeviceCMYK").components, &[0.0, 0.0, 0.0, 1.0]);
        assert!(Colour::initial("Pattern").components.is_empty());
    }
}
