//! Graphics-state operator semantics.
//!
//! [`GraphicsEngine`] is a [`StateHandler`]: each operator maps the incoming
//! [`GraphicsState`] to a new one. `q`/`Q` need no code here because the
//! traversal drops the state of a `q` block when it closes.
//!
//! Text showing follows the glyph advance model
//!
//! ```text
//! horizontal: tx = (w0 / 1000 · Tfs + Tc + Tw·[byte == 32]) · Th
//! vertical:   ty =  w1 / 1000 · Tfs + Tc + Tw·[byte == 32]
//! ```
//!
//! and `TJ` numbers kern by `-(n / 1000) · Tfs · Th`.

use crate::content::ops::Op;
use crate::content::traverse::StateHandler;
use crate::content::tree::{InlineImage, Operation};
use crate::interp::device::{FontMetrics, TextRenderer};
use crate::interp::matrix::{Matrix, apply_matrix, translate_matrix};
use crate::model::objects::PDFObject;
use crate::model::state::{Colour, GraphicsState};
use log::{debug, trace};
use std::rc::Rc;

/// Applies operators to a [`GraphicsState`] and reports shown text.
pub struct GraphicsEngine<'a> {
    metrics: Rc<dyn FontMetrics>,
    renderer: &'a mut dyn TextRenderer,
}

impl<'a> GraphicsEngine<'a> {
    pub fn new(metrics: Rc<dyn FontMetrics>, renderer: &'a mut dyn TextRenderer) -> Self {
        Self { metrics, renderer }
    }

    pub fn metrics(&self) -> &Rc<dyn FontMetrics> {
        &self.metrics
    }

    /// Apply `operation` to `state` in place. Returns `false` when the
    /// operator leaves the state unchanged.
    pub fn apply(&mut self, operation: &Operation, state: &mut GraphicsState) -> bool {
        let op = &operation.op;
        match op {
            // q/Q are handled by the traversal.
            Op::Qq | Op::Q => false,

            Op::Cm => match operation.nums::<6>() {
                Some([a, b, c, d, e, f]) => {
                    state.ctm = apply_matrix((a, b, c, d, e, f), state.ctm);
                    true
                }
                None => malformed(operation),
            },
            Op::Ww => set_num(operation, &mut state.line_width),
            Op::J => match operation.num(0) {
                Some(v) => {
                    state.line_cap = v as i64;
                    true
                }
                None => malformed(operation),
            },
            Op::Jj => match operation.num(0) {
                Some(v) => {
                    state.line_join = v as i64;
                    true
                }
                None => malformed(operation),
            },
            Op::M => set_num(operation, &mut state.miter_limit),
            Op::D => self.do_d(operation, state),
            Op::Ri => match operation.name_arg(0) {
                Some(intent) => {
                    state.rendering_intent = Rc::from(intent);
                    true
                }
                None => malformed(operation),
            },
            Op::I => set_num(operation, &mut state.flatness),
            Op::Gs => match operation.name_arg(0) {
                Some(name) => {
                    state.ext_gstate = Some(Rc::from(name));
                    true
                }
                None => malformed(operation),
            },

            Op::Mm | Op::L | Op::C | Op::V | Op::Y | Op::Re | Op::H => self.do_path(operation, state),
            Op::S
            | Op::Ss
            | Op::F
            | Op::Ff
            | Op::FStar
            | Op::B
            | Op::BStar
            | Op::Bb
            | Op::BbStar
            | Op::N => {
                state.clear_path();
                true
            }
            // Clipping takes effect at the next painting operator.
            Op::WClip | Op::WStar => false,

            Op::CS | Op::Cs => match operation.name_arg(0) {
                Some(space) => {
                    let colour = Colour::initial(space);
                    if *op == Op::CS {
                        state.stroke_colour = colour;
                    } else {
                        state.fill_colour = colour;
                    }
                    true
                }
                None => malformed(operation),
            },
            Op::SC | Op::SCN | Op::Sc | Op::Scn => {
                let stroke = matches!(op, Op::SC | Op::SCN);
                let target = if stroke {
                    &mut state.stroke_colour
                } else {
                    &mut state.fill_colour
                };
                set_components(operation, target);
                true
            }
            Op::G => self.device_colour(operation, state, "DeviceGray", 1, true),
            Op::Gg => self.device_colour(operation, state, "DeviceGray", 1, false),
            Op::RG => self.device_colour(operation, state, "DeviceRGB", 3, true),
            Op::Rg => self.device_colour(operation, state, "DeviceRGB", 3, false),
            Op::K => self.device_colour(operation, state, "DeviceCMYK", 4, true),
            Op::Kk => self.device_colour(operation, state, "DeviceCMYK", 4, false),

            Op::BT => {
                state.text.reset();
                true
            }
            Op::ET => false,
            Op::Tc => set_num(operation, &mut state.text.char_spacing),
            Op::Tw => set_num(operation, &mut state.text.word_spacing),
            Op::Tz => set_num(operation, &mut state.text.horizontal_scaling),
            Op::TL => set_num(operation, &mut state.text.leading),
            Op::Tr => match operation.num(0) {
                Some(v) => {
                    state.text.render_mode = v as i64;
                    true
                }
                None => malformed(operation),
            },
            Op::Ts => set_num(operation, &mut state.text.rise),
            Op::Tf => {
                let (Some(font), Some(size)) = (operation.name_arg(0), operation.num(1)) else {
                    return malformed(operation);
                };
                state.text.vertical = self.metrics.is_vertical(font);
                state.text.font = Some(Rc::from(font));
                state.text.font_size = size;
                true
            }
            Op::Td => match operation.nums::<2>() {
                Some([tx, ty]) => {
                    next_line(state, tx, ty);
                    true
                }
                None => malformed(operation),
            },
            Op::TD => match operation.nums::<2>() {
                Some([tx, ty]) => {
                    state.text.leading = -ty;
                    next_line(state, tx, ty);
                    true
                }
                None => malformed(operation),
            },
            Op::Tm => match operation.nums::<6>() {
                Some([a, b, c, d, e, f]) => {
                    let m: Matrix = (a, b, c, d, e, f);
                    state.text.matrix = m;
                    state.text.line_matrix = m;
                    true
                }
                None => malformed(operation),
            },
            Op::TStar => {
                let leading = state.text.leading;
                next_line(state, 0.0, -leading);
                true
            }
            Op::Tj => match operation.string_arg(0) {
                Some(text) => {
                    self.show_text(state, text);
                    true
                }
                None => malformed(operation),
            },
            Op::Quote => match operation.string_arg(0) {
                Some(text) => {
                    let leading = state.text.leading;
                    next_line(state, 0.0, -leading);
                    self.show_text(state, text);
                    true
                }
                None => malformed(operation),
            },
            Op::DoubleQuote => {
                let (Some(aw), Some(ac), Some(text)) =
                    (operation.num(0), operation.num(1), operation.string_arg(2))
                else {
                    return malformed(operation);
                };
                state.text.word_spacing = aw;
                state.text.char_spacing = ac;
                let leading = state.text.leading;
                next_line(state, 0.0, -leading);
                self.show_text(state, text);
                true
            }
            Op::TJ => match operation.args.first() {
                Some(PDFObject::Array(items)) => {
                    self.show_array(state, items);
                    true
                }
                _ => malformed(operation),
            },

            // Type 3 glyph metrics, shading, XObjects, marked content and
            // compatibility sections carry no state.
            Op::D0
            | Op::D1
            | Op::Sh
            | Op::Do
            | Op::BI
            | Op::ID
            | Op::EI
            | Op::MP
            | Op::DP
            | Op::BMC
            | Op::BDC
            | Op::EMC
            | Op::BX
            | Op::EX => false,
            Op::Other(_) => {
                trace!("ignoring operator {op}");
                false
            }
        }
    }

    // ========================================================================
    // Graphics state
    // ========================================================================

    fn do_d(&mut self, operation: &Operation, state: &mut GraphicsState) -> bool {
        let (Some(PDFObject::Array(items)), Some(phase)) = (operation.args.first(), operation.num(1))
        else {
            return malformed(operation);
        };
        let dashes: Vec<f64> = items.iter().filter_map(|v| v.as_num().ok()).collect();
        state.dash_array = Rc::from(dashes);
        state.dash_phase = phase;
        true
    }

    // ========================================================================
    // Path construction
    // ========================================================================

    fn do_path(&mut self, operation: &Operation, state: &mut GraphicsState) -> bool {
        match operation.op {
            Op::Mm => match operation.nums::<2>() {
                Some([x, y]) => {
                    state.path_start = Some((x, y));
                    state.current_point = Some((x, y));
                }
                None => return malformed(operation),
            },
            Op::L => match operation.nums::<2>() {
                Some([x, y]) => state.current_point = Some((x, y)),
                None => return malformed(operation),
            },
            Op::C => match operation.nums::<6>() {
                Some([_, _, _, _, x3, y3]) => state.current_point = Some((x3, y3)),
                None => return malformed(operation),
            },
            Op::V | Op::Y => match operation.nums::<4>() {
                Some([_, _, x3, y3]) => state.current_point = Some((x3, y3)),
                None => return malformed(operation),
            },
            Op::Re => match operation.nums::<4>() {
                Some([x, y, _, _]) => {
                    state.path_start = Some((x, y));
                    state.current_point = Some((x, y));
                }
                None => return malformed(operation),
            },
            Op::H => {
                if state.path_start.is_none() {
                    return false;
                }
                state.current_point = state.path_start;
            }
            _ => return false,
        }
        true
    }

    // ========================================================================
    // Colour
    // ========================================================================

    fn device_colour(
        &mut self,
        operation: &Operation,
        state: &mut GraphicsState,
        space: &str,
        arity: usize,
        stroke: bool,
    ) -> bool {
        let components: Option<Vec<f64>> = (0..arity).map(|i| operation.num(i)).collect();
        let Some(components) = components else {
            return malformed(operation);
        };
        let colour = Colour::new(space, &components);
        if stroke {
            state.stroke_colour = colour;
        } else {
            state.fill_colour = colour;
        }
        true
    }

    // ========================================================================
    // Text showing
    // ========================================================================

    /// Advance of `text` in text space along the writing direction.
    pub fn run_advance(&self, state: &GraphicsState, text: &[u8]) -> f64 {
        let ts = &state.text;
        let font = ts.font_name().unwrap_or_default();
        let th = if ts.vertical { 1.0 } else { ts.scale_factor() };
        text.iter()
            .map(|&b| {
                let w = if ts.vertical {
                    self.metrics.glyph_height(font, b)
                } else {
                    self.metrics.glyph_width(font, b)
                };
                let word = if b == b' ' { ts.word_spacing } else { 0.0 };
                (w / 1000.0 * ts.font_size + ts.char_spacing + word) * th
            })
            .sum()
    }

    /// Report one run to the renderer, then move the text matrix past it.
    fn show_text(&mut self, state: &mut GraphicsState, text: &[u8]) {
        if state.text.font.is_none() {
            debug!("text shown before Tf; using default metrics");
        }
        let width = self.run_advance(state, text);
        self.renderer.text_run(state, text, width);
        advance(state, width);
    }

    fn show_array(&mut self, state: &mut GraphicsState, items: &[PDFObject]) {
        for item in items {
            match item {
                PDFObject::String(text) | PDFObject::HexString(text) => self.show_text(state, text),
                PDFObject::Int(_) | PDFObject::Real(_) => {
                    let n = item.as_num().unwrap_or_default();
                    let th = if state.text.vertical {
                        1.0
                    } else {
                        state.text.scale_factor()
                    };
                    advance(state, -(n / 1000.0) * state.text.font_size * th);
                }
                other => debug!("ignoring {} in TJ array", other.type_name()),
            }
        }
    }
}

impl StateHandler for GraphicsEngine<'_> {
    type State = GraphicsState;

    fn handle(&mut self, operation: &Operation, state: &GraphicsState) -> Option<GraphicsState> {
        let mut next = state.clone();
        self.apply(operation, &mut next).then_some(next)
    }

    fn inline_image(&mut self, image: &InlineImage, _state: &GraphicsState) {
        trace!("inline image, {} bytes", image.data.len());
    }
}

/// Move the text matrix along the writing direction.
fn advance(state: &mut GraphicsState, amount: f64) {
    let offset = if state.text.vertical {
        (0.0, amount)
    } else {
        (amount, 0.0)
    };
    state.text.matrix = translate_matrix(state.text.matrix, offset);
}

/// `Td` semantics: offset the line matrix and restart the text matrix there.
fn next_line(state: &mut GraphicsState, tx: f64, ty: f64) {
    state.text.line_matrix = translate_matrix(state.text.line_matrix, (tx, ty));
    state.text.matrix = state.text.line_matrix;
}

fn set_num(operation: &Operation, slot: &mut f64) -> bool {
    match operation.num(0) {
        Some(v) => {
            *slot = v;
            true
        }
        None => malformed(operation),
    }
}

/// `SC`/`SCN`/`sc`/`scn`: numeric components, optionally followed by a
/// pattern name.
fn set_components(operation: &Operation, colour: &mut Colour) {
    let mut components = Vec::with_capacity(operation.args.len());
    let mut pattern = None;
    for arg in &operation.args {
        match arg {
            PDFObject::Name(name) => pattern = Some(Rc::from(name.as_str())),
            other => {
                if let Ok(v) = other.as_num() {
                    components.push(v);
                }
            }
        }
    }
    colour.components = Rc::from(components);
    colour.pattern = pattern;
}

fn malformed(operation: &Operation) -> bool {
    debug!("skipping {} with malformed operands", operation.op);
    false
}
