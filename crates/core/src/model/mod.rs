//! Data model types - objects and graphics state.
//!
//! - `objects` - PDF object types (PDFObject, PDFStream, PDFObjRef)
//! - `state` - graphics and text state (GraphicsState, TextState, Colour)

pub mod objects;
pub mod state;

pub use objects::{Dict, IndirectObject, PDFObjRef, PDFObject, PDFStream};
pub use state::{Colour, GraphicsState, TextState};
