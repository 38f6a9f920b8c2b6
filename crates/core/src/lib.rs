//! folio - a PDF document engine.
//!
//! Load a document, navigate and edit its object graph, read and rewrite
//! page content streams, and save either as a clean rewrite or as an
//! appended incremental revision. The standard security handler (RC4,
//! 40-bit) is applied transparently on load and save.

pub mod codec;
pub mod content;
pub mod document;
pub mod error;
pub mod interp;
pub mod model;
pub mod parser;

pub use content::{ContentTree, Op, Operation};
pub use document::{OpenOptions, PDFDocument, Permissions, SaveMode, SaveOptions};
pub use error::{PdfError, Result};
pub use model::{PDFObjRef, PDFObject, PDFStream};
