//! PDF syntax parsing and serialization.
//!
//! - `lexer`: byte tokenizer
//! - `pdf_parser`: token stream to `PDFObject`, indirect objects and streams
//! - `writer`: `PDFObject` back to bytes

pub mod lexer;
pub mod pdf_parser;
pub mod writer;

pub use lexer::{PSBaseParser, PSToken};
pub use pdf_parser::{PDFParser, parse_object_bytes};
pub use writer::{WriterOptions, write_indirect, write_object};
