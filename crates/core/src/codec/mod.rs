//! Codec modules for stream filters and encryption.
//!
//! - `arcfour`: RC4 cipher used by the standard security handler
//! - `filters`: Flate, ASCIIHex and ASCII85 stream filters

pub mod arcfour;
pub mod filters;

pub use arcfour::{Arcfour, rc4};
pub use filters::{apply_filters, flate_decode, flate_encode};
