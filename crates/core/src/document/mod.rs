//! PDF Document module - object store, revisions, pages, and security.
//!
//! This module contains:
//! - `catalog` - document loading, object resolution, mutation and saving (PDFDocument)
//! - `page` - page tree navigation and editing
//! - `security` - standard security handler (RC4, 40-bit)
//! - `storage` - whole-buffer byte storage backends
//! - `xref` - classic cross-reference tables

pub mod catalog;
pub mod page;
pub mod security;
pub mod storage;
pub mod xref;

pub use catalog::{OpenOptions, PDFDocument, SaveMode, SaveOptions};
pub use page::{DEFAULT_MEDIA_BOX, INHERITABLE_ATTRIBUTES};
pub use security::{
    PASSWORD_PADDING, PasswordPrompt, Permissions, SecurityHandler, decode_permissions,
    encode_permissions,
};
pub use storage::{ByteStorage, FileStorage, MemoryStorage};
pub use xref::{XRef, XRefEntry};
