//! Error types for folio.

use thiserror::Error;

/// Primary error type for document operations.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Malformed token, unterminated string or block, bad xref record.
    #[error("parse error at offset {pos}: {msg} (near {context:?})")]
    Parse {
        pos: usize,
        msg: String,
        context: String,
    },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Object number not present in the cross-reference index.
    #[error("PDF object not found: {0}")]
    ObjectNotFound(u32),

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("page {0} does not exist")]
    PageNotFound(usize),

    /// The document uses a security scheme this handler does not implement.
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// Password verification failed (or every prompt attempt was exhausted).
    #[error("incorrect password")]
    WrongPassword,

    /// Operation needs owner credentials the document was not opened with.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("filter error: {0}")]
    Filter(String),

    #[error("invalid document structure: {0}")]
    Structure(String),
}

impl PdfError {
    /// Build a parse error carrying a short excerpt of `data` around `pos`.
    pub fn parse(data: &[u8], pos: usize, msg: impl Into<String>) -> Self {
        let start = pos.min(data.len());
        let end = (start + 16).min(data.len());
        Self::Parse {
            pos,
            msg: msg.into(),
            context: String::from_utf8_lossy(&data[start..end]).into_owned(),
        }
    }

    /// True for the "wrong credentials" security failure.
    pub const fn is_wrong_password(&self) -> bool {
        matches!(self, Self::WrongPassword)
    }

    /// True for either security failure (unsupported scheme or credentials).
    pub const fn is_security_error(&self) -> bool {
        matches!(self, Self::WrongPassword | Self::UnsupportedEncryption(_))
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_excerpt() {
        let err = PdfError::parse(b"1 0 obj << /Bad )", 11, "unexpected ')'");
        match err {
            PdfError::Parse { pos, context, .. } => {
                assert_eq!(pos, 11);
                assert_eq!(context, "/Bad )");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn security_errors_are_distinguishable() {
        assert!(PdfError::WrongPassword.is_wrong_password());
        let unsupported = PdfError::UnsupportedEncryption("V=4".into());
        assert!(unsupported.is_security_error());
        assert!(!unsupported.is_wrong_password());
    }
}
