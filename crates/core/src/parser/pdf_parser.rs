//! PDF parser - converts tokens to PDF objects.
//!
//! Handles the recursive value grammar, indirect references (`num num R`)
//! and `N G obj ... endobj` wrappers including stream bodies.

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, IndirectObject, PDFObjRef, PDFObject, PDFStream};
use crate::parser::lexer::{PSBaseParser, PSToken, is_whitespace};
use bytes::Bytes;
use log::{debug, warn};

/// PDF Parser - parses PDF object syntax
///
/// Uses PSBaseParser for tokenization and builds PDF objects,
/// handling indirect references (num num R) appropriately.
pub struct PDFParser<'a> {
    base: PSBaseParser<'a>,
    /// Lookahead buffer for tokens; the next token is the last element.
    lookahead: Vec<(usize, PSToken)>,
}

impl<'a> PDFParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            base: PSBaseParser::new(data),
            lookahead: Vec::new(),
        }
    }

    /// Parse within `data[start..end]`.
    pub fn with_bounds(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            base: PSBaseParser::with_bounds(data, start, end),
            lookahead: Vec::new(),
        }
    }

    /// Offset of the next unread token (or of the cursor if none is buffered).
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map(|(pos, _)| *pos)
            .unwrap_or_else(|| self.base.tell())
    }

    /// Get next token (from lookahead or parser)
    fn next_token(&mut self) -> Result<Option<(usize, PSToken)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.base.next_token().transpose()
    }

    /// Push token back to lookahead
    fn push_back(&mut self, tok: (usize, PSToken)) {
        self.lookahead.push(tok);
    }

    fn error(&self, pos: usize, msg: impl Into<String>) -> PdfError {
        PdfError::parse(self.base.data(), pos, msg)
    }

    /// Parse next PDF object
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(token)
    }

    /// Convert a token to a PDF object
    fn token_to_object(&mut self, (pos, token): (usize, PSToken)) -> Result<PDFObject> {
        match token {
            PSToken::Int(n) => {
                // Could be start of indirect reference: objid genno R
                if let Some(tok2) = self.next_token()? {
                    if let PSToken::Int(m) = tok2.1 {
                        if let Some(tok3) = self.next_token()? {
                            if tok3.1.is_keyword(b"R") {
                                let objid = u32::try_from(n)
                                    .map_err(|_| self.error(pos, "invalid object number"))?;
                                let genno = u16::try_from(m).unwrap_or(u16::MAX);
                                return Ok(PDFObject::Ref(PDFObjRef::new(objid, genno)));
                            }
                            self.push_back(tok3);
                        }
                    }
                    self.push_back(tok2);
                }
                Ok(PDFObject::Int(n))
            }
            PSToken::Real(n) => Ok(PDFObject::Real(n)),
            PSToken::Bool(b) => Ok(PDFObject::Bool(b)),
            PSToken::Literal(s) => Ok(PDFObject::Name(s)),
            PSToken::String(s) => Ok(PDFObject::String(s)),
            PSToken::HexString(s) => Ok(PDFObject::HexString(s)),
            PSToken::Keyword(kw) => match kw.as_slice() {
                b"null" => Ok(PDFObject::Null),
                b"[" => self.parse_array(),
                b"<<" => self.parse_dict(),
                _ => Err(self.error(
                    pos,
                    format!("unexpected keyword: {}", String::from_utf8_lossy(&kw)),
                )),
            },
        }
    }

    /// Parse array contents until ]
    fn parse_array(&mut self) -> Result<PDFObject> {
        let mut arr = Vec::new();

        loop {
            let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token.1.is_keyword(b"]") {
                break;
            }
            arr.push(self.token_to_object(token)?);
        }

        Ok(PDFObject::Array(arr))
    }

    /// Parse dict contents until >>
    fn parse_dict(&mut self) -> Result<PDFObject> {
        Ok(PDFObject::Dict(self.parse_dict_body()?))
    }

    fn parse_dict_body(&mut self) -> Result<Dict> {
        let mut dict = Dict::new();

        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token.is_keyword(b">>") {
                break;
            }

            let key = match token {
                PSToken::Literal(name) => name,
                _ => return Err(self.error(pos, "expected name as dict key")),
            };

            let value_pos = self.tell();
            let value = self.parse_object()?;
            if matches!(value, PDFObject::Null) && dict.contains_key(&key) {
                debug!("duplicate key /{key} at {value_pos} set to null");
            }
            dict.insert(key, value);
        }

        Ok(dict)
    }

    /// Parse an `N G obj ... endobj` object starting at the cursor.
    ///
    /// `resolve_length` is consulted when a stream's `/Length` is an
    /// indirect reference. A stream whose length cannot be trusted falls
    /// back to scanning for the `endstream` keyword.
    pub fn parse_indirect(
        &mut self,
        expected_objid: Option<u32>,
        mut resolve_length: impl FnMut(&PDFObjRef) -> Option<i64>,
    ) -> Result<IndirectObject> {
        let start = self.tell();
        let objid = match self.next_token()? {
            Some((_, PSToken::Int(n))) => {
                u32::try_from(n).map_err(|_| self.error(start, "invalid object number"))?
            }
            _ => return Err(self.error(start, "expected object number")),
        };
        let genno = match self.next_token()? {
            Some((_, PSToken::Int(n))) => u16::try_from(n).unwrap_or(u16::MAX),
            _ => return Err(self.error(start, "expected generation number")),
        };
        match self.next_token()? {
            Some((_, tok)) if tok.is_keyword(b"obj") => {}
            _ => return Err(self.error(start, "expected 'obj'")),
        }
        if let Some(expected) = expected_objid
            && expected != objid
        {
            return Err(self.error(
                start,
                format!("expected object {expected}, found object {objid}"),
            ));
        }

        let mut value = self.parse_object()?;

        match self.next_token()? {
            Some((_, tok)) if tok.is_keyword(b"stream") => {
                let attrs = match value {
                    PDFObject::Dict(dict) => dict,
                    other => {
                        return Err(self.error(
                            start,
                            format!("stream keyword after {}", other.type_name()),
                        ));
                    }
                };
                let mut stream = self.parse_stream_body(attrs, &mut resolve_length)?;
                stream.set_objid(objid, genno);
                value = PDFObject::Stream(Box::new(stream));
                self.expect_endobj(objid);
            }
            Some((_, tok)) if tok.is_keyword(b"endobj") => {}
            Some(tok) => {
                debug!("object {objid}: missing endobj");
                self.push_back(tok);
            }
            None => debug!("object {objid}: missing endobj at end of bounds"),
        }

        Ok(IndirectObject::new(objid, genno, value))
    }

    fn expect_endobj(&mut self, objid: u32) {
        match self.next_token() {
            Ok(Some((_, tok))) if tok.is_keyword(b"endobj") => {}
            Ok(Some(tok)) => {
                debug!("object {objid}: missing endobj after stream");
                self.push_back(tok);
            }
            _ => debug!("object {objid}: missing endobj after stream"),
        }
    }

    /// Read the stream payload right after the `stream` keyword.
    fn parse_stream_body(
        &mut self,
        attrs: Dict,
        resolve_length: &mut impl FnMut(&PDFObjRef) -> Option<i64>,
    ) -> Result<PDFStream> {
        debug_assert!(self.lookahead.is_empty());
        self.base.skip_eol();
        let data = self.base.data();
        let start = self.base.tell();
        let end = self.base.end();

        let declared = match attrs.get("Length") {
            Some(PDFObject::Int(n)) => Some(*n),
            Some(PDFObject::Ref(r)) => resolve_length(r),
            _ => None,
        };

        if let Some(len) = declared.and_then(|n| usize::try_from(n).ok())
            && start + len <= end
        {
            let mut probe = PSBaseParser::with_bounds(data, start + len, end);
            if let Some(Ok((_, tok))) = probe.next_token()
                && tok.is_keyword(b"endstream")
            {
                let payload = Bytes::copy_from_slice(&data[start..start + len]);
                self.base.set_pos(probe.tell());
                return Ok(PDFStream::from_parts(attrs, payload));
            }
            warn!("stream at {start}: /Length {len} not followed by endstream, scanning");
        }

        let window = &data[start..end];
        match find_endstream(window) {
            Some((payload_end, keyword_end)) => {
                let payload = Bytes::copy_from_slice(&window[..payload_end]);
                self.base.set_pos(start + keyword_end);
                Ok(PDFStream::from_parts(attrs, payload))
            }
            None => Err(self.error(start, "unterminated stream")),
        }
    }
}

/// Locate the `endstream` keyword in a stream window.
///
/// Returns (end of payload, end of keyword). A single end-of-line marker
/// before the keyword belongs to the syntax, not the payload. Binary data
/// that contains the literal keyword will be cut short here; callers prefer
/// an explicit `/Length` for that reason.
pub(crate) fn find_endstream(window: &[u8]) -> Option<(usize, usize)> {
    const NEEDLE: &[u8] = b"endstream";
    let pos = window
        .windows(NEEDLE.len())
        .position(|w| w == NEEDLE)?;
    let mut payload_end = pos;
    if payload_end > 0 && window[payload_end - 1] == b'\n' {
        payload_end -= 1;
        if payload_end > 0 && window[payload_end - 1] == b'\r' {
            payload_end -= 1;
        }
    } else if payload_end > 0 && window[payload_end - 1] == b'\r' {
        payload_end -= 1;
    }
    Some((payload_end, pos + NEEDLE.len()))
}

/// Parse one complete object from a byte string.
pub fn parse_object_bytes(data: &[u8]) -> Result<PDFObject> {
    let mut parser = PDFParser::new(data);
    let obj = parser.parse_object()?;
    let rest = parser.tell();
    if data[rest..].iter().any(|b| !is_whitespace(*b)) {
        return Err(PdfError::parse(data, rest, "trailing data after object"));
    }
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_and_plain_integers() {
        let obj = parse_object_bytes(b"[1 0 R 2 3 4 R 5]").unwrap();
        assert_eq!(
            obj,
            PDFObject::Array(vec![
                PDFObject::Ref(PDFObjRef::new(1, 0)),
                PDFObject::Int(2),
                PDFObject::Ref(PDFObjRef::new(3, 4)),
                PDFObject::Int(5),
            ])
        );
    }

    #[test]
    fn dictionary_keeps_insertion_order() {
        let obj = parse_object_bytes(b"<< /Z 1 /A (x) /M <41> /N null >>").unwrap();
        let keys: Vec<&str> = obj.as_dict().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["Z", "A", "M", "N"]);
        assert_eq!(obj.get("M"), Some(&PDFObject::HexString(b"A".to_vec())));
    }

    #[test]
    fn dict_key_must_be_name() {
        assert!(matches!(
            parse_object_bytes(b"<< (k) 1 >>"),
            Err(PdfError::Parse { .. })
        ));
    }

    #[test]
    fn stream_with_direct_length() {
        let data = b"4 0 obj\n<< /Length 5 >>\nstream\nab\ncd\nendstream\nendobj\n";
        let mut parser = PDFParser::new(data);
        let obj = parser.parse_indirect(Some(4), |_| None).unwrap();
        let stream = obj.value.as_stream().unwrap();
        assert_eq!(stream.get_rawdata(), b"ab\ncd");
        assert_eq!(stream.objid, Some(4));
    }

    #[test]
    fn stream_with_indirect_length() {
        let data = b"4 0 obj\n<< /Length 9 0 R >>\nstream\r\nxyz\r\nendstream\nendobj";
        let mut parser = PDFParser::new(data);
        let obj = parser
            .parse_indirect(None, |r| (r.objid == 9).then_some(3))
            .unwrap();
        assert_eq!(obj.value.as_stream().unwrap().get_rawdata(), b"xyz");
    }

    #[test]
    fn stream_without_length_scans_for_endstream() {
        let data = b"4 0 obj\n<< >>\nstream\nhello\nendstream\nendobj";
        let mut parser = PDFParser::new(data);
        let obj = parser.parse_indirect(None, |_| None).unwrap();
        assert_eq!(obj.value.as_stream().unwrap().get_rawdata(), b"hello");
    }

    #[test]
    fn wrong_length_falls_back_to_scan() {
        let data = b"4 0 obj\n<< /Length 2 >>\nstream\nhello\nendstream\nendobj";
        let mut parser = PDFParser::new(data);
        let obj = parser.parse_indirect(None, |_| None).unwrap();
        assert_eq!(obj.value.as_stream().unwrap().get_rawdata(), b"hello");
    }

    #[test]
    fn object_number_mismatch_is_an_error() {
        let mut parser = PDFParser::new(b"5 0 obj 1 endobj");
        assert!(parser.parse_indirect(Some(6), |_| None).is_err());
    }
}
