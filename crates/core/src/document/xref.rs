//! Classic cross-reference tables.
//!
//! Reads and writes `xref` sections (20-byte records grouped into
//! subsections) and their trailers. Compressed cross-reference streams are
//! not supported.

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};
use crate::parser::lexer::{PSBaseParser, PSToken};
use crate::parser::pdf_parser::PDFParser;
use crate::parser::writer::{WriterOptions, write_object};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One cross-reference record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object stored at a byte offset.
    InUse { offset: usize, genno: u16 },
    /// Free slot; `next` links the free list, `genno` is the generation a
    /// reuse of this number will get.
    Free { next: u32, genno: u16 },
}

impl XRefEntry {
    pub const fn genno(&self) -> u16 {
        match self {
            Self::InUse { genno, .. } | Self::Free { genno, .. } => *genno,
        }
    }

    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }

    pub const fn offset(&self) -> Option<usize> {
        match self {
            Self::InUse { offset, .. } => Some(*offset),
            Self::Free { .. } => None,
        }
    }
}

/// Cross-reference section of one revision plus its trailer.
#[derive(Debug, Default, Clone)]
pub struct XRef {
    /// Map from object ID to entry, as listed in this section
    pub offsets: BTreeMap<u32, XRefEntry>,
    /// Trailer dictionary
    pub trailer: Dict,
    /// Offset of the `xref` keyword
    pub pos: usize,
}

impl XRef {
    /// Parse the `xref ... trailer << ... >>` block at `pos`.
    pub fn parse(data: &[u8], pos: usize) -> Result<Self> {
        if pos >= data.len() {
            return Err(PdfError::parse(data, pos, "xref offset beyond end of file"));
        }
        let mut lexer = PSBaseParser::new(data);
        lexer.set_pos(pos);

        match lexer.next_token() {
            Some(Ok((_, tok))) if tok.is_keyword(b"xref") => {}
            Some(Err(e)) => return Err(e),
            _ => return Err(PdfError::parse(data, pos, "expected 'xref'")),
        }

        let mut xref = Self {
            pos,
            ..Self::default()
        };

        loop {
            let (tok_pos, tok) = next_or_eof(&mut lexer)?;
            if tok.is_keyword(b"trailer") {
                break;
            }
            let PSToken::Int(start) = tok else {
                return Err(PdfError::parse(data, tok_pos, "expected subsection start"));
            };
            let count = read_int(&mut lexer, data, "expected subsection count")?;
            let mut base = u32::try_from(start)
                .map_err(|_| PdfError::parse(data, tok_pos, "negative subsection start"))?;

            for i in 0..count {
                let record_pos = lexer.tell();
                let offset = read_int(&mut lexer, data, "expected xref offset")?;
                let genno = read_int(&mut lexer, data, "expected xref generation")?;
                let (_, marker) = next_or_eof(&mut lexer)?;
                let free = if marker.is_keyword(b"f") {
                    true
                } else if marker.is_keyword(b"n") {
                    false
                } else {
                    return Err(PdfError::parse(data, record_pos, "bad xref record flag"));
                };

                // Some writers start the first subsection at 1 but still
                // include the object 0 head of the free list.
                if i == 0 && base == 1 && free && offset == 0 && genno == 65535 {
                    base = 0;
                }

                let objid = u32::try_from(i)
                    .ok()
                    .and_then(|i| base.checked_add(i))
                    .ok_or_else(|| {
                        PdfError::parse(data, record_pos, "subsection overflows object numbers")
                    })?;
                let genno = u16::try_from(genno).unwrap_or(u16::MAX);
                let entry = if free {
                    XRefEntry::Free {
                        next: u32::try_from(offset).unwrap_or(0),
                        genno,
                    }
                } else {
                    XRefEntry::InUse {
                        offset: usize::try_from(offset).map_err(|_| {
                            PdfError::parse(data, record_pos, "negative object offset")
                        })?,
                        genno,
                    }
                };
                xref.offsets.insert(objid, entry);
            }
        }

        let mut parser = PDFParser::with_bounds(data, lexer.tell(), data.len());
        xref.trailer = match parser.parse_object()? {
            PDFObject::Dict(dict) => dict,
            other => {
                return Err(PdfError::parse(
                    data,
                    lexer.tell(),
                    format!("trailer is a {}", other.type_name()),
                ));
            }
        };

        Ok(xref)
    }

    /// The trailer's `Prev` offset.
    pub fn prev(&self) -> Option<usize> {
        self.trailer
            .get("Prev")
            .and_then(|p| p.as_int().ok())
            .and_then(|p| usize::try_from(p).ok())
    }
}

fn next_or_eof(lexer: &mut PSBaseParser<'_>) -> Result<(usize, PSToken)> {
    lexer.next_token().ok_or(PdfError::UnexpectedEof)?
}

fn read_int(lexer: &mut PSBaseParser<'_>, data: &[u8], msg: &str) -> Result<i64> {
    match next_or_eof(lexer)? {
        (_, PSToken::Int(n)) if n >= 0 => Ok(n),
        (pos, _) => Err(PdfError::parse(data, pos, msg)),
    }
}

/// Locate the offset named by the last `startxref` in the file.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    const NEEDLE: &[u8] = b"startxref";
    let search_start = data.len().saturating_sub(1024);
    let hay = &data[search_start..];
    let found = hay
        .windows(NEEDLE.len())
        .rposition(|w| w == NEEDLE)
        .ok_or(PdfError::NoValidXRef)?;
    let mut lexer = PSBaseParser::new(data);
    lexer.set_pos(search_start + found + NEEDLE.len());
    match lexer.next_token() {
        Some(Ok((_, PSToken::Int(n)))) => usize::try_from(n).map_err(|_| PdfError::NoValidXRef),
        _ => Err(PdfError::NoValidXRef),
    }
}

/// Write an `xref` section, grouping consecutive numbers into subsections.
pub fn write_xref(out: &mut Vec<u8>, entries: &BTreeMap<u32, XRefEntry>) {
    out.extend_from_slice(b"xref\n");
    let ids: Vec<u32> = entries.keys().copied().collect();
    let mut start = 0;
    while start < ids.len() {
        let mut end = start + 1;
        while end < ids.len() && ids[end] == ids[end - 1] + 1 {
            end += 1;
        }
        let mut text = format!("{} {}\n", ids[start], end - start);
        for id in &ids[start..end] {
            let _ = match entries[id] {
                XRefEntry::InUse { offset, genno } => {
                    write!(text, "{offset:010} {genno:05} n\r\n")
                }
                XRefEntry::Free { next, genno } => write!(text, "{next:010} {genno:05} f\r\n"),
            };
        }
        out.extend_from_slice(text.as_bytes());
        start = end;
    }
}

/// Write `trailer`, `startxref` and the end-of-file marker.
pub fn write_trailer(out: &mut Vec<u8>, trailer: &Dict, startxref: usize) {
    out.extend_from_slice(b"trailer\n");
    write_object(out, &PDFObject::Dict(trailer.clone()), &WriterOptions::default());
    out.extend_from_slice(format!("\nstartxref\n{startxref}\n%%EOF\n").as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[u8] = b"xref\n0 3\n0000000000 65535 f\r\n0000000017 00000 n\r\n0000000081 00002 n\r\n5 1\n0000000120 00000 n\r\ntrailer\n<< /Size 6 /Root 1 0 R /Prev 9 >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn parses_subsections_and_trailer() {
        let xref = XRef::parse(TABLE, 0).unwrap();
        assert_eq!(
            xref.offsets[&0],
            XRefEntry::Free {
                next: 0,
                genno: 65535
            }
        );
        assert_eq!(
            xref.offsets[&2],
            XRefEntry::InUse {
                offset: 81,
                genno: 2
            }
        );
        assert_eq!(xref.offsets[&5].offset(), Some(120));
        assert_eq!(xref.offsets.len(), 4);
        assert_eq!(xref.prev(), Some(9));
        assert_eq!(find_startxref(TABLE).unwrap(), 0);
    }

    #[test]
    fn misnumbered_first_subsection_is_realigned() {
        let data = b"xref\n1 2\n0000000000 65535 f\r\n0000000017 00000 n\r\ntrailer\n<<>>";
        let xref = XRef::parse(data, 0).unwrap();
        assert!(xref.offsets[&0].is_free());
        assert_eq!(xref.offsets[&1].offset(), Some(17));
    }

    #[test]
    fn bad_record_flag_is_a_parse_error() {
        let data = b"xref\n0 1\n0000000000 65535 x\r\ntrailer\n<<>>";
        assert!(matches!(XRef::parse(data, 0), Err(PdfError::Parse { .. })));
    }

    #[test]
    fn subsection_past_last_object_number_is_a_parse_error() {
        let data = b"xref\n4294967295 2\n0000000017 00000 n\r\n0000000042 00000 n\r\ntrailer\n<<>>";
        assert!(matches!(XRef::parse(data, 0), Err(PdfError::Parse { .. })));

        let data = b"xref\n4294967295 1\n0000000017 00000 n\r\ntrailer\n<<>>";
        let xref = XRef::parse(data, 0).unwrap();
        assert_eq!(xref.offsets[&u32::MAX].offset(), Some(17));
    }

    #[test]
    fn written_table_reparses() {
        let mut entries = BTreeMap::new();
        entries.insert(
            0,
            XRefEntry::Free {
                next: 4,
                genno: 65535,
            },
        );
        entries.insert(3, XRefEntry::InUse { offset: 99, genno: 1 });
        entries.insert(4, XRefEntry::Free { next: 0, genno: 2 });
        entries.insert(9, XRefEntry::InUse { offset: 7, genno: 0 });
        let mut out = Vec::new();
        write_xref(&mut out, &entries);
        assert!(out.starts_with(b"xref\n0 1\n0000000004 65535 f\r\n3 2\n"));
        write_trailer(&mut out, &Dict::new(), 0);
        let xref = XRef::parse(&out, 0).unwrap();
        assert_eq!(xref.offsets, entries);
    }
}
