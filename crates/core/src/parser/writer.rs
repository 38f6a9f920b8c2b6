//! PDF object serializer.
//!
//! Mirrors the grammar read by [`crate::parser::pdf_parser`]. Source
//! whitespace is not reproduced; output is compact with single spaces
//! between tokens.

use crate::model::objects::{Dict, PDFObject, PDFStream};
use std::fmt::Write as _;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Serializer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Longest run of bytes inside a literal string before a
    /// backslash-newline continuation is inserted.
    pub max_string_line: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_string_line: 255,
        }
    }
}

impl WriterOptions {
    pub const fn with_max_string_line(mut self, max: usize) -> Self {
        self.max_string_line = max;
        self
    }
}

/// Append the serialization of `obj` to `out`.
pub fn write_object(out: &mut Vec<u8>, obj: &PDFObject, opts: &WriterOptions) {
    match obj {
        PDFObject::Null => out.extend_from_slice(b"null"),
        PDFObject::Bool(true) => out.extend_from_slice(b"true"),
        PDFObject::Bool(false) => out.extend_from_slice(b"false"),
        PDFObject::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        PDFObject::Real(n) => out.extend_from_slice(format_real(*n).as_bytes()),
        PDFObject::Name(name) => write_name(out, name),
        PDFObject::String(s) => write_literal_string(out, s, opts.max_string_line),
        PDFObject::HexString(s) => write_hex_string(out, s),
        PDFObject::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item, opts);
            }
            out.push(b']');
        }
        PDFObject::Dict(dict) => write_dict(out, dict, opts),
        PDFObject::Stream(stream) => write_stream(out, stream, opts),
        PDFObject::Ref(r) => {
            let _ = write!(Buf(out), "{} {} R", r.objid, r.genno);
        }
    }
}

fn write_dict(out: &mut Vec<u8>, dict: &Dict, opts: &WriterOptions) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        write_name(out, key);
        out.push(b' ');
        write_object(out, value, opts);
    }
    out.extend_from_slice(b">>");
}

/// `Length` is always written as the direct payload length.
fn write_stream(out: &mut Vec<u8>, stream: &PDFStream, opts: &WriterOptions) {
    let data = stream.get_rawdata();
    let mut attrs = stream.attrs.clone();
    attrs.insert("Length".into(), PDFObject::Int(data.len() as i64));
    write_dict(out, &attrs, opts);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
}

/// Write a complete `N G obj ... endobj` block.
pub fn write_indirect(
    out: &mut Vec<u8>,
    objid: u32,
    genno: u16,
    obj: &PDFObject,
    opts: &WriterOptions,
) {
    let _ = writeln!(Buf(out), "{objid} {genno} obj");
    write_object(out, obj, opts);
    out.extend_from_slice(b"\nendobj\n");
}

/// Format a real without exponent, trailing zeros trimmed.
pub fn format_real(n: f64) -> String {
    if !n.is_finite() {
        return "0".to_string();
    }
    let mut s = format!("{n:.6}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Write `/name`, escaping delimiters and irregular bytes as `#xx`.
pub fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for &b in name.as_bytes() {
        if !(b'!'..=b'~').contains(&b) || b"#()/<>[]{}%".contains(&b) {
            out.push(b'#');
            out.push(HEX[(b >> 4) as usize]);
            out.push(HEX[(b & 0xf) as usize]);
        } else {
            out.push(b);
        }
    }
}

/// Write `(...)` with escapes, wrapping at `max_line` bytes per run.
pub fn write_literal_string(out: &mut Vec<u8>, s: &[u8], max_line: usize) {
    let max_line = max_line.max(8);
    out.push(b'(');
    let mut run = 0usize;
    let mut esc = [0u8; 4];
    for &b in s {
        let piece: &[u8] = match b {
            b'(' => b"\\(",
            b')' => b"\\)",
            b'\\' => b"\\\\",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\t' => b"\\t",
            0x08 => b"\\b",
            0x0c => b"\\f",
            0..=0x1f | 0x7f => {
                esc = [
                    b'\\',
                    b'0' + (b >> 6),
                    b'0' + ((b >> 3) & 7),
                    b'0' + (b & 7),
                ];
                &esc
            }
            _ => std::slice::from_ref(&b),
        };
        if run + piece.len() > max_line {
            out.extend_from_slice(b"\\\n");
            run = 0;
        }
        out.extend_from_slice(piece);
        run += piece.len();
    }
    out.push(b')');
}

pub fn write_hex_string(out: &mut Vec<u8>, s: &[u8]) {
    out.push(b'<');
    for &b in s {
        out.push(HEX[(b >> 4) as usize]);
        out.push(HEX[(b & 0xf) as usize]);
    }
    out.push(b'>');
}

/// `fmt::Write` adapter over a byte buffer.
struct Buf<'a>(&'a mut Vec<u8>);

impl std::fmt::Write for Buf<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl PDFObject {
    /// Serialize with default writer options.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_object(&mut out, self, &WriterOptions::default());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::dict_from;
    use crate::parser::pdf_parser::parse_object_bytes;

    #[test]
    fn reals_have_no_exponent() {
        assert_eq!(format_real(1.5), "1.5");
        assert_eq!(format_real(2.0), "2");
        assert_eq!(format_real(1e-9), "0");
        assert_eq!(format_real(-0.25), "-0.25");
        assert_eq!(format_real(12345678.0), "12345678");
    }

    #[test]
    fn names_escape_delimiters() {
        let mut out = Vec::new();
        write_name(&mut out, "A B#(x)");
        assert_eq!(out, b"/A#20B#23#28x#29");
    }

    #[test]
    fn literal_strings_escape_and_wrap() {
        let mut out = Vec::new();
        write_literal_string(&mut out, b"a(b)\\c\n\x01", 255);
        assert_eq!(out, b"(a\\(b\\)\\\\c\\n\\001)");

        let long = vec![b'x'; 20];
        let mut out = Vec::new();
        write_literal_string(&mut out, &long, 8);
        assert_eq!(out, b"(xxxxxxxx\\\nxxxxxxxx\\\nxxxx)");
        assert_eq!(
            parse_object_bytes(&out).unwrap(),
            PDFObject::String(long)
        );
    }

    #[test]
    fn dictionary_output_reparses_to_same_value() {
        let obj = PDFObject::Dict(dict_from([
            ("Type", PDFObject::name("Page")),
            ("Parent", PDFObject::reference(2)),
            (
                "MediaBox",
                PDFObject::Array(vec![
                    PDFObject::Int(0),
                    PDFObject::Int(0),
                    PDFObject::Real(612.5),
                    PDFObject::Int(792),
                ]),
            ),
            ("ID", PDFObject::HexString(vec![0xde, 0xad])),
            ("Flag", PDFObject::Bool(true)),
            ("Nothing", PDFObject::Null),
        ]));
        let bytes = obj.to_bytes();
        assert_eq!(
            bytes,
            b"<</Type /Page/Parent 2 0 R/MediaBox [0 0 612.5 792]/ID <DEAD>/Flag true/Nothing null>>"
        );
        assert_eq!(parse_object_bytes(&bytes).unwrap(), obj);
    }

    #[test]
    fn stream_length_is_written_direct() {
        let mut stream = PDFStream::new(Dict::new(), b"abc".to_vec());
        stream.attrs.insert("Length".into(), PDFObject::reference(9));
        let mut out = Vec::new();
        write_indirect(&mut out, 3, 0, &PDFObject::from(stream), &WriterOptions::default());
        assert_eq!(
            out,
            b"3 0 obj\n<</Length 3>>\nstream\nabc\nendstream\nendobj\n"
        );
    }
}
