//! In-memory fixture builders shared by the integration tests.
#![allow(dead_code)]

use folio_core::document::{PDFDocument, Permissions, SaveOptions};

/// Assembles a single-revision file with a classic xref table.
#[derive(Debug, Default)]
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
    trailer: String,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, objid: u32, body: &str) -> Self {
        self.objects.push((objid, body.as_bytes().to_vec()));
        self
    }

    /// A stream object with an exact `/Length`.
    pub fn stream(mut self, objid: u32, extra: &str, data: &[u8]) -> Self {
        let mut body = format!("<< /Length {} {extra} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push((objid, body));
        self
    }

    pub fn trailer(mut self, trailer: &str) -> Self {
        self.trailer = trailer.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = std::collections::BTreeMap::new();
        for (objid, body) in &self.objects {
            offsets.insert(*objid, out.len());
            out.extend_from_slice(format!("{objid} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        let size = offsets.keys().max().map_or(1, |max| max + 1);
        let xref_pos = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        out.extend_from_slice(b"0000000000 65535 f\r\n");
        for objid in 1..size {
            let line = match offsets.get(&objid) {
                Some(offset) => format!("{offset:010} 00000 n\r\n"),
                None => "0000000000 00001 f\r\n".to_string(),
            };
            out.extend_from_slice(line.as_bytes());
        }
        out.extend_from_slice(
            format!("trailer\n{}\nstartxref\n{xref_pos}\n%%EOF\n", self.trailer).as_bytes(),
        );
        out
    }
}

pub const FONT_WIDTHS: &str = "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica \
     /FirstChar 72 /LastChar 73 /Widths [722 278] /FontDescriptor 11 0 R >>";

/// Three pages, the first two under an intermediate `Pages` node that
/// inherits `MediaBox` and `Resources` from the root.
///
/// Objects: 1 catalog, 2 root pages, 3 intermediate pages, 4-6 pages,
/// 7-9 contents, 10 font, 11 font descriptor, 12 info.
pub fn three_page_pdf() -> Vec<u8> {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R 6 0 R] /Count 3 /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 10 0 R >> >> >>",
        )
        .object(3, "<< /Type /Pages /Parent 2 0 R /Kids [4 0 R 5 0 R] /Count 2 >>")
        .object(4, "<< /Type /Page /Parent 3 0 R /Contents 7 0 R >>")
        .object(5, "<< /Type /Page /Parent 3 0 R /Contents 8 0 R /Rotate 90 >>")
        .object(
            6,
            "<< /Type /Page /Parent 2 0 R /Contents 9 0 R /MediaBox [0 0 300 300] >>",
        )
        .stream(7, "", b"BT /F1 12 Tf 72 700 Td (Page one) Tj ET")
        .stream(8, "", b"BT /F1 12 Tf 72 700 Td (Page two) Tj ET")
        .stream(9, "", b"BT /F1 12 Tf 72 700 Td (Page three) Tj ET")
        .object(10, FONT_WIDTHS)
        .object(11, "<< /Type /FontDescriptor /FontName /Helvetica /MissingWidth 500 >>")
        .object(12, "<< /Title (Fixture) /Producer (folio tests) >>")
        .trailer("<< /Size 13 /Root 1 0 R /Info 12 0 R /ID [<00112233445566778899aabbccddeeff> <00112233445566778899aabbccddeeff>] >>")
        .build()
}

/// One page whose content is `content` and whose media box is `media_box`.
pub fn single_page_pdf(content: &[u8], media_box: &str) -> Vec<u8> {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox {media_box} /Contents 4 0 R \
                 /Resources << /Font << /F1 5 0 R >> >> >>"
            ),
        )
        .stream(4, "", content)
        .object(5, FONT_WIDTHS)
        .trailer("<< /Size 6 /Root 1 0 R >>")
        .build()
}

/// `three_page_pdf` encrypted with the given passwords.
pub fn encrypted_pdf(owner: &str, user: &str, permissions: Permissions) -> Vec<u8> {
    let mut doc = PDFDocument::new(three_page_pdf()).expect("fixture parses");
    doc.encrypt(owner, user, permissions).expect("fixture encrypts");
    doc.save(&SaveOptions::full()).expect("fixture saves").to_vec()
}

/// Number of `xref` sections in a buffer.
pub fn count_xref_sections(data: &[u8]) -> usize {
    data.windows(5)
        .enumerate()
        .filter(|(i, w)| *w == b"xref\n" && (*i == 0 || data[i - 1] != b't'))
        .count()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
