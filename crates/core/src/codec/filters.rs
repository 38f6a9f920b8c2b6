//! Stream filter decoding.
//!
//! Supports FlateDecode (with PNG/TIFF predictors), ASCIIHexDecode and
//! ASCII85Decode plus their abbreviated inline-image names. Anything else
//! is a [`PdfError::Filter`]; callers decide whether to fall back to the
//! undecoded payload.

use crate::error::{PdfError, Result};
use crate::model::objects::Dict;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::warn;
use std::io::{Read, Write};

/// Decode `data` through a filter chain (outermost filter first).
///
/// `parms[i]` holds the `DecodeParms` dictionary for `filters[i]`, if any.
pub fn apply_filters(data: &[u8], filters: &[&str], parms: &[Option<&Dict>]) -> Result<Vec<u8>> {
    let mut output = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        let parm = parms.get(i).copied().flatten();
        output = match *filter {
            "FlateDecode" | "Fl" => {
                let inflated = flate_decode(&output)?;
                match parm {
                    Some(parm) => apply_predictor(&inflated, parm)?,
                    None => inflated,
                }
            }
            "ASCIIHexDecode" | "AHx" => asciihex_decode(&output)?,
            "ASCII85Decode" | "A85" => ascii85_decode(&output)?,
            other => return Err(PdfError::Filter(format!("unsupported filter /{other}"))),
        };
    }
    Ok(output)
}

/// Inflate zlib data.
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| PdfError::Filter(format!("corrupt FlateDecode data: {e}")))?;
    Ok(decompressed)
}

/// Deflate with zlib framing.
pub fn flate_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn parm_int(parm: &Dict, key: &str, default: usize) -> usize {
    parm.get(key)
        .and_then(|v| v.as_int().ok())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

/// Undo a `/Predictor` from `DecodeParms`.
fn apply_predictor(data: &[u8], parm: &Dict) -> Result<Vec<u8>> {
    let predictor = parm_int(parm, "Predictor", 1);
    let columns = parm_int(parm, "Columns", 1);
    let colors = parm_int(parm, "Colors", 1);
    let bits = parm_int(parm, "BitsPerComponent", 8);
    match predictor {
        0 | 1 => Ok(data.to_vec()),
        2 if bits == 8 => Ok(tiff_predictor(data, columns, colors)),
        p if p >= 10 => Ok(png_predictor(data, columns, colors, bits)),
        p => Err(PdfError::Filter(format!("unsupported predictor {p}"))),
    }
}

fn tiff_predictor(data: &[u8], columns: usize, colors: usize) -> Vec<u8> {
    let row_bytes = (columns * colors).max(1);
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    out
}

/// Reverse PNG row filtering; each row starts with a filter-type byte.
fn png_predictor(data: &[u8], columns: usize, colors: usize, bits: usize) -> Vec<u8> {
    let row_bytes = (colors * columns * bits).div_ceil(8);
    let bpp = (colors * bits / 8).max(1);
    let row_size = row_bytes + 1;

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];

    for row in data.chunks(row_size) {
        let filter_type = row[0];
        let row_data = &row[1..];
        if row_data.len() < row_bytes {
            warn!(
                "predictor data ends in a partial row ({} of {row_bytes} bytes)",
                row_data.len()
            );
        }
        let mut current = vec![0u8; row_bytes];

        for i in 0..row_data.len() {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            current[i] = match filter_type {
                1 => row_data[i].wrapping_add(left),
                2 => row_data[i].wrapping_add(above),
                3 => row_data[i].wrapping_add(((left as u16 + above as u16) / 2) as u8),
                4 => row_data[i].wrapping_add(paeth_predictor(left, above, upper_left)),
                _ => row_data[i],
            };
        }

        result.extend_from_slice(&current[..row_data.len()]);
        prev_row = current;
    }

    result
}

const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode ASCIIHex data up to `>`; an odd final digit is padded with zero.
pub fn asciihex_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        if crate::parser::lexer::is_whitespace(byte) {
            continue;
        }
        let nibble = hex_nibble(byte)
            .ok_or_else(|| PdfError::Filter(format!("invalid ASCIIHex byte 0x{byte:02x}")))?;
        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }
    Ok(result)
}

/// Decode ASCII85 data (PDF variant): `z` shorthand, optional `<~`, `~>`
/// terminator, whitespace ignored, missing terminator tolerated.
pub fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut n = 0usize;

    for &byte in data {
        match byte {
            b'z' if n == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[n] = byte - b'!';
                n += 1;
                if n == 5 {
                    result.extend_from_slice(&group_value(&group)?.to_be_bytes());
                    n = 0;
                }
            }
            b if crate::parser::lexer::is_whitespace(b) => {}
            b => return Err(PdfError::Filter(format!("invalid ASCII85 byte 0x{b:02x}"))),
        }
    }

    if n == 1 {
        return Err(PdfError::Filter("truncated ASCII85 group".into()));
    }
    if n > 1 {
        for slot in group.iter_mut().skip(n) {
            *slot = b'u' - b'!';
        }
        let bytes = group_value(&group)?.to_be_bytes();
        result.extend_from_slice(&bytes[..n - 1]);
    }
    Ok(result)
}

fn group_value(group: &[u8; 5]) -> Result<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value).map_err(|_| PdfError::Filter("ASCII85 group overflow".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::{PDFObject, dict_from};

    #[test]
    fn asciihex_decode_expected() {
        assert_eq!(
            asciihex_decode(b"48656c6c6f 20776f726c64>").unwrap(),
            b"Hello world"
        );
        assert_eq!(asciihex_decode(b"4>").unwrap(), b"@");
        assert!(asciihex_decode(b"4G>").is_err());
    }

    #[test]
    fn ascii85_decode_expected() {
        assert_eq!(
            ascii85_decode(b"<~87cURD]i,\"Ebo80~>").unwrap(),
            b"Hello World!"
        );
        assert_eq!(ascii85_decode(b"z~>").unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn flate_chain_round_trip() {
        let payload = b"BT /F1 12 Tf (Hi) Tj ET".repeat(4);
        let encoded = flate_encode(&payload);
        let decoded = apply_filters(&encoded, &["FlateDecode"], &[]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn png_up_predictor() {
        let parm = dict_from([
            ("Predictor", PDFObject::Int(12)),
            ("Columns", PDFObject::Int(2)),
        ]);
        let raw = [2, 1, 2, 2, 1, 1];
        let decoded = apply_predictor(&raw, &parm).unwrap();
        assert_eq!(decoded, [1, 2, 2, 3]);
    }

    #[test]
    fn png_predictor_keeps_trailing_partial_row() {
        let parm = dict_from([
            ("Predictor", PDFObject::Int(12)),
            ("Columns", PDFObject::Int(3)),
        ]);
        let raw = [2, 1, 2, 3, 2, 1];
        let decoded = apply_predictor(&raw, &parm).unwrap();
        assert_eq!(decoded, [1, 2, 3, 2]);
    }

    #[test]
    fn corrupt_flate_is_a_filter_error() {
        assert!(matches!(
            flate_decode(b"this is not zlib data at all"),
            Err(PdfError::Filter(_))
        ));
        assert!(matches!(
            apply_filters(b"this is not zlib data at all", &["FlateDecode"], &[]),
            Err(PdfError::Filter(_))
        ));
    }

    #[test]
    fn unsupported_filter_is_reported() {
        assert!(matches!(
            apply_filters(b"", &["DCTDecode"], &[]),
            Err(PdfError::Filter(_))
        ));
    }
}
