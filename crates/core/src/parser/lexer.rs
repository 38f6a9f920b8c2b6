//! Byte-level tokenizer shared by the object parser and the content-stream
//! parser.

use crate::error::{PdfError, Result};

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum PSToken {
    /// Integer value
    Int(i64),
    /// Floating point value
    Real(f64),
    /// Boolean value
    Bool(bool),
    /// Literal name (e.g., /Name)
    Literal(String),
    /// Keyword/operator (e.g., obj, R, BT, `[`, `<<`)
    Keyword(Vec<u8>),
    /// Literal string `( ... )`
    String(Vec<u8>),
    /// Hex string `< ... >`
    HexString(Vec<u8>),
}

impl PSToken {
    /// True when this token is the keyword `kw`.
    pub fn is_keyword(&self, kw: &[u8]) -> bool {
        matches!(self, Self::Keyword(k) if k == kw)
    }
}

/// Check if byte is whitespace
pub(crate) const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

/// Check if byte is delimiter
pub(crate) const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Tokenizer over a borrowed byte slice.
///
/// The parser never reads past `end`, which lets the object store bound
/// each object's parse to the start of the next object in the file.
pub struct PSBaseParser<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    /// Current token position
    token_pos: usize,
}

impl<'a> PSBaseParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
            token_pos: 0,
        }
    }

    /// Tokenize `data[start..end]`, reporting absolute offsets.
    pub fn with_bounds(data: &'a [u8], start: usize, end: usize) -> Self {
        let end = end.min(data.len());
        Self {
            data,
            pos: start.min(end),
            end,
            token_pos: start.min(end),
        }
    }

    /// Current position in stream
    pub const fn tell(&self) -> usize {
        self.pos
    }

    /// Position of the most recently returned token.
    pub const fn token_pos(&self) -> usize {
        self.token_pos
    }

    /// Upper bound of the parse window.
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Set current position in stream.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.end);
        self.token_pos = self.pos;
    }

    /// The whole underlying buffer.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get remaining unparsed data
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..self.end]
    }

    /// Check if at end of data
    pub const fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Peek at current byte without advancing
    fn peek(&self) -> Option<u8> {
        if self.pos < self.end {
            Some(self.data[self.pos])
        } else {
            None
        }
    }

    /// Peek at byte at offset from current position
    fn peek_at(&self, offset: usize) -> Option<u8> {
        let at = self.pos + offset;
        if at < self.end { Some(self.data[at]) } else { None }
    }

    /// Advance position by one
    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn error(&self, pos: usize, msg: impl Into<String>) -> PdfError {
        PdfError::parse(self.data, pos, msg)
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.advance();
            } else if b == b'%' {
                while let Some(c) = self.advance() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Parse a literal name (/Name)
    fn parse_literal(&mut self) -> PSToken {
        self.advance(); // '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.advance();
            if b == b'#' {
                let hi = self.peek().and_then(|c| (c as char).to_digit(16));
                let lo = self.peek_at(1).and_then(|c| (c as char).to_digit(16));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    self.pos += 2;
                    name.push((hi * 16 + lo) as u8);
                    continue;
                }
                // '#' without two hex digits is dropped
                continue;
            }
            name.push(b);
        }

        let name_str = String::from_utf8(name)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned());
        PSToken::Literal(name_str)
    }

    /// Parse a number: optional sign, digits, optional decimal point.
    fn parse_number(&mut self) -> Result<PSToken> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }

        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| self.error(start, "invalid number"))?;

        if has_dot {
            // "5." and "-.5" are valid PDF reals
            let normalized = match text {
                "." | "+." | "-." => "0",
                t => t,
            };
            let val: f64 = normalized
                .trim_end_matches('.')
                .parse()
                .or_else(|_| normalized.parse())
                .map_err(|_| self.error(start, format!("invalid real: {text}")))?;
            Ok(PSToken::Real(val))
        } else {
            match text.parse::<i64>() {
                Ok(val) => Ok(PSToken::Int(val)),
                // Out-of-range integers degrade to reals
                Err(_) => text
                    .parse::<f64>()
                    .map(PSToken::Real)
                    .map_err(|_| self.error(start, format!("invalid int: {text}"))),
            }
        }
    }

    /// Parse a literal string (...)
    fn parse_string(&mut self) -> Result<PSToken> {
        let start = self.pos;
        self.advance(); // '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'(') => result.push(b'('),
                    Some(b')') => result.push(b')'),
                    Some(b'\\') => result.push(b'\\'),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c @ b'0'..=b'7') => {
                        let mut octal = u32::from(c - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    self.advance();
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    // Unrecognized escape: the backslash is dropped
                    Some(c) => result.push(c),
                    None => return Err(self.error(start, "unterminated string")),
                },
                Some(c) => result.push(c),
                None => return Err(self.error(start, "unterminated string")),
            }
        }

        Ok(PSToken::String(result))
    }

    /// Parse a hex string <...>; an odd digit count is padded with a zero nibble.
    fn parse_hex_string(&mut self) -> Result<PSToken> {
        let start = self.pos;
        self.advance(); // '<'
        let mut result = Vec::new();
        let mut high: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if is_whitespace(c) => {}
                Some(c) if c.is_ascii_hexdigit() => {
                    let nibble = (c as char).to_digit(16).unwrap_or(0) as u8;
                    match high.take() {
                        Some(h) => result.push((h << 4) | nibble),
                        None => high = Some(nibble),
                    }
                }
                Some(c) => {
                    return Err(self.error(
                        self.pos - 1,
                        format!("invalid character {:?} in hex string", c as char),
                    ));
                }
                None => return Err(self.error(start, "unterminated hex string")),
            }
        }
        if let Some(h) = high {
            result.push(h << 4);
        }

        Ok(PSToken::HexString(result))
    }

    /// Parse a keyword
    fn parse_keyword(&mut self) -> PSToken {
        let start = self.pos;

        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.advance();
        }

        let keyword = &self.data[start..self.pos];
        match keyword {
            b"true" => PSToken::Bool(true),
            b"false" => PSToken::Bool(false),
            _ => PSToken::Keyword(keyword.to_vec()),
        }
    }

    /// Get next token
    pub fn next_token(&mut self) -> Option<Result<(usize, PSToken)>> {
        self.skip_whitespace();

        if self.at_end() {
            return None;
        }

        self.token_pos = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => Ok(self.parse_literal()),
            b'(' => self.parse_string(),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(PSToken::Keyword(b"<<".to_vec()))
                } else {
                    self.parse_hex_string()
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(PSToken::Keyword(b">>".to_vec()))
                } else {
                    Err(self.error(self.pos, "unexpected '>'"))
                }
            }
            b'[' | b']' | b'{' | b'}' => {
                self.advance();
                Ok(PSToken::Keyword(vec![b]))
            }
            b')' => Err(self.error(self.pos, "unbalanced ')'")),
            b'+' | b'-' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    self.parse_number()
                } else {
                    Ok(self.parse_keyword())
                }
            }
            b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                    self.parse_number()
                } else {
                    Ok(self.parse_keyword())
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => Ok(self.parse_keyword()),
        };

        if result.is_err() {
            // Make the error sticky: a failed token ends the stream.
            self.pos = self.end;
        }
        Some(result.map(|token| (self.token_pos, token)))
    }

    /// Consume a single end-of-line marker (CRLF, LF or CR) if present.
    pub fn skip_eol(&mut self) {
        match self.peek() {
            Some(b'\r') => {
                self.advance();
                if self.peek() == Some(b'\n') {
                    self.advance();
                }
            }
            Some(b'\n') => {
                self.advance();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> Vec<PSToken> {
        let mut parser = PSBaseParser::new(data);
        let mut out = Vec::new();
        while let Some(tok) = parser.next_token() {
            out.push(tok.unwrap().1);
        }
        out
    }

    #[test]
    fn numbers_names_and_keywords() {
        use PSToken::*;
        assert_eq!(
            tokens(b"0 +1 -2 .5 1.234 5. /a/B#43 obj true"),
            vec![
                Int(0),
                Int(1),
                Int(-2),
                Real(0.5),
                Real(1.234),
                Real(5.0),
                Literal("a".into()),
                Literal("BC".into()),
                Keyword(b"obj".to_vec()),
                Bool(true),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(br"(a\(b\)c) (x\ny) (\101\0) (foo\
bar) (n(es)t) (\q)"),
            vec![
                PSToken::String(b"a(b)c".to_vec()),
                PSToken::String(b"x\ny".to_vec()),
                PSToken::String(b"A\x00".to_vec()),
                PSToken::String(b"foobar".to_vec()),
                PSToken::String(b"n(es)t".to_vec()),
                PSToken::String(b"q".to_vec()),
            ]
        );
    }

    #[test]
    fn escaped_backslash_before_paren_closes_string() {
        // "\\" is an escaped backslash, so the following ')' closes the string
        assert_eq!(
            tokens(br"(a\\) (b)"),
            vec![
                PSToken::String(b"a\\".to_vec()),
                PSToken::String(b"b".to_vec())
            ]
        );
    }

    #[test]
    fn odd_hex_string_is_right_padded() {
        assert_eq!(
            tokens(b"<abc> < 20 4 >"),
            vec![
                PSToken::HexString(vec![0xab, 0xc0]),
                PSToken::HexString(vec![0x20, 0x40])
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_offset() {
        let mut parser = PSBaseParser::new(b"1 (abc");
        assert!(parser.next_token().unwrap().is_ok());
        match parser.next_token().unwrap() {
            Err(PdfError::Parse { pos, .. }) => assert_eq!(pos, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn bounds_are_respected() {
        let data = b"1 2 3 4";
        let mut parser = PSBaseParser::with_bounds(data, 2, 5);
        assert_eq!(parser.next_token().unwrap().unwrap(), (2, PSToken::Int(2)));
        assert_eq!(parser.next_token().unwrap().unwrap(), (4, PSToken::Int(3)));
        assert!(parser.next_token().is_none());
    }
}
