//! Content-stream parser producing a block tree.
//!
//! Operands accumulate on a stack until an operator consumes them. A
//! block-opening operator (`q`, `BT`, `BMC`, `BDC`, `BX`) takes the pending
//! operands as its arguments and owns every node up to its paired closer.
//! Inline images (`BI ... ID <bytes> EI`) are the one place raw bytes appear.

use super::ops::{ArgKind, Op, Signature};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};
use crate::parser::lexer::{PSBaseParser, PSToken, is_whitespace};
use crate::parser::writer::{WriterOptions, write_name, write_object};
use log::warn;
use std::fmt;

/// Nesting limit for blocks, arrays and dictionaries.
const MAX_DEPTH: usize = 256;

/// One operator with its operands, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub op: Op,
    pub args: Vec<PDFObject>,
}

impl Operation {
    pub const fn new(op: Op, args: Vec<PDFObject>) -> Self {
        Self { op, args }
    }

    /// Numeric operand `i`, if present and numeric.
    pub fn num(&self, i: usize) -> Option<f64> {
        self.args.get(i).and_then(|a| a.as_num().ok())
    }

    /// The last `n` operands as numbers; `None` if any is missing or not numeric.
    pub fn nums<const N: usize>(&self) -> Option<[f64; N]> {
        let start = self.args.len().checked_sub(N)?;
        let mut out = [0.0; N];
        for (slot, arg) in out.iter_mut().zip(&self.args[start..]) {
            *slot = arg.as_num().ok()?;
        }
        Some(out)
    }

    pub fn name_arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).and_then(|a| a.as_name().ok())
    }

    pub fn string_arg(&self, i: usize) -> Option<&[u8]> {
        self.args.get(i).and_then(|a| a.as_string().ok())
    }
}

/// A block: opening operator, children, and the paired closing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub open: Operation,
    pub children: Vec<ContentNode>,
    pub close: Operation,
}

/// An inline image with its abbreviated dictionary and verbatim data.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub dict: Dict,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Look up an entry by full or abbreviated key (`Width` or `W`).
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        let short = match key {
            "BitsPerComponent" => "BPC",
            "ColorSpace" => "CS",
            "Decode" => "D",
            "DecodeParms" => "DP",
            "Filter" => "F",
            "Height" => "H",
            "ImageMask" => "IM",
            "Interpolate" => "I",
            "Width" => "W",
            other => other,
        };
        self.dict.get(key).or_else(|| self.dict.get(short))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    Operator(Operation),
    Block(Block),
    InlineImage(InlineImage),
}

/// Parsed content stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentTree {
    pub nodes: Vec<ContentNode>,
}

/// Non-fatal problem found by [`ContentTree::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub op: Op,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.message)
    }
}

impl ContentTree {
    /// Parse a decoded content stream.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = ContentParser {
            lexer: PSBaseParser::new(data),
            data,
        };
        let (nodes, _) = parser.parse_scope(None, 0)?;
        Ok(Self { nodes })
    }

    /// Nesting depth of blocks (0 for a flat stream).
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[ContentNode]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    ContentNode::Block(block) => 1 + depth_of(&block.children),
                    _ => 0,
                })
                .max()
                .unwrap_or(0)
        }
        depth_of(&self.nodes)
    }

    /// Every operation in stream order, block openers and closers included.
    pub fn operations(&self) -> Vec<&Operation> {
        fn collect<'t>(nodes: &'t [ContentNode], out: &mut Vec<&'t Operation>) {
            for node in nodes {
                match node {
                    ContentNode::Operator(op) => out.push(op),
                    ContentNode::Block(block) => {
                        out.push(&block.open);
                        collect(&block.children, out);
                        out.push(&block.close);
                    }
                    ContentNode::InlineImage(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }

    /// Check operand counts and kinds against each operator's signature.
    /// Unknown operators are reported unless inside a `BX`/`EX` section.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        validate_nodes(&self.nodes, false, &mut warnings);
        warnings
    }

    /// Serialize back to content-stream syntax, one operator per line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_nodes(&mut out, &self.nodes, &WriterOptions::default());
        out
    }
}

fn check_operation(operation: &Operation, in_compat: bool, out: &mut Vec<ValidationWarning>) {
    let warn = |message: String| ValidationWarning {
        op: operation.op.clone(),
        message,
    };
    match operation.op.signature() {
        None => {
            if !in_compat {
                out.push(warn("unknown operator".into()));
            }
        }
        Some(Signature::Variable) => {
            // Colour components, optionally followed by a pattern name.
            let components = match operation.args.split_last() {
                Some((last, rest)) if ArgKind::Name.matches(last) => rest,
                _ => operation.args.as_slice(),
            };
            if let Some(i) = components.iter().position(|a| !ArgKind::Number.matches(a)) {
                out.push(warn(format!("operand {i} should be a number")));
            }
        }
        Some(Signature::Fixed(kinds)) => {
            if operation.args.len() != kinds.len() {
                out.push(warn(format!(
                    "expects {} operand(s), got {}",
                    kinds.len(),
                    operation.args.len()
                )));
                return;
            }
            for (i, (kind, arg)) in kinds.iter().zip(&operation.args).enumerate() {
                if !kind.matches(arg) {
                    out.push(warn(format!(
                        "operand {i} should be {kind:?}, got {}",
                        arg.type_name()
                    )));
                }
            }
        }
    }
}

fn validate_nodes(nodes: &[ContentNode], in_compat: bool, out: &mut Vec<ValidationWarning>) {
    for node in nodes {
        match node {
            ContentNode::Operator(operation) => check_operation(operation, in_compat, out),
            ContentNode::Block(block) => {
                check_operation(&block.open, in_compat, out);
                let inner_compat = in_compat || block.open.op == Op::BX;
                validate_nodes(&block.children, inner_compat, out);
                check_operation(&block.close, in_compat, out);
            }
            ContentNode::InlineImage(_) => {}
        }
    }
}

fn write_operation(out: &mut Vec<u8>, operation: &Operation, opts: &WriterOptions) {
    for arg in &operation.args {
        write_object(out, arg, opts);
        out.push(b' ');
    }
    out.extend_from_slice(operation.op.as_bytes());
    out.push(b'\n');
}

fn write_nodes(out: &mut Vec<u8>, nodes: &[ContentNode], opts: &WriterOptions) {
    for node in nodes {
        match node {
            ContentNode::Operator(operation) => write_operation(out, operation, opts),
            ContentNode::Block(block) => {
                write_operation(out, &block.open, opts);
                write_nodes(out, &block.children, opts);
                write_operation(out, &block.close, opts);
            }
            ContentNode::InlineImage(image) => {
                out.extend_from_slice(b"BI");
                for (key, value) in &image.dict {
                    out.push(b' ');
                    write_name(out, key);
                    out.push(b' ');
                    write_object(out, value, opts);
                }
                out.extend_from_slice(b" ID ");
                out.extend_from_slice(&image.data);
                out.extend_from_slice(b"\nEI\n");
            }
        }
    }
}

/// The block a scope is nested in.
struct OpenBlock {
    open: Op,
    close: Op,
    pos: usize,
}

struct ContentParser<'a> {
    lexer: PSBaseParser<'a>,
    data: &'a [u8],
}

impl ContentParser<'_> {
    fn error(&self, pos: usize, msg: impl Into<String>) -> PdfError {
        PdfError::parse(self.data, pos, msg)
    }

    /// Parse nodes until the closer of `block` (or end of input at top level).
    fn parse_scope(
        &mut self,
        block: Option<&OpenBlock>,
        depth: usize,
    ) -> Result<(Vec<ContentNode>, Option<Operation>)> {
        if depth > MAX_DEPTH {
            let pos = block.map_or(0, |b| b.pos);
            return Err(self.error(pos, "content blocks nested too deeply"));
        }
        let mut nodes = Vec::new();
        let mut operands: Vec<PDFObject> = Vec::new();

        loop {
            let Some(token) = self.lexer.next_token() else {
                if let Some(block) = block {
                    return Err(self.error(block.pos, format!("unterminated {} block", block.open)));
                }
                if !operands.is_empty() {
                    warn!("{} trailing operand(s) without an operator", operands.len());
                }
                return Ok((nodes, None));
            };
            let (pos, token) = token?;
            let PSToken::Keyword(keyword) = token else {
                operands.push(token_to_object(token));
                continue;
            };
            match keyword.as_slice() {
                b"[" => operands.push(self.parse_array(depth + 1)?),
                b"<<" => operands.push(PDFObject::Dict(self.parse_dict(depth + 1)?)),
                b"null" => operands.push(PDFObject::Null),
                b"]" | b">>" | b"{" | b"}" => {
                    return Err(self.error(pos, "unbalanced delimiter in content stream"));
                }
                name => {
                    let op = Op::from_bytes(name);
                    if op == Op::BI {
                        if !operands.is_empty() {
                            warn!("BI preceded by {} operand(s), dropped", operands.len());
                            operands.clear();
                        }
                        nodes.push(ContentNode::InlineImage(self.parse_inline_image(pos)?));
                    } else if let Some(close) = op.block_close() {
                        let open = Operation::new(op, std::mem::take(&mut operands));
                        let inner = OpenBlock {
                            open: open.op.clone(),
                            close,
                            pos,
                        };
                        let (children, close) = self.parse_scope(Some(&inner), depth + 1)?;
                        let close = close.ok_or_else(|| {
                            self.error(pos, format!("unterminated {} block", inner.open))
                        })?;
                        nodes.push(ContentNode::Block(Block {
                            open,
                            children,
                            close,
                        }));
                    } else if op.is_block_close() {
                        return match block {
                            Some(block) if block.close == op => {
                                Ok((nodes, Some(Operation::new(op, operands))))
                            }
                            Some(block) => Err(self.error(
                                pos,
                                format!("{op} cannot close {} block", block.open),
                            )),
                            None => Err(self.error(pos, format!("unmatched {op}"))),
                        };
                    } else {
                        nodes.push(ContentNode::Operator(Operation::new(
                            op,
                            std::mem::take(&mut operands),
                        )));
                    }
                }
            }
        }
    }

    fn next_value(&mut self, depth: usize) -> Result<Option<(usize, PSToken)>> {
        if depth > MAX_DEPTH {
            return Err(self.error(self.lexer.tell(), "operand nested too deeply"));
        }
        self.lexer.next_token().transpose()
    }

    /// Turn a token into an operand, descending into arrays and dictionaries.
    fn value_from(&mut self, pos: usize, token: PSToken, depth: usize) -> Result<PDFObject> {
        match token {
            PSToken::Keyword(kw) => match kw.as_slice() {
                b"[" => self.parse_array(depth + 1),
                b"<<" => Ok(PDFObject::Dict(self.parse_dict(depth + 1)?)),
                b"null" => Ok(PDFObject::Null),
                other => Err(self.error(
                    pos,
                    format!("unexpected keyword {} in operand", String::from_utf8_lossy(other)),
                )),
            },
            other => Ok(token_to_object(other)),
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<PDFObject> {
        let mut items = Vec::new();
        loop {
            let (pos, token) = self.next_value(depth)?.ok_or(PdfError::UnexpectedEof)?;
            if token.is_keyword(b"]") {
                return Ok(PDFObject::Array(items));
            }
            items.push(self.value_from(pos, token, depth)?);
        }
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Dict> {
        let mut dict = Dict::new();
        loop {
            let (pos, token) = self.next_value(depth)?.ok_or(PdfError::UnexpectedEof)?;
            let key = match token {
                PSToken::Keyword(kw) if kw == b">>" => return Ok(dict),
                PSToken::Literal(key) => key,
                _ => return Err(self.error(pos, "dictionary key must be a name")),
            };
            let (pos, token) = self.next_value(depth)?.ok_or(PdfError::UnexpectedEof)?;
            let value = self.value_from(pos, token, depth)?;
            dict.insert(key, value);
        }
    }

    /// Parse `<dict> ID <bytes> EI` after a `BI` at `start`.
    fn parse_inline_image(&mut self, start: usize) -> Result<InlineImage> {
        let mut dict = Dict::new();
        loop {
            let (pos, token) = self
                .next_value(0)?
                .ok_or_else(|| self.error(start, "inline image without ID"))?;
            let key = match token {
                PSToken::Keyword(kw) if kw == b"ID" => break,
                PSToken::Literal(key) => key,
                _ => return Err(self.error(pos, "inline image key must be a name")),
            };
            let (pos, token) = self
                .next_value(0)?
                .ok_or_else(|| self.error(start, "inline image without ID"))?;
            let value = self.value_from(pos, token, 0)?;
            dict.insert(key, value);
        }

        // A single whitespace byte separates ID from the data.
        let mut data_start = self.lexer.tell();
        if data_start < self.data.len() && is_whitespace(self.data[data_start]) {
            data_start += 1;
        }
        let (data_end, resume) = find_inline_end(self.data, data_start)
            .ok_or_else(|| self.error(start, "inline image without EI"))?;
        self.lexer.set_pos(resume);
        Ok(InlineImage {
            dict,
            data: self.data[data_start..data_end].to_vec(),
        })
    }
}

/// Locate the `EI` ending inline image data that starts at `from`.
///
/// `EI` counts only when preceded by whitespace and followed by whitespace
/// or the end of data; a binary payload containing such a sequence is
/// misread. Returns the data end (before the preceding whitespace) and the
/// offset just past `EI`.
fn find_inline_end(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 2 <= data.len() {
        if &data[i..i + 2] == b"EI"
            && i > from
            && is_whitespace(data[i - 1])
            && data.get(i + 2).is_none_or(|b| is_whitespace(*b))
        {
            return Some((i - 1, i + 2));
        }
        i += 1;
    }
    None
}

fn token_to_object(token: PSToken) -> PDFObject {
    match token {
        PSToken::Int(n) => PDFObject::Int(n),
        PSToken::Real(n) => PDFObject::Real(n),
        PSToken::Bool(b) => PDFObject::Bool(b),
        PSToken::Literal(name) => PDFObject::Name(name),
        PSToken::String(s) => PDFObject::String(s),
        PSToken::HexString(s) => PDFObject::HexString(s),
        PSToken::Keyword(kw) => PDFObject::Name(String::from_utf8_lossy(&kw).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(tree: &ContentTree) -> Vec<String> {
        tree.operations().iter().map(|o| o.op.name()).collect()
    }

    #[test]
    fn nests_blocks() {
        let tree = ContentTree::parse(b"q 1 0 0 1 5 5 cm BT /F1 12 Tf (Hi) Tj ET Q 0 g").unwrap();
        assert_eq!(tree.nodes.len(), 2);
        let ContentNode::Block(q) = &tree.nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(q.open.op, Op::Qq);
        assert_eq!(q.close.op, Op::Q);
        assert_eq!(q.children.len(), 2);
        assert_eq!(tree.depth(), 2);
        assert_eq!(
            ops(&tree),
            ["q", "cm", "BT", "Tf", "Tj", "ET", "Q", "g"]
        );
    }

    #[test]
    fn block_opener_takes_pending_operands() {
        let tree = ContentTree::parse(b"/Span << /MCID 3 >> BDC (x) Tj EMC").unwrap();
        let ContentNode::Block(block) = &tree.nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(block.open.args.len(), 2);
        assert_eq!(block.open.name_arg(0), Some("Span"));
        assert!(tree.validate().is_empty());
    }

    #[test]
    fn structural_errors() {
        for bad in [&b"q BT Q ET"[..], b"Q", b"BT (a) Tj", b"q q Q", b"EMC"] {
            assert!(
                matches!(ContentTree::parse(bad), Err(PdfError::Parse { .. })),
                "{}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn inline_image_data_is_verbatim() {
        let data = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \x00EI\xff\nEI Q";
        let tree = ContentTree::parse(data).unwrap();
        let ContentNode::Block(q) = &tree.nodes[0] else {
            panic!("expected block");
        };
        let ContentNode::InlineImage(image) = &q.children[0] else {
            panic!("expected inline image");
        };
        assert_eq!(image.data, b"\x00EI\xff");
        assert_eq!(image.get("Width"), Some(&PDFObject::Int(2)));
    }

    #[test]
    fn validation_is_separate_from_parsing() {
        let tree = ContentTree::parse(b"1 Td /F1 Tf zz BX yy EX").unwrap();
        let warnings = tree.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].op, Op::Td);
        assert_eq!(warnings[1].op, Op::Tf);
        assert_eq!(warnings[2].op, Op::Other(b"zz".to_vec()));
    }

    #[test]
    fn serialized_tree_reparses_equal() {
        let source: &[u8] =
            b"q 0.5 0 0 0.5 10 20 cm BT /F1 9 Tf [(A) -120 (B)] TJ ET /OC /P0 BDC 1 0 0 rg EMC Q";
        let tree = ContentTree::parse(source).unwrap();
        let again = ContentTree::parse(&tree.to_bytes()).unwrap();
        assert_eq!(tree, again);
    }
}
