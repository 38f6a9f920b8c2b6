//! PDF object types.
//!
//! `PDFObject` is the node type of the document graph. Edges between
//! indirect objects are `PDFObjRef`s (plain object numbers), never owning
//! pointers, so the back-references the format is full of (`/Parent`,
//! `/P`, ...) need no special handling.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;

/// Insertion-ordered dictionary of name → object.
pub type Dict = IndexMap<String, PDFObject>;

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font)
    Name(String),
    /// Literal string `( ... )`
    String(Vec<u8>),
    /// Hex string `< ... >`
    HexString(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dict),
    /// Stream (dictionary + binary data)
    Stream(Box<PDFStream>),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    /// Shorthand for a name object.
    pub fn name(name: &str) -> Self {
        Self::Name(name.to_string())
    }

    /// Shorthand for a reference to generation 0 of `objid`.
    pub const fn reference(objid: u32) -> Self {
        Self::Ref(PDFObjRef::new(objid, 0))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as byte string (literal or hex).
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) | Self::HexString(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as mutable array
    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            other => Err(PdfError::TypeError {
                expected: "array",
                got: other.type_name(),
            }),
        }
    }

    /// Get as dictionary. Streams expose their attribute dictionary.
    pub fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.attrs),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as mutable dictionary. Streams expose their attribute dictionary.
    pub fn as_dict_mut(&mut self) -> Result<&mut Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&mut s.attrs),
            other => Err(PdfError::TypeError {
                expected: "dict",
                got: other.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_ref(&self) -> Result<&PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Look up `key` when this object is a dictionary or stream.
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_dict().ok().and_then(|d| d.get(key))
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::HexString(_) => "hexstring",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }

    /// Visit every reference reachable inside this value (not following them).
    pub fn for_each_ref(&self, f: &mut impl FnMut(&PDFObjRef)) {
        match self {
            Self::Ref(r) => f(r),
            Self::Array(arr) => arr.iter().for_each(|item| item.for_each_ref(f)),
            Self::Dict(dict) => dict.values().for_each(|item| item.for_each_ref(f)),
            Self::Stream(stream) => stream.attrs.values().for_each(|item| item.for_each_ref(f)),
            _ => {}
        }
    }

    /// Rewrite every reference inside this value in place.
    pub fn map_refs(&mut self, f: &mut impl FnMut(&mut PDFObjRef)) {
        match self {
            Self::Ref(r) => f(r),
            Self::Array(arr) => arr.iter_mut().for_each(|item| item.map_refs(f)),
            Self::Dict(dict) => dict.values_mut().for_each(|item| item.map_refs(f)),
            Self::Stream(stream) => stream
                .attrs
                .values_mut()
                .for_each(|item| item.map_refs(f)),
            _ => {}
        }
    }

    /// Apply `f` to every string payload (literal and hex) in this value,
    /// including those in stream dictionaries but not stream data.
    pub fn map_strings(&mut self, f: &mut impl FnMut(&mut Vec<u8>)) {
        match self {
            Self::String(s) | Self::HexString(s) => f(s),
            Self::Array(arr) => arr.iter_mut().for_each(|item| item.map_strings(f)),
            Self::Dict(dict) => dict.values_mut().for_each(|item| item.map_strings(f)),
            Self::Stream(stream) => stream
                .attrs
                .values_mut()
                .for_each(|item| item.map_strings(f)),
            _ => {}
        }
    }
}

impl From<Dict> for PDFObject {
    fn from(dict: Dict) -> Self {
        Self::Dict(dict)
    }
}

impl From<PDFStream> for PDFObject {
    fn from(stream: PDFStream) -> Self {
        Self::Stream(Box::new(stream))
    }
}

impl From<i64> for PDFObject {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for PDFObject {
    fn from(n: f64) -> Self {
        Self::Real(n)
    }
}

impl From<bool> for PDFObject {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PDFObjRef {
    /// Object ID
    pub objid: u32,
    /// Generation number as written in the reference
    pub genno: u16,
}

impl PDFObjRef {
    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u16) -> Self {
        Self { objid, genno }
    }
}

/// A top-level `N G obj ... endobj` value.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub objid: u32,
    pub genno: u16,
    pub value: PDFObject,
}

impl IndirectObject {
    pub const fn new(objid: u32, genno: u16, value: PDFObject) -> Self {
        Self {
            objid,
            genno,
            value,
        }
    }
}

/// PDF Stream - dictionary attributes + binary data.
///
/// `rawdata` is the filter-encoded payload in plaintext: decryption happens
/// when the owning object is loaded, encryption when it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    /// Stream dictionary attributes
    pub attrs: Dict,
    /// Raw (possibly filter-encoded) data
    rawdata: Bytes,
    /// Object ID (set when stream is part of document)
    pub objid: Option<u32>,
    /// Generation number
    pub genno: Option<u16>,
}

impl PDFStream {
    /// Create a new stream. `Length` is kept in sync with the payload.
    pub fn new(mut attrs: Dict, rawdata: impl Into<Bytes>) -> Self {
        let rawdata = rawdata.into();
        attrs.insert("Length".into(), PDFObject::Int(rawdata.len() as i64));
        Self {
            attrs,
            rawdata,
            objid: None,
            genno: None,
        }
    }

    /// Create a stream from attributes exactly as parsed (Length untouched).
    pub(crate) fn from_parts(attrs: Dict, rawdata: Bytes) -> Self {
        Self {
            attrs,
            rawdata,
            objid: None,
            genno: None,
        }
    }

    /// Set object ID and generation number.
    pub const fn set_objid(&mut self, objid: u32, genno: u16) {
        self.objid = Some(objid);
        self.genno = Some(genno);
    }

    /// Get raw (undecoded) data.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Get raw data as shared bytes.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    /// Replace the payload; `Length` follows.
    pub fn set_rawdata(&mut self, data: impl Into<Bytes>) {
        self.rawdata = data.into();
        self.attrs
            .insert("Length".into(), PDFObject::Int(self.rawdata.len() as i64));
    }

    /// Swap the payload bytes without touching `Length` (ciphering).
    pub(crate) fn replace_payload(&mut self, data: Bytes) {
        self.rawdata = data;
    }

    /// Check if stream contains a key.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// Names of the filters applied to the payload, outermost first.
    pub fn filters(&self) -> Vec<&str> {
        match self.attrs.get("Filter") {
            Some(PDFObject::Name(name)) => vec![name.as_str()],
            Some(PDFObject::Array(arr)) => arr.iter().filter_map(|o| o.as_name().ok()).collect(),
            _ => Vec::new(),
        }
    }
}

// === Type conversion helper functions ===

/// Get integer value from object.
pub fn int_value(obj: &PDFObject) -> Result<i64> {
    obj.as_int()
}

/// Get numeric value (int or float) from object.
pub fn num_value(obj: &PDFObject) -> Result<f64> {
    obj.as_num()
}

/// Get dictionary value from object.
pub fn dict_value(obj: &PDFObject) -> Result<&Dict> {
    obj.as_dict()
}

/// Build a dictionary from `(key, value)` pairs.
pub fn dict_from<I, K>(pairs: I) -> Dict
where
    I: IntoIterator<Item = (K, PDFObject)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
