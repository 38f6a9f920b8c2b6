//! Content-stream operator vocabulary.
//!
//! Operator names are resolved once, at parse time, into [`Op`]. Each
//! operator has a static argument signature used by validation, and the
//! block-opening operators know their paired closer.

use crate::model::objects::PDFObject;

/// A content-stream operator.
///
/// Names follow the operator spelling; lowercase operators that collide
/// with an uppercase one double their letter (`q` is `Qq`, `Q` is `Q`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    // Graphics state
    Qq, // save (lowercase q)
    Q,  // restore (uppercase Q)
    Cm,
    Ww, // line width (lowercase w)
    J,  // line cap (uppercase J)
    Jj, // line join (lowercase j)
    M,
    D, // dash pattern (lowercase d)
    Ri,
    I, // flatness (lowercase i)
    Gs,

    // Path construction
    Mm, // moveto (lowercase m)
    L,  // lineto (lowercase l)
    C,  // curveto (lowercase c)
    V,
    Y,
    H, // closepath (lowercase h)
    Re,

    // Path painting
    S,
    Ss, // close+stroke (lowercase s)
    F,
    Ff,    // fill (lowercase f)
    FStar, // f*
    B,
    BStar,  // B*
    Bb,     // close+fill+stroke (lowercase b)
    BbStar, // b*
    N,      // end path (lowercase n)

    // Clipping
    WClip, // W
    WStar, // W*

    // Text object
    BT,
    ET,

    // Text state
    Tc,
    Tw,
    Tz,
    TL,
    Tf,
    Tr,
    Ts,

    // Text positioning
    Td,
    TD,
    Tm,
    TStar, // T*

    // Text showing
    Tj,
    TJ,
    Quote,       // '
    DoubleQuote, // "

    // Type 3 glyphs
    D0,
    D1,

    // Colour
    CS,
    Cs,
    SC,
    SCN,
    Sc,
    Scn,
    G,
    Gg, // lowercase g
    RG,
    Rg,
    K,
    Kk, // lowercase k

    // Shading and XObjects
    Sh,
    Do,

    // Inline image
    BI,
    ID,
    EI,

    // Marked content
    MP,
    DP,
    BMC,
    BDC,
    EMC,

    // Compatibility
    BX,
    EX,

    /// Operator outside the standard vocabulary (original bytes kept).
    Other(Vec<u8>),
}

/// Kind of a single operator argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Number,
    Name,
    String,
    Array,
    Dict,
    Any,
}

impl ArgKind {
    pub const fn matches(self, obj: &PDFObject) -> bool {
        match self {
            Self::Number => matches!(obj, PDFObject::Int(_) | PDFObject::Real(_)),
            Self::Name => matches!(obj, PDFObject::Name(_)),
            Self::String => matches!(obj, PDFObject::String(_) | PDFObject::HexString(_)),
            Self::Array => matches!(obj, PDFObject::Array(_)),
            Self::Dict => matches!(obj, PDFObject::Dict(_)),
            Self::Any => true,
        }
    }
}

/// Argument signature of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Fixed(&'static [ArgKind]),
    /// Any number of operands (`SC`, `SCN`, `sc`, `scn`).
    Variable,
}

use ArgKind::{Any, Array as Arr, Name as Nm, Number as Num, String as Str};

const NONE: &[ArgKind] = &[];
const ONE_NUM: &[ArgKind] = &[Num];
const TWO_NUM: &[ArgKind] = &[Num, Num];
const THREE_NUM: &[ArgKind] = &[Num, Num, Num];
const FOUR_NUM: &[ArgKind] = &[Num, Num, Num, Num];
const SIX_NUM: &[ArgKind] = &[Num, Num, Num, Num, Num, Num];
const ONE_NAME: &[ArgKind] = &[Nm];
const ONE_STR: &[ArgKind] = &[Str];

impl Op {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"q" => Self::Qq,
            b"Q" => Self::Q,
            b"cm" => Self::Cm,
            b"w" => Self::Ww,
            b"J" => Self::J,
            b"j" => Self::Jj,
            b"M" => Self::M,
            b"d" => Self::D,
            b"ri" => Self::Ri,
            b"i" => Self::I,
            b"gs" => Self::Gs,

            b"m" => Self::Mm,
            b"l" => Self::L,
            b"c" => Self::C,
            b"v" => Self::V,
            b"y" => Self::Y,
            b"h" => Self::H,
            b"re" => Self::Re,

            b"S" => Self::S,
            b"s" => Self::Ss,
            b"F" => Self::F,
            b"f" => Self::Ff,
            b"f*" => Self::FStar,
            b"B" => Self::B,
            b"B*" => Self::BStar,
            b"b" => Self::Bb,
            b"b*" => Self::BbStar,
            b"n" => Self::N,

            b"W" => Self::WClip,
            b"W*" => Self::WStar,

            b"BT" => Self::BT,
            b"ET" => Self::ET,

            b"Tc" => Self::Tc,
            b"Tw" => Self::Tw,
            b"Tz" => Self::Tz,
            b"TL" => Self::TL,
            b"Tf" => Self::Tf,
            b"Tr" => Self::Tr,
            b"Ts" => Self::Ts,

            b"Td" => Self::Td,
            b"TD" => Self::TD,
            b"Tm" => Self::Tm,
            b"T*" => Self::TStar,

            b"Tj" => Self::Tj,
            b"TJ" => Self::TJ,
            b"'" => Self::Quote,
            b"\"" => Self::DoubleQuote,

            b"d0" => Self::D0,
            b"d1" => Self::D1,

            b"CS" => Self::CS,
            b"cs" => Self::Cs,
            b"SC" => Self::SC,
            b"SCN" => Self::SCN,
            b"sc" => Self::Sc,
            b"scn" => Self::Scn,
            b"G" => Self::G,
            b"g" => Self::Gg,
            b"RG" => Self::RG,
            b"rg" => Self::Rg,
            b"K" => Self::K,
            b"k" => Self::Kk,

            b"sh" => Self::Sh,
            b"Do" => Self::Do,

            b"BI" => Self::BI,
            b"ID" => Self::ID,
            b"EI" => Self::EI,

            b"MP" => Self::MP,
            b"DP" => Self::DP,
            b"BMC" => Self::BMC,
            b"BDC" => Self::BDC,
            b"EMC" => Self::EMC,

            b"BX" => Self::BX,
            b"EX" => Self::EX,

            other => Self::Other(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Qq => b"q",
            Self::Q => b"Q",
            Self::Cm => b"cm",
            Self::Ww => b"w",
            Self::J => b"J",
            Self::Jj => b"j",
            Self::M => b"M",
            Self::D => b"d",
            Self::Ri => b"ri",
            Self::I => b"i",
            Self::Gs => b"gs",
            Self::Mm => b"m",
            Self::L => b"l",
            Self::C => b"c",
            Self::V => b"v",
            Self::Y => b"y",
            Self::H => b"h",
            Self::Re => b"re",
            Self::S => b"S",
            Self::Ss => b"s",
            Self::F => b"F",
            Self::Ff => b"f",
            Self::FStar => b"f*",
            Self::B => b"B",
            Self::BStar => b"B*",
            Self::Bb => b"b",
            Self::BbStar => b"b*",
            Self::N => b"n",
            Self::WClip => b"W",
            Self::WStar => b"W*",
            Self::BT => b"BT",
            Self::ET => b"ET",
            Self::Tc => b"Tc",
            Self::Tw => b"Tw",
            Self::Tz => b"Tz",
            Self::TL => b"TL",
            Self::Tf => b"Tf",
            Self::Tr => b"Tr",
            Self::Ts => b"Ts",
            Self::Td => b"Td",
            Self::TD => b"TD",
            Self::Tm => b"Tm",
            Self::TStar => b"T*",
            Self::Tj => b"Tj",
            Self::TJ => b"TJ",
            Self::Quote => b"'",
            Self::DoubleQuote => b"\"",
            Self::D0 => b"d0",
            Self::D1 => b"d1",
            Self::CS => b"CS",
            Self::Cs => b"cs",
            Self::SC => b"SC",
            Self::SCN => b"SCN",
            Self::Sc => b"sc",
            Self::Scn => b"scn",
            Self::G => b"G",
            Self::Gg => b"g",
            Self::RG => b"RG",
            Self::Rg => b"rg",
            Self::K => b"K",
            Self::Kk => b"k",
            Self::Sh => b"sh",
            Self::Do => b"Do",
            Self::BI => b"BI",
            Self::ID => b"ID",
            Self::EI => b"EI",
            Self::MP => b"MP",
            Self::DP => b"DP",
            Self::BMC => b"BMC",
            Self::BDC => b"BDC",
            Self::EMC => b"EMC",
            Self::BX => b"BX",
            Self::EX => b"EX",
            Self::Other(name) => name,
        }
    }

    /// Operator name for messages.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// The closer paired with a block-opening operator.
    pub const fn block_close(&self) -> Option<Self> {
        match self {
            Self::Qq => Some(Self::Q),
            Self::BT => Some(Self::ET),
            Self::BMC | Self::BDC => Some(Self::EMC),
            Self::BX => Some(Self::EX),
            _ => None,
        }
    }

    pub const fn is_block_close(&self) -> bool {
        matches!(self, Self::Q | Self::ET | Self::EMC | Self::EX)
    }

    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Static argument signature; `None` for unknown operators.
    pub const fn signature(&self) -> Option<Signature> {
        use Signature::{Fixed, Variable};
        let sig = match self {
            Self::Qq | Self::Q => Fixed(NONE),
            Self::Cm | Self::Tm | Self::C | Self::D1 => Fixed(SIX_NUM),
            Self::Ww | Self::J | Self::Jj | Self::M | Self::I => Fixed(ONE_NUM),
            Self::D => Fixed(&[Arr, Num]),
            Self::Ri | Self::Gs | Self::CS | Self::Cs | Self::Sh | Self::Do => Fixed(ONE_NAME),
            Self::MP | Self::BMC => Fixed(ONE_NAME),
            Self::Mm | Self::L | Self::Td | Self::TD | Self::D0 => Fixed(TWO_NUM),
            Self::V | Self::Y | Self::Re | Self::K | Self::Kk => Fixed(FOUR_NUM),
            Self::H | Self::S | Self::Ss | Self::F | Self::Ff | Self::FStar => Fixed(NONE),
            Self::B | Self::BStar | Self::Bb | Self::BbStar | Self::N => Fixed(NONE),
            Self::WClip | Self::WStar | Self::BT | Self::ET | Self::TStar => Fixed(NONE),
            Self::Tc | Self::Tw | Self::Tz | Self::TL | Self::Tr | Self::Ts => Fixed(ONE_NUM),
            Self::G | Self::Gg => Fixed(ONE_NUM),
            Self::Tf => Fixed(&[Nm, Num]),
            Self::Tj | Self::Quote => Fixed(ONE_STR),
            Self::TJ => Fixed(&[Arr]),
            Self::DoubleQuote => Fixed(&[Num, Num, Str]),
            Self::RG | Self::Rg => Fixed(THREE_NUM),
            Self::SC | Self::SCN | Self::Sc | Self::Scn => Variable,
            Self::DP | Self::BDC => Fixed(&[Nm, Any]),
            Self::BI | Self::ID | Self::EI | Self::EMC | Self::BX | Self::EX => Fixed(NONE),
            Self::Other(_) => return None,
        };
        Some(sig)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in [&b"q"[..], b"Q", b"T*", b"'", b"\"", b"scn", b"BDC", b"d1"] {
            let op = Op::from_bytes(name);
            assert!(op.is_known(), "{}", String::from_utf8_lossy(name));
            assert_eq!(op.as_bytes(), name);
        }
        assert_eq!(Op::from_bytes(b"xyz"), Op::Other(b"xyz".to_vec()));
    }

    #[test]
    fn block_pairs() {
        assert_eq!(Op::Qq.block_close(), Some(Op::Q));
        assert_eq!(Op::BDC.block_close(), Some(Op::EMC));
        assert_eq!(Op::BX.block_close(), Some(Op::EX));
        assert_eq!(Op::Tj.block_close(), None);
        assert!(Op::ET.is_block_close());
    }

    #[test]
    fn signatures() {
        assert_eq!(Op::Td.signature(), Some(Signature::Fixed(&[Num, Num])));
        assert_eq!(Op::Scn.signature(), Some(Signature::Variable));
        assert_eq!(Op::Other(b"zz".to_vec()).signature(), None);
        assert!(ArgKind::String.matches(&PDFObject::HexString(vec![1])));
        assert!(!ArgKind::Number.matches(&PDFObject::name("F1")));
    }
}
