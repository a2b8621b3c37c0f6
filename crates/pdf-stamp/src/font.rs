//! Font selection and text encoding for the stamp
//!
//! Plain ASCII is drawn with the standard Helvetica font. Anything else
//! (such as 済) uses a non-embedded Japanese CID font, which every
//! conforming reader substitutes from its own CJK font set.

use lopdf::{Dictionary, Object, StringFormat};

/// Base font name of the CJK fallback
const CJK_BASE_FONT: &[u8] = b"KozGoPr6N-Medium";
/// Predefined CMap taking UTF-16BE input
const CJK_ENCODING: &[u8] = b"UniJIS-UTF16-H";

/// Approximate advance of a Helvetica glyph, in em
const LATIN_ADVANCE_EM: f32 = 0.55;
/// Latin glyphs in the proportional CJK font are roughly half width
const CJK_LATIN_ADVANCE_EM: f32 = 0.5;
const CJK_WIDE_ADVANCE_EM: f32 = 1.0;

/// Font used to draw a particular stamp text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampFont {
    Helvetica,
    JapaneseGothic,
}

impl StampFont {
    pub fn for_text(text: &str) -> Self {
        if text.is_ascii() {
            StampFont::Helvetica
        } else {
            StampFont::JapaneseGothic
        }
    }

    /// Font dictionary to register in the page resources
    pub fn dictionary(self) -> Dictionary {
        match self {
            StampFont::Helvetica => Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Font".to_vec())),
                ("Subtype", Object::Name(b"Type1".to_vec())),
                ("BaseFont", Object::Name(b"Helvetica".to_vec())),
                ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
            ]),
            StampFont::JapaneseGothic => {
                let descriptor = Dictionary::from_iter(vec![
                    ("Type", Object::Name(b"FontDescriptor".to_vec())),
                    ("FontName", Object::Name(CJK_BASE_FONT.to_vec())),
                    ("Flags", Object::Integer(4)),
                    (
                        "FontBBox",
                        Object::Array(vec![
                            Object::Integer(-538),
                            Object::Integer(-374),
                            Object::Integer(1254),
                            Object::Integer(1418),
                        ]),
                    ),
                    ("ItalicAngle", Object::Integer(0)),
                    ("Ascent", Object::Integer(880)),
                    ("Descent", Object::Integer(-120)),
                    ("CapHeight", Object::Integer(763)),
                    ("StemV", Object::Integer(116)),
                ]);
                let system_info = Dictionary::from_iter(vec![
                    (
                        "Registry",
                        Object::String(b"Adobe".to_vec(), StringFormat::Literal),
                    ),
                    (
                        "Ordering",
                        Object::String(b"Japan1".to_vec(), StringFormat::Literal),
                    ),
                    ("Supplement", Object::Integer(6)),
                ]);
                let descendant = Dictionary::from_iter(vec![
                    ("Type", Object::Name(b"Font".to_vec())),
                    ("Subtype", Object::Name(b"CIDFontType0".to_vec())),
                    ("BaseFont", Object::Name(CJK_BASE_FONT.to_vec())),
                    ("CIDSystemInfo", Object::Dictionary(system_info)),
                    ("FontDescriptor", Object::Dictionary(descriptor)),
                    ("DW", Object::Integer(1000)),
                ]);
                Dictionary::from_iter(vec![
                    ("Type", Object::Name(b"Font".to_vec())),
                    ("Subtype", Object::Name(b"Type0".to_vec())),
                    ("BaseFont", Object::Name(CJK_BASE_FONT.to_vec())),
                    ("Encoding", Object::Name(CJK_ENCODING.to_vec())),
                    (
                        "DescendantFonts",
                        Object::Array(vec![Object::Dictionary(descendant)]),
                    ),
                ])
            }
        }
    }

    /// Encode text as a hex string operand for `Tj`
    pub fn encode(self, text: &str) -> String {
        let bytes: Vec<u8> = match self {
            StampFont::Helvetica => text.bytes().collect(),
            StampFont::JapaneseGothic => text
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect(),
        };
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        format!("<{}>", hex)
    }

    /// Estimated advance width of the text in em
    pub fn text_width_em(self, text: &str) -> f32 {
        text.chars()
            .map(|c| match self {
                StampFont::Helvetica => LATIN_ADVANCE_EM,
                StampFont::JapaneseGothic if c.is_ascii() => CJK_LATIN_ADVANCE_EM,
                StampFont::JapaneseGothic => CJK_WIDE_ADVANCE_EM,
            })
            .sum()
    }
}
