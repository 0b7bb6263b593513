use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lopdf::{self, content::Content};

use crate::{PageBox, PdfError};

/// `(object number, generation)`, the same shape as `lopdf::ObjectId`.
pub type PageId = (u32, u16);

/// Glyph width used when a font declares no metrics, as a fraction of the
/// font size.
pub const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

// ===========================================================================
// Fonts
// ===========================================================================

/// A font entry from the page resources, reduced to what text decoding and
/// glyph placement need.
#[derive(Debug, Clone, Default)]
pub struct BackendFontInfo {
    /// Resource key used by `Tf`, e.g. `b"F1"`.
    pub name: Vec<u8>,
    pub base_font: Option<String>,
    /// `Type1`, `TrueType`, `Type0`...
    pub subtype: Option<String>,
    /// Code to Unicode mapping read by lopdf.
    pub glyphs: GlyphMap,
    /// First code covered by `widths` (simple fonts).
    pub first_char: u32,
    /// Glyph advances in thousandths of text-space units (simple fonts).
    pub widths: Vec<f32>,
    /// Per-CID advances from the descendant font's `W` array (Type0 fonts).
    pub cid_widths: HashMap<u32, f32>,
    /// Descendant font `DW`, in thousandths (Type0 fonts).
    pub default_width: Option<f32>,
}

/// One decoded character code: its Unicode text and its advance in
/// thousandths of text-space units (`None` when the font has no metric).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub code: u32,
    pub text: String,
    pub advance: Option<f32>,
}

impl BackendFontInfo {
    /// Type0 fonts address glyphs with multi-byte codes.
    pub fn is_composite(&self) -> bool {
        self.subtype.as_deref() == Some("Type0")
    }

    fn glyph_advance(&self, code: u32) -> Option<f32> {
        if self.is_composite() {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .or(self.default_width)
                .or(Some(1000.0));
        }
        code.checked_sub(self.first_char)
            .and_then(|idx| self.widths.get(idx as usize))
            .copied()
            .filter(|w| *w > 0.0)
    }

    /// Split string bytes into glyphs, one byte per code for simple fonts
    /// and two for Type0 fonts.
    ///
    /// A code the encoding does not map keeps its raw value: a single byte
    /// as Latin-1, a two-byte code as a UTF-16 unit.  That is how the broken
    /// digit glyphs reach the correction rule.
    pub fn decode_glyphs(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let code_len = if self.is_composite() { 2 } else { 1 };

        bytes
            .chunks(code_len)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                let text = self
                    .glyphs
                    .lookup(code, chunk.len())
                    .unwrap_or_else(|| raw_char(code, chunk.len()));
                DecodedGlyph {
                    code,
                    text,
                    advance: self.glyph_advance(code),
                }
            })
            .collect()
    }
}

fn raw_char(code: u32, len: usize) -> String {
    match len {
        1 => char::from(code as u8).to_string(),
        _ => char::from_u32(code).unwrap_or('\u{FFFD}').to_string(),
    }
}

/// Per-code view of a [`lopdf::Encoding`].
///
/// lopdf borrows single-byte tables from the font dictionary, so those are
/// copied into 256 slots up front; a ToUnicode CMap is owned and kept as is.
#[derive(Debug, Clone, Default)]
pub enum GlyphMap {
    /// Neither `Encoding` nor a readable `ToUnicode`.
    #[default]
    Raw,
    OneByte(Arc<[Option<char>]>),
    ToUnicode(Arc<lopdf::Encoding<'static>>),
    /// `UniGB-UCS2-H` and `UniGB-UTF16-H`: codes are UTF-16 units.
    Utf16,
}

impl GlyphMap {
    pub fn from_encoding(encoding: lopdf::Encoding<'_>) -> Self {
        match encoding {
            lopdf::Encoding::UnicodeMapEncoding(cmap) => {
                Self::ToUnicode(Arc::new(lopdf::Encoding::UnicodeMapEncoding(cmap)))
            }
            lopdf::Encoding::SimpleEncoding(b"UniGB-UCS2-H" | b"UniGB-UTF16-H") => Self::Utf16,
            lopdf::Encoding::SimpleEncoding(_) => Self::Raw,
            one_byte @ lopdf::Encoding::OneByteEncoding(_) => Self::OneByte(
                (0..=u8::MAX)
                    .map(|b| {
                        one_byte
                            .bytes_to_string(&[b])
                            .ok()
                            .and_then(|s| s.chars().next())
                    })
                    .collect(),
            ),
        }
    }

    /// Unicode text of one `len`-byte code, `None` when unmapped.
    pub fn lookup(&self, code: u32, len: usize) -> Option<String> {
        match self {
            Self::Raw => None,
            Self::OneByte(slots) => slots.get(code as usize).copied().flatten().map(String::from),
            Self::Utf16 => char::from_u32(code).map(String::from),
            Self::ToUnicode(encoding) => {
                let bytes = code.to_be_bytes();
                encoding
                    .bytes_to_string(&bytes[4 - len.clamp(1, 4)..])
                    .ok()
                    .filter(|s| !s.is_empty() && !s.contains('\u{FFFD}'))
            }
        }
    }
}

/// Content-stream operand, detached from `lopdf` so layout code can be fed
/// hand-built operator lists.
///
/// Only the shapes the text and path interpreters look at are kept apart;
/// everything else (dictionaries, booleans, null) collapses into `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Reference(PageId),
    Other,
}

/// An operator with its operands, in stream order.
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

// ===========================================================================
// Operand helpers
// ===========================================================================

/// Numeric operand as `f32`; PDF writers use integers and reals interchangeably.
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match *val {
        PdfValue::Integer(i) => Some(i as f32),
        PdfValue::Real(r) => Some(r),
        _ => None,
    }
}

pub fn convert_object(obj: &lopdf::Object) -> PdfValue {
    use lopdf::Object as O;

    match obj {
        O::Integer(i) => PdfValue::Integer(*i),
        O::Real(r) => PdfValue::Real(*r),
        O::Name(n) => PdfValue::Name(n.clone()),
        O::String(bytes, _) => PdfValue::Str(bytes.clone()),
        O::Array(items) => PdfValue::Array(items.iter().map(convert_object).collect()),
        O::Reference(id) => PdfValue::Reference(*id),
        O::Null | O::Boolean(_) | O::Dictionary(_) | O::Stream(_) => PdfValue::Other,
    }
}

/// Parse a CID font `W` array into per-CID advances.
///
/// Two forms are allowed: `c [w1 w2 ...]` and `c_first c_last w`.
pub fn parse_cid_widths(values: &[PdfValue]) -> HashMap<u32, f32> {
    let mut out = HashMap::new();
    let mut i = 0;

    while i < values.len() {
        let Some(first) = get_number_from_value(&values[i]) else {
            i += 1;
            continue;
        };
        match values.get(i + 1) {
            Some(PdfValue::Array(ws)) => {
                for (offset, w) in ws.iter().enumerate() {
                    if let Some(w) = get_number_from_value(w) {
                        out.insert(first as u32 + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (
                    get_number_from_value(last),
                    values.get(i + 2).and_then(get_number_from_value),
                ) else {
                    i += 3;
                    continue;
                };
                for cid in first as u32..=last as u32 {
                    out.insert(cid, w);
                }
                i += 3;
            }
            None => break,
        }
    }

    out
}

// ===========================================================================
// Document access
// ===========================================================================

/// What the layout, geometry and table code need from a parsed PDF.
///
/// `LopdfBackend` is the only implementation outside tests.
pub trait PdfBackend {
    /// 1-based page number to page object id.
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Fonts named in the page resources, with metrics and ToUnicode maps.
    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>, PdfError>;

    /// Concatenated, decompressed content streams of the page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError>;

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError>;

    /// CropBox when present, MediaBox otherwise.
    fn page_box(&self, page: PageId) -> Result<PageBox, PdfError>;
}

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Encrypted declarations are rejected up front; their text layer is
    /// unreadable without the key anyway.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;
        match doc.is_encrypted() {
            true => Err(PdfError::Encrypted),
            false => Ok(Self { doc }),
        }
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Follow references until a direct object is reached.
    fn resolve<'a>(&'a self, obj: &'a lopdf::Object) -> &'a lopdf::Object {
        let mut current = obj;
        // Bounded to survive reference cycles.
        for _ in 0..16 {
            match current {
                lopdf::Object::Reference(id) => match self.doc.get_object(*id) {
                    Ok(next) => current = next,
                    Err(_) => return current,
                },
                _ => return current,
            }
        }
        current
    }

    /// Walk up the page tree to find an inheritable page attribute.
    fn find_inherited(&self, dict: &lopdf::Dictionary, key: &[u8]) -> Option<Vec<f32>> {
        if let Ok(obj) = dict.get(key) {
            if let lopdf::Object::Array(arr) = self.resolve(obj) {
                let nums: Vec<f32> = arr
                    .iter()
                    .filter_map(|o| match self.resolve(o) {
                        lopdf::Object::Integer(i) => Some(*i as f32),
                        lopdf::Object::Real(f) => Some(*f),
                        _ => None,
                    })
                    .collect();
                if nums.len() == 4 {
                    return Some(nums);
                }
            }
        }

        let parent = dict.get(b"Parent").ok()?;
        match self.resolve(parent) {
            lopdf::Object::Dictionary(parent_dict) => self.find_inherited(parent_dict, key),
            _ => None,
        }
    }

    fn number_array(&self, obj: &lopdf::Object) -> Vec<PdfValue> {
        match self.resolve(obj) {
            lopdf::Object::Array(arr) => arr
                .iter()
                .map(|o| convert_object(self.resolve(o)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Fonts with neither entry stay [`GlyphMap::Raw`]; lopdf would only
    /// guess StandardEncoding for them.
    fn glyph_map(&self, name: &[u8], dict: &lopdf::Dictionary) -> GlyphMap {
        if !dict.has(b"Encoding") && !dict.has(b"ToUnicode") {
            return GlyphMap::Raw;
        }
        match dict.get_font_encoding(&self.doc) {
            Ok(encoding) => GlyphMap::from_encoding(encoding),
            Err(e) => {
                log::debug!("font {}: no usable encoding ({})", String::from_utf8_lossy(name), e);
                GlyphMap::Raw
            }
        }
    }

    fn font_info(&self, name: &[u8], dict: &lopdf::Dictionary) -> BackendFontInfo {
        let name_of = |key: &[u8]| {
            dict.get(key).ok().and_then(|o| match self.resolve(o) {
                lopdf::Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                _ => None,
            })
        };

        let mut info = BackendFontInfo {
            name: name.to_vec(),
            base_font: name_of(b"BaseFont"),
            subtype: name_of(b"Subtype"),
            glyphs: self.glyph_map(name, dict),
            ..Default::default()
        };

        if let Ok(first) = dict.get(b"FirstChar") {
            if let lopdf::Object::Integer(i) = self.resolve(first) {
                info.first_char = (*i).max(0) as u32;
            }
        }
        if let Ok(widths) = dict.get(b"Widths") {
            info.widths = self
                .number_array(widths)
                .iter()
                .map(|v| get_number_from_value(v).unwrap_or(0.0))
                .collect();
        }

        if info.is_composite() {
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .map(|o| self.resolve(o))
                .and_then(|o| match o {
                    lopdf::Object::Array(arr) => arr.first().map(|d| self.resolve(d)),
                    _ => None,
                });
            if let Some(lopdf::Object::Dictionary(desc)) = descendant {
                if let Ok(dw) = desc.get(b"DW") {
                    info.default_width = get_number_from_value(&convert_object(self.resolve(dw)));
                }
                if let Ok(w) = desc.get(b"W") {
                    info.cid_widths = parse_cid_widths(&self.number_array(w));
                }
            }
        }

        info
    }
}

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>, PdfError> {
        let fonts_map = self
            .doc
            .get_page_fonts(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page fonts: {}", e)))?;

        Ok(fonts_map
            .iter()
            .map(|(name, dict)| self.font_info(name, dict))
            .collect())
    }

    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError> {
        self.doc
            .get_page_content(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
        let content = Content::decode(data)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect())
    }

    fn page_box(&self, page: PageId) -> Result<PageBox, PdfError> {
        let page_dict = self
            .doc
            .get_object(page)
            .and_then(|o| o.as_dict())
            .map_err(|e| PdfError::Parse(format!("cannot get page dictionary: {}", e)))?;

        let nums = self
            .find_inherited(page_dict, b"CropBox")
            .or_else(|| self.find_inherited(page_dict, b"MediaBox"));

        Ok(match nums {
            Some(n) => PageBox {
                x0: n[0].min(n[2]),
                y0: n[1].min(n[3]),
                x1: n[0].max(n[2]),
                y1: n[1].max(n[3]),
            },
            None => {
                log::warn!("page {:?} declares no MediaBox, assuming US Letter", page);
                PageBox::default()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use lopdf::{dictionary, Document, Object, Stream};

    use super::*;

    const IDENTITY_UCS: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0015> <0032>
<0E23> <0E23>
endbfchar
endcmap
CMapName currentdict /CMap defineresource pop
end
end";

    /// One page whose resources hold a WinAnsi simple font (`F1`), a
    /// Type0 font with a ToUnicode map (`F2`) and a bare Type1 font (`F3`).
    fn fonts_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let cmap_id = doc.add_object(Stream::new(dictionary! {}, IDENTITY_UCS.to_vec()));
        let f1 = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "Arial",
            "Encoding" => "WinAnsiEncoding",
            "FirstChar" => 32,
            "Widths" => vec![Object::Integer(278); 96],
        });
        let f2 = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Tahoma",
            "Encoding" => "Identity-H",
            "ToUnicode" => cmap_id,
        });
        let f3 = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => f1, "F2" => f2, "F3" => f3 },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn page_font(key: &[u8]) -> BackendFontInfo {
        let backend = LopdfBackend::load_bytes(&fonts_pdf()).unwrap();
        let page = backend.pages()[&1];
        backend
            .page_fonts(page)
            .unwrap()
            .into_iter()
            .find(|f| f.name == key)
            .unwrap()
    }

    fn text(font: &BackendFontInfo, bytes: &[u8]) -> String {
        font.decode_glyphs(bytes).into_iter().map(|g| g.text).collect()
    }

    // ====================================================================
    // Fonts read through lopdf
    // ====================================================================

    #[test]
    fn test_win_ansi_font_keeps_unmapped_control_byte() {
        let font = page_font(b"F1");
        assert!(matches!(font.glyphs, GlyphMap::OneByte(_)));
        assert_eq!(text(&font, &[b'1', 0x15, b'0', b' ', b'K', b'G', b'M']), "1\u{15}0 KGM");
    }

    #[test]
    fn test_win_ansi_font_widths_start_at_first_char() {
        let font = page_font(b"F1");
        assert_eq!(font.first_char, 32);
        assert_eq!(font.decode_glyphs(b"A")[0].advance, Some(278.0));
        assert_eq!(font.decode_glyphs(&[0x15])[0].advance, None);
    }

    #[test]
    fn test_type0_font_maps_through_to_unicode() {
        let font = page_font(b"F2");
        assert!(font.is_composite());
        assert!(matches!(font.glyphs, GlyphMap::ToUnicode(_)));

        let glyphs = font.decode_glyphs(&[0x00, 0x15, 0x0E, 0x23, 0x00, 0x16]);
        assert_eq!(glyphs[0].text, "2");
        assert_eq!(glyphs[1].text, "ร");
        // Unmapped two-byte code survives as its code point.
        assert_eq!(glyphs[2].text, "\u{16}");
    }

    #[test]
    fn test_font_without_encoding_reads_bytes_raw() {
        let font = page_font(b"F3");
        assert!(matches!(font.glyphs, GlyphMap::Raw));
        assert_eq!(text(&font, &[b'1', 0x15, b'0']), "1\u{15}0");
    }

    // ====================================================================
    // Composite fonts without a map
    // ====================================================================

    #[test]
    fn test_type0_without_map_reads_code_points() {
        let font = BackendFontInfo {
            name: b"F9".to_vec(),
            subtype: Some("Type0".to_string()),
            default_width: Some(600.0),
            ..Default::default()
        };
        assert_eq!(text(&font, &[0x0E, 0x23, 0x0E, 0x32]), "รา");
        assert_eq!(font.decode_glyphs(&[0x0E, 0x23])[0].advance, Some(600.0));
    }

    #[test]
    fn test_cid_widths_both_forms() {
        let values = vec![
            PdfValue::Integer(1),
            PdfValue::Array(vec![PdfValue::Integer(500), PdfValue::Real(550.0)]),
            PdfValue::Integer(10),
            PdfValue::Integer(12),
            PdfValue::Integer(700),
        ];
        let w = parse_cid_widths(&values);
        assert_eq!(w.get(&1), Some(&500.0));
        assert_eq!(w.get(&2), Some(&550.0));
        assert_eq!(w.get(&10), Some(&700.0));
        assert_eq!(w.get(&12), Some(&700.0));
        assert_eq!(w.get(&13), None);
    }

    // ====================================================================
    // Operands
    // ====================================================================

    #[test]
    fn test_operands_keep_text_and_numbers() {
        let tj = lopdf::Object::Array(vec![
            lopdf::Object::string_literal("1"),
            lopdf::Object::Integer(-120),
            lopdf::Object::Real(2.5),
        ]);
        let PdfValue::Array(items) = convert_object(&tj) else {
            panic!("TJ operand should stay an array");
        };
        assert_eq!(items[0], PdfValue::Str(b"1".to_vec()));
        assert_eq!(get_number_from_value(&items[1]), Some(-120.0));
        assert_eq!(get_number_from_value(&items[2]), Some(2.5));
    }

    #[test]
    fn test_dictionaries_collapse_to_other() {
        let obj = lopdf::Object::Dictionary(lopdf::Dictionary::new());
        assert_eq!(convert_object(&obj), PdfValue::Other);
        assert_eq!(get_number_from_value(&PdfValue::Other), None);
    }
}
