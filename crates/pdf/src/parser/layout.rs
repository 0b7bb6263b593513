//! Native text extraction: content-stream operators to positioned spans,
//! spans to lines, lines to blocks.
//!
//! Everything here is a pure transformation over operators and fonts the
//! caller already pulled out of the document.
//!
//! # Pipeline
//!
//! ```text
//! content ops  ->  TextSpan[]  ->  TextLine[]  ->  LayoutBlock[]  ->  TextBlock[]
//!   (per page)      extract         group_spans     group_lines        native_text_blocks
//! ```
//!
//! Grouping follows content-stream order rather than reading order: a span
//! continues the previous line when it sits on the same baseline just to its
//! right, and a line continues the previous block when it starts directly
//! below it.  Producers of customs forms emit each cell's text as one run,
//! so this keeps stacked values of a cell together while leaving
//! neighbouring cells apart.

use super::backend::{
    get_number_from_value, BackendFontInfo, ContentOp, PdfValue, APPROX_CHAR_WIDTH_RATIO,
};
use super::content::{CtmStack, Matrix};
use crate::{CorrectionRule, Glyph, PageBox, Rect, TextBlock};

// ===========================================================================
// Spans, lines, blocks
// ===========================================================================

/// A run of text drawn by one show operator, in top-left page space.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub bbox: Rect,
    /// Baseline y in top-left page space.
    pub baseline: f32,
    pub font_size: f32,
    pub font_name: String,
    pub glyphs: Vec<Glyph>,
}

/// Spans sharing a baseline, merged left to right.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub bbox: Rect,
    pub baseline: f32,
    pub font_size: f32,
}

/// Lines stacked into one visual block.
#[derive(Debug, Clone)]
pub struct LayoutBlock {
    pub lines: Vec<TextLine>,
    pub bbox: Rect,
}

impl LayoutBlock {
    /// Line texts joined with `\n`.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ===========================================================================
// Tolerances
// ===========================================================================

/// Two baselines closer than this are the same line.
const Y_TOLERANCE: f32 = 1.0;

/// Horizontal gap, in points, that separates two words on one line.
const MIN_WORD_GAP: f32 = 1.5;

/// Spans further apart than this multiple of the font size start a new line
/// even on the same baseline.
const RUN_GAP_FACTOR: f32 = 2.0;

/// A vertical gap between consecutive line boxes larger than this multiple
/// of the font size starts a new block.
const BLOCK_GAP_FACTOR: f32 = 0.6;

/// Glyph box extent below and above the baseline, as fractions of the size.
const DESCENT_RATIO: f32 = 0.2;
const ASCENT_RATIO: f32 = 0.8;

/// TJ displacements wider than this fraction of an average glyph read as a
/// word break.
const TJ_SPACE_RATIO: f32 = 0.3;

// ===========================================================================
// Word breaks
// ===========================================================================

/// Scripts written without spaces between words.  Declarations mix Thai
/// and Chinese goods descriptions with Latin codes and units.
const SPACELESS_RANGES: &[(u32, u32)] = &[
    (0x0E00, 0x0EFF), // Thai, Lao
    (0x0F00, 0x109F), // Tibetan, Myanmar
    (0x1780, 0x17FF), // Khmer
    (0x1100, 0x11FF), // Hangul Jamo
    (0x3000, 0x30FF), // CJK punctuation, kana
    (0x3130, 0x318F),
    (0x31F0, 0x31FF),
    (0x3400, 0x4DBF),
    (0x4E00, 0x9FFF),
    (0xAC00, 0xD7AF),
    (0xF900, 0xFAFF),
    (0xFF00, 0xFFEF), // full-width forms
    (0x20000, 0x2A6DF),
];

pub fn is_spaceless_script_char(c: char) -> bool {
    let cp = c as u32;
    SPACELESS_RANGES
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

fn boundary_is_spaceless(prev: &str, next: &str) -> bool {
    prev.chars()
        .next_back()
        .zip(next.chars().next())
        .is_some_and(|(l, f)| is_spaceless_script_char(l) && is_spaceless_script_char(f))
}

// ===========================================================================
// Text state
// ===========================================================================

#[derive(Debug, Clone)]
struct TextState {
    font_key: Vec<u8>,
    font_size: f32,
    text_matrix: Matrix,
    line_matrix: Matrix,
    /// Horizontal scaling factor (percent / 100).
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_size: 0.0,
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    /// Move the text matrix `dx` unscaled text-space units to the right.
    fn advance_x(&mut self, dx: f32) {
        let m = &mut self.text_matrix.0;
        m[4] += dx * m[0];
        m[5] += dx * m[1];
    }

    /// Translate the line matrix (Td / TD / T*) and reset the text matrix.
    fn translate_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix([1.0, 0.0, 0.0, 1.0, tx, ty]).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }
}

/// Everything needed to place glyphs on the page.
struct Placement<'a> {
    fonts: &'a [BackendFontInfo],
    fallback_font: BackendFontInfo,
    page_box: PageBox,
}

impl Placement<'_> {
    fn font(&self, key: &[u8]) -> &BackendFontInfo {
        self.fonts
            .iter()
            .find(|info| info.name == key)
            .unwrap_or(&self.fallback_font)
    }

    /// Map a text-space point through the text matrix and CTM into
    /// top-left page space.
    fn to_page(&self, trm: &Matrix, x: f32, y: f32) -> (f32, f32) {
        let (ux, uy) = trm.apply(x, y);
        self.page_box.to_top_left(ux, uy)
    }
}

/// Accumulates glyphs drawn by one show operator.
#[derive(Default)]
struct SpanBuilder {
    text: String,
    glyphs: Vec<Glyph>,
    bbox: Option<Rect>,
    baseline: f32,
    font_size: f32,
    font_name: String,
}

impl SpanBuilder {
    fn push_glyph(&mut self, text: &str, bbox: Rect) {
        let n = text.chars().count().max(1) as f32;
        let step = bbox.width() / n;
        for (i, ch) in text.chars().enumerate() {
            let x0 = bbox.x0 + step * i as f32;
            self.glyphs.push(Glyph {
                ch,
                bbox: Rect::new(x0, bbox.top, x0 + step, bbox.bottom),
            });
        }
        self.text.push_str(text);
        self.bbox = Some(match self.bbox {
            Some(b) => b.union(&bbox),
            None => bbox,
        });
    }

    fn finish(self) -> Option<TextSpan> {
        let bbox = self.bbox?;
        let text = self.text.trim_end().to_string();
        if text.trim().is_empty() {
            return None;
        }
        Some(TextSpan {
            text,
            bbox,
            baseline: self.baseline,
            font_size: self.font_size,
            font_name: self.font_name,
            glyphs: self.glyphs,
        })
    }
}

// ===========================================================================
// Operators to spans
// ===========================================================================

/// Walk a single page's content stream and produce its [`TextSpan`]s in
/// content-stream order.
///
/// | Operators | Effect |
/// |-----------|--------|
/// | `q` `Q` `cm` | Graphics state save / restore / concat |
/// | `BT` | Text and line matrices back to identity |
/// | `Tf` | Font resource and size |
/// | `Tm` `Td` `TD` `T*` `TL` | Text positioning |
/// | `Tc` `Tw` `Tz` `Ts` | Spacing, scaling, rise |
/// | `Tj` `TJ` `'` `"` | Show text |
pub fn extract_page_spans(
    ops: &[ContentOp],
    fonts: &[BackendFontInfo],
    page_box: PageBox,
) -> Vec<TextSpan> {
    let placement = Placement {
        fonts,
        fallback_font: BackendFontInfo::default(),
        page_box,
    };

    let mut ctm = CtmStack::default();
    let mut state = TextState::default();
    let mut spans: Vec<TextSpan> = Vec::new();

    for op in ops {
        if ctm.handle(&op.operator, &op.operands) {
            continue;
        }
        let num = |i: usize| op.operands.get(i).and_then(get_number_from_value);

        match op.operator.as_str() {
            "BT" => {
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(PdfValue::Name(key)) = op.operands.first() {
                    state.font_key = key.clone();
                }
                state.font_size = num(1).unwrap_or(state.font_size);
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.translate_line(0.0, -state.leading),
            "TL" => state.leading = num(0).unwrap_or(state.leading),
            "Tc" => state.char_spacing = num(0).unwrap_or(state.char_spacing),
            "Tw" => state.word_spacing = num(0).unwrap_or(state.word_spacing),
            "Tz" => {
                if let Some(v) = num(0) {
                    state.horiz_scale = v / 100.0;
                }
            }
            "Ts" => state.text_rise = num(0).unwrap_or(state.text_rise),
            "Tj" => {
                if let Some(PdfValue::Str(bytes)) = op.operands.first() {
                    let mut span = start_span(&placement, &state, &ctm.current());
                    show_bytes(bytes, &placement, &mut state, &ctm.current(), &mut span);
                    spans.extend(span.finish());
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(arr)) = op.operands.first() {
                    let span = show_tj_array(arr, &placement, &mut state, &ctm.current());
                    spans.extend(span.finish());
                }
            }
            "'" => {
                state.translate_line(0.0, -state.leading);
                if let Some(PdfValue::Str(bytes)) = op.operands.first() {
                    let mut span = start_span(&placement, &state, &ctm.current());
                    show_bytes(bytes, &placement, &mut state, &ctm.current(), &mut span);
                    spans.extend(span.finish());
                }
            }
            "\"" => {
                // aw ac string  =>  Tw, Tc, T*, Tj
                if let (Some(aw), Some(ac)) = (num(0), num(1)) {
                    state.word_spacing = aw;
                    state.char_spacing = ac;
                }
                state.translate_line(0.0, -state.leading);
                if let Some(PdfValue::Str(bytes)) = op.operands.get(2) {
                    let mut span = start_span(&placement, &state, &ctm.current());
                    show_bytes(bytes, &placement, &mut state, &ctm.current(), &mut span);
                    spans.extend(span.finish());
                }
            }
            _ => {}
        }
    }

    spans
}

fn start_span(placement: &Placement<'_>, state: &TextState, ctm: &Matrix) -> SpanBuilder {
    let trm = state.text_matrix.then(ctm);
    let (_, baseline) = placement.to_page(&trm, 0.0, state.text_rise);
    let font = placement.font(&state.font_key);
    SpanBuilder {
        baseline,
        font_size: (state.font_size * trm.vertical_scale()).abs(),
        font_name: font
            .base_font
            .clone()
            .unwrap_or_else(|| String::from_utf8_lossy(&state.font_key).into_owned()),
        ..Default::default()
    }
}

/// Draw the glyphs of one string operand, advancing the text matrix.
fn show_bytes(
    bytes: &[u8],
    placement: &Placement<'_>,
    state: &mut TextState,
    ctm: &Matrix,
    span: &mut SpanBuilder,
) {
    let font = placement.font(&state.font_key);
    let fs = state.font_size;

    for glyph in font.decode_glyphs(bytes) {
        let w0 = glyph
            .advance
            .map(|a| a / 1000.0)
            .unwrap_or(APPROX_CHAR_WIDTH_RATIO);
        let width = w0 * fs * state.horiz_scale;

        let trm = state.text_matrix.then(ctm);
        let (ax, ay) = placement.to_page(&trm, 0.0, state.text_rise - DESCENT_RATIO * fs);
        let (bx, by) = placement.to_page(&trm, width, state.text_rise + ASCENT_RATIO * fs);
        if !glyph.text.is_empty() {
            span.push_glyph(&glyph.text, Rect::new(ax, ay, bx, by));
        }

        let mut tx = w0 * fs + state.char_spacing;
        if glyph.code == 32 && !font.is_composite() {
            tx += state.word_spacing;
        }
        state.advance_x(tx * state.horiz_scale);
    }
}

/// Process a `TJ` array: strings interleaved with kerning adjustments in
/// thousandths of a text-space unit.
fn show_tj_array(
    arr: &[PdfValue],
    placement: &Placement<'_>,
    state: &mut TextState,
    ctm: &Matrix,
) -> SpanBuilder {
    let mut span = start_span(placement, state, ctm);

    for elem in arr {
        match elem {
            PdfValue::Str(bytes) => show_bytes(bytes, placement, state, ctm, &mut span),
            val => {
                if let Some(adj) = get_number_from_value(val) {
                    let dx = -adj / 1000.0 * state.font_size * state.horiz_scale;
                    let gap_threshold =
                        state.font_size * APPROX_CHAR_WIDTH_RATIO * state.horiz_scale * TJ_SPACE_RATIO;
                    if dx > gap_threshold && !span.text.is_empty() && !span.text.ends_with(' ') {
                        span.text.push(' ');
                    }
                    state.advance_x(dx);
                }
            }
        }
    }

    span
}

// ===========================================================================
// Spans to lines
// ===========================================================================

/// Merge consecutive spans into [`TextLine`]s, preserving content order.
///
/// A span continues the current line when its baseline is within
/// [`Y_TOLERANCE`] and it starts no further than [`RUN_GAP_FACTOR`] font
/// sizes after the line ends.  A space is inserted for gaps over
/// [`MIN_WORD_GAP`] unless both sides are spaceless-script characters.
pub fn group_spans_into_lines(spans: &[TextSpan]) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();

    for span in spans {
        if let Some(line) = lines.last_mut() {
            let gap = span.bbox.x0 - line.bbox.x1;
            let size = line.font_size.max(span.font_size);
            let same_baseline = (span.baseline - line.baseline).abs() <= Y_TOLERANCE;

            if same_baseline && gap > -size && gap < size * RUN_GAP_FACTOR {
                if gap >= MIN_WORD_GAP && !boundary_is_spaceless(&line.text, &span.text) {
                    line.text.push(' ');
                }
                line.text.push_str(&span.text);
                line.bbox = line.bbox.union(&span.bbox);
                line.font_size = size;
                continue;
            }
        }

        lines.push(TextLine {
            text: span.text.clone(),
            bbox: span.bbox,
            baseline: span.baseline,
            font_size: span.font_size,
        });
    }

    lines
}

// ===========================================================================
// Lines to blocks
// ===========================================================================

/// Stack consecutive lines into [`LayoutBlock`]s, preserving content order.
///
/// A line joins the current block when it lies below the block's last line,
/// overlaps the block horizontally, and the vertical gap between the two
/// line boxes is at most [`BLOCK_GAP_FACTOR`] font sizes.
pub fn group_lines_into_blocks(lines: Vec<TextLine>) -> Vec<LayoutBlock> {
    let mut blocks: Vec<LayoutBlock> = Vec::new();

    for line in lines {
        if let Some(block) = blocks.last_mut() {
            if let Some(prev) = block.lines.last() {
                let below = line.baseline - prev.baseline > Y_TOLERANCE;
                let gap = line.bbox.top - prev.bbox.bottom;
                let size = prev.font_size.max(line.font_size);

                if below
                    && gap <= size * BLOCK_GAP_FACTOR
                    && block.bbox.overlaps_horizontally(&line.bbox)
                {
                    block.bbox = block.bbox.union(&line.bbox);
                    block.lines.push(line);
                    continue;
                }
            }
        }

        blocks.push(LayoutBlock {
            bbox: line.bbox,
            lines: vec![line],
        });
    }

    blocks
}

/// The native text blocks of a page in content-stream order: text trimmed,
/// the correction rule applied, and empty blocks dropped.
pub fn native_text_blocks(spans: &[TextSpan], rule: &CorrectionRule) -> Vec<TextBlock> {
    group_lines_into_blocks(group_spans_into_lines(spans))
        .into_iter()
        .filter_map(|block| {
            let text = rule.apply(&block.text());
            (!text.is_empty()).then_some(TextBlock {
                text,
                bbox: block.bbox,
            })
        })
        .collect()
}

/// Flatten every glyph of the page, in content order.
pub fn page_glyphs(spans: &[TextSpan]) -> Vec<Glyph> {
    spans.iter().flat_map(|s| s.glyphs.iter().cloned()).collect()
}
