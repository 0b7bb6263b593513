use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page points, origin at the top-left corner of
/// the page's visible box.  `top < bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(x0: f32, top: f32, x1: f32, bottom: f32) -> Self {
        Rect {
            x0: x0.min(x1),
            top: top.min(bottom),
            x1: x0.max(x1),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Centroid of the rectangle.
    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Half-open containment: `x0 <= x < x1` and `top <= y < bottom`.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.x0 <= x && x < self.x1 && self.top <= y && y < self.bottom
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            top: self.top.min(other.top),
            x1: self.x1.max(other.x1),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// `true` when the horizontal extents of the two rectangles overlap.
    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}, {:.1}, {:.1})",
            self.x0, self.top, self.x1, self.bottom
        )
    }
}

/// The visible page box in PDF user space (CropBox, falling back to
/// MediaBox).  Used to flip user-space coordinates into [`Rect`] space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Convert a user-space point (y grows upwards) to top-left page space.
    pub fn to_top_left(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.x0, self.y1 - y)
    }
}

impl Default for PageBox {
    /// US Letter, the PDF default when no box is declared.
    fn default() -> Self {
        PageBox {
            x0: 0.0,
            y0: 0.0,
            x1: 612.0,
            y1: 792.0,
        }
    }
}

/// A run of native text sharing a visual block on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: Rect,
}

/// A single glyph with its approximate box, used to rebuild per-cell text.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub bbox: Rect,
}

/// Deterministic substitution for one glyph that a font maps to the wrong
/// code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRule {
    pub find: char,
    pub replace: char,
}

impl CorrectionRule {
    pub fn new(find: char, replace: char) -> Self {
        CorrectionRule { find, replace }
    }

    /// Trim surrounding whitespace, then substitute every `find` with
    /// `replace`.
    pub fn apply(&self, text: &str) -> String {
        text.trim().replace(self.find, &self.replace.to_string())
    }
}

impl Default for CorrectionRule {
    /// NAK (`0x15`) is what the affected fonts emit in place of the digit 2.
    fn default() -> Self {
        CorrectionRule {
            find: '\u{15}',
            replace: '2',
        }
    }
}
