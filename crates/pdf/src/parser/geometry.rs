//! Ruling-line extraction from path construction and painting operators.
//!
//! Table borders in customs forms are drawn as stroked `m`/`l` segments or
//! as thin filled `re` rectangles.  Both end up here as axis-aligned
//! [`Edge`]s in top-left page space; diagonal segments and curves are
//! ignored.

use super::backend::{get_number_from_value, ContentOp};
use super::content::{CtmStack, Matrix};
use crate::PageBox;

/// Segments whose end points differ by less than this along one axis are
/// treated as axis-aligned.
const AXIS_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned ruling line.  For horizontal edges `top == bottom`, for
/// vertical edges `x0 == x1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub orientation: Orientation,
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl Edge {
    pub fn horizontal(x0: f32, x1: f32, y: f32) -> Self {
        Edge {
            orientation: Orientation::Horizontal,
            x0: x0.min(x1),
            top: y,
            x1: x0.max(x1),
            bottom: y,
        }
    }

    pub fn vertical(x: f32, top: f32, bottom: f32) -> Self {
        Edge {
            orientation: Orientation::Vertical,
            x0: x,
            top: top.min(bottom),
            x1: x,
            bottom: top.max(bottom),
        }
    }

    pub fn length(&self) -> f32 {
        match self.orientation {
            Orientation::Horizontal => self.x1 - self.x0,
            Orientation::Vertical => self.bottom - self.top,
        }
    }

    /// Build an edge from two page-space points, if they are axis-aligned.
    fn from_points(a: (f32, f32), b: (f32, f32)) -> Option<Self> {
        if (a.1 - b.1).abs() < AXIS_EPSILON {
            Some(Edge::horizontal(a.0, b.0, a.1))
        } else if (a.0 - b.0).abs() < AXIS_EPSILON {
            Some(Edge::vertical(a.0, a.1, b.1))
        } else {
            None
        }
    }
}

/// Current path under construction, in top-left page space.
#[derive(Default)]
struct PathBuilder {
    segments: Vec<((f32, f32), (f32, f32))>,
    subpath_start: Option<(f32, f32)>,
    current: Option<(f32, f32)>,
}

impl PathBuilder {
    fn move_to(&mut self, p: (f32, f32)) {
        self.subpath_start = Some(p);
        self.current = Some(p);
    }

    fn line_to(&mut self, p: (f32, f32)) {
        if let Some(from) = self.current {
            self.segments.push((from, p));
        }
        self.current = Some(p);
    }

    fn close(&mut self) {
        if let (Some(from), Some(start)) = (self.current, self.subpath_start) {
            if from != start {
                self.segments.push((from, start));
            }
            self.current = Some(start);
        }
    }

    fn take(&mut self) -> Vec<((f32, f32), (f32, f32))> {
        self.subpath_start = None;
        self.current = None;
        std::mem::take(&mut self.segments)
    }
}

fn to_page(ctm: &Matrix, page_box: &PageBox, x: f32, y: f32) -> (f32, f32) {
    let (ux, uy) = ctm.apply(x, y);
    page_box.to_top_left(ux, uy)
}

/// Walk a page's content stream and collect every painted axis-aligned
/// segment as an [`Edge`].
///
/// Both stroked and filled paths contribute.  Paths ended with `n` (clip
/// paths, invisible construction) do not.
pub fn extract_page_edges(ops: &[ContentOp], page_box: &PageBox) -> Vec<Edge> {
    let mut ctm = CtmStack::default();
    let mut path = PathBuilder::default();
    let mut edges = Vec::new();

    for op in ops {
        if ctm.handle(&op.operator, &op.operands) {
            continue;
        }
        let nums: Vec<f32> = op
            .operands
            .iter()
            .filter_map(get_number_from_value)
            .collect();
        let m = ctm.current();

        match op.operator.as_str() {
            "m" if nums.len() >= 2 => path.move_to(to_page(&m, page_box, nums[0], nums[1])),
            "l" if nums.len() >= 2 => path.line_to(to_page(&m, page_box, nums[0], nums[1])),
            // Curves only move the current point.
            "c" if nums.len() >= 6 => path.current = Some(to_page(&m, page_box, nums[4], nums[5])),
            "v" | "y" if nums.len() >= 4 => {
                path.current = Some(to_page(&m, page_box, nums[2], nums[3]))
            }
            "re" if nums.len() >= 4 => {
                let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
                path.move_to(to_page(&m, page_box, x, y));
                path.line_to(to_page(&m, page_box, x + w, y));
                path.line_to(to_page(&m, page_box, x + w, y + h));
                path.line_to(to_page(&m, page_box, x, y + h));
                path.close();
            }
            "h" => path.close(),
            "s" | "b" | "b*" => {
                path.close();
                edges.extend(path.take().into_iter().filter_map(|(a, b)| Edge::from_points(a, b)));
            }
            "S" | "f" | "F" | "f*" | "B" | "B*" => {
                edges.extend(path.take().into_iter().filter_map(|(a, b)| Edge::from_points(a, b)));
            }
            "n" => {
                path.take();
            }
            _ => {}
        }
    }

    edges
}
