//! Lattice table detection from ruling lines.
//!
//! ```text
//! Edge[] -> prefilter -> snap -> join -> filter -> intersections -> cells -> tables
//! ```
//!
//! Cells are the smallest rectangles whose four corners are intersections
//! connected by ruling lines.  Cells sharing a corner belong to the same
//! table.  Rows are laid out against the sorted set of distinct cell left
//! edges, so a row whose cells span several columns gets `None` for the
//! covered positions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::geometry::{Edge, Orientation};
use crate::{Glyph, Rect};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tolerances for the lattice table finder, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    /// Parallel edges closer than this are snapped to a common position.
    pub snap_tolerance: f32,
    /// Collinear edges with gaps up to this are joined into one.
    pub join_tolerance: f32,
    /// Edges shorter than this are discarded after merging.
    pub edge_min_length: f32,
    /// Edges shorter than this are discarded before merging.
    pub edge_min_length_prefilter: f32,
    /// How far apart a horizontal and a vertical edge may be and still cross.
    pub intersection_tolerance: f32,
    /// Line clustering tolerance when rebuilding cell text.
    pub text_y_tolerance: f32,
    /// Horizontal gap above which a space separates glyphs in cell text.
    pub text_x_tolerance: f32,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            edge_min_length: 3.0,
            edge_min_length_prefilter: 1.0,
            intersection_tolerance: 3.0,
            text_y_tolerance: 3.0,
            text_x_tolerance: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// One row of a [`Table`]; `None` marks a column position no cell starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<Option<Rect>>,
}

/// A detected table: its cells and their row layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub cells: Vec<Rect>,
    pub rows: Vec<TableRow>,
}

impl Table {
    /// Build a table from its cells, computing the row layout.
    pub fn from_cells(cells: Vec<Rect>) -> Self {
        let rows = rows_from_cells(&cells);
        Table { cells, rows }
    }

    pub fn bbox(&self) -> Option<Rect> {
        self.cells.iter().copied().reduce(|a, b| a.union(&b))
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(|r| r.cells.len()).unwrap_or(0)
    }

    /// Rebuild each cell's text from the page glyphs whose centres fall
    /// inside it.  Empty cells give `Some("")`; absent cells stay `None`.
    pub fn extract(&self, glyphs: &[Glyph], settings: &TableSettings) -> Vec<Vec<Option<String>>> {
        self.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .map(|cell| {
                        cell.map(|rect| {
                            let inside: Vec<&Glyph> = glyphs
                                .iter()
                                .filter(|g| {
                                    let (cx, cy) = g.bbox.center();
                                    rect.contains_point(cx, cy)
                                })
                                .collect();
                            glyphs_to_text(&inside, settings)
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Find every lattice table on a page, ordered top-to-bottom then
/// left-to-right by their top-left cell.  Single-cell tables are dropped.
pub fn find_tables(edges: &[Edge], settings: &TableSettings) -> Vec<Table> {
    let prefiltered: Vec<Edge> = edges
        .iter()
        .filter(|e| e.length() >= settings.edge_min_length_prefilter)
        .copied()
        .collect();
    let merged: Vec<Edge> = merge_edges(prefiltered, settings)
        .into_iter()
        .filter(|e| e.length() >= settings.edge_min_length)
        .collect();

    let intersections = edges_to_intersections(&merged, settings.intersection_tolerance);
    let cells = intersections_to_cells(&intersections);
    cells_to_tables(cells)
        .into_iter()
        .map(Table::from_cells)
        .collect()
}

// ---------------------------------------------------------------------------
// Edge merging
// ---------------------------------------------------------------------------

/// Snap parallel edges together, then join collinear neighbours.
pub fn merge_edges(edges: Vec<Edge>, settings: &TableSettings) -> Vec<Edge> {
    let (mut h, mut v): (Vec<Edge>, Vec<Edge>) = edges
        .into_iter()
        .partition(|e| e.orientation == Orientation::Horizontal);

    snap(&mut h, settings.snap_tolerance, |e| e.top, |e, y| {
        e.top = y;
        e.bottom = y;
    });
    snap(&mut v, settings.snap_tolerance, |e| e.x0, |e, x| {
        e.x0 = x;
        e.x1 = x;
    });

    let mut out = join(h, settings.join_tolerance, |e| e.top, |e| (e.x0, e.x1), |e, end| {
        e.x1 = end
    });
    out.extend(join(v, settings.join_tolerance, |e| e.x0, |e| (e.top, e.bottom), |e, end| {
        e.bottom = end
    }));
    out
}

/// Cluster edges by position (chaining values within `tolerance`) and move
/// every member to its cluster's mean.
fn snap(
    edges: &mut [Edge],
    tolerance: f32,
    pos: impl Fn(&Edge) -> f32,
    set: impl Fn(&mut Edge, f32),
) {
    if edges.is_empty() {
        return;
    }
    edges.sort_by(|a, b| pos(a).total_cmp(&pos(b)));

    let mut start = 0;
    for i in 1..=edges.len() {
        let breaks = i == edges.len() || pos(&edges[i]) - pos(&edges[i - 1]) > tolerance;
        if breaks {
            let cluster = &mut edges[start..i];
            let mean = cluster.iter().map(&pos).sum::<f32>() / cluster.len() as f32;
            for e in cluster.iter_mut() {
                set(e, mean);
            }
            start = i;
        }
    }
}

/// Within each group of edges at the same position, merge runs whose gap
/// is at most `tolerance`.
fn join(
    mut edges: Vec<Edge>,
    tolerance: f32,
    pos: impl Fn(&Edge) -> f32,
    span: impl Fn(&Edge) -> (f32, f32),
    extend: impl Fn(&mut Edge, f32),
) -> Vec<Edge> {
    edges.sort_by(|a, b| {
        pos(a)
            .total_cmp(&pos(b))
            .then(span(a).0.total_cmp(&span(b).0))
    });

    let mut out: Vec<Edge> = Vec::with_capacity(edges.len());
    for e in edges {
        if let Some(last) = out.last_mut() {
            if pos(last) == pos(&e) && span(&e).0 <= span(last).1 + tolerance {
                let end = span(last).1.max(span(&e).1);
                extend(last, end);
                continue;
            }
        }
        out.push(e);
    }
    out
}

// ---------------------------------------------------------------------------
// Intersections and cells
// ---------------------------------------------------------------------------

type PointKey = (u32, u32);

fn key(x: f32, y: f32) -> PointKey {
    (x.to_bits(), y.to_bits())
}

/// Where a vertical and a horizontal edge cross, with the indices of the
/// edges passing through that point.
#[derive(Debug, Default)]
pub struct Intersections {
    points: Vec<(f32, f32)>,
    by_key: HashMap<PointKey, (Vec<usize>, Vec<usize>)>,
}

impl Intersections {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn contains(&self, p: (f32, f32)) -> bool {
        self.by_key.contains_key(&key(p.0, p.1))
    }

    /// Two points on the same vertical (or horizontal) share an edge.
    fn connected(&self, a: (f32, f32), b: (f32, f32)) -> bool {
        let (Some(ea), Some(eb)) = (self.by_key.get(&key(a.0, a.1)), self.by_key.get(&key(b.0, b.1)))
        else {
            return false;
        };
        if a.0 == b.0 {
            ea.0.iter().any(|i| eb.0.contains(i))
        } else if a.1 == b.1 {
            ea.1.iter().any(|i| eb.1.contains(i))
        } else {
            false
        }
    }
}

pub fn edges_to_intersections(edges: &[Edge], tolerance: f32) -> Intersections {
    let mut out = Intersections::default();

    let horizontals: Vec<(usize, &Edge)> = edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.orientation == Orientation::Horizontal)
        .collect();

    for (vi, v) in edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.orientation == Orientation::Vertical)
    {
        for (hi, h) in &horizontals {
            let crosses = v.top <= h.top + tolerance
                && v.bottom >= h.top - tolerance
                && v.x0 >= h.x0 - tolerance
                && v.x0 <= h.x1 + tolerance;
            if !crosses {
                continue;
            }
            let k = key(v.x0, h.top);
            if !out.by_key.contains_key(&k) {
                out.points.push((v.x0, h.top));
            }
            let entry = out.by_key.entry(k).or_default();
            entry.0.push(vi);
            entry.1.push(*hi);
        }
    }

    out.points
        .sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    out
}

/// For every intersection, find the smallest cell that has it as its
/// top-left corner.
pub fn intersections_to_cells(intersections: &Intersections) -> Vec<Rect> {
    let points = &intersections.points;
    let mut cells = Vec::new();

    for (i, &pt) in points.iter().enumerate() {
        let rest = &points[i + 1..];
        let below: Vec<(f32, f32)> = rest.iter().copied().filter(|p| p.0 == pt.0).collect();
        let right: Vec<(f32, f32)> = rest.iter().copied().filter(|p| p.1 == pt.1).collect();

        'search: for &b in &below {
            if !intersections.connected(pt, b) {
                continue;
            }
            for &r in &right {
                if !intersections.connected(pt, r) {
                    continue;
                }
                let corner = (r.0, b.1);
                if intersections.contains(corner)
                    && intersections.connected(corner, r)
                    && intersections.connected(corner, b)
                {
                    cells.push(Rect::new(pt.0, pt.1, corner.0, corner.1));
                    break 'search;
                }
            }
        }
    }

    cells
}

fn corners(r: &Rect) -> [PointKey; 4] {
    [
        key(r.x0, r.top),
        key(r.x0, r.bottom),
        key(r.x1, r.top),
        key(r.x1, r.bottom),
    ]
}

/// Group cells that share corners into tables, sorted by their top-left
/// cell, dropping tables made of a single cell.
pub fn cells_to_tables(cells: Vec<Rect>) -> Vec<Vec<Rect>> {
    let mut remaining = cells;
    let mut tables: Vec<Vec<Rect>> = Vec::new();

    while !remaining.is_empty() {
        let mut current = vec![remaining.remove(0)];
        let mut current_corners: HashSet<PointKey> = corners(&current[0]).into_iter().collect();

        loop {
            let before = current.len();
            let mut idx = 0;
            while idx < remaining.len() {
                let c = corners(&remaining[idx]);
                if c.iter().any(|k| current_corners.contains(k)) {
                    current_corners.extend(c);
                    current.push(remaining.remove(idx));
                } else {
                    idx += 1;
                }
            }
            if current.len() == before {
                break;
            }
        }
        tables.push(current);
    }

    let top_left = |t: &Vec<Rect>| {
        t.iter()
            .map(|c| (c.top, c.x0))
            .reduce(|a, b| if (b.0, b.1) < (a.0, a.1) { b } else { a })
            .unwrap_or((f32::MAX, f32::MAX))
    };
    tables.sort_by(|a, b| {
        let (ta, tb) = (top_left(a), top_left(b));
        ta.0.total_cmp(&tb.0).then(ta.1.total_cmp(&tb.1))
    });
    tables.retain(|t| t.len() > 1);
    tables
}

/// Lay cells out in rows keyed by `top`, against the sorted distinct `x0`
/// values of the whole table.
pub fn rows_from_cells(cells: &[Rect]) -> Vec<TableRow> {
    let mut xs: Vec<f32> = cells.iter().map(|c| c.x0).collect();
    xs.sort_by(f32::total_cmp);
    xs.dedup();

    let mut sorted: Vec<Rect> = cells.to_vec();
    sorted.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x0.total_cmp(&b.x0)));

    let mut rows: Vec<TableRow> = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let top = sorted[i].top;
        let mut by_x: HashMap<u32, Rect> = HashMap::new();
        while i < sorted.len() && sorted[i].top == top {
            by_x.insert(sorted[i].x0.to_bits(), sorted[i]);
            i += 1;
        }
        rows.push(TableRow {
            cells: xs.iter().map(|x| by_x.get(&x.to_bits()).copied()).collect(),
        });
    }
    rows
}

// ---------------------------------------------------------------------------
// Cell text
// ---------------------------------------------------------------------------

/// Cluster glyphs into lines by `top`, order each line left to right, and
/// join lines with `\n`.
fn glyphs_to_text(glyphs: &[&Glyph], settings: &TableSettings) -> String {
    let mut sorted: Vec<&Glyph> = glyphs.to_vec();
    sorted.sort_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top));

    let mut lines: Vec<Vec<&Glyph>> = Vec::new();
    for g in sorted {
        match lines.last_mut() {
            Some(line) if g.bbox.top - line[line.len() - 1].bbox.top <= settings.text_y_tolerance => {
                line.push(g);
                continue;
            }
            _ => {}
        }
        lines.push(vec![g]);
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
            let mut text = String::new();
            let mut prev_x1: Option<f32> = None;
            for g in line {
                if let Some(x1) = prev_x1 {
                    if g.bbox.x0 - x1 > settings.text_x_tolerance && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
                text.push(g.ch);
                prev_x1 = Some(g.bbox.x1);
            }
            text.trim().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A ruled grid: `xs` vertical lines spanning `ys`, and vice versa.
    fn grid(xs: &[f32], ys: &[f32]) -> Vec<Edge> {
        let (top, bottom) = (ys[0], ys[ys.len() - 1]);
        let (left, right) = (xs[0], xs[xs.len() - 1]);
        let mut edges: Vec<Edge> = xs.iter().map(|&x| Edge::vertical(x, top, bottom)).collect();
        edges.extend(ys.iter().map(|&y| Edge::horizontal(left, right, y)));
        edges
    }

    fn glyph(ch: char, x: f32, top: f32) -> Glyph {
        Glyph {
            ch,
            bbox: Rect::new(x, top, x + 5.0, top + 10.0),
        }
    }

    #[test]
    fn test_simple_grid_rows_and_columns() {
        let edges = grid(&[0.0, 50.0, 100.0, 150.0], &[0.0, 20.0, 40.0]);
        let tables = find_tables(&edges, &TableSettings::default());
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.cells.len(), 6);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.column_count(), 3);
        assert_eq!(t.rows[1].cells[2], Some(Rect::new(100.0, 20.0, 150.0, 40.0)));
        assert_eq!(t.bbox(), Some(Rect::new(0.0, 0.0, 150.0, 40.0)));
    }

    #[test]
    fn test_spanning_cell_leaves_none() {
        // Top row is one wide cell; bottom row has two.
        let mut edges = vec![
            Edge::horizontal(0.0, 100.0, 0.0),
            Edge::horizontal(0.0, 100.0, 20.0),
            Edge::horizontal(0.0, 100.0, 40.0),
            Edge::vertical(0.0, 0.0, 40.0),
            Edge::vertical(100.0, 0.0, 40.0),
        ];
        edges.push(Edge::vertical(50.0, 20.0, 40.0));
        let tables = find_tables(&edges, &TableSettings::default());
        assert_eq!(tables.len(), 1);
        let rows = &tables[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells, vec![Some(Rect::new(0.0, 0.0, 100.0, 20.0)), None]);
        assert!(rows[1].cells.iter().all(Option::is_some));
    }

    #[test]
    fn test_snap_merges_near_parallel_lines() {
        // Thin filled rectangles draw each rule twice, 0.5pt apart.
        let mut edges = grid(&[0.0, 50.0, 100.0], &[0.0, 20.0]);
        edges.push(Edge::horizontal(0.0, 100.0, 0.5));
        edges.push(Edge::vertical(50.5, 0.0, 20.0));
        let tables = find_tables(&edges, &TableSettings::default());
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].cells.len(), 2);
    }

    #[test]
    fn test_join_bridges_small_gaps() {
        let edges = vec![
            Edge::horizontal(0.0, 48.0, 0.0),
            Edge::horizontal(50.0, 100.0, 0.0),
            Edge::horizontal(0.0, 100.0, 20.0),
            Edge::vertical(0.0, 0.0, 20.0),
            Edge::vertical(50.0, 0.0, 20.0),
            Edge::vertical(100.0, 0.0, 20.0),
        ];
        let merged = merge_edges(edges, &TableSettings::default());
        let horizontals: Vec<&Edge> = merged
            .iter()
            .filter(|e| e.orientation == Orientation::Horizontal)
            .collect();
        assert_eq!(horizontals.len(), 2);
        assert!(horizontals.iter().all(|e| e.x0 == 0.0 && e.x1 == 100.0));
    }

    #[test]
    fn test_short_edges_are_filtered() {
        let mut edges = grid(&[0.0, 50.0, 100.0], &[0.0, 20.0]);
        edges.push(Edge::vertical(75.0, 0.0, 2.0));
        let tables = find_tables(&edges, &TableSettings::default());
        assert_eq!(tables[0].cells.len(), 2);
    }

    #[test]
    fn test_single_cell_table_dropped() {
        let edges = grid(&[0.0, 100.0], &[0.0, 20.0]);
        assert!(find_tables(&edges, &TableSettings::default()).is_empty());
    }

    #[test]
    fn test_separate_tables_sorted_top_down() {
        let mut edges = grid(&[0.0, 50.0, 100.0], &[300.0, 320.0]);
        edges.extend(grid(&[0.0, 50.0, 100.0], &[10.0, 30.0]));
        let tables = find_tables(&edges, &TableSettings::default());
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].cells[0].top, 10.0);
        assert_eq!(tables[1].cells[0].top, 300.0);
    }

    #[test]
    fn test_no_edges_no_tables() {
        assert!(find_tables(&[], &TableSettings::default()).is_empty());
    }

    #[test]
    fn test_extract_cell_text() {
        let edges = grid(&[0.0, 50.0, 100.0], &[0.0, 30.0]);
        let table = find_tables(&edges, &TableSettings::default()).remove(0);
        let glyphs = vec![
            glyph('1', 5.0, 2.0),
            glyph('0', 10.0, 2.0),
            glyph('K', 5.0, 15.0),
            glyph('G', 10.0, 15.0),
            glyph('A', 55.0, 2.0),
            glyph('B', 70.0, 2.0),
        ];
        let text = table.extract(&glyphs, &TableSettings::default());
        assert_eq!(
            text,
            vec![vec![Some("10\nKG".to_string()), Some("A B".to_string())]]
        );
    }

    #[test]
    fn test_extract_empty_and_absent_cells() {
        let table = Table::from_cells(vec![
            Rect::new(0.0, 0.0, 100.0, 20.0),
            Rect::new(0.0, 20.0, 50.0, 40.0),
            Rect::new(50.0, 20.0, 100.0, 40.0),
        ]);
        let text = table.extract(&[], &TableSettings::default());
        assert_eq!(text[0], vec![Some(String::new()), None]);
        assert_eq!(text[1], vec![Some(String::new()), Some(String::new())]);
    }
}
