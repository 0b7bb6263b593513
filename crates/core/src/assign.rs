//! Brick replacement: native text blocks patch the provisional table text.
//!
//! The table geometry decides *where* a cell is; the native text layer
//! decides *what* it says.  Each numeric block is routed to the cell that
//! contains its centroid and merged through the [`MergePolicy`].

use std::sync::OnceLock;

use pdf::{Table, TextBlock};
use regex::Regex;
use serde::Serialize;

use crate::cell::{CellGrid, CellId};
use crate::merge::MergePolicy;

/// Only blocks holding at least one decimal digit take part.
pub fn is_assignable(text: &str) -> bool {
    static DIGIT: OnceLock<Regex> = OnceLock::new();
    DIGIT
        .get_or_init(|| Regex::new(r"\d").unwrap())
        .is_match(text)
}

/// First cell, table-major then row-major, whose rectangle contains the
/// point under half-open containment.
pub fn locate_cell(tables: &[Table], x: f32, y: f32) -> Option<CellId> {
    for (t, table) in tables.iter().enumerate() {
        for (r, row) in table.rows.iter().enumerate() {
            for (c, cell) in row.cells.iter().enumerate() {
                if matches!(cell, Some(rect) if rect.contains_point(x, y)) {
                    return Some(CellId::new(t, r, c));
                }
            }
        }
    }
    None
}

/// Outcome of one brick-replacement pass over a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectionReport {
    /// Corrected text, `tables[t][r][c]`.
    pub tables: Vec<Vec<Vec<Option<String>>>>,
    /// Blocks merged into a cell.
    pub corrections: usize,
    /// Blocks skipped because they hold no digit.
    pub skipped: usize,
    /// Numeric blocks whose centroid fell outside every cell.
    pub unplaced: usize,
}

/// Route every numeric block to its cell and merge it.  Blocks are applied
/// in the order given, which is content-stream order.
pub fn correct_tables(
    tables: &[Table],
    provisional: Vec<Vec<Vec<Option<String>>>>,
    blocks: &[TextBlock],
    policy: &MergePolicy,
) -> CorrectionReport {
    let mut grid = CellGrid::from_text(provisional);
    let mut report = CorrectionReport::default();

    for block in blocks {
        if !is_assignable(&block.text) {
            report.skipped += 1;
            continue;
        }

        let (cx, cy) = block.bbox.center();
        let Some(cell) = locate_cell(tables, cx, cy).and_then(|id| grid.get_mut(id)) else {
            report.unplaced += 1;
            continue;
        };

        policy.resolve(cell, &block.text);
        report.corrections += 1;
    }

    report.tables = grid.to_text();
    report
}
