//! Slicing a table's rows into line-item groups.
//!
//! A customs line item spans a fixed number of physical rows.  Items start
//! at the first *anchor row*, whose first cell begins with the item number
//! on its own line (`"12\n..."`) or carries the Thai item marker
//! (`รายการ`, optionally spaced).  Rows above the anchor are header.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GridError;

pub const IMPORT_GROUP_SIZE: usize = 4;
pub const EXPORT_GROUP_SIZE: usize = 8;

const DEFAULT_ANCHORS: [&str; 2] = [r"^\d+\n", r"ราย\s*การ"];

fn default_anchors() -> &'static [Regex] {
    static ANCHORS: OnceLock<Vec<Regex>> = OnceLock::new();
    ANCHORS.get_or_init(|| DEFAULT_ANCHORS.iter().map(|p| Regex::new(p).unwrap()).collect())
}

#[derive(Debug, Clone)]
pub struct GroupSettings {
    group_size: usize,
    anchors: Vec<Regex>,
}

impl Default for GroupSettings {
    fn default() -> Self {
        GroupSettings {
            group_size: IMPORT_GROUP_SIZE,
            anchors: default_anchors().to_vec(),
        }
    }
}

impl GroupSettings {
    pub fn new(group_size: usize) -> Result<Self, GridError> {
        if group_size == 0 {
            return Err(GridError::InvalidGroupSize);
        }
        Ok(GroupSettings {
            group_size,
            anchors: default_anchors().to_vec(),
        })
    }

    /// Custom anchor patterns; a row is an anchor when any pattern matches
    /// its first cell.
    pub fn with_anchors(group_size: usize, patterns: &[&str]) -> Result<Self, GridError> {
        if group_size == 0 {
            return Err(GridError::InvalidGroupSize);
        }
        let anchors = patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| GridError::InvalidAnchor(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GroupSettings {
            group_size,
            anchors,
        })
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn is_anchor(&self, first_cell: &str) -> bool {
        self.anchors.iter().any(|re| re.is_match(first_cell))
    }
}

/// A group before OCR: its position in the table and the as-extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPlan {
    /// 1-based among the groups emitted for the page.
    pub group_idx: usize,
    /// First table row of the group.
    pub start_row: usize,
    /// Number of rows, always the configured group size.
    pub row_count: usize,
    /// Per-row cell text with absent cells removed.
    pub original_rows: Vec<Vec<String>>,
}

impl GroupPlan {
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.start_row..self.start_row + self.row_count
    }

    pub fn into_group(self, rows: Vec<Vec<String>>) -> Group {
        Group {
            group_idx: self.group_idx,
            rows,
            original_rows: self.original_rows,
        }
    }
}

/// One line item: resolved rows next to the as-extracted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub group_idx: usize,
    pub rows: Vec<Vec<String>>,
    pub original_rows: Vec<Vec<String>>,
}

/// Index of the first row whose first cell is an anchor.
pub fn find_anchor_row(grid: &[Vec<Option<String>>], settings: &GroupSettings) -> Option<usize> {
    grid.iter().position(|row| {
        row.first()
            .and_then(|c| c.as_deref())
            .is_some_and(|text| settings.is_anchor(text))
    })
}

/// Cut the rows from `anchor` on into groups of exactly the configured size.
/// A trailing partial chunk is dropped, as is a chunk whose first cell is
/// absent or blank.
pub fn plan_groups(
    grid: &[Vec<Option<String>>],
    anchor: usize,
    settings: &GroupSettings,
) -> Vec<GroupPlan> {
    let size = settings.group_size();
    let mut plans = Vec::new();

    for start in (anchor..grid.len()).step_by(size) {
        if start + size > grid.len() {
            break;
        }
        let leading = grid[start].first().and_then(|c| c.as_deref());
        if !leading.is_some_and(|t| !t.trim().is_empty()) {
            continue;
        }

        plans.push(GroupPlan {
            group_idx: plans.len() + 1,
            start_row: start,
            row_count: size,
            original_rows: grid[start..start + size]
                .iter()
                .map(|row| row.iter().flatten().cloned().collect())
                .collect(),
        });
    }

    plans
}

/// Anchor search and partition in one step.  `None` when the table has no
/// anchor row.
pub fn build_group_plans(
    grid: &[Vec<Option<String>>],
    settings: &GroupSettings,
) -> Option<Vec<GroupPlan>> {
    find_anchor_row(grid, settings).map(|anchor| plan_groups(grid, anchor, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: Option<&str>) -> Vec<Option<String>> {
        vec![first.map(String::from), None, Some("x".into())]
    }

    fn grid(total: usize, anchor: usize) -> Vec<Vec<Option<String>>> {
        (0..total)
            .map(|i| {
                if i == anchor {
                    row(Some("1\nITEM"))
                } else {
                    row(Some(&format!("r{}", i)))
                }
            })
            .collect()
    }

    // ============================================================================
    // Anchors
    // ============================================================================

    #[test]
    fn test_numeric_anchor_needs_newline() {
        let s = GroupSettings::default();
        assert!(s.is_anchor("12\nSOMETHING"));
        assert!(!s.is_anchor("12 SOMETHING"));
        assert!(!s.is_anchor("NO.\n12"));
    }

    #[test]
    fn test_thai_anchor_allows_spacing() {
        let s = GroupSettings::default();
        assert!(s.is_anchor("รายการ"));
        assert!(s.is_anchor("ลำดับ ราย การ ที่"));
        assert!(!s.is_anchor("ราคา"));
    }

    #[test]
    fn test_find_anchor_row_skips_absent_first_cells() {
        let mut g = grid(6, 3);
        g[1][0] = None;
        assert_eq!(find_anchor_row(&g, &GroupSettings::default()), Some(3));
    }

    #[test]
    fn test_no_anchor() {
        let g: Vec<_> = (0..5).map(|_| row(Some("header"))).collect();
        assert_eq!(build_group_plans(&g, &GroupSettings::default()), None);
    }

    #[test]
    fn test_zero_group_size_is_rejected() {
        assert_eq!(GroupSettings::new(0).unwrap_err(), GridError::InvalidGroupSize);
    }

    #[test]
    fn test_bad_anchor_pattern_is_rejected() {
        assert!(matches!(
            GroupSettings::with_anchors(4, &["("]),
            Err(GridError::InvalidAnchor(_))
        ));
    }

    // ============================================================================
    // Partitioning
    // ============================================================================

    #[test]
    fn test_partition_drops_trailing_partial_chunk() {
        // 13 rows, anchor on the fifth (index 4): rows 4..8 and 8..12.
        let g = grid(13, 4);
        let plans = build_group_plans(&g, &GroupSettings::default()).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].rows(), 4..8);
        assert_eq!(plans[1].rows(), 8..12);
        assert_eq!(plans[0].group_idx, 1);
        assert_eq!(plans[1].group_idx, 2);
    }

    #[test]
    fn test_export_group_size() {
        let g = grid(20, 2);
        let plans = build_group_plans(&g, &GroupSettings::new(EXPORT_GROUP_SIZE).unwrap()).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].rows(), 10..18);
    }

    #[test]
    fn test_blank_leading_cell_skips_chunk() {
        let mut g = grid(12, 0);
        g[4][0] = Some("  \n ".into());
        let plans = build_group_plans(&g, &GroupSettings::default()).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].start_row, 0);
        assert_eq!(plans[1].start_row, 8);
        assert_eq!(plans[1].group_idx, 2);
    }

    #[test]
    fn test_absent_leading_cell_skips_chunk() {
        let mut g = grid(8, 0);
        g[4][0] = None;
        let plans = build_group_plans(&g, &GroupSettings::default()).unwrap();
        assert_eq!(plans.len(), 1);
    }

    #[test]
    fn test_original_rows_drop_absent_cells() {
        let g = grid(4, 0);
        let plans = build_group_plans(&g, &GroupSettings::default()).unwrap();
        assert_eq!(plans[0].original_rows[0], vec!["1\nITEM".to_string(), "x".to_string()]);
        assert!(plans[0].original_rows.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_into_group_keeps_index_and_originals() {
        let plan = build_group_plans(&grid(4, 0), &GroupSettings::default()).unwrap().remove(0);
        let originals = plan.original_rows.clone();
        let group = plan.into_group(vec![vec!["ocr".into()]]);
        assert_eq!(group.group_idx, 1);
        assert_eq!(group.rows, vec![vec!["ocr".to_string()]]);
        assert_eq!(group.original_rows, originals);
    }
}
