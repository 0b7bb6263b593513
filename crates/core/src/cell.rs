//! The resolved cell grid.
//!
//! A [`CellGrid`] starts from the provisional text of every located table
//! and only changes through [`crate::merge::MergePolicy::resolve`].  Absent
//! cells (`None` in the table geometry) stay absent for the whole run.

use serde::{Deserialize, Serialize};

/// Address of a cell on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub table: usize,
    pub row: usize,
    pub column: usize,
}

impl CellId {
    pub fn new(table: usize, row: usize, column: usize) -> Self {
        CellId { table, row, column }
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}r{}c{}", self.table, self.row, self.column)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    final_text: String,
    write_count: u32,
}

impl Cell {
    /// A cell holding its as-extracted text and no writes yet.
    pub fn provisional(text: impl Into<String>) -> Self {
        Cell {
            final_text: text.into(),
            write_count: 0,
        }
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.final_text = text;
    }

    pub(crate) fn append_line(&mut self, text: &str) {
        self.final_text.push('\n');
        self.final_text.push_str(text);
    }

    pub(crate) fn bump(&mut self) {
        self.write_count += 1;
    }
}

/// Rows of optional cells for one table.
pub type CellRows = Vec<Vec<Option<Cell>>>;

/// Every table of a page, addressable by [`CellId`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellGrid {
    tables: Vec<CellRows>,
}

impl CellGrid {
    /// Build a grid from as-extracted table text (`tables[t][r][c]`).
    pub fn from_text(tables: Vec<Vec<Vec<Option<String>>>>) -> Self {
        let tables = tables
            .into_iter()
            .map(|rows| {
                rows.into_iter()
                    .map(|row| row.into_iter().map(|c| c.map(Cell::provisional)).collect())
                    .collect()
            })
            .collect();
        CellGrid { tables }
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.tables
            .get(id.table)?
            .get(id.row)?
            .get(id.column)?
            .as_ref()
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.tables
            .get_mut(id.table)?
            .get_mut(id.row)?
            .get_mut(id.column)?
            .as_mut()
    }

    /// The grid back as plain text, same shape as [`CellGrid::from_text`].
    pub fn to_text(&self) -> Vec<Vec<Vec<Option<String>>>> {
        self.tables
            .iter()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.iter()
                            .map(|c| c.as_ref().map(|c| c.final_text().to_string()))
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }
}
