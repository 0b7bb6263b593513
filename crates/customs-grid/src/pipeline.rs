//! Sequential page preparation: geometry, native text and group planning.
//!
//! Everything here is cheap compared to OCR and runs on one thread before
//! the pool starts.

use std::path::{Path, PathBuf};

use customs_grid_core::assign::{correct_tables, CorrectionReport};
use customs_grid_core::group::{build_group_plans, GroupPlan, GroupSettings};
use customs_grid_core::merge::MergePolicy;
use customs_grid_core::warning::PageWarning;
use pdf::{CorrectionRule, PdfDocument, Table, TableSettings};

use crate::prelude::*;

/// A PDF loaded into memory.
pub struct Source {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub document: PdfDocument,
}

impl Source {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).wrap_err_with(|| f!("cannot read {}", path.display()))?;
        let document = PdfDocument::from_bytes(&bytes)
            .map_err(|e| eyre!(e))
            .wrap_err_with(|| f!("cannot parse {}", path.display()))?;

        if document.page_count() == 0 {
            return Err(Error::NoPages(path.display().to_string()).into());
        }

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            document,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    /// File name without extension, used to name output files.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// `<pdf dir>/<stem>_table_groups_text`.
    pub fn default_output_dir(&self) -> PathBuf {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        dir.join(f!("{}_table_groups_text", self.stem()))
    }
}

/// Convert 1-based page numbers to 0-based indices inside the document.
/// An empty request selects every page.
pub fn select_pages(requested: &[usize], page_count: usize) -> Vec<usize> {
    if requested.is_empty() {
        return (0..page_count).collect();
    }
    requested
        .iter()
        .filter_map(|p| p.checked_sub(1))
        .filter(|p| *p < page_count)
        .collect()
}

/// How to build the text grid of a page.
#[derive(Debug, Clone, Default)]
pub struct GridOptions {
    pub tables: TableSettings,
    /// Brick replacement with this glyph correction, when set.
    pub correction: Option<CorrectionRule>,
    pub policy: MergePolicy,
}

/// Located tables of a page and their cell text.
#[derive(Debug, Clone)]
pub struct PageGrid {
    pub page: usize,
    pub tables: Vec<Table>,
    /// `text[t][r][c]`, corrected when brick replacement ran.
    pub text: Vec<Vec<Vec<Option<String>>>>,
    pub report: Option<CorrectionReport>,
}

impl PageGrid {
    /// Cell rectangles of the first table, the one line items live in.
    pub fn first_table_cells(&self) -> Vec<Vec<Option<pdf::Rect>>> {
        self.tables
            .first()
            .map(|t| t.rows.iter().map(|r| r.cells.clone()).collect())
            .unwrap_or_default()
    }
}

/// Locate tables and build their text.  `Ok(None)` when the page has no
/// table.
pub fn page_grid(source: &Source, page: usize, options: &GridOptions) -> Result<Option<PageGrid>> {
    let content = source.document.page(page).map_err(|e| eyre!(e))?;

    let tables = content.find_tables(&options.tables);
    if tables.is_empty() {
        return Ok(None);
    }

    let glyphs = content.glyphs();
    let provisional: Vec<_> = tables
        .iter()
        .map(|t| t.extract(&glyphs, &options.tables))
        .collect();

    let (text, report) = match &options.correction {
        Some(rule) => {
            let blocks = content.text_blocks(rule);
            let report = correct_tables(&tables, provisional, &blocks, &options.policy);
            log::debug!(
                "page {}: {} corrections, {} blocks without digits, {} outside every cell",
                page + 1,
                report.corrections,
                report.skipped,
                report.unplaced
            );
            (report.tables.clone(), Some(report))
        }
        None => (provisional, None),
    };

    Ok(Some(PageGrid {
        page,
        tables,
        text,
        report,
    }))
}

/// A page ready for OCR.
#[derive(Debug, Clone)]
pub struct PagePlan {
    pub grid: PageGrid,
    pub plans: Vec<GroupPlan>,
}

/// Grid and group plans for every selected page.  Pages that miss are
/// reported as warnings and skipped.
pub fn plan_pages(
    source: &Source,
    pages: &[usize],
    options: &GridOptions,
    groups: &GroupSettings,
) -> Result<(Vec<PagePlan>, Vec<PageWarning>)> {
    let mut planned = Vec::new();
    let mut warnings = Vec::new();

    for &page in pages {
        log::info!("preparing page {}", page + 1);

        let Some(grid) = page_grid(source, page, options)? else {
            let warning = PageWarning::structural_miss(page);
            log::warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        let Some(plans) = grid.text.first().and_then(|t| build_group_plans(t, groups)) else {
            let warning = PageWarning::anchor_miss(page);
            log::warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        if plans.is_empty() {
            log::debug!("page {}: anchor found but no complete group", page + 1);
            continue;
        }

        planned.push(PagePlan { grid, plans });
    }

    Ok((planned, warnings))
}
