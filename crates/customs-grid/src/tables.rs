use std::path::PathBuf;

use colored::Colorize;
use pdf::{Rect, TableSettings};
use serde::Serialize;

use crate::pipeline::Source;
use crate::prelude::{println, *};

#[derive(Debug, clap::Args)]
pub struct App {
    /// Path to the PDF file
    pdf_path: PathBuf,

    /// Page to inspect, 1-based
    #[arg(short, long, default_value_t = 1)]
    page: usize,

    /// Print the full cell geometry as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct TableOutput {
    index: usize,
    bbox: Option<Rect>,
    columns: usize,
    rows: Vec<Vec<Option<Rect>>>,
}

/// Print the table geometry located on a page.
pub async fn run(app: App, _global: crate::Global) -> Result<()> {
    let path = app.pdf_path.clone();
    let page = app.page;
    let tables = tokio::task::spawn_blocking(move || locate(&path, page))
        .await
        .map_err(|e| Error::Worker(e.to_string()))??;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    if tables.is_empty() {
        println!("{}", f!("page {}: no table found", app.page).yellow());
        return Ok(());
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "Table".bold().cyan(),
        "Rows".bold().cyan(),
        "Columns".bold().cyan(),
        "Bounds".bold().cyan()
    ]);
    for t in &tables {
        table.add_row(prettytable::row![
            t.index.to_string().green(),
            t.rows.len(),
            t.columns,
            t.bbox.map(|b| b.to_string()).unwrap_or_default().bright_black()
        ]);
    }
    table.printstd();

    Ok(())
}

fn locate(path: &std::path::Path, page: usize) -> Result<Vec<TableOutput>> {
    let source = Source::open(path)?;
    let index = page
        .checked_sub(1)
        .filter(|p| *p < source.page_count())
        .ok_or_else(|| eyre!("page {} out of range (1-{})", page, source.page_count()))?;

    let content = source.document.page(index).map_err(|e| eyre!(e))?;
    Ok(content
        .find_tables(&TableSettings::default())
        .iter()
        .enumerate()
        .map(|(index, t)| TableOutput {
            index,
            bbox: t.bbox(),
            columns: t.column_count(),
            rows: t.rows.iter().map(|r| r.cells.clone()).collect(),
        })
        .collect())
}
