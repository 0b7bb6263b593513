use std::path::PathBuf;

use pdf::CorrectionRule;
use serde::Serialize;

use crate::pipeline::{page_grid, GridOptions, Source};
use crate::prelude::{println, *};

#[derive(Debug, clap::Args)]
pub struct App {
    /// Path to the PDF file
    pdf_path: PathBuf,

    /// Page to correct, 1-based
    #[arg(short, long, default_value_t = 1)]
    page: usize,

    /// Corrupted character to replace
    #[arg(long, default_value_t = '\u{15}')]
    find: char,

    /// Replacement character
    #[arg(long, default_value_t = '2')]
    replace: char,
}

#[derive(Debug, Serialize)]
struct CorrectOutput {
    page: usize,
    corrections: usize,
    tables: Vec<Vec<Vec<Option<String>>>>,
}

/// Run brick replacement on one page and print the corrected tables.
pub async fn run(app: App, _global: crate::Global) -> Result<()> {
    let output = tokio::task::spawn_blocking(move || correct_page(&app))
        .await
        .map_err(|e| Error::Worker(e.to_string()))??;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn correct_page(app: &App) -> Result<CorrectOutput> {
    let source = Source::open(&app.pdf_path)?;
    let page = app
        .page
        .checked_sub(1)
        .filter(|p| *p < source.page_count())
        .ok_or_else(|| eyre!("page {} out of range (1-{})", app.page, source.page_count()))?;

    let options = GridOptions {
        correction: Some(CorrectionRule::new(app.find, app.replace)),
        ..GridOptions::default()
    };

    let Some(grid) = page_grid(&source, page, &options)? else {
        log::warn!("page {}: no table found", app.page);
        return Ok(CorrectOutput {
            page: app.page,
            corrections: 0,
            tables: vec![],
        });
    };

    Ok(CorrectOutput {
        page: app.page,
        corrections: grid.report.map(|r| r.corrections).unwrap_or_default(),
        tables: grid.text,
    })
}
