use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use colored::Colorize;
use customs_grid_core::group::{Group, GroupSettings};
use customs_grid_core::luminance::DEFAULT_THRESHOLD;
use customs_grid_core::template::{parser_for, FormKind, LineItem};
use customs_grid_core::warning::PageWarning;
use indicatif::{ProgressBar, ProgressStyle};
use pdf::{CorrectionRule, PageRasterizer, PdfError, RasterPage, DEFAULT_DPI};
use serde::Serialize;

use crate::ocr::{default_factory, WorkItem, WorkerPool};
use crate::pipeline::{plan_pages, select_pages, GridOptions, PagePlan, Source};
use crate::prelude::{println, *};

pub const GROUPS_FILE: &str = "all_pages_groups_text.json";

#[derive(Debug, clap::Args)]
pub struct App {
    /// Path to the PDF file
    pdf_path: PathBuf,

    /// Output directory (default: `<pdf dir>/<pdf stem>_table_groups_text`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pages to process, 1-based (default: all)
    #[arg(short, long, num_args = 1..)]
    pages: Vec<usize>,

    /// Rows per line item (default: 4 for import forms, 8 for export forms)
    #[arg(long, env = "CUSTOMS_GRID_GROUP_SIZE")]
    group_size: Option<usize>,

    /// OCR language (e.g. 'en', 'th', 'ch')
    #[arg(long, env = "CUSTOMS_GRID_LANG", default_value = "en")]
    lang: String,

    /// Worker count, capped at 8
    #[arg(long, env = "CUSTOMS_GRID_PROCESSES", default_value_t = 4)]
    processes: usize,

    /// Do not write JSON output files
    #[arg(long)]
    no_json: bool,

    /// Luminance threshold (0-255); only darker pixels reach OCR
    #[arg(long, env = "CUSTOMS_GRID_COLOR_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    color_threshold: u8,

    /// Rendering resolution
    #[arg(long, default_value_t = DEFAULT_DPI)]
    dpi: f32,

    /// Patch table text from the native text layer before grouping
    #[arg(long)]
    correct: bool,

    /// Form template (e.g. TianShi, LSS, HLS, OLC, SNP)
    #[arg(long, env = "CUSTOMS_GRID_TEMPLATE")]
    template: Option<String>,

    /// Form kind
    #[arg(long, default_value = "import")]
    kind: FormKind,

    /// Also write `<stem>_line_items.json` parsed with the template
    #[arg(long, requires = "template")]
    items: bool,
}

/// Persisted run result: groups per 0-based page.
pub type PageGroups = BTreeMap<usize, Vec<Group>>;

#[derive(Debug, Serialize)]
struct Summary<'a> {
    pages: usize,
    groups: usize,
    warnings: &'a [PageWarning],
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let factory = default_factory().map_err(|e| Error::NoOcrBackend(e.to_string()))?;

    let parser = app
        .template
        .as_deref()
        .map(|t| parser_for(app.kind, t))
        .transpose()?;
    let profile = parser.as_ref().map(|p| p.profile().clone());

    let group_size = app.group_size.unwrap_or_else(|| app.kind.group_size());
    let group_settings = GroupSettings::new(group_size)?;
    let correct = app.correct || profile.as_ref().is_some_and(|p| p.brick_replacement);

    let grid_options = GridOptions {
        correction: correct.then(CorrectionRule::default),
        ..GridOptions::default()
    };

    if global.verbose {
        println!("group size: {}", group_size);
        println!("brick replacement: {}", correct);
        if let Some(profile) = &profile {
            println!("template: {} ({})", profile.template, profile.kind);
        }
    }

    let path = app.pdf_path.clone();
    let pages = app.pages.clone();
    let lang = app.lang.clone();
    let threshold = app.color_threshold;
    let dpi = app.dpi;
    let library = global.pdfium_library.clone();

    let (source_stem, output_dir, items, warnings) = tokio::task::spawn_blocking(move || {
        prepare(
            &path,
            &pages,
            &lang,
            threshold,
            dpi,
            library.as_deref(),
            &grid_options,
            &group_settings,
        )
    })
    .await
    .map_err(|e| Error::Worker(e.to_string()))??;

    let output_dir = app.output.clone().unwrap_or(output_dir);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .map_err(|e| eyre!(e))?,
    );
    bar.set_message(f!("{} pages", items.len()));

    let pool = WorkerPool::new(app.processes, factory);
    let groups = pool.run(items, Some(&bar)).await?;
    bar.finish_and_clear();

    if !app.no_json && !groups.is_empty() {
        let file = write_groups(&output_dir, &groups)?;
        log::info!("groups written to {}", file.display());
    }

    if let Some(parser) = &parser {
        let line_items: Vec<LineItem> = groups
            .iter()
            .flat_map(|(page, gs)| gs.iter().map(|g| parser.parse_group(*page, g)))
            .collect();
        log::info!("{} line items parsed", line_items.len());

        if app.items && !app.no_json {
            let file = output_dir.join(f!("{}_line_items.json", source_stem));
            write_json(&file, &line_items)?;
            log::info!("line items written to {}", file.display());
        }
    }

    print_summary(&groups, &warnings);

    if global.verbose {
        let summary = Summary {
            pages: groups.len(),
            groups: groups.values().map(Vec::len).sum(),
            warnings: &warnings,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

/// Load, plan and rasterize.  Runs on a blocking thread.
#[allow(clippy::too_many_arguments)]
fn prepare(
    path: &Path,
    pages: &[usize],
    lang: &str,
    threshold: u8,
    dpi: f32,
    library: Option<&Path>,
    grid_options: &GridOptions,
    group_settings: &GroupSettings,
) -> Result<(String, PathBuf, Vec<WorkItem>, Vec<PageWarning>)> {
    let source = Source::open(path)?;
    let selected = select_pages(pages, source.page_count());
    if selected.is_empty() {
        return Err(Error::NoPagesSelected(source.page_count()).into());
    }

    let (planned, mut warnings) = plan_pages(&source, &selected, grid_options, group_settings)?;

    let items = if planned.is_empty() {
        Vec::new()
    } else {
        let rasterizer = PageRasterizer::new(library, dpi).map_err(|e| eyre!(e))?;
        let to_render: Vec<usize> = planned.iter().map(|p| p.grid.page).collect();
        log::info!("rendering {} pages at {} dpi", to_render.len(), rasterizer.dpi());
        let rasters = rasterizer
            .render_pages(&source.bytes, &to_render)
            .map_err(|e| eyre!(e))?;

        queue_pages(planned, rasters, lang, threshold, &mut warnings)
    };

    Ok((source.stem(), source.default_output_dir(), items, warnings))
}

/// Pair planned pages with their rasters.  A page that failed to render is
/// dropped with a warning; its neighbours are still queued.
fn queue_pages(
    planned: Vec<PagePlan>,
    rasters: Vec<(usize, std::result::Result<RasterPage, PdfError>)>,
    lang: &str,
    threshold: u8,
    warnings: &mut Vec<PageWarning>,
) -> Vec<WorkItem> {
    let mut items = Vec::with_capacity(planned.len());

    for (plan, (page, raster)) in planned.into_iter().zip(rasters) {
        let raster = match raster {
            Ok(raster) => raster,
            Err(e) => {
                let warning = PageWarning::render_failure(page, e);
                log::warn!("{}", warning);
                warnings.push(warning);
                continue;
            }
        };

        log::info!("page {}: {} groups queued", page + 1, plan.plans.len());
        items.push(WorkItem {
            page,
            lang: lang.to_string(),
            image: raster.image,
            scale: raster.scale,
            cells: plan.grid.first_table_cells(),
            plans: plan.plans,
            threshold,
        });
    }

    items
}

/// Write `all_pages_groups_text.json` into `dir`, creating it if needed.
pub fn write_groups(dir: &Path, groups: &PageGroups) -> Result<PathBuf> {
    let file = dir.join(GROUPS_FILE);
    write_json(&file, groups)?;
    Ok(file)
}

fn write_json<T: Serialize + ?Sized>(file: &Path, value: &T) -> Result<()> {
    if let Some(dir) = file.parent() {
        std::fs::create_dir_all(dir).wrap_err_with(|| f!("cannot create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(file, json).wrap_err_with(|| f!("cannot write {}", file.display()))?;
    Ok(())
}

fn print_summary(groups: &PageGroups, warnings: &[PageWarning]) {
    let mut table = new_table();
    table.add_row(prettytable::row!["Page".bold().cyan(), "Groups".bold().cyan()]);
    for (page, gs) in groups {
        table.add_row(prettytable::row![(page + 1).to_string().green(), gs.len()]);
    }
    table.printstd();

    for warning in warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    println!(
        "{} pages, {} groups",
        groups.len(),
        groups.values().map(Vec::len).sum::<usize>()
    );
}
