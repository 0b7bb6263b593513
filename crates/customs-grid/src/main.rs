use crate::prelude::*;
use clap::Parser;

mod correct;
mod error;
mod extract;
mod ocr;
mod pipeline;
mod prelude;
mod tables;
mod templates;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Cell-level table extraction for customs declaration PDFs"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Directory holding the PDFium shared library
    #[clap(long, env = "PDFIUM_LIBRARY_PATH", global = true)]
    pdfium_library: Option<std::path::PathBuf>,

    /// Whether to display additional information.
    #[clap(long, env = "CUSTOMS_GRID_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// OCR the line-item groups of every page
    Extract(crate::extract::App),

    /// Patch one page's table text from the native text layer
    Correct(crate::correct::App),

    /// Show the table geometry located on a page
    Tables(crate::tables::App),

    /// List supported form templates
    Templates(crate::templates::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();

    let level = if app.global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    color_eyre::install()?;

    match app.command {
        SubCommands::Extract(sub_app) => crate::extract::run(sub_app, app.global).await,
        SubCommands::Correct(sub_app) => crate::correct::run(sub_app, app.global).await,
        SubCommands::Tables(sub_app) => crate::tables::run(sub_app, app.global).await,
        SubCommands::Templates(sub_app) => crate::templates::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
