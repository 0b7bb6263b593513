use colored::Colorize;
use customs_grid_core::template::known_templates;

use crate::prelude::{println, *};

#[derive(Debug, clap::Args)]
pub struct App {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// List the supported form templates.
pub async fn run(app: App, _global: crate::Global) -> Result<()> {
    let templates = known_templates();

    if app.json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "Kind".bold().cyan(),
        "Template".bold().cyan(),
        "Group Size".bold().cyan(),
        "Brick Replacement".bold().cyan()
    ]);
    for t in &templates {
        table.add_row(prettytable::row![
            t.kind.to_string().bright_yellow(),
            t.template.bright_white(),
            t.group_size,
            if t.brick_replacement { "yes".green() } else { "no".bright_black() }
        ]);
    }
    table.printstd();

    Ok(())
}
