use chrono::{DateTime, Utc};
use clap::Args;
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, Table};
use labbox::{Instance, LabboxOptions};

use crate::cli::open_database;

#[derive(Args, Debug)]
pub struct PsArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Only print instance ids
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn execute(args: PsArgs, options: &LabboxOptions) -> anyhow::Result<()> {
    let db = open_database(options)?;
    let instances = db.list_instances()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }
    if args.quiet {
        for instance in &instances {
            println!("{}", instance.id);
        }
        return Ok(());
    }

    println!("{}", render_table(&instances));
    Ok(())
}

fn render_table(instances: &[Instance]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        "INSTANCE ID",
        "USER",
        "CHALLENGE",
        "STATUS",
        "ACCESS",
        "EXPIRES",
    ]);
    for instance in instances {
        table.add_row(vec![
            Cell::new(instance.id.short()),
            Cell::new(&instance.user_name),
            Cell::new(&instance.challenge_name),
            Cell::new(instance.status),
            Cell::new(&instance.access_url),
            Cell::new(format_millis(instance.expires_at)),
        ]);
    }
    table
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
