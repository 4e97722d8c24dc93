use std::path::PathBuf;

use clap::Args;
use labbox::LabboxOptions;
use labbox::catalog::Catalog;

use crate::cli::open_database;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Catalog file (YAML) with users, images and challenges
    pub catalog: PathBuf,
}

pub fn execute(args: ImportArgs, options: &LabboxOptions) -> anyhow::Result<()> {
    let catalog = Catalog::load(&args.catalog)?;
    let db = open_database(options)?;

    let summary = catalog.apply(&db)?;
    println!(
        "Imported {} user(s), {} image(s), {} challenge(s)",
        summary.users, summary.images, summary.challenges
    );
    Ok(())
}
