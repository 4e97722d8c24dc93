use clap::Args;
use labbox::LabboxOptions;
use labbox::runtime::{DockerRuntime, WorkloadRuntime};

use crate::cli::open_database;

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Only pull these image ids (default: every catalog image)
    pub images: Vec<String>,
}

pub async fn execute(args: PullArgs, options: &LabboxOptions) -> anyhow::Result<()> {
    let db = open_database(options)?;
    let images: Vec<_> = db
        .list_images()?
        .into_iter()
        .filter(|image| args.images.is_empty() || args.images.contains(&image.id))
        .collect();

    if images.is_empty() {
        println!("No images to pull");
        return Ok(());
    }

    let runtime = DockerRuntime::connect(&options.runtime.docker_host)?;

    let mut errors = Vec::new();
    for image in &images {
        if let Err(e) = runtime.pull(&image.registry).await {
            eprintln!("Error pulling '{}': {}", image.registry, e);
            errors.push(format!("{}: {}", image.registry, e));
        } else {
            println!("{}", image.registry);
        }
    }

    if !errors.is_empty() {
        anyhow::bail!(
            "Failed to pull {} of {} image(s)\nErrors:\n  {}",
            errors.len(),
            images.len(),
            errors.join("\n  ")
        );
    }
    Ok(())
}
