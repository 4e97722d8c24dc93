use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use labbox::{Database, LabboxOptions};

use crate::commands::{import::ImportArgs, ps::PsArgs, pull::PullArgs, serve::ServeArgs};

#[derive(Parser, Debug)]
#[command(name = "labbox", version, about = "Ephemeral per-user challenge instances")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API (and the gateway, when enabled)
    Serve(ServeArgs),
    /// Load users, images and challenges from a catalog file
    Import(ImportArgs),
    /// Pull every catalog image
    Pull(PullArgs),
    /// List persisted instances
    Ps(PsArgs),
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// Configuration file (YAML). Defaults apply when omitted
    #[arg(short, long, global = true, env = "LABBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file, overriding the configuration
    #[arg(long, global = true, env = "LABBOX_DATABASE")]
    pub database: Option<PathBuf>,

    /// Default log filter, overriding the configuration. `RUST_LOG` still wins
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl GlobalFlags {
    /// Configuration file merged with command-line overrides.
    pub fn load_options(&self) -> anyhow::Result<LabboxOptions> {
        let mut options = match &self.config {
            Some(path) => LabboxOptions::load(path)?,
            None => LabboxOptions::default(),
        };
        if let Some(database) = &self.database {
            options.database = database.clone();
        }
        if let Some(level) = &self.log_level {
            options.log.level = level.clone();
        }
        Ok(options)
    }
}

pub fn open_database(options: &LabboxOptions) -> anyhow::Result<Database> {
    Database::open(&options.database)
        .with_context(|| format!("opening database {}", options.database.display()))
}
