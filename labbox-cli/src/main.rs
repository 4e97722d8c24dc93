mod cli;
mod commands;

use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let options = match cli.global.load_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    };
    let _log_guard = labbox::init_logging(&options.log);

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, options).await,
        Commands::Import(args) => commands::import::execute(args, &options),
        Commands::Pull(args) => commands::pull::execute(args, &options).await,
        Commands::Ps(args) => commands::ps::execute(args, &options),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
