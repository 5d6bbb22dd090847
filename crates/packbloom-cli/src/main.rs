mod cli;
mod cmd;

use std::path::PathBuf;

use clap::Parser;

use packbloom_core::config::{self, FileConfig};
use packbloom_core::store::Store;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // The config file is optional; an explicitly named one must load.
    let file_config = match config::resolve_config_path(cli.config.as_deref()) {
        Some(source) => {
            tracing::info!("Using config: {source}");
            match config::load_config(source.path()) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => FileConfig::default(),
    };

    let root = match cli
        .repo
        .clone()
        .or_else(|| file_config.repository.as_ref().map(PathBuf::from))
    {
        Some(root) => root,
        None => {
            eprintln!("Error: no repository specified.");
            eprintln!(
                "Use --repo, set {}, or add `repository:` to packbloom.yaml.",
                config::REPO_ENV
            );
            std::process::exit(1);
        }
    };

    let store = match Store::open(&root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Bloom {
            ruin,
            force,
            output,
            dir,
            k,
            check,
            workers,
        } => cmd::bloom::run_bloom(
            &store,
            &file_config,
            cmd::bloom::BloomArgs {
                ruin,
                force,
                output,
                dir,
                k,
                check,
                workers,
            },
        ),
        Commands::Lookup {
            digests,
            dir,
            output,
        } => cmd::lookup::run_lookup(&store, &digests, dir, output).map(|()| false),
    };

    match result {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
