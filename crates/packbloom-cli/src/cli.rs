use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "packbloom",
    version,
    about = "Bloom filters over pack index directories",
    after_help = "\
Repository lookup order:
  1. --repo <path>               (explicit flag)
  2. $PACKBLOOM_REPO             (environment variable)
  3. `repository:` in the configuration file

Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $PACKBLOOM_CONFIG           (environment variable)
  3. ./packbloom.yaml            (project)
  4. $XDG_CONFIG_HOME/packbloom/config.yaml (or ~/.config/packbloom/config.yaml)"
)]
pub(crate) struct Cli {
    /// Repository root (the directory containing packs/)
    #[arg(short, long, env = "PACKBLOOM_REPO", global = true)]
    pub repo: Option<PathBuf>,

    /// Path to configuration file (overrides PACKBLOOM_CONFIG and default search)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create or update the bloom filter of each pack directory
    Bloom {
        /// Zero the filter's bit array (for testing --check)
        #[arg(long, conflicts_with = "check")]
        ruin: bool,

        /// Ignore any existing filter and regenerate from scratch
        #[arg(short, long)]
        force: bool,

        /// Output filter path (default: <dir>/packbloom.bloom)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only process this pack directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Probes per digest for new filters (default: 5 when it fits, else 4)
        #[arg(short = 'k', long = "hashes", value_parser = clap::value_parser!(u8).range(4..=5))]
        k: Option<u8>,

        /// Verify every digest of the given pack index against the filter
        #[arg(long, value_name = "IDX")]
        check: Option<PathBuf>,

        /// Max concurrent pack index readers (1-64, overrides config)
        #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..=64))]
        workers: Option<u16>,
    },

    /// Report which pack index holds each digest
    Lookup {
        /// Hex-encoded digests to look up
        #[arg(required = true)]
        digests: Vec<String>,

        /// Only search this pack directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Filter path to use instead of <dir>/packbloom.bloom
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
