//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use textbook_core::download::READ_TIMEOUT_SECS;
use textbook_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

/// Bulk download textbook PDFs listed in markdown tables.
///
/// Scans every markdown file under INPUT_ROOT, downloads each linked PDF
/// into `{category}/PDFs/`, and keeps a resumable JSON index of outcomes.
#[derive(Parser, Debug, Clone)]
#[command(name = "textbook-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Directory tree of markdown listings (one academic-year root)
    pub input_root: PathBuf,

    /// Output root for PDFs (defaults to INPUT_ROOT)
    #[arg(short, long = "output", id = "output_dir")]
    pub output_dir: Option<PathBuf>,

    /// Index file path (defaults to OUTPUT/index.json)
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Maximum concurrent downloads (1-32)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: u8,

    /// Additional attempts after a transient failure (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Only retry items whose last recorded outcome is failed
    #[arg(long)]
    pub retry_failed: bool,

    /// Show what would be downloaded without fetching or writing the index
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds a download may stall without receiving data (1-3600)
    #[arg(long, default_value_t = READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: u64,

    /// Config file (defaults to $XDG_CONFIG_HOME/textbook-downloader/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}
