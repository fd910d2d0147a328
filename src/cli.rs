//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use archiver_core::config::ArchiverConfig;
use archiver_core::export::ExportKind;
use clap::Parser;

const GIB: u64 = 1024 * 1024 * 1024;

/// Archive the videos referenced by a personal data export.
///
/// Items are fetched one at a time with adaptive pacing; completed ids are
/// remembered so interrupted runs resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "clip-archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the data export JSON file
    pub data_file: PathBuf,

    /// Which export list to archive
    #[arg(short = 't', long = "type", value_enum, default_value_t = ExportKind::Liked)]
    pub kind: ExportKind,

    /// Only consider the first N export entries
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub limit: Option<u64>,

    /// Config file (defaults to ./clip-archiver.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory that receives downloaded media
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Directory for history, metadata, and session files
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Archive capacity in GiB
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub capacity_gb: Option<u64>,

    /// Parse and filter the export, report what would run, and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Applies command-line overrides on top of file configuration.
    pub fn apply_overrides(&self, config: &mut ArchiverConfig) {
        if let Some(dir) = &self.archive_dir {
            config.storage.archive_dir.clone_from(dir);
        }
        if let Some(dir) = &self.state_dir {
            config.storage.state_dir.clone_from(dir);
        }
        if let Some(gb) = self.capacity_gb {
            config.storage.capacity_bytes = gb.saturating_mul(GIB);
        }
    }

    /// Entry limit as a `usize`.
    pub fn limit(&self) -> Option<usize> {
        self.limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
