use anyhow::Context;
use clap::{ArgAction, Parser};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::config::{ScanConfig, Settings, MAX_IGNORE_DAYS};
use crate::diff;
use crate::manifest::read_manifest;
use crate::output::{self, OutputMode, Reporter};
use crate::update;

/// Colours only make sense on a terminal
pub fn init_colors() {
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
}

#[derive(Parser)]
#[command(name = "update-sums")]
#[command(version)]
#[command(about = "Keep a SHA-1 manifest of every file below the current directory")]
#[command(long_about = "Scans the current directory and updates its manifest \
    (.sha1s by default). Only files whose modification time changed are re-hashed.\n\n\
    Examples:\n  \
    update-sums                 # Add new and modified files\n  \
    update-sums -c              # Also drop records of deleted files\n  \
    update-sums -i 365          # Drop records older than a year\n  \
    update-sums -f backup.sums  # Use another manifest file")]
pub struct UpdateCli {
    /// Remove records of files that no longer exist
    #[arg(short = 'c', long)]
    pub remove_missing: bool,

    /// Drop records of files last modified more than DAYS ago (0 disables)
    #[arg(
        short = 'i',
        long,
        value_name = "DAYS",
        value_parser = clap::value_parser!(u32).range(0..=MAX_IGNORE_DAYS as i64)
    )]
    pub ignore_days: Option<u32>,

    /// Manifest file, relative to the current directory
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Increase output verbosity (-v, -vv for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print a JSON summary instead of progress lines
    #[arg(long)]
    pub json: bool,
}

impl UpdateCli {
    pub fn run(self) -> anyhow::Result<()> {
        let output_mode = OutputMode::from_flags(self.quiet, self.verbose);

        let mut settings = Settings::load()?;
        settings.apply_cli_overrides(self.remove_missing, self.ignore_days, self.file);

        let root = std::env::current_dir().context("Failed to determine current directory")?;
        let config = ScanConfig::from_settings(&root, &settings)?;

        let mut reporter = Reporter::new(output_mode, self.json);
        let outcome = update::update_manifest(&config, |event| reporter.event(event))?;

        let manifest = output::display_path(&config.manifest_path, &root);
        reporter.finish(&manifest, &outcome)?;

        if outcome.written && output_mode >= OutputMode::VeryVerbose && !self.json {
            println!("Wrote {}", manifest.display());
        }

        Ok(())
    }
}

#[derive(Parser)]
#[command(name = "compare-sums")]
#[command(version)]
#[command(about = "List files of CANDIDATE whose content is not present in REFERENCE")]
pub struct CompareCli {
    /// Manifest describing the content you already have
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,

    /// Manifest whose files are checked against REFERENCE
    #[arg(value_name = "CANDIDATE")]
    pub candidate: PathBuf,
}

impl CompareCli {
    pub fn run(self) -> anyhow::Result<()> {
        let reference = read_manifest(&self.reference)?;
        let candidate = read_manifest(&self.candidate)?;

        output::print_paths(diff::missing_from(&reference, &candidate))
            .context("Failed to write to stdout")
    }
}
