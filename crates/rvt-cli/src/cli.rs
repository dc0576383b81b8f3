use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rvt_types::Interval;

#[derive(Parser)]
#[command(
    name = "rvt",
    about = "Revtext: versioned text with live diffs",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare two files
    Diff(DiffArgs),
    /// Trace a byte range back through successive versions of a file
    History(HistoryArgs),
    /// Print the effective engine configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct DiffArgs {
    pub old: PathBuf,
    pub new: PathBuf,
    /// Print insertions and deletions instead of matches
    #[arg(long)]
    pub changes: bool,
    /// Print changed line ranges
    #[arg(long, conflicts_with = "changes")]
    pub lines: bool,
    /// Engine configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Versions of one file, oldest first
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Byte range in the newest version, as START..END
    #[arg(long)]
    pub range: Interval,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub file: Option<PathBuf>,
}
