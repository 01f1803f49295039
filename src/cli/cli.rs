use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Replays a YAML script of file tree operations and prints the resulting
/// tree.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// The script to run
    pub script: PathBuf,
    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Describe this path after the script has run (repeatable)
    #[clap(long = "stat", short)]
    pub stats: Vec<String>,
}
