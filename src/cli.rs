//! CLI definitions for xcollect.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// xcollect - X timeline collector and thread rebuilder
#[derive(Parser, Debug)]
#[command(name = "xcollect")]
#[command(version)]
#[command(about = "Collect a user's complete X post and reply history into deterministic threads")]
#[command(long_about = r#"
xcollect pages through a user's posts-and-replies timeline, saves every raw
page, looks up the replied-to and quoted tweets the timeline left out, and
rebuilds everything into conversation threads.

Each run writes three files into the output directory:
  <user>_<stamp>.json             raw pages, exactly as returned
  <user>_<stamp>_clean.json       rich view: every tweet, threads, orphans
  <user>_<stamp>_clean_slim.json  reduced view: threads only

Quick start:
  1. export XCOLLECT_API_KEY=...
  2. xcollect collect someuser
  3. xcollect process ~/twitter_post_analysis/someuser_<stamp>.json
"#)]
pub struct Cli {
    /// Directory for raw files and outputs
    #[arg(long, short = 'o', env = "XCOLLECT_OUTPUT_DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Configuration file (default: ~/.config/xcollect/config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// More log detail on stderr (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch all pages, backfill missing references, and write outputs
    Collect(UserArgs),

    /// Fetch all pages into a raw file and stop
    Pages(UserArgs),

    /// Backfill and process an existing raw file
    Backfill(RawFileArgs),

    /// Rebuild outputs from an existing raw file (no network)
    Process(RawFileArgs),

    /// Show configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct UserArgs {
    /// X handle, with or without a leading @
    pub username: String,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<u32>,
}

#[derive(Args, Debug)]
pub struct RawFileArgs {
    /// Raw page file written by `collect` or `pages`
    pub raw_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the default configuration file instead of the effective one
    #[arg(long)]
    pub default: bool,

    /// Print the user configuration file path
    #[arg(long, conflicts_with = "default")]
    pub path: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
