//! xcollect - X timeline collector and thread rebuilder
//!
//! Pages through a user's posts-and-replies timeline, persists every raw
//! page, backfills the replied-to and quoted tweets the timeline omitted, and
//! rebuilds the result into deterministic conversation threads.
//!
//! # Modules
//!
//! - [`fetcher`] - Cursor-driven timeline pagination
//! - [`store`] - Durable raw page file
//! - [`scanner`] - Missing reference detection
//! - [`backfill`] - Bounded-concurrency lookup of missing tweets
//! - [`threads`] - Conversation thread reconstruction
//! - [`output`] - Rich and reduced output views
//! - [`pipeline`] - The four run modes
//! - [`client`] - HTTP provider client

pub mod backfill;
pub mod cli;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod provider;
pub mod scanner;
pub mod store;
pub mod threads;

pub use backfill::{BackfillExecutor, BackfillReport};
pub use cli::*;
pub use client::RapidApiClient;
pub use collection::TweetCollection;
pub use config::Config;
pub use error::{CollectError, ProviderError, Result, ResultExt, format_error};
pub use fetcher::{PaginationFetcher, PaginationReport, StopReason};
pub use model::*;
pub use output::{OutputPaths, OutputWriter, Summary};
pub use pipeline::{RunContext, RunMode, RunOutcome};
pub use provider::{RetryPolicy, TweetProvider};
pub use store::RawPageStore;
pub use threads::{Reconstruction, Thread, reconstruct};

/// Default output directory name under the home directory.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "twitter_post_analysis";

/// Get the default directory for raw files and outputs
#[must_use]
pub fn default_output_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(DEFAULT_OUTPUT_DIR_NAME)
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}
