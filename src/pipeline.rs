//! Run orchestration: the four modes and the context they share.
//!
//! ```text
//! collect   resolve → paginate → scan → backfill → rescan → threads → outputs
//! pages     resolve → paginate
//! backfill  load raw → scan → backfill → rescan → threads → outputs
//! process   load raw → scan → threads → outputs
//! ```
//!
//! Backfill is a single pass. References first seen on backfilled tweets are
//! reported, never chased.

use crate::backfill::{BackfillExecutor, BackfillReport};
use crate::collection::TweetCollection;
use crate::config::Config;
use crate::error::{CollectError, Result};
use crate::fetcher::{PaginationFetcher, StopReason};
use crate::model::RawFileHeader;
use crate::output::{OutputPaths, OutputWriter, RunStats, STAMP_FORMAT, Summary};
use crate::parser::{clean_username, extract_user_id};
use crate::provider::{RetryPolicy, TweetProvider, with_retry};
use crate::scanner::{MissingReferenceSet, ReferenceDiagnostics, missing_references, sorted_ids};
use crate::store::RawPageStore;
use crate::threads::reconstruct;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Full,
    PagesOnly,
    BackfillOnly,
    ProcessOnly,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::PagesOnly => "pages-only",
            Self::BackfillOnly => "backfill-only",
            Self::ProcessOnly => "process-only",
        })
    }
}

/// Everything a run needs to know about its environment.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Config,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let output_dir = config.output_dir();
        Self {
            config,
            output_dir,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// File-name stamp for runs that create a new raw file.
    #[must_use]
    pub fn stamp(&self) -> String {
        self.started_at.format(STAMP_FORMAT).to_string()
    }

    fn fetched_at(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn paths_for(&self, store: &RawPageStore) -> OutputPaths {
        let mut paths = OutputPaths::new(
            &self.output_dir,
            &store.header().username,
            &store.run_stamp(),
        );
        paths.raw = store.path().to_path_buf();
        paths
    }
}

/// What a run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub mode: RunMode,
    pub username: String,
    pub raw_file: PathBuf,
    pub pages_fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rich_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

/// Collection state between extraction and output.
struct Assembled {
    collection: TweetCollection,
    tweets_from_pagination: usize,
    initial_missing: MissingReferenceSet,
    backfill: BackfillReport,
    backfilled: usize,
}

impl Assembled {
    fn from_store(store: &RawPageStore) -> Self {
        let collection = TweetCollection::from_pages(store.pages());
        let initial_missing = missing_references(&collection);
        info!(
            tweets = collection.len(),
            missing = initial_missing.len(),
            "Scanned references"
        );
        Self {
            tweets_from_pagination: collection.len(),
            collection,
            initial_missing,
            backfill: BackfillReport::default(),
            backfilled: 0,
        }
    }

    async fn backfill<P: TweetProvider>(&mut self, config: &Config, provider: &P) {
        if self.initial_missing.is_empty() {
            return;
        }
        let report = BackfillExecutor::from_config(provider, config)
            .run(&self.initial_missing)
            .await;
        self.backfilled = self
            .collection
            .merge_backfill(report.tweets.values().cloned());
        self.backfill = report;
    }

    fn write(self, store: &RawPageStore, paths: &OutputPaths) -> Result<Summary> {
        let references = ReferenceDiagnostics::after_backfill(self.initial_missing, &self.collection);
        if !references.newly_discovered.is_empty() {
            warn!(
                count = references.newly_discovered.len(),
                ids = ?sorted_ids(&references.newly_discovered),
                "Backfilled tweets reference further missing tweets; not followed"
            );
        }
        if !references.unresolved.is_empty() {
            warn!(count = references.unresolved.len(), "References left unresolved");
        }

        let reconstruction = reconstruct(&self.collection);
        let stats = RunStats {
            pages: store.pages(),
            tweets_from_pagination: self.tweets_from_pagination,
            references: &references,
            backfill: &self.backfill,
            backfilled: self.backfilled,
        };
        let summary = Summary::build(&stats, &self.collection, &reconstruction);
        OutputWriter::new(paths).write(store.header(), &summary, &reconstruction)?;
        Ok(summary)
    }
}

fn outcome(mode: RunMode, store: &RawPageStore, paths: OutputPaths, summary: Summary) -> RunOutcome {
    RunOutcome {
        mode,
        username: store.header().username.clone(),
        raw_file: paths.raw,
        pages_fetched: store.pages().len(),
        rich_file: Some(paths.rich),
        reduced_file: Some(paths.reduced),
        stop_reason: None,
        summary: Some(summary),
    }
}

/// Resolve the handle, create the raw file, and paginate into it.
async fn fetch_pages<P: TweetProvider>(
    ctx: &RunContext,
    provider: &P,
    username: &str,
) -> Result<(RawPageStore, StopReason)> {
    let username = clean_username(username);
    if username.is_empty() {
        return Err(CollectError::invalid_argument("username is empty"));
    }

    let policy = RetryPolicy::new(
        ctx.config.fetch.max_attempts,
        Duration::from_millis(ctx.config.fetch.backoff_ms),
        Duration::from_millis(ctx.config.provider.rate_limit_cooldown_ms),
    );
    let handle = username.as_str();
    let user = with_retry(&policy, "user lookup", move || provider.resolve_user(handle))
        .await
        .into_result()?;
    let user_id = extract_user_id(&user).ok_or_else(|| CollectError::UserNotFound {
        username: username.clone(),
    })?;
    info!(username = %username, user_id = %user_id, "Resolved user");

    let paths = OutputPaths::new(&ctx.output_dir, &username, &ctx.stamp());
    let header = RawFileHeader {
        username,
        user_id,
        fetched_at: ctx.fetched_at(),
        user,
    };
    let mut store = RawPageStore::create(&paths.raw, header)?;
    let user_id = store.header().user_id.clone();
    let report = PaginationFetcher::from_config(provider, &ctx.config)
        .fetch_all(&user_id, &mut store)
        .await?;
    Ok((store, report.stop_reason))
}

/// Fetch every page, backfill missing references, and write both outputs.
///
/// # Errors
///
/// Fails on user resolution, fatal pagination errors, or filesystem errors.
/// Pages fetched before a pagination failure remain in the raw file.
pub async fn run_full<P: TweetProvider>(
    ctx: &RunContext,
    provider: &P,
    username: &str,
) -> Result<RunOutcome> {
    let (store, stop_reason) = fetch_pages(ctx, provider, username).await?;
    let mut assembled = Assembled::from_store(&store);
    assembled.backfill(&ctx.config, provider).await;
    let paths = ctx.paths_for(&store);
    let summary = assembled.write(&store, &paths)?;
    Ok(RunOutcome {
        stop_reason: Some(stop_reason),
        ..outcome(RunMode::Full, &store, paths, summary)
    })
}

/// Fetch every page into a raw file and stop.
///
/// # Errors
///
/// Same as [`run_full`], minus anything after pagination.
pub async fn run_pages_only<P: TweetProvider>(
    ctx: &RunContext,
    provider: &P,
    username: &str,
) -> Result<RunOutcome> {
    let (store, stop_reason) = fetch_pages(ctx, provider, username).await?;
    Ok(RunOutcome {
        mode: RunMode::PagesOnly,
        username: store.header().username.clone(),
        raw_file: store.path().to_path_buf(),
        pages_fetched: store.pages().len(),
        rich_file: None,
        reduced_file: None,
        stop_reason: Some(stop_reason),
        summary: None,
    })
}

/// Backfill and process an existing raw file. The raw file is not modified.
///
/// # Errors
///
/// Fails if the raw file cannot be loaded or outputs cannot be written.
pub async fn run_backfill_only<P: TweetProvider>(
    ctx: &RunContext,
    provider: &P,
    raw_file: &Path,
) -> Result<RunOutcome> {
    let store = RawPageStore::open(raw_file)?;
    let mut assembled = Assembled::from_store(&store);
    assembled.backfill(&ctx.config, provider).await;
    let paths = ctx.paths_for(&store);
    let summary = assembled.write(&store, &paths)?;
    Ok(outcome(RunMode::BackfillOnly, &store, paths, summary))
}

/// Rebuild outputs from an existing raw file without any network access.
///
/// Running this twice on the same raw file produces identical output files.
///
/// # Errors
///
/// Fails if the raw file cannot be loaded or outputs cannot be written.
pub fn run_process_only(ctx: &RunContext, raw_file: &Path) -> Result<RunOutcome> {
    let store = RawPageStore::open(raw_file)?;
    let assembled = Assembled::from_store(&store);
    let paths = ctx.paths_for(&store);
    let summary = assembled.write(&store, &paths)?;
    Ok(outcome(RunMode::ProcessOnly, &store, paths, summary))
}
