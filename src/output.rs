//! Rich and reduced output views, the run summary, and output file naming.
//!
//! Views borrow from the reconstruction and are pure functions of it; writing
//! them is the only side effect here.

use crate::backfill::BackfillReport;
use crate::collection::TweetCollection;
use crate::error::{CollectError, Result};
use crate::model::{Engagement, RawFileHeader, RawPage, Tweet, TweetKind, TweetUrl};
use crate::scanner::{ReferenceDiagnostics, sorted_ids};
use crate::store::write_json_atomic;
use crate::threads::{Reconstruction, Thread};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamp format used in output file names.
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// The three files belonging to one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPaths {
    pub raw: PathBuf,
    pub rich: PathBuf,
    pub reduced: PathBuf,
}

impl OutputPaths {
    #[must_use]
    pub fn new(dir: &Path, username: &str, stamp: &str) -> Self {
        Self {
            raw: dir.join(format!("{username}_{stamp}.json")),
            rich: dir.join(format!("{username}_{stamp}_clean.json")),
            reduced: dir.join(format!("{username}_{stamp}_clean_slim.json")),
        }
    }
}

/// Exclusive tweet categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetBreakdown {
    pub originals: usize,
    pub replies: usize,
    pub quotes: usize,
}

/// Engagement counters summed over every tweet (missing counts as zero).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementTotals {
    pub reply_count_total: u64,
    pub retweet_count_total: u64,
    pub quote_count_total: u64,
    pub like_count_total: u64,
    pub bookmark_count_total: u64,
    pub view_count_total: u64,
}

impl EngagementTotals {
    fn add(&mut self, e: &Engagement) {
        self.reply_count_total += e.reply_count.unwrap_or(0);
        self.retweet_count_total += e.retweet_count.unwrap_or(0);
        self.quote_count_total += e.quote_count.unwrap_or(0);
        self.like_count_total += e.like_count.unwrap_or(0);
        self.bookmark_count_total += e.bookmark_count.unwrap_or(0);
        self.view_count_total += e.view_count.unwrap_or(0);
    }
}

/// Counts that make a run's coverage gaps explicit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub pages_fetched: usize,
    pub malformed_pages: usize,
    pub tweets_from_pagination: usize,
    pub missing_ids: usize,
    pub missing_id_list: Vec<String>,
    pub backfilled: usize,
    pub skipped_batches: usize,
    pub skipped_ids: usize,
    pub unresolved_ids: Vec<String>,
    pub total_tweets: usize,
    pub thread_count: usize,
    pub tweet_breakdown: TweetBreakdown,
    pub engagement_totals: EngagementTotals,
    pub orphan_reply_count: usize,
    pub orphan_replies: Vec<String>,
}

/// Inputs to [`Summary::build`] gathered along the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RunStats<'a> {
    pub pages: &'a [RawPage],
    pub tweets_from_pagination: usize,
    pub references: &'a ReferenceDiagnostics,
    pub backfill: &'a BackfillReport,
    /// Backfilled tweets actually added to the collection.
    pub backfilled: usize,
}

impl Summary {
    #[must_use]
    pub fn build(
        stats: &RunStats<'_>,
        collection: &TweetCollection,
        reconstruction: &Reconstruction<'_>,
    ) -> Self {
        let mut breakdown = TweetBreakdown::default();
        let mut engagement = EngagementTotals::default();
        for tweet in collection.iter() {
            match tweet.kind() {
                TweetKind::Original => breakdown.originals += 1,
                TweetKind::Reply => breakdown.replies += 1,
                TweetKind::Quote => breakdown.quotes += 1,
            }
            engagement.add(&tweet.engagement);
        }

        Self {
            pages_fetched: stats.pages.len(),
            malformed_pages: stats.pages.iter().filter(|p| p.malformed).count(),
            tweets_from_pagination: stats.tweets_from_pagination,
            missing_ids: stats.references.initial.len(),
            missing_id_list: sorted_ids(&stats.references.initial),
            backfilled: stats.backfilled,
            skipped_batches: stats.backfill.skipped.len(),
            skipped_ids: stats.backfill.skipped_ids(),
            unresolved_ids: stats.references.unresolved_sorted(),
            total_tweets: collection.len(),
            thread_count: reconstruction.threads.len(),
            tweet_breakdown: breakdown,
            engagement_totals: engagement,
            orphan_reply_count: reconstruction.orphan_reply_ids.len(),
            orphan_replies: reconstruction.orphan_reply_ids.clone(),
        }
    }
}

// =============================================================================
// Rich view
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView<'a> {
    pub id: Option<&'a str>,
    pub screen_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RichTweet<'a> {
    pub id: &'a str,
    pub created_at: Option<DateTime<Utc>>,
    pub text: &'a str,
    pub conversation_id: &'a str,
    pub in_reply_to_status_id: Option<&'a str>,
    pub in_reply_to_user_id: Option<&'a str>,
    pub quoted_status_id: Option<&'a str>,
    pub is_quote_status: bool,
    pub author: AuthorView<'a>,
    pub engagement: &'a Engagement,
    pub urls: &'a [TweetUrl],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub orphan_reply: bool,
}

impl<'a> RichTweet<'a> {
    fn new(tweet: &'a Tweet, reconstruction: &Reconstruction<'_>) -> Self {
        Self {
            id: &tweet.id,
            created_at: tweet.created_at,
            text: &tweet.text,
            conversation_id: &tweet.conversation_id,
            in_reply_to_status_id: tweet.in_reply_to_status_id.as_deref(),
            in_reply_to_user_id: tweet.in_reply_to_user_id.as_deref(),
            quoted_status_id: tweet.quoted_status_id.as_deref(),
            is_quote_status: tweet.is_quote_status,
            author: AuthorView {
                id: tweet.author.id.as_deref(),
                screen_name: tweet.author.screen_name.as_deref(),
                name: tweet.author.name.as_deref(),
            },
            engagement: &tweet.engagement,
            urls: &tweet.urls,
            orphan_reply: reconstruction.is_orphan_reply(&tweet.id),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RichThread<'a> {
    #[serde(flatten)]
    pub root: RichTweet<'a>,
    pub replies: Vec<RichTweet<'a>>,
}

/// The rich output document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RichView<'a> {
    pub username: &'a str,
    pub user_id: &'a str,
    pub fetched_at: &'a str,
    pub raw_file: String,
    pub summary: &'a Summary,
    pub tweets_flat: Vec<RichTweet<'a>>,
    pub threads: Vec<RichThread<'a>>,
    pub orphans: Vec<RichTweet<'a>>,
}

/// Project the reconstruction into the rich view.
#[must_use]
pub fn rich_view<'a>(
    header: &'a RawFileHeader,
    raw_file: &Path,
    summary: &'a Summary,
    reconstruction: &Reconstruction<'a>,
) -> RichView<'a> {
    let project = |tweets: &[&'a Tweet]| -> Vec<RichTweet<'a>> {
        tweets
            .iter()
            .map(|&t| RichTweet::new(t, reconstruction))
            .collect()
    };
    RichView {
        username: &header.username,
        user_id: &header.user_id,
        fetched_at: &header.fetched_at,
        raw_file: raw_file.display().to_string(),
        summary,
        tweets_flat: project(&reconstruction.flat),
        threads: reconstruction
            .threads
            .iter()
            .map(|thread| RichThread {
                root: RichTweet::new(thread.root, reconstruction),
                replies: project(&thread.replies),
            })
            .collect(),
        orphans: project(&reconstruction.orphans),
    }
}

// =============================================================================
// Reduced view
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimAuthor<'a> {
    pub id: Option<&'a str>,
    pub screen_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimTweet<'a> {
    pub id: &'a str,
    pub created_at: Option<DateTime<Utc>>,
    pub text: &'a str,
    pub conversation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_status_id: Option<&'a str>,
    pub author: SlimAuthor<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<SlimTweet<'a>>,
}

impl<'a> SlimTweet<'a> {
    fn new(tweet: &'a Tweet) -> Self {
        Self {
            id: &tweet.id,
            created_at: tweet.created_at,
            text: &tweet.text,
            conversation_id: &tweet.conversation_id,
            in_reply_to_status_id: tweet.in_reply_to_status_id.as_deref(),
            quoted_status_id: tweet.quoted_status_id.as_deref(),
            author: SlimAuthor {
                id: tweet.author.id.as_deref(),
                screen_name: tweet.author.screen_name.as_deref(),
            },
            replies: Vec::new(),
        }
    }

    fn thread(thread: &Thread<'a>) -> Self {
        Self {
            replies: thread.replies.iter().map(|&t| Self::new(t)).collect(),
            ..Self::new(thread.root)
        }
    }
}

/// The reduced output document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducedView<'a> {
    pub username: &'a str,
    pub user_id: &'a str,
    pub fetched_at: &'a str,
    pub raw_file: String,
    pub summary: &'a Summary,
    pub threads: Vec<SlimTweet<'a>>,
}

/// Project the reconstruction into the reduced view.
#[must_use]
pub fn reduced_view<'a>(
    header: &'a RawFileHeader,
    raw_file: &Path,
    summary: &'a Summary,
    reconstruction: &Reconstruction<'a>,
) -> ReducedView<'a> {
    ReducedView {
        username: &header.username,
        user_id: &header.user_id,
        fetched_at: &header.fetched_at,
        raw_file: raw_file.display().to_string(),
        summary,
        threads: reconstruction.threads.iter().map(SlimTweet::thread).collect(),
    }
}

/// Writes both views for a run.
#[derive(Debug, Clone)]
pub struct OutputWriter<'a> {
    paths: &'a OutputPaths,
}

impl<'a> OutputWriter<'a> {
    #[must_use]
    pub const fn new(paths: &'a OutputPaths) -> Self {
        Self { paths }
    }

    /// Write the rich and reduced files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn write(
        &self,
        header: &RawFileHeader,
        summary: &Summary,
        reconstruction: &Reconstruction<'_>,
    ) -> Result<()> {
        if let Some(parent) = self.paths.rich.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CollectError::path_error("create directory", parent, e))?;
        }
        write_json_atomic(
            &self.paths.rich,
            &rich_view(header, &self.paths.raw, summary, reconstruction),
        )?;
        write_json_atomic(
            &self.paths.reduced,
            &reduced_view(header, &self.paths.raw, summary, reconstruction),
        )?;
        info!(
            rich = %self.paths.rich.display(),
            reduced = %self.paths.reduced.display(),
            "Wrote outputs"
        );
        Ok(())
    }
}
