//! Cursor-driven timeline pagination.
//!
//! Walks a user's posts-and-replies timeline page by page. Every page is
//! written to the [`RawPageStore`] before the next request goes out, so an
//! aborted run keeps everything it fetched.
//!
//! The walk ends at the first of:
//! - a page whose signature was already seen,
//! - a page that adds no tweet id not seen on earlier pages,
//! - a page without a continuation cursor,
//! - a cursor that was already requested,
//! - the configured page limit.

use crate::config::Config;
use crate::error::{CollectError, Result};
use crate::model::RawPage;
use crate::parser::{collect_tweet_ids, extract_next_cursor, is_malformed_page, page_signature};
use crate::provider::{Attempted, RetryPolicy, TweetProvider, with_retry};
use crate::store::RawPageStore;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DuplicatePage,
    NoNewTweets,
    NoCursor,
    RepeatedCursor,
    PageLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::DuplicatePage => "duplicate page",
            Self::NoNewTweets => "no new tweets",
            Self::NoCursor => "no continuation cursor",
            Self::RepeatedCursor => "repeated cursor",
            Self::PageLimit => "page limit reached",
        };
        f.write_str(text)
    }
}

/// Summary of one pagination walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationReport {
    pub pages_fetched: u32,
    pub malformed_pages: u32,
    pub stop_reason: StopReason,
}

/// Fetches every timeline page for one user into a raw page store.
pub struct PaginationFetcher<'a, P> {
    provider: &'a P,
    policy: RetryPolicy,
    max_pages: Option<u32>,
}

impl<'a, P: TweetProvider> PaginationFetcher<'a, P> {
    #[must_use]
    pub const fn new(provider: &'a P, policy: RetryPolicy, max_pages: Option<u32>) -> Self {
        Self {
            provider,
            policy,
            max_pages,
        }
    }

    #[must_use]
    pub fn from_config(provider: &'a P, config: &Config) -> Self {
        let policy = RetryPolicy::new(
            config.fetch.max_attempts,
            Duration::from_millis(config.fetch.backoff_ms),
            Duration::from_millis(config.provider.rate_limit_cooldown_ms),
        );
        Self::new(provider, policy, config.fetch.max_pages)
    }

    /// Fetch pages until a termination rule fires.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::PaginationAborted`] when a page fails fatally or
    /// exhausts its retries; pages stored before that point stay on disk.
    /// Store write failures are returned as-is.
    pub async fn fetch_all(
        &self,
        user_id: &str,
        store: &mut RawPageStore,
    ) -> Result<PaginationReport> {
        let mut seen_signatures: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut requested: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut page_number: u32 = 0;
        let mut malformed_pages: u32 = 0;

        let stop_reason = loop {
            if self.max_pages.is_some_and(|max| page_number >= max) {
                break StopReason::PageLimit;
            }
            page_number += 1;
            info!(
                page = page_number,
                cursor = cursor.as_deref().unwrap_or("<start>"),
                "Fetching page"
            );

            let provider = self.provider;
            let requested_cursor = cursor.as_deref();
            let data = match with_retry(&self.policy, "timeline page", move || {
                provider.fetch_timeline_page(user_id, requested_cursor)
            })
            .await
            {
                Attempted::Success { value, .. } => value,
                Attempted::Exhausted { error, attempts } | Attempted::Fatal { error, attempts } => {
                    error!(page = page_number, attempts, "Pagination aborted: {error}");
                    return Err(CollectError::PaginationAborted {
                        page: page_number,
                        attempts,
                        source: error,
                    });
                }
            };

            let malformed = is_malformed_page(&data);
            let tweet_ids = if malformed {
                Vec::new()
            } else {
                collect_tweet_ids(&data)
            };
            let new_tweet_ids: Vec<String> = tweet_ids
                .iter()
                .filter(|id| !seen_ids.contains(*id))
                .cloned()
                .collect();
            let signature = page_signature(&data);
            let next_cursor = extract_next_cursor(&data);
            let duplicate = !seen_signatures.insert(signature.clone());
            seen_ids.extend(new_tweet_ids.iter().cloned());

            store.append(RawPage {
                page_number,
                requested_cursor: cursor.clone(),
                next_cursor: next_cursor.clone(),
                page_signature: signature,
                tweet_ids,
                new_tweet_ids: new_tweet_ids.clone(),
                malformed,
                data,
            })?;

            if malformed {
                malformed_pages += 1;
                warn!(page = page_number, "Malformed page stored; continuing");
            } else {
                info!(
                    page = page_number,
                    new_tweets = new_tweet_ids.len(),
                    total = seen_ids.len(),
                    "Stored page"
                );
                if duplicate {
                    break StopReason::DuplicatePage;
                }
                if new_tweet_ids.is_empty() {
                    break StopReason::NoNewTweets;
                }
            }

            let Some(next) = next_cursor else {
                break StopReason::NoCursor;
            };
            if cursor.as_deref() == Some(next.as_str()) || !requested.insert(next.clone()) {
                break StopReason::RepeatedCursor;
            }
            cursor = Some(next);
        };

        info!(pages = page_number, reason = %stop_reason, "Pagination finished");
        Ok(PaginationReport {
            pages_fetched: page_number,
            malformed_pages,
            stop_reason,
        })
    }
}
