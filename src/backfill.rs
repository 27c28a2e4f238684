//! Bounded-concurrency lookup of missing tweets.
//!
//! Missing ids are split into batches of at most 20 and looked up with at
//! most 10 requests in flight. Batches run independently: one that fails is
//! retried, and one that keeps failing is skipped and reported while the rest
//! continue. Results from all batches are merged at a single point after the
//! last batch finishes.

use crate::config::Config;
use crate::error::ProviderError;
use crate::model::Tweet;
use crate::parser::{extract_batch_tweets, parse_tweet};
use crate::provider::{Attempted, RetryPolicy, TweetProvider, with_retry};
use crate::scanner::MissingReferenceSet;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// A batch that was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBatch {
    pub index: usize,
    pub ids: Vec<String>,
    pub attempts: u32,
    pub error: ProviderError,
}

/// Everything a backfill pass produced.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Ids that were asked for.
    pub requested: usize,
    /// Number of lookup batches issued.
    pub batches: usize,
    /// Tweets returned by successful batches, keyed by id.
    pub tweets: BTreeMap<String, Tweet>,
    /// Batches that failed fatally or ran out of retries.
    pub skipped: Vec<SkippedBatch>,
}

impl BackfillReport {
    /// Ids covered by skipped batches.
    #[must_use]
    pub fn skipped_ids(&self) -> usize {
        self.skipped.iter().map(|b| b.ids.len()).sum()
    }
}

enum BatchOutcome {
    Fetched { index: usize, tweets: Vec<Tweet> },
    Skipped(SkippedBatch),
}

impl BatchOutcome {
    const fn index(&self) -> usize {
        match self {
            Self::Fetched { index, .. } => *index,
            Self::Skipped(batch) => batch.index,
        }
    }
}

/// Looks up missing ids in bounded, concurrent batches.
pub struct BackfillExecutor<'a, P> {
    provider: &'a P,
    batch_size: usize,
    max_in_flight: usize,
    policy: RetryPolicy,
}

impl<'a, P: TweetProvider> BackfillExecutor<'a, P> {
    /// Limits are clamped to `1..=20` ids per batch and `1..=10` in flight.
    #[must_use]
    pub fn new(provider: &'a P, batch_size: usize, max_in_flight: usize, policy: RetryPolicy) -> Self {
        Self {
            provider,
            batch_size: batch_size.clamp(1, crate::config::MAX_BATCH_SIZE),
            max_in_flight: max_in_flight.clamp(1, crate::config::MAX_IN_FLIGHT),
            policy,
        }
    }

    #[must_use]
    pub fn from_config(provider: &'a P, config: &Config) -> Self {
        let policy = RetryPolicy::new(
            config.backfill.max_attempts,
            Duration::from_millis(config.backfill.backoff_ms),
            Duration::from_millis(config.provider.rate_limit_cooldown_ms),
        );
        Self::new(
            provider,
            config.backfill.effective_batch_size(),
            config.backfill.effective_max_in_flight(),
            policy,
        )
    }

    /// Look up every id in `missing`.
    pub async fn run(&self, missing: &MissingReferenceSet) -> BackfillReport {
        let ids: Vec<String> = missing.iter().cloned().collect();
        let batches: Vec<Vec<String>> = ids.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        let total = batches.len();
        if total == 0 {
            return BackfillReport::default();
        }
        info!(
            ids = ids.len(),
            batches = total,
            max_in_flight = self.max_in_flight,
            "Backfilling missing references"
        );

        let mut outcomes: Vec<BatchOutcome> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| self.run_batch(index, total, batch))
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        // Merge in batch order so the result does not depend on completion order.
        outcomes.sort_by_key(BatchOutcome::index);
        let mut report = BackfillReport {
            requested: ids.len(),
            batches: total,
            ..BackfillReport::default()
        };
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Fetched { tweets, .. } => {
                    for tweet in tweets {
                        report.tweets.entry(tweet.id.clone()).or_insert(tweet);
                    }
                }
                BatchOutcome::Skipped(batch) => report.skipped.push(batch),
            }
        }

        info!(
            fetched = report.tweets.len(),
            skipped_batches = report.skipped.len(),
            "Backfill finished"
        );
        report
    }

    async fn run_batch(&self, index: usize, total: usize, ids: Vec<String>) -> BatchOutcome {
        let provider = self.provider;
        let batch = ids.as_slice();
        let outcome = with_retry(&self.policy, "tweet lookup", move || {
            provider.lookup_tweets(batch)
        })
        .await;

        match outcome {
            Attempted::Success { value, .. } => {
                let tweets: Vec<Tweet> = extract_batch_tweets(&value)
                    .into_iter()
                    .filter_map(parse_tweet)
                    .collect();
                info!(
                    batch = index + 1,
                    total,
                    requested = ids.len(),
                    returned = tweets.len(),
                    "Batch done"
                );
                BatchOutcome::Fetched { index, tweets }
            }
            Attempted::Exhausted { error, attempts } | Attempted::Fatal { error, attempts } => {
                warn!(batch = index + 1, total, attempts, "Skipping batch: {error}");
                BatchOutcome::Skipped(SkippedBatch {
                    index,
                    ids,
                    attempts,
                    error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderResult;
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const QUICK: RetryPolicy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);

    fn lookup_result(id: &str) -> Value {
        json!({
            "result": {
                "__typename": "Tweet",
                "rest_id": id,
                "legacy": { "full_text": format!("looked up {id}"), "conversation_id_str": id }
            }
        })
    }

    /// Answers every lookup with the requested tweets, except ids listed in
    /// `poisoned`, whose batches always fail with HTTP 400.
    #[derive(Default)]
    struct CountingLookup {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        largest_batch: AtomicUsize,
        calls: AtomicUsize,
        poisoned: HashSet<String>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl TweetProvider for CountingLookup {
        async fn resolve_user(&self, _screen_name: &str) -> ProviderResult<Value> {
            Ok(json!({}))
        }

        async fn fetch_timeline_page(&self, _: &str, _: Option<&str>) -> ProviderResult<Value> {
            Ok(json!({}))
        }

        async fn lookup_tweets(&self, ids: &[String]) -> ProviderResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.largest_batch.fetch_max(ids.len(), Ordering::SeqCst);
            self.seen.lock().unwrap().push(ids.to_vec());

            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if ids.iter().any(|id| self.poisoned.contains(id)) {
                return Err(ProviderError::from_status(400, "bad batch"));
            }
            let results: Vec<Value> = ids.iter().map(|id| lookup_result(id)).collect();
            Ok(json!({ "data": { "tweetResult": results } }))
        }
    }

    fn ids(range: std::ops::Range<u32>) -> MissingReferenceSet {
        range.map(|n| (1000 + n).to_string()).collect()
    }

    #[tokio::test]
    async fn respects_batch_and_concurrency_limits() {
        let provider = CountingLookup::default();
        let executor = BackfillExecutor::new(&provider, 50, 64, QUICK);
        let report = executor.run(&ids(0..450)).await;

        assert_eq!(report.batches, 23);
        assert_eq!(report.tweets.len(), 450);
        assert!(provider.largest_batch.load(Ordering::SeqCst) <= 20);
        assert!(provider.peak.load(Ordering::SeqCst) <= 10);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn failing_batch_is_skipped_after_retries() {
        let provider = CountingLookup {
            poisoned: ["1025".to_string()].into(),
            ..CountingLookup::default()
        };
        let executor = BackfillExecutor::new(&provider, 20, 10, QUICK);
        let report = executor.run(&ids(0..45)).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 1);
        assert_eq!(report.skipped[0].attempts, 3);
        assert_eq!(report.skipped_ids(), 20);
        assert_eq!(report.tweets.len(), 25);
        // 2 good batches once, the bad one 3 times.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn nothing_missing_means_no_requests() {
        let provider = CountingLookup::default();
        let report = BackfillExecutor::new(&provider, 20, 10, QUICK)
            .run(&MissingReferenceSet::new())
            .await;
        assert_eq!(report.batches, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_id_is_requested_exactly_once() {
        let provider = CountingLookup::default();
        let missing = ids(0..57);
        BackfillExecutor::new(&provider, 20, 10, QUICK).run(&missing).await;

        let mut requested: Vec<String> = provider.seen.lock().unwrap().concat();
        requested.sort();
        let expected: Vec<String> = missing.into_iter().collect();
        assert_eq!(requested, expected);
    }
}
