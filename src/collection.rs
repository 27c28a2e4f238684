//! The set of known tweets for one run, keyed by id.

use crate::model::{RawPage, Tweet};
use crate::parser::{iter_tweets, parse_tweet};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::debug;

/// Tweets keyed by id. Each id appears at most once.
#[derive(Debug, Clone, Default)]
pub struct TweetCollection {
    tweets: BTreeMap<String, Tweet>,
}

impl TweetCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract every tweet from a run's pages.
    ///
    /// Pages are parsed in parallel but folded in page order, so when the same
    /// id shows up on two pages the later page's copy is kept. Malformed pages
    /// are skipped.
    #[must_use]
    pub fn from_pages(pages: &[RawPage]) -> Self {
        let per_page: Vec<Vec<Tweet>> = pages
            .par_iter()
            .filter(|page| !page.malformed)
            .map(|page| {
                iter_tweets(&page.data)
                    .into_iter()
                    .filter_map(parse_tweet)
                    .collect()
            })
            .collect();

        let mut collection = Self::new();
        for tweet in per_page.into_iter().flatten() {
            collection.tweets.insert(tweet.id.clone(), tweet);
        }
        debug!(
            pages = pages.len(),
            tweets = collection.len(),
            "Extracted tweets from pages"
        );
        collection
    }

    /// Add backfilled tweets. Ids already present keep their existing copy.
    ///
    /// Returns how many tweets were actually added.
    pub fn merge_backfill(&mut self, tweets: impl IntoIterator<Item = Tweet>) -> usize {
        let mut added = 0;
        for tweet in tweets {
            if let Entry::Vacant(slot) = self.tweets.entry(tweet.id.clone()) {
                slot.insert(tweet);
                added += 1;
            }
        }
        added
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Tweet> {
        self.tweets.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.tweets.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tweets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tweet> {
        self.tweets.values()
    }
}

impl FromIterator<Tweet> for TweetCollection {
    fn from_iter<I: IntoIterator<Item = Tweet>>(iter: I) -> Self {
        Self {
            tweets: iter.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }
}
