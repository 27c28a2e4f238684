//! Data models for collected X timeline data.
//!
//! Tweets are the normalized form extracted from provider payloads. Raw pages
//! and the raw file header mirror what is persisted on disk, field for field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A tweet extracted from a timeline page or a backfill lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub text: String,
    pub conversation_id: String,
    pub in_reply_to_status_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    pub quoted_status_id: Option<String>,
    pub is_quote_status: bool,
    pub author: Author,
    pub engagement: Engagement,
    pub urls: Vec<TweetUrl>,
    pub mentions: Vec<UserMention>,
    pub hashtags: Vec<String>,
    pub media: Vec<TweetMedia>,
    pub language: Option<String>,
    pub source: Option<String>,
}

impl Tweet {
    /// Classify the tweet for summary breakdowns. A reply that also quotes
    /// counts as a reply.
    #[must_use]
    pub const fn kind(&self) -> TweetKind {
        if self.in_reply_to_status_id.is_some() {
            TweetKind::Reply
        } else if self.quoted_status_id.is_some() || self.is_quote_status {
            TweetKind::Quote
        } else {
            TweetKind::Original
        }
    }

    /// Ids this tweet points at (reply parent, then quoted tweet).
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.in_reply_to_status_id
            .as_deref()
            .into_iter()
            .chain(self.quoted_status_id.as_deref())
    }
}

/// Breakdown category of a tweet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweetKind {
    Original,
    Reply,
    Quote,
}

/// The account that posted a tweet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Option<String>,
    pub screen_name: Option<String>,
    pub name: Option<String>,
    pub followers_count: Option<u64>,
    pub following_count: Option<u64>,
    pub verified: bool,
    pub profile_image_url: Option<String>,
}

/// Engagement counters as reported by the provider.
///
/// Missing counters stay `None`; they are not treated as zero until summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub reply_count: Option<u64>,
    pub retweet_count: Option<u64>,
    pub quote_count: Option<u64>,
    pub like_count: Option<u64>,
    pub bookmark_count: Option<u64>,
    pub view_count: Option<u64>,
}

/// A URL entity in a tweet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetUrl {
    pub url: Option<String>,
    pub expanded_url: Option<String>,
    pub display_url: Option<String>,
}

/// A user mention in a tweet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMention {
    pub id: Option<String>,
    pub screen_name: Option<String>,
}

/// Media attached to a tweet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetMedia {
    pub id: Option<String>,
    pub media_type: Option<String>,
    pub media_key: Option<String>,
    pub display_url: Option<String>,
    pub expanded_url: Option<String>,
    pub media_url: Option<String>,
}

/// One provider timeline response, as returned, plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPage {
    pub page_number: u32,
    pub requested_cursor: Option<String>,
    pub next_cursor: Option<String>,
    pub page_signature: String,
    #[serde(default)]
    pub tweet_ids: Vec<String>,
    #[serde(default)]
    pub new_tweet_ids: Vec<String>,
    /// Set when the payload could not be used for tweet extraction.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub malformed: bool,
    pub data: Value,
}

/// Identity block at the top of a raw page file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileHeader {
    pub username: String,
    pub user_id: String,
    pub fetched_at: String,
    #[serde(default)]
    pub user: Value,
}

/// Total ordering for opaque tweet ids.
///
/// Purely numeric ids (snowflakes) compare numerically without parsing, by
/// length then lexically; anything else compares lexically after them.
#[must_use]
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    match (numeric(a), numeric(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// Chronological ordering: (created_at, id) ascending. Tweets without a
/// timestamp sort as the oldest.
#[must_use]
pub fn chronological(a: &Tweet, b: &Tweet) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| compare_ids(&a.id, &b.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_compare_by_value() {
        assert_eq!(compare_ids("999", "1000"), Ordering::Less);
        assert_eq!(compare_ids("1000", "999"), Ordering::Greater);
        assert_eq!(compare_ids("0042", "42"), Ordering::Equal);
        assert_eq!(compare_ids("111", "222"), Ordering::Less);
    }

    #[test]
    fn non_numeric_ids_sort_after_numeric() {
        assert_eq!(compare_ids("123", "abc"), Ordering::Less);
        assert_eq!(compare_ids("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn reply_beats_quote_in_kind() {
        let mut tweet = crate::collection::tests::tweet("1", "1", None, 0);
        assert_eq!(tweet.kind(), TweetKind::Original);
        tweet.quoted_status_id = Some("9".into());
        assert_eq!(tweet.kind(), TweetKind::Quote);
        tweet.in_reply_to_status_id = Some("8".into());
        assert_eq!(tweet.kind(), TweetKind::Reply);
        assert_eq!(tweet.references().collect::<Vec<_>>(), vec!["8", "9"]);
    }
}
