//! Provider payload parser.
//!
//! Timeline and lookup responses are deeply nested GraphQL-style JSON whose
//! exact shape varies between endpoints. Everything here walks `serde_json`
//! values defensively and never fails: unknown shapes simply yield nothing.

use crate::model::{Author, Engagement, Tweet, TweetMedia, TweetUrl, UserMention};
use chrono::{DateTime, Utc};
use ring::digest::{SHA256, digest};
use serde_json::Value;
use std::collections::BTreeSet;

/// Keys under which lookup endpoints return tweet results.
const RESULT_KEYS: [&str; 4] = ["results", "tweet_results", "tweets", "tweetResult"];

/// Parse X's date format: "Fri Jan 09 15:12:21 +0000 2026"
#[must_use]
pub fn parse_x_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(date_str, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(date_str).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Strip a leading `@` and surrounding whitespace from a handle.
#[must_use]
pub fn clean_username(username: &str) -> String {
    username.trim().trim_start_matches('@').trim().to_string()
}

fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn str_value(value: &Value) -> Option<String> {
    value.as_str().map(String::from)
}

/// Find the first `rest_id` / `id_str` / `id` in a payload, depth first.
#[must_use]
pub fn extract_user_id(payload: &Value) -> Option<String> {
    match payload {
        Value::Object(map) => {
            for key in ["rest_id", "id_str", "id"] {
                if let Some(id) = map.get(key).and_then(id_value) {
                    return Some(id);
                }
            }
            map.values().find_map(extract_user_id)
        }
        Value::Array(items) => items.iter().find_map(extract_user_id),
        _ => None,
    }
}

/// Find the continuation cursor of a timeline page.
///
/// A cursor entry typed `Bottom` wins; otherwise the first typed cursor or
/// any scalar field whose key mentions "cursor".
#[must_use]
pub fn extract_next_cursor(payload: &Value) -> Option<String> {
    fn walk(node: &Value, bottom: &mut Vec<String>, any: &mut Vec<String>) {
        match node {
            Value::Object(map) => {
                let cursor_type = map.get("cursorType").or_else(|| map.get("cursor_type"));
                if let (Some(kind), Some(value)) = (cursor_type, map.get("value").and_then(id_value)) {
                    let kind = kind.as_str().map(str::to_lowercase).unwrap_or_default();
                    if kind == "bottom" {
                        bottom.push(value);
                    } else if !kind.is_empty() {
                        any.push(value);
                    }
                }
                for (key, val) in map {
                    let key = key.to_lowercase();
                    if key != "cursortype" && key != "cursor_type" && key.contains("cursor") {
                        if let Some(value) = id_value(val) {
                            any.push(value);
                        }
                    }
                    if val.is_object() || val.is_array() {
                        walk(val, bottom, any);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, bottom, any);
                }
            }
            _ => {}
        }
    }

    let mut bottom = Vec::new();
    let mut any = Vec::new();
    walk(payload, &mut bottom, &mut any);
    bottom.into_iter().next().or_else(|| any.into_iter().next())
}

/// Collect every tweet object (`__typename == "Tweet"` with a `legacy` block).
#[must_use]
pub fn iter_tweets(payload: &Value) -> Vec<&Value> {
    fn walk<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
        match node {
            Value::Object(map) => {
                if map.get("__typename").and_then(Value::as_str) == Some("Tweet")
                    && map.contains_key("legacy")
                {
                    out.push(node);
                }
                for val in map.values() {
                    walk(val, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(payload, &mut out);
    out
}

/// Sorted, deduplicated ids of every tweet in a page.
#[must_use]
pub fn collect_tweet_ids(payload: &Value) -> Vec<String> {
    fn walk(node: &Value, out: &mut BTreeSet<String>) {
        match node {
            Value::Object(map) => {
                if let Some(result) = map.get("tweet_results").filter(|v| v.is_object()) {
                    if let Some(id) = extract_user_id(result) {
                        out.insert(id);
                    }
                }
                if map.get("__typename").and_then(Value::as_str) == Some("Tweet") {
                    if let Some(id) = extract_user_id(node) {
                        out.insert(id);
                    }
                }
                for val in map.values() {
                    walk(val, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            _ => {}
        }
    }

    let mut ids = BTreeSet::new();
    walk(payload, &mut ids);
    ids.into_iter().collect()
}

/// Stable hash identifying a page's content.
///
/// Prefers the sorted tweet ids so that cursor or sort-index churn between
/// otherwise identical pages does not change the signature.
#[must_use]
pub fn page_signature(payload: &Value) -> String {
    let ids = collect_tweet_ids(payload);
    let basis = if ids.is_empty() {
        // serde_json maps are ordered by key, so this is canonical.
        serde_json::to_string(payload).unwrap_or_default()
    } else {
        serde_json::to_string(&serde_json::json!({ "tweets": ids })).unwrap_or_default()
    };
    digest(&SHA256, basis.as_bytes())
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Whether a page payload is unusable for tweet extraction.
///
/// Covers non-object bodies and the error envelopes the client substitutes
/// for unparsable responses.
#[must_use]
pub fn is_malformed_page(payload: &Value) -> bool {
    match payload {
        Value::Object(map) => map.contains_key("error") && iter_tweets(payload).is_empty(),
        _ => true,
    }
}

/// Unwrap `TweetWithVisibilityResults` and `result` wrappers down to the tweet.
fn unwrap_tweet_result(item: &Value) -> Option<&Value> {
    let mut node = item.get("result").unwrap_or(item);
    if let Some(inner) = node.get("tweet").filter(|t| t.get("legacy").is_some()) {
        node = inner;
    }
    node.get("legacy").is_some().then_some(node)
}

/// Extract tweet objects from a batch lookup response.
#[must_use]
pub fn extract_batch_tweets(payload: &Value) -> Vec<&Value> {
    fn candidates<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
        for key in RESULT_KEYS {
            match node.get(key) {
                Some(Value::Array(items)) => out.extend(items.iter()),
                Some(val @ Value::Object(_)) => out.push(val),
                _ => {}
            }
        }
    }

    let mut items = Vec::new();
    candidates(payload, &mut items);
    match payload.get("data") {
        Some(Value::Array(inner)) => items.extend(inner.iter()),
        Some(inner @ Value::Object(_)) => candidates(inner, &mut items),
        _ => {}
    }
    items.into_iter().filter_map(unwrap_tweet_result).collect()
}

fn parse_author(tweet: &Value) -> Author {
    let user_results = &tweet["core"]["user_results"];
    let user = user_results.get("result").unwrap_or(user_results);
    let legacy = &user["legacy"];
    let core = &user["core"];
    let counts = &user["relationship_counts"];
    let verification = user
        .get("verification")
        .or_else(|| user.get("legacy_verification_info"));

    Author {
        id: if user.is_object() { extract_user_id(user) } else { None },
        screen_name: str_value(&core["screen_name"]).or_else(|| str_value(&legacy["screen_name"])),
        name: str_value(&core["name"]).or_else(|| str_value(&legacy["name"])),
        followers_count: count_value(&counts["followers"])
            .or_else(|| count_value(&legacy["followers_count"])),
        following_count: count_value(&counts["following"])
            .or_else(|| count_value(&legacy["friends_count"])),
        verified: verification
            .and_then(|v| v["is_blue_verified"].as_bool())
            .unwrap_or(false),
        profile_image_url: str_value(&legacy["profile_image_url_https"])
            .or_else(|| str_value(&legacy["profile_image_url"])),
    }
}

fn parse_urls(value: &Value) -> Vec<TweetUrl> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|u| u.is_object())
                .map(|u| TweetUrl {
                    url: str_value(&u["url"]),
                    expanded_url: str_value(&u["expanded_url"]),
                    display_url: str_value(&u["display_url"]),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_mentions(value: &Value) -> Vec<UserMention> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|m| m.is_object())
                .map(|m| UserMention {
                    id: id_value(&m["id_str"]).or_else(|| id_value(&m["id"])),
                    screen_name: str_value(&m["screen_name"]),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_hashtags(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|h| h["text"].as_str().filter(|t| !t.is_empty()))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_media(legacy: &Value) -> Vec<TweetMedia> {
    let extended = &legacy["extended_entities"]["media"];
    let list = if extended.is_array() {
        extended
    } else {
        &legacy["entities"]["media"]
    };
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter(|m| m.is_object())
                .map(|m| TweetMedia {
                    id: id_value(&m["id_str"]).or_else(|| id_value(&m["id"])),
                    media_type: str_value(&m["type"]),
                    media_key: str_value(&m["media_key"]),
                    display_url: str_value(&m["display_url"]),
                    expanded_url: str_value(&m["expanded_url"]),
                    media_url: str_value(&m["media_url_https"])
                        .or_else(|| str_value(&m["media_url"])),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Normalize one provider tweet object. Returns `None` when it has no id.
#[must_use]
pub fn parse_tweet(tweet: &Value) -> Option<Tweet> {
    let legacy = &tweet["legacy"];
    let id = id_value(&tweet["rest_id"]).or_else(|| id_value(&legacy["id_str"]))?;
    let views = tweet
        .get("views")
        .or_else(|| tweet.get("view_count_info"))
        .or_else(|| tweet.get("view_counts"));

    Some(Tweet {
        created_at: legacy["created_at"].as_str().and_then(parse_x_date),
        text: str_value(&legacy["full_text"])
            .or_else(|| str_value(&legacy["text"]))
            .unwrap_or_default(),
        conversation_id: id_value(&legacy["conversation_id_str"]).unwrap_or_else(|| id.clone()),
        in_reply_to_status_id: id_value(&legacy["in_reply_to_status_id_str"]),
        in_reply_to_user_id: id_value(&legacy["in_reply_to_user_id_str"]),
        quoted_status_id: id_value(&legacy["quoted_status_id_str"]),
        is_quote_status: legacy["is_quote_status"].as_bool().unwrap_or(false),
        author: parse_author(tweet),
        engagement: Engagement {
            reply_count: count_value(&legacy["reply_count"]),
            retweet_count: count_value(&legacy["retweet_count"]),
            quote_count: count_value(&legacy["quote_count"]),
            like_count: count_value(&legacy["favorite_count"]),
            bookmark_count: count_value(&legacy["bookmark_count"]),
            view_count: views.and_then(|v| count_value(&v["count"])),
        },
        urls: parse_urls(&legacy["entities"]["urls"]),
        mentions: parse_mentions(&legacy["entities"]["user_mentions"]),
        hashtags: parse_hashtags(&legacy["entities"]["hashtags"]),
        media: parse_media(legacy),
        language: str_value(&legacy["lang"]),
        source: str_value(&legacy["source"]),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_parse_x_date() {
        let dt = parse_x_date("Fri Jan 09 15:12:21 +0000 2026").unwrap();
        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 9);
        assert!(parse_x_date("2025-11-06T23:32:43.358Z").is_some());
        assert!(parse_x_date("yesterday").is_none());
    }

    #[test]
    fn test_clean_username() {
        assert_eq!(clean_username("  @jack "), "jack");
        assert_eq!(clean_username("jack"), "jack");
    }

    #[test]
    fn cursor_prefers_bottom_snake_case() {
        let payload = json!({
            "timeline": {"instructions": [{"entries": [
                {"content": {"__typename": "TimelineTimelineCursor", "cursor_type": "Top", "value": "TOP"}},
                {"content": {"__typename": "TimelineTimelineCursor", "cursor_type": "Bottom", "value": "BOTTOM"}}
            ]}]}
        });
        assert_eq!(extract_next_cursor(&payload).as_deref(), Some("BOTTOM"));
    }

    #[test]
    fn cursor_supports_camel_case() {
        let payload = json!({
            "timeline": {"instruction": {"some": "data"}},
            "content": {"cursorType": "Bottom", "value": "CAMEL_BOTTOM"}
        });
        assert_eq!(extract_next_cursor(&payload).as_deref(), Some("CAMEL_BOTTOM"));
    }

    #[test]
    fn cursor_falls_back_to_cursor_fields() {
        let payload = json!({
            "timeline": {"instructions": [{"entries": [
                {"content": {"some": "data"}},
                {"cursor": "FALLBACK"}
            ]}]}
        });
        assert_eq!(extract_next_cursor(&payload).as_deref(), Some("FALLBACK"));
        assert_eq!(extract_next_cursor(&json!({"entries": []})), None);
    }

    #[test]
    fn signature_is_key_order_insensitive() {
        let a = json!({"b": 2, "a": 1, "nested": {"x": 10, "y": [1, 2, 3]}});
        let b = json!({"nested": {"y": [1, 2, 3], "x": 10}, "a": 1, "b": 2});
        assert_eq!(page_signature(&a), page_signature(&b));
        assert_eq!(page_signature(&a).len(), 64);
    }

    #[test]
    fn signature_prefers_tweet_ids_over_cursor_changes() {
        let page = |sort: &str, cursor: &str| {
            json!({"entries": [
                {"content": {"tweet_results": {"rest_id": "T1", "result": {"rest_id": "T1"}}}, "sort_index": sort},
                {"content": {"cursor_type": "Bottom", "value": cursor}}
            ]})
        };
        assert_eq!(
            page_signature(&page("AAA", "CUR_A")),
            page_signature(&page("BBB", "CUR_B"))
        );
    }

    #[test]
    fn extract_user_id_walks_nested_payload() {
        let payload = json!({"data": {"user_result": {"result": {"rest_id": "42"}}}});
        assert_eq!(extract_user_id(&payload).as_deref(), Some("42"));
        assert_eq!(extract_user_id(&json!({"data": {}})), None);
    }

    #[test]
    fn parse_tweet_extracts_fields() {
        let raw = json!({
            "__typename": "Tweet",
            "rest_id": "100",
            "core": {"user_results": {"result": {
                "rest_id": "7",
                "core": {"screen_name": "alice", "name": "Alice"},
                "legacy": {"followers_count": 12, "friends_count": "3"},
                "verification": {"is_blue_verified": true}
            }}},
            "views": {"count": "1500"},
            "legacy": {
                "created_at": "Wed Jan 08 12:00:00 +0000 2025",
                "full_text": "hello",
                "conversation_id_str": "90",
                "in_reply_to_status_id_str": "90",
                "quoted_status_id_str": "55",
                "is_quote_status": true,
                "favorite_count": 4,
                "entities": {
                    "urls": [{"url": "https://t.co/x", "expanded_url": "https://example.com"}],
                    "hashtags": [{"text": "rust"}],
                    "user_mentions": [{"id_str": "8", "screen_name": "bob"}]
                }
            }
        });
        let tweet = parse_tweet(&raw).unwrap();
        assert_eq!(tweet.id, "100");
        assert_eq!(tweet.conversation_id, "90");
        assert_eq!(tweet.in_reply_to_status_id.as_deref(), Some("90"));
        assert_eq!(tweet.quoted_status_id.as_deref(), Some("55"));
        assert_eq!(tweet.author.id.as_deref(), Some("7"));
        assert_eq!(tweet.author.screen_name.as_deref(), Some("alice"));
        assert_eq!(tweet.author.following_count, Some(3));
        assert!(tweet.author.verified);
        assert_eq!(tweet.engagement.like_count, Some(4));
        assert_eq!(tweet.engagement.view_count, Some(1500));
        assert_eq!(tweet.hashtags, vec!["rust"]);
        assert_eq!(tweet.urls[0].expanded_url.as_deref(), Some("https://example.com"));
        assert!(tweet.created_at.is_some());
    }

    #[test]
    fn parse_tweet_defaults_conversation_to_own_id() {
        let raw = json!({"__typename": "Tweet", "legacy": {"id_str": "5", "full_text": "x"}});
        let tweet = parse_tweet(&raw).unwrap();
        assert_eq!(tweet.conversation_id, "5");
        assert!(tweet.created_at.is_none());
        assert!(parse_tweet(&json!({"legacy": {}})).is_none());
    }

    #[test]
    fn batch_extraction_unwraps_visibility_results() {
        let payload = json!({"data": {"tweetResult": [
            {"result": {"__typename": "Tweet", "rest_id": "1", "legacy": {"full_text": "a"}}},
            {"result": {"__typename": "TweetWithVisibilityResults",
                        "tweet": {"rest_id": "2", "legacy": {"full_text": "b"}}}},
            {"result": {"__typename": "TweetTombstone"}}
        ]}});
        let ids: Vec<_> = extract_batch_tweets(&payload)
            .into_iter()
            .filter_map(parse_tweet)
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn malformed_page_detection() {
        assert!(is_malformed_page(&json!("oops")));
        assert!(is_malformed_page(&json!({"error": "Failed to parse JSON", "body": "<html>"})));
        assert!(!is_malformed_page(&json!({"timeline": {}})));
    }
}
