//! Integration tests for xcollect.
//!
//! These drive the run modes end to end against an in-memory provider:
//! - pagination into a raw file
//! - reference scan and backfill
//! - thread reconstruction and both output files

use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use xcollect::{
    CollectError, Config, ProviderError, RawPageStore, RunContext, RunOutcome, TweetProvider,
    pipeline,
};

type ProviderResult<T> = std::result::Result<T, ProviderError>;

// =============================================================================
// Fake provider
// =============================================================================

fn tweet_json(id: &str, conversation: &str, parent: Option<&str>, quoted: Option<&str>, minute: u32) -> Value {
    let mut legacy = json!({
        "full_text": format!("tweet {id}"),
        "conversation_id_str": conversation,
        "created_at": format!("Wed Jan 08 12:{minute:02}:00 +0000 2025"),
        "favorite_count": 1,
        "reply_count": 0,
    });
    if let Some(parent) = parent {
        legacy["in_reply_to_status_id_str"] = json!(parent);
    }
    if let Some(quoted) = quoted {
        legacy["quoted_status_id_str"] = json!(quoted);
        legacy["is_quote_status"] = json!(true);
    }
    json!({
        "__typename": "Tweet",
        "rest_id": id,
        "core": { "user_results": { "result": {
            "rest_id": "42",
            "core": { "screen_name": "alice", "name": "Alice" }
        }}},
        "legacy": legacy
    })
}

fn page_json(tweets: Vec<Value>, next: Option<&str>) -> Value {
    let mut entries: Vec<Value> = tweets
        .into_iter()
        .map(|t| json!({ "content": { "itemContent": { "tweet_results": { "result": t } } } }))
        .collect();
    if let Some(cursor) = next {
        entries.push(json!({ "content": { "cursorType": "Bottom", "value": cursor } }));
    }
    json!({ "data": { "user": { "result": { "timeline": { "instructions": [
        { "type": "TimelineAddEntries", "entries": entries }
    ]}}}}})
}

#[derive(Default)]
struct FakeProvider {
    pages: HashMap<Option<String>, ProviderResult<Value>>,
    lookups: HashMap<String, Value>,
    failing_ids: HashSet<String>,
    lookup_calls: AtomicUsize,
}

impl FakeProvider {
    fn with_pages(pages: Vec<(Option<&str>, Value)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(cursor, page)| (cursor.map(String::from), Ok(page)))
                .collect(),
            ..Self::default()
        }
    }
}

impl TweetProvider for FakeProvider {
    async fn resolve_user(&self, screen_name: &str) -> ProviderResult<Value> {
        if screen_name == "ghost" {
            return Ok(json!({ "data": {} }));
        }
        Ok(json!({ "data": { "user_results": { "result": {
            "rest_id": "42",
            "core": { "screen_name": screen_name }
        }}}}))
    }

    async fn fetch_timeline_page(&self, _user_id: &str, cursor: Option<&str>) -> ProviderResult<Value> {
        self.pages
            .get(&cursor.map(String::from))
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::from_status(404, "unknown cursor")))
    }

    async fn lookup_tweets(&self, ids: &[String]) -> ProviderResult<Value> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if ids.iter().any(|id| self.failing_ids.contains(id)) {
            return Err(ProviderError::from_status(400, "malformed batch"));
        }
        let results: Vec<Value> = ids
            .iter()
            .filter_map(|id| self.lookups.get(id))
            .map(|t| json!({ "result": t }))
            .collect();
        Ok(json!({ "data": { "tweetResult": results } }))
    }
}

fn context(dir: &TempDir) -> RunContext {
    let mut config = Config::default();
    config.fetch.backoff_ms = 0;
    config.backfill.backoff_ms = 0;
    config.provider.rate_limit_cooldown_ms = 0;
    RunContext::new(config).with_output_dir(dir.path())
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn rich(outcome: &RunOutcome) -> Value {
    read_json(outcome.rich_file.as_ref().unwrap())
}

fn three_page_provider() -> FakeProvider {
    FakeProvider::with_pages(vec![
        (
            None,
            page_json(
                vec![
                    tweet_json("105", "103", Some("104"), None, 5),
                    tweet_json("104", "103", Some("103"), None, 4),
                ],
                Some("c1"),
            ),
        ),
        (
            Some("c1"),
            page_json(
                vec![
                    tweet_json("103", "103", None, None, 3),
                    tweet_json("102", "101", Some("101"), None, 2),
                ],
                Some("c2"),
            ),
        ),
        (
            Some("c2"),
            page_json(vec![tweet_json("101", "101", None, None, 1)], None),
        ),
    ])
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn self_contained_timeline_needs_no_backfill() {
    let dir = TempDir::new().unwrap();
    let provider = three_page_provider();
    let outcome = pipeline::run_full(&context(&dir), &provider, "@alice").await.unwrap();

    let summary = outcome.summary.as_ref().unwrap();
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.missing_ids, 0);
    assert!(summary.unresolved_ids.is_empty());
    assert_eq!(summary.total_tweets, 5);
    assert_eq!(provider.lookup_calls.load(Ordering::SeqCst), 0);

    let reduced = read_json(outcome.reduced_file.as_ref().unwrap());
    let threads = reduced["threads"].as_array().unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0]["id"], "103");
    assert_eq!(threads[0]["replies"][0]["id"], "104");
    assert_eq!(threads[0]["replies"][1]["id"], "105");
    assert_eq!(threads[1]["id"], "101");

    let raw = RawPageStore::open(&outcome.raw_file).unwrap();
    assert_eq!(raw.header().username, "alice");
    assert_eq!(raw.header().user_id, "42");
    assert_eq!(raw.pages().len(), 3);
    assert!(
        outcome
            .raw_file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("alice_")
    );
}

#[tokio::test]
async fn quoted_tweet_is_backfilled() {
    let dir = TempDir::new().unwrap();
    let mut provider = FakeProvider::with_pages(vec![(
        None,
        page_json(
            vec![
                tweet_json("10", "10", None, None, 1),
                tweet_json("11", "10", Some("10"), Some("999"), 2),
            ],
            None,
        ),
    )]);
    provider
        .lookups
        .insert("999".into(), tweet_json("999", "999", None, None, 0));

    let outcome = pipeline::run_full(&context(&dir), &provider, "alice").await.unwrap();
    let summary = outcome.summary.as_ref().unwrap();
    assert_eq!(summary.missing_ids, 1);
    assert_eq!(summary.backfilled, 1);
    assert!(summary.unresolved_ids.is_empty());
    assert_eq!(summary.total_tweets, 3);

    let rich = rich(&outcome);
    let ids: Vec<&str> = rich["tweetsFlat"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"999"));

    // The raw file holds only what pagination returned.
    let raw = RawPageStore::open(&outcome.raw_file).unwrap();
    assert!(!raw.pages()[0].tweet_ids.contains(&"999".to_string()));
}

#[tokio::test]
async fn failed_batch_leaves_ids_unresolved_but_run_completes() {
    let dir = TempDir::new().unwrap();
    let mut provider = FakeProvider::with_pages(vec![(
        None,
        page_json(
            vec![
                tweet_json("300", "111", Some("111"), None, 1),
                tweet_json("301", "222", Some("222"), None, 2),
            ],
            None,
        ),
    )]);
    provider.failing_ids.insert("111".into());

    let outcome = pipeline::run_full(&context(&dir), &provider, "alice").await.unwrap();
    let summary = outcome.summary.as_ref().unwrap();
    assert_eq!(summary.missing_ids, 2);
    assert_eq!(summary.skipped_batches, 1);
    assert_eq!(summary.skipped_ids, 2);
    assert_eq!(summary.unresolved_ids, vec!["111", "222"]);
    assert_eq!(provider.lookup_calls.load(Ordering::SeqCst), 3);
    assert!(outcome.rich_file.as_ref().unwrap().exists());
    assert!(outcome.reduced_file.as_ref().unwrap().exists());

    // Replies to unrecovered tweets still root their own threads.
    let rich = rich(&outcome);
    assert_eq!(rich["threads"][0]["id"], "301");
    assert_eq!(rich["threads"][0]["orphanReply"], true);
    assert_eq!(rich["threads"][1]["id"], "300");
    assert!(rich["orphans"].as_array().unwrap().is_empty());

    let reduced = read_json(outcome.reduced_file.as_ref().unwrap());
    let roots: Vec<&str> = reduced["threads"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(roots, vec!["301", "300"]);
}

#[tokio::test]
async fn backfilled_references_are_reported_not_chased() {
    let dir = TempDir::new().unwrap();
    let mut provider = FakeProvider::with_pages(vec![(
        None,
        page_json(vec![tweet_json("20", "19", Some("19"), None, 5)], None),
    )]);
    provider
        .lookups
        .insert("19".into(), tweet_json("19", "18", Some("18"), None, 4));

    let outcome = pipeline::run_full(&context(&dir), &provider, "alice").await.unwrap();
    let summary = outcome.summary.as_ref().unwrap();
    assert_eq!(summary.backfilled, 1);
    assert_eq!(summary.unresolved_ids, vec!["18"]);
    assert_eq!(provider.lookup_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn process_only_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let provider = three_page_provider();
    let ctx = context(&dir);
    let pages = pipeline::run_pages_only(&ctx, &provider, "alice").await.unwrap();
    assert!(pages.summary.is_none());
    assert!(pages.rich_file.is_none());

    let first = pipeline::run_process_only(&ctx, &pages.raw_file).unwrap();
    let rich_once = std::fs::read(first.rich_file.as_ref().unwrap()).unwrap();
    let reduced_once = std::fs::read(first.reduced_file.as_ref().unwrap()).unwrap();

    let second = pipeline::run_process_only(&context(&dir), &pages.raw_file).unwrap();
    assert_eq!(first.rich_file, second.rich_file);
    assert_eq!(rich_once, std::fs::read(second.rich_file.as_ref().unwrap()).unwrap());
    assert_eq!(
        reduced_once,
        std::fs::read(second.reduced_file.as_ref().unwrap()).unwrap()
    );
}

#[tokio::test]
async fn every_reference_is_present_or_unresolved() {
    let dir = TempDir::new().unwrap();
    let mut provider = FakeProvider::with_pages(vec![(
        None,
        page_json(
            vec![
                tweet_json("50", "50", None, Some("7"), 1),
                tweet_json("51", "50", Some("50"), None, 2),
                tweet_json("52", "40", Some("40"), Some("8"), 3),
            ],
            None,
        ),
    )]);
    provider
        .lookups
        .insert("40".into(), tweet_json("40", "40", None, None, 0));

    let outcome = pipeline::run_full(&context(&dir), &provider, "alice").await.unwrap();
    let rich = rich(&outcome);
    let present: HashSet<&str> = rich["tweetsFlat"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    let unresolved: HashSet<&str> = rich["summary"]["unresolvedIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();

    for tweet in rich["tweetsFlat"].as_array().unwrap() {
        for key in ["inReplyToStatusId", "quotedStatusId"] {
            if let Some(id) = tweet[key].as_str() {
                assert!(present.contains(id) || unresolved.contains(id), "{id} unaccounted");
            }
        }
    }
    assert_eq!(unresolved, HashSet::from(["7", "8"]));
}

#[tokio::test]
async fn thread_orderings_hold() {
    let dir = TempDir::new().unwrap();
    let provider = three_page_provider();
    let outcome = pipeline::run_full(&context(&dir), &provider, "alice").await.unwrap();
    let rich = rich(&outcome);

    let threads = rich["threads"].as_array().unwrap();
    let roots: Vec<&str> = threads
        .iter()
        .map(|t| t["createdAt"].as_str().unwrap())
        .collect();
    assert!(roots.windows(2).all(|w| w[0] >= w[1]));
    for thread in threads {
        let replies: Vec<&str> = thread["replies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["createdAt"].as_str().unwrap())
            .collect();
        assert!(replies.windows(2).all(|w| w[0] <= w[1]));
    }
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn fatal_page_error_keeps_earlier_pages_for_backfill() {
    let dir = TempDir::new().unwrap();
    let mut provider = three_page_provider();
    provider
        .pages
        .insert(Some("c1".into()), Err(ProviderError::Unauthorized { status: 401 }));
    let ctx = context(&dir);

    let err = pipeline::run_full(&ctx, &provider, "alice").await.unwrap_err();
    assert!(matches!(
        err,
        CollectError::PaginationAborted { page: 2, attempts: 1, .. }
    ));

    let raw_file = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|e| e == "json"))
        .unwrap();
    let outcome = pipeline::run_backfill_only(&ctx, &provider, &raw_file).await.unwrap();
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.pages_fetched, 1);
    // The lookup knows nothing about 103, so it stays unresolved.
    assert_eq!(summary.unresolved_ids, vec!["103"]);
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let dir = TempDir::new().unwrap();
    let provider = FakeProvider::default();
    let err = pipeline::run_full(&context(&dir), &provider, "ghost").await.unwrap_err();
    assert!(matches!(err, CollectError::UserNotFound { .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn empty_username_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = pipeline::run_pages_only(&context(&dir), &FakeProvider::default(), " @ ")
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::InvalidArgument { .. }));
}

#[test]
fn process_only_missing_raw_file() {
    let dir = TempDir::new().unwrap();
    let err = pipeline::run_process_only(&context(&dir), &dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, CollectError::RawFileNotFound { .. }));
    assert!(err.suggestion().is_some());
}
