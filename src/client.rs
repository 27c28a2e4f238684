//! HTTP client for the `RapidAPI` X timeline provider.
//!
//! Every request waits its turn on one shared throttle, so concurrent backfill
//! batches never start more than `requests_per_second` requests a second.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result, ResultExt};
use crate::provider::{ProviderResult, TweetProvider};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// Spaces requests so that no more than `1 / interval` start per second.
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    async fn wait(&self) {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        if *next > now {
            sleep_until(*next).await;
        }
        *next = Instant::now().max(*next) + self.interval;
    }
}

/// Production [`TweetProvider`] backed by reqwest.
#[derive(Debug)]
pub struct RapidApiClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    api_key: String,
    throttle: Throttle,
}

impl RapidApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("xcollect/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            host: config.host.clone(),
            api_key: api_key.to_string(),
            throttle: Throttle::new(config.min_interval()),
        })
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> ProviderResult<Value> {
        self.throttle.wait().await;

        let url = format!("{}/{endpoint}", self.base_url);
        debug!(endpoint, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .send()
            .await
            .map_err(|e| ProviderError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transient {
            reason: format!("reading body: {e}"),
        })?;

        if !status.is_success() {
            let error = ProviderError::from_status(status.as_u16(), &body);
            warn!(endpoint, status = status.as_u16(), "{error}");
            return Err(error);
        }

        Ok(parse_body(endpoint, &body))
    }
}

/// Decode a success body. Bodies that are not JSON become an error envelope
/// so the caller can still record what came back.
fn parse_body(endpoint: &str, body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| {
        warn!(endpoint, "Response was not valid JSON: {e}");
        json!({
            "error": "Failed to parse JSON",
            "body": body.chars().take(500).collect::<String>(),
        })
    })
}

impl TweetProvider for RapidApiClient {
    async fn resolve_user(&self, screen_name: &str) -> ProviderResult<Value> {
        self.get("UserResultByScreenName", &[("username", screen_name)])
            .await
    }

    async fn fetch_timeline_page(&self, user_id: &str, cursor: Option<&str>) -> ProviderResult<Value> {
        let mut query = vec![("user_id", user_id)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        self.get("UserTweetsReplies", &query).await
    }

    async fn lookup_tweets(&self, ids: &[String]) -> ProviderResult<Value> {
        let joined = ids.join(",");
        self.get("TweetResultsByRestIds", &[("tweet_ids", joined.as_str())])
            .await
    }
}
