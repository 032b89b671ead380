#![allow(dead_code)]
//! Scripted upstream and item builders shared by the integration tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use feed_aggregator::{AggregatorError, Author, FeedApi, FeedItem, FeedPage, PageQuery, PostView, RequestHeaders, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const FIRST_PARTY: &str = "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";

pub fn generator(name: &str) -> String {
    format!("at://did:plc:{name}/app.bsky.feed.generator/{name}")
}

pub fn post(uri: &str) -> FeedItem {
    post_aged(uri, ChronoDuration::minutes(5))
}

pub fn post_aged(uri: &str, age: ChronoDuration) -> FeedItem {
    FeedItem {
        post: PostView {
            uri: uri.to_string(),
            cid: format!("cid-{uri}"),
            author: Author { did: "did:plc:alice".to_string(), handle: "alice.test".to_string() },
            record: serde_json::json!({ "text": uri }),
            indexed_at: Utc::now() - age,
        },
        reply: None,
        reason: None,
        origin: None,
    }
}

/// `count` distinct posts named `{prefix}-{n}`.
pub fn posts(prefix: &str, count: usize) -> Vec<FeedItem> {
    (0..count).map(|n| post(&format!("{prefix}-{n}"))).collect()
}

pub fn page(feed: Vec<FeedItem>, cursor: Option<&str>) -> FeedPage {
    FeedPage { cursor: cursor.map(str::to_string), feed }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Timeline,
    Feed,
    PublicFeed,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: Endpoint,
    pub generator: Option<String>,
    pub query: PageQuery,
    pub headers: RequestHeaders,
}

struct Reply {
    delay: Duration,
    result: std::result::Result<FeedPage, String>,
}

/// A [`FeedApi`] that answers from per-endpoint scripts and records every call.
/// An endpoint with nothing scripted answers with an empty page.
pub struct ScriptedApi {
    session: bool,
    timeline: Mutex<VecDeque<Reply>>,
    feeds: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            session: true,
            timeline: Mutex::new(VecDeque::new()),
            feeds: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn anonymous() -> Self {
        Self { session: false, ..Self::new() }
    }

    pub fn timeline_page(self, page: FeedPage) -> Self {
        self.timeline_reply(Duration::ZERO, Ok(page))
    }

    pub fn timeline_error(self) -> Self {
        self.timeline_reply(Duration::ZERO, Err("timeline unavailable".to_string()))
    }

    fn timeline_reply(self, delay: Duration, result: std::result::Result<FeedPage, String>) -> Self {
        self.timeline.lock().unwrap().push_back(Reply { delay, result });
        self
    }

    /// Answers for both the authenticated and the anonymous generator endpoint.
    pub fn feed_page(self, generator: &str, page: FeedPage) -> Self {
        self.feed_reply(generator, Duration::ZERO, Ok(page))
    }

    pub fn slow_feed_page(self, generator: &str, delay: Duration, page: FeedPage) -> Self {
        self.feed_reply(generator, delay, Ok(page))
    }

    pub fn feed_error(self, generator: &str) -> Self {
        self.feed_reply(generator, Duration::ZERO, Err("generator returned 502".to_string()))
    }

    fn feed_reply(self, generator: &str, delay: Duration, result: std::result::Result<FeedPage, String>) -> Self {
        self.feeds
            .lock()
            .unwrap()
            .entry(generator.to_string())
            .or_default()
            .push_back(Reply { delay, result });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.endpoint == endpoint).collect()
    }

    pub fn feed_calls_for(&self, generator: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.generator.as_deref() == Some(generator))
            .count()
    }

    fn record(&self, endpoint: Endpoint, generator: Option<&str>, query: &PageQuery, headers: &RequestHeaders) {
        self.calls.lock().unwrap().push(Call {
            endpoint,
            generator: generator.map(str::to_string),
            query: query.clone(),
            headers: headers.clone(),
        });
    }

    async fn answer(reply: Option<Reply>) -> Result<FeedPage> {
        match reply {
            None => Ok(FeedPage::empty()),
            Some(reply) => {
                if !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }
                reply.result.map_err(AggregatorError::General)
            }
        }
    }

    fn next_feed_reply(&self, generator: &str) -> Option<Reply> {
        self.feeds.lock().unwrap().get_mut(generator).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl FeedApi for ScriptedApi {
    fn has_session(&self) -> bool {
        self.session
    }

    async fn get_timeline(&self, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage> {
        self.record(Endpoint::Timeline, None, query, headers);
        let reply = self.timeline.lock().unwrap().pop_front();
        Self::answer(reply).await
    }

    async fn get_feed(&self, generator: &str, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage> {
        self.record(Endpoint::Feed, Some(generator), query, headers);
        let reply = self.next_feed_reply(generator);
        Self::answer(reply).await
    }

    async fn get_public_feed(&self, generator: &str, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage> {
        self.record(Endpoint::PublicFeed, Some(generator), query, headers);
        let reply = self.next_feed_reply(generator);
        Self::answer(reply).await
    }
}

pub fn uris(items: &[FeedItem]) -> Vec<&str> {
    items.iter().map(|i| i.post.uri.as_str()).collect()
}
