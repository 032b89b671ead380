use crate::types::{FeedItem, FeedPage, FetchRequest, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const ACCEPT_LANGUAGE: &str = "Accept-Language";
/// Personalization header understood by first-party generators.
pub const TOPICS_HEADER: &str = "X-Bsky-Topics";
/// Label authorities whose labels should be redacted on anonymous calls.
pub const LABELERS_HEADER: &str = "atproto-accept-labelers";

/// The surface the rendering layer consumes.
///
/// Implementations never fail: upstream trouble shows up as a short or empty
/// page, which the caller treats as "try again later".
#[async_trait]
pub trait FeedContract: Send + Sync {
    /// The single most recent item, used for "new content" detection.
    async fn peek_latest(&self) -> Option<FeedItem>;

    /// Fetch one page. An absent cursor in the result ends the pagination chain.
    async fn fetch(&mut self, request: FetchRequest) -> FeedPage;
}

/// Query parameters of one upstream page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub cursor: Option<String>,
    /// Servers are free to ignore this.
    pub limit: usize,
    /// `lang` query parameter, only sent on anonymous requests.
    pub lang: Option<String>,
}

impl PageQuery {
    pub fn new(cursor: Option<String>, limit: usize) -> Self {
        Self { cursor, limit, lang: None }
    }

    pub fn with_lang(mut self, lang: Option<String>) -> Self {
        self.lang = lang;
        self
    }
}

/// Ordered header list attached to an upstream call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders(Vec<(String, String)>);

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any previous value (names compare case-insensitively).
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Remote feed endpoints. Slow, unreliable and rate limited.
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Whether an authenticated identity is attached to this client.
    fn has_session(&self) -> bool;

    /// The chronological "following" timeline of the session's account.
    async fn get_timeline(&self, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage>;

    /// A feed generator, through the authenticated client.
    async fn get_feed(&self, generator: &str, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage>;

    /// A feed generator, through a hand-built anonymous request.
    async fn get_public_feed(&self, generator: &str, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage>;
}

/// One upstream endpoint with its own cursor and ready-queue.
#[async_trait]
pub trait Source: Send + Sync {
    /// Name used in logs.
    fn label(&self) -> &str;

    /// Buffered, undelivered items.
    fn num_ready(&self) -> usize;

    fn has_more(&self) -> bool;

    fn needs_fetch(&self) -> bool {
        self.has_more() && self.num_ready() == 0
    }

    /// Remove and return up to `n` items from the front of the queue.
    fn take(&self, n: usize) -> Vec<FeedItem>;

    /// Request up to `n` more items and wait for them. Concurrent calls share
    /// one upstream request.
    async fn fetch_next(&self, n: usize);

    /// Like [`Source::fetch_next`] but stop waiting after `limit`. The fetch
    /// itself keeps running and still fills the queue when it resolves.
    /// Returns whether the fetch settled in time.
    async fn fetch_next_within(&self, n: usize, limit: Duration) -> bool {
        match tokio::time::timeout(limit, self.fetch_next(n)).await {
            Ok(()) => true,
            Err(_) => {
                debug!(source = self.label(), "Stopped waiting for fetch after {:?}", limit);
                false
            }
        }
    }
}
