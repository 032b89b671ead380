use crate::sources::queue::{FetchOutcome, SourceQueue};
use crate::traits::{FeedApi, FeedContract, PageQuery, RequestHeaders, Source, ACCEPT_LANGUAGE, LABELERS_HEADER, TOPICS_HEADER};
use crate::types::{FeedConfig, FeedItem, FeedOrigin, FeedPage, FetchRequest, Result, UserInterests};
use crate::utils::{feeds, headers, time};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// An algorithmic feed generator mixed into the primary stream.
///
/// Generators are not trusted: pages are truncated to the requested size and
/// anything older than the freshness cutoff is dropped. Every surviving item
/// is tagged with the generator it came from.
pub struct SupplementarySource {
    request: GeneratorRequest,
    queue: SourceQueue,
}

impl SupplementarySource {
    pub fn new(api: Arc<dyn FeedApi>, config: &FeedConfig, generator_uri: impl Into<String>, interests: &UserInterests) -> Self {
        let generator_uri = generator_uri.into();
        let request = GeneratorRequest::new(api, config, &generator_uri, interests);
        Self {
            queue: SourceQueue::new(generator_uri),
            request,
        }
    }

    pub fn generator_uri(&self) -> &str {
        &self.request.origin.generator_uri
    }

    pub fn origin(&self) -> &FeedOrigin {
        &self.request.origin
    }

    /// Headers sent on authenticated calls to this generator.
    pub fn request_headers(&self) -> &RequestHeaders {
        &self.request.headers
    }
}

#[async_trait]
impl Source for SupplementarySource {
    fn label(&self) -> &str {
        self.queue.label()
    }

    fn num_ready(&self) -> usize {
        self.queue.num_ready()
    }

    fn has_more(&self) -> bool {
        self.queue.has_more()
    }

    fn take(&self, n: usize) -> Vec<FeedItem> {
        self.queue.take(n)
    }

    async fn fetch_next(&self, n: usize) {
        let request = self.request.clone();
        self.queue
            .fetch_with(n, move |cursor, n| async move { request.next_batch(cursor, n).await })
            .await
    }
}

/// Bare generator feed: one upstream page per call, truncated to `limit`.
#[async_trait]
impl FeedContract for SupplementarySource {
    async fn peek_latest(&self) -> Option<FeedItem> {
        match self.request.fetch_page(None, 1).await {
            Ok(page) => page.and_then(|p| p.feed.into_iter().next()),
            Err(e) => {
                warn!(source = self.label(), "Peek failed: {}", e);
                None
            }
        }
    }

    async fn fetch(&mut self, request: FetchRequest) -> FeedPage {
        let cursor = request.cursor.filter(|c| !c.is_empty());
        match self.request.fetch_page(cursor, request.limit).await {
            Ok(Some(mut page)) => {
                page.feed.truncate(request.limit);
                if page.feed.is_empty() {
                    page.cursor = None;
                }
                page
            }
            Ok(None) => FeedPage::empty(),
            Err(e) => {
                warn!(source = self.label(), "Generator page failed: {}", e);
                FeedPage::empty()
            }
        }
    }
}

/// Everything needed to issue one generator request, detached from the source
/// so it can run on a spawned task.
#[derive(Clone)]
struct GeneratorRequest {
    api: Arc<dyn FeedApi>,
    origin: FeedOrigin,
    headers: RequestHeaders,
    content_languages: String,
    labelers: String,
    freshness_cutoff: chrono::Duration,
}

impl GeneratorRequest {
    fn new(api: Arc<dyn FeedApi>, config: &FeedConfig, generator_uri: &str, interests: &UserInterests) -> Self {
        let content_languages = headers::content_languages(&config.content_languages);

        let mut request_headers = RequestHeaders::new();
        request_headers.insert(ACCEPT_LANGUAGE, content_languages.clone());
        if feeds::is_first_party(generator_uri, &config.first_party_publishers) {
            let topics = config.debug.topics.clone().unwrap_or_else(|| interests.header_value());
            if !topics.is_empty() {
                request_headers.insert(TOPICS_HEADER, topics);
            }
        }

        Self {
            api,
            origin: FeedOrigin {
                generator_uri: generator_uri.to_string(),
                display_url: feeds::generator_href(generator_uri),
            },
            headers: request_headers,
            content_languages,
            labelers: headers::redacting_labelers(&config.app_labelers),
            freshness_cutoff: config.freshness_cutoff,
        }
    }

    async fn next_batch(&self, cursor: Option<String>, limit: usize) -> FetchOutcome {
        match self.fetch_page(cursor, limit).await {
            Ok(Some(page)) => FetchOutcome::Fetched(self.clean(page, limit, Utc::now())),
            Ok(None) => FetchOutcome::Exhausted,
            Err(e) => {
                warn!(generator = %self.origin.generator_uri, "Generator fetch failed: {}", e);
                FetchOutcome::Exhausted
            }
        }
    }

    /// `Ok(None)` means the anonymous path came back empty twice.
    async fn fetch_page(&self, cursor: Option<String>, limit: usize) -> Result<Option<FeedPage>> {
        let generator = &self.origin.generator_uri;
        let query = PageQuery::new(cursor, limit);
        if self.api.has_session() {
            return self.api.get_feed(generator, &query, &self.headers).await.map(Some);
        }

        let mut anon_headers = self.headers.clone();
        anon_headers.insert(LABELERS_HEADER, self.labelers.clone());
        let localized = query.clone().with_lang(Some(self.content_languages.clone()));
        match self.api.get_public_feed(generator, &localized, &anon_headers).await {
            Ok(page) if !page.feed.is_empty() => return Ok(Some(page)),
            Ok(_) => debug!(generator = %generator, "No items for content languages; retrying without"),
            Err(e) => debug!(generator = %generator, "Localized request failed ({}); retrying without languages", e),
        }

        anon_headers.insert(ACCEPT_LANGUAGE, "");
        let page = self.api.get_public_feed(generator, &query, &anon_headers).await?;
        Ok((!page.feed.is_empty()).then_some(page))
    }

    /// Truncate to `limit`, drop stale items and tag the rest with their origin.
    fn clean(&self, mut page: FeedPage, limit: usize, now: DateTime<Utc>) -> FeedPage {
        if page.feed.len() > limit {
            debug!(
                generator = %self.origin.generator_uri,
                "Generator ignored limit {}; dropping {} items", limit, page.feed.len() - limit
            );
            page.feed.truncate(limit);
        }
        page.feed
            .retain(|item| time::is_fresh(item.post.indexed_at, self.freshness_cutoff, now));
        for item in &mut page.feed {
            item.origin = Some(self.origin.clone());
        }
        page
    }
}
